use std::fmt::Debug;
use std::time::Duration;

use log::debug;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::credential::Certificate;
use crate::payload::Notification;

/// Transport error, one per failed send.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Error from [`reqwest`] crate: connection, TLS, timeout or body encoding.
    #[error("reqwest error: {0}")]
    Request(#[from] reqwest::Error),
    /// Error from [`serde_json`] crate while reading a rejection.
    #[error("deserialization error: {0}")]
    Deserialize(#[from] serde_json::Error),
    /// Error from [`url`] crate while building the device URL.
    #[error("url error: {0}")]
    Url(#[from] url::ParseError),
}

/// Sends one [`Notification`] to a gateway.
pub trait Transport: Debug + Send + Sync {
    /// Pushes synchronously. Rejections by the gateway are [`Response`]s, not errors.
    fn push(&self, notification: &Notification) -> Result<Response, TransportError>;
}

/// APNs environment. <https://developer.apple.com/documentation/usernotifications/sending-notification-requests-to-apns>
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Environment {
    /// Sandbox gateway (default)
    #[default]
    Development,
    /// Production gateway
    Production,
}

impl Environment {
    /// Gateway host of the environment.
    pub fn host(&self) -> &'static str {
        match self {
            Environment::Development => "https://api.sandbox.push.apple.com",
            Environment::Production => "https://api.push.apple.com",
        }
    }
}

#[cfg(test)]
fn server_url(_environment: Environment) -> String {
    mockito::server_url()
}

#[cfg(not(test))]
fn server_url(environment: Environment) -> String {
    environment.host().to_string()
}

/// APNs response for one notification.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Response {
    /// HTTP status code, `200` when the notification was accepted
    pub status_code: u16,
    /// `apns-id` echoed by the gateway
    pub apns_id: Option<String>,
    /// Rejection reason e.g. `BadDeviceToken`
    pub reason: Option<String>,
    /// Milliseconds since epoch at which the token became invalid, on `410` only
    pub timestamp: Option<i64>,
}

impl Response {
    /// Whether APNs accepted the notification.
    pub fn sent(&self) -> bool {
        self.status_code == 200
    }
}

#[derive(Default, Deserialize)]
struct Rejection {
    reason: Option<String>,
    timestamp: Option<i64>,
}

/// HTTP/2 client for APNs, authenticated with a TLS client certificate.
#[derive(Clone, Debug)]
pub struct ApnsClient {
    http: Client,
    host: String,
}

impl ApnsClient {
    /// Creates an [`ApnsClient`] for the given environment.
    ///
    /// HTTP/2 is negotiated over TLS. Every request is bound by `timeout`.
    pub fn new(
        certificate: Certificate,
        environment: Environment,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .identity(certificate.into_identity())
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            host: server_url(environment),
        })
    }

    /// `/3/device/<token>`, the token always stays a single path segment.
    fn device_url(&self, token: &str) -> Result<Url, url::ParseError> {
        let mut url = Url::parse(&self.host)?;
        url.path_segments_mut()
            .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .extend(["3", "device", token]);
        Ok(url)
    }
}

impl Transport for ApnsClient {
    fn push(&self, notification: &Notification) -> Result<Response, TransportError> {
        let uri = self.device_url(&notification.device_token)?;

        let mut request = self
            .http
            .post(uri)
            .header("apns-priority", notification.priority.to_string())
            .json(&notification.payload);
        if let Some(ref id) = notification.apns_id {
            request = request.header("apns-id", id.as_str());
        }
        if let Some(ref topic) = notification.topic {
            request = request.header("apns-topic", topic.as_str());
        }
        if let Some(expiration) = notification.expiration {
            request = request.header("apns-expiration", expiration.to_string());
        }

        debug!("push to {}", notification.device_token);
        let response = request.send()?;

        let status_code = response.status().as_u16();
        let apns_id = response
            .headers()
            .get("apns-id")
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        if status_code == 200 {
            return Ok(Response {
                status_code,
                apns_id,
                ..Default::default()
            });
        }

        let body = response.text()?;
        let rejection: Rejection = if body.is_empty() {
            Rejection::default()
        } else {
            serde_json::from_str(&body)?
        };
        Ok(Response {
            status_code,
            apns_id,
            reason: rejection.reason,
            timestamp: rejection.timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::str::FromStr as _;

    use mockito::{mock, Matcher};
    use serde_json::json;

    use crate::payload::{Payload, Priority};

    const TOKEN: &str = "740f4707bebcf74f9b7c25d48e3358945f6aa01da5ddb387462c7eaf61bb78ad";

    fn build_client() -> ApnsClient {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/fixtures/valid.pem");
        let certificate = Certificate::from_pem_file(path).expect("valid fixture");
        ApnsClient::new(certificate, Environment::Development, Duration::from_secs(5))
            .expect("client")
    }

    #[test]
    fn t_environment() -> Result<(), strum::ParseError> {
        assert_eq!(Environment::Development, Environment::default());
        assert_eq!("development", Environment::Development.to_string());
        assert_eq!(Environment::Production, Environment::from_str("production")?);
        assert_eq!("https://api.sandbox.push.apple.com", Environment::Development.host());
        assert_eq!("https://api.push.apple.com", Environment::Production.host());
        Ok(())
    }

    #[test]
    fn t_push() -> Result<(), TransportError> {
        let path = format!("/3/device/{TOKEN}");
        let _m = mock("POST", path.as_str())
            .match_header("apns-priority", "10")
            .match_header("apns-topic", "com.example.app")
            .match_header("apns-id", "00000000-0000-0000-0000-000000000001")
            .match_header("apns-expiration", Matcher::Missing)
            .match_body(Matcher::Json(json!({"aps": {"alert": "hello"}})))
            .with_status(200)
            .with_header("apns-id", "00000000-0000-0000-0000-000000000001")
            .create();

        let mut n = Notification::new(TOKEN, Payload::new("hello"));
        n.topic = Some("com.example.app".into());
        n.apns_id = Some("00000000-0000-0000-0000-000000000001".into());

        let res = build_client().push(&n)?;
        assert!(res.sent());
        assert_eq!(
            Some("00000000-0000-0000-0000-000000000001"),
            res.apns_id.as_deref()
        );
        assert!(res.reason.is_none());
        Ok(())
    }

    #[test]
    fn t_push_low_priority_with_expiration() -> Result<(), TransportError> {
        let path = format!("/3/device/{TOKEN}");
        let _m = mock("POST", path.as_str())
            .match_header("apns-priority", "5")
            .match_header("apns-expiration", "1700000000")
            .match_header("apns-topic", Matcher::Missing)
            .with_status(200)
            .create();

        let mut n = Notification::new(TOKEN, Payload::new("hello"));
        n.priority = Priority::Low;
        n.expiration = Some(1_700_000_000);

        let res = build_client().push(&n)?;
        assert!(res.sent());
        assert!(res.apns_id.is_none());
        Ok(())
    }

    #[test]
    fn t_rejected() -> Result<(), TransportError> {
        let path = format!("/3/device/{TOKEN}");
        let _m = mock("POST", path.as_str())
            .with_status(410)
            .with_body(r#"{"reason":"Unregistered","timestamp":1700000000000}"#)
            .create();

        let n = Notification::new(TOKEN, Payload::new("hello"));
        let res = build_client().push(&n)?;
        assert!(!res.sent());
        assert_eq!(410, res.status_code);
        assert_eq!(Some("Unregistered"), res.reason.as_deref());
        assert_eq!(Some(1_700_000_000_000), res.timestamp);
        Ok(())
    }

    #[test]
    fn t_malformed_rejection() {
        let path = format!("/3/device/{TOKEN}");
        let _m = mock("POST", path.as_str())
            .with_status(500)
            .with_body("<html>oops</html>")
            .create();

        let n = Notification::new(TOKEN, Payload::new("hello"));
        assert!(matches!(
            build_client().push(&n),
            Err(TransportError::Deserialize(_))
        ));
    }

    #[test]
    fn t_token_stays_in_device_path() -> Result<(), TransportError> {
        let _m = mock("POST", "/3/device/x%2F..%2F..%2Fevil%3Fq")
            .with_status(200)
            .create();

        let n = Notification::new("x/../../evil?q", Payload::new("hello"));
        let res = build_client().push(&n)?;
        assert!(res.sent());

        let url = build_client().device_url(TOKEN)?;
        assert_eq!(format!("/3/device/{TOKEN}"), url.path());
        assert!(url.query().is_none());
        Ok(())
    }
}
