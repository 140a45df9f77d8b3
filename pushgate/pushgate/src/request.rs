use std::fmt;

use serde::{Deserialize, Serialize};

use crate::PushError;

/// Target platform of a [`PushRequest`], encoded as an integer on the wire.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(from = "i64", into = "i64")]
pub enum Platform {
    /// Apple Push Notification service (`1`)
    Ios,
    /// Android cloud messaging (`2`)
    Android,
    /// Any other tag, kept so that it can be reported back
    Other(i64),
}

impl From<i64> for Platform {
    fn from(tag: i64) -> Self {
        match tag {
            1 => Platform::Ios,
            2 => Platform::Android,
            n => Platform::Other(n),
        }
    }
}

impl From<Platform> for i64 {
    fn from(platform: Platform) -> Self {
        match platform {
            Platform::Ios => 1,
            Platform::Android => 2,
            Platform::Other(n) => n,
        }
    }
}

impl Default for Platform {
    fn default() -> Self {
        Platform::Other(0)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Ios => write!(f, "ios"),
            Platform::Android => write!(f, "android"),
            Platform::Other(n) => write!(f, "platform {n}"),
        }
    }
}

/// Custom key / value pair merged into the top level of the payload.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Extend {
    /// Key
    pub key: String,
    /// Value
    #[serde(rename = "val")]
    pub value: String,
}

/// Structured alert dictionary. <https://developer.apple.com/documentation/usernotifications/generating-a-remote-notification>
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Alert {
    /// Label of the action button
    pub action: Option<String>,
    /// Localization key of the action button label
    pub action_loc_key: Option<String>,
    /// Alert body, replaces the base message when given
    pub body: Option<String>,
    /// Launch image shown while the app starts
    pub launch_image: Option<String>,
    /// Arguments for `loc_key`
    pub loc_args: Vec<String>,
    /// Localization key of the body
    pub loc_key: Option<String>,
    /// Alert title
    pub title: Option<String>,
    /// Arguments for `title_loc_key`
    pub title_loc_args: Vec<String>,
    /// Localization key of the title
    pub title_loc_key: Option<String>,
}

/// A push request for a batch of device tokens on one platform.
///
/// ```
/// # use pushgate::{Platform, PushRequest};
/// let req: PushRequest = serde_json::from_str(
///     r#"{"tokens":["abc"],"platform":1,"message":"hello"}"#,
/// ).unwrap();
/// assert_eq!(Platform::Ios, req.platform);
/// ```
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PushRequest {
    // common
    /// Device tokens, one send attempt per token
    pub tokens: Vec<String>,
    /// Target platform
    pub platform: Platform,
    /// Base alert text
    pub message: String,
    /// `normal` lowers the APNs priority, anything else keeps it high
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    /// Background fetch flag
    pub content_available: bool,

    // android
    /// Collapse key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collapse_key: Option<String>,
    /// Delay delivery while the device is idle
    pub delay_while_idle: bool,
    /// Time to live in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_to_live: Option<u32>,

    // ios
    /// Canonical UUID that identifies the notification
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apns_id: Option<String>,
    /// Topic, usually the bundle ID of the app
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    /// Badge count, only attached when greater than zero
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge: Option<u32>,
    /// Sound name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sound: Option<String>,
    /// UNIX timestamp after which APNs stops trying to deliver
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry: Option<u64>,
    /// Accepted for compatibility, never retried
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<u32>,
    /// Notification category
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Safari URL arguments
    #[serde(rename = "url-args", skip_serializing_if = "Vec::is_empty")]
    pub url_args: Vec<String>,
    /// Custom top-level payload fields
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extend: Vec<Extend>,
    /// Alert dictionary
    pub alert: Alert,

    // meta
    /// Caller sequence identifiers
    #[serde(rename = "seq_id", skip_serializing_if = "Vec::is_empty")]
    pub ids: Vec<u64>,
}

impl PushRequest {
    /// Creates a [`PushRequest`] with the required fields only.
    pub fn new<T, M>(tokens: T, platform: Platform, message: M) -> Self
    where
        T: IntoIterator,
        T::Item: Into<String>,
        M: Into<String>,
    {
        Self {
            tokens: tokens.into_iter().map(Into::into).collect(),
            platform,
            message: message.into(),
            ..Default::default()
        }
    }

    /// Checks the fields every platform requires.
    pub fn validate(&self) -> Result<(), PushError> {
        if self.tokens.is_empty() {
            return Err(PushError::InvalidRequest("no device tokens".into()));
        }
        if let Some(index) = self.tokens.iter().position(|t| t.trim().is_empty()) {
            return Err(PushError::InvalidRequest(format!(
                "device token #{index} is empty"
            )));
        }
        if self.platform == Platform::Ios {
            if let Some(index) = self
                .tokens
                .iter()
                .position(|t| !t.chars().all(|c| c.is_ascii_hexdigit()))
            {
                return Err(PushError::InvalidRequest(format!(
                    "device token #{index} is not hexadecimal"
                )));
            }
        }
        if self.message.is_empty() {
            return Err(PushError::InvalidRequest("message is empty".into()));
        }
        Ok(())
    }

    /// Whether the request asks for the lowered APNs priority.
    pub fn is_normal_priority(&self) -> bool {
        self.priority.as_deref() == Some("normal")
    }
}

/// Present-but-empty strings count as absent.
pub(crate) fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "740f4707bebcf74f9b7c25d48e3358945f6aa01da5ddb387462c7eaf61bb78ad";

    #[test]
    fn t_deserialize() -> Result<(), serde_json::Error> {
        let req: PushRequest = serde_json::from_str(
            r#"{
                "tokens": ["a", "b"],
                "platform": 1,
                "message": "hello",
                "priority": "normal",
                "badge": 3,
                "url-args": ["x"],
                "extend": [{"key": "k", "val": "v"}],
                "alert": {"title-loc-key": "TITLE", "loc-args": ["1"]},
                "seq_id": [42]
            }"#,
        )?;
        assert_eq!(vec!["a", "b"], req.tokens);
        assert_eq!(Platform::Ios, req.platform);
        assert!(req.is_normal_priority());
        assert_eq!(Some(3), req.badge);
        assert_eq!(vec!["x"], req.url_args);
        assert_eq!("v", req.extend[0].value);
        assert_eq!(Some("TITLE"), req.alert.title_loc_key.as_deref());
        assert_eq!(vec!["1"], req.alert.loc_args);
        assert_eq!(vec![42], req.ids);
        Ok(())
    }

    #[test]
    fn t_platform() -> Result<(), serde_json::Error> {
        assert_eq!(Platform::Ios, serde_json::from_str("1")?);
        assert_eq!(Platform::Android, serde_json::from_str("2")?);
        assert_eq!(Platform::Other(9), serde_json::from_str("9")?);
        assert_eq!("2", serde_json::to_string(&Platform::Android)?);
        assert_eq!("platform 9", Platform::Other(9).to_string());
        Ok(())
    }

    #[test]
    fn t_validate() {
        let req = PushRequest::new([TOKEN], Platform::Ios, "message");
        assert!(req.validate().is_ok());

        // APNs tokens are hexadecimal, anything else could escape the device path
        let req = PushRequest::new(["x/../../../evil"], Platform::Ios, "message");
        assert!(matches!(req.validate(), Err(PushError::InvalidRequest(_))));
        let req = PushRequest::new(["abc?def"], Platform::Ios, "message");
        assert!(matches!(req.validate(), Err(PushError::InvalidRequest(_))));

        // other platforms use their own token formats
        let req = PushRequest::new(["fcm:token/1"], Platform::Android, "message");
        assert!(req.validate().is_ok());

        let req = PushRequest::new(Vec::<String>::new(), Platform::Ios, "message");
        assert!(matches!(req.validate(), Err(PushError::InvalidRequest(_))));

        let req = PushRequest::new([TOKEN, " "], Platform::Ios, "message");
        assert!(matches!(req.validate(), Err(PushError::InvalidRequest(_))));

        let req = PushRequest::new([TOKEN], Platform::Ios, "");
        assert!(matches!(req.validate(), Err(PushError::InvalidRequest(_))));
    }

    #[test]
    fn t_priority() {
        let mut req = PushRequest::new([TOKEN], Platform::Ios, "message");
        assert!(!req.is_normal_priority());
        req.priority = Some("high".into());
        assert!(!req.is_normal_priority());
        req.priority = Some("normal".into());
        assert!(req.is_normal_priority());
    }

    #[test]
    fn t_non_empty() {
        assert_eq!(None, non_empty(&None));
        assert_eq!(None, non_empty(&Some(String::new())));
        assert_eq!(Some("x"), non_empty(&Some("x".into())));
    }
}
