use std::sync::Arc;

use log::{error, info, warn};
use serde::ser::SerializeStruct as _;
use serde::{Serialize, Serializer};

use crate::apns::Transport;
use crate::credential::{ApnsConfig, ClientCache, Connector};
use crate::payload::{Notification, Payload, Priority};
use crate::request::{non_empty, Platform, PushRequest};
use crate::PushError;

/// What happens to the rest of a batch after a transport error.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum FailureMode {
    /// Stop at the first transport error, remaining tokens are skipped (default)
    #[default]
    Abort,
    /// Try every token regardless
    Continue,
}

/// Result of one device token.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TokenOutcome {
    /// Accepted by the gateway
    Sent {
        /// `apns-id` echoed by the gateway
        apns_id: Option<String>,
    },
    /// Refused by the gateway, e.g. unregistered token
    Rejected {
        /// HTTP status code
        status_code: u16,
        /// Reason given by the gateway
        reason: Option<String>,
    },
    /// The transport failed
    Failed {
        /// Error message
        error: String,
    },
    /// Never attempted because an earlier token failed
    Skipped,
}

/// One device token and its outcome.
#[derive(Clone, Debug, Serialize)]
pub struct TokenReport {
    /// Device token
    pub token: String,
    /// Outcome
    #[serde(flatten)]
    pub outcome: TokenOutcome,
}

/// Per-token outcomes of one dispatch, in token order.
///
/// Serializes with the counts next to the outcomes.
#[derive(Clone, Debug, Default)]
pub struct Report {
    /// Outcomes
    pub tokens: Vec<TokenReport>,
}

impl Report {
    fn record<T: Into<String>>(&mut self, token: T, outcome: TokenOutcome) {
        self.tokens.push(TokenReport {
            token: token.into(),
            outcome,
        });
    }

    fn count(&self, f: impl Fn(&TokenOutcome) -> bool) -> usize {
        self.tokens.iter().filter(|t| f(&t.outcome)).count()
    }

    /// Number of accepted tokens.
    pub fn sent(&self) -> usize {
        self.count(|o| matches!(o, TokenOutcome::Sent { .. }))
    }

    /// Number of tokens refused by the gateway.
    pub fn rejected(&self) -> usize {
        self.count(|o| matches!(o, TokenOutcome::Rejected { .. }))
    }

    /// Number of tokens whose transport failed.
    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, TokenOutcome::Failed { .. }))
    }

    /// Number of tokens never attempted.
    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, TokenOutcome::Skipped))
    }

    /// True when no transport error happened and every token was attempted.
    ///
    /// Gateway rejections do not count as failures.
    pub fn is_success(&self) -> bool {
        self.failed() == 0 && self.skipped() == 0
    }
}

impl Serialize for Report {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Report", 6)?;
        state.serialize_field("success", &self.is_success())?;
        state.serialize_field("sent", &self.sent())?;
        state.serialize_field("rejected", &self.rejected())?;
        state.serialize_field("failed", &self.failed())?;
        state.serialize_field("skipped", &self.skipped())?;
        state.serialize_field("tokens", &self.tokens)?;
        state.end()
    }
}

/// Builds the APNs envelope and payload for one device token.
pub fn build_notification(req: &PushRequest, token: &str) -> Notification {
    let mut payload = Payload::new(req.message.as_str());

    if let Some(badge) = req.badge.filter(|b| *b > 0) {
        payload.badge(badge);
    }
    if let Some(sound) = non_empty(&req.sound) {
        payload.sound(sound);
    }
    if req.content_available {
        payload.content_available();
    }
    for extend in &req.extend {
        payload.custom(extend.key.as_str(), extend.value.as_str());
    }

    // alert dictionary
    let alert = &req.alert;
    if let Some(title) = non_empty(&alert.title) {
        payload.alert_title(title);
    }
    if let Some(key) = non_empty(&alert.title_loc_key) {
        payload.alert_title_loc_key(key);
    }
    if !alert.title_loc_args.is_empty() {
        payload.alert_title_loc_args(alert.title_loc_args.clone());
    }
    if let Some(body) = non_empty(&alert.body) {
        payload.alert_body(body);
    }
    if let Some(image) = non_empty(&alert.launch_image) {
        payload.alert_launch_image(image);
    }
    if let Some(key) = non_empty(&alert.loc_key) {
        payload.alert_loc_key(key);
    }
    if !alert.loc_args.is_empty() {
        payload.alert_loc_args(alert.loc_args.clone());
    }
    if let Some(action) = non_empty(&alert.action) {
        payload.alert_action(action);
    }
    if let Some(key) = non_empty(&alert.action_loc_key) {
        payload.alert_action_loc_key(key);
    }

    // general
    if let Some(category) = non_empty(&req.category) {
        payload.category(category);
    }
    if !req.url_args.is_empty() {
        payload.url_args(req.url_args.clone());
    }

    let mut notification = Notification::new(token, payload);
    notification.apns_id = non_empty(&req.apns_id).map(String::from);
    notification.topic = non_empty(&req.topic).map(String::from);
    if req.is_normal_priority() {
        notification.priority = Priority::Low;
    }
    notification.expiration = req.expiry.filter(|e| *e > 0);
    notification
}

/// Sends the request to every device token through `transport`, one at a time.
pub fn send_ios(req: &PushRequest, transport: &dyn Transport, mode: FailureMode) -> Report {
    let mut report = Report::default();
    let mut tokens = req.tokens.iter();

    for token in tokens.by_ref() {
        let notification = build_notification(req, token);
        match transport.push(&notification) {
            Ok(res) if res.sent() => {
                info!("APNs ID: {}", res.apns_id.as_deref().unwrap_or("-"));
                report.record(token.as_str(), TokenOutcome::Sent { apns_id: res.apns_id });
            }
            Ok(res) => {
                warn!(
                    "APNs rejected {token}: {} {}",
                    res.status_code,
                    res.reason.as_deref().unwrap_or("-")
                );
                report.record(
                    token.as_str(),
                    TokenOutcome::Rejected {
                        status_code: res.status_code,
                        reason: res.reason,
                    },
                );
            }
            Err(e) => {
                error!("failed to push to {token}: {e}");
                report.record(token.as_str(), TokenOutcome::Failed { error: e.to_string() });
                if mode == FailureMode::Abort {
                    break;
                }
            }
        }
    }

    for token in tokens {
        report.record(token.as_str(), TokenOutcome::Skipped);
    }
    report
}

/// Android is not supported yet, nothing is sent.
pub fn send_android(_req: &PushRequest) -> Result<Report, PushError> {
    Err(PushError::NotImplemented(Platform::Android))
}

/// Routes a [`PushRequest`] to the sender of its platform.
///
/// ```no_run
/// # use pushgate::{Dispatcher, Platform, PushRequest};
/// let dispatcher = Dispatcher::default();
/// let req = PushRequest::new(["740f4707bebcf74f"], Platform::Ios, "hello");
/// dispatcher.push(&req);
/// ```
#[derive(Debug)]
pub struct Dispatcher {
    connector: Arc<dyn Connector>,
    /// What happens after a transport error
    pub mode: FailureMode,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::from_config(ApnsConfig::default())
    }
}

impl Dispatcher {
    /// Creates a [`Dispatcher`] that obtains its transport from `connector`.
    pub fn new<C: Connector + 'static>(connector: C) -> Self {
        Self {
            connector: Arc::new(connector),
            mode: FailureMode::default(),
        }
    }

    /// Creates a [`Dispatcher`] backed by a [`ClientCache`].
    pub fn from_config(config: ApnsConfig) -> Self {
        Self::new(ClientCache::new(config))
    }

    /// Dispatches the request and reports every token.
    pub fn dispatch(&self, req: &PushRequest) -> Result<Report, PushError> {
        req.validate()?;
        match req.platform {
            Platform::Ios => {
                let transport = self.connector.connect()?;
                Ok(send_ios(req, transport.as_ref(), self.mode))
            }
            Platform::Android => send_android(req),
            Platform::Other(n) => Err(PushError::UnsupportedPlatform(n)),
        }
    }

    /// Dispatches the request and tells whether every token went through.
    pub fn push(&self, req: &PushRequest) -> bool {
        match self.dispatch(req) {
            Ok(report) => {
                info!(
                    "{} sent, {} rejected, {} failed, {} skipped",
                    report.sent(),
                    report.rejected(),
                    report.failed(),
                    report.skipped()
                );
                report.is_success()
            }
            Err(e) => {
                warn!("dispatch to {} failed: {e}", req.platform);
                false
            }
        }
    }
}
