#![deny(
    missing_docs,
    missing_debug_implementations,
    missing_copy_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code,
    unstable_features,
    unused_import_braces,
    unused_qualifications
)]

//! Pushgate turns a push request into APNs notifications, one per device token,
//! and sends them through a cached, certificate-authenticated client.
//!
//! ```no_run
//! use pushgate::{ApnsConfig, Dispatcher, Environment, Platform, PushRequest};
//!
//! let dispatcher = Dispatcher::from_config(ApnsConfig {
//!     certificate: "./key.pem".into(),
//!     environment: Environment::Production,
//!     ..Default::default()
//! });
//! let mut req = PushRequest::new(["740f4707bebcf74f"], Platform::Ios, "hello");
//! req.topic = Some("com.example.app".into());
//! let report = dispatcher.dispatch(&req)?;
//! assert!(report.is_success());
//! # Ok::<(), pushgate::PushError>(())
//! ```

use thiserror::Error;

pub use apns::{ApnsClient, Environment, Response, Transport, TransportError};
pub use credential::{ApnsConfig, Certificate, ClientCache, Connector, CredentialError};
pub use dispatch::{
    build_notification, send_android, send_ios, Dispatcher, FailureMode, Report, TokenOutcome,
    TokenReport,
};
pub use payload::{Notification, Payload, Priority};
pub use request::{Alert, Extend, Platform, PushRequest};

mod apns;
mod credential;
mod dispatch;
mod payload;
mod request;

/// Dispatch error. Per-token failures are in the [`Report`] instead.
#[derive(Error, Debug)]
pub enum PushError {
    /// The request misses a required field.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// The platform tag is neither iOS nor Android.
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(i64),
    /// The platform is known but has no sender yet.
    #[error("{0} is not implemented yet")]
    NotImplemented(Platform),
    /// Wrapped [`crate::CredentialError`].
    #[error("credential error: {0}")]
    Credential(#[from] CredentialError),
}
