use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use moka::sync::Cache;
use reqwest::Identity;
use thiserror::Error;
use x509_parser::pem::Pem;
use x509_parser::time::ASN1Time;

use crate::apns::{ApnsClient, Environment, Transport};

const DEFAULT_CERTIFICATE: &str = "./key.pem";
const DEFAULT_TIMEOUT: u64 = 30;

/// Credential error. None of them is recovered from.
#[derive(Error, Debug)]
pub enum CredentialError {
    /// IO error while reading the certificate file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// The file is not valid PEM.
    #[error("PEM error: {0}")]
    Pem(String),
    /// No `CERTIFICATE` block in the file.
    #[error("no certificate found")]
    MissingCertificate,
    /// The certificate block is not a valid X.509 certificate.
    #[error("X.509 error: {0}")]
    X509(String),
    /// The certificate is outside of its validity period.
    #[error("certificate is not valid now: {0}")]
    Expired(String),
    /// Certificate and private key could not be turned into a TLS identity.
    #[error("identity error: {0}")]
    Identity(reqwest::Error),
    /// The HTTP client could not be built.
    #[error("client error: {0}")]
    Client(reqwest::Error),
}

/// APNs client certificate: a PEM file holding the certificate and its unencrypted private key.
pub struct Certificate {
    subject: String,
    not_after: ASN1Time,
    identity: Identity,
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("subject", &self.subject)
            .field("not_after", &self.not_after)
            .finish_non_exhaustive()
    }
}

impl Certificate {
    /// Loads a [`Certificate`] from path.
    pub fn from_pem_file<T: AsRef<Path>>(path: T) -> Result<Self, CredentialError> {
        let buffer = fs::read(path.as_ref())?;
        Self::from_pem(&buffer)
    }

    /// Loads a [`Certificate`] from PEM content.
    ///
    /// The first certificate must parse and be valid at this moment.
    pub fn from_pem(buffer: &[u8]) -> Result<Self, CredentialError> {
        let mut found = None;
        for pem in Pem::iter_from_buffer(buffer) {
            let pem = pem.map_err(|e| CredentialError::Pem(format!("{e:?}")))?;
            if pem.label != "CERTIFICATE" {
                continue;
            }
            let x509 = pem
                .parse_x509()
                .map_err(|e| CredentialError::X509(e.to_string()))?;
            if !x509.validity().is_valid() {
                return Err(CredentialError::Expired(x509.subject().to_string()));
            }
            found = Some((x509.subject().to_string(), x509.validity().not_after));
            break;
        }
        let (subject, not_after) = found.ok_or(CredentialError::MissingCertificate)?;
        let identity = Identity::from_pem(buffer).map_err(CredentialError::Identity)?;
        Ok(Self {
            subject,
            not_after,
            identity,
        })
    }

    /// Subject of the certificate e.g. `CN=Apple Push Services: com.example.app`.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// End of the validity period as UNIX timestamp.
    pub fn not_after(&self) -> i64 {
        self.not_after.timestamp()
    }

    pub(crate) fn into_identity(self) -> Identity {
        self.identity
    }
}

/// Hands out a [`Transport`] for each dispatch.
pub trait Connector: fmt::Debug + Send + Sync {
    /// Returns a ready transport, or why none can be built.
    fn connect(&self) -> Result<Arc<dyn Transport>, CredentialError>;
}

/// APNs client configuration.
#[derive(Clone, Debug)]
pub struct ApnsConfig {
    /// Path to the PEM certificate
    pub certificate: PathBuf,
    /// Gateway environment
    pub environment: Environment,
    /// Timeout of each request
    pub timeout: Duration,
}

impl Default for ApnsConfig {
    fn default() -> Self {
        Self {
            certificate: PathBuf::from(DEFAULT_CERTIFICATE),
            environment: Environment::default(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT),
        }
    }
}

#[derive(Clone, Debug)]
struct CachedClient {
    pem: Arc<[u8]>,
    not_after: ASN1Time,
    client: Arc<ApnsClient>,
}

impl CachedClient {
    fn expired(&self) -> bool {
        ASN1Time::now() > self.not_after
    }
}

/// Process-wide cache of the APNs client.
///
/// The client is built once and reused until the content of the certificate
/// file changes or the certificate expires. A certificate that fails to load is
/// never turned into a client: the cached entry is dropped and the error is
/// returned.
pub struct ClientCache {
    config: ApnsConfig,
    cache: Cache<PathBuf, CachedClient>,
}

impl fmt::Debug for ClientCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCache")
            .field("config", &self.config)
            .field("entries", &self.cache.entry_count())
            .finish()
    }
}

impl ClientCache {
    /// Creates an empty [`ClientCache`].
    pub fn new(config: ApnsConfig) -> Self {
        Self {
            config,
            cache: Cache::new(4),
        }
    }

    /// Drops the cached client, the next [`Connector::connect`] reloads the certificate.
    pub fn invalidate(&self) {
        self.cache.invalidate(&self.config.certificate);
    }

    /// Configuration of the cache.
    pub fn config(&self) -> &ApnsConfig {
        &self.config
    }

    fn load(&self, pem: Vec<u8>) -> Result<CachedClient, CredentialError> {
        let path = &self.config.certificate;
        let certificate = Certificate::from_pem(&pem)?;
        info!("load certificate {} from {path:?}", certificate.subject());
        let not_after = certificate.not_after;
        let client = ApnsClient::new(
            certificate,
            self.config.environment,
            self.config.timeout,
        )
        .map_err(CredentialError::Client)?;
        Ok(CachedClient {
            pem: pem.into(),
            not_after,
            client: Arc::new(client),
        })
    }
}

impl Connector for ClientCache {
    fn connect(&self) -> Result<Arc<dyn Transport>, CredentialError> {
        let path = &self.config.certificate;

        // compared by content, a rotation may keep the mtime
        let pem = match fs::read(path) {
            Ok(pem) => pem,
            Err(e) => {
                self.invalidate();
                error!("failed to read certificate {path:?}: {e}");
                return Err(e.into());
            }
        };

        if let Some(cached) = self.cache.get(path) {
            if *cached.pem != *pem {
                info!("certificate {path:?} rotated, reload");
            } else if cached.expired() {
                warn!("certificate {path:?} expired, reload");
            } else {
                debug!("APNs client found in cache for {path:?}");
                return Ok(cached.client);
            }
        }

        match self.load(pem) {
            Ok(cached) => {
                let client = cached.client.clone();
                self.cache.insert(path.clone(), cached);
                Ok(client)
            }
            Err(e) => {
                self.invalidate();
                error!("failed to load certificate {path:?}: {e}");
                Err(e)
            }
        }
    }
}
