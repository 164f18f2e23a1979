//! Error taxonomy for trust-manager
//!
//! Kinds map directly onto the `Synced=False` reason classifier used by the
//! reconciler loop: `NotFound` -> `SourceNotFound`, `InvalidPem` ->
//! `InvalidPEM`, `InvalidSecret` -> `InvalidSecret`, `DefaultCaUnavailable`
//! -> `DefaultCAUnavailable`. `Conflict` and `Transient` are retried rather
//! than surfaced as a permanent condition.

use std::fmt;

/// Result type used throughout trust-manager
pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds produced by the bundle assembler, synchronizer, and encoders
#[derive(Debug)]
pub enum Error {
    /// A named source was missing, a selector matched nothing and no other
    /// source contributed, or an explicit key was absent
    NotFound(String),
    /// Malformed PEM input, non-CERTIFICATE block, PEM headers present, or
    /// X.509 parse failure
    InvalidPem(String),
    /// Wildcard key applied to a `kubernetes.io/tls` typed Secret
    InvalidSecret(String),
    /// System default-CA provider requested but no package was loaded
    DefaultCaUnavailable,
    /// Field-ownership conflict on server-side apply
    Conflict(String),
    /// Any other I/O failure, retried by the rate-limited requeue
    Transient(String),
    /// PKCS#12/JKS-compatible trust-store encoding failure
    Encode(String),
    /// Bundle spec failed structural validation
    Validation(String),
    /// Kubernetes API error not otherwise classified
    Kube(String),
    /// Finalizer bookkeeping error from kube-runtime
    Finalizer(Box<kube::runtime::finalizer::Error<Error>>),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotFound(msg) => write!(f, "not found: {}", msg),
            Error::InvalidPem(msg) => write!(f, "invalid PEM: {}", msg),
            Error::InvalidSecret(msg) => write!(f, "invalid secret: {}", msg),
            Error::DefaultCaUnavailable => {
                write!(f, "default CA provider requested but no package is loaded")
            }
            Error::Conflict(msg) => write!(f, "field-ownership conflict: {}", msg),
            Error::Transient(msg) => write!(f, "transient error: {}", msg),
            Error::Encode(msg) => write!(f, "trust-store encoding failed: {}", msg),
            Error::Validation(msg) => write!(f, "validation error: {}", msg),
            Error::Kube(msg) => write!(f, "Kubernetes API error: {}", msg),
            Error::Finalizer(e) => write!(f, "finalizer error: {}", e),
        }
    }
}

impl std::error::Error for Error {}

impl From<kube::runtime::finalizer::Error<Error>> for Error {
    fn from(err: kube::runtime::finalizer::Error<Error>) -> Self {
        Error::Finalizer(Box::new(err))
    }
}

impl From<kube::Error> for Error {
    fn from(err: kube::Error) -> Self {
        match &err {
            kube::Error::Api(resp) if resp.code == 404 => Error::NotFound(resp.message.clone()),
            kube::Error::Api(resp) if resp.code == 409 => Error::Conflict(resp.message.clone()),
            other => Error::Kube(other.to_string()),
        }
    }
}

/// Condition reason strings surfaced on `status.conditions[Synced]`
pub mod reason {
    pub const SOURCE_NOT_FOUND: &str = "SourceNotFound";
    pub const INVALID_PEM: &str = "InvalidPEM";
    pub const INVALID_SECRET: &str = "InvalidSecret";
    pub const DEFAULT_CA_UNAVAILABLE: &str = "DefaultCAUnavailable";
    pub const SECRET_TARGETS_DISABLED: &str = "SecretTargetsDisabled";
    pub const RECONCILE_ERROR: &str = "ReconcileError";
    pub const SYNCED: &str = "Synced";
}

impl Error {
    /// Classify this error into a `Synced=False` reason, or `None` when the
    /// error should be retried without surfacing a permanent condition.
    pub fn synced_false_reason(&self) -> &'static str {
        match self {
            Error::NotFound(_) => reason::SOURCE_NOT_FOUND,
            Error::InvalidPem(_) => reason::INVALID_PEM,
            Error::InvalidSecret(_) => reason::INVALID_SECRET,
            Error::DefaultCaUnavailable => reason::DEFAULT_CA_UNAVAILABLE,
            Error::Validation(_) => reason::INVALID_PEM,
            _ => reason::RECONCILE_ERROR,
        }
    }
}
