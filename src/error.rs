//! Error taxonomy for the adaptive streaming engine (spec §7).
//!
//! Mirrors the shape of the teacher crate's `DashMpdError`: one enum, one
//! variant per failure family, `thiserror` messages, `#[from]` conversions
//! at the edges. Transient conditions travel as [`Warning`] on the same
//! stream as successful results; only [`EngineError`] values that make the
//! presentation unable to progress tear down a load.

use std::fmt;

/// Stable error taxonomy, per spec §7.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("network: {0}")]
    Network(#[from] NetworkError),

    #[error("manifest: {0}")]
    Manifest(#[from] ManifestError),

    #[error("segment index: {0}")]
    Index(#[from] IndexError),

    #[error("integrity: {0}")]
    Integrity(#[from] IntegrityError),

    #[error("media: {0}")]
    Media(#[from] MediaError),

    #[error("drm: {0}")]
    Drm(#[from] DrmError),

    #[error("other: {0}")]
    Other(String),

    #[error("cancelled")]
    Cancellation,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum NetworkError {
    #[error("request timed out")]
    Timeout,
    #[error("request aborted")]
    Aborted,
    #[error("http status {0}")]
    Http(u16),
    #[error("network error: {0}")]
    Other(String),
}

impl NetworkError {
    /// Retryable unless the caller cancelled, or a 4xx status other than
    /// 408 (Request Timeout) / 429 (Too Many Requests) was returned.
    pub fn is_retryable(&self) -> bool {
        match self {
            NetworkError::Timeout | NetworkError::Other(_) => true,
            NetworkError::Aborted => false,
            NetworkError::Http(status) => {
                *status == 408 || *status == 429 || !(400..500).contains(status)
            }
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ManifestError {
    #[error("could not parse manifest: {0}")]
    Parse(String),
    #[error("unsupported manifest feature: {0}")]
    Unsupported(String),
    #[error("manifest refresh failed: {0}")]
    RefreshFailed(String),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum IndexError {
    #[error("segment index not yet initialized")]
    NotInitialized,
    #[error("segment index out of sync with server")]
    OutOfSync,
    #[error("discontinuity encountered at {0}")]
    DiscontinuityEncountered(f64),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum IntegrityError {
    #[error("malformed mp4 box structure: {0}")]
    Mp4Malformed(String),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum MediaError {
    #[error("starting time not found")]
    StartingTimeNotFound,
    #[error("media buffer full")]
    BufferFull,
    #[error("codec not supported: {0}")]
    CodecNotSupported(String),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum DrmError {
    #[error("key load failed: {0}")]
    KeyLoad(String),
    #[error("key status error: {0}")]
    KeyStatus(String),
    #[error("key update failed: {0}")]
    KeyUpdate(String),
    #[error("key error: {0}")]
    KeyError(String),
    #[error("no DRM support available")]
    NoSupport,
}

/// A non-fatal condition surfaced alongside results, per spec §7 "Propagation".
#[derive(Debug, Clone)]
pub struct Warning {
    pub message: String,
    pub source: Option<EngineErrorKind>,
}

impl Warning {
    pub fn new(message: impl Into<String>) -> Self {
        Warning { message: message.into(), source: None }
    }

    pub fn from_error(err: &EngineError) -> Self {
        Warning { message: err.to_string(), source: Some(EngineErrorKind::of(err)) }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Coarse classification used by callers that only care about the family of
/// error without matching on its full contents (e.g. the ABR estimator,
/// which "consumes warnings only for accounting").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineErrorKind {
    Network,
    Manifest,
    Index,
    Integrity,
    Media,
    Drm,
    Other,
}

impl EngineErrorKind {
    pub fn of(err: &EngineError) -> Self {
        match err {
            EngineError::Network(_) => EngineErrorKind::Network,
            EngineError::Manifest(_) => EngineErrorKind::Manifest,
            EngineError::Index(_) => EngineErrorKind::Index,
            EngineError::Integrity(_) => EngineErrorKind::Integrity,
            EngineError::Media(_) => EngineErrorKind::Media,
            EngineError::Drm(_) => EngineErrorKind::Drm,
            EngineError::Other(_) | EngineError::Cancellation => EngineErrorKind::Other,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
