use pregen_core::HandlerKey;
use thiserror::Error;

/// Why a persisted entry could not be replayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheMiss {
    /// No entry has been written for this identity.
    Missing,
    /// The entry exists but does not parse.
    Corrupt(String),
    /// The entry is older than the revalidation window.
    Expired { age_ms: i64, window_secs: u64 },
    /// The entry recorded no terminal response.
    Empty,
}

impl std::fmt::Display for CacheMiss {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheMiss::Missing => write!(f, "missing"),
            CacheMiss::Corrupt(reason) => write!(f, "corrupt ({reason})"),
            CacheMiss::Expired {
                age_ms,
                window_secs,
            } => write!(f, "expired ({age_ms}ms old, window {window_secs}s)"),
            CacheMiss::Empty => write!(f, "no terminal response"),
        }
    }
}

/// Errors produced by the pregeneration engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A handler read request-specific data through a recorder that was not
    /// allowed to hand it out. Recovered by classifying the handler dynamic.
    #[error("{key} reads dynamic request data `{field}`")]
    ClassificationViolation { key: HandlerKey, field: String },

    /// Recovered locally by regenerating the entry.
    #[error("cache entry for {key} unusable: {reason}")]
    CacheRead { key: HandlerKey, reason: CacheMiss },

    /// The handler body returned an error or panicked.
    #[error("handler {key} failed: {message}")]
    HandlerExecution { key: HandlerKey, message: String },

    /// The platform rejected handler metadata. Fatal at startup.
    #[error("command registration failed: {0}")]
    Registration(String),

    /// A live response operation failed on the platform side.
    #[error("platform error: {0}")]
    Platform(String),

    /// The live interaction does not support the requested operation.
    #[error("unsupported operation `{operation}`: {reason}")]
    Unsupported {
        operation: &'static str,
        reason: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Short error code for log correlation.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::ClassificationViolation { .. } => "CLASSIFICATION_VIOLATION",
            EngineError::CacheRead { .. } => "CACHE_READ_FAILURE",
            EngineError::HandlerExecution { .. } => "HANDLER_EXECUTION_FAILURE",
            EngineError::Registration(_) => "REGISTRATION_FAILURE",
            EngineError::Platform(_) => "PLATFORM_ERROR",
            EngineError::Unsupported { .. } => "UNSUPPORTED",
            EngineError::Serialization(_) => "SERIALIZATION_ERROR",
            EngineError::Io(_) => "IO_ERROR",
        }
    }

    pub fn is_classification_violation(&self) -> bool {
        matches!(self, EngineError::ClassificationViolation { .. })
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
