//! Essential enumerations and value types shared by both cache tiers
//!
//! The error enum carries owned string payloads rather than source errors so that
//! it stays `Clone` and can be logged from detached cleaner threads.

/// Cache operation error types
///
/// Every fallible operation in the crate reports one of these. Corrupt records found
/// during lookups are repaired in place and never reach callers as errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CacheOperationError {
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Deserialization error: {0}")]
    DeserializationError(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("Data corruption: {0}")]
    Corruption(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),
}

impl CacheOperationError {
    /// Create serialization error
    #[inline(always)]
    pub fn serialization_failed(msg: impl Into<String>) -> Self {
        Self::SerializationError(msg.into())
    }

    /// Create deserialization error
    #[inline(always)]
    pub fn deserialization_failed(msg: impl Into<String>) -> Self {
        Self::DeserializationError(msg.into())
    }

    /// Create IO error
    #[inline(always)]
    pub fn io_failed(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    /// Create corruption error for unreadable records
    #[inline(always)]
    pub fn corrupted(msg: impl Into<String>) -> Self {
        Self::Corruption(msg.into())
    }

    pub fn initialization_failed(msg: impl Into<String>) -> Self {
        Self::InitializationFailed(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}

impl From<std::io::Error> for CacheOperationError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof => Self::Corruption(err.to_string()),
            _ => Self::Io(err.to_string()),
        }
    }
}

impl From<bincode::error::EncodeError> for CacheOperationError {
    fn from(err: bincode::error::EncodeError) -> Self {
        Self::SerializationError(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for CacheOperationError {
    fn from(err: bincode::error::DecodeError) -> Self {
        Self::DeserializationError(err.to_string())
    }
}

impl From<serde_json::Error> for CacheOperationError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_io() {
            Self::Io(err.to_string())
        } else {
            Self::SerializationError(err.to_string())
        }
    }
}

/// Convenience alias used across the crate
pub type CacheResult<T> = Result<T, CacheOperationError>;
