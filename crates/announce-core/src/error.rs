//! Error types for announce-core.

use thiserror::Error;

use crate::types::DraftHandle;

/// Errors that abort a single coordinator operation.
///
/// Authorization denials, unsupported content and stale decisions are not
/// errors: they resolve into a normal reply (see [`crate::Outcome`]).
#[derive(Debug, Error)]
pub enum Error {
    #[error("draft handle {0} is already pending")]
    DuplicateHandle(DraftHandle),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Failure of the recipient store.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("user directory unavailable: {0}")]
    Unavailable(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl DirectoryError {
    /// Wrap any storage error.
    pub fn unavailable(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Unavailable(err.into())
    }
}

/// Failure of a single outbound platform call.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),

    #[error("platform rejected request ({code}): {description}")]
    Api { code: i64, description: String },

    #[error("rate limited, retry after {retry_after}s")]
    RateLimited { retry_after: u64 },

    #[error("malformed platform response: {0}")]
    Malformed(String),
}

/// Result type alias for announce-core operations.
pub type Result<T> = std::result::Result<T, Error>;
