//! Persistence layer error types

use leaderboard_domain::DomainError;
use thiserror::Error;

/// Coarse failure classes handed to callers of the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Connection or transport failure. Safe to retry with backoff.
    StoreUnavailable,
    /// The store refused or aborted the operation. Not retried.
    StoreRejected,
    /// The requested leaderboard window does not exist.
    UnsupportedWindow,
    /// Caller input rejected before touching the store.
    Validation,
}

/// Persistence layer errors
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Store connection failed: {0}")]
    Connect(String),

    #[error("Store transport error: {0}")]
    Transport(String),

    #[error("Connection pool exhausted after waiting {timeout_ms}ms")]
    PoolExhausted { timeout_ms: u64 },

    #[error("Store operation timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Store rejected operation: {0}")]
    Rejected(String),

    #[error("Unexpected store reply: {0}")]
    UnexpectedReply(String),

    #[error("Unsupported leaderboard window: '{0}'")]
    UnsupportedWindow(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl PersistenceError {
    /// Failure class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connect(_)
            | Self::Transport(_)
            | Self::PoolExhausted { .. }
            | Self::Timeout { .. } => ErrorKind::StoreUnavailable,
            Self::Rejected(_) | Self::UnexpectedReply(_) => ErrorKind::StoreRejected,
            Self::UnsupportedWindow(_) => ErrorKind::UnsupportedWindow,
            Self::InvalidInput(_) => ErrorKind::Validation,
        }
    }

    /// Whether the caller may retry. Increments are not idempotent, so a
    /// retry after an ambiguous transport failure can double-count.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::StoreUnavailable
    }

    /// The connection that produced this error can no longer be trusted.
    pub(crate) fn poisons_connection(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout { .. })
    }
}

impl From<DomainError> for PersistenceError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::UnknownWindow(window) => Self::UnsupportedWindow(window),
            DomainError::MissingField(field) => {
                Self::InvalidInput(format!("missing required field: {field}"))
            }
        }
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for PersistenceError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error()
            || err.is_connection_dropped()
            || err.is_connection_refusal()
            || err.is_timeout()
        {
            Self::Transport(err.to_string())
        } else {
            Self::Rejected(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, PersistenceError>;
