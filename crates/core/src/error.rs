//! Unified error types for pagemirror.
//!
//! Remote failures, storage failures and admin input problems share one enum so
//! the proxy, the sync engine and the REST surface can each decide how to
//! degrade. The upper-case prefix in each message is stable and safe to log.

use tokio_rusqlite::rusqlite;

/// Unified error types for pagemirror.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No response was received (network failure, timeout).
    #[error("TRANSPORT_FAILURE: {0}")]
    Transport(String),

    /// The remote platform answered with a 5xx status.
    #[error("SERVER_ERROR: status {0}")]
    Server(u16),

    /// The remote platform answered with a 4xx status other than 401/403/404.
    #[error("CLIENT_ERROR: status {0}")]
    Client(u16),

    /// The remote platform answered 404.
    #[error("NOT_FOUND: {0}")]
    NotFound(String),

    /// The remote platform rejected our credentials, or we hold none.
    #[error("AUTH_ERROR: {0}")]
    Auth(String),

    /// The remote platform sent a payload we could not decode.
    #[error("INVALID_RESPONSE: {0}")]
    InvalidResponse(String),

    /// Database operation failed.
    #[error("STORAGE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("STORAGE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// A stored row could not be decoded.
    #[error("STORAGE_ERROR: invalid stored data: {0}")]
    InvalidData(String),

    /// A local slug is already taken.
    #[error("CONFLICT: {0}")]
    Conflict(String),

    /// Malformed admin input.
    #[error("VALIDATION_ERROR: {0}")]
    Validation(String),

    /// A sync run is already in flight.
    #[error("SYNC_IN_PROGRESS")]
    SyncInProgress,
}

impl Error {
    /// Whether this error came from the persistence layer.
    pub fn is_storage(&self) -> bool {
        matches!(self, Error::Database(_) | Error::MigrationFailed(_) | Error::InvalidData(_))
    }

    /// Whether this error describes a failed exchange with the remote platform.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Error::Transport(_) | Error::Server(_) | Error::Client(_) | Error::NotFound(_) | Error::InvalidResponse(_)
        )
    }

    /// Whether a write was rejected by a uniqueness or other table constraint.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            Error::Database(tokio_rusqlite::Error::Error(rusqlite::Error::SqliteFailure(e, _)))
                if e.code == rusqlite::ErrorCode::ConstraintViolation
        )
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}
