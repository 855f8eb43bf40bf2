//! Classified remote call failures.

use pagemirror_core::Error;

use super::transport::RemoteResponse;

/// Why a remote call did not succeed.
///
/// Status-bearing variants keep the upstream response so callers can still
/// use it (a remote 404 page is rendered as-is, for instance).
#[derive(Debug, Clone, thiserror::Error)]
pub enum RemoteError {
    /// No response was received.
    #[error("transport failure: {0}")]
    Transport(String),

    /// 5xx.
    #[error("server error: status {}", .0.status.as_u16())]
    Server(RemoteResponse),

    /// 404.
    #[error("not found")]
    NotFound(RemoteResponse),

    /// 401 or 403.
    #[error("authentication rejected: status {}", .0.status.as_u16())]
    Auth(RemoteResponse),

    /// Any other 4xx.
    #[error("client error: status {}", .0.status.as_u16())]
    Client(RemoteResponse),
}

impl RemoteError {
    pub fn is_server(&self) -> bool {
        matches!(self, RemoteError::Server(_))
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, RemoteError::Auth(_))
    }

    /// The upstream response, when one was received.
    pub fn response(&self) -> Option<&RemoteResponse> {
        match self {
            RemoteError::Transport(_) => None,
            RemoteError::Server(r) | RemoteError::NotFound(r) | RemoteError::Auth(r) | RemoteError::Client(r) => {
                Some(r)
            }
        }
    }
}

impl From<RemoteError> for Error {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Transport(msg) => Error::Transport(msg),
            RemoteError::Server(r) => Error::Server(r.status.as_u16()),
            RemoteError::NotFound(r) => Error::NotFound(r.url.clone()),
            RemoteError::Auth(r) => {
                Error::Auth(format!("remote rejected credentials with status {}", r.status.as_u16()))
            }
            RemoteError::Client(r) => Error::Client(r.status.as_u16()),
        }
    }
}
