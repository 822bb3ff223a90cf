//! Unified error types for the webstash cache.
//!
//! Every backend surfaces failures through this one taxonomy so callers can
//! branch on the category without knowing which backend is active.

use rmcp::model::{ErrorCode, ErrorData as McpError};
use tokio_rusqlite::rusqlite;

/// Unified error type for all storage backends.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Read or delete target does not exist, or has expired.
    #[error("NOT_FOUND: {0}")]
    NotFound(String),

    /// Operation not implemented by the active backend.
    #[error("UNSUPPORTED: {op} is not supported by the {backend} backend")]
    Unsupported { backend: &'static str, op: &'static str },

    /// A URI that does not match the active backend's expected shape.
    #[error("INVALID_URI: {0}")]
    InvalidUri(String),

    /// Invalid input parameters (e.g., empty URL, extracted variant without a prompt).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// The underlying store could not be reached. Callers may retry; the
    /// cache itself never does.
    #[error("BACKEND_UNAVAILABLE: {0}")]
    Unavailable(String),

    /// SQLite operation failed.
    #[error("STORAGE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Filesystem backend I/O failure.
    #[error("STORAGE_ERROR: {0}")]
    Io(#[from] std::io::Error),

    /// Record file or remote payload could not be decoded.
    #[error("STORAGE_ERROR: decode failed: {0}")]
    Decode(String),

    /// Migration failed to apply.
    #[error("STORAGE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// Remote service responded with a non-2xx status other than 404.
    #[error("REMOTE_HTTP_ERROR: {status}")]
    Http { status: u16 },

    /// Configuration prevented backend construction.
    #[error("CONFIG_ERROR: {0}")]
    Config(String),
}

impl Error {
    /// Shorthand for the capability-gap error of read-only backends.
    pub fn unsupported(backend: &'static str, op: &'static str) -> Self {
        Error::Unsupported { backend, op }
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

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let (code, message) = match &err {
            Error::InvalidInput(msg) => (-32602, msg.clone()),
            Error::NotFound(msg) => (-32001, msg.clone()),
            Error::Unsupported { .. } => (-32004, err.to_string()),
            Error::InvalidUri(msg) => (-32003, msg.clone()),
            Error::Unavailable(msg) => (-32005, msg.clone()),
            Error::Http { status } => (-32006, format!("remote returned HTTP {status}")),
            Error::Database(e) => (-32002, e.to_string()),
            Error::Io(e) => (-32002, e.to_string()),
            Error::Decode(msg) => (-32002, msg.clone()),
            Error::MigrationFailed(msg) => (-32002, msg.clone()),
            Error::Config(msg) => (-32007, msg.clone()),
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::NotFound("memory://raw/example_com_1".to_string());
        assert!(err.to_string().contains("NOT_FOUND"));
        assert!(err.to_string().contains("example_com"));
    }

    #[test]
    fn test_unsupported_display() {
        let err = Error::unsupported("remote", "write");
        assert!(err.to_string().contains("write"));
        assert!(err.to_string().contains("remote"));
    }

    #[test]
    fn test_error_to_mcp_error() {
        let err = Error::NotFound("abc".to_string());
        let mcp_err: McpError = err.into();
        assert_eq!(mcp_err.code.0, -32001);

        let err = Error::unsupported("remote", "delete");
        let mcp_err: McpError = err.into();
        assert_eq!(mcp_err.code.0, -32004);
    }
}
