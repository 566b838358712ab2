//! Errors produced by the HTTP client.

use protocol_http1::MethodError;

/// Errors produced by the HTTP client.
///
/// Errors are `Clone` because a terminal failure is recorded once in a
/// result handle and then observed by every reader of that handle; for
/// the same reason the I/O-flavored variants carry their context as a
/// message rather than an `io::Error` payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The URL could not be parsed.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// The URL scheme is not `http` or `https`.
    #[error("unsupported protocol: {0}")]
    UnsupportedProtocol(String),

    /// Method token validation failed.
    #[error(transparent)]
    Method(#[from] MethodError),

    /// Host name resolution failed.
    #[error("hostname error: {0}")]
    Hostname(String),

    /// Connect failure, mid-stream read failure, unexpected close, or a
    /// short read against `Content-Length`.
    #[error("network error: {0}")]
    Network(String),

    /// Malformed framing, decompression failure, or an unimplemented
    /// transfer coding.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Thread or wakeup-fd creation failed, or the session is gone.
    #[error("system error: {0}")]
    System(String),

    /// The request was cancelled.
    #[error("request was canceled")]
    Canceled,
}

/// Convenience result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;
