//! Error types for HTTP/1.x wire parsing and method validation.

/// Error type for wire parsing operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// Need more data to complete parsing.
    /// This is not a fatal error - the caller should buffer more data and retry.
    #[error("incomplete data")]
    Incomplete,

    /// Invalid protocol format.
    #[error("protocol error: {0}")]
    Protocol(&'static str),
}

impl ParseError {
    /// Returns true if this error indicates more data is needed.
    #[inline]
    pub fn is_incomplete(&self) -> bool {
        matches!(self, ParseError::Incomplete)
    }
}

/// Error type for method token validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MethodError {
    /// The method token was empty.
    #[error("empty method")]
    Empty,

    /// The method token contained a byte outside the allowed token set.
    #[error("invalid character in method at offset {0}")]
    InvalidCharacter(usize),
}
