//! Sans-IO HTTP/1.x wire codec.
//!
//! This crate owns the byte-level pieces of the HTTP/1.x client protocol
//! and nothing else: method tokens, header field collections, status
//! values, line extraction from a receive buffer, status-line and
//! header-line parsing, and request-preamble serialization. There are no
//! sockets and no threads here; the session engine drives these functions
//! from its own I/O loop.
//!
//! # Parsing discipline
//!
//! Parsers never block and never consume more than one logical element.
//! When the input cannot yet be decided, they return
//! [`ParseError::Incomplete`]; the caller buffers more data and retries.
//!
//! # Example
//!
//! ```
//! use bytes::BytesMut;
//! use protocol_http1::{parse_status_line, take_line};
//!
//! let mut buf = BytesMut::from(&b"HTTP/1.1 200 OK\r\nHost: x\r\n"[..]);
//! let line = take_line(&mut buf).unwrap();
//! let status = parse_status_line(&line).unwrap();
//! assert_eq!(status.code, 200);
//! assert_eq!(status.text, "OK");
//! ```

mod codec;
mod error;
mod fields;
mod method;
mod status;

pub use codec::{Preamble, parse_field_line, parse_status_line, serialize_preamble, take_line};
pub use error::{MethodError, ParseError};
pub use fields::Fields;
pub use method::Method;
pub use status::HttpStatus;

/// HTTP protocol version spoken on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Version {
    /// HTTP/1.0
    Http10,
    /// HTTP/1.1
    #[default]
    Http11,
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Version::Http10 => f.write_str("1.0"),
            Version::Http11 => f.write_str("1.1"),
        }
    }
}
