//! Request serialization and response line parsing.
//!
//! The receive path is line oriented: [`take_line`] carves one
//! newline-terminated line off the front of the receive buffer, and
//! [`parse_status_line`] / [`parse_field_line`] interpret single lines.
//! The send path is [`serialize_preamble`], which produces the request
//! line plus header block through the terminating blank line.

use bytes::BytesMut;

use crate::error::ParseError;
use crate::fields::Fields;
use crate::method::Method;
use crate::status::HttpStatus;
use crate::Version;

/// Everything needed to serialize a request preamble.
///
/// The engine assembles this from the request record; the serializer
/// itself touches no engine state.
#[derive(Debug)]
pub struct Preamble<'a> {
    /// Request method.
    pub method: &'a Method,
    /// URL path. An empty path is serialized as `/`.
    pub target: &'a str,
    /// Protocol version to announce.
    pub version: Version,
    /// Host name for the `Host` field.
    pub host: &'a str,
    /// Port the connection goes to.
    pub port: u16,
    /// The scheme's default port; the `Host` suffix is omitted when
    /// `port` equals it.
    pub default_port: u16,
    /// `User-Agent` value; empty means omit.
    pub user_agent: &'a str,
    /// `Referer` value; empty means omit.
    pub referer: &'a str,
    /// Range selector start; −1 means no `Range` field.
    pub range_start: i64,
    /// Range selector end; −1 means an open-ended range.
    pub range_end: i64,
    /// Caller-supplied fields, emitted after the defaults.
    pub extra: &'a Fields,
}

/// Serialize the request line and header block, including the
/// terminating blank line.
///
/// For HTTP/1.1 the standard fields `Host`, `Accept`, `Accept-Encoding`
/// and `Connection: close` are emitted unless the caller supplied them
/// in `extra`. `deflate` is intentionally not advertised: servers split
/// on two incompatible interpretations of it.
pub fn serialize_preamble(p: &Preamble<'_>) -> Vec<u8> {
    let mut buf = Vec::with_capacity(256);

    let target = if p.target.is_empty() { "/" } else { p.target };
    buf.extend_from_slice(p.method.as_str().as_bytes());
    buf.push(b' ');
    buf.extend_from_slice(target.as_bytes());
    buf.extend_from_slice(b" HTTP/");
    buf.extend_from_slice(p.version.to_string().as_bytes());
    buf.extend_from_slice(b"\r\n");

    if p.version == Version::Http11 {
        if !p.extra.contains("Host") {
            let host = if p.port == p.default_port {
                p.host.to_string()
            } else {
                format!("{}:{}", p.host, p.port)
            };
            put_field(&mut buf, "Host", &host);
        }
        if !p.extra.contains("Accept") {
            put_field(&mut buf, "Accept", "*/*");
        }
        if !p.extra.contains("Accept-Encoding") {
            put_field(&mut buf, "Accept-Encoding", "gzip");
        }
        if !p.extra.contains("Connection") {
            put_field(&mut buf, "Connection", "close");
        }
    }

    if !p.user_agent.is_empty() {
        put_field(&mut buf, "User-Agent", p.user_agent);
    }
    if !p.referer.is_empty() {
        put_field(&mut buf, "Referer", p.referer);
    }
    if p.range_start >= 0 {
        let range = if p.range_end >= 0 {
            format!("bytes={}-{}", p.range_start, p.range_end)
        } else {
            format!("bytes={}-", p.range_start)
        };
        put_field(&mut buf, "Range", &range);
    }

    for (name, value) in p.extra {
        put_field(&mut buf, name, value);
    }

    buf.extend_from_slice(b"\r\n");
    buf
}

fn put_field(buf: &mut Vec<u8>, name: &str, value: &str) {
    buf.extend_from_slice(name.as_bytes());
    buf.extend_from_slice(b": ");
    buf.extend_from_slice(value.as_bytes());
    buf.extend_from_slice(b"\r\n");
}

/// Remove the first newline-terminated line from `buf`.
///
/// Returns `None` when no LF is present yet. Otherwise consumes through
/// the LF and returns the preceding bytes with a single trailing CR
/// stripped. The split is zero-copy.
pub fn take_line(buf: &mut BytesMut) -> Option<BytesMut> {
    let lf = buf.iter().position(|&b| b == b'\n')?;
    let mut line = buf.split_to(lf + 1);
    line.truncate(lf);
    if line.last() == Some(&b'\r') {
        line.truncate(line.len() - 1);
    }
    Some(line)
}

/// Parse one status line, e.g. `HTTP/1.1 200 OK`.
///
/// A line shorter than 12 bytes, or one whose code bytes are not three
/// decimal digits, yields [`ParseError::Incomplete`] and leaves the
/// caller's state unchanged. The reason text may be empty.
pub fn parse_status_line(line: &[u8]) -> Result<HttpStatus, ParseError> {
    if line.len() < 12 {
        return Err(ParseError::Incomplete);
    }

    let mut code: u16 = 0;
    for &b in &line[9..12] {
        if !b.is_ascii_digit() {
            return Err(ParseError::Incomplete);
        }
        code = code * 10 + u16::from(b - b'0');
    }

    let text = if line.len() > 13 {
        String::from_utf8_lossy(&line[13..]).into_owned()
    } else {
        String::new()
    };

    Ok(HttpStatus { code, text })
}

/// Parse one header field line.
///
/// An empty line returns `Ok(None)`: the header block is complete. A
/// non-empty line is split at the first colon into a trimmed name and
/// value; a line without a colon is a protocol error.
pub fn parse_field_line(line: &[u8]) -> Result<Option<(String, String)>, ParseError> {
    if line.is_empty() {
        return Ok(None);
    }

    let text = String::from_utf8_lossy(line);
    let (name, value) = text
        .split_once(':')
        .ok_or(ParseError::Protocol("no colon in header line"))?;
    Ok(Some((name.trim().to_string(), value.trim().to_string())))
}
