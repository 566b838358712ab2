//! HTTP request method tokens.

use crate::error::MethodError;

/// Separators that may not appear in a method token, besides control
/// bytes, DEL, space, and anything outside US-ASCII.
const SEPARATORS: &[u8] = b"()<>@,;\\\"/[]?={} ";

/// A validated HTTP request method.
///
/// A method is a non-empty token of visible US-ASCII characters with the
/// usual separators excluded. Tokens are case-sensitive and compared
/// byte-exact: `Method::new("get")` is a valid method, but it does not
/// equal [`Method::get()`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Method(String);

impl Method {
    /// Validate `token` as an HTTP method. No canonicalization is applied.
    pub fn new(token: impl Into<String>) -> Result<Method, MethodError> {
        let token = token.into();
        if token.is_empty() {
            return Err(MethodError::Empty);
        }
        for (i, b) in token.bytes().enumerate() {
            if !b.is_ascii() || b <= 0x1f || b == 0x7f || SEPARATORS.contains(&b) {
                return Err(MethodError::InvalidCharacter(i));
            }
        }
        Ok(Method(token))
    }

    /// `GET`
    pub fn get() -> Method {
        Method("GET".to_string())
    }

    /// `POST`
    pub fn post() -> Method {
        Method("POST".to_string())
    }

    /// `PUT`
    pub fn put() -> Method {
        Method("PUT".to_string())
    }

    /// `HEAD`
    pub fn head() -> Method {
        Method("HEAD".to_string())
    }

    /// `DELETE`
    pub fn delete() -> Method {
        Method("DELETE".to_string())
    }

    /// `OPTIONS`
    pub fn options() -> Method {
        Method("OPTIONS".to_string())
    }

    /// `TRACE`
    pub fn trace() -> Method {
        Method("TRACE".to_string())
    }

    /// `CONNECT`
    pub fn connect() -> Method {
        Method("CONNECT".to_string())
    }

    /// The method token as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for Method {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Method {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}
