//! Request construction and the scheme-dispatch factory.

use bytes::Bytes;
use protocol_http1::{Fields, Method, Version};
use url::Url;

use crate::error::{Error, Result};

/// Basic authentication is permitted.
pub const AUTH_BASIC: u32 = 1 << 0;
/// Digest authentication is permitted.
pub const AUTH_DIGEST: u32 = 1 << 1;
/// The IE-flavored digest variant is permitted.
pub const AUTH_IE_DIGEST: u32 = 1 << 2;

/// Per-request options.
///
/// Everything here is recorded on submission; some options steer the
/// engine today, others (credentials, form fields, raw upload data,
/// cookies) are integration points for the auth, form and cookie
/// modules and the upload extension.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    /// Upper bound on a redirect chain.
    pub max_redirects: u8,
    /// `Referer` value; empty means omit.
    pub referer: String,
    /// `User-Agent` value; empty means omit.
    pub user_agent: String,
    /// Credentials for the authentication integration point.
    pub username: String,
    /// See `username`.
    pub password: String,
    /// Bitmask of permitted authentication schemes (`AUTH_*`).
    pub auth_methods: u32,
    /// Caller-supplied header fields, merged after the defaults.
    pub extra_headers: Fields,
    /// Structured form body; sending it is the upload extension.
    pub post_fields: Option<Vec<(String, String)>>,
    /// Raw body source for the upload extension.
    pub input_data: Option<Bytes>,
    /// Length of `input_data`, or −1.
    pub input_data_size: i64,
    /// Byte-range selector start; −1 means no `Range` field.
    pub range_start: i64,
    /// Byte-range selector end; −1 means an open-ended range.
    pub range_end: i64,
    /// Follow 3xx responses (bounded by `max_redirects`). Redirect
    /// resubmission is not wired up yet; the flag is consulted and the
    /// 3xx response is delivered as-is.
    pub follow_location: bool,
    /// Consume body bytes without retaining them.
    pub discard_data: bool,
    /// On redirect, set `Referer` to the prior URL.
    pub auto_referer: bool,
    /// Abort after the status line when the code is ≥ 400, without
    /// reading the body.
    pub stop_on_error: bool,
    /// Emit cookies from the cookie-jar integration point.
    pub set_cookies: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        RequestOptions {
            max_redirects: 8,
            referer: String::new(),
            user_agent: String::new(),
            username: String::new(),
            password: String::new(),
            auth_methods: AUTH_BASIC | AUTH_DIGEST | AUTH_IE_DIGEST,
            extra_headers: Fields::new(),
            post_fields: None,
            input_data: None,
            input_data_size: -1,
            range_start: -1,
            range_end: -1,
            follow_location: true,
            discard_data: false,
            auto_referer: false,
            stop_on_error: false,
            set_cookies: true,
        }
    }
}

/// One HTTP request, ready for submission to a session.
///
/// Built through [`HttpRequest::for_url`], the only place that inspects
/// the URL scheme: `http` yields a plain request, `https` a TLS-enabled
/// one, anything else is refused. Every other component consumes only
/// the parsed URL parts it needs.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    url: Url,
    tls: bool,
    method: Method,
    version: Version,
    options: RequestOptions,
}

impl HttpRequest {
    /// Parse `url` and dispatch on its scheme.
    pub fn for_url(url: &str) -> Result<HttpRequest> {
        let parsed = Url::parse(url).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        let tls = match parsed.scheme() {
            "http" => false,
            "https" => true,
            other => return Err(Error::UnsupportedProtocol(other.to_string())),
        };
        Ok(HttpRequest {
            url: parsed,
            tls,
            method: Method::get(),
            version: Version::Http11,
            options: RequestOptions::default(),
        })
    }

    /// The parsed target URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Whether the request goes over TLS.
    pub fn is_tls(&self) -> bool {
        self.tls
    }

    /// The request method. Defaults to `GET`.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Replace the request method.
    pub fn set_method(&mut self, method: Method) {
        self.method = method;
    }

    /// The protocol version to announce. Defaults to HTTP/1.1.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Replace the protocol version.
    pub fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    /// The request options.
    pub fn options(&self) -> &RequestOptions {
        &self.options
    }

    /// Mutable access to the request options.
    pub fn options_mut(&mut self) -> &mut RequestOptions {
        &mut self.options
    }

    /// Set the `User-Agent` value; empty means omit.
    pub fn set_user_agent(&mut self, user_agent: impl Into<String>) {
        self.options.user_agent = user_agent.into();
    }

    /// Set the `Referer` value; empty means omit.
    pub fn set_referer(&mut self, referer: impl Into<String>) {
        self.options.referer = referer.into();
    }

    /// Select a byte range; pass −1 for an open end.
    pub fn set_range(&mut self, start: i64, end: i64) {
        self.options.range_start = start;
        self.options.range_end = end;
    }

    /// Abort after the status line when the code is ≥ 400.
    pub fn set_stop_on_error(&mut self, stop: bool) {
        self.options.stop_on_error = stop;
    }

    /// Consume body bytes without retaining them.
    pub fn set_discard_data(&mut self, discard: bool) {
        self.options.discard_data = discard;
    }

    /// Follow 3xx responses (see [`RequestOptions::follow_location`]).
    pub fn set_follow_location(&mut self, follow: bool) {
        self.options.follow_location = follow;
    }

    /// The port the connection goes to: the URL's, or the scheme
    /// default.
    pub(crate) fn port(&self) -> u16 {
        self.url.port().unwrap_or(self.default_port())
    }

    /// The scheme's default port.
    pub(crate) fn default_port(&self) -> u16 {
        if self.tls { 443 } else { 80 }
    }
}
