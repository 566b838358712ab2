//! Session configuration.

use std::sync::Arc;
use std::time::Duration;

use crate::error::Error;

/// Configuration for an HTTP session.
#[derive(Clone)]
pub struct Config {
    /// Timeout for establishing a TCP connection.
    pub connect_timeout: Duration,
    /// Timeout applied at the socket level: bounds the blocking TLS
    /// handshake and the send-side retry of a partially written
    /// preamble.
    pub io_timeout: Duration,
    /// Size of the per-request scratch read chunk.
    pub chunk_size: usize,
    /// Upper bound on the size of a response's status line plus header
    /// block. A peer exceeding it fails the request instead of growing
    /// the receive buffer without limit.
    pub max_header_size: usize,
    /// Pre-built rustls client configuration. `None` selects the
    /// built-in webpki root store; supplying one is the certificate-
    /// exception extension point.
    pub tls_client: Option<Arc<rustls::ClientConfig>>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            connect_timeout: Duration::from_secs(30),
            io_timeout: Duration::from_secs(30),
            chunk_size: 4096,
            max_header_size: 64 * 1024,
            tls_client: None,
        }
    }
}

impl Config {
    /// Validate configuration values. Returns an error if any value is
    /// out of range.
    pub fn validate(&self) -> Result<(), Error> {
        if self.chunk_size == 0 {
            return Err(Error::System("chunk_size must be > 0".into()));
        }
        if self.max_header_size < self.chunk_size {
            return Err(Error::System(
                "max_header_size must be >= chunk_size".into(),
            ));
        }
        if self.connect_timeout.is_zero() || self.io_timeout.is_zero() {
            return Err(Error::System("timeouts must be non-zero".into()));
        }
        Ok(())
    }
}
