//! Progress events for request observers.
//!
//! A caller may attach an observer endpoint when submitting a request;
//! the engine then reports milestones on it as the exchange progresses.
//! Of all the kinds, only [`EventKind::RequestCompleted`] is guaranteed
//! to be delivered (exactly once, on every terminal outcome); the rest
//! are progress hooks emitted on a best-effort basis.

/// Sending half of an observer endpoint.
///
/// Events are delivered with a non-blocking send; a disconnected
/// receiver simply stops receiving them.
pub type Observer = crossbeam_channel::Sender<UrlEvent>;

/// One progress event for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlEvent {
    /// Identifier of the request this event belongs to, as returned by
    /// [`HttpResult::identity`](crate::HttpResult::identity).
    pub id: i64,
    /// What happened.
    pub kind: EventKind,
}

/// The milestone an event reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// The host name was resolved to an address.
    HostnameResolved {
        /// The host name that was resolved.
        host: String,
    },
    /// The connection to the remote host is established.
    ConnectionOpened,
    /// Progress of the request body upload.
    UploadProgress {
        /// Bytes sent so far.
        bytes: i64,
        /// Total bytes to send, or −1 when unknown.
        total: i64,
    },
    /// The first response bytes have arrived.
    ResponseStarted,
    /// Progress of the response body download.
    DownloadProgress {
        /// Bytes received so far.
        bytes: i64,
        /// Total bytes expected, or −1 when unknown.
        total: i64,
    },
    /// Request bytes were written to the socket.
    BytesWritten {
        /// Number of bytes written.
        bytes: i64,
    },
    /// The request reached a terminal state. Always delivered.
    RequestCompleted {
        /// True when a body (possibly empty) was delivered, false on
        /// error or cancellation.
        success: bool,
    },
    /// Diagnostic chatter from the engine.
    DebugMessage {
        /// Severity of the message.
        kind: DebugKind,
        /// The message text.
        message: String,
    },
    /// Certificate verification failed. Emitted by the certificate-
    /// exception extension point; the core never produces it.
    CertificateError {
        /// Human-readable description of the failure.
        message: String,
    },
    /// The status line was parsed.
    HttpStatus {
        /// The numeric status code.
        code: u16,
    },
    /// The header block was parsed.
    HttpHeaders,
}

/// Severity of a [`EventKind::DebugMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugKind {
    /// Informational.
    Text,
    /// Something unusual, not fatal.
    Warning,
    /// An error the engine recovered from or reported elsewhere.
    Error,
}
