//! netline — an asynchronous HTTP/1.x client.
//!
//! A caller submits requests to a long-lived [`Session`] and gets an
//! [`HttpResult`] back: a handle through which the status line, the
//! header block and the body become observable as the exchange
//! progresses. Each milestone can be waited on, polled, or watched
//! through an observer endpoint; the request can be cancelled at any
//! point.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use netline::{HttpRequest, Session};
//!
//! fn main() -> Result<(), netline::Error> {
//!     let session = Session::new()?;
//!     let request = HttpRequest::for_url("https://example.com/")?;
//!     let result = session.submit(request, None)?;
//!
//!     println!("status: {}", result.status()?);
//!     println!("{} body bytes", result.body()?.len());
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! Two worker threads cooperate behind the session. The control worker
//! absorbs the blocking steps (name resolution, connect, the TLS
//! handshake); the data worker owns every live connection and drives
//! writes, reads, parsing, streaming decompression, delivery and
//! cancellation off a single multi-object wait — `poll(2)` across a
//! wakeup eventfd and all the non-blocking sockets. Results travel
//! through a rendezvous of one atomic stage and a condvar, so readers
//! never busy-wait and stage observations are monotone.
//!
//! One request means one connection: there is no pooling and no
//! keep-alive reuse, and the engine speaks HTTP/1.x only. Chunked
//! transfer decoding is an acknowledged extension point; a chunked
//! response currently fails the request with a protocol error.

// ── Internal modules ────────────────────────────────────────────────────
pub(crate) mod control;
pub(crate) mod data;
pub(crate) mod decompress;
pub(crate) mod socket;
pub(crate) mod transfer;
pub(crate) mod wait;

// ── Public modules ──────────────────────────────────────────────────────
pub mod config;
pub mod error;
pub mod observer;
pub mod request;
pub mod result;
pub mod session;

// ── Re-exports: client surface ─────────────────────────────────────────

/// Session configuration.
pub use config::Config;
/// Errors produced by the client.
pub use error::Error;
/// Convenience result type.
pub use error::Result;
/// Severity of a debug observer event.
pub use observer::DebugKind;
/// What an observer event reports.
pub use observer::EventKind;
/// Sending half of an observer endpoint.
pub use observer::Observer;
/// One progress event for one request.
pub use observer::UrlEvent;
/// One HTTP request, ready for submission.
pub use request::HttpRequest;
/// Per-request options.
pub use request::RequestOptions;
/// Permitted authentication schemes for [`RequestOptions::auth_methods`].
pub use request::{AUTH_BASIC, AUTH_DIGEST, AUTH_IE_DIGEST};
/// Caller-side handle for one submitted request.
pub use result::HttpResult;
/// The session itself.
pub use session::Session;

// ── Re-exports: wire-level types from the codec crate ──────────────────

/// Header field collection.
pub use protocol_http1::Fields;
/// Parsed response status.
pub use protocol_http1::HttpStatus;
/// Validated request method.
pub use protocol_http1::Method;
/// Method validation failure.
pub use protocol_http1::MethodError;
/// Protocol version.
pub use protocol_http1::Version;
