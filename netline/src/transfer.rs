//! Per-request engine state and the read–parse–decompress pipeline.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use protocol_http1::{
    Fields, HttpStatus, Method, ParseError, Preamble, parse_field_line, parse_status_line,
    serialize_preamble, take_line,
};

use crate::config::Config;
use crate::decompress::Decompressor;
use crate::error::{Error, Result};
use crate::observer::{EventKind, Observer, UrlEvent};
use crate::request::HttpRequest;
use crate::result::Rendezvous;
use crate::socket::Socket;

/// States a request moves through. Strictly forward; the wait list is
/// derived from the current state each iteration.
/// `TrailingHeadersReceived` is only reachable once the chunked
/// transfer extension lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum TransferState {
    Initial,
    Connected,
    RequestSent,
    StatusReceived,
    HeadersReceived,
    ContentReceived,
    #[allow(dead_code)]
    TrailingHeadersReceived,
}

/// The engine-side record for one request in flight.
///
/// Exclusively owned by whichever worker currently holds it; ownership
/// moves between workers through the session's queues. The only state
/// shared with the caller is the [`Rendezvous`].
pub(crate) struct Transfer {
    pub request: HttpRequest,
    pub result: Arc<Rendezvous>,
    pub observer: Option<Observer>,
    pub state: TransferState,
    pub addr: Option<SocketAddr>,
    pub socket: Option<Socket>,
    pub cancel_requested: bool,

    /// Line-oriented receive buffer.
    input: BytesMut,
    /// Size of `input` at the end of the previous read cycle; a cycle
    /// only reads off the socket when no residual data is waiting.
    input_snapshot: usize,
    /// Scratch chunk the socket is read into.
    chunk: Box<[u8]>,
    /// Running total of status-line and header bytes, checked against
    /// the configured ceiling.
    header_bytes: usize,
    max_header_size: usize,

    bytes_received: i64,
    bytes_total: i64,
    receive_end: bool,
    parse_end: bool,
    read_by_chunks: bool,
    decompressor: Option<Decompressor>,
    body: BytesMut,
    fields: Fields,
    status: Option<HttpStatus>,
}

impl Transfer {
    pub fn new(
        request: HttpRequest,
        result: Arc<Rendezvous>,
        observer: Option<Observer>,
        config: &Config,
    ) -> Transfer {
        Transfer {
            request,
            result,
            observer,
            state: TransferState::Initial,
            addr: None,
            socket: None,
            cancel_requested: false,
            input: BytesMut::new(),
            input_snapshot: 0,
            chunk: vec![0u8; config.chunk_size].into_boxed_slice(),
            header_bytes: 0,
            max_header_size: config.max_header_size,
            bytes_received: 0,
            bytes_total: -1,
            receive_end: false,
            parse_end: false,
            read_by_chunks: false,
            decompressor: None,
            body: BytesMut::new(),
            fields: Fields::new(),
            status: None,
        }
    }

    /// Deliver a progress event if an observer is attached.
    pub fn notify(&self, kind: EventKind) {
        if let Some(observer) = &self.observer {
            let _ = observer.send(UrlEvent {
                id: self.result.id(),
                kind,
            });
        }
    }

    /// Serialize the request preamble for this transfer.
    pub fn preamble(&self) -> Vec<u8> {
        let options = self.request.options();
        let url = self.request.url();
        let mut target = url.path().to_string();
        if let Some(query) = url.query() {
            target.push('?');
            target.push_str(query);
        }
        serialize_preamble(&Preamble {
            method: self.request.method(),
            target: &target,
            version: self.request.version(),
            host: url.host_str().unwrap_or(""),
            port: self.request.port(),
            default_port: self.request.default_port(),
            user_agent: &options.user_agent,
            referer: &options.referer,
            range_start: options.range_start,
            range_end: options.range_end,
            extra: &options.extra_headers,
        })
    }

    /// Hand the accumulated body out for publication.
    pub fn take_body(&mut self) -> Bytes {
        self.body.split().freeze()
    }

    /// One pass of the pipeline, invoked whenever the socket is
    /// readable. Returns `Ok(true)` when the response is complete,
    /// `Ok(false)` when more socket readiness is needed.
    pub fn read_cycle(&mut self) -> Result<bool> {
        let outcome = self.advance();
        self.input_snapshot = self.input.len();
        outcome
    }

    fn advance(&mut self) -> Result<bool> {
        self.receive()?;
        self.parse_status()?;
        if self.state < TransferState::StatusReceived {
            return self.stalled();
        }
        if self.stopped_on_error() {
            return Ok(true);
        }

        self.parse_headers()?;
        if self.state < TransferState::HeadersReceived {
            return self.stalled();
        }
        if self.no_body() {
            return Ok(true);
        }

        self.consume_body()?;
        Ok(self.receive_end && self.parse_end)
    }

    /// Receive phase: pull one chunk off the socket when the previous
    /// cycle left nothing behind to parse.
    fn receive(&mut self) -> Result<()> {
        if self.receive_end || self.input.len() != self.input_snapshot {
            return Ok(());
        }
        let Some(socket) = self.socket.as_mut() else {
            return Err(Error::System("request record has no socket".into()));
        };
        match socket.read(&mut self.chunk) {
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(()),
            Err(e) => {
                log::debug!("request {}: read failed: {e}", self.result.id());
                Err(Error::Network("Error reading data from host".into()))
            }
            Ok(0) => {
                if self.bytes_total > 0 && self.bytes_received != self.bytes_total {
                    return Err(Error::Network("unexpected end of data".into()));
                }
                self.receive_end = true;
                Ok(())
            }
            Ok(n) => {
                self.input.extend_from_slice(&self.chunk[..n]);
                Ok(())
            }
        }
    }

    /// Status phase: consume lines until a status line parses.
    fn parse_status(&mut self) -> Result<()> {
        while self.state < TransferState::StatusReceived {
            self.guard_header_size()?;
            let Some(line) = take_line(&mut self.input) else {
                return Ok(());
            };
            self.header_bytes += line.len();
            match parse_status_line(&line) {
                // Not a status line; drop it and keep scanning so a
                // fully buffered response never stalls the pipeline.
                Err(ParseError::Incomplete) => continue,
                Err(e) => return Err(Error::Protocol(e.to_string())),
                Ok(status) => {
                    self.state = TransferState::StatusReceived;
                    if self.request.options().follow_location && status.is_redirect() {
                        // TODO: resubmit against the Location target once
                        // the redirect module is wired up; until then the
                        // 3xx response is delivered as-is.
                        log::debug!(
                            "request {}: not following {} redirect",
                            self.result.id(),
                            status.code
                        );
                    }
                    log::trace!("request {}: status {}", self.result.id(), status);
                    self.notify(EventKind::HttpStatus { code: status.code });
                    self.notify(EventKind::ResponseStarted);
                    self.status = Some(status.clone());
                    self.result.set_status(status);
                }
            }
        }
        Ok(())
    }

    /// True when `stop_on_error` ends the exchange at the status line.
    fn stopped_on_error(&self) -> bool {
        self.request.options().stop_on_error
            && self.status.as_ref().is_some_and(|s| s.code >= 400)
    }

    /// Headers phase: parse field lines through the terminating empty
    /// line, then act on the framing fields.
    fn parse_headers(&mut self) -> Result<()> {
        while self.state < TransferState::HeadersReceived {
            self.guard_header_size()?;
            let Some(line) = take_line(&mut self.input) else {
                return Ok(());
            };
            self.header_bytes += line.len();
            match parse_field_line(&line).map_err(|e| Error::Protocol(e.to_string()))? {
                Some((name, value)) => self.fields.add(name, value),
                None => {
                    self.state = TransferState::HeadersReceived;
                    self.on_headers_complete()?;
                }
            }
        }
        Ok(())
    }

    fn on_headers_complete(&mut self) -> Result<()> {
        log::trace!(
            "request {}: {} header fields",
            self.result.id(),
            self.fields.len()
        );
        self.result.set_headers(self.fields.clone());
        self.notify(EventKind::HttpHeaders);

        self.read_by_chunks = self
            .fields
            .get("Transfer-Encoding")
            .is_some_and(|value| {
                value
                    .split(',')
                    .any(|token| token.trim().eq_ignore_ascii_case("chunked"))
            });
        if self.read_by_chunks {
            return Err(Error::Protocol(
                "chunked transfer encoding is not implemented".into(),
            ));
        }

        if let Some(encoding) = self.fields.get("Content-Encoding") {
            self.decompressor = Decompressor::for_encoding(encoding);
        }

        self.bytes_total = self
            .fields
            .get("Content-Length")
            .and_then(|value| value.trim().parse::<i64>().ok())
            .unwrap_or(-1);
        Ok(())
    }

    /// True for responses that carry no body by definition.
    fn no_body(&self) -> bool {
        *self.request.method() == Method::head()
            || self.status.as_ref().is_some_and(|s| s.code == 204)
    }

    /// Body phase: drain everything buffered, decompressing on the way
    /// when the response is encoded.
    fn consume_body(&mut self) -> Result<()> {
        let discard = self.request.options().discard_data;
        if !self.input.is_empty() {
            let data = self.input.split();
            self.bytes_received += data.len() as i64;
            match self.decompressor.as_mut() {
                Some(decompressor) => {
                    decompressor
                        .write(&data)
                        .map_err(|e| Error::Protocol(format!("decompression failed: {e}")))?;
                    let output = decompressor.take_output();
                    if !discard && !output.is_empty() {
                        self.body.extend_from_slice(&output);
                    }
                }
                None => {
                    if !discard {
                        self.body.extend_from_slice(&data);
                    }
                }
            }
            self.notify(EventKind::DownloadProgress {
                bytes: self.bytes_received,
                total: self.bytes_total,
            });
        }

        if self.bytes_total >= 0 && self.bytes_received >= self.bytes_total {
            self.receive_end = true;
        }
        if self.receive_end
            && let Some(decompressor) = self.decompressor.take()
        {
            match decompressor.finish() {
                Ok(rest) => {
                    if !discard && !rest.is_empty() {
                        self.body.extend_from_slice(&rest);
                    }
                }
                // Finish-time overflow from an over-eager stream is
                // tolerated; mid-stream errors were already fatal.
                Err(e) => {
                    log::debug!(
                        "request {}: decompressor finish tolerated: {e}",
                        self.result.id()
                    );
                }
            }
        }
        self.parse_end = self.input.is_empty();
        if self.receive_end && self.parse_end {
            self.state = TransferState::ContentReceived;
        }
        Ok(())
    }

    /// A phase that cannot advance is fine while the peer may still
    /// send more, and fatal once it has closed.
    fn stalled(&self) -> Result<bool> {
        if self.receive_end {
            Err(Error::Network("Connection was closed unexpectedly".into()))
        } else {
            Ok(false)
        }
    }

    fn guard_header_size(&self) -> Result<()> {
        if self.header_bytes + self.input.len() > self.max_header_size {
            return Err(Error::Protocol("header block exceeds maximum size".into()));
        }
        Ok(())
    }
}
