//! Result handles and the engine/caller rendezvous.
//!
//! A [`HttpResult`] is the caller's window onto a request in flight.
//! Status, headers and body become observable in that order as the
//! exchange progresses; each can be waited on, and all can be polled.
//! Behind the handle sits a [`Rendezvous`] shared with the engine: a
//! monotone stage atomic, a slot mutex, and a condvar that wakes
//! blocked readers on every stage transition.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use bytes::Bytes;
use protocol_http1::{Fields, HttpStatus};

use crate::error::{Error, Result};

/// Process-wide request identifier counter.
static REQUEST_IDENTIFIER: AtomicI64 = AtomicI64::new(1);

/// Allocate the next request identifier. Unique for the life of the
/// process.
pub(crate) fn next_request_identifier() -> i64 {
    REQUEST_IDENTIFIER.fetch_add(1, Ordering::Relaxed)
}

/// Stages a request's result moves through. 1–3 advance in order;
/// `ERROR` is terminal and reachable from any of them.
pub(crate) mod stage {
    pub const NO_DATA: u8 = 0;
    pub const STATUS_READY: u8 = 1;
    pub const HEADERS_READY: u8 = 2;
    pub const BODY_READY: u8 = 3;
    pub const ERROR: u8 = 4;
}

#[derive(Default)]
struct Slots {
    status: Option<HttpStatus>,
    headers: Option<Fields>,
    body: Option<Bytes>,
    error: Option<Error>,
}

/// State shared between a result handle and the engine's request
/// record. Neither side owns the other; both hold an `Arc` to this.
pub(crate) struct Rendezvous {
    id: i64,
    stage: AtomicU8,
    abandoned: AtomicBool,
    slots: Mutex<Slots>,
    data_wait: Condvar,
}

impl Rendezvous {
    pub fn new(id: i64) -> Arc<Rendezvous> {
        Arc::new(Rendezvous {
            id,
            stage: AtomicU8::new(stage::NO_DATA),
            abandoned: AtomicBool::new(false),
            slots: Mutex::new(Slots::default()),
            data_wait: Condvar::new(),
        })
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn stage(&self) -> u8 {
        self.stage.load(Ordering::Acquire)
    }

    /// True once the owning handle has been dropped. The engine reads
    /// this before each delivery and abandons the request silently.
    pub fn is_abandoned(&self) -> bool {
        self.abandoned.load(Ordering::Acquire)
    }

    fn abandon(&self) {
        self.abandoned.store(true, Ordering::Release);
    }

    /// Write a slot and publish the stage transition: field first, then
    /// the stage store (Release), then one wakeup of every waiter. The
    /// store happens while the slot lock is still held; a reader checks
    /// the stage under the same lock before waiting, so the wakeup
    /// cannot fall between its check and its wait.
    fn publish(&self, guard: MutexGuard<'_, Slots>, next: u8) {
        self.stage.store(next, Ordering::Release);
        drop(guard);
        self.data_wait.notify_all();
    }

    pub fn set_status(&self, status: HttpStatus) {
        let mut slots = self.lock();
        slots.status = Some(status);
        self.publish(slots, stage::STATUS_READY);
    }

    pub fn set_headers(&self, headers: Fields) {
        let mut slots = self.lock();
        slots.headers = Some(headers);
        self.publish(slots, stage::HEADERS_READY);
    }

    /// Publish the body and the terminal success stage. A request that
    /// ends before its header block was published (stop-on-error) still
    /// records the fields collected so far, exactly once.
    pub fn set_body(&self, body: Bytes) {
        let mut slots = self.lock();
        if slots.headers.is_none() {
            slots.headers = Some(Fields::new());
        }
        slots.body = Some(body);
        self.publish(slots, stage::BODY_READY);
    }

    /// Record the terminal failure. Later set calls would violate the
    /// write-once discipline, so the engine only ever publishes one
    /// terminal transition per request.
    pub fn set_error(&self, error: Error) {
        let mut slots = self.lock();
        slots.error = Some(error);
        self.publish(slots, stage::ERROR);
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Block until `want` or `ERROR` is reached, then hand back the
    /// slot guard for the caller to copy its artifact out of.
    fn wait_for(&self, want: u8) -> Result<MutexGuard<'_, Slots>> {
        let mut slots = self.lock();
        loop {
            let current = self.stage.load(Ordering::Acquire);
            if current == stage::ERROR {
                return Err(slots.error.clone().unwrap_or(Error::Canceled));
            }
            if current >= want {
                return Ok(slots);
            }
            slots = self
                .data_wait
                .wait(slots)
                .unwrap_or_else(|e| e.into_inner());
        }
    }
}

/// Caller-side handle for one submitted request.
///
/// The handle is movable but not clonable; dropping it tells the engine
/// nobody is listening anymore, which silently abandons the request.
/// All methods are safe to call from any thread holding the handle.
pub struct HttpResult {
    inner: Arc<Rendezvous>,
}

impl HttpResult {
    pub(crate) fn new(inner: Arc<Rendezvous>) -> HttpResult {
        HttpResult { inner }
    }

    /// Block until the status line has been received, or the request
    /// failed.
    pub fn status(&self) -> Result<HttpStatus> {
        let slots = self.inner.wait_for(stage::STATUS_READY)?;
        Ok(slots.status.clone().unwrap_or_default())
    }

    /// Block until the header block has been received, or the request
    /// failed.
    pub fn headers(&self) -> Result<Fields> {
        let slots = self.inner.wait_for(stage::HEADERS_READY)?;
        Ok(slots.headers.clone().unwrap_or_default())
    }

    /// Block until the full body has been received, or the request
    /// failed.
    pub fn body(&self) -> Result<Bytes> {
        let slots = self.inner.wait_for(stage::BODY_READY)?;
        Ok(slots.body.clone().unwrap_or_default())
    }

    /// True once the status line is available. Never blocks.
    pub fn has_status(&self) -> bool {
        self.inner.stage() >= stage::STATUS_READY && self.inner.stage() != stage::ERROR
    }

    /// True once the header block is available. Never blocks.
    pub fn has_headers(&self) -> bool {
        self.inner.stage() >= stage::HEADERS_READY && self.inner.stage() != stage::ERROR
    }

    /// True once the body is available. Never blocks.
    pub fn has_body(&self) -> bool {
        self.inner.stage() == stage::BODY_READY
    }

    /// True once the request reached a terminal state, success or
    /// failure. Never blocks.
    pub fn is_completed(&self) -> bool {
        let stage = self.inner.stage();
        stage == stage::BODY_READY || stage == stage::ERROR
    }

    /// The request's stable identifier.
    pub fn identity(&self) -> i64 {
        self.inner.id()
    }
}

impl Drop for HttpResult {
    fn drop(&mut self) {
        self.inner.abandon();
    }
}

impl std::fmt::Debug for HttpResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpResult")
            .field("id", &self.inner.id())
            .field("stage", &self.inner.stage())
            .finish()
    }
}
