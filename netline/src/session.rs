//! The HTTP session: the outward face of the engine.
//!
//! A session owns the two worker threads and everything they share.
//! Submitting a request hands a record to the control worker and
//! returns an [`HttpResult`] sharing the rendezvous with the engine;
//! cancellation travels through the cancel list and the data worker's
//! wakeup fd.
//!
//! # Extension points
//!
//! The cookie jar, authentication and proxy slots of the original
//! design are integration points that hang off the session; their
//! mechanics live in their own modules. The certificate-exception slot
//! is [`Config::tls_client`]: supply a pre-built
//! `rustls::ClientConfig` to change how peers are verified.

use std::sync::{Arc, Mutex};
use std::sync::atomic::Ordering;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;

use crate::config::Config;
use crate::control;
use crate::data::{self, DataShared};
use crate::error::{Error, Result};
use crate::observer::Observer;
use crate::request::HttpRequest;
use crate::result::{HttpResult, Rendezvous, next_request_identifier};
use crate::transfer::Transfer;

/// A long-lived HTTP session.
///
/// Sessions are cheap to clone; clones share the same workers and
/// queues. Dropping the last clone shuts the engine down: every
/// request still in flight fails with [`Error::Canceled`], and both
/// workers are joined.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    config: Arc<Config>,
    control_tx: Mutex<Option<Sender<Box<Transfer>>>>,
    shared: Arc<DataShared>,
    control_handle: Mutex<Option<JoinHandle<()>>>,
    data_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Construct a session with default configuration.
    pub fn new() -> Result<Session> {
        Session::with_config(Config::default())
    }

    /// Construct a session, spawning both workers. Any thread or
    /// wakeup-fd creation failure is a synchronous system error.
    pub fn with_config(mut config: Config) -> Result<Session> {
        config.validate()?;
        // Resolve the TLS slot once so every request shares one
        // verifier instead of rebuilding the root store per connect.
        if config.tls_client.is_none() {
            config.tls_client = Some(crate::socket::default_tls_client());
        }
        let config = Arc::new(config);

        let shared = Arc::new(
            DataShared::new()
                .map_err(|e| Error::System(format!("failed to create wakeup fd: {e}")))?,
        );
        let (control_tx, control_rx) = crossbeam_channel::unbounded::<Box<Transfer>>();

        let data_shared = shared.clone();
        let io_timeout = config.io_timeout;
        let data_handle = thread::Builder::new()
            .name("netline-data".to_string())
            .spawn(move || data::run(data_shared, io_timeout))
            .map_err(|e| Error::System(format!("failed to spawn data worker: {e}")))?;

        let control_shared = shared.clone();
        let control_config = config.clone();
        let control_spawn = thread::Builder::new()
            .name("netline-control".to_string())
            .spawn(move || control::run(control_rx, control_shared, control_config));
        let control_handle = match control_spawn {
            Ok(handle) => handle,
            Err(e) => {
                // The data worker is already up; take it down again.
                shared.shutdown.store(true, Ordering::Release);
                shared.wakeup.raise();
                let _ = data_handle.join();
                return Err(Error::System(format!("failed to spawn control worker: {e}")));
            }
        };

        Ok(Session {
            inner: Arc::new(SessionInner {
                config,
                control_tx: Mutex::new(Some(control_tx)),
                shared,
                control_handle: Mutex::new(Some(control_handle)),
                data_handle: Mutex::new(Some(data_handle)),
            }),
        })
    }

    /// Submit a request, optionally attaching an observer endpoint for
    /// progress events. Returns the handle through which status,
    /// headers and body become observable.
    pub fn submit(&self, request: HttpRequest, observer: Option<Observer>) -> Result<HttpResult> {
        let rendezvous = Rendezvous::new(next_request_identifier());
        let transfer = Box::new(Transfer::new(
            request,
            rendezvous.clone(),
            observer,
            &self.inner.config,
        ));

        let guard = self
            .inner
            .control_tx
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let tx = guard
            .as_ref()
            .ok_or_else(|| Error::System("session is shut down".into()))?;
        tx.send(transfer)
            .map_err(|_| Error::System("control worker is gone".into()))?;
        log::trace!("request {} submitted", rendezvous.id());
        Ok(HttpResult::new(rendezvous))
    }

    /// Request cancellation of the request with identifier `id`.
    ///
    /// Best-effort: the data worker applies it on its next iteration,
    /// and a request that already completed is unaffected. Calling
    /// this twice has the same observable outcome as once.
    pub fn cancel(&self, id: i64) {
        self.inner.shared.push_cancel(id);
    }

    /// Request cancellation of the request behind `result`.
    pub fn cancel_result(&self, result: &HttpResult) {
        self.cancel(result.identity());
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        // Closing the control channel ends the control worker; the
        // flag plus a wakeup ends the data worker, which fails every
        // request still in flight before exiting.
        *self.control_tx.lock().unwrap_or_else(|e| e.into_inner()) = None;
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.wakeup.raise();

        let control = self
            .control_handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = control {
            let _ = handle.join();
        }
        let data = self
            .data_handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = data {
            let _ = handle.join();
        }

        // The control worker may have finished a connect after the
        // data worker stopped draining; nothing must stay queued with
        // a reader blocked on it.
        self.shared.fail_pending(&Error::Canceled);
    }
}
