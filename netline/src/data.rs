//! The data worker: one thread, one wait, every live connection.
//!
//! The worker owns the map from socket descriptor to request record
//! and a wait list whose slot 0 is the session's eventfd. Everything
//! it does is driven by [`WaitList::wait`]: eventfd readiness means
//! new work or cancellations (or shutdown), socket readiness means
//! bytes to write or read. All socket I/O here is non-blocking;
//! `WouldBlock` just cycles back through the wait.

use std::collections::HashMap;
use std::io;
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::Error;
use crate::observer::EventKind;
use crate::transfer::{Transfer, TransferState};
use crate::wait::{
    EVENT_CANCELLED, EVENT_DISCONNECTED, EVENT_INVALID, EVENT_READ, EVENT_WRITE, EventFd, Events,
    WaitList,
};

/// State shared between the session, the control worker and the data
/// worker: the connected-record queue, the cancel list, the wakeup fd
/// and the shutdown flag.
pub(crate) struct DataShared {
    connected: Mutex<Vec<Box<Transfer>>>,
    cancels: Mutex<Vec<i64>>,
    pub wakeup: EventFd,
    pub shutdown: AtomicBool,
}

impl DataShared {
    pub fn new() -> io::Result<DataShared> {
        Ok(DataShared {
            connected: Mutex::new(Vec::new()),
            cancels: Mutex::new(Vec::new()),
            wakeup: EventFd::new()?,
            shutdown: AtomicBool::new(false),
        })
    }

    /// Queue a connected record for the data worker and wake it.
    pub fn push_connected(&self, transfer: Box<Transfer>) {
        self.connected
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(transfer);
        self.wakeup.raise();
    }

    /// Queue a cancellation and wake the data worker.
    pub fn push_cancel(&self, id: i64) {
        self.cancels
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(id);
        self.wakeup.raise();
    }

    fn drain(&self) -> (Vec<Box<Transfer>>, Vec<i64>) {
        let connected =
            std::mem::take(&mut *self.connected.lock().unwrap_or_else(|e| e.into_inner()));
        let cancels = std::mem::take(&mut *self.cancels.lock().unwrap_or_else(|e| e.into_inner()));
        (connected, cancels)
    }

    /// Fail every record still waiting in the connected queue. Used by
    /// the data worker's terminal sweep, and once more by the session
    /// after both workers have exited, for records the control worker
    /// pushed too late for the data worker to see.
    pub fn fail_pending(&self, err: &Error) {
        let (connected, _) = self.drain();
        for mut transfer in connected {
            if let Some(socket) = transfer.socket.as_mut() {
                socket.disconnect();
            }
            if !transfer.result.is_abandoned() {
                transfer.result.set_error(err.clone());
                transfer.notify(EventKind::RequestCompleted { success: false });
            }
        }
    }
}

struct DataWorker {
    shared: Arc<DataShared>,
    connections: HashMap<RawFd, Box<Transfer>>,
    wait_list: WaitList,
    io_timeout: Duration,
}

/// Worker entry point.
pub(crate) fn run(shared: Arc<DataShared>, io_timeout: Duration) {
    let mut worker = DataWorker {
        shared,
        connections: HashMap::new(),
        wait_list: WaitList::new(),
        io_timeout,
    };
    if let Err(err) = worker.run_loop() {
        log::error!("data worker aborting: {err}");
        worker.fail_remaining(Error::System(format!("data worker failed: {err}")));
    }
    log::trace!("data worker exiting");
}

impl DataWorker {
    fn run_loop(&mut self) -> io::Result<()> {
        loop {
            self.rebuild_wait_list();
            self.wait_list.wait()?;

            let slot0 = self.wait_list.entries()[0].ready;
            if slot0 & EVENT_INVALID != 0 {
                // The wakeup fd is gone: the session is tearing down.
                self.fail_remaining(Error::Canceled);
                return Ok(());
            }
            if slot0 & EVENT_READ != 0 {
                self.shared.wakeup.drain();
                if self.shared.shutdown.load(Ordering::Acquire) {
                    self.fail_remaining(Error::Canceled);
                    return Ok(());
                }
                let (connected, cancels) = self.shared.drain();
                for transfer in connected {
                    self.adopt(transfer);
                }
                for id in cancels {
                    self.apply_cancel(id);
                }
            }

            let ready: Vec<(RawFd, Events)> = self
                .wait_list
                .entries()
                .iter()
                .skip(1)
                .filter(|entry| entry.ready != 0)
                .map(|entry| (entry.fd, entry.ready))
                .collect();
            for (fd, events) in ready {
                self.dispatch(fd, events)?;
            }
        }
    }

    /// Slot 0 first, then one entry per connection: WRITE until the
    /// record leaves `Connected`, CANCELLED once flagged, otherwise
    /// read-or-hangup.
    fn rebuild_wait_list(&mut self) {
        self.wait_list.clear();
        self.wait_list.push(self.shared.wakeup.raw(), EVENT_READ);
        for (fd, transfer) in &self.connections {
            let wanted = if transfer.cancel_requested {
                EVENT_CANCELLED
            } else if transfer.state == TransferState::Connected {
                EVENT_WRITE
            } else {
                EVENT_READ | EVENT_DISCONNECTED
            };
            self.wait_list.push(*fd, wanted);
        }
    }

    /// Take ownership of a freshly connected record.
    fn adopt(&mut self, mut transfer: Box<Transfer>) {
        if transfer.result.is_abandoned() {
            if let Some(socket) = transfer.socket.as_mut() {
                socket.disconnect();
            }
            return;
        }
        match transfer.socket.as_ref() {
            Some(socket) => {
                self.connections.insert(socket.as_raw_fd(), transfer);
            }
            None => {
                transfer.result.set_error(Error::System(
                    "connected record arrived without a socket".into(),
                ));
                transfer.notify(EventKind::RequestCompleted { success: false });
            }
        }
    }

    /// Flag the record and overwrite its wait-list slot so the next
    /// wait reports it cancelled. Unknown or already-completed ids are
    /// a no-op, which is what makes cancellation idempotent.
    fn apply_cancel(&mut self, id: i64) {
        let Some(fd) = self
            .connections
            .iter()
            .find(|(_, t)| t.result.id() == id)
            .map(|(fd, _)| *fd)
        else {
            log::trace!("cancel for unknown request {id}");
            return;
        };
        if let Some(transfer) = self.connections.get_mut(&fd) {
            transfer.cancel_requested = true;
        }
        self.wait_list.set_wanted(fd, EVENT_CANCELLED);
    }

    fn dispatch(&mut self, fd: RawFd, ready: Events) -> io::Result<()> {
        if !self.connections.contains_key(&fd) {
            return Ok(());
        }
        if ready & EVENT_INVALID != 0 {
            return Err(io::Error::other("connection descriptor became invalid"));
        }
        if ready & EVENT_CANCELLED != 0 {
            log::trace!("request cancelled on fd {fd}");
            self.finish_with_error(fd, Error::Canceled);
            return Ok(());
        }
        if ready & EVENT_WRITE != 0 {
            self.write_preamble(fd);
            return Ok(());
        }
        if ready & EVENT_READ != 0 {
            self.read_ready(fd);
            return Ok(());
        }
        if ready & EVENT_DISCONNECTED != 0 {
            self.finish_with_error(
                fd,
                Error::Network("Connection was closed unexpectedly".into()),
            );
        }
        Ok(())
    }

    /// WRITE readiness: serialize and send the preamble in one shot.
    /// The upload extension will send the request body from here as
    /// well, with its own intermediate state.
    fn write_preamble(&mut self, fd: RawFd) {
        let io_timeout = self.io_timeout;
        let outcome = {
            let Some(transfer) = self.connections.get_mut(&fd) else {
                return;
            };
            if transfer.state != TransferState::Connected {
                return;
            }
            let preamble = transfer.preamble();
            match transfer.socket.as_mut() {
                Some(socket) => socket
                    .write_all(&preamble, io_timeout)
                    .map(|()| preamble.len())
                    .map_err(|e| Error::Network(format!("failed to send request: {e}"))),
                None => Err(Error::System("request record has no socket".into())),
            }
        };
        match outcome {
            Ok(len) => {
                if let Some(transfer) = self.connections.get_mut(&fd) {
                    transfer.state = TransferState::RequestSent;
                    transfer.notify(EventKind::BytesWritten { bytes: len as i64 });
                    if let Some(addr) = transfer.addr {
                        log::trace!(
                            "request {}: sent {len} byte preamble to {addr}",
                            transfer.result.id()
                        );
                    }
                }
            }
            Err(err) => self.finish_with_error(fd, err),
        }
    }

    /// READ readiness: run the pipeline; deliver, fail, or wait more.
    fn read_ready(&mut self, fd: RawFd) {
        let abandoned = self
            .connections
            .get(&fd)
            .is_some_and(|t| t.result.is_abandoned());
        if abandoned {
            // Nobody is listening; the body simply never arrives.
            self.abandon(fd);
            return;
        }
        let outcome = match self.connections.get_mut(&fd) {
            Some(transfer) => transfer.read_cycle(),
            None => return,
        };
        match outcome {
            Ok(false) => {}
            Ok(true) => self.complete(fd),
            Err(err) => self.finish_with_error(fd, err),
        }
    }

    fn complete(&mut self, fd: RawFd) {
        if let Some(mut transfer) = self.connections.remove(&fd) {
            if transfer.result.is_abandoned() {
                if let Some(socket) = transfer.socket.as_mut() {
                    socket.disconnect();
                }
                return;
            }
            let body = transfer.take_body();
            log::trace!(
                "request {}: completed with {} body bytes",
                transfer.result.id(),
                body.len()
            );
            transfer.result.set_body(body);
            transfer.notify(EventKind::RequestCompleted { success: true });
            if let Some(socket) = transfer.socket.as_mut() {
                socket.disconnect();
            }
        }
    }

    fn finish_with_error(&mut self, fd: RawFd, err: Error) {
        if let Some(mut transfer) = self.connections.remove(&fd) {
            if let Some(socket) = transfer.socket.as_mut() {
                socket.disconnect();
            }
            if transfer.result.is_abandoned() {
                return;
            }
            log::debug!("request {}: {err}", transfer.result.id());
            transfer.result.set_error(err);
            transfer.notify(EventKind::RequestCompleted { success: false });
        }
    }

    fn abandon(&mut self, fd: RawFd) {
        if let Some(mut transfer) = self.connections.remove(&fd) {
            log::trace!("request {}: abandoned by its owner", transfer.result.id());
            if let Some(socket) = transfer.socket.as_mut() {
                socket.disconnect();
            }
        }
    }

    /// Terminal sweep: fail every live and still-queued request so no
    /// reader stays blocked after the worker exits.
    fn fail_remaining(&mut self, err: Error) {
        self.shared.fail_pending(&err);
        for (_, mut transfer) in std::mem::take(&mut self.connections) {
            if let Some(socket) = transfer.socket.as_mut() {
                socket.disconnect();
            }
            if !transfer.result.is_abandoned() {
                transfer.result.set_error(err.clone());
                transfer.notify(EventKind::RequestCompleted { success: false });
            }
        }
    }
}
