//! The multi-object wait.
//!
//! The data worker blocks in exactly one place: [`WaitList::wait`],
//! a `poll(2)` across a heterogeneous list of descriptors. By
//! convention slot 0 is the session's [`EventFd`] (the control
//! semaphore of the wait) and every further slot is one live
//! connection's socket.
//!
//! `EVENT_CANCELLED` is a custom bit that never reaches the kernel:
//! an entry whose wanted mask carries it is reported ready by the next
//! `wait` without blocking, which is how a cancellation overrides
//! whatever I/O the socket was waiting for.

use std::io;
use std::os::fd::RawFd;

/// Event mask for wait-list entries.
pub(crate) type Events = u16;

/// The descriptor has bytes to read (or the eventfd was raised).
pub(crate) const EVENT_READ: Events = 1 << 0;
/// The descriptor is writable.
pub(crate) const EVENT_WRITE: Events = 1 << 1;
/// The peer hung up or the socket is in an error state.
pub(crate) const EVENT_DISCONNECTED: Events = 1 << 2;
/// The descriptor is not a valid open file.
pub(crate) const EVENT_INVALID: Events = 1 << 3;
/// Custom: the request behind this entry was cancelled.
pub(crate) const EVENT_CANCELLED: Events = 1 << 4;

/// One waited-on descriptor: what is wanted, and what the last wait
/// reported.
pub(crate) struct WaitEntry {
    pub fd: RawFd,
    pub wanted: Events,
    pub ready: Events,
}

/// An ordered list of descriptors to wait on together.
pub(crate) struct WaitList {
    entries: Vec<WaitEntry>,
    pollfds: Vec<libc::pollfd>,
}

impl WaitList {
    pub fn new() -> WaitList {
        WaitList {
            entries: Vec::new(),
            pollfds: Vec::new(),
        }
    }

    /// Drop every entry; the caller rebuilds the list from scratch.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn push(&mut self, fd: RawFd, wanted: Events) {
        self.entries.push(WaitEntry {
            fd,
            wanted,
            ready: 0,
        });
    }

    pub fn entries(&self) -> &[WaitEntry] {
        &self.entries
    }

    /// Overwrite the wanted mask of the entry for `fd`. Returns false
    /// when no such entry exists.
    pub fn set_wanted(&mut self, fd: RawFd, wanted: Events) -> bool {
        match self.entries.iter_mut().find(|e| e.fd == fd) {
            Some(entry) => {
                entry.wanted = wanted;
                true
            }
            None => false,
        }
    }

    /// Block until at least one entry is ready, fill in every entry's
    /// `ready` mask, and return the ready count.
    ///
    /// Entries wanting `EVENT_CANCELLED` are ready by definition; when
    /// any exist the kernel poll degrades to a readiness snapshot
    /// instead of a block.
    pub fn wait(&mut self) -> io::Result<usize> {
        self.pollfds.clear();
        let mut have_cancelled = false;
        for entry in &self.entries {
            let mut events: libc::c_short = 0;
            if entry.wanted & EVENT_CANCELLED != 0 {
                have_cancelled = true;
            } else {
                if entry.wanted & EVENT_READ != 0 {
                    events |= libc::POLLIN;
                }
                if entry.wanted & EVENT_WRITE != 0 {
                    events |= libc::POLLOUT;
                }
            }
            self.pollfds.push(libc::pollfd {
                fd: entry.fd,
                events,
                revents: 0,
            });
        }

        let timeout: libc::c_int = if have_cancelled { 0 } else { -1 };
        loop {
            let rc = unsafe {
                libc::poll(
                    self.pollfds.as_mut_ptr(),
                    self.pollfds.len() as libc::nfds_t,
                    timeout,
                )
            };
            if rc < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }
            break;
        }

        let mut ready = 0;
        for (entry, pollfd) in self.entries.iter_mut().zip(&self.pollfds) {
            entry.ready = 0;
            if entry.wanted & EVENT_CANCELLED != 0 {
                entry.ready = EVENT_CANCELLED;
                ready += 1;
                continue;
            }
            if pollfd.revents & libc::POLLNVAL != 0 {
                entry.ready |= EVENT_INVALID;
            }
            if pollfd.revents & libc::POLLIN != 0 {
                entry.ready |= EVENT_READ;
            }
            if pollfd.revents & libc::POLLOUT != 0 {
                entry.ready |= EVENT_WRITE;
            }
            if pollfd.revents & (libc::POLLHUP | libc::POLLERR) != 0 {
                entry.ready |= EVENT_DISCONNECTED;
            }
            if entry.ready != 0 {
                ready += 1;
            }
        }
        Ok(ready)
    }
}

/// A kernel counter used to wake the data worker from other threads.
pub(crate) struct EventFd(RawFd);

impl EventFd {
    pub fn new() -> io::Result<EventFd> {
        let fd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(EventFd(fd))
    }

    /// Bump the counter, making the descriptor readable.
    pub fn raise(&self) {
        let val: u64 = 1;
        unsafe {
            libc::write(self.0, &val as *const u64 as *const libc::c_void, 8);
        }
    }

    /// Consume the counter, clearing readability until the next raise.
    pub fn drain(&self) {
        let mut val: u64 = 0;
        unsafe {
            libc::read(self.0, &mut val as *mut u64 as *mut libc::c_void, 8);
        }
    }

    pub fn raw(&self) -> RawFd {
        self.0
    }
}

impl Drop for EventFd {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eventfd_raise_makes_slot_zero_ready() {
        let eventfd = EventFd::new().unwrap();
        let mut list = WaitList::new();
        list.push(eventfd.raw(), EVENT_READ);

        eventfd.raise();
        let ready = list.wait().unwrap();
        assert_eq!(ready, 1);
        assert_eq!(list.entries()[0].ready, EVENT_READ);

        // Draining clears readiness; raising twice still drains once.
        eventfd.drain();
        eventfd.raise();
        eventfd.raise();
        assert_eq!(list.wait().unwrap(), 1);
        eventfd.drain();
    }

    #[test]
    fn cancelled_entries_are_ready_without_blocking() {
        let eventfd = EventFd::new().unwrap();
        let quiet = EventFd::new().unwrap();
        let mut list = WaitList::new();
        list.push(eventfd.raw(), EVENT_READ);
        list.push(quiet.raw(), EVENT_CANCELLED);

        // Nothing was raised; the cancelled entry alone satisfies the
        // wait immediately.
        let ready = list.wait().unwrap();
        assert_eq!(ready, 1);
        assert_eq!(list.entries()[0].ready, 0);
        assert_eq!(list.entries()[1].ready, EVENT_CANCELLED);
    }

    #[test]
    fn set_wanted_overwrites_by_fd() {
        let eventfd = EventFd::new().unwrap();
        let mut list = WaitList::new();
        list.push(eventfd.raw(), EVENT_READ);
        assert!(list.set_wanted(eventfd.raw(), EVENT_CANCELLED));
        assert!(!list.set_wanted(eventfd.raw() + 1000, EVENT_READ));
        assert_eq!(list.entries()[0].wanted, EVENT_CANCELLED);
    }

    #[test]
    fn closed_descriptor_reports_invalid() {
        let eventfd = EventFd::new().unwrap();
        let raw = eventfd.raw();
        drop(eventfd);

        let mut list = WaitList::new();
        list.push(raw, EVENT_READ);
        let ready = list.wait().unwrap();
        assert_eq!(ready, 1);
        assert_eq!(list.entries()[0].ready, EVENT_INVALID);
    }
}
