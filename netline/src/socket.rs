//! Plain and TLS client sockets.
//!
//! The control worker establishes these blocking (TCP connect, then the
//! full TLS handshake for `https`) and flips them non-blocking before
//! handing them to the data worker. From then on every read can return
//! `WouldBlock` and the data worker cycles back through its wait.
//!
//! TLS ciphertext is pumped by hand: `read_tls` feeds the rustls state
//! machine, `process_new_packets` advances it, `reader()` yields
//! plaintext, and anything the machine `wants_write` is flushed with
//! `write_tls`.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::os::fd::{AsRawFd, RawFd};
use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection, RootCertStore};

/// Build the default rustls client configuration: the webpki root
/// store, no client auth.
pub(crate) fn default_tls_client() -> Arc<ClientConfig> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    Arc::new(
        ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth(),
    )
}

/// A connected client socket, plain or TLS.
pub(crate) enum Socket {
    Plain(TcpStream),
    Tls(Box<TlsStream>),
}

/// TCP stream plus the rustls connection speaking through it.
pub(crate) struct TlsStream {
    tcp: TcpStream,
    tls: ClientConnection,
}

impl Socket {
    /// Open a plain TCP connection. Blocking, bounded by
    /// `connect_timeout`.
    pub fn connect_plain(addr: SocketAddr, connect_timeout: Duration) -> io::Result<Socket> {
        let tcp = TcpStream::connect_timeout(&addr, connect_timeout)?;
        tcp.set_nodelay(true)?;
        Ok(Socket::Plain(tcp))
    }

    /// Open a TLS connection and complete the handshake. Blocking,
    /// bounded by `connect_timeout` for the TCP connect and
    /// `io_timeout` per handshake I/O step.
    pub fn connect_tls(
        addr: SocketAddr,
        host: &str,
        config: Arc<ClientConfig>,
        connect_timeout: Duration,
        io_timeout: Duration,
    ) -> io::Result<Socket> {
        let mut tcp = TcpStream::connect_timeout(&addr, connect_timeout)?;
        tcp.set_nodelay(true)?;
        tcp.set_read_timeout(Some(io_timeout))?;
        tcp.set_write_timeout(Some(io_timeout))?;

        let name = ServerName::try_from(host.to_string())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let mut tls = ClientConnection::new(config, name).map_err(io::Error::other)?;
        while tls.is_handshaking() {
            tls.complete_io(&mut tcp)?;
        }

        tcp.set_read_timeout(None)?;
        tcp.set_write_timeout(None)?;
        Ok(Socket::Tls(Box::new(TlsStream { tcp, tls })))
    }

    /// Switch the underlying stream between blocking and non-blocking.
    pub fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        self.tcp().set_nonblocking(nonblocking)
    }

    /// The raw descriptor, for the wait list.
    pub fn as_raw_fd(&self) -> RawFd {
        self.tcp().as_raw_fd()
    }

    /// Read plaintext. Returns `Ok(0)` at end of stream and
    /// `WouldBlock` when nothing is ready.
    pub fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Socket::Plain(tcp) => tcp.read(buf),
            Socket::Tls(stream) => stream.read(buf),
        }
    }

    /// Write the whole of `data`. `WouldBlock` is retried after a short
    /// writability poll bounded by `io_timeout`; a fresh connection's
    /// send buffer swallows a preamble-sized write, so the retry path
    /// is a safety net, not a steady state.
    pub fn write_all(&mut self, data: &[u8], io_timeout: Duration) -> io::Result<()> {
        match self {
            Socket::Plain(tcp) => {
                let fd = tcp.as_raw_fd();
                let mut written = 0;
                while written < data.len() {
                    match tcp.write(&data[written..]) {
                        Ok(0) => {
                            return Err(io::Error::new(
                                io::ErrorKind::WriteZero,
                                "socket refused further writes",
                            ));
                        }
                        Ok(n) => written += n,
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                            poll_writable(fd, io_timeout)?;
                        }
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                        Err(e) => return Err(e),
                    }
                }
                Ok(())
            }
            Socket::Tls(stream) => {
                stream.tls.writer().write_all(data)?;
                stream.flush_tls(io_timeout)
            }
        }
    }

    /// Drop the connection. For TLS the close_notify alert is flushed
    /// on a best-effort basis first.
    pub fn disconnect(&mut self) {
        match self {
            Socket::Plain(tcp) => {
                let _ = tcp.shutdown(Shutdown::Both);
            }
            Socket::Tls(stream) => {
                stream.tls.send_close_notify();
                let _ = stream.flush_tls(Duration::from_millis(100));
                let _ = stream.tcp.shutdown(Shutdown::Both);
            }
        }
    }

    fn tcp(&self) -> &TcpStream {
        match self {
            Socket::Plain(tcp) => tcp,
            Socket::Tls(stream) => &stream.tcp,
        }
    }
}

impl TlsStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            // Serve buffered plaintext before touching the socket.
            match self.tls.reader().read(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                // Peer closed without close_notify. Truncation is still
                // caught against Content-Length upstream.
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(0),
                Err(e) => return Err(e),
            }

            match self.tls.read_tls(&mut self.tcp) {
                Ok(0) => return Ok(0),
                Ok(_) => {
                    self.tls
                        .process_new_packets()
                        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
                    if self.tls.wants_write() {
                        // Post-handshake output (alerts, key updates).
                        let _ = self.tls.write_tls(&mut self.tcp);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Push all pending ciphertext out to the socket.
    fn flush_tls(&mut self, io_timeout: Duration) -> io::Result<()> {
        let fd = self.tcp.as_raw_fd();
        while self.tls.wants_write() {
            match self.tls.write_tls(&mut self.tcp) {
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    poll_writable(fd, io_timeout)?;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

/// Block until `fd` is writable or the timeout lapses.
fn poll_writable(fd: RawFd, timeout: Duration) -> io::Result<()> {
    let mut pfd = libc::pollfd {
        fd,
        events: libc::POLLOUT,
        revents: 0,
    };
    let millis = timeout.as_millis().min(i32::MAX as u128) as i32;
    loop {
        let rc = unsafe { libc::poll(&mut pfd, 1, millis) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }
        if rc == 0 {
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "timed out waiting for socket writability",
            ));
        }
        return Ok(());
    }
}
