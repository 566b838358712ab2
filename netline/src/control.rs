//! The control worker: name resolution and connection establishment.
//!
//! Resolution and connect are the two blocking calls in the engine,
//! which is the reason this worker exists at all: parking them on their
//! own thread keeps the data worker's wait loop responsive for every
//! other request. Records arrive on the control channel in `Initial`
//! state and leave `Connected` on the data worker's queue.

use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;

use crossbeam_channel::Receiver;

use crate::config::Config;
use crate::data::DataShared;
use crate::error::{Error, Result};
use crate::observer::EventKind;
use crate::socket::Socket;
use crate::transfer::{Transfer, TransferState};

/// Worker entry point. Exits when the control channel disconnects,
/// which is the session shutting down.
pub(crate) fn run(control_rx: Receiver<Box<Transfer>>, data: Arc<DataShared>, config: Arc<Config>) {
    while let Ok(mut transfer) = control_rx.recv() {
        // Guard against queue reuse: anything past Initial is not ours.
        if transfer.state != TransferState::Initial {
            continue;
        }
        match establish(&mut transfer, &config) {
            Ok(()) => {
                transfer.state = TransferState::Connected;
                data.push_connected(transfer);
            }
            // A single request's failure never terminates the worker.
            Err(err) => {
                log::debug!("request {}: {err}", transfer.result.id());
                transfer.notify(EventKind::RequestCompleted { success: false });
                transfer.result.set_error(err);
            }
        }
    }
    log::trace!("control worker exiting");
}

/// Resolve the target and open the (possibly TLS) connection,
/// blocking. On success the socket is attached non-blocking.
fn establish(transfer: &mut Transfer, config: &Config) -> Result<()> {
    let host = transfer
        .request
        .url()
        .host_str()
        .ok_or_else(|| Error::Hostname("URL has no host".into()))?
        .to_string();
    let port = transfer.request.port();

    let addr = resolve(&host, port)?;
    transfer.addr = Some(addr);
    transfer.notify(EventKind::HostnameResolved { host: host.clone() });
    log::trace!(
        "request {}: {host}:{port} resolved to {addr}",
        transfer.result.id()
    );

    let socket = if transfer.request.is_tls() {
        Socket::connect_tls(
            addr,
            &host,
            config
                .tls_client
                .clone()
                .unwrap_or_else(crate::socket::default_tls_client),
            config.connect_timeout,
            config.io_timeout,
        )
    } else {
        Socket::connect_plain(addr, config.connect_timeout)
    }
    .map_err(|e| Error::Network(format!("failed to connect to {host}:{port}: {e}")))?;

    socket
        .set_nonblocking(true)
        .map_err(|e| Error::Network(e.to_string()))?;
    transfer.notify(EventKind::ConnectionOpened);
    log::trace!("request {}: connected to {addr}", transfer.result.id());
    transfer.socket = Some(socket);
    Ok(())
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    (host, port)
        .to_socket_addrs()
        .map_err(|e| Error::Hostname(format!("failed to resolve {host}: {e}")))?
        .next()
        .ok_or_else(|| Error::Hostname(format!("no addresses for {host}")))
}
