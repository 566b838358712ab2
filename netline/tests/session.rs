//! Integration tests: real sessions against loopback fixture servers.
//!
//! Each test binds a `TcpListener` on an OS-assigned port, serves one
//! canned HTTP exchange from a thread, and drives a real [`Session`]
//! against it.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use netline::{Error, EventKind, HttpRequest, Method, Session, UrlEvent};

// ── Fixture servers ─────────────────────────────────────────────────

/// Accept one connection, read the request preamble, send `response`,
/// close. Returns the bytes the client sent.
fn serve_once(response: Vec<u8>) -> (SocketAddr, JoinHandle<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = thread::spawn(move || {
        let (mut conn, _) = listener.accept().unwrap();
        let request = read_preamble(&mut conn);
        conn.write_all(&response).ok();
        request
    });
    (addr, handle)
}

/// Accept one connection, send `head`, then keep trickling body bytes
/// until the peer goes away. Models a response too large to finish.
fn serve_trickle(head: Vec<u8>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        let (mut conn, _) = listener.accept().unwrap();
        let _ = read_preamble(&mut conn);
        if conn.write_all(&head).is_err() {
            return;
        }
        let chunk = [b'x'; 1024];
        for _ in 0..500 {
            if conn.write_all(&chunk).is_err() {
                return;
            }
            thread::sleep(Duration::from_millis(10));
        }
    });
    addr
}

/// Accept one connection and never answer it.
fn serve_silence() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        let (mut conn, _) = listener.accept().unwrap();
        let _ = read_preamble(&mut conn);
        thread::sleep(Duration::from_secs(30));
    });
    addr
}

fn read_preamble(conn: &mut std::net::TcpStream) -> Vec<u8> {
    conn.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    while !request.windows(4).any(|window| window == b"\r\n\r\n") {
        match conn.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => request.extend_from_slice(&buf[..n]),
        }
    }
    request
}

fn url_for(addr: SocketAddr, path: &str) -> String {
    format!("http://{addr}{path}")
}

// ── Success paths ───────────────────────────────────────────────────

#[test]
fn successful_get() {
    let (addr, server) =
        serve_once(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello".to_vec());
    let session = Session::new().unwrap();
    let request = HttpRequest::for_url(&url_for(addr, "/")).unwrap();
    let result = session.submit(request, None).unwrap();

    let status = result.status().unwrap();
    assert_eq!(status.code, 200);
    assert_eq!(status.text, "OK");
    assert!(status.is_success());

    let headers = result.headers().unwrap();
    assert_eq!(&headers["Content-Length"], "5");

    assert_eq!(&result.body().unwrap()[..], b"hello");
    assert!(result.has_status());
    assert!(result.has_headers());
    assert!(result.has_body());
    assert!(result.is_completed());

    server.join().unwrap();
}

#[test]
fn blocking_getters_observe_monotone_stages() {
    let (addr, server) =
        serve_once(b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\nbody".to_vec());
    let session = Session::new().unwrap();
    let request = HttpRequest::for_url(&url_for(addr, "/")).unwrap();
    let result = session.submit(request, None).unwrap();

    // Each getter unblocks no earlier than the one before it, and once
    // a later stage is observable every earlier stage is too.
    let status = result.status().unwrap();
    assert!(result.has_status());
    let headers = result.headers().unwrap();
    assert!(result.has_status() && result.has_headers());
    let body = result.body().unwrap();
    assert!(result.has_status() && result.has_headers() && result.has_body());

    assert_eq!(status.code, 200);
    assert!(headers.contains("content-length"));
    assert_eq!(&body[..], b"body");
    server.join().unwrap();
}

#[test]
fn wire_preamble_is_exact() {
    let (addr, server) =
        serve_once(b"HTTP/1.1 204 No Content\r\n\r\n".to_vec());
    let session = Session::new().unwrap();
    let request = HttpRequest::for_url(&url_for(addr, "/path")).unwrap();
    let result = session.submit(request, None).unwrap();
    result.body().unwrap();

    // The port is OS-assigned, so the Host field carries the
    // non-default suffix.
    let expected = format!(
        "GET /path HTTP/1.1\r\n\
         Host: {addr}\r\n\
         Accept: */*\r\n\
         Accept-Encoding: gzip\r\n\
         Connection: close\r\n\
         \r\n"
    );
    assert_eq!(server.join().unwrap(), expected.as_bytes());
}

#[test]
fn query_is_part_of_the_target() {
    let (addr, server) = serve_once(b"HTTP/1.1 204 No Content\r\n\r\n".to_vec());
    let session = Session::new().unwrap();
    let request = HttpRequest::for_url(&url_for(addr, "/find?q=one&n=2")).unwrap();
    let result = session.submit(request, None).unwrap();
    result.body().unwrap();

    let sent = server.join().unwrap();
    assert!(sent.starts_with(b"GET /find?q=one&n=2 HTTP/1.1\r\n"));
}

#[test]
fn eof_terminated_body() {
    // No Content-Length: the body runs until the server closes.
    let (addr, server) =
        serve_once(b"HTTP/1.1 200 OK\r\n\r\nstream until close".to_vec());
    let session = Session::new().unwrap();
    let request = HttpRequest::for_url(&url_for(addr, "/")).unwrap();
    let result = session.submit(request, None).unwrap();
    assert_eq!(&result.body().unwrap()[..], b"stream until close");
    server.join().unwrap();
}

#[test]
fn gzip_body_is_decompressed() {
    let payload = b"the quick brown fox jumps over the lazy dog".repeat(100);
    let mut encoder =
        flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(&payload).unwrap();
    let compressed = encoder.finish().unwrap();

    let mut response = format!(
        "HTTP/1.1 200 OK\r\nContent-Encoding: gzip\r\nContent-Length: {}\r\n\r\n",
        compressed.len()
    )
    .into_bytes();
    response.extend_from_slice(&compressed);

    let (addr, server) = serve_once(response);
    let session = Session::new().unwrap();
    let request = HttpRequest::for_url(&url_for(addr, "/")).unwrap();
    let result = session.submit(request, None).unwrap();

    assert_eq!(&result.body().unwrap()[..], &payload[..]);
    server.join().unwrap();
}

#[test]
fn head_body_is_empty_regardless_of_extra_bytes() {
    let (addr, server) =
        serve_once(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello".to_vec());
    let session = Session::new().unwrap();
    let mut request = HttpRequest::for_url(&url_for(addr, "/")).unwrap();
    request.set_method(Method::head());
    let result = session.submit(request, None).unwrap();

    assert_eq!(result.status().unwrap().code, 200);
    assert!(result.body().unwrap().is_empty());
    let sent = server.join().unwrap();
    assert!(sent.starts_with(b"HEAD / HTTP/1.1\r\n"));
}

#[test]
fn status_204_body_is_empty_regardless_of_extra_bytes() {
    let (addr, server) =
        serve_once(b"HTTP/1.1 204 No Content\r\n\r\nstray bytes".to_vec());
    let session = Session::new().unwrap();
    let request = HttpRequest::for_url(&url_for(addr, "/")).unwrap();
    let result = session.submit(request, None).unwrap();
    assert!(result.body().unwrap().is_empty());
    server.join().unwrap();
}

// ── Option-driven behavior ──────────────────────────────────────────

#[test]
fn stop_on_error_skips_the_body() {
    let (addr, server) = serve_once(
        b"HTTP/1.1 404 Not Found\r\nContent-Length: 9\r\n\r\nnot found".to_vec(),
    );
    let session = Session::new().unwrap();
    let mut request = HttpRequest::for_url(&url_for(addr, "/missing")).unwrap();
    request.set_stop_on_error(true);
    let result = session.submit(request, None).unwrap();

    let status = result.status().unwrap();
    assert_eq!(status.code, 404);
    assert!(status.is_client_error());

    // The handle goes straight to the terminal success stage with an
    // empty body; nothing past the status line was decoded.
    assert!(result.body().unwrap().is_empty());
    assert!(result.headers().unwrap().is_empty());
    assert!(result.is_completed());
    server.join().unwrap();
}

#[test]
fn user_agent_and_extra_headers_are_sent() {
    let (addr, server) = serve_once(b"HTTP/1.1 204 No Content\r\n\r\n".to_vec());
    let session = Session::new().unwrap();
    let mut request = HttpRequest::for_url(&url_for(addr, "/")).unwrap();
    request.set_user_agent("netline-test/1.0");
    request
        .options_mut()
        .extra_headers
        .add("X-Trace", "abc123");
    let result = session.submit(request, None).unwrap();
    result.body().unwrap();

    let sent = String::from_utf8(server.join().unwrap()).unwrap();
    assert!(sent.contains("User-Agent: netline-test/1.0\r\n"));
    assert!(sent.contains("X-Trace: abc123\r\n"));
}

// ── Failure paths ───────────────────────────────────────────────────

#[test]
fn unsupported_scheme_fails_synchronously() {
    assert!(matches!(
        HttpRequest::for_url("httpx://x/"),
        Err(Error::UnsupportedProtocol(scheme)) if scheme == "httpx"
    ));
}

#[test]
fn short_body_is_an_unexpected_end() {
    let (addr, server) =
        serve_once(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nhel".to_vec());
    let session = Session::new().unwrap();
    let request = HttpRequest::for_url(&url_for(addr, "/")).unwrap();
    let result = session.submit(request, None).unwrap();

    assert_eq!(result.status().unwrap().code, 200);
    match result.body() {
        Err(Error::Network(message)) => assert_eq!(message, "unexpected end of data"),
        other => panic!("expected a network error, got {other:?}"),
    }
    server.join().unwrap();
}

#[test]
fn chunked_response_is_a_protocol_error() {
    let (addr, server) = serve_once(
        b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n0\r\n\r\n"
            .to_vec(),
    );
    let session = Session::new().unwrap();
    let request = HttpRequest::for_url(&url_for(addr, "/")).unwrap();
    let result = session.submit(request, None).unwrap();

    assert!(matches!(result.body(), Err(Error::Protocol(_))));
    server.join().unwrap();
}

#[test]
fn connect_failure_is_a_network_error() {
    // Bind then drop to find a port nothing is listening on.
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let session = Session::new().unwrap();
    let request = HttpRequest::for_url(&url_for(addr, "/")).unwrap();
    let result = session.submit(request, None).unwrap();
    assert!(matches!(result.status(), Err(Error::Network(_))));
}

#[test]
fn resolution_failure_is_a_hostname_error() {
    let session = Session::new().unwrap();
    let request = HttpRequest::for_url("http://no-such-host.invalid/").unwrap();
    let result = session.submit(request, None).unwrap();
    assert!(matches!(result.status(), Err(Error::Hostname(_))));
}

// ── Cancellation ────────────────────────────────────────────────────

#[test]
fn explicit_cancel_mid_body() {
    let addr = serve_trickle(
        b"HTTP/1.1 200 OK\r\nContent-Length: 99999999\r\n\r\n".to_vec(),
    );
    let session = Session::new().unwrap();
    let request = HttpRequest::for_url(&url_for(addr, "/big")).unwrap();
    let result = session.submit(request, None).unwrap();

    assert_eq!(result.status().unwrap().code, 200);
    session.cancel_result(&result);
    // Cancelling twice has the same observable outcome as once.
    session.cancel_result(&result);

    assert_eq!(result.body(), Err(Error::Canceled));
    assert!(result.is_completed());
}

#[test]
fn cancel_after_completion_is_a_no_op() {
    let (addr, server) =
        serve_once(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok".to_vec());
    let session = Session::new().unwrap();
    let request = HttpRequest::for_url(&url_for(addr, "/")).unwrap();
    let result = session.submit(request, None).unwrap();

    assert_eq!(&result.body().unwrap()[..], b"ok");
    session.cancel_result(&result);
    session.cancel(result.identity());
    // Give the data worker a beat to apply the (no-op) cancels.
    thread::sleep(Duration::from_millis(50));

    assert_eq!(&result.body().unwrap()[..], b"ok");
    assert!(result.is_completed());
    server.join().unwrap();
}

#[test]
fn dropping_the_result_abandons_the_request() {
    let addr = serve_trickle(
        b"HTTP/1.1 200 OK\r\nContent-Length: 99999999\r\n\r\n".to_vec(),
    );
    let session = Session::new().unwrap();
    let request = HttpRequest::for_url(&url_for(addr, "/big")).unwrap();
    let result = session.submit(request, None).unwrap();
    assert_eq!(result.status().unwrap().code, 200);

    // No error is published; there is nobody left to read it. The
    // engine just disconnects and moves on.
    drop(result);
    thread::sleep(Duration::from_millis(100));
}

#[test]
fn session_shutdown_fails_requests_in_flight() {
    let addr = serve_silence();
    let session = Session::new().unwrap();
    let request = HttpRequest::for_url(&url_for(addr, "/")).unwrap();
    let result = session.submit(request, None).unwrap();

    // Let the request reach the data worker, then tear the session
    // down underneath it.
    thread::sleep(Duration::from_millis(100));
    drop(session);

    assert_eq!(result.body(), Err(Error::Canceled));
}

// ── Observer events ─────────────────────────────────────────────────

#[test]
fn observer_sees_progress_and_completion() {
    let (addr, server) =
        serve_once(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello".to_vec());
    let session = Session::new().unwrap();
    let request = HttpRequest::for_url(&url_for(addr, "/")).unwrap();
    let (tx, rx) = crossbeam_channel::unbounded::<UrlEvent>();
    let result = session.submit(request, Some(tx)).unwrap();

    assert_eq!(&result.body().unwrap()[..], b"hello");

    let mut kinds = Vec::new();
    loop {
        let event = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("completion event never arrived");
        assert_eq!(event.id, result.identity());
        let done = matches!(event.kind, EventKind::RequestCompleted { .. });
        kinds.push(event.kind);
        if done {
            break;
        }
    }

    assert!(kinds.iter().any(|k| matches!(k, EventKind::HostnameResolved { .. })));
    assert!(kinds.iter().any(|k| matches!(k, EventKind::ConnectionOpened)));
    assert!(kinds.iter().any(|k| matches!(k, EventKind::BytesWritten { .. })));
    assert!(kinds.iter().any(|k| matches!(k, EventKind::HttpStatus { code: 200 })));
    assert!(kinds.iter().any(|k| matches!(k, EventKind::HttpHeaders)));
    assert!(matches!(
        kinds.last(),
        Some(EventKind::RequestCompleted { success: true })
    ));
    server.join().unwrap();
}

#[test]
fn observer_sees_failure_completion() {
    let session = Session::new().unwrap();
    let request = HttpRequest::for_url("http://no-such-host.invalid/").unwrap();
    let (tx, rx) = crossbeam_channel::unbounded::<UrlEvent>();
    let result = session.submit(request, Some(tx)).unwrap();

    assert!(result.status().is_err());
    let completed = rx
        .iter()
        .find(|event| matches!(event.kind, EventKind::RequestCompleted { .. }))
        .map(|event| event.kind);
    assert!(matches!(
        completed,
        Some(EventKind::RequestCompleted { success: false })
    ));
}

// ── Concurrency ─────────────────────────────────────────────────────

#[test]
fn many_requests_on_one_session() {
    let mut servers = Vec::new();
    for i in 0..8 {
        let body = format!("body-{i}");
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        );
        servers.push((serve_once(response.into_bytes()), body));
    }

    let session = Session::new().unwrap();
    let mut results = Vec::new();
    for ((addr, _), body) in &servers {
        let request = HttpRequest::for_url(&url_for(*addr, "/")).unwrap();
        results.push((session.submit(request, None).unwrap(), body.clone()));
    }

    // Completion order across requests is unordered; every handle
    // still delivers its own exchange.
    for (result, body) in results {
        assert_eq!(result.status().unwrap().code, 200);
        assert_eq!(&result.body().unwrap()[..], body.as_bytes());
    }
    for ((_, handle), _) in servers {
        handle.join().unwrap();
    }
}

#[test]
fn identifiers_are_unique_across_submissions() {
    let (addr_a, server_a) = serve_once(b"HTTP/1.1 204 No Content\r\n\r\n".to_vec());
    let (addr_b, server_b) = serve_once(b"HTTP/1.1 204 No Content\r\n\r\n".to_vec());
    let session = Session::new().unwrap();

    let a = session
        .submit(HttpRequest::for_url(&url_for(addr_a, "/")).unwrap(), None)
        .unwrap();
    let b = session
        .submit(HttpRequest::for_url(&url_for(addr_b, "/")).unwrap(), None)
        .unwrap();
    assert_ne!(a.identity(), b.identity());

    a.body().unwrap();
    b.body().unwrap();
    server_a.join().unwrap();
    server_b.join().unwrap();
}
