#![allow(dead_code)]
//! Test harness utilities for parley-net integration tests.

use std::io;
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parley_net::framing::{self, read_frame, write_frame};
use parley_net::server::{CycleStats, Router, RouterConfig};
use parley_net::transport::{SocketPoller, TcpAcceptor};
use parley_net::LogObserver;
use parley_types::{ChatMessage, Envelope, Exit, NullStore, Presence, Response, SessionStore, Timestamp};

pub type TcpRouter = Router<TcpAcceptor, SocketPoller>;

/// Short poll timeout so test loops stay responsive.
pub fn test_config() -> RouterConfig {
    RouterConfig {
        poll_timeout: Duration::from_millis(10),
        ..RouterConfig::default()
    }
}

/// Bind a router on an ephemeral localhost port.
pub fn bind_router() -> (TcpRouter, String) {
    bind_router_with(test_config(), NullStore)
}

pub fn bind_router_with(
    config: RouterConfig,
    store: impl SessionStore + Send + 'static,
) -> (TcpRouter, String) {
    let router = Router::bind("127.0.0.1:0", config, store, LogObserver).unwrap();
    let addr = router.local_addr().unwrap().to_string();
    (router, addr)
}

/// Tick the router until `done` holds, or panic after `timeout`.
pub fn drive_until<F>(router: &mut TcpRouter, timeout: Duration, mut done: F)
where
    F: FnMut(&TcpRouter) -> bool,
{
    let start = Instant::now();
    while start.elapsed() < timeout {
        router.tick();
        if done(router) {
            return;
        }
    }
    panic!(
        "Timed out driving router ({} connections, {} clients)",
        router.connection_count(),
        router.client_count()
    );
}

/// Tick the router until the expected client count is reached.
pub fn drive_until_clients(router: &mut TcpRouter, expected: usize) {
    drive_until(router, Duration::from_secs(2), |r| r.client_count() == expected);
}

/// Tick the router, accumulating cycle statistics, until `done` holds for
/// the running totals.
pub fn drive_until_stats<F>(router: &mut TcpRouter, mut done: F) -> CycleStats
where
    F: FnMut(&CycleStats) -> bool,
{
    let start = Instant::now();
    let mut total = CycleStats::default();
    while start.elapsed() < Duration::from_secs(2) {
        let stats = router.tick();
        total.accepted += stats.accepted;
        total.frames += stats.frames;
        total.registered += stats.registered;
        total.delivered += stats.delivered;
        total.dropped += stats.dropped;
        total.deferred += stats.deferred;
        total.evicted += stats.evicted;
        if done(&total) {
            return total;
        }
    }
    panic!("Timed out driving router, totals so far: {:?}", total);
}

/// Tick the router for a fixed wall-clock span.
pub fn drive_for(router: &mut TcpRouter, span: Duration) {
    let start = Instant::now();
    while start.elapsed() < span {
        router.tick();
    }
}

/// Run the router on its own thread until the returned flag is set.
pub fn spawn_router(mut router: TcpRouter) -> (Arc<AtomicBool>, JoinHandle<TcpRouter>) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    let handle = std::thread::spawn(move || {
        router.run(&flag);
        router
    });
    (shutdown, handle)
}

pub fn stop_router(shutdown: Arc<AtomicBool>, handle: JoinHandle<TcpRouter>) -> TcpRouter {
    shutdown.store(true, Ordering::Relaxed);
    handle.join().unwrap()
}

/// A raw TCP client for protocol-level tests.
///
/// Because the tests are single-threaded, each request is split:
/// 1. `send_*()` writes one frame
/// 2. the test drives the router until the frame is processed
/// 3. `recv_*()` reads the reply
///
/// Never send a second frame before the router has read the first, or the
/// two may arrive in one read and be rejected as malformed.
pub struct RawClient {
    pub stream: TcpStream,
}

impl RawClient {
    pub fn connect(addr: &str) -> io::Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_read_timeout(Some(Duration::from_secs(5)))?;
        Ok(Self { stream })
    }

    pub fn send(&mut self, envelope: &Envelope) -> io::Result<()> {
        write_frame(&mut self.stream, &framing::encode(envelope))
    }

    pub fn send_raw(&mut self, bytes: &[u8]) -> io::Result<()> {
        use std::io::Write;
        self.stream.write_all(bytes)
    }

    pub fn send_presence(&mut self, name: &str) -> io::Result<()> {
        self.send(&Envelope::Presence(Presence::new(name, Timestamp::from("12:00:00"))))
    }

    pub fn send_chat(&mut self, from: &str, to: &str, text: &str) -> io::Result<()> {
        self.send(&chat(from, to, text))
    }

    pub fn send_exit(&mut self, name: &str) -> io::Result<()> {
        self.send(&Envelope::Exit(Exit {
            account_name: name.to_string(),
            time: Some(Timestamp::from("12:00:02")),
        }))
    }

    pub fn recv_frame(&mut self) -> io::Result<Option<Vec<u8>>> {
        read_frame(&mut self.stream)
    }

    pub fn recv_response(&mut self) -> Response {
        let frame = self.recv_frame().unwrap().expect("connection open");
        framing::decode_response(&frame)
            .unwrap()
            .expect("frame carries a response")
    }

    pub fn recv_envelope(&mut self) -> Envelope {
        let frame = self.recv_frame().unwrap().expect("connection open");
        framing::decode(&frame).unwrap()
    }

    /// True once the server has closed its side.
    pub fn is_closed(&mut self) -> bool {
        match self.recv_frame() {
            Ok(None) => true,
            Ok(Some(_)) => false,
            Err(e) => matches!(
                e.kind(),
                io::ErrorKind::ConnectionReset | io::ErrorKind::BrokenPipe
            ),
        }
    }

    /// True if nothing arrives within `wait`.
    pub fn is_silent(&mut self, wait: Duration) -> bool {
        self.stream.set_read_timeout(Some(wait)).unwrap();
        let silent = match self.recv_frame() {
            Err(e) => matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut),
            Ok(_) => false,
        };
        self.stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        silent
    }
}

/// Connect a raw client and register it under `name`.
pub fn login(router: &mut TcpRouter, addr: &str, name: &str) -> RawClient {
    let expected = router.client_count() + 1;
    let mut client = RawClient::connect(addr).unwrap();
    client.send_presence(name).unwrap();
    drive_until_clients(router, expected);
    assert_eq!(client.recv_response(), Response::ok());
    client
}

pub fn chat(from: &str, to: &str, text: &str) -> Envelope {
    Envelope::ChatMessage(ChatMessage {
        time: Timestamp::from("12:00:01"),
        sender: from.to_string(),
        destination: to.to_string(),
        message_text: text.to_string(),
    })
}
