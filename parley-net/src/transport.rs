//! Socket seams used by the router: accepting peers, polling readiness,
//! moving bytes.
//!
//! The router only talks to these traits, so it can be driven by real TCP
//! sockets in production and by scripted doubles in tests.

use std::collections::HashSet;
use std::fmt;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

#[cfg(unix)]
use std::os::unix::io::{AsRawFd, RawFd};

/// Router-assigned handle for one accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// A non-blocking bidirectional byte stream.
pub trait Connection {
    fn peer_addr(&self) -> SocketAddr;

    /// Read available bytes. `Ok(0)` means the peer closed the stream;
    /// `WouldBlock` means nothing was ready after all.
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write bytes without blocking. May write fewer bytes than given.
    fn send(&mut self, bytes: &[u8]) -> io::Result<usize>;
}

/// Source of new connections.
pub trait Acceptor {
    type Conn: Connection;

    /// Accept one pending connection, or `Ok(None)` if there is none.
    fn accept(&mut self) -> io::Result<Option<Self::Conn>>;
}

/// Connections that can be read or written without blocking.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Readiness {
    pub readable: HashSet<ConnectionId>,
    pub writable: HashSet<ConnectionId>,
}

impl Readiness {
    pub fn is_readable(&self, id: ConnectionId) -> bool {
        self.readable.contains(&id)
    }

    pub fn is_writable(&self, id: ConnectionId) -> bool {
        self.writable.contains(&id)
    }
}

/// Readiness polling over a set of connections.
pub trait Poller<C> {
    /// Wait at most `timeout` for any connection to become readable, and
    /// report which connections are readable and writable.
    fn poll(&mut self, conns: &[(ConnectionId, &C)], timeout: Duration) -> io::Result<Readiness>;
}

// =============================================================================
// TCP
// =============================================================================

/// Peer stream with its address captured at accept time.
pub struct TcpConnection {
    stream: TcpStream,
    peer: SocketAddr,
}

impl TcpConnection {
    pub fn new(stream: TcpStream, peer: SocketAddr) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true)?;
        Ok(Self { stream, peer })
    }
}

impl Connection for TcpConnection {
    fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }

    fn send(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.stream.write(bytes)
    }
}

#[cfg(unix)]
impl AsRawFd for TcpConnection {
    fn as_raw_fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }
}

/// Non-blocking TCP listener.
pub struct TcpAcceptor {
    listener: TcpListener,
}

impl TcpAcceptor {
    pub fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

impl Acceptor for TcpAcceptor {
    type Conn = TcpConnection;

    fn accept(&mut self) -> io::Result<Option<TcpConnection>> {
        match self.listener.accept() {
            Ok((stream, addr)) => TcpConnection::new(stream, addr).map(Some),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// `poll(2)`-based readiness for anything backed by a file descriptor.
#[cfg(unix)]
#[derive(Default)]
pub struct SocketPoller {
    fds: Vec<libc::pollfd>,
}

#[cfg(unix)]
impl SocketPoller {
    pub fn new() -> Self {
        Self::default()
    }

    fn wait(&mut self, timeout_ms: libc::c_int) -> io::Result<()> {
        loop {
            // SAFETY: `fds` is a live, exclusively borrowed buffer of
            // `fds.len()` initialized pollfd structs.
            let rc = unsafe {
                libc::poll(
                    self.fds.as_mut_ptr(),
                    self.fds.len() as libc::nfds_t,
                    timeout_ms,
                )
            };
            if rc >= 0 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }

    fn reset(&mut self, events: libc::c_short) {
        for fd in &mut self.fds {
            fd.events = events;
            fd.revents = 0;
        }
    }
}

#[cfg(unix)]
impl<C: AsRawFd> Poller<C> for SocketPoller {
    fn poll(&mut self, conns: &[(ConnectionId, &C)], timeout: Duration) -> io::Result<Readiness> {
        self.fds.clear();
        self.fds.extend(conns.iter().map(|(_, c)| libc::pollfd {
            fd: c.as_raw_fd(),
            events: 0,
            revents: 0,
        }));

        let mut readiness = Readiness::default();

        // Bounded wait for inbound data. Hang-ups and errors count as
        // readable so the following read observes them.
        self.reset(libc::POLLIN);
        let timeout_ms = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;
        self.wait(timeout_ms)?;
        let inbound = libc::POLLIN | libc::POLLHUP | libc::POLLERR | libc::POLLNVAL;
        for ((id, _), fd) in conns.iter().zip(&self.fds) {
            if fd.revents & inbound != 0 {
                readiness.readable.insert(*id);
            }
        }

        // Sockets are almost always writable, so check without waiting.
        self.reset(libc::POLLOUT);
        self.wait(0)?;
        for ((id, _), fd) in conns.iter().zip(&self.fds) {
            if fd.revents & libc::POLLOUT != 0 {
                readiness.writable.insert(*id);
            }
        }

        Ok(readiness)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn acceptor_reports_no_pending_connection() {
        let mut acceptor = TcpAcceptor::bind("127.0.0.1:0").unwrap();
        assert!(acceptor.accept().unwrap().is_none());
    }

    #[test]
    fn poller_sees_inbound_bytes_and_writability() {
        let mut acceptor = TcpAcceptor::bind("127.0.0.1:0").unwrap();
        let addr = acceptor.local_addr().unwrap();
        let mut peer = TcpStream::connect(addr).unwrap();

        let mut conn = None;
        for _ in 0..200 {
            if let Some(c) = acceptor.accept().unwrap() {
                conn = Some(c);
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        let mut conn = conn.expect("connection accepted");
        let id = ConnectionId(7);
        let mut poller = SocketPoller::new();

        let idle = poller.poll(&[(id, &conn)], Duration::from_millis(10)).unwrap();
        assert!(!idle.is_readable(id));
        assert!(idle.is_writable(id));

        peer.write_all(b"{}").unwrap();
        let ready = poller.poll(&[(id, &conn)], Duration::from_secs(2)).unwrap();
        assert!(ready.is_readable(id));

        let mut buf = [0u8; 16];
        assert_eq!(conn.recv(&mut buf).unwrap(), 2);
        let err = conn.recv(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    /// Write until the kernel refuses more bytes; returns how many went out.
    fn fill_send_buffer(conn: &mut TcpConnection) -> usize {
        let chunk = [0u8; 65536];
        let mut total = 0;
        while total < 64 * 1024 * 1024 {
            match conn.send(&chunk) {
                Ok(n) => total += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => panic!("send failed: {}", e),
            }
        }
        total
    }

    #[test]
    fn poller_leaves_out_a_peer_with_a_full_send_buffer() {
        let mut acceptor = TcpAcceptor::bind("127.0.0.1:0").unwrap();
        let addr = acceptor.local_addr().unwrap();
        // Never reads, so everything written to it piles up.
        let _peer = TcpStream::connect(addr).unwrap();

        let mut conn = None;
        for _ in 0..200 {
            if let Some(c) = acceptor.accept().unwrap() {
                conn = Some(c);
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        let mut conn = conn.expect("connection accepted");
        let id = ConnectionId(3);
        let mut poller = SocketPoller::new();
        assert!(poller
            .poll(&[(id, &conn)], Duration::from_millis(10))
            .unwrap()
            .is_writable(id));

        assert!(fill_send_buffer(&mut conn) > 0);
        // The kernel may drain some bytes into the peer's receive buffer.
        std::thread::sleep(Duration::from_millis(50));
        fill_send_buffer(&mut conn);

        let blocked = poller.poll(&[(id, &conn)], Duration::from_millis(10)).unwrap();
        assert!(!blocked.is_writable(id));
        assert!(!blocked.is_readable(id));
    }

    #[test]
    fn poller_with_no_connections_waits_out_the_timeout() {
        let mut poller = SocketPoller::new();
        let start = std::time::Instant::now();
        let ready = Poller::<TcpConnection>::poll(&mut poller, &[], Duration::from_millis(20)).unwrap();
        assert!(ready.readable.is_empty());
        assert!(start.elapsed() >= Duration::from_millis(15));
    }
}
