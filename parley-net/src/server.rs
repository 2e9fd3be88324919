//! Relay server: the single-threaded routing loop.
//!
//! One [`Router`] owns the listener, every accepted connection, the client
//! directory and the pending-message queue. Each [`Router::tick`] runs four
//! phases: accept, readiness poll, inbound (one frame per readable peer),
//! outbound (drain the queue to write-ready recipients).

use std::collections::{BTreeMap, HashSet};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use thiserror::Error;

use parley_types::protocol::{ERR_ALREADY_REGISTERED, ERR_BAD_REQUEST, ERR_NAME_TAKEN};
use parley_types::{ChatMessage, Envelope, Exit, Presence, Response, SessionStore};

use crate::directory::Directory;
use crate::framing::{self, DecodeError, MAX_FRAME_SIZE};
use crate::observer::Observer;
use crate::outbox::{Outbox, Pending};
use crate::transport::{Acceptor, Connection, ConnectionId, Poller, Readiness};

/// How long a tick may wait for inbound data.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(500);

/// What to do with a message whose recipient is not write-ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryPolicy {
    /// Drop the message and evict the recipient as stalled.
    #[default]
    EvictOnBlock,
    /// Keep the message queued for up to `max_cycles` more ticks, then
    /// evict the recipient.
    Retry { max_cycles: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouterConfig {
    pub poll_timeout: Duration,
    pub delivery: DeliveryPolicy,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            delivery: DeliveryPolicy::default(),
        }
    }
}

/// Lifecycle of a connection as seen by the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// Accepted, no presence yet.
    Connecting,
    /// Holds a directory entry.
    Registered,
}

/// Why a connection was closed.
#[derive(Debug, Error)]
pub enum Eviction {
    #[error("{0}")]
    Decode(#[from] DecodeError),
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),
    #[error("peer closed the connection")]
    Disconnected,
    #[error("unrecognized request")]
    Protocol,
    #[error("account name '{0}' is taken")]
    NameTaken(String),
    #[error("exit requested")]
    Exit,
    #[error("not writable while a message was pending")]
    Stalled,
    #[error("server shutting down")]
    Shutdown,
}

/// Why a queued message was not delivered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingFailure {
    #[error("destination '{0}' is not registered")]
    UnknownDestination(String),
    #[error("destination '{0}' is not writable")]
    NotWritable(String),
    #[error("message for '{destination}' re-encodes to {size} bytes (max {max})")]
    Oversized {
        destination: String,
        size: usize,
        max: usize,
    },
}

/// Counters for one tick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleStats {
    pub accepted: usize,
    pub frames: usize,
    pub registered: usize,
    pub delivered: usize,
    pub dropped: usize,
    pub deferred: usize,
    pub evicted: usize,
}

struct Peer<C> {
    conn: C,
    addr: SocketAddr,
}

/// The relay's routing engine.
pub struct Router<A: Acceptor, P> {
    acceptor: A,
    poller: P,
    peers: BTreeMap<ConnectionId, Peer<A::Conn>>,
    directory: Directory,
    outbox: Outbox,
    /// Registered during the current tick; held back from delivery so the
    /// presence reply is the only frame they get this tick.
    fresh: HashSet<ConnectionId>,
    next_id: u64,
    config: RouterConfig,
    store: Box<dyn SessionStore + Send>,
    observer: Box<dyn Observer + Send>,
}

#[cfg(unix)]
impl Router<crate::transport::TcpAcceptor, crate::transport::SocketPoller> {
    /// Bind a TCP router to an address.
    pub fn bind(
        addr: &str,
        config: RouterConfig,
        store: impl SessionStore + Send + 'static,
        observer: impl Observer + Send + 'static,
    ) -> io::Result<Self> {
        let acceptor = crate::transport::TcpAcceptor::bind(addr)?;
        let router = Self::new(
            acceptor,
            crate::transport::SocketPoller::new(),
            config,
            store,
            observer,
        );
        router
            .observer
            .info(format_args!("relay listening on {}", router.local_addr()?));
        Ok(router)
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.acceptor.local_addr()
    }
}

impl<A, P> Router<A, P>
where
    A: Acceptor,
    P: Poller<A::Conn>,
{
    pub fn new(
        acceptor: A,
        poller: P,
        config: RouterConfig,
        store: impl SessionStore + Send + 'static,
        observer: impl Observer + Send + 'static,
    ) -> Self {
        Self {
            acceptor,
            poller,
            peers: BTreeMap::new(),
            directory: Directory::new(),
            outbox: Outbox::new(),
            fresh: HashSet::new(),
            next_id: 0,
            config,
            store: Box::new(store),
            observer: Box::new(observer),
        }
    }

    /// Tick until `shutdown` is set, then close every connection.
    ///
    /// The flag is checked between ticks, so the current tick always
    /// completes.
    pub fn run(&mut self, shutdown: &AtomicBool) {
        self.observer.info(format_args!("router started"));
        while !shutdown.load(Ordering::Relaxed) {
            self.tick();
        }
        self.close_all();
        self.observer.info(format_args!("router stopped"));
    }

    /// Run one accept / poll / inbound / outbound iteration.
    pub fn tick(&mut self) -> CycleStats {
        let mut stats = CycleStats::default();
        self.fresh.clear();
        self.accept_connections(&mut stats);
        let readiness = self.poll_readiness();
        self.process_inbound(&readiness, &mut stats);
        self.deliver_pending(&readiness, &mut stats);
        stats
    }

    /// Close every connection, logging out registered accounts.
    pub fn close_all(&mut self) {
        let ids: Vec<ConnectionId> = self.peers.keys().copied().collect();
        let mut stats = CycleStats::default();
        for id in ids {
            self.evict(id, Eviction::Shutdown, &mut stats);
        }
    }

    /// Open connections, registered or not.
    pub fn connection_count(&self) -> usize {
        self.peers.len()
    }

    /// Registered accounts.
    pub fn client_count(&self) -> usize {
        self.directory.len()
    }

    pub fn is_registered(&self, account_name: &str) -> bool {
        self.directory.lookup(account_name).is_some()
    }

    pub fn registered_names(&self) -> Vec<String> {
        self.directory.names()
    }

    /// Messages still queued (only non-zero under the retry policy).
    pub fn pending_count(&self) -> usize {
        self.outbox.len()
    }

    /// `None` once the connection is closed.
    pub fn peer_state(&self, id: ConnectionId) -> Option<PeerState> {
        if !self.peers.contains_key(&id) {
            return None;
        }
        Some(match self.directory.name_of(id) {
            Some(_) => PeerState::Registered,
            None => PeerState::Connecting,
        })
    }

    /// Connection currently bound to an account.
    pub fn connection_of(&self, account_name: &str) -> Option<ConnectionId> {
        self.directory.lookup(account_name)
    }

    // -------------------------------------------------------------------------
    // Phases
    // -------------------------------------------------------------------------

    fn accept_connections(&mut self, stats: &mut CycleStats) {
        loop {
            match self.acceptor.accept() {
                Ok(Some(conn)) => {
                    let id = ConnectionId(self.next_id);
                    self.next_id += 1;
                    let addr = conn.peer_addr();
                    self.peers.insert(id, Peer { conn, addr });
                    stats.accepted += 1;
                    self.observer
                        .info(format_args!("{} connected from {}", id, addr));
                }
                Ok(None) => break,
                Err(e) => {
                    self.observer.error(format_args!("accept error: {}", e));
                    break;
                }
            }
        }
    }

    fn poll_readiness(&mut self) -> Readiness {
        let conns: Vec<(ConnectionId, &A::Conn)> =
            self.peers.iter().map(|(id, peer)| (*id, &peer.conn)).collect();
        match self.poller.poll(&conns, self.config.poll_timeout) {
            Ok(readiness) => readiness,
            Err(e) => {
                self.observer.debug(format_args!("poll error: {}", e));
                Readiness::default()
            }
        }
    }

    fn process_inbound(&mut self, readiness: &Readiness, stats: &mut CycleStats) {
        let mut ready: Vec<ConnectionId> = readiness.readable.iter().copied().collect();
        ready.sort();

        for id in ready {
            match self.read_frame(id) {
                Ok(Some(frame)) => {
                    stats.frames += 1;
                    match framing::decode(&frame) {
                        Ok(envelope) => self.handle_envelope(id, envelope, stats),
                        Err(e) => self.evict(id, Eviction::Decode(e), stats),
                    }
                }
                Ok(None) => {}
                Err(reason) => self.evict(id, reason, stats),
            }
        }
    }

    fn deliver_pending(&mut self, readiness: &Readiness, stats: &mut CycleStats) {
        for pending in self.outbox.drain() {
            let destination = pending.message.destination.clone();
            let Some(target) = self.directory.lookup(&destination) else {
                stats.dropped += 1;
                self.observer.error(format_args!(
                    "message from '{}' dropped: {}",
                    pending.message.sender,
                    RoutingFailure::UnknownDestination(destination)
                ));
                continue;
            };

            let sender = pending.message.sender.clone();
            let frame = framing::encode(&Envelope::ChatMessage(pending.message.clone()));
            if frame.len() > MAX_FRAME_SIZE {
                stats.dropped += 1;
                self.observer.error(format_args!(
                    "message from '{}' dropped: {}",
                    sender,
                    RoutingFailure::Oversized {
                        destination,
                        size: frame.len(),
                        max: MAX_FRAME_SIZE,
                    }
                ));
                continue;
            }

            if self.fresh.contains(&target) {
                stats.deferred += 1;
                self.outbox.hold(pending);
                continue;
            }

            if !readiness.is_writable(target) {
                self.handle_unwritable(target, pending, stats);
                continue;
            }

            let Some(peer) = self.peers.get_mut(&target) else {
                stats.dropped += 1;
                continue;
            };
            match send_frame(&mut peer.conn, &frame) {
                Ok(()) => {
                    stats.delivered += 1;
                    self.observer.info(format_args!(
                        "'{}' sent a message to '{}'",
                        sender, destination
                    ));
                }
                Err(e) => {
                    stats.dropped += 1;
                    self.evict(target, Eviction::Transport(e), stats);
                }
            }
        }
    }

    fn handle_unwritable(&mut self, target: ConnectionId, pending: Pending, stats: &mut CycleStats) {
        let failure = RoutingFailure::NotWritable(pending.message.destination.clone());
        match self.config.delivery {
            DeliveryPolicy::Retry { max_cycles } if pending.waited < max_cycles => {
                stats.deferred += 1;
                self.observer.debug(format_args!(
                    "{}; retrying ({}/{})",
                    failure,
                    pending.waited + 1,
                    max_cycles
                ));
                self.outbox.defer(pending);
            }
            _ => {
                stats.dropped += 1;
                self.observer.info(format_args!(
                    "message from '{}' dropped: {}",
                    pending.message.sender, failure
                ));
                self.evict(target, Eviction::Stalled, stats);
            }
        }
    }

    // -------------------------------------------------------------------------
    // Inbound handling
    // -------------------------------------------------------------------------

    fn read_frame(&mut self, id: ConnectionId) -> Result<Option<Vec<u8>>, Eviction> {
        let Some(peer) = self.peers.get_mut(&id) else {
            return Ok(None);
        };
        let mut buf = [0u8; MAX_FRAME_SIZE];
        match peer.conn.recv(&mut buf) {
            Ok(0) => Err(Eviction::Disconnected),
            Ok(n) => Ok(Some(buf[..n].to_vec())),
            Err(ref e)
                if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) =>
            {
                Ok(None)
            }
            Err(e) => Err(Eviction::Transport(e)),
        }
    }

    fn handle_envelope(&mut self, id: ConnectionId, envelope: Envelope, stats: &mut CycleStats) {
        self.observer
            .debug(format_args!("{} sent {:?}", id, envelope));
        match envelope {
            Envelope::Presence(presence) => self.handle_presence(id, presence, stats),
            Envelope::ChatMessage(message) => self.enqueue(message),
            Envelope::Exit(exit) => self.handle_exit(id, exit, stats),
            Envelope::Invalid => {
                // Best effort; the connection goes either way.
                let _ = self.reply(id, &Response::bad_request(ERR_BAD_REQUEST));
                self.evict(id, Eviction::Protocol, stats);
            }
        }
    }

    fn handle_presence(&mut self, id: ConnectionId, presence: Presence, stats: &mut CycleStats) {
        let name = presence.account_name();

        if let Some(current) = self.directory.name_of(id).map(str::to_owned) {
            if current != name {
                self.observer.info(format_args!(
                    "{} is registered as '{}', refusing presence as '{}'",
                    id, current, name
                ));
                if let Err(e) = self.reply(id, &Response::bad_request(ERR_ALREADY_REGISTERED)) {
                    self.evict(id, Eviction::Transport(e), stats);
                }
                return;
            }
        }

        let newly = self.directory.name_of(id).is_none();
        match self.directory.register(name, id) {
            Ok(()) => {
                if newly {
                    stats.registered += 1;
                    self.fresh.insert(id);
                    self.record_login(id, name);
                }
                if let Err(e) = self.reply(id, &Response::ok()) {
                    self.evict(id, Eviction::Transport(e), stats);
                }
            }
            Err(taken) => {
                self.observer.info(format_args!("{} refused: {}", id, taken));
                let _ = self.reply(id, &Response::bad_request(ERR_NAME_TAKEN));
                self.evict(id, Eviction::NameTaken(taken.name), stats);
            }
        }
    }

    fn record_login(&mut self, id: ConnectionId, name: &str) {
        let Some(addr) = self.peers.get(&id).map(|p| p.addr) else {
            return;
        };
        self.observer
            .info(format_args!("{} registered as '{}' from {}", id, name, addr));
        if let Err(e) = self.store.on_login(name, addr) {
            self.observer
                .error(format_args!("failed to record login of '{}': {}", name, e));
        }
    }

    fn enqueue(&mut self, message: ChatMessage) {
        self.outbox.enqueue(message);
    }

    fn handle_exit(&mut self, id: ConnectionId, exit: Exit, stats: &mut CycleStats) {
        match self.directory.lookup(&exit.account_name) {
            Some(holder) if holder == id => self.evict(id, Eviction::Exit, stats),
            Some(holder) => self.observer.debug(format_args!(
                "{} sent exit for '{}' held by {}; ignored",
                id, exit.account_name, holder
            )),
            None => self.observer.debug(format_args!(
                "{} sent exit for unknown account '{}'; ignored",
                id, exit.account_name
            )),
        }
    }

    fn reply(&mut self, id: ConnectionId, response: &Response) -> io::Result<()> {
        let Some(peer) = self.peers.get_mut(&id) else {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "connection closed"));
        };
        send_frame(&mut peer.conn, &framing::encode_response(response))
    }

    /// Remove a connection and its directory entry together. Closing an
    /// already-closed connection is a no-op.
    fn evict(&mut self, id: ConnectionId, reason: Eviction, stats: &mut CycleStats) {
        let Some(peer) = self.peers.remove(&id) else {
            return;
        };
        stats.evicted += 1;

        let account = self.directory.unregister_conn(id);
        let who = match &account {
            Some(name) => format!("{} '{}' ({})", id, name, peer.addr),
            None => format!("{} ({})", id, peer.addr),
        };
        match reason {
            Eviction::Transport(_) | Eviction::Decode(_) => {
                self.observer.error(format_args!("{} evicted: {}", who, reason))
            }
            _ => self.observer.info(format_args!("{} closed: {}", who, reason)),
        }

        if let Some(name) = account {
            if let Err(e) = self.store.on_logout(&name) {
                self.observer
                    .error(format_args!("failed to record logout of '{}': {}", name, e));
            }
        }
        drop(peer);
    }
}

/// Write a whole frame in one non-blocking call.
fn send_frame<C: Connection>(conn: &mut C, frame: &[u8]) -> io::Result<()> {
    let written = conn.send(frame)?;
    if written < frame.len() {
        return Err(io::Error::new(
            io::ErrorKind::WriteZero,
            format!("short write: {} of {} bytes", written, frame.len()),
        ));
    }
    Ok(())
}
