//! Networking for the parley chat relay.
//!
//! The relay is a single-threaded router over non-blocking sockets: it
//! accepts connections, decodes one JSON frame per readable peer, keeps a
//! directory of named accounts and forwards queued messages to their
//! destination. The client half connects, registers and exchanges messages.

pub mod client;
pub mod directory;
pub mod framing;
pub mod observer;
pub mod outbox;
pub mod server;
pub mod transport;
pub mod validate;

pub use client::{ChatClient, ClientError};
pub use directory::{Directory, NameTaken};
pub use framing::{DecodeError, MAX_FRAME_SIZE};
pub use observer::{LogObserver, Observer};
pub use outbox::{Outbox, Pending};
pub use server::{CycleStats, DeliveryPolicy, Eviction, PeerState, Router, RouterConfig, RoutingFailure};
pub use transport::{Acceptor, Connection, ConnectionId, Poller, Readiness, TcpAcceptor, TcpConnection};

#[cfg(unix)]
pub use transport::SocketPoller;
