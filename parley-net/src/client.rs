//! Console chat client.
//!
//! Connects to a relay, announces presence and then splits into two halves:
//! the caller keeps a writer for outgoing messages, and a background thread
//! reads inbound frames from its own clone of the socket.

use std::io;
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::thread::{self, JoinHandle};

use log::{debug, info, warn};
use thiserror::Error;

use parley_types::{ChatMessage, Envelope, Exit, Presence, Timestamp};

use crate::framing::{self, DecodeError, MAX_FRAME_SIZE};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("{0}")]
    Decode(#[from] DecodeError),
    #[error("server refused request ({code}): {error}")]
    Server { code: u16, error: String },
    #[error("server closed the connection without a response")]
    MissingResponse,
    #[error("message too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },
}

/// Local wall-clock time in the `HH:MM:SS` form clients put on envelopes.
pub fn clock_now() -> Timestamp {
    Timestamp::Clock(chrono::Local::now().format("%H:%M:%S").to_string())
}

/// A connected, registered chat account.
pub struct ChatClient {
    writer: TcpStream,
    account_name: String,
    server: SocketAddr,
}

impl ChatClient {
    /// Connect and register `account_name`.
    ///
    /// Fails with [`ClientError::Server`] when the relay refuses the name.
    ///
    /// The relay holds back chat for a newly registered name until the tick
    /// after its reply, so the reply normally arrives alone. Frames carry no
    /// delimiter, though: a reader slower than the relay's tick can still
    /// see the reply and the first message in one read, which then fails to
    /// decode as a response.
    pub fn connect<A: ToSocketAddrs>(addr: A, account_name: &str) -> Result<Self, ClientError> {
        let mut stream = TcpStream::connect(addr)?;
        let server = stream.peer_addr()?;
        info!("connected to {}", server);

        let presence = Envelope::Presence(Presence::new(account_name, clock_now()));
        framing::write_frame(&mut stream, &framing::encode(&presence))?;

        let frame = framing::read_frame(&mut stream)?.ok_or(ClientError::MissingResponse)?;
        let response = framing::decode_response(&frame)?.ok_or(ClientError::MissingResponse)?;
        if !response.is_ok() {
            return Err(ClientError::Server {
                code: response.response,
                error: response.error.unwrap_or_default(),
            });
        }
        info!("registered as '{}'", account_name);

        Ok(Self {
            writer: stream,
            account_name: account_name.to_string(),
            server,
        })
    }

    pub fn account_name(&self) -> &str {
        &self.account_name
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.server
    }

    /// Send `text` to `destination`.
    ///
    /// The relay gives no delivery receipt; an unknown destination is
    /// dropped silently on the server.
    pub fn send_message(&mut self, destination: &str, text: &str) -> Result<(), ClientError> {
        let envelope = Envelope::ChatMessage(ChatMessage {
            time: clock_now(),
            sender: self.account_name.clone(),
            destination: destination.to_string(),
            message_text: text.to_string(),
        });
        self.send(&envelope)
    }

    /// Announce a clean disconnect. The relay closes the connection after it.
    pub fn send_exit(&mut self) -> Result<(), ClientError> {
        let envelope = Envelope::Exit(Exit {
            account_name: self.account_name.clone(),
            time: Some(clock_now()),
        });
        self.send(&envelope)
    }

    fn send(&mut self, envelope: &Envelope) -> Result<(), ClientError> {
        let frame = framing::encode(envelope);
        if frame.len() > MAX_FRAME_SIZE {
            return Err(ClientError::FrameTooLarge {
                size: frame.len(),
                max: MAX_FRAME_SIZE,
            });
        }
        framing::write_frame(&mut self.writer, &frame)?;
        debug!("sent {} frame ({} bytes)", envelope.action(), frame.len());
        Ok(())
    }

    /// Start the inbound thread.
    ///
    /// Messages addressed to this account are handed to `on_message`; any
    /// other frame is logged and skipped. The thread ends when the relay
    /// closes the socket or a read fails.
    pub fn spawn_listener<F>(&self, mut on_message: F) -> Result<JoinHandle<()>, ClientError>
    where
        F: FnMut(ChatMessage) + Send + 'static,
    {
        let mut reader = self.writer.try_clone()?;
        let account = self.account_name.clone();
        let handle = thread::Builder::new()
            .name("parley-listener".into())
            .spawn(move || loop {
                let frame = match framing::read_frame(&mut reader) {
                    Ok(Some(frame)) => frame,
                    Ok(None) => {
                        info!("relay closed the connection");
                        break;
                    }
                    Err(e) => {
                        warn!("read from relay failed: {}", e);
                        break;
                    }
                };
                match framing::decode(&frame) {
                    Ok(Envelope::ChatMessage(message)) if message.destination == account => {
                        on_message(message)
                    }
                    Ok(other) => debug!("ignoring {} frame", other.action()),
                    Err(e) => warn!("undecodable frame from relay: {}", e),
                }
            })?;
        Ok(handle)
    }

    /// Close both directions of the socket, which also ends the listener.
    pub fn shutdown(&self) -> Result<(), ClientError> {
        match self.writer.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
