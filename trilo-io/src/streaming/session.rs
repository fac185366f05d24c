//! Session handler for the one connected controller
//!
//! Owns an accepted command connection from accept to teardown.
//!
//! # Connection Lifecycle
//!
//! ```text
//! 1. Arbiter accepts the connection           -> Accepted
//! 2. Video relay starts (peer ip, video port)
//! 3. Read loop: line -> decode -> dispatch    -> Active
//!    replies are written back synchronously
//! 4. Peer close / exit / read error / server stop
//! 5. Video relay stops, socket is shut down   -> Terminated
//! 6. Arbiter releases the session slot
//! ```
//!
//! # Error Handling
//!
//! - **Malformed line** (bad JSON, missing action, bad parameters): logged,
//!   loop continues, nothing is written back
//! - **Unknown action**: logged by the dispatcher, loop continues
//! - **Oversized line**: connection closed
//! - **Read/write failure or actuator fault**: session ends, cleanup runs

use crate::core::dispatcher::{CommandDispatcher, Dispatch};
use crate::error::Error;
use crate::streaming::messages::{Command, ProtocolError};
use crate::streaming::video_relay::VideoRelay;
use crate::streaming::wire::{MAX_LINE_LEN, encode_line};
use parking_lot::Mutex;
use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Initial capacity for the line buffer (typical command size)
const INITIAL_LINE_CAPACITY: usize = 256;

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Accepted,
    Active,
    Terminated,
}

/// Why a session ended
#[derive(Debug)]
pub enum SessionEnd {
    /// Peer closed the connection
    PeerClosed,
    /// Client sent `exit`
    ClientExit,
    /// Server is shutting down
    ServerStopping,
    /// Line exceeded [`MAX_LINE_LEN`]
    Oversized,
    /// Read or write failure
    Transport(std::io::Error),
    /// Dispatcher hit an error it could not recover from
    Fatal(Error),
}

/// One accepted command connection
#[derive(Debug)]
pub struct Session {
    id: u64,
    peer: SocketAddr,
    stream: TcpStream,
    state: Arc<Mutex<SessionState>>,
}

impl Session {
    pub fn new(id: u64, peer: SocketAddr, stream: TcpStream) -> Self {
        Self {
            id,
            peer,
            stream,
            state: Arc::new(Mutex::new(SessionState::Accepted)),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Shared view of the lifecycle state
    pub fn state_handle(&self) -> Arc<Mutex<SessionState>> {
        Arc::clone(&self.state)
    }

    fn set_state(&self, state: SessionState) {
        *self.state.lock() = state;
    }
}

/// Runs the read loop for one [`Session`]
pub struct SessionHandler {
    dispatcher: CommandDispatcher,
    relay: Arc<VideoRelay>,
    video_port: u16,
    /// Global running flag (server shutdown)
    running: Arc<AtomicBool>,
}

impl SessionHandler {
    pub fn new(
        dispatcher: CommandDispatcher,
        relay: Arc<VideoRelay>,
        video_port: u16,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            dispatcher,
            relay,
            video_port,
            running,
        }
    }

    /// Serve `session` until it ends, then tear down its video relay and socket.
    pub fn run(&self, session: Session) -> SessionEnd {
        let peer = session.peer();
        log::info!("Client connected: {} (session {})", peer, session.id());

        if let Err(e) = self.relay.start(&peer.ip().to_string(), self.video_port) {
            log::error!("Failed to start video relay for {}: {}", peer, e);
        }

        session.set_state(SessionState::Active);
        let end = match session.stream.try_clone() {
            Ok(reader) => self.read_loop(reader, &session.stream),
            Err(e) => SessionEnd::Transport(e),
        };

        match &end {
            SessionEnd::PeerClosed => log::info!("Client {} closed the connection", peer),
            SessionEnd::ClientExit => log::info!("Client {} ended the session", peer),
            SessionEnd::ServerStopping => log::info!("Closing session with {} for shutdown", peer),
            SessionEnd::Oversized => log::warn!(
                "Client {} sent a line over {} bytes, disconnecting",
                peer,
                MAX_LINE_LEN
            ),
            SessionEnd::Transport(e)
                if matches!(
                    e.kind(),
                    ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted
                ) =>
            {
                log::warn!("Client {} reset the connection.", peer)
            }
            SessionEnd::Transport(e) => log::error!("Error handling client {}: {}", peer, e),
            SessionEnd::Fatal(e) => log::error!("Unexpected error handling client {}: {}", peer, e),
        }

        self.relay.stop();
        let _ = session.stream.shutdown(Shutdown::Both);
        session.set_state(SessionState::Terminated);
        log::info!("Client disconnected: {}", peer);
        end
    }

    fn read_loop(&self, reader: TcpStream, writer: &TcpStream) -> SessionEnd {
        let mut reader = BufReader::new(reader);
        let mut line = Vec::with_capacity(INITIAL_LINE_CAPACITY);

        loop {
            if !self.running.load(Ordering::SeqCst) {
                return SessionEnd::ServerStopping;
            }

            line.clear();
            let read = reader
                .by_ref()
                .take(MAX_LINE_LEN as u64 + 1)
                .read_until(b'\n', &mut line);

            match read {
                Ok(0) => return SessionEnd::PeerClosed,
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(_) if !self.running.load(Ordering::SeqCst) => {
                    return SessionEnd::ServerStopping;
                }
                Err(e) => return SessionEnd::Transport(e),
            }

            if line.last() != Some(&b'\n') && line.len() > MAX_LINE_LEN {
                return SessionEnd::Oversized;
            }

            let Some(command) = decode_line(&line) else {
                continue;
            };

            match self.dispatcher.dispatch(command) {
                Ok(Dispatch::Continue) => {}
                Ok(Dispatch::Reply(reply)) => {
                    let bytes = match encode_line(&reply) {
                        Ok(bytes) => bytes,
                        Err(e) => return SessionEnd::Fatal(e),
                    };
                    let mut out = writer;
                    if let Err(e) = out.write_all(&bytes) {
                        return SessionEnd::Transport(e);
                    }
                }
                Ok(Dispatch::Terminate) => return SessionEnd::ClientExit,
                Err(e) => return SessionEnd::Fatal(e),
            }
        }
    }
}

/// Decode one raw line, logging and skipping anything unusable.
fn decode_line(raw: &[u8]) -> Option<Command> {
    let text = match std::str::from_utf8(raw) {
        Ok(text) => text.trim(),
        Err(_) => {
            log::warn!("Ignoring command: {}", ProtocolError::NotUtf8);
            return None;
        }
    };
    if text.is_empty() {
        return None;
    }

    match Command::decode(text) {
        Ok(command) => {
            log::debug!("Received command: {:?}", command);
            Some(command)
        }
        Err(ProtocolError::Syntax(e)) => {
            log::error!("Failed to decode JSON: {} ({})", text, e);
            None
        }
        Err(ProtocolError::MissingAction) => {
            log::warn!("Received command without 'action': {}", text);
            None
        }
        Err(e) => {
            log::error!("Error processing command {}: {}", text, e);
            None
        }
    }
}
