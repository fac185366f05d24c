//! Command server: accepts controllers and admits one at a time
//!
//! ## Threads
//!
//! - **tcp-accept**: blocks in `accept()`; admits or rejects each connection
//! - **tcp-session**: one per admitted client, runs a [`SessionHandler`]
//!
//! Only one client at a time. A second connection while the slot is taken is
//! sent `{"error":"Server busy"}` and closed; it never becomes a session.
//!
//! ## Shutdown
//!
//! ```text
//! 1. running = false
//! 2. video relay stop (bounded)
//! 3. self-connect to the listener so the blocked accept returns
//! 4. join accept loop (bounded); listener closes when the loop exits
//! 5. shut down the active session socket, join it (bounded)
//! ```

use crate::config::Config;
use crate::core::actuators::SharedActuators;
use crate::core::dispatcher::CommandDispatcher;
use crate::error::{Error, Result};
use crate::streaming::frame_buffer::FrameBuffer;
use crate::streaming::messages::Reply;
use crate::streaming::session::{Session, SessionHandler, SessionState};
use crate::streaming::video_relay::VideoRelay;
use crate::streaming::wire::encode_line;
use crate::threads::Worker;
use parking_lot::Mutex;
use std::io::{ErrorKind, Write};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

/// Pause after a failed accept so a persistent error (e.g. fd exhaustion)
/// does not spin the loop
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Settings the server needs from [`Config`]
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listener address, `host:port`. Port 0 picks a free port.
    pub bind_address: String,
    /// Client-side UDP port video is sent to
    pub video_port: u16,
    pub join_timeout: Duration,
    pub relay_join_timeout: Duration,
    pub wake_timeout: Duration,
}

impl ServerConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            bind_address: config.command_bind_address(),
            video_port: config.network.video_port,
            join_timeout: config.shutdown.join_timeout(),
            relay_join_timeout: config.shutdown.relay_join_timeout(),
            wake_timeout: config.shutdown.wake_timeout(),
        }
    }
}

/// Snapshot of the admitted session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: u64,
    pub peer: SocketAddr,
    pub state: SessionState,
}

/// Unblocks an `accept()` by connecting to the listener once.
#[derive(Debug, Clone)]
pub struct ListenerWaker {
    target: SocketAddr,
    timeout: Duration,
}

impl ListenerWaker {
    /// Waker for a listener bound to `local`. Wildcard binds are reached
    /// over loopback.
    pub fn for_listener(local: SocketAddr, timeout: Duration) -> Self {
        let ip = match local.ip() {
            IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
            IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
            ip => ip,
        };
        Self {
            target: SocketAddr::new(ip, local.port()),
            timeout,
        }
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// Connect and immediately drop. Failure is logged; the caller's bounded
    /// join still applies.
    pub fn wake(&self) {
        match TcpStream::connect_timeout(&self.target, self.timeout) {
            Ok(stream) => {
                let _ = stream.shutdown(Shutdown::Both);
                log::debug!("Woke accept loop via {}", self.target);
            }
            Err(e) => log::warn!("Could not wake accept loop at {}: {}", self.target, e),
        }
    }
}

/// The admitted session, as seen by the arbiter
struct ActiveSession {
    id: u64,
    peer: SocketAddr,
    /// Clone of the session socket, used to unblock its read on shutdown
    control: TcpStream,
    state: Arc<Mutex<SessionState>>,
    worker: Worker,
}

/// The bound listener and its accept loop
struct AcceptLoop {
    local_addr: SocketAddr,
    waker: ListenerWaker,
    worker: Worker,
}

/// State shared with the accept and session threads
struct ServerContext {
    running: Arc<AtomicBool>,
    slot: Mutex<Option<ActiveSession>>,
    next_session_id: AtomicU64,
    actuators: SharedActuators,
    relay: Arc<VideoRelay>,
    video_port: u16,
}

/// Single-session TCP command server
pub struct CommandServer {
    config: ServerConfig,
    context: Arc<ServerContext>,
    accept: Mutex<Option<AcceptLoop>>,
}

impl CommandServer {
    /// Create a stopped server. Video for each session is read from `frames`.
    pub fn new(
        config: ServerConfig,
        actuators: SharedActuators,
        frames: Arc<FrameBuffer>,
    ) -> Result<Self> {
        let relay = VideoRelay::new(frames, config.relay_join_timeout)?;
        let context = ServerContext {
            running: Arc::new(AtomicBool::new(false)),
            slot: Mutex::new(None),
            next_session_id: AtomicU64::new(1),
            actuators,
            relay: Arc::new(relay),
            video_port: config.video_port,
        };

        Ok(Self {
            config,
            context: Arc::new(context),
            accept: Mutex::new(None),
        })
    }

    /// Bind the listener and start accepting. Returns the bound address.
    ///
    /// No-op (returning the existing address) if already started.
    pub fn start(&self) -> Result<SocketAddr> {
        let mut accept = self.accept.lock();
        if let Some(existing) = accept.as_ref() {
            log::warn!("Command server already running on {}", existing.local_addr);
            return Ok(existing.local_addr);
        }

        let bind_addr = &self.config.bind_address;
        let listener = TcpListener::bind(bind_addr)
            .map_err(|e| Error::Other(format!("Failed to bind to {}: {}", bind_addr, e)))?;
        let local_addr = listener.local_addr()?;

        self.context.running.store(true, Ordering::SeqCst);
        let context = Arc::clone(&self.context);
        let worker = Worker::spawn("tcp-accept", move || accept_loop(listener, context));
        let worker = match worker {
            Ok(worker) => worker,
            Err(e) => {
                self.context.running.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };

        log::info!("TCP server listening on {}", local_addr);
        *accept = Some(AcceptLoop {
            local_addr,
            waker: ListenerWaker::for_listener(local_addr, self.config.wake_timeout),
            worker,
        });
        Ok(local_addr)
    }

    /// Stop accepting, end the active session and wait (bounded) for all
    /// server threads. Safe to call when not started.
    pub fn stop(&self) {
        let Some(accept) = self.accept.lock().take() else {
            log::debug!("Command server is not running");
            return;
        };

        log::info!("Stopping TCP server...");
        self.context.running.store(false, Ordering::SeqCst);
        self.context.relay.stop();

        accept.waker.wake();
        if accept.worker.join_timeout(self.config.join_timeout) {
            log::debug!("Accept loop stopped");
        }

        let active = self.context.slot.lock().take();
        if let Some(active) = active {
            log::info!("Closing active session {} ({})", active.id, active.peer);
            let _ = active.control.shutdown(Shutdown::Both);
            active.worker.join_timeout(self.config.join_timeout);
        }

        log::info!("TCP server stopped");
    }

    pub fn is_running(&self) -> bool {
        self.accept.lock().is_some()
    }

    /// Bound listener address, while running
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.accept.lock().as_ref().map(|a| a.local_addr)
    }

    pub fn active_session(&self) -> Option<SessionInfo> {
        self.context.slot.lock().as_ref().map(|active| SessionInfo {
            id: active.id,
            peer: active.peer,
            state: *active.state.lock(),
        })
    }

    /// True while the video relay is sending to a client
    pub fn is_streaming(&self) -> bool {
        self.context.relay.is_running()
    }
}

impl Drop for CommandServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn accept_loop(listener: TcpListener, context: Arc<ServerContext>) {
    loop {
        match listener.accept() {
            Ok((stream, peer)) => {
                if !context.running.load(Ordering::SeqCst) {
                    log::debug!("Accept loop woken by {} for shutdown", peer);
                    break;
                }
                context.admit(stream, peer);
            }
            Err(_) if !context.running.load(Ordering::SeqCst) => break,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => {
                log::error!("Accept error: {}", e);
                std::thread::sleep(ACCEPT_ERROR_BACKOFF);
            }
        }
    }
    log::info!("Accept loop finished");
}

impl ServerContext {
    /// Admit `stream` as the session, or reject it if the slot is taken.
    fn admit(self: &Arc<Self>, stream: TcpStream, peer: SocketAddr) {
        let mut slot = self.slot.lock();
        if let Some(active) = slot.as_ref() {
            log::warn!(
                "Another client ({}) tried to connect while {} is active. Rejecting.",
                peer,
                active.peer
            );
            reject_busy(stream, peer);
            return;
        }

        let control = match stream.try_clone() {
            Ok(control) => control,
            Err(e) => {
                log::error!("Failed to set up session for {}: {}", peer, e);
                return;
            }
        };

        let id = self.next_session_id.fetch_add(1, Ordering::SeqCst);
        let session = Session::new(id, peer, stream);
        let state = session.state_handle();

        let handler = SessionHandler::new(
            CommandDispatcher::new(Arc::clone(&self.actuators)),
            Arc::clone(&self.relay),
            self.video_port,
            Arc::clone(&self.running),
        );
        let context = Arc::clone(self);
        let worker = Worker::spawn("tcp-session", move || {
            handler.run(session);
            context.release(id);
        });

        match worker {
            Ok(worker) => {
                *slot = Some(ActiveSession {
                    id,
                    peer,
                    control,
                    state,
                    worker,
                });
            }
            Err(e) => {
                log::error!("Failed to start session for {}: {}", peer, e);
                let _ = control.shutdown(Shutdown::Both);
            }
        }
    }

    /// Free the slot if it still holds session `id`.
    fn release(&self, id: u64) {
        let mut slot = self.slot.lock();
        if slot.as_ref().is_some_and(|active| active.id == id) {
            *slot = None;
            log::debug!("Session {} released", id);
        }
    }
}

/// Send the busy reply and close.
fn reject_busy(stream: TcpStream, peer: SocketAddr) {
    match encode_line(&Reply::busy()) {
        Ok(bytes) => {
            let mut stream = &stream;
            if let Err(e) = stream.write_all(&bytes) {
                log::debug!("Failed to send busy reply to {}: {}", peer, e);
            }
        }
        Err(e) => log::error!("Failed to encode busy reply: {}", e),
    }
    let _ = stream.shutdown(Shutdown::Both);
}
