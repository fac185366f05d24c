//! Controller-side link to a TriloIO robot.
//!
//! A [`RobotLink`] owns one command connection and one video socket at a
//! time. `connect` opens both and starts a receiver thread for each;
//! `disconnect` tears everything down and may be called from anywhere,
//! including the receiver threads themselves.
//!
//! Replies and disconnect notifications arrive as [`LinkEvent`]s on the
//! channel returned by [`RobotLink::events`]. The channel holds the most
//! recent [`EVENT_QUEUE_CAPACITY`] events; older ones are dropped when
//! nobody drains it.

use crate::config::PilotConfig;
use crate::error::{PilotError, Result};
use crate::receivers::{ReplyReceiver, VideoReceiver};
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use image::{DynamicImage, ImageFormat};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::io::{self, ErrorKind, Write};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, Shutdown, SocketAddr, TcpStream, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use trilo_io::streaming::{Command, Frame, FrameBuffer, Reply, encode_line};
use trilo_io::threads::Worker;

/// Something that happened on the link
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// One line from the robot; `reply` is `None` if the shape is unknown
    Reply { line: String, reply: Option<Reply> },
    /// The link went down, for whatever reason
    Disconnected,
}

/// Events kept for a caller that is not draining [`RobotLink::events`]
pub const EVENT_QUEUE_CAPACITY: usize = 256;

/// Bounded event channel that drops the oldest event when full
#[derive(Clone)]
pub(crate) struct EventQueue {
    tx: Sender<LinkEvent>,
    rx: Receiver<LinkEvent>,
}

impl EventQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        Self { tx, rx }
    }

    pub(crate) fn subscribe(&self) -> Receiver<LinkEvent> {
        self.rx.clone()
    }

    pub(crate) fn push(&self, event: LinkEvent) {
        let mut event = event;
        loop {
            match self.tx.try_send(event) {
                Ok(()) => return,
                Err(TrySendError::Full(back)) => {
                    if let Ok(dropped) = self.rx.try_recv() {
                        log::debug!("Event queue full, dropping {:?}", dropped);
                    }
                    event = back;
                }
                // We hold a receiver, so this cannot happen
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }
}

/// Sockets and threads of one connection
struct LinkSession {
    robot: SocketAddr,
    stream: TcpStream,
    video_addr: SocketAddr,
    running: Arc<AtomicBool>,
    workers: Vec<Worker>,
}

pub(crate) struct LinkInner {
    config: PilotConfig,
    session: Mutex<Option<LinkSession>>,
    video: Arc<FrameBuffer>,
    events: EventQueue,
}

/// Handle to the robot link; clones share the same connection
#[derive(Clone)]
pub struct RobotLink {
    inner: Arc<LinkInner>,
}

impl RobotLink {
    pub fn new(config: PilotConfig) -> Self {
        Self {
            inner: Arc::new(LinkInner {
                config,
                session: Mutex::new(None),
                video: Arc::new(FrameBuffer::new()),
                events: EventQueue::new(EVENT_QUEUE_CAPACITY),
            }),
        }
    }

    pub fn config(&self) -> &PilotConfig {
        &self.inner.config
    }

    pub fn is_connected(&self) -> bool {
        self.inner.session.lock().is_some()
    }

    /// Robot command address while connected
    pub fn robot_addr(&self) -> Option<SocketAddr> {
        self.inner.session.lock().as_ref().map(|s| s.robot)
    }

    /// Local address of the video socket while connected
    pub fn video_addr(&self) -> Option<SocketAddr> {
        self.inner.session.lock().as_ref().map(|s| s.video_addr)
    }

    /// Inbound replies and disconnect notifications
    pub fn events(&self) -> Receiver<LinkEvent> {
        self.inner.events.subscribe()
    }

    /// Connect to the robot at `host`.
    ///
    /// Succeeds without doing anything if already connected. On failure
    /// nothing is left open.
    pub fn connect(&self, host: &str) -> Result<()> {
        let mut slot = self.inner.session.lock();
        if let Some(session) = slot.as_ref() {
            log::warn!("Already connected to {}", session.robot);
            return Ok(());
        }

        let config = &self.inner.config;
        let robot = config.command_address(host)?;
        log::info!("Connecting to {}...", robot);

        let timeout = config.connect_timeout();
        let stream = TcpStream::connect_timeout(&robot, timeout)
            .map_err(|e| connect_error(robot, timeout, e))?;
        if let Err(e) = stream.set_nodelay(true) {
            log::debug!("Failed to set TCP_NODELAY: {}", e);
        }
        log::info!("Command channel connected to {}", robot);

        let session = match self.open_session(robot, stream) {
            Ok(session) => session,
            Err(e) => {
                log::error!("Failed to set up link to {}: {}", robot, e);
                return Err(e);
            }
        };
        log::info!("Video listening on {}", session.video_addr);

        *slot = Some(session);
        Ok(())
    }

    /// Bind the video socket and start both receivers. Everything opened
    /// here is closed again on error.
    fn open_session(&self, robot: SocketAddr, stream: TcpStream) -> Result<LinkSession> {
        let config = &self.inner.config;
        let close = |stream: &TcpStream| {
            let _ = stream.shutdown(Shutdown::Both);
        };

        let bind_addr = config.video_bind_address();
        let video = match UdpSocket::bind(&bind_addr) {
            Ok(video) => video,
            Err(source) => {
                close(&stream);
                return Err(PilotError::Bind {
                    addr: bind_addr,
                    source,
                });
            }
        };

        let setup = video
            .set_read_timeout(Some(config.video_recv_timeout()))
            .and_then(|()| video.local_addr())
            .and_then(|addr| stream.try_clone().map(|reader| (addr, reader)));
        let (video_addr, reader) = match setup {
            Ok(setup) => setup,
            Err(e) => {
                close(&stream);
                return Err(PilotError::Io(e));
            }
        };

        let running = Arc::new(AtomicBool::new(true));
        let mut workers = Vec::with_capacity(2);

        let video_receiver = VideoReceiver::new(
            video,
            robot.ip(),
            Arc::clone(&self.inner.video),
            Arc::clone(&running),
        );
        let reply_receiver = ReplyReceiver::new(
            reader,
            self.inner.events.clone(),
            Arc::clone(&running),
            Arc::downgrade(&self.inner),
        );

        let abort = |workers: Vec<Worker>, e: trilo_io::Error| {
            running.store(false, Ordering::SeqCst);
            close(&stream);
            wake_video(video_addr);
            for worker in workers {
                worker.join_timeout(config.join_timeout());
            }
            PilotError::from(e)
        };

        match Worker::spawn("video-receiver", move || video_receiver.run()) {
            Ok(worker) => workers.push(worker),
            Err(e) => return Err(abort(workers, e)),
        }
        match Worker::spawn("reply-receiver", move || reply_receiver.run()) {
            Ok(worker) => workers.push(worker),
            Err(e) => return Err(abort(workers, e)),
        }

        Ok(LinkSession {
            robot,
            stream,
            video_addr,
            running,
            workers,
        })
    }

    /// Send a typed command as one JSON line.
    ///
    /// A write failure takes the link down.
    pub fn send(&self, command: &Command) -> Result<()> {
        let bytes = encode_line(command)?;
        self.write_line(command.action(), &bytes)
    }

    /// Send `action` with arbitrary `parameters`.
    ///
    /// Nothing is validated here; the robot logs and ignores what it does
    /// not understand.
    pub fn send_action(&self, action: &str, parameters: Map<String, Value>) -> Result<()> {
        let mut message = parameters;
        message.insert("action".to_string(), Value::String(action.to_string()));
        let bytes = encode_line(&Value::Object(message))?;
        self.write_line(action, &bytes)
    }

    fn write_line(&self, action: &str, bytes: &[u8]) -> Result<()> {
        let result = {
            let slot = self.inner.session.lock();
            let Some(session) = slot.as_ref() else {
                log::warn!("Cannot send '{}': not connected", action);
                return Err(PilotError::NotConnected);
            };
            let mut stream = &session.stream;
            stream.write_all(bytes)
        };

        match result {
            Ok(()) => {
                log::debug!("Sent: {}", String::from_utf8_lossy(bytes).trim_end());
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to send '{}': {}", action, e);
                self.disconnect();
                Err(PilotError::Connection(e))
            }
        }
    }

    /// Close the link. Safe to call repeatedly and from any thread.
    pub fn disconnect(&self) {
        self.inner.disconnect();
    }

    /// Most recent video frame, as received
    pub fn latest_frame(&self) -> Option<Frame> {
        self.inner.video.latest()
    }

    /// Most recent video frame, decoded
    pub fn latest_image(&self) -> Option<DynamicImage> {
        let frame = self.latest_frame()?;
        match image::load_from_memory_with_format(&frame, ImageFormat::Jpeg) {
            Ok(image) => Some(image),
            Err(e) => {
                log::warn!("Failed to decode {} byte frame: {}", frame.len(), e);
                None
            }
        }
    }
}

impl LinkInner {
    pub(crate) fn disconnect(&self) {
        let Some(session) = self.session.lock().take() else {
            log::debug!("Not connected");
            return;
        };

        log::info!("Disconnecting from {}...", session.robot);
        session.running.store(false, Ordering::SeqCst);

        // Best effort: the robot may already be gone
        if let Ok(bytes) = encode_line(&Command::Exit) {
            let mut stream = &session.stream;
            if let Err(e) = stream.write_all(&bytes) {
                log::debug!("Could not send exit: {}", e);
            }
        }
        let _ = session.stream.shutdown(Shutdown::Both);
        wake_video(session.video_addr);

        for worker in session.workers {
            worker.join_timeout(self.config.join_timeout());
        }

        self.video.clear();
        self.events.push(LinkEvent::Disconnected);
        log::info!("Disconnected.");
    }
}

impl Drop for LinkInner {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Classify a failed command connect
fn connect_error(robot: SocketAddr, timeout: Duration, e: io::Error) -> PilotError {
    match e.kind() {
        ErrorKind::TimedOut | ErrorKind::WouldBlock => {
            log::error!("Connection to {} timed out ({:?})", robot, timeout);
            PilotError::ConnectTimeout {
                addr: robot,
                timeout,
            }
        }
        ErrorKind::ConnectionRefused => {
            log::error!("Connection refused by {}", robot);
            PilotError::ConnectionRefused(robot)
        }
        _ => {
            log::error!("Failed to connect to {}: {}", robot, e);
            PilotError::Connection(e)
        }
    }
}

/// Weak handle the reply receiver uses to take the link down
pub(crate) type LinkHandle = Weak<LinkInner>;

/// Poke the video socket with an empty datagram so a blocked receive
/// returns and rechecks `running`.
fn wake_video(local: SocketAddr) {
    let any_v4: IpAddr = Ipv4Addr::UNSPECIFIED.into();
    let any_v6: IpAddr = Ipv6Addr::UNSPECIFIED.into();
    let (target, bind) = match local.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => (Ipv4Addr::LOCALHOST.into(), any_v4),
        IpAddr::V6(ip) if ip.is_unspecified() => (Ipv6Addr::LOCALHOST.into(), any_v6),
        ip @ IpAddr::V4(_) => (ip, any_v4),
        ip @ IpAddr::V6(_) => (ip, any_v6),
    };

    match UdpSocket::bind(SocketAddr::new(bind, 0)) {
        Ok(socket) => {
            let _ = socket.send_to(&[], SocketAddr::new(target, local.port()));
        }
        Err(e) => log::debug!("Could not wake video receiver: {}", e),
    }
}
