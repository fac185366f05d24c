//! Receiver loops for the two robot channels.
//!
//! - [`VideoReceiver`]: UDP datagrams from the robot's IP into the
//!   latest-wins [`FrameBuffer`]; anything from another source is dropped.
//! - [`ReplyReceiver`]: bytes from the command connection, split into lines
//!   and surfaced as [`LinkEvent::Reply`]. End of stream takes the link down.
//!
//! Both loops stop once the shared `running` flag is cleared. The video
//! socket has a read timeout so the flag is rechecked even when no
//! datagrams arrive; the command read is unblocked by shutting the socket.

use crate::link::{EventQueue, LinkEvent, LinkHandle};
use std::io::{ErrorKind, Read};
use std::net::{IpAddr, TcpStream, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use trilo_io::streaming::{FrameBuffer, Reply};

/// Receive buffer size; large enough for any single datagram
const VIDEO_BUFFER_SIZE: usize = 65536;

/// Read chunk size for the command connection
const REPLY_CHUNK_SIZE: usize = 1024;

/// Stores video datagrams from the robot
pub struct VideoReceiver {
    socket: UdpSocket,
    robot_ip: IpAddr,
    frames: Arc<FrameBuffer>,
    running: Arc<AtomicBool>,
}

impl VideoReceiver {
    pub fn new(
        socket: UdpSocket,
        robot_ip: IpAddr,
        frames: Arc<FrameBuffer>,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            socket,
            robot_ip,
            frames,
            running,
        }
    }

    pub fn run(&self) {
        log::info!("Video receiver started (accepting frames from {})", self.robot_ip);

        let mut buf = vec![0u8; VIDEO_BUFFER_SIZE];
        let mut received: u64 = 0;
        let mut ignored: u64 = 0;

        while self.running.load(Ordering::SeqCst) {
            match self.socket.recv_from(&mut buf) {
                Ok((len, from)) => {
                    if !self.running.load(Ordering::SeqCst) {
                        break;
                    }
                    if from.ip() != self.robot_ip {
                        ignored += 1;
                        log::trace!("Ignoring {} byte datagram from {}", len, from);
                        continue;
                    }
                    if len == 0 {
                        continue;
                    }
                    self.frames.publish(&buf[..len]);
                    received += 1;
                    log::trace!("Received {} byte frame", len);
                }
                // Timeout, just check running again
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    if self.running.load(Ordering::SeqCst) {
                        log::error!("UDP receive error: {}", e);
                    }
                    break;
                }
            }
        }

        log::info!(
            "Video receiver stopped ({} frames, {} foreign datagrams ignored)",
            received,
            ignored
        );
    }
}

/// Turns command connection bytes into reply events
pub struct ReplyReceiver {
    stream: TcpStream,
    events: EventQueue,
    running: Arc<AtomicBool>,
    link: LinkHandle,
}

impl ReplyReceiver {
    pub(crate) fn new(
        stream: TcpStream,
        events: EventQueue,
        running: Arc<AtomicBool>,
        link: LinkHandle,
    ) -> Self {
        Self {
            stream,
            events,
            running,
            link,
        }
    }

    pub fn run(mut self) {
        log::info!("Reply receiver started");

        let mut lines = trilo_io::streaming::LineBuffer::new();
        let mut chunk = [0u8; REPLY_CHUNK_SIZE];

        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => {
                    if self.running.load(Ordering::SeqCst) {
                        log::warn!("Robot closed the command connection");
                        self.take_link_down();
                    }
                    break;
                }
                Ok(n) => {
                    for line in lines.push(&chunk[..n]) {
                        self.deliver(line);
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    if self.running.load(Ordering::SeqCst) {
                        log::error!("Command connection error: {}", e);
                        self.take_link_down();
                    }
                    break;
                }
            }
        }

        log::info!("Reply receiver stopped");
    }

    fn deliver(&self, line: String) {
        let reply = Reply::parse(&line);
        match &reply {
            Some(Reply::Error(error)) => log::warn!("Robot error: {}", error.error),
            Some(reply) => log::info!("Robot replied: {:?}", reply),
            None => log::debug!("Unrecognised reply line: {}", line),
        }
        self.events.push(LinkEvent::Reply { line, reply });
    }

    fn take_link_down(&self) {
        if let Some(link) = self.link.upgrade() {
            link.disconnect();
        }
    }
}
