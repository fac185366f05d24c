//! UDP video relay: forwards the latest frame to the session's client
//!
//! The relay is the consumer half of the frame pipeline. An external
//! producer (the camera) publishes encoded frames into a shared
//! [`FrameBuffer`]; while the relay runs, its sender loop waits on that
//! buffer and sends each new frame as one datagram to the registered target.
//!
//! # Lifecycle
//!
//! ```text
//! 1. Session starts -> start(client_ip, video_port)
//! 2. Sender loop: wait for newer frame -> send_to(target)
//! 3. Session ends   -> stop(): running=false, wake waiter, bounded join
//! ```
//!
//! # Wire Format
//!
//! Raw encoded image bytes, one frame per datagram. No header, no sequence
//! number. Frames larger than [`MAX_DATAGRAM_PAYLOAD`] are dropped.
//!
//! # Failure Handling
//!
//! - **Oversized frame**: dropped with a warning, loop continues
//! - **Send failure**: logged, loop continues
//! - **Slow join on stop**: logged, stop returns anyway

use crate::error::{Error, Result};
use crate::streaming::frame_buffer::{Frame, FrameBuffer};
use crate::threads::Worker;
use parking_lot::Mutex;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Largest UDP payload over IPv4 (65535 - 8 byte UDP header - 20 byte IP header)
pub const MAX_DATAGRAM_PAYLOAD: usize = 65507;

/// One started sender loop and the flag that keeps it going
struct ActiveRun {
    running: Arc<AtomicBool>,
    worker: Worker,
}

/// Video sender bound to one frame buffer
pub struct VideoRelay {
    socket: Arc<UdpSocket>,
    frames: Arc<FrameBuffer>,
    target: Arc<Mutex<Option<SocketAddr>>>,
    run: Mutex<Option<ActiveRun>>,
    join_timeout: Duration,
}

impl VideoRelay {
    /// Create a relay that sends from an ephemeral local port.
    pub fn new(frames: Arc<FrameBuffer>, join_timeout: Duration) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .map_err(|e| Error::Other(format!("Failed to create UDP socket: {}", e)))?;
        Ok(Self::with_socket(socket, frames, join_timeout))
    }

    /// Create a relay on an existing socket
    pub fn with_socket(socket: UdpSocket, frames: Arc<FrameBuffer>, join_timeout: Duration) -> Self {
        Self {
            socket: Arc::new(socket),
            frames,
            target: Arc::new(Mutex::new(None)),
            run: Mutex::new(None),
            join_timeout,
        }
    }

    pub fn is_running(&self) -> bool {
        self.run.lock().is_some()
    }

    /// Current target, if streaming
    pub fn target(&self) -> Option<SocketAddr> {
        *self.target.lock()
    }

    /// Start streaming to `host:port`.
    ///
    /// No-op if already running. An empty host, port 0 or an unresolvable
    /// host fails with [`Error::Config`] without spawning anything.
    pub fn start(&self, host: &str, port: u16) -> Result<()> {
        let mut run = self.run.lock();
        if run.is_some() {
            log::warn!("Video relay is already running");
            return Ok(());
        }

        let target = resolve_target(host, port)?;
        *self.target.lock() = Some(target);

        // Only frames published after start are sent
        let start_sequence = self.frames.sequence();
        let running = Arc::new(AtomicBool::new(true));

        let socket = Arc::clone(&self.socket);
        let frames = Arc::clone(&self.frames);
        let loop_target = Arc::clone(&self.target);
        let loop_running = Arc::clone(&running);
        let worker = Worker::spawn("video-relay", move || {
            run_sender(&socket, &frames, &loop_target, &loop_running, start_sequence)
        });

        match worker {
            Ok(worker) => *run = Some(ActiveRun { running, worker }),
            Err(e) => {
                *self.target.lock() = None;
                return Err(e);
            }
        }

        log::info!("Video streaming started, sending to {}", target);
        Ok(())
    }

    /// Stop streaming and wait (bounded) for the sender loop to exit.
    pub fn stop(&self) {
        let Some(active) = self.run.lock().take() else {
            log::debug!("Video relay is not running");
            return;
        };

        log::info!("Stopping video relay...");
        active.running.store(false, Ordering::SeqCst);
        self.frames.wake_all();
        active.worker.join_timeout(self.join_timeout);

        *self.target.lock() = None;
        log::info!("Video relay stopped");
    }
}

impl Drop for VideoRelay {
    fn drop(&mut self) {
        self.stop();
    }
}

fn resolve_target(host: &str, port: u16) -> Result<SocketAddr> {
    let host = host.trim();
    if host.is_empty() {
        return Err(Error::Config(
            "video target host must be set to start streaming".into(),
        ));
    }
    if port == 0 {
        return Err(Error::Config(
            "video target port must be positive to start streaming".into(),
        ));
    }

    (host, port)
        .to_socket_addrs()
        .map_err(|e| Error::Config(format!("cannot resolve video target {}: {}", host, e)))?
        .next()
        .ok_or_else(|| Error::Config(format!("no address for video target {}", host)))
}

/// Sender loop body; returns once `running` is cleared.
fn run_sender(
    socket: &UdpSocket,
    frames: &FrameBuffer,
    target: &Mutex<Option<SocketAddr>>,
    running: &AtomicBool,
    start_sequence: u64,
) {
    log::info!("Video sender loop started");

    let mut last_seen = start_sequence;
    let mut sent: u64 = 0;
    let mut dropped: u64 = 0;

    while let Some((sequence, frame)) =
        frames.wait_newer(last_seen, || running.load(Ordering::SeqCst))
    {
        last_seen = sequence;

        let Some(target) = *target.lock() else {
            continue;
        };

        match send_frame(socket, &frame, target) {
            Ok(true) => sent += 1,
            Ok(false) => dropped += 1,
            // UDP send errors are not fatal - just log and continue
            Err(e) => log::error!("UDP send error to {}: {}", target, e),
        }
    }

    log::info!(
        "Video sender loop finished ({} frames sent, {} oversized dropped)",
        sent,
        dropped
    );
}

/// Send one frame; `Ok(false)` when it was too large to send.
fn send_frame(socket: &UdpSocket, frame: &Frame, target: SocketAddr) -> std::io::Result<bool> {
    if frame.len() > MAX_DATAGRAM_PAYLOAD {
        log::warn!(
            "Frame size ({}) exceeds max UDP size ({}). Skipping.",
            frame.len(),
            MAX_DATAGRAM_PAYLOAD
        );
        return Ok(false);
    }

    socket.send_to(frame, target)?;
    log::trace!("Sent {} byte frame to {}", frame.len(), target);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relay() -> (Arc<FrameBuffer>, VideoRelay) {
        let frames = Arc::new(FrameBuffer::new());
        let relay = VideoRelay::new(Arc::clone(&frames), Duration::from_secs(2)).unwrap();
        (frames, relay)
    }

    fn receiver() -> UdpSocket {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        socket
    }

    #[test]
    fn test_start_rejects_missing_target() {
        let (_frames, relay) = relay();

        assert!(matches!(relay.start("", 9001), Err(Error::Config(_))));
        assert!(matches!(relay.start("   ", 9001), Err(Error::Config(_))));
        assert!(matches!(relay.start("127.0.0.1", 0), Err(Error::Config(_))));

        assert!(!relay.is_running());
        assert!(relay.target().is_none());
        assert!(relay.run.lock().is_none());
    }

    #[test]
    fn test_start_twice_keeps_single_loop() {
        let (_frames, relay) = relay();
        let rx = receiver();
        let port = rx.local_addr().unwrap().port();

        relay.start("127.0.0.1", port).unwrap();
        let first_flag = relay.run.lock().as_ref().map(|r| Arc::clone(&r.running));

        relay.start("127.0.0.1", port + 1).unwrap();
        assert!(relay.is_running());
        // Second start did not retarget or respawn
        assert_eq!(relay.target().unwrap().port(), port);
        let second_flag = relay.run.lock().as_ref().map(|r| Arc::clone(&r.running));
        assert!(Arc::ptr_eq(&first_flag.unwrap(), &second_flag.unwrap()));

        relay.stop();
        assert!(!relay.is_running());
        assert!(relay.target().is_none());
    }

    #[test]
    fn test_frame_arrives_byte_identical() {
        let (frames, relay) = relay();
        let rx = receiver();
        let port = rx.local_addr().unwrap().port();

        relay.start("127.0.0.1", port).unwrap();
        std::thread::sleep(Duration::from_millis(50));

        let frame: Vec<u8> = (0..4000u32).map(|i| (i % 251) as u8).collect();
        frames.publish(frame.clone());

        let mut buf = vec![0u8; MAX_DATAGRAM_PAYLOAD + 100];
        let (len, _) = rx.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..len], &frame[..]);

        relay.stop();
    }

    #[test]
    fn test_oversized_frame_dropped() {
        let (frames, relay) = relay();
        let rx = receiver();
        let port = rx.local_addr().unwrap().port();

        relay.start("127.0.0.1", port).unwrap();
        std::thread::sleep(Duration::from_millis(50));

        frames.publish(vec![0xAAu8; MAX_DATAGRAM_PAYLOAD + 1]);
        std::thread::sleep(Duration::from_millis(50));
        frames.publish(vec![0x55u8; 16]);

        let mut buf = vec![0u8; MAX_DATAGRAM_PAYLOAD + 100];
        let (len, _) = rx.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..len], &[0x55u8; 16][..]);

        relay.stop();
    }

    #[test]
    fn test_stop_is_idempotent_and_restartable() {
        let (frames, relay) = relay();
        relay.stop();

        let rx = receiver();
        let port = rx.local_addr().unwrap().port();
        relay.start("127.0.0.1", port).unwrap();
        relay.stop();
        relay.stop();

        relay.start("127.0.0.1", port).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        frames.publish(vec![1u8, 2, 3]);
        let mut buf = [0u8; 16];
        let (len, _) = rx.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..len], &[1, 2, 3]);
        relay.stop();
    }
}
