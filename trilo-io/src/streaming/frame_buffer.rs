//! Latest-wins frame slot shared between one producer and one consumer loop.
//!
//! - [`FrameBuffer::publish`] replaces the held frame unconditionally and
//!   wakes every waiter. Nothing is queued.
//! - [`FrameBuffer::wait_newer`] blocks until a frame newer than the one the
//!   caller last saw exists, or the caller's keep-going predicate turns false.
//! - [`FrameBuffer::wake_all`] is the poke a stop path issues after clearing
//!   its running flag.
//!
//! A slow consumer skips whatever was overwritten in between: publishing F1
//! then F2 before a read yields exactly one read, of F2.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

/// One encoded frame
pub type Frame = Arc<[u8]>;

#[derive(Debug, Default)]
struct Slot {
    frame: Option<Frame>,
    /// Incremented on every publish; 0 means nothing published yet
    sequence: u64,
}

/// Single-slot frame holder with change notification
#[derive(Debug, Default)]
pub struct FrameBuffer {
    slot: Mutex<Slot>,
    changed: Condvar,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the held frame and wake all waiters.
    pub fn publish(&self, frame: impl Into<Frame>) {
        let mut slot = self.slot.lock();
        slot.frame = Some(frame.into());
        slot.sequence += 1;
        self.changed.notify_all();
    }

    /// Current frame, without consuming it
    pub fn latest(&self) -> Option<Frame> {
        self.slot.lock().frame.clone()
    }

    /// Sequence number of the held frame (0 if none)
    pub fn sequence(&self) -> u64 {
        self.slot.lock().sequence
    }

    /// Non-blocking variant of [`wait_newer`](Self::wait_newer)
    pub fn take_newer(&self, last_seen: u64) -> Option<(u64, Frame)> {
        let slot = self.slot.lock();
        match &slot.frame {
            Some(frame) if slot.sequence > last_seen => Some((slot.sequence, Arc::clone(frame))),
            _ => None,
        }
    }

    /// Block until a frame with sequence greater than `last_seen` exists.
    ///
    /// `keep_waiting` is re-checked under the lock before every wait and after
    /// every wake-up; once it returns false this returns `None`. Whoever flips
    /// the state it reads must call [`wake_all`](Self::wake_all) afterwards.
    pub fn wait_newer<F>(&self, last_seen: u64, keep_waiting: F) -> Option<(u64, Frame)>
    where
        F: Fn() -> bool,
    {
        let mut slot = self.slot.lock();
        loop {
            if !keep_waiting() {
                return None;
            }
            if let Some(frame) = &slot.frame
                && slot.sequence > last_seen
            {
                return Some((slot.sequence, Arc::clone(frame)));
            }
            self.changed.wait(&mut slot);
        }
    }

    /// Wake every waiter so it re-checks its predicate.
    ///
    /// Takes the lock first so a waiter between its predicate check and its
    /// wait cannot miss the notification.
    pub fn wake_all(&self) {
        let _slot = self.slot.lock();
        self.changed.notify_all();
    }

    /// Drop the held frame (sequence keeps counting)
    pub fn clear(&self) {
        self.slot.lock().frame = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::threads::Worker;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[test]
    fn test_latest_wins() {
        let buffer = FrameBuffer::new();
        assert!(buffer.latest().is_none());
        assert_eq!(buffer.sequence(), 0);

        buffer.publish(vec![1u8, 1, 1]);
        buffer.publish(vec![2u8, 2]);

        let (seq, frame) = buffer.take_newer(0).unwrap();
        assert_eq!(seq, 2);
        assert_eq!(&frame[..], &[2, 2]);

        // F1 is gone and F2 is only observed once
        assert!(buffer.take_newer(seq).is_none());
        assert_eq!(&buffer.latest().unwrap()[..], &[2, 2]);
    }

    #[test]
    fn test_wait_returns_immediately_when_newer_exists() {
        let buffer = FrameBuffer::new();
        buffer.publish(vec![7u8]);
        let (seq, frame) = buffer.wait_newer(0, || true).unwrap();
        assert_eq!(seq, 1);
        assert_eq!(&frame[..], &[7]);
    }

    #[test]
    fn test_wait_wakes_on_publish() {
        let buffer = Arc::new(FrameBuffer::new());
        let (tx, rx) = crossbeam_channel::bounded(1);

        let waiter_buffer = Arc::clone(&buffer);
        let worker = Worker::spawn("test-frame-waiter", move || {
            let got = waiter_buffer.wait_newer(0, || true);
            let _ = tx.send(got.map(|(_, frame)| frame.to_vec()));
        })
        .unwrap();

        std::thread::sleep(Duration::from_millis(50));
        buffer.publish(vec![9u8, 8, 7]);

        let got = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(got, Some(vec![9, 8, 7]));
        assert!(worker.join_timeout(Duration::from_secs(1)));
    }

    #[test]
    fn test_wake_all_releases_stopped_waiter() {
        let buffer = Arc::new(FrameBuffer::new());
        let running = Arc::new(AtomicBool::new(true));

        let waiter_buffer = Arc::clone(&buffer);
        let waiter_running = Arc::clone(&running);
        let (tx, rx) = crossbeam_channel::bounded(1);
        let worker = Worker::spawn("test-frame-stop", move || {
            let got = waiter_buffer.wait_newer(0, || waiter_running.load(Ordering::SeqCst));
            let _ = tx.send(got.is_none());
        })
        .unwrap();

        std::thread::sleep(Duration::from_millis(50));
        running.store(false, Ordering::SeqCst);
        buffer.wake_all();

        assert!(rx.recv_timeout(Duration::from_secs(2)).unwrap());
        assert!(worker.join_timeout(Duration::from_secs(1)));
    }

    #[test]
    fn test_clear_keeps_sequence() {
        let buffer = FrameBuffer::new();
        buffer.publish(vec![1u8]);
        buffer.clear();
        assert!(buffer.latest().is_none());
        assert_eq!(buffer.sequence(), 1);
        assert!(buffer.take_newer(0).is_none());
    }
}
