//! Bounded buffer of encoded frames waiting to be transmitted.
//!
//! New frames are pushed to the front and the keepalive loop always takes
//! from the front, so the newest intent is sent first. Once the newest frame
//! has been taken, anything older is stale and is discarded rather than sent
//! late. A full queue rejects the incoming frame; it never evicts a pending
//! one.

use std::collections::VecDeque;
use tracing::{debug, warn};

use crate::config::DEFAULT_QUEUE_CAPACITY;
use crate::error::{Error, Result};
use crate::protocol::Frame;

/// Bounded queue of pending frames.
#[derive(Debug, Clone)]
pub struct CommandQueue {
    /// Pending frames, newest at the front.
    frames: VecDeque<Frame>,
    /// Maximum number of pending frames.
    capacity: usize,
}

impl CommandQueue {
    /// Create a queue holding at most `capacity` frames.
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Add a frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueueFull`] if the queue already holds `capacity`
    /// frames. The frame is dropped.
    pub fn enqueue(&mut self, frame: Frame) -> Result<()> {
        if self.is_full() {
            warn!("Command queue full, dropping frame {}", frame);
            return Err(Error::QueueFull {
                capacity: self.capacity,
            });
        }

        self.frames.push_front(frame);
        Ok(())
    }

    /// Take the most recently enqueued frame, discarding older pending ones.
    pub fn dequeue_latest(&mut self) -> Option<Frame> {
        let latest = self.frames.pop_front()?;

        if !self.frames.is_empty() {
            debug!(
                "Discarding {} stale frame(s) superseded by {}",
                self.frames.len(),
                latest
            );
            self.frames.clear();
        }

        Some(latest)
    }

    /// The most recently enqueued frame, without removing it.
    pub fn peek_latest(&self) -> Option<&Frame> {
        self.frames.front()
    }

    /// Pending frames, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Frame> {
        self.frames.iter().rev()
    }

    /// Drop every pending frame.
    pub fn clear(&mut self) {
        self.frames.clear();
    }

    /// Number of pending frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Check if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Check if the next enqueue would be rejected.
    pub fn is_full(&self) -> bool {
        self.frames.len() >= self.capacity
    }

    /// Maximum number of pending frames.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}
