//! Periodic retransmission that keeps the SBrick watchdog from firing.
//!
//! The timer only exists while armed. Disarming drops it, so no tick can
//! fire for a link that has already been torn down.

use std::time::Duration;
use tokio::time::{self, Interval, MissedTickBehavior};

use crate::error::Result;
use crate::protocol::{Command, Frame};
use crate::queue::CommandQueue;

/// Keepalive timer plus the last frame the device accepted.
pub(crate) struct Keepalive {
    /// Tick period.
    period: Duration,
    /// Running timer; `None` while disarmed.
    interval: Option<Interval>,
    /// Frame resent when nothing new is queued.
    last_sent: Frame,
    /// STOP on all channels, the fallback after every teardown.
    idle: Frame,
}

impl Keepalive {
    pub(crate) fn new(period: Duration) -> Result<Self> {
        let idle = Command::stop_all().encode()?;

        Ok(Self {
            period,
            interval: None,
            last_sent: idle.clone(),
            idle,
        })
    }

    /// Start ticking. The first tick completes immediately.
    pub(crate) fn arm(&mut self) {
        let mut interval = time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.interval = Some(interval);
    }

    /// Stop ticking.
    pub(crate) fn disarm(&mut self) {
        self.interval = None;
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.interval.is_some()
    }

    /// Wait for the next tick. Never completes while disarmed.
    pub(crate) async fn tick(&mut self) {
        match self.interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
            }
            None => std::future::pending().await,
        }
    }

    /// Frame to transmit on this tick: the newest queued one, otherwise the
    /// last one the device accepted.
    pub(crate) fn next_frame(&self, queue: &mut CommandQueue) -> Frame {
        queue
            .dequeue_latest()
            .unwrap_or_else(|| self.last_sent.clone())
    }

    /// Record a frame the device accepted.
    pub(crate) fn confirm(&mut self, frame: Frame) {
        self.last_sent = frame;
    }

    /// Forget the last accepted frame; the next fallback is STOP on all channels.
    pub(crate) fn reset(&mut self) {
        self.last_sent = self.idle.clone();
    }

    #[cfg(test)]
    pub(crate) fn last_sent(&self) -> &Frame {
        &self.last_sent
    }
}
