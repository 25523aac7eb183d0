//! Inter-request pacing.
//!
//! Each caller claims the next free slot under a short lock and then sleeps
//! outside of it, so concurrent callers on the same service are spaced
//! `min_interval` apart without serialising their actual work.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug)]
pub struct Pacer {
    min_interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl Pacer {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            next_slot: Mutex::new(None),
        }
    }

    /// A pacer that never waits
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait for this caller's slot; returns how long it slept
    pub async fn wait(&self) -> Duration {
        if self.min_interval.is_zero() {
            return Duration::ZERO;
        }

        let now = Instant::now();
        let slot = {
            let mut next = self.next_slot.lock().await;
            let slot = match *next {
                Some(t) if t > now => t,
                _ => now,
            };
            *next = Some(slot + self.min_interval);
            slot
        };

        let delay = slot.saturating_duration_since(now);
        if !delay.is_zero() {
            tokio::time::sleep_until(slot).await;
        }
        delay
    }
}
