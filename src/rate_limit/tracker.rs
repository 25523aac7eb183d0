//! Quota Tracker
//!
//! A quota tracker records how much of a fixed quota window has been consumed
//! for one `(platform, endpoint, customer)` tuple.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Identity of a quota tracker
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct TrackerKey {
    /// Platform name (e.g. `google_ads`)
    pub platform: String,

    /// Endpoint on the platform (e.g. `campaigns`)
    pub endpoint: String,

    /// Customer the quota belongs to
    pub customer_id: String,
}

impl TrackerKey {
    /// Create a new tracker key
    pub fn new(
        platform: impl Into<String>,
        endpoint: impl Into<String>,
        customer_id: impl Into<String>,
    ) -> Self {
        Self {
            platform: platform.into(),
            endpoint: endpoint.into(),
            customer_id: customer_id.into(),
        }
    }
}

impl fmt::Display for TrackerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.platform, self.endpoint, self.customer_id)
    }
}

/// Persisted quota window for a single tracker key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaTracker {
    /// Tracker identity
    pub key: TrackerKey,

    /// Maximum calls allowed per window
    pub quota_limit: u64,

    /// Calls consumed in the current window
    pub current_usage: u64,

    /// Window length in seconds
    pub reset_interval_secs: u64,

    /// When the current window closes
    pub reset_at: DateTime<Utc>,

    /// When the tracker was first created
    pub created_at: DateTime<Utc>,
}

impl QuotaTracker {
    /// Create a fresh tracker whose window starts now
    pub fn new(key: TrackerKey, quota_limit: u64, reset_interval_secs: u64) -> Self {
        let now = Utc::now();
        Self {
            key,
            quota_limit,
            current_usage: 0,
            reset_interval_secs,
            reset_at: now + chrono_interval(reset_interval_secs),
            created_at: now,
        }
    }

    /// Whether the current window has closed
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.reset_at
    }

    /// Usage as seen by readers: zero once the window has closed
    pub fn effective_usage(&self) -> u64 {
        if self.is_expired() {
            0
        } else {
            self.current_usage
        }
    }

    /// Calls left in the current window
    pub fn remaining(&self) -> u64 {
        self.quota_limit.saturating_sub(self.effective_usage())
    }

    /// Whether no further calls may be admitted in this window
    pub fn is_exhausted(&self) -> bool {
        self.current_usage >= self.quota_limit && !self.is_expired()
    }

    /// Record `n` consumed calls. Admission must already have been checked.
    pub fn consume(&mut self, n: u64) {
        self.current_usage = self.current_usage.saturating_add(n);
    }

    /// Give back `n` calls previously consumed
    pub fn release(&mut self, n: u64) {
        self.current_usage = self.current_usage.saturating_sub(n);
    }

    /// Start a new window if the current one has closed.
    ///
    /// Returns `true` if a reset happened.
    pub fn reset_if_expired(&mut self) -> bool {
        let now = Utc::now();
        if !self.is_expired_at(now) {
            return false;
        }

        self.current_usage = 0;
        self.reset_at = now + chrono_interval(self.reset_interval_secs);
        true
    }

    /// Percentage of the window consumed (0.0 - 100.0+)
    pub fn usage_percentage(&self) -> f64 {
        if self.quota_limit == 0 {
            return 0.0;
        }
        (self.effective_usage() as f64 / self.quota_limit as f64) * 100.0
    }

    /// Time left until the window closes
    pub fn time_until_reset(&self) -> Duration {
        (self.reset_at - Utc::now()).to_std().unwrap_or(Duration::ZERO)
    }
}

// Windows longer than a century are clamped
const MAX_INTERVAL_SECS: i64 = 100 * 365 * 86_400;

fn chrono_interval(secs: u64) -> chrono::Duration {
    let secs = i64::try_from(secs).unwrap_or(MAX_INTERVAL_SECS).min(MAX_INTERVAL_SECS);
    chrono::Duration::seconds(secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(limit: u64) -> QuotaTracker {
        QuotaTracker::new(TrackerKey::new("google_ads", "campaigns", "cust-1"), limit, 3600)
    }

    #[test]
    fn test_new_tracker_starts_empty() {
        let t = tracker(1000);
        assert_eq!(t.current_usage, 0);
        assert_eq!(t.remaining(), 1000);
        assert!(!t.is_exhausted());
        assert!(t.reset_at > Utc::now());
    }

    #[test]
    fn test_consume_and_remaining() {
        let mut t = tracker(10);
        t.consume(1);
        t.consume(3);
        assert_eq!(t.current_usage, 4);
        assert_eq!(t.remaining(), 6);
    }

    #[test]
    fn test_remaining_floors_at_zero() {
        let mut t = tracker(2);
        t.consume(5);
        assert_eq!(t.remaining(), 0);
        assert!(t.is_exhausted());
    }

    #[test]
    fn test_expired_window_reads_as_full() {
        let mut t = tracker(10);
        t.consume(10);
        t.reset_at = Utc::now() - chrono::Duration::seconds(1);

        assert!(!t.is_exhausted());
        assert_eq!(t.remaining(), 10);
        assert_eq!(t.usage_percentage(), 0.0);
        // Stored usage is untouched until a reset
        assert_eq!(t.current_usage, 10);
    }

    #[test]
    fn test_reset_if_expired() {
        let mut t = tracker(10);
        t.consume(7);
        assert!(!t.reset_if_expired());
        assert_eq!(t.current_usage, 7);

        t.reset_at = Utc::now() - chrono::Duration::seconds(5);
        assert!(t.reset_if_expired());
        assert_eq!(t.current_usage, 0);
        assert!(t.reset_at > Utc::now());
    }

    #[test]
    fn test_usage_percentage() {
        let mut t = tracker(1000);
        t.consume(1);
        assert!((t.usage_percentage() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_zero_limit_is_always_exhausted() {
        let t = tracker(0);
        assert!(t.is_exhausted());
        assert_eq!(t.usage_percentage(), 0.0);
    }

    #[test]
    fn test_release_does_not_underflow() {
        let mut t = tracker(10);
        t.consume(1);
        t.release(3);
        assert_eq!(t.current_usage, 0);
    }

    #[test]
    fn test_time_until_reset() {
        let t = tracker(10);
        let left = t.time_until_reset();
        assert!(left <= Duration::from_secs(3600));
        assert!(left > Duration::from_secs(3590));
    }

    #[test]
    fn test_key_display() {
        let key = TrackerKey::new("salesforce", "contacts", "acme");
        assert_eq!(key.to_string(), "salesforce/contacts@acme");
    }
}
