//! Quota Store
//!
//! Storage for quota trackers. All admission decisions go through
//! [`QuotaStore::reserve`], which checks and increments usage in one step so
//! concurrent callers can never admit more work than the limit allows.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::error::StoreError;
use super::tracker::{QuotaTracker, TrackerKey};

/// Result of an atomic admission attempt
#[derive(Debug, Clone, PartialEq)]
pub enum Reservation {
    /// One unit was reserved; holds the tracker after the increment
    Admitted(QuotaTracker),
    /// The window is used up; holds the unchanged tracker
    Exhausted(QuotaTracker),
}

impl Reservation {
    /// Whether the reservation succeeded
    pub fn is_admitted(&self) -> bool {
        matches!(self, Reservation::Admitted(_))
    }

    /// Tracker snapshot taken during the reservation
    pub fn tracker(&self) -> &QuotaTracker {
        match self {
            Reservation::Admitted(t) | Reservation::Exhausted(t) => t,
        }
    }
}

/// Persistence seam for quota trackers
#[async_trait]
pub trait QuotaStore: Send + Sync + std::fmt::Debug {
    /// Fetch the tracker for `key`, creating it with the given defaults if absent
    async fn find_or_create(
        &self,
        key: &TrackerKey,
        default_limit: u64,
        default_interval_secs: u64,
    ) -> Result<QuotaTracker, StoreError>;

    /// Fetch a tracker if it exists
    async fn get(&self, key: &TrackerKey) -> Result<Option<QuotaTracker>, StoreError>;

    /// Insert or replace a tracker
    async fn upsert(&self, tracker: QuotaTracker) -> Result<(), StoreError>;

    /// Delete a tracker
    async fn remove(&self, key: &TrackerKey) -> Result<Option<QuotaTracker>, StoreError>;

    /// Reset an expired window, then reserve `n` units if they fit
    async fn reserve(&self, key: &TrackerKey, n: u64) -> Result<Reservation, StoreError>;

    /// Return `n` units reserved in the window ending at `window`.
    ///
    /// No-op if that window has since been replaced by a newer one.
    async fn release(
        &self,
        key: &TrackerKey,
        n: u64,
        window: DateTime<Utc>,
    ) -> Result<QuotaTracker, StoreError>;

    /// Add `n` units of usage without an admission check
    async fn consume(&self, key: &TrackerKey, n: u64) -> Result<QuotaTracker, StoreError>;

    /// Start a new window for `key` if its current one has closed
    async fn reset_if_expired(&self, key: &TrackerKey) -> Result<bool, StoreError>;

    /// All trackers belonging to one customer
    async fn trackers_for_customer(
        &self,
        customer_id: &str,
    ) -> Result<Vec<QuotaTracker>, StoreError>;

    /// Every tracker in the store
    async fn all(&self) -> Result<Vec<QuotaTracker>, StoreError>;

    /// Reset every tracker whose window has closed; returns how many were reset
    async fn reset_expired(&self) -> Result<usize, StoreError>;
}

/// Tracker map shared by the store backends
#[derive(Debug, Clone, Default)]
pub(crate) struct TrackerTable {
    trackers: HashMap<TrackerKey, QuotaTracker>,
}

impl TrackerTable {
    pub(crate) fn from_trackers(trackers: Vec<QuotaTracker>) -> Self {
        Self {
            trackers: trackers.into_iter().map(|t| (t.key.clone(), t)).collect(),
        }
    }

    pub(crate) fn snapshot(&self) -> Vec<QuotaTracker> {
        let mut all: Vec<QuotaTracker> = self.trackers.values().cloned().collect();
        all.sort_by(|a, b| a.key.cmp(&b.key));
        all
    }

    /// Returns the tracker and whether it was newly created
    pub(crate) fn find_or_create(
        &mut self,
        key: &TrackerKey,
        default_limit: u64,
        default_interval_secs: u64,
    ) -> (QuotaTracker, bool) {
        if let Some(existing) = self.trackers.get(key) {
            return (existing.clone(), false);
        }

        let tracker = QuotaTracker::new(key.clone(), default_limit, default_interval_secs);
        self.trackers.insert(key.clone(), tracker.clone());
        (tracker, true)
    }

    pub(crate) fn get(&self, key: &TrackerKey) -> Option<QuotaTracker> {
        self.trackers.get(key).cloned()
    }

    pub(crate) fn upsert(&mut self, tracker: QuotaTracker) {
        self.trackers.insert(tracker.key.clone(), tracker);
    }

    pub(crate) fn remove(&mut self, key: &TrackerKey) -> Option<QuotaTracker> {
        self.trackers.remove(key)
    }

    fn entry(&mut self, key: &TrackerKey) -> Result<&mut QuotaTracker, StoreError> {
        self.trackers
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound(key.clone()))
    }

    pub(crate) fn reserve(&mut self, key: &TrackerKey, n: u64) -> Result<Reservation, StoreError> {
        let tracker = self.entry(key)?;
        tracker.reset_if_expired();

        if tracker.current_usage.saturating_add(n) > tracker.quota_limit {
            return Ok(Reservation::Exhausted(tracker.clone()));
        }

        tracker.consume(n);
        Ok(Reservation::Admitted(tracker.clone()))
    }

    pub(crate) fn release(
        &mut self,
        key: &TrackerKey,
        n: u64,
        window: DateTime<Utc>,
    ) -> Result<QuotaTracker, StoreError> {
        let tracker = self.entry(key)?;
        if tracker.reset_at == window {
            tracker.release(n);
        } else {
            tracing::debug!(
                tracker = %key,
                reserved_window = %window,
                current_window = %tracker.reset_at,
                "Reservation belongs to a closed window, nothing to release"
            );
        }
        Ok(tracker.clone())
    }

    pub(crate) fn consume(&mut self, key: &TrackerKey, n: u64) -> Result<QuotaTracker, StoreError> {
        let tracker = self.entry(key)?;
        tracker.consume(n);
        Ok(tracker.clone())
    }

    pub(crate) fn reset_if_expired(&mut self, key: &TrackerKey) -> Result<bool, StoreError> {
        Ok(self.entry(key)?.reset_if_expired())
    }

    pub(crate) fn for_customer(&self, customer_id: &str) -> Vec<QuotaTracker> {
        let mut trackers: Vec<QuotaTracker> = self
            .trackers
            .values()
            .filter(|t| t.key.customer_id == customer_id)
            .cloned()
            .collect();
        trackers.sort_by(|a, b| a.key.cmp(&b.key));
        trackers
    }

    pub(crate) fn reset_expired(&mut self) -> usize {
        self.trackers
            .values_mut()
            .map(|t| t.reset_if_expired())
            .filter(|reset| *reset)
            .count()
    }

    pub(crate) fn len(&self) -> usize {
        self.trackers.len()
    }
}

/// In-memory quota store
#[derive(Debug, Clone, Default)]
pub struct MemoryQuotaStore {
    table: Arc<RwLock<TrackerTable>>,
}

impl MemoryQuotaStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of trackers held
    pub async fn count(&self) -> usize {
        self.table.read().await.len()
    }

    /// Drop all trackers
    pub async fn clear(&self) {
        *self.table.write().await = TrackerTable::default();
    }
}

#[async_trait]
impl QuotaStore for MemoryQuotaStore {
    async fn find_or_create(
        &self,
        key: &TrackerKey,
        default_limit: u64,
        default_interval_secs: u64,
    ) -> Result<QuotaTracker, StoreError> {
        let mut table = self.table.write().await;
        let (tracker, created) = table.find_or_create(key, default_limit, default_interval_secs);
        if created {
            tracing::debug!(tracker = %key, limit = default_limit, "Created quota tracker");
        }
        Ok(tracker)
    }

    async fn get(&self, key: &TrackerKey) -> Result<Option<QuotaTracker>, StoreError> {
        Ok(self.table.read().await.get(key))
    }

    async fn upsert(&self, tracker: QuotaTracker) -> Result<(), StoreError> {
        self.table.write().await.upsert(tracker);
        Ok(())
    }

    async fn remove(&self, key: &TrackerKey) -> Result<Option<QuotaTracker>, StoreError> {
        Ok(self.table.write().await.remove(key))
    }

    async fn reserve(&self, key: &TrackerKey, n: u64) -> Result<Reservation, StoreError> {
        self.table.write().await.reserve(key, n)
    }

    async fn release(
        &self,
        key: &TrackerKey,
        n: u64,
        window: DateTime<Utc>,
    ) -> Result<QuotaTracker, StoreError> {
        self.table.write().await.release(key, n, window)
    }

    async fn consume(&self, key: &TrackerKey, n: u64) -> Result<QuotaTracker, StoreError> {
        self.table.write().await.consume(key, n)
    }

    async fn reset_if_expired(&self, key: &TrackerKey) -> Result<bool, StoreError> {
        self.table.write().await.reset_if_expired(key)
    }

    async fn trackers_for_customer(
        &self,
        customer_id: &str,
    ) -> Result<Vec<QuotaTracker>, StoreError> {
        Ok(self.table.read().await.for_customer(customer_id))
    }

    async fn all(&self) -> Result<Vec<QuotaTracker>, StoreError> {
        Ok(self.table.read().await.snapshot())
    }

    async fn reset_expired(&self) -> Result<usize, StoreError> {
        Ok(self.table.write().await.reset_expired())
    }
}
