//! Rate Limiting Service
//!
//! Wraps units of work (one external API call each) with quota admission,
//! usage accounting, pacing, and batch execution for a single
//! `(platform, endpoint, customer)` tracker.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use super::batch::{BatchItemResult, BatchResult, FailedRequest};
use super::classifier::{self, ErrorClass};
use super::config::RateLimitConfig;
use super::error::{QuotaError, StoreError};
use super::overview::{self, CustomerQuotaStatus};
use super::pacing::Pacer;
use super::report::{
    BlockReason, QuotaStatus, RateLimitStatus, ServiceStatus, TimingPlan, TimingRecommendation,
};
use super::store::{QuotaStore, Reservation};
use super::strategy::Strategy;
use super::timeout::RequestTimeout;
use super::tracker::{QuotaTracker, TrackerKey};
use crate::metrics::{self, Outcome};

/// Quota-aware rate limiter for one tracker key
#[derive(Debug)]
pub struct RateLimitingService {
    key: TrackerKey,
    strategy: Strategy,
    store: Arc<dyn QuotaStore>,
    pacer: Pacer,
    pacing_enabled: bool,
    timeout: RequestTimeout,
}

impl RateLimitingService {
    /// Create a service using the configured default strategy
    pub async fn new(
        store: Arc<dyn QuotaStore>,
        config: &RateLimitConfig,
        key: TrackerKey,
    ) -> Result<Self, QuotaError> {
        Self::with_strategy(store, config, key, config.default_strategy).await
    }

    /// Create a service with an explicit strategy.
    ///
    /// The tracker for `key` is created with the platform's configured quota
    /// if it does not exist yet.
    pub async fn with_strategy(
        store: Arc<dyn QuotaStore>,
        config: &RateLimitConfig,
        key: TrackerKey,
        strategy: Strategy,
    ) -> Result<Self, QuotaError> {
        let defaults = config.quota_for(&key.platform);
        let tracker = store
            .find_or_create(&key, defaults.quota_limit, defaults.reset_interval_secs)
            .await?;

        debug!(
            tracker = %key,
            %strategy,
            limit = tracker.quota_limit,
            used = tracker.current_usage,
            "Rate limiting service ready"
        );

        Ok(Self {
            pacer: pacer_for(strategy, config.pacing_enabled),
            pacing_enabled: config.pacing_enabled,
            timeout: RequestTimeout::new(config.request_timeout()),
            key,
            strategy,
            store,
        })
    }

    pub fn key(&self) -> &TrackerKey {
        &self.key
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Switch to another pacing strategy
    pub fn set_strategy(&mut self, strategy: Strategy) {
        self.strategy = strategy;
        self.pacer = pacer_for(strategy, self.pacing_enabled);
    }

    /// Replace the per-request timeout
    pub fn set_timeout(&mut self, timeout: RequestTimeout) {
        self.timeout = timeout;
    }

    /// Current tracker state
    pub async fn tracker(&self) -> Result<QuotaTracker, QuotaError> {
        self.store
            .get(&self.key)
            .await?
            .ok_or_else(|| StoreError::NotFound(self.key.clone()).into())
    }

    /// Run one unit of work behind the quota.
    ///
    /// Usage grows by one only when the work succeeds. A failure the
    /// platform reports as throttling becomes
    /// [`QuotaError::RateLimitExceeded`]; any other failure is returned as
    /// [`QuotaError::Request`] with the original error inside.
    pub async fn execute_request<F, Fut, T>(&self, unit_of_work: F) -> Result<T, QuotaError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let span = tracing::debug_span!(
            "quota_request",
            request_id = %Uuid::new_v4(),
            tracker = %self.key
        );
        self.admit_and_run(unit_of_work).instrument(span).await
    }

    async fn admit_and_run<F, Fut, T>(&self, unit_of_work: F) -> Result<T, QuotaError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let tracker = match self.store.reserve(&self.key, 1).await? {
            Reservation::Admitted(tracker) => tracker,
            Reservation::Exhausted(tracker) => {
                metrics::record_outcome(&self.key, Outcome::QuotaExceeded);
                warn!(
                    tracker = %self.key,
                    used = tracker.current_usage,
                    limit = tracker.quota_limit,
                    reset_at = %tracker.reset_at,
                    "Quota exhausted, request rejected"
                );
                return Err(QuotaError::QuotaExceeded {
                    key: self.key.clone(),
                    reset_at: tracker.reset_at,
                });
            }
        };

        let delay = self.pacer.wait().await;
        if !delay.is_zero() {
            metrics::observe_pacing(delay);
        }

        let started = Instant::now();
        let result = self.timeout.run(unit_of_work()).await;
        metrics::observe_duration(&self.key, started.elapsed());

        match result {
            Ok(value) => {
                metrics::record_outcome(&self.key, Outcome::Success);
                metrics::record_usage(&tracker);
                debug!(
                    tracker = %self.key,
                    used = tracker.current_usage,
                    limit = tracker.quota_limit,
                    "Request succeeded"
                );
                Ok(value)
            }
            Err(err) => {
                // The reservation only counts for successful work
                if let Err(release_err) =
                    self.store.release(&self.key, 1, tracker.reset_at).await
                {
                    warn!(tracker = %self.key, "Failed to release quota reservation: {}", release_err);
                }
                Err(self.classify_failure(err))
            }
        }
    }

    fn classify_failure(&self, err: QuotaError) -> QuotaError {
        match err {
            QuotaError::Request(inner) => match classifier::classify(&inner) {
                ErrorClass::RateLimited { retry_after } => {
                    metrics::record_outcome(&self.key, Outcome::RateLimited);
                    warn!(
                        tracker = %self.key,
                        retry_after_secs = retry_after.as_secs(),
                        "Platform rate limit hit"
                    );
                    QuotaError::RateLimitExceeded {
                        retry_after,
                        message: format!("{:#}", inner),
                    }
                }
                ErrorClass::Other => {
                    metrics::record_outcome(&self.key, Outcome::Failed);
                    debug!(tracker = %self.key, "Request failed: {:#}", inner);
                    QuotaError::Request(inner)
                }
            },
            QuotaError::Timeout(after) => {
                metrics::record_outcome(&self.key, Outcome::Timeout);
                warn!(tracker = %self.key, "Request timed out after {:?}", after);
                QuotaError::Timeout(after)
            }
            other => {
                metrics::record_outcome(&self.key, Outcome::Failed);
                other
            }
        }
    }

    /// Run `unit_of_work` for each item in order.
    ///
    /// Item failures are recorded and processing continues, except for a
    /// local quota rejection: that item is recorded as failed and the
    /// remaining items are left unattempted.
    pub async fn execute_batch_requests<I, F, Fut, T>(
        &self,
        items: impl IntoIterator<Item = I>,
        mut unit_of_work: F,
    ) -> BatchResult<I, T>
    where
        I: Clone,
        F: FnMut(I, usize) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let items: Vec<I> = items.into_iter().collect();
        let total = items.len();
        let mut batch = BatchResult::new();

        for (index, item) in items.into_iter().enumerate() {
            let request = item.clone();
            match self.execute_request(|| unit_of_work(item, index)).await {
                Ok(value) => {
                    batch.successful += 1;
                    batch.results.push(BatchItemResult {
                        index,
                        outcome: Ok(value),
                    });
                }
                Err(err) => {
                    let stop = err.is_quota_exceeded();
                    batch.failed += 1;
                    batch.results.push(BatchItemResult {
                        index,
                        outcome: Err(err),
                    });
                    batch.failed_requests.push(FailedRequest { index, request });

                    if stop {
                        batch.not_attempted = total - index - 1;
                        warn!(
                            tracker = %self.key,
                            index,
                            not_attempted = batch.not_attempted,
                            "Quota exhausted mid-batch, stopping"
                        );
                        break;
                    }
                }
            }
        }

        info!(
            tracker = %self.key,
            successful = batch.successful,
            failed = batch.failed,
            not_attempted = batch.not_attempted,
            "Batch finished"
        );
        batch
    }

    /// Snapshot of quota and pacing for this service. Does not modify state.
    pub async fn status(&self) -> Result<ServiceStatus, QuotaError> {
        let tracker = self.tracker().await?;
        Ok(ServiceStatus {
            platform: self.key.platform.clone(),
            endpoint: self.key.endpoint.clone(),
            customer_id: self.key.customer_id.clone(),
            strategy: self.strategy,
            quota: QuotaStatus::from(&tracker),
            rate_limit: RateLimitStatus::from(self.strategy.params()),
        })
    }

    /// Suggest how to run `request_count` requests against the remaining quota
    pub async fn optimize_request_timing(
        &self,
        request_count: u64,
    ) -> Result<TimingRecommendation, QuotaError> {
        let tracker = self.tracker().await?;
        if tracker.is_exhausted() {
            return Ok(TimingRecommendation::Blocked {
                reason: BlockReason::QuotaExceeded,
            });
        }

        let params = self.strategy.params();
        let remaining = tracker.remaining();

        let recommended_batch_size = remaining
            .min(params.batch_size_hint)
            .min(request_count.max(1))
            .max(1);

        // Requests beyond the remaining quota have to wait for the next window
        let wait_time = if request_count > remaining {
            tracker.time_until_reset()
        } else {
            Duration::ZERO
        };

        let pacing = Duration::from_secs_f64(request_count as f64 / params.requests_per_second);

        Ok(TimingRecommendation::Proceed(TimingPlan {
            estimated_duration: pacing + wait_time,
            recommended_batch_size,
            wait_time,
            strategy_recommendation: Strategy::recommended_for_usage(tracker.usage_percentage()),
        }))
    }

    /// Change the quota limit (and optionally the window length) of this tracker,
    /// keeping the current usage
    pub async fn set_quota_limit(
        &self,
        quota_limit: u64,
        reset_interval_secs: Option<u64>,
    ) -> Result<QuotaTracker, QuotaError> {
        let mut tracker = self.tracker().await?;
        tracker.quota_limit = quota_limit;
        if let Some(secs) = reset_interval_secs {
            tracker.reset_interval_secs = secs;
        }
        self.store.upsert(tracker.clone()).await?;

        info!(
            tracker = %self.key,
            limit = quota_limit,
            interval_secs = tracker.reset_interval_secs,
            "Quota limit updated"
        );
        Ok(tracker)
    }

    /// Quota status of every tracked platform/endpoint for a customer
    pub async fn quota_status_for_customer(
        store: &dyn QuotaStore,
        customer_id: &str,
    ) -> Result<CustomerQuotaStatus, QuotaError> {
        overview::quota_status_for_customer(store, customer_id).await
    }

    /// Platform/endpoint pairs whose usage is above `threshold_percent`
    pub async fn platforms_near_limit(
        store: &dyn QuotaStore,
        customer_id: &str,
        threshold_percent: f64,
    ) -> Result<Vec<(String, String)>, QuotaError> {
        overview::platforms_near_limit(store, customer_id, threshold_percent).await
    }

    /// Reset every tracker whose window has closed; returns how many were reset
    pub async fn reset_expired_quotas(store: &dyn QuotaStore) -> Result<usize, QuotaError> {
        overview::reset_expired_quotas(store).await
    }
}

fn pacer_for(strategy: Strategy, pacing_enabled: bool) -> Pacer {
    if pacing_enabled {
        Pacer::new(strategy.min_interval())
    } else {
        Pacer::disabled()
    }
}
