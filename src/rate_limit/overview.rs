//! Customer Quota Overview
//!
//! Cross-platform views over every tracker a customer owns, plus the expiry
//! sweep. Used by the service's customer-wide helpers and by the CLI.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::error::QuotaError;
use super::report::QuotaStatus;
use super::store::QuotaStore;
use crate::metrics;

/// Default usage percentage above which a tracker counts as near its limit
pub const DEFAULT_NEAR_LIMIT_THRESHOLD: f64 = 90.0;

/// platform -> endpoint -> status
pub type CustomerQuotaStatus = BTreeMap<String, BTreeMap<String, QuotaStatus>>;

/// Full overview for one customer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerOverview {
    /// Timestamp of data generation
    pub timestamp: DateTime<Utc>,

    /// Customer the overview describes
    pub customer_id: String,

    /// Status of every tracked platform/endpoint
    pub platforms: CustomerQuotaStatus,

    /// Platform/endpoint pairs above the threshold
    pub near_limit: Vec<(String, String)>,

    /// Threshold used for `near_limit`
    pub threshold_percent: f64,

    /// Mean usage percentage across trackers
    pub avg_usage_percent: f64,
}

/// Builder for [`CustomerOverview`]
pub struct OverviewBuilder<'a> {
    store: &'a dyn QuotaStore,
    threshold_percent: f64,
}

impl<'a> OverviewBuilder<'a> {
    pub fn new(store: &'a dyn QuotaStore) -> Self {
        Self {
            store,
            threshold_percent: DEFAULT_NEAR_LIMIT_THRESHOLD,
        }
    }

    pub fn threshold(mut self, threshold_percent: f64) -> Self {
        self.threshold_percent = threshold_percent;
        self
    }

    pub async fn build(&self, customer_id: &str) -> Result<CustomerOverview, QuotaError> {
        let platforms = quota_status_for_customer(self.store, customer_id).await?;

        let mut near_limit = Vec::new();
        let mut total_usage = 0.0;
        let mut count = 0usize;
        for (platform, endpoints) in &platforms {
            for (endpoint, status) in endpoints {
                total_usage += status.usage_percentage;
                count += 1;
                if status.usage_percentage > self.threshold_percent {
                    near_limit.push((platform.clone(), endpoint.clone()));
                }
            }
        }

        let avg_usage_percent = if count > 0 {
            total_usage / count as f64
        } else {
            0.0
        };

        Ok(CustomerOverview {
            timestamp: Utc::now(),
            customer_id: customer_id.to_string(),
            platforms,
            near_limit,
            threshold_percent: self.threshold_percent,
            avg_usage_percent,
        })
    }
}

pub async fn quota_status_for_customer(
    store: &dyn QuotaStore,
    customer_id: &str,
) -> Result<CustomerQuotaStatus, QuotaError> {
    let mut status = CustomerQuotaStatus::new();
    for tracker in store.trackers_for_customer(customer_id).await? {
        status
            .entry(tracker.key.platform.clone())
            .or_default()
            .insert(tracker.key.endpoint.clone(), QuotaStatus::from(&tracker));
    }
    Ok(status)
}

pub async fn platforms_near_limit(
    store: &dyn QuotaStore,
    customer_id: &str,
    threshold_percent: f64,
) -> Result<Vec<(String, String)>, QuotaError> {
    Ok(store
        .trackers_for_customer(customer_id)
        .await?
        .into_iter()
        .filter(|t| t.usage_percentage() > threshold_percent)
        .map(|t| (t.key.platform, t.key.endpoint))
        .collect())
}

pub async fn reset_expired_quotas(store: &dyn QuotaStore) -> Result<usize, QuotaError> {
    let count = store.reset_expired().await?;
    if count > 0 {
        metrics::QUOTA_WINDOW_RESETS_TOTAL.inc_by(count as u64);
        tracing::info!(count, "Reset expired quota windows");
    }
    Ok(count)
}
