//! quota-guard Library
//!
//! Per-customer, per-platform API quota tracking and rate limiting for
//! integrations with external ad, CRM and email platforms.

pub mod config;
pub mod logging;
pub mod metrics;
pub mod metrics_server;
pub mod rate_limit;

pub use rate_limit::{
    MemoryQuotaStore, QuotaError, QuotaStore, QuotaTracker, RateLimitConfig, RateLimitingService,
    Strategy, TrackerKey,
};
