//! Status and timing reports returned by the rate limiting service.

use serde::{Deserialize, Serialize, Serializer};
use std::time::Duration;

use super::strategy::{Strategy, StrategyParams};
use super::tracker::QuotaTracker;

fn as_secs_f64<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

fn from_secs_f64<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let secs = f64::deserialize(deserializer)?;
    Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
}

/// Quota portion of a status report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaStatus {
    pub limit: u64,
    pub used: u64,
    pub remaining: u64,
    pub usage_percentage: f64,
    #[serde(
        rename = "time_until_reset_secs",
        serialize_with = "as_secs_f64",
        deserialize_with = "from_secs_f64"
    )]
    pub time_until_reset: Duration,
}

impl From<&QuotaTracker> for QuotaStatus {
    fn from(tracker: &QuotaTracker) -> Self {
        Self {
            limit: tracker.quota_limit,
            used: tracker.effective_usage(),
            remaining: tracker.remaining(),
            usage_percentage: tracker.usage_percentage(),
            time_until_reset: tracker.time_until_reset(),
        }
    }
}

/// Pacing portion of a status report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitStatus {
    pub requests_per_second: f64,
    pub batch_size_hint: u64,
    pub backoff_multiplier: f64,
}

impl From<StrategyParams> for RateLimitStatus {
    fn from(params: StrategyParams) -> Self {
        Self {
            requests_per_second: params.requests_per_second,
            batch_size_hint: params.batch_size_hint,
            backoff_multiplier: params.backoff_multiplier,
        }
    }
}

/// Snapshot of one service's quota and pacing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub platform: String,
    pub endpoint: String,
    pub customer_id: String,
    pub strategy: Strategy,
    pub quota: QuotaStatus,
    pub rate_limit: RateLimitStatus,
}

/// Why a batch of requests cannot start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    QuotaExceeded,
}

/// Suggested way to run a number of requests
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimingPlan {
    #[serde(rename = "estimated_duration_secs", serialize_with = "as_secs_f64")]
    pub estimated_duration: Duration,
    pub recommended_batch_size: u64,
    #[serde(rename = "wait_time_secs", serialize_with = "as_secs_f64")]
    pub wait_time: Duration,
    pub strategy_recommendation: Strategy,
}

/// Result of `optimize_request_timing`
#[derive(Debug, Clone, PartialEq)]
pub enum TimingRecommendation {
    Blocked { reason: BlockReason },
    Proceed(TimingPlan),
}

impl TimingRecommendation {
    pub fn can_proceed(&self) -> bool {
        matches!(self, TimingRecommendation::Proceed(_))
    }

    pub fn plan(&self) -> Option<&TimingPlan> {
        match self {
            TimingRecommendation::Proceed(plan) => Some(plan),
            TimingRecommendation::Blocked { .. } => None,
        }
    }
}

// Flat shape: {"can_proceed": false, "reason": "quota_exceeded"} or
// {"can_proceed": true, ...plan fields}
impl Serialize for TimingRecommendation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Flat<'a> {
            can_proceed: bool,
            #[serde(skip_serializing_if = "Option::is_none")]
            reason: Option<BlockReason>,
            #[serde(flatten)]
            plan: Option<&'a TimingPlan>,
        }

        let flat = match self {
            TimingRecommendation::Blocked { reason } => Flat {
                can_proceed: false,
                reason: Some(*reason),
                plan: None,
            },
            TimingRecommendation::Proceed(plan) => Flat {
                can_proceed: true,
                reason: None,
                plan: Some(plan),
            },
        };
        flat.serialize(serializer)
    }
}
