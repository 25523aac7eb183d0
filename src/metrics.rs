// Prometheus metrics for quota-guard
//
// Exposes metrics on /metrics HTTP endpoint:
// - Requests by outcome (counter)
// - Unit-of-work latency (histogram)
// - Pacing delay (histogram)
// - Quota usage ratio after admission (histogram, per platform/endpoint)
// - Window resets (counter)

use lazy_static::lazy_static;
use prometheus::{
    Encoder, Histogram, HistogramVec, IntCounter, IntCounterVec, Registry, TextEncoder,
};
use std::sync::Arc;
use std::time::Duration;

use crate::rate_limit::tracker::{QuotaTracker, TrackerKey};

lazy_static! {
    pub static ref REGISTRY: Arc<Registry> = Arc::new(Registry::new());

    pub static ref QUOTA_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("quota_requests_total", "Requests handled by the rate limiting service"),
        &["platform", "endpoint", "outcome"]
    ).expect("Failed to create quota requests metric");

    pub static ref QUOTA_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        prometheus::HistogramOpts::new("quota_request_duration_seconds", "Duration of rate-limited units of work"),
        &["platform", "endpoint"]
    ).expect("Failed to create request duration metric");

    pub static ref QUOTA_PACING_DELAY_SECONDS: Histogram = Histogram::with_opts(
        prometheus::HistogramOpts::new("quota_pacing_delay_seconds", "Time spent waiting for a pacing slot"),
    ).expect("Failed to create pacing delay metric");

    // Customer IDs stay out of the labels; per-customer usage is served by
    // the quota overview endpoint instead
    pub static ref QUOTA_USAGE_RATIO: HistogramVec = HistogramVec::new(
        prometheus::HistogramOpts::new(
            "quota_usage_ratio",
            "Fraction of the quota window consumed after each successful request"
        )
        .buckets(vec![0.1, 0.25, 0.5, 0.75, 0.8, 0.9, 0.95, 1.0]),
        &["platform", "endpoint"]
    ).expect("Failed to create quota usage metric");

    pub static ref QUOTA_WINDOW_RESETS_TOTAL: IntCounter = IntCounter::new(
        "quota_window_resets_total",
        "Quota windows reset by the expiry sweep"
    ).expect("Failed to create window resets metric");
}

/// How a request through the service ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    QuotaExceeded,
    RateLimited,
    Timeout,
    Failed,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::QuotaExceeded => "quota_exceeded",
            Outcome::RateLimited => "rate_limited",
            Outcome::Timeout => "timeout",
            Outcome::Failed => "failed",
        }
    }
}

/// Initialize metrics registry. Safe to call more than once.
pub fn init() -> prometheus::Result<()> {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(QUOTA_REQUESTS_TOTAL.clone()),
        Box::new(QUOTA_REQUEST_DURATION_SECONDS.clone()),
        Box::new(QUOTA_PACING_DELAY_SECONDS.clone()),
        Box::new(QUOTA_USAGE_RATIO.clone()),
        Box::new(QUOTA_WINDOW_RESETS_TOTAL.clone()),
    ];

    for collector in collectors {
        match REGISTRY.register(collector) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

pub fn record_outcome(key: &TrackerKey, outcome: Outcome) {
    QUOTA_REQUESTS_TOTAL
        .with_label_values(&[key.platform.as_str(), key.endpoint.as_str(), outcome.as_str()])
        .inc();
}

pub fn observe_duration(key: &TrackerKey, elapsed: Duration) {
    QUOTA_REQUEST_DURATION_SECONDS
        .with_label_values(&[key.platform.as_str(), key.endpoint.as_str()])
        .observe(elapsed.as_secs_f64());
}

pub fn observe_pacing(delay: Duration) {
    QUOTA_PACING_DELAY_SECONDS.observe(delay.as_secs_f64());
}

pub fn record_usage(tracker: &QuotaTracker) {
    QUOTA_USAGE_RATIO
        .with_label_values(&[tracker.key.platform.as_str(), tracker.key.endpoint.as_str()])
        .observe(tracker.usage_percentage() / 100.0);
}

/// Gather all metrics in Prometheus text format
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {}", e))?;
    String::from_utf8(buffer).map_err(|e| anyhow::anyhow!("Invalid UTF-8 in metrics: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        assert!(init().is_ok());
        assert!(init().is_ok());
    }

    #[test]
    fn test_record_outcome_shows_in_output() {
        init().unwrap();
        let key = TrackerKey::new("metrics_test", "widgets", "c1");
        record_outcome(&key, Outcome::Success);
        record_outcome(&key, Outcome::RateLimited);

        let text = gather_metrics().unwrap();
        assert!(text.contains("quota_requests_total"));
        assert!(text.contains("outcome=\"rate_limited\""));
    }

    #[test]
    fn test_usage_ratio_is_labelled_without_customer() {
        let histogram = QUOTA_USAGE_RATIO.with_label_values(&["metrics_test", "ratio"]);
        let before = histogram.get_sample_count();

        for customer in ["c1", "c2", "c3"] {
            let mut tracker =
                QuotaTracker::new(TrackerKey::new("metrics_test", "ratio", customer), 10, 60);
            tracker.consume(5);
            record_usage(&tracker);
        }

        assert_eq!(histogram.get_sample_count(), before + 3);
        assert!(histogram.get_sample_sum() >= 1.5 - 1e-9);
    }
}
