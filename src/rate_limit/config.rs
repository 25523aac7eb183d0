//! Rate Limit Configuration
//!
//! Default quotas per platform and service-wide pacing settings.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use super::strategy::Strategy;

/// Default rate limits
pub const DEFAULT_QUOTA_LIMIT: u64 = 1000; // calls per window
pub const DEFAULT_RESET_INTERVAL_SECS: u64 = 3600; // one hour
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;

/// Quota window for one platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformQuota {
    /// Calls allowed per window
    pub quota_limit: u64,

    /// Window length in seconds
    pub reset_interval_secs: u64,
}

impl PlatformQuota {
    pub fn new(quota_limit: u64, reset_interval_secs: u64) -> Self {
        Self {
            quota_limit,
            reset_interval_secs,
        }
    }
}

/// Rate limit configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Strategy used when a service is built without one
    pub default_strategy: Strategy,

    /// Quota limit for platforms without an entry in `platforms`
    pub default_quota_limit: u64,

    /// Window length for platforms without an entry in `platforms`
    pub default_reset_interval_secs: u64,

    /// Sleep between requests according to the strategy
    pub pacing_enabled: bool,

    /// Upper bound on a single unit of work
    pub request_timeout_secs: u64,

    /// Per-platform quota defaults
    pub platforms: HashMap<String, PlatformQuota>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            default_strategy: Strategy::Balanced,
            default_quota_limit: DEFAULT_QUOTA_LIMIT,
            default_reset_interval_secs: DEFAULT_RESET_INTERVAL_SECS,
            pacing_enabled: true,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            platforms: default_platforms(),
        }
    }
}

fn default_platforms() -> HashMap<String, PlatformQuota> {
    [
        ("google_ads", PlatformQuota::new(15_000, 86_400)),
        ("facebook_ads", PlatformQuota::new(200, 3_600)),
        ("linkedin_ads", PlatformQuota::new(100_000, 86_400)),
        ("salesforce", PlatformQuota::new(15_000, 86_400)),
        ("hubspot", PlatformQuota::new(100, 10)),
        ("mailchimp", PlatformQuota::new(1_000, 3_600)),
    ]
    .into_iter()
    .map(|(name, quota)| (name.to_string(), quota))
    .collect()
}

impl RateLimitConfig {
    /// Create a new rate limit configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration without inter-request sleeps (for testing)
    pub fn without_pacing() -> Self {
        Self {
            pacing_enabled: false,
            ..Self::default()
        }
    }

    /// Override the quota for one platform
    pub fn with_platform(mut self, platform: &str, quota: PlatformQuota) -> Self {
        self.platforms.insert(platform.to_string(), quota);
        self
    }

    /// Quota defaults that apply to `platform`
    pub fn quota_for(&self, platform: &str) -> PlatformQuota {
        self.platforms.get(platform).copied().unwrap_or(PlatformQuota {
            quota_limit: self.default_quota_limit,
            reset_interval_secs: self.default_reset_interval_secs,
        })
    }

    /// Get request timeout duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Apply `QUOTA_GUARD_*` environment overrides
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("QUOTA_GUARD_DEFAULT_STRATEGY") {
            match val.parse() {
                Ok(strategy) => self.default_strategy = strategy,
                Err(e) => tracing::warn!("Ignoring QUOTA_GUARD_DEFAULT_STRATEGY: {}", e),
            }
        }

        if let Ok(val) = std::env::var("QUOTA_GUARD_DEFAULT_QUOTA_LIMIT") {
            if let Ok(limit) = val.parse() {
                self.default_quota_limit = limit;
            }
        }

        if let Ok(val) = std::env::var("QUOTA_GUARD_RESET_INTERVAL_SECS") {
            if let Ok(secs) = val.parse() {
                self.default_reset_interval_secs = secs;
            }
        }

        if let Ok(val) = std::env::var("QUOTA_GUARD_PACING_ENABLED") {
            self.pacing_enabled = val.parse().unwrap_or(self.pacing_enabled);
        }

        if let Ok(val) = std::env::var("QUOTA_GUARD_REQUEST_TIMEOUT_SECS") {
            if let Ok(secs) = val.parse() {
                self.request_timeout_secs = secs;
            }
        }

        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.default_reset_interval_secs == 0 {
            anyhow::bail!("Default reset interval must be > 0 seconds");
        }
        if self.request_timeout_secs == 0 {
            anyhow::bail!("Request timeout must be > 0 seconds");
        }
        for (platform, quota) in &self.platforms {
            if platform.trim().is_empty() {
                anyhow::bail!("Platform quota entry has an empty name");
            }
            if quota.reset_interval_secs == 0 {
                anyhow::bail!("Platform '{}' has a zero reset interval", platform);
            }
        }
        Ok(())
    }
}
