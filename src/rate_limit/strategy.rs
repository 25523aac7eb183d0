//! Request Pacing Strategies

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Usage percentage below which the aggressive strategy is recommended
pub const AGGRESSIVE_USAGE_CEILING: f64 = 30.0;

/// Usage percentage up to which the balanced strategy is recommended
pub const BALANCED_USAGE_CEILING: f64 = 80.0;

/// Named pacing profile
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Aggressive,
    #[default]
    Balanced,
    Conservative,
}

/// Parameters a strategy maps to
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrategyParams {
    /// Target request rate
    pub requests_per_second: f64,

    /// Suggested number of items per batch
    pub batch_size_hint: u64,

    /// Multiplier applied to backoff delays
    pub backoff_multiplier: f64,
}

impl Strategy {
    /// All strategies, most aggressive first
    pub const ALL: [Strategy; 3] = [
        Strategy::Aggressive,
        Strategy::Balanced,
        Strategy::Conservative,
    ];

    /// Look up the pacing parameters for this strategy
    pub fn params(&self) -> StrategyParams {
        match self {
            Strategy::Aggressive => StrategyParams {
                requests_per_second: 10.0,
                batch_size_hint: 100,
                backoff_multiplier: 1.0,
            },
            Strategy::Balanced => StrategyParams {
                requests_per_second: 5.0,
                batch_size_hint: 50,
                backoff_multiplier: 1.5,
            },
            Strategy::Conservative => StrategyParams {
                requests_per_second: 2.0,
                batch_size_hint: 20,
                backoff_multiplier: 2.0,
            },
        }
    }

    /// Minimum spacing between two requests
    pub fn min_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.params().requests_per_second)
    }

    /// Strategy to use at a given quota usage percentage.
    ///
    /// Higher usage never yields a more aggressive strategy.
    pub fn recommended_for_usage(usage_percentage: f64) -> Strategy {
        if usage_percentage < AGGRESSIVE_USAGE_CEILING {
            Strategy::Aggressive
        } else if usage_percentage <= BALANCED_USAGE_CEILING {
            Strategy::Balanced
        } else {
            Strategy::Conservative
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Aggressive => write!(f, "aggressive"),
            Strategy::Balanced => write!(f, "balanced"),
            Strategy::Conservative => write!(f, "conservative"),
        }
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "aggressive" => Ok(Strategy::Aggressive),
            "balanced" => Ok(Strategy::Balanced),
            "conservative" => Ok(Strategy::Conservative),
            _ => Err(format!(
                "Invalid strategy: {}. Must be one of: aggressive, balanced, conservative",
                s
            )),
        }
    }
}
