//! Configuration module.

use std::env;

use chrono::Duration;

const DEFAULT_OBSERVATION_MINUTES: i64 = 60;

/// Baseline manager configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// How long a deployment keeps learning flows into its baseline after
    /// creation or after a network policy touching it changes.
    pub observation_window: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let minutes = env::var("BASELINE_OBSERVATION_PERIOD_MINUTES")
            .ok()
            .and_then(|m| m.parse::<i64>().ok())
            .unwrap_or(DEFAULT_OBSERVATION_MINUTES);

        Self {
            observation_window: Duration::minutes(minutes),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            observation_window: Duration::minutes(DEFAULT_OBSERVATION_MINUTES),
        }
    }
}
