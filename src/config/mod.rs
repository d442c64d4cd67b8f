//! Runtime tunables for the log plugin host, loadable from the
//! environment. Everything not covered here (pressure sample count,
//! idle backoff) is a fixed constant by design — see
//! [`crate::plugin::pressure`] and [`crate::plugin::worker`].

use std::env;
use std::time::Duration;

use crate::plugin::HostTuning;

/// Environment variable overriding the short-circuit queue-depth
/// threshold. Parsed as `usize`; invalid or missing values fall back to
/// [`HostConfig::default`].
pub const SHORT_CIRCUIT_THRESHOLD_VAR: &str = "LOG_PLUGIN_HOST_SHORT_CIRCUIT_THRESHOLD";

/// Environment variable overriding the pressure-monitor sampling period,
/// in milliseconds.
pub const MONITOR_FREQUENCY_MS_VAR: &str = "LOG_PLUGIN_HOST_MONITOR_FREQUENCY_MS";

/// Host configuration: the subset of [`HostTuning`] an operator may
/// override without a code change.
#[derive(Debug, Clone, Copy)]
pub struct HostConfig {
    pub short_circuit_threshold: usize,
    pub monitor_period: Duration,
}

impl Default for HostConfig {
    fn default() -> Self {
        let defaults = HostTuning::default();
        Self {
            short_circuit_threshold: defaults.short_circuit_threshold,
            monitor_period: defaults.monitor_period,
        }
    }
}

impl HostConfig {
    /// Start from defaults and apply any recognized environment
    /// variables, logging what (if anything) was overridden.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(raw) = env::var(SHORT_CIRCUIT_THRESHOLD_VAR) {
            match raw.parse::<usize>() {
                Ok(value) => {
                    tracing::info!(
                        threshold = value,
                        "overriding short-circuit threshold from environment"
                    );
                    config.short_circuit_threshold = value;
                }
                Err(_) => {
                    tracing::warn!(
                        value = %raw,
                        "ignoring invalid {SHORT_CIRCUIT_THRESHOLD_VAR}, not a usize"
                    );
                }
            }
        }

        if let Ok(raw) = env::var(MONITOR_FREQUENCY_MS_VAR) {
            match raw.parse::<u64>() {
                Ok(ms) => {
                    tracing::info!(
                        period_ms = ms,
                        "overriding monitor sampling period from environment"
                    );
                    config.monitor_period = Duration::from_millis(ms);
                }
                Err(_) => {
                    tracing::warn!(
                        value = %raw,
                        "ignoring invalid {MONITOR_FREQUENCY_MS_VAR}, not a u64"
                    );
                }
            }
        }

        config
    }

    pub fn short_circuit_threshold(mut self, threshold: usize) -> Self {
        self.short_circuit_threshold = threshold;
        self
    }

    pub fn monitor_period(mut self, period: Duration) -> Self {
        self.monitor_period = period;
        self
    }

    pub fn into_tuning(self) -> HostTuning {
        HostTuning {
            short_circuit_threshold: self.short_circuit_threshold,
            monitor_period: self.monitor_period,
        }
    }
}
