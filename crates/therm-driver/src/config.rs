// SPDX-License-Identifier: AGPL-3.0-only

//! Pipeline configuration
//!
//! Defaults describe the chip as it boots: 14 sensors, prediction enabled,
//! scheduler disabled, unbounded waits. Host runs usually bound the waits,
//! either with [`PipelineConfig::with_wait`] or through the environment:
//!
//! | Variable | Effect |
//! |----------|--------|
//! | `THERM_WAIT_TIMEOUT_MS` | [`WaitPolicy::Timeout`] of that many milliseconds |
//! | `THERM_MAX_POLLS` | [`WaitPolicy::MaxPolls`] (ignored if a timeout is also set) |

use crate::error::{Result, ThermError};
use crate::handshake::WaitPolicy;
use std::time::Duration;
use therm_chip::{map, TopConfig, NUM_SENSORS};
use tracing::debug;

/// Wall-clock wait bound in milliseconds.
pub const ENV_WAIT_TIMEOUT_MS: &str = "THERM_WAIT_TIMEOUT_MS";

/// Poll-count wait bound.
pub const ENV_MAX_POLLS: &str = "THERM_MAX_POLLS";

/// Everything the pipeline needs besides the model and calibration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Sensors served per iteration.
    pub num_sensors: usize,

    /// Bound on every handshake wait.
    pub wait: WaitPolicy,

    /// Serve the compute and store-prediction channels after store-sensor.
    pub service_predictions: bool,

    /// Serve the store-action channel at the end of each iteration.
    pub service_action: bool,

    /// Thermal-top control words written at startup.
    pub top: TopConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            num_sensors: NUM_SENSORS,
            wait: WaitPolicy::Unbounded,
            service_predictions: true,
            service_action: false,
            top: TopConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Defaults overlaid with `THERM_WAIT_TIMEOUT_MS` / `THERM_MAX_POLLS`.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set but not a positive integer.
    pub fn from_env() -> Result<Self> {
        Self::default().overlay(|key| std::env::var(key).ok())
    }

    /// Apply wait-bound overrides from `lookup`.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is present but not a positive integer.
    pub fn overlay(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(polls) = parse_positive(&lookup, ENV_MAX_POLLS)? {
            self.wait = WaitPolicy::MaxPolls(polls);
        }
        if let Some(ms) = parse_positive(&lookup, ENV_WAIT_TIMEOUT_MS)? {
            self.wait = WaitPolicy::Timeout(Duration::from_millis(ms));
        }
        debug!(wait = ?self.wait, "Pipeline wait policy");
        Ok(self)
    }

    /// Set the sensor count.
    #[must_use]
    pub fn with_num_sensors(mut self, num_sensors: usize) -> Self {
        self.num_sensors = num_sensors;
        self
    }

    /// Set the wait policy.
    #[must_use]
    pub fn with_wait(mut self, wait: WaitPolicy) -> Self {
        self.wait = wait;
        self
    }

    /// Set the number of iterations the thermal top runs.
    #[must_use]
    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.top.num_itr = iterations;
        self
    }

    /// Enable or disable prediction (compute and store-prediction channels).
    #[must_use]
    pub fn with_predictions(mut self, enabled: bool) -> Self {
        self.service_predictions = enabled;
        self.top.pred_en = enabled;
        self
    }

    /// Enable or disable the scheduler's store-action channel.
    #[must_use]
    pub fn with_action(mut self, enabled: bool) -> Self {
        self.service_action = enabled;
        self.top.schedule_en = enabled;
        self
    }

    /// Reject configurations the chip cannot run.
    ///
    /// # Errors
    ///
    /// Returns an error if the sensor count is zero or exceeds what the
    /// frequency or standardization buffers hold, the iteration count
    /// overflows its field, or a wait bound is zero.
    pub fn validate(&self) -> Result<()> {
        let freq_slots = (map::PS_CODE_BUFFER_BASE - map::SENSOR_FREQ_BUFFER_BASE) / 4;
        let limit = freq_slots.min(map::STANDARDIZATION_ENTRIES);
        if self.num_sensors == 0 || self.num_sensors > limit {
            return Err(ThermError::invalid_config(format!(
                "{} sensors, must be in 1..={limit}",
                self.num_sensors
            )));
        }
        if self.top.num_itr > TopConfig::MAX_ITERATIONS {
            return Err(ThermError::invalid_config(format!(
                "{} iterations exceeds {}",
                self.top.num_itr,
                TopConfig::MAX_ITERATIONS
            )));
        }
        match self.wait {
            WaitPolicy::MaxPolls(0) => Err(ThermError::invalid_config("poll limit of 0")),
            WaitPolicy::Timeout(d) if d.is_zero() => {
                Err(ThermError::invalid_config("timeout of 0"))
            }
            _ => Ok(()),
        }
    }
}

fn parse_positive(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<u64>> {
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    match raw.trim().parse::<u64>() {
        Ok(v) if v > 0 => Ok(Some(v)),
        _ => Err(ThermError::invalid_config(format!(
            "{key}={raw:?}: expected a positive integer"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |key: &str| {
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (*v).to_string())
        }
    }

    #[test]
    fn defaults_match_boot_chip() {
        let c = PipelineConfig::default();
        assert_eq!(c.num_sensors, 14);
        assert_eq!(c.wait, WaitPolicy::Unbounded);
        assert!(c.service_predictions && !c.service_action);
        assert!(c.top.pred_en && !c.top.schedule_en);
        c.validate().unwrap();
    }

    #[test]
    fn env_overrides() {
        let c = PipelineConfig::default()
            .overlay(env(&[(ENV_MAX_POLLS, "5000")]))
            .unwrap();
        assert_eq!(c.wait, WaitPolicy::MaxPolls(5000));

        let c = PipelineConfig::default()
            .overlay(env(&[(ENV_MAX_POLLS, "5000"), (ENV_WAIT_TIMEOUT_MS, " 250 ")]))
            .unwrap();
        assert_eq!(c.wait, WaitPolicy::Timeout(Duration::from_millis(250)));

        let c = PipelineConfig::default().overlay(env(&[])).unwrap();
        assert_eq!(c.wait, WaitPolicy::Unbounded);
    }

    #[test]
    fn env_garbage_rejected() {
        for bad in ["0", "-3", "soon", ""] {
            let err = PipelineConfig::default()
                .overlay(env(&[(ENV_WAIT_TIMEOUT_MS, bad)]))
                .unwrap_err();
            assert!(err.to_string().contains(ENV_WAIT_TIMEOUT_MS), "{err}");
        }
    }

    #[test]
    fn builders_keep_top_config_in_step() {
        let c = PipelineConfig::default()
            .with_action(true)
            .with_predictions(false)
            .with_iterations(3);
        assert!(c.top.schedule_en && c.service_action);
        assert!(!c.top.pred_en && !c.service_predictions);
        assert_eq!(c.top.num_itr, 3);
    }

    #[test]
    fn validation_limits() {
        assert!(PipelineConfig::default().with_num_sensors(0).validate().is_err());
        assert!(PipelineConfig::default().with_num_sensors(16).validate().is_ok());
        assert!(PipelineConfig::default().with_num_sensors(17).validate().is_err());
        assert!(PipelineConfig::default()
            .with_iterations(TopConfig::MAX_ITERATIONS + 1)
            .validate()
            .is_err());
        assert!(PipelineConfig::default()
            .with_wait(WaitPolicy::MaxPolls(0))
            .validate()
            .is_err());
    }
}
