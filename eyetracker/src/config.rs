//! Engine configuration.
//!
//! Timing and acceptance thresholds for calibration and streaming. Stored as
//! JSON; every field has a default so partial files are valid.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Tunables for the tracking engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Sample queue capacity before the oldest samples are evicted
    pub queue_capacity: usize,
    /// Longest single device read in the sampling loop (ms)
    pub sample_poll_ms: u64,
    /// How long each point is shown before acquisition in timed mode (ms)
    pub point_dwell_ms: u64,
    /// Dwell multiplier applied in slow mode
    pub slow_mode_factor: u32,
    /// Acceptance sample window per point (ms)
    pub acceptance_window_ms: u64,
    /// Give up waiting for a settled fixation in automatic mode after this long (ms)
    pub fixation_timeout_ms: u64,
    /// Interval between fixation checks in automatic mode (ms)
    pub fixation_poll_ms: u64,
    /// Minimum mean confidence for a point to be accepted
    pub min_point_confidence: f64,
    /// Minimum fraction of accepted points for a run to succeed
    pub min_accepted_fraction: f64,
    /// In-place presentations of a rejected point when bad points are not skipped
    pub max_point_attempts: u32,
    /// Times a rejected point is moved to the end when bad points are skipped
    pub max_deferrals: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 4096,
            sample_poll_ms: 10,
            point_dwell_ms: 1000,
            slow_mode_factor: 2,
            acceptance_window_ms: 250,
            fixation_timeout_ms: 5000,
            fixation_poll_ms: 20,
            min_point_confidence: 0.6,
            min_accepted_fraction: 0.75,
            max_point_attempts: 3,
            max_deferrals: 1,
        }
    }
}

impl TrackerConfig {
    /// Check the configuration for values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid("queue_capacity must be > 0".into()));
        }
        if self.sample_poll_ms == 0 || self.fixation_poll_ms == 0 {
            return Err(ConfigError::Invalid("poll intervals must be > 0".into()));
        }
        if self.slow_mode_factor == 0 {
            return Err(ConfigError::Invalid("slow_mode_factor must be > 0".into()));
        }
        if self.max_point_attempts == 0 {
            return Err(ConfigError::Invalid(
                "max_point_attempts must be > 0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_point_confidence) {
            return Err(ConfigError::Invalid(format!(
                "min_point_confidence {} outside 0..=1",
                self.min_point_confidence
            )));
        }
        if !(0.0..=1.0).contains(&self.min_accepted_fraction) {
            return Err(ConfigError::Invalid(format!(
                "min_accepted_fraction {} outside 0..=1",
                self.min_accepted_fraction
            )));
        }
        Ok(())
    }

    /// Save to JSON file
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load from JSON file and validate
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn sample_poll(&self) -> Duration {
        Duration::from_millis(self.sample_poll_ms)
    }

    /// Dwell per point, stretched in slow mode.
    pub fn point_dwell(&self, slow_mode: bool) -> Duration {
        let factor = if slow_mode { self.slow_mode_factor } else { 1 };
        Duration::from_millis(self.point_dwell_ms) * factor
    }

    pub fn acceptance_window(&self) -> Duration {
        Duration::from_millis(self.acceptance_window_ms)
    }

    pub fn fixation_timeout(&self) -> Duration {
        Duration::from_millis(self.fixation_timeout_ms)
    }

    pub fn fixation_poll(&self) -> Duration {
        Duration::from_millis(self.fixation_poll_ms)
    }
}
