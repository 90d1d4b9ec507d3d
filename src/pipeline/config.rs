//! Pipeline configuration.
//!
//! Batch sizing and every anomaly threshold are named, overridable options:
//! defaults here, environment overrides via `TRIPFORGE_*`, and CLI flags on
//! top. Rule code never reads a magic number of its own.

use thiserror::Error;

use crate::quality::AnomalyThresholds;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Default number of cleaned records accumulated before a batch flush.
const DEFAULT_BATCH_SIZE: usize = 5000;

/// Configuration for one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Cleaned records per output batch; the only point where the run
    /// blocks on I/O.
    pub batch_size: usize,
    /// Soft-flag rule thresholds.
    pub thresholds: AnomalyThresholds,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            thresholds: AnomalyThresholds::default(),
        }
    }
}

impl PipelineConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `TRIPFORGE_BATCH_SIZE`: cleaned records per flush (default: 5000)
    /// - `TRIPFORGE_MAX_SPEED_MPH` / `TRIPFORGE_MIN_SPEED_MPH`
    /// - `TRIPFORGE_MIN_DISTANCE_FOR_SPEED`
    /// - `TRIPFORGE_FARE_PER_MILE_MAX` / `TRIPFORGE_FARE_PER_MILE_MIN`
    /// - `TRIPFORGE_CONFLICT_MAX_DURATION_MIN`
    /// - `TRIPFORGE_CONFLICT_MIN_DISTANCE`
    /// - `TRIPFORGE_TIP_FARE_RATIO_CEILING`
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("TRIPFORGE_BATCH_SIZE") {
            config.batch_size = parse_env_value(&val, "TRIPFORGE_BATCH_SIZE")?;
        }

        let t = &mut config.thresholds;
        if let Ok(val) = std::env::var("TRIPFORGE_MAX_SPEED_MPH") {
            t.max_speed_mph = parse_env_value(&val, "TRIPFORGE_MAX_SPEED_MPH")?;
        }
        if let Ok(val) = std::env::var("TRIPFORGE_MIN_SPEED_MPH") {
            t.min_speed_mph = parse_env_value(&val, "TRIPFORGE_MIN_SPEED_MPH")?;
        }
        if let Ok(val) = std::env::var("TRIPFORGE_MIN_DISTANCE_FOR_SPEED") {
            t.min_distance_for_speed = parse_env_value(&val, "TRIPFORGE_MIN_DISTANCE_FOR_SPEED")?;
        }
        if let Ok(val) = std::env::var("TRIPFORGE_FARE_PER_MILE_MAX") {
            t.fare_per_mile_max = parse_env_value(&val, "TRIPFORGE_FARE_PER_MILE_MAX")?;
        }
        if let Ok(val) = std::env::var("TRIPFORGE_FARE_PER_MILE_MIN") {
            t.fare_per_mile_min = parse_env_value(&val, "TRIPFORGE_FARE_PER_MILE_MIN")?;
        }
        if let Ok(val) = std::env::var("TRIPFORGE_CONFLICT_MAX_DURATION_MIN") {
            t.conflict_max_duration_min =
                parse_env_value(&val, "TRIPFORGE_CONFLICT_MAX_DURATION_MIN")?;
        }
        if let Ok(val) = std::env::var("TRIPFORGE_CONFLICT_MIN_DISTANCE") {
            t.conflict_min_distance = parse_env_value(&val, "TRIPFORGE_CONFLICT_MIN_DISTANCE")?;
        }
        if let Ok(val) = std::env::var("TRIPFORGE_TIP_FARE_RATIO_CEILING") {
            t.tip_fare_ratio_ceiling = parse_env_value(&val, "TRIPFORGE_TIP_FARE_RATIO_CEILING")?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Sets the batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the anomaly thresholds.
    pub fn with_thresholds(mut self, thresholds: AnomalyThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::ValidationFailed(
                "batch_size must be positive".to_string(),
            ));
        }
        let t = &self.thresholds;
        if t.min_speed_mph >= t.max_speed_mph {
            return Err(ConfigError::ValidationFailed(format!(
                "speed bounds inverted: min {} >= max {}",
                t.min_speed_mph, t.max_speed_mph
            )));
        }
        if t.fare_per_mile_min >= t.fare_per_mile_max {
            return Err(ConfigError::ValidationFailed(format!(
                "fare-per-mile bounds inverted: min {} >= max {}",
                t.fare_per_mile_min, t.fare_per_mile_max
            )));
        }
        if t.tip_fare_ratio_ceiling <= 0.0 {
            return Err(ConfigError::ValidationFailed(
                "tip_fare_ratio_ceiling must be positive".to_string(),
            ));
        }
        if t.min_distance_for_speed < 0.0 || t.conflict_min_distance < 0.0 {
            return Err(ConfigError::ValidationFailed(
                "distance thresholds must be non-negative".to_string(),
            ));
        }
        if t.conflict_max_duration_min <= 0.0 {
            return Err(ConfigError::ValidationFailed(
                "conflict_max_duration_min must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parses a value from an environment variable string.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|err: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let config = PipelineConfig::new().with_batch_size(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_inverted_speed_bounds_rejected() {
        let mut config = PipelineConfig::new();
        config.thresholds.min_speed_mph = 90.0;
        assert!(config.validate().is_err());
    }

    // One sequential test: the process environment is shared across test
    // threads, so the override and rejection phases must not interleave.
    #[test]
    fn test_from_env_overrides_and_rejections() {
        std::env::set_var("TRIPFORGE_BATCH_SIZE", "250");
        std::env::set_var("TRIPFORGE_TIP_FARE_RATIO_CEILING", "0.3");
        let config = PipelineConfig::from_env();
        std::env::remove_var("TRIPFORGE_BATCH_SIZE");
        std::env::remove_var("TRIPFORGE_TIP_FARE_RATIO_CEILING");

        let config = config.unwrap();
        assert_eq!(config.batch_size, 250);
        assert_eq!(config.thresholds.tip_fare_ratio_ceiling, 0.3);
        // Untouched thresholds keep their defaults.
        assert_eq!(
            config.thresholds.max_speed_mph,
            AnomalyThresholds::default().max_speed_mph
        );

        std::env::set_var("TRIPFORGE_CONFLICT_MIN_DISTANCE", "far");
        let result = PipelineConfig::from_env();
        std::env::remove_var("TRIPFORGE_CONFLICT_MIN_DISTANCE");

        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_parse_env_value() {
        let value: usize = parse_env_value("42", "KEY").unwrap();
        assert_eq!(value, 42);
        assert!(parse_env_value::<usize>("nope", "KEY").is_err());
    }
}
