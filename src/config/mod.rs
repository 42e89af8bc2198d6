//! Configuration types.
//!
//! - `estimators`: tuning for the EMA, Kalman and Bayesian estimators and the classifier
//! - this module: evaluation, verification, logging and the top-level [`AppConfig`]
//!   loaded from TOML

mod estimators;

pub use estimators::*;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::consts::*;
use crate::errors::{Error, Result};

/// Configuration for the convergence evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// |estimate − truth| below which a product counts as converged (g)
    pub error_threshold: f64,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            error_threshold: CONVERGENCE_ERROR_THRESHOLD,
        }
    }
}

/// Configuration for sigma-based order verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    /// Orders within this many tolerance-sigmas verify
    pub sigma_threshold: f64,
    /// One sigma equals this fraction of the inferred order weight
    pub relative_tolerance: f64,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            sigma_threshold: VERIFICATION_SIGMA_THRESHOLD,
            relative_tolerance: VERIFICATION_RELATIVE_TOLERANCE,
        }
    }
}

/// Logging configuration for binaries.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format: pretty, json, compact
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub estimators: EstimatorConfig,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    #[serde(default)]
    pub verification: VerificationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file; a missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::TomlParse(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        self.estimators.validate()?;
        if !(self.evaluation.error_threshold.is_finite() && self.evaluation.error_threshold > 0.0)
        {
            return Err(Error::config("evaluation.error_threshold must be positive"));
        }
        if !(self.verification.sigma_threshold > 0.0 && self.verification.relative_tolerance > 0.0)
        {
            return Err(Error::config(
                "verification thresholds must be positive",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            [estimators]
            default_prior_mean = 180.0

            [estimators.kalman]
            process_noise = 40.0

            [logging]
            format = "json"
            "#,
        )
        .unwrap();

        assert!((config.estimators.default_prior_mean - 180.0).abs() < 1e-12);
        assert!((config.estimators.kalman.process_noise - 40.0).abs() < 1e-12);
        assert!((config.estimators.kalman.measurement_noise - 10.0).abs() < 1e-12);
        assert!((config.estimators.bayesian.measurement_noise - 1200.0).abs() < 1e-12);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_invalid_toml_value_rejected() {
        let err = AppConfig::from_toml_str("[estimators.ema]\nalpha = 0.0\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)), "unexpected error: {err}");
    }

    #[test]
    fn test_toml_roundtrip_of_defaults() {
        let text = AppConfig::default().to_toml_string().unwrap();
        let parsed = AppConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed, AppConfig::default());
    }

    #[test]
    fn test_load_missing_file_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, AppConfig::default());
    }
}
