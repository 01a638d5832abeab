// ========================================================================================
//                                   Run Configuration
// ========================================================================================

use crate::forecast::AiccGridSearch;
use crate::lexicon::NeutralBand;
use crate::types::BoundingBox;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error while reading or writing the run configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse run configuration TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Failed to serialize run configuration to TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("Invalid configuration value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Everything a run depends on besides its input data. Two runs with equal
/// configurations over equal inputs produce equal reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub location_name: String,
    /// Last day of training data. Later observations are never seen by the forecaster.
    pub training_cutoff_date: NaiveDate,
    pub forecast_horizon: usize,
    pub max_lag: usize,
    pub kernel_width: f64,
    pub grid_sample_count: usize,
    pub neutral_band: NeutralBand,
    /// Seed for the spatial grid sampler.
    pub seed: u64,
    pub order_search: AiccGridSearch,
    /// Inline bounding box for the static gazetteer; overrides the built-in entries.
    pub bounding_box: Option<BoundingBox>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            location_name: "New York".to_string(),
            training_cutoff_date: NaiveDate::from_ymd_opt(2020, 6, 30).unwrap_or_default(),
            forecast_horizon: 14,
            max_lag: 14,
            kernel_width: 0.5,
            grid_sample_count: 10_000,
            neutral_band: NeutralBand::default(),
            seed: 42,
            order_search: AiccGridSearch::default(),
            bounding_box: None,
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field, reason: &str| {
            Err(ConfigError::Invalid {
                field,
                reason: reason.to_string(),
            })
        };
        if self.location_name.trim().is_empty() {
            return invalid("location_name", "must not be empty");
        }
        if self.forecast_horizon == 0 {
            return invalid("forecast_horizon", "must be at least one day");
        }
        if self.max_lag == 0 {
            return invalid("max_lag", "must be at least one day");
        }
        if !(self.kernel_width.is_finite() && self.kernel_width > 0.0) {
            return invalid("kernel_width", "must be a positive finite number");
        }
        if self.grid_sample_count == 0 {
            return invalid("grid_sample_count", "must be at least one point");
        }
        let band = self.neutral_band;
        if !(band.lower.is_finite() && band.upper.is_finite() && band.lower < band.upper) {
            return invalid("neutral_band", "lower bound must be below upper bound");
        }
        if let Some(bbox) = &self.bounding_box {
            if !bbox.is_valid() {
                return invalid("bounding_box", "min corner must be strictly below max corner");
            }
        }
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        Ok(())
    }

    /// Loads and validates a configuration. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let toml_string = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&toml_string)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn save_and_load_preserve_every_field() {
        let config = RunConfig {
            location_name: "Los Angeles".to_string(),
            training_cutoff_date: NaiveDate::from_ymd_opt(2020, 7, 15).unwrap(),
            forecast_horizon: 7,
            seed: 9,
            bounding_box: Some(BoundingBox {
                min_lng: -118.67,
                min_lat: 33.70,
                max_lng: -118.15,
                max_lat: 34.34,
            }),
            ..RunConfig::default()
        };
        let file = NamedTempFile::new().unwrap();
        config.save(file.path()).unwrap();
        assert_eq!(RunConfig::load(file.path()).unwrap(), config);
    }

    #[test]
    fn partial_file_takes_defaults() {
        let config: RunConfig = toml::from_str(
            r#"
            location_name = "Chicago"
            training_cutoff_date = "2020-05-31"
            "#,
        )
        .unwrap();
        assert_eq!(config.location_name, "Chicago");
        assert_eq!(config.forecast_horizon, 14);
        assert_eq!(config.grid_sample_count, 10_000);
        assert_eq!(config.neutral_band, NeutralBand::default());
        config.validate().unwrap();
    }

    #[test]
    fn validation_rejects_unusable_values() {
        let bad = [
            RunConfig {
                forecast_horizon: 0,
                ..RunConfig::default()
            },
            RunConfig {
                max_lag: 0,
                ..RunConfig::default()
            },
            RunConfig {
                kernel_width: -0.1,
                ..RunConfig::default()
            },
            RunConfig {
                grid_sample_count: 0,
                ..RunConfig::default()
            },
            RunConfig {
                neutral_band: NeutralBand {
                    lower: 6.0,
                    upper: 4.0,
                },
                ..RunConfig::default()
            },
        ];
        for config in bad {
            assert!(matches!(
                config.validate(),
                Err(ConfigError::Invalid { .. })
            ));
        }
    }
}
