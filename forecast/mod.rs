//! # Conditional Forecaster
//!
//! Two-stage forecasting: the positivity predictor is forecast on its own, then each
//! outcome is forecast with the predictor as an exogenous regressor, fed observed
//! history followed by the predictor's own forecast. Models are regressions with
//! ARIMA errors whose orders come from a swappable [`OrderSelection`] strategy.

pub mod arima;
pub mod conditional;
pub mod selection;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use arima::{ArimaFit, ArimaOrder, ModelSummary, Predictive};
pub use conditional::{ConditionalForecaster, OutcomeForecast, PredictorForecast};
pub use selection::{AiccGridSearch, OrderSelection};

/// Fewest observed training days any model in this crate will be fit on.
pub const MIN_TRAINING_OBSERVATIONS: usize = 10;

/// Standard normal quantiles for the two nested central prediction intervals.
const Z_80: f64 = 1.281_551_565_544_600_4;
const Z_95: f64 = 1.959_963_984_540_054;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ForecastError {
    #[error(
        "The training window holds {found} usable observations, but the model class needs at least {required}."
    )]
    InsufficientData { found: usize, required: usize },
    #[error("The model was fit with an exogenous regressor, but no future regressor values were supplied.")]
    MissingExogenous,
    #[error("Expected {expected} future regressor values, got {found}.")]
    ExogenousLength { expected: usize, found: usize },
    #[error("Coefficient optimisation failed: {0}")]
    OptimizationFailed(String),
    #[error("Least-squares regression failed: {0}")]
    Linalg(String),
    #[error("None of the {tried} candidate orders could be fit.")]
    NoCandidate { tried: usize },
}

/// One horizon step with its point estimate and nested 80% / 95% intervals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub point_estimate: f64,
    pub lower_80: f64,
    pub upper_80: f64,
    pub lower_95: f64,
    pub upper_95: f64,
}

impl ForecastPoint {
    pub fn from_predictive(date: NaiveDate, predictive: Predictive) -> Self {
        let sd = if predictive.sd.is_finite() {
            predictive.sd.max(0.0)
        } else {
            0.0
        };
        let mean = predictive.mean;
        Self {
            date,
            point_estimate: mean,
            lower_80: mean - Z_80 * sd,
            upper_80: mean + Z_80 * sd,
            lower_95: mean - Z_95 * sd,
            upper_95: mean + Z_95 * sd,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intervals_are_nested_around_the_point() {
        let date = NaiveDate::from_ymd_opt(2020, 6, 1).unwrap();
        for (mean, sd) in [(0.0, 1.0), (-3.5, 0.0), (120.0, 14.2), (7.0, f64::NAN)] {
            let p = ForecastPoint::from_predictive(date, Predictive { mean, sd });
            assert!(p.lower_95 <= p.lower_80);
            assert!(p.lower_80 <= p.point_estimate);
            assert!(p.point_estimate <= p.upper_80);
            assert!(p.upper_80 <= p.upper_95);
        }
    }
}
