use super::arima::ModelSummary;
use super::selection::OrderSelection;
use super::{ForecastError, ForecastPoint, MIN_TRAINING_OBSERVATIONS};
use crate::series::DailySeries;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// The predictor's own forecast, shared by every outcome forecast of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictorForecast {
    pub strategy: String,
    pub model: ModelSummary,
    pub training_start: NaiveDate,
    pub training_end: NaiveDate,
    pub points: Vec<ForecastPoint>,
    #[serde(skip)]
    history: Vec<Option<f64>>,
}

impl PredictorForecast {
    /// The predictor's training values on `start..start+len`, missing outside the window.
    fn history_on(&self, start: NaiveDate, len: usize) -> Vec<Option<f64>> {
        (0..len)
            .map(|i| {
                let offset = (start + Duration::days(i as i64) - self.training_start).num_days();
                if offset < 0 {
                    None
                } else {
                    self.history.get(offset as usize).copied().flatten()
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeForecast {
    pub strategy: String,
    pub model: ModelSummary,
    pub training_start: NaiveDate,
    pub training_end: NaiveDate,
    pub points: Vec<ForecastPoint>,
}

/// Runs the two-stage forecast for one training cutoff and horizon.
pub struct ConditionalForecaster<'a> {
    selection: &'a dyn OrderSelection,
    training_cutoff: NaiveDate,
    horizon: usize,
}

impl<'a> ConditionalForecaster<'a> {
    pub fn new(selection: &'a dyn OrderSelection, training_cutoff: NaiveDate, horizon: usize) -> Self {
        Self {
            selection,
            training_cutoff,
            horizon,
        }
    }

    fn horizon_dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        (1..=self.horizon).map(|h| self.training_cutoff + Duration::days(h as i64))
    }

    /// Training window of `series`: from its first observed day up to the cutoff.
    fn training_window(&self, series: &DailySeries) -> Result<NaiveDate, ForecastError> {
        series
            .truncate_after(self.training_cutoff)
            .observed()
            .next()
            .map(|(day, _)| day)
            .ok_or(ForecastError::InsufficientData {
                found: 0,
                required: MIN_TRAINING_OBSERVATIONS,
            })
    }

    fn window_len(&self, start: NaiveDate) -> usize {
        (self.training_cutoff - start).num_days() as usize + 1
    }

    /// Fits the predictor alone and forecasts it over the horizon.
    pub fn forecast_predictor(
        &self,
        predictor: &DailySeries,
    ) -> Result<PredictorForecast, ForecastError> {
        let start = self.training_window(predictor)?;
        let history = predictor.reindex(start, self.window_len(start));
        log::info!(
            "Fitting predictor model on {start}..={} ({} observed days).",
            self.training_cutoff,
            history.iter().filter(|v| v.is_some()).count()
        );
        let fit = self.selection.select(&history, None)?;
        let points = fit
            .forecast(self.horizon, None)?
            .into_iter()
            .zip(self.horizon_dates())
            .map(|(p, date)| ForecastPoint::from_predictive(date, p))
            .collect();
        Ok(PredictorForecast {
            strategy: self.selection.name().to_string(),
            model: fit.summary(),
            training_start: start,
            training_end: self.training_cutoff,
            points,
            history,
        })
    }

    /// Fits `outcome` with the predictor as regressor over the window both series cover,
    /// then forecasts it with the predictor's forecast as the future regressor.
    pub fn forecast_outcome(
        &self,
        predictor: &PredictorForecast,
        outcome: &DailySeries,
    ) -> Result<OutcomeForecast, ForecastError> {
        let start = self.training_window(outcome)?.max(predictor.training_start);
        let len = self.window_len(start);
        let endog = outcome.reindex(start, len);
        let exog = predictor.history_on(start, len);
        log::info!(
            "Fitting outcome model on {start}..={} with the predictor as regressor.",
            self.training_cutoff
        );

        let fit = self.selection.select(&endog, Some(&exog))?;
        let future: Vec<f64> = predictor.points.iter().map(|p| p.point_estimate).collect();
        let points = fit
            .forecast(self.horizon, Some(&future))?
            .into_iter()
            .zip(self.horizon_dates())
            .map(|(p, date)| ForecastPoint::from_predictive(date, p))
            .collect();
        Ok(OutcomeForecast {
            strategy: self.selection.name().to_string(),
            model: fit.summary(),
            training_start: start,
            training_end: self.training_cutoff,
            points,
        })
    }

    /// Both stages for a single outcome.
    pub fn forecast(
        &self,
        predictor: &DailySeries,
        outcome: &DailySeries,
    ) -> Result<(PredictorForecast, OutcomeForecast), ForecastError> {
        let predictor_forecast = self.forecast_predictor(predictor)?;
        let outcome_forecast = self.forecast_outcome(&predictor_forecast, outcome)?;
        Ok((predictor_forecast, outcome_forecast))
    }
}
