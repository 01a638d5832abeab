//! # Pipeline Orchestrator
//!
//! Sequences one location's run: score documents, build daily series, estimate
//! dependencies, forecast, krige, report. Stages only start once their inputs are
//! complete. The two dependency estimates and the two outcome forecasts are independent
//! of each other and run concurrently.
//!
//! Failure policy: a forecasting failure aborts the location. Dependency and spatial
//! failures are recorded as [`StageOutcome::NotComputed`] and the run continues.

use crate::config::{ConfigError, RunConfig};
use crate::dependence::{DependencyResult, estimate};
use crate::forecast::{ConditionalForecaster, ForecastError, OutcomeForecast, PredictorForecast};
use crate::lexicon::{Lexicon, LexiconError, ScoringSummary, score};
use crate::report::{ReportError, ReportSink};
use crate::series::{DailySeries, EpiSeries, difference_hospitalizations};
use crate::sources::{BoundingBoxSource, DocumentSource, EpiSource, SourceError};
use crate::spatial::{
    Covariate, SpatialField, krige, outcome_observations, sample_grid,
    sentiment_observations,
};
use crate::types::{BoundingBox, Document, EpiObservation, SentimentRecord, StageOutcome};
use rayon::prelude::*;
use std::time::Instant;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Failed to load input data: {0}")]
    Source(#[from] SourceError),
    #[error("The lexicon is required but could not be loaded: {0}")]
    Lexicon(#[from] LexiconError),
    #[error("Forecasting failed for '{location}': {source}")]
    Forecast {
        location: String,
        #[source]
        source: ForecastError,
    },
    #[error("Failed to emit report: {0}")]
    Report(#[from] ReportError),
}

/// The external collaborators a run pulls data from.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub documents: &'a dyn DocumentSource,
    pub epi: &'a dyn EpiSource,
    pub gazetteer: &'a dyn BoundingBoxSource,
}

/// Everything one location's run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationReport {
    pub location: String,
    pub config: RunConfig,
    pub scoring: ScoringSummary,
    pub records: Vec<SentimentRecord>,
    pub positivity: DailySeries,
    pub cases: DailySeries,
    pub hospitalizations: DailySeries,
    pub dependency_cases: StageOutcome<DependencyResult>,
    pub dependency_hospitalizations: StageOutcome<DependencyResult>,
    pub predictor_forecast: PredictorForecast,
    pub cases_forecast: OutcomeForecast,
    pub hospitalizations_forecast: OutcomeForecast,
    pub sentiment_field: StageOutcome<SpatialField>,
    pub outcome_field: StageOutcome<SpatialField>,
}

/// Sentiment records and daily series for one location, before any statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedSeries {
    pub scoring: ScoringSummary,
    pub records: Vec<SentimentRecord>,
    pub positivity: DailySeries,
    pub epi: EpiSeries,
}

pub fn prepare_series(
    config: &RunConfig,
    lexicon: &Lexicon,
    documents: &[Document],
    epi: &[EpiObservation],
) -> PreparedSeries {
    let (records, scoring) = score(documents, lexicon, config.neutral_band);
    let positivity = DailySeries::from_sentiment(&records);
    let epi = EpiSeries::from_records(&difference_hospitalizations(epi));
    PreparedSeries {
        scoring,
        records,
        positivity,
        epi,
    }
}

/// Sentiment surface by ordinary kriging, then the hospitalization surface with the
/// sentiment surface as external drift on the same grid.
pub fn interpolate(
    config: &RunConfig,
    records: &[SentimentRecord],
    hospitalizations: &DailySeries,
    bbox: Result<BoundingBox, SourceError>,
) -> (StageOutcome<SpatialField>, StageOutcome<SpatialField>) {
    let sentiment = bbox
        .map_err(|e| e.to_string())
        .and_then(|bbox| {
            sample_grid(&bbox, config.grid_sample_count, config.seed).map_err(|e| e.to_string())
        })
        .and_then(|grid| {
            krige(&sentiment_observations(records), None, &grid).map_err(|e| e.to_string())
        });
    let sentiment = StageOutcome::from_result("Sentiment field", sentiment);

    let outcome = match sentiment.computed() {
        Some(field) => {
            let (observations, drift) = outcome_observations(records, hospitalizations);
            let covariate = Covariate {
                at_observations: drift,
                at_targets: field.predictions.clone(),
            };
            StageOutcome::from_result(
                "Hospitalization field",
                krige(&observations, Some(&covariate), &field.points),
            )
        }
        None => StageOutcome::NotComputed {
            reason: "the sentiment field it depends on was not computed".to_string(),
        },
    };
    (sentiment, outcome)
}

/// Runs every stage over already-loaded inputs.
pub fn analyse(
    config: &RunConfig,
    lexicon: &Lexicon,
    documents: &[Document],
    epi: &[EpiObservation],
    bbox: Result<BoundingBox, SourceError>,
) -> Result<LocationReport, PipelineError> {
    config.validate()?;
    let location = config.location_name.clone();
    let started = Instant::now();

    let PreparedSeries {
        scoring,
        records,
        positivity,
        epi,
    } = prepare_series(config, lexicon, documents, epi);

    log::info!("[{location}] Estimating dependencies...");
    let dependency = |outcome: &DailySeries, name: &str| {
        StageOutcome::from_result(
            &format!("Dependency of {name} on positivity"),
            estimate(&positivity, outcome, config.max_lag, config.kernel_width),
        )
    };
    let (dependency_cases, dependency_hospitalizations) = rayon::join(
        || dependency(&epi.cases, "cases"),
        || dependency(&epi.hospitalizations, "hospitalizations"),
    );

    log::info!("[{location}] Forecasting...");
    let fatal = |source: ForecastError| PipelineError::Forecast {
        location: location.clone(),
        source,
    };
    let forecaster = ConditionalForecaster::new(
        &config.order_search,
        config.training_cutoff_date,
        config.forecast_horizon,
    );
    let predictor_forecast = forecaster.forecast_predictor(&positivity).map_err(fatal)?;
    let (cases_forecast, hospitalizations_forecast) = rayon::join(
        || forecaster.forecast_outcome(&predictor_forecast, &epi.cases),
        || forecaster.forecast_outcome(&predictor_forecast, &epi.hospitalizations),
    );
    let cases_forecast = cases_forecast.map_err(fatal)?;
    let hospitalizations_forecast = hospitalizations_forecast.map_err(fatal)?;

    log::info!("[{location}] Interpolating...");
    let (sentiment_field, outcome_field) =
        interpolate(config, &records, &epi.hospitalizations, bbox);

    log::info!(
        "[{location}] Run finished in {:.2?}.",
        started.elapsed()
    );
    Ok(LocationReport {
        location,
        config: config.clone(),
        scoring,
        records,
        positivity,
        cases: epi.cases,
        hospitalizations: epi.hospitalizations,
        dependency_cases,
        dependency_hospitalizations,
        predictor_forecast,
        cases_forecast,
        hospitalizations_forecast,
        sentiment_field,
        outcome_field,
    })
}

/// Loads one location's inputs, runs it, and hands the report to `sink`.
pub fn run_location(
    config: &RunConfig,
    lexicon: &Lexicon,
    collaborators: Collaborators<'_>,
    sink: &dyn ReportSink,
) -> Result<LocationReport, PipelineError> {
    config.validate()?;
    let location = config.location_name.as_str();
    let documents = collaborators.documents.documents(location)?;
    let epi = collaborators.epi.observations(location)?;
    let bbox = match config.bounding_box {
        Some(bbox) => Ok(bbox),
        None => collaborators.gazetteer.bounding_box(location),
    };
    let report = analyse(config, lexicon, &documents, &epi, bbox)?;
    sink.emit(&report)?;
    Ok(report)
}

/// Independent locations in parallel. Each location succeeds or fails on its own.
pub fn run_locations(
    configs: &[RunConfig],
    lexicon: &Lexicon,
    collaborators: Collaborators<'_>,
    sink: &dyn ReportSink,
) -> Vec<(String, Result<LocationReport, PipelineError>)> {
    configs
        .par_iter()
        .map(|config| {
            let result = run_location(config, lexicon, collaborators, sink);
            if let Err(e) = &result {
                log::error!("Run for '{}' failed: {e}", config.location_name);
            }
            (config.location_name.clone(), result)
        })
        .collect()
}
