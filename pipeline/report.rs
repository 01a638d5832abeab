// ========================================================================================
//                                      Report Sinks
// ========================================================================================

use crate::config::RunConfig;
use crate::dependence::DependencyResult;
use crate::forecast::{ForecastPoint, ModelSummary};
use crate::lexicon::ScoringSummary;
use crate::orchestrator::LocationReport;
use crate::spatial::{SpatialField, VariogramModel};
use crate::types::StageOutcome;
use chrono::{Duration, NaiveDate};
use serde::Serialize;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("I/O error while writing the report: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to write CSV table: {0}")]
    Csv(#[from] csv::Error),
    #[error("Failed to serialize report summary to TOML: {0}")]
    Toml(#[from] toml::ser::Error),
}

/// Receives finished runs. Presentation is entirely the sink's business.
pub trait ReportSink: Send + Sync {
    fn emit(&self, report: &LocationReport) -> Result<(), ReportError>;
}

/// Writes one subdirectory per location:
///
/// - `summary.toml`: configuration, scoring counts, dependency results, fitted models
///   and spatial field summaries
/// - `series.csv`: daily positivity, cases and hospitalizations
/// - `forecasts.csv`: every forecast point with both intervals
/// - `sentiment_field.csv` / `outcome_field.csv`: grid predictions, when computed
pub struct DirectoryReportSink {
    root: PathBuf,
}

impl DirectoryReportSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn location_dir(&self, location: &str) -> PathBuf {
        let slug: String = location
            .trim()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_lowercase()
                } else {
                    '_'
                }
            })
            .collect();
        self.root.join(slug)
    }
}

#[derive(Serialize)]
struct FieldSummary {
    grid_points: usize,
    support_points: usize,
    external_drift: bool,
    variogram: VariogramModel,
    mean_prediction: f64,
    mean_variance: f64,
}

impl From<&SpatialField> for FieldSummary {
    fn from(field: &SpatialField) -> Self {
        let mean = |v: &[f64]| v.iter().sum::<f64>() / v.len().max(1) as f64;
        Self {
            grid_points: field.points.len(),
            support_points: field.support,
            external_drift: field.external_drift,
            variogram: field.variogram,
            mean_prediction: mean(&field.predictions),
            mean_variance: mean(&field.variances),
        }
    }
}

#[derive(Serialize)]
struct ForecastModels<'a> {
    strategy: &'a str,
    positivity: &'a ModelSummary,
    cases: &'a ModelSummary,
    hospitalizations: &'a ModelSummary,
}

#[derive(Serialize)]
struct Summary<'a> {
    location: &'a str,
    config: &'a RunConfig,
    scoring: &'a ScoringSummary,
    dependency_cases: StageOutcome<&'a DependencyResult>,
    dependency_hospitalizations: StageOutcome<&'a DependencyResult>,
    models: ForecastModels<'a>,
    sentiment_field: StageOutcome<FieldSummary>,
    outcome_field: StageOutcome<FieldSummary>,
}

#[derive(Serialize)]
struct SeriesRow {
    date: NaiveDate,
    positivity: Option<f64>,
    new_cases: Option<f64>,
    new_hospitalizations: Option<f64>,
}

#[derive(Serialize)]
struct ForecastRow<'a> {
    series: &'a str,
    date: NaiveDate,
    point_estimate: f64,
    lower_80: f64,
    upper_80: f64,
    lower_95: f64,
    upper_95: f64,
}

impl<'a> ForecastRow<'a> {
    fn new(series: &'a str, point: &ForecastPoint) -> Self {
        Self {
            series,
            date: point.date,
            point_estimate: point.point_estimate,
            lower_80: point.lower_80,
            upper_80: point.upper_80,
            lower_95: point.lower_95,
            upper_95: point.upper_95,
        }
    }
}

#[derive(Serialize)]
struct FieldRow {
    lng: f64,
    lat: f64,
    prediction: f64,
    variance: f64,
}

fn series_rows(report: &LocationReport) -> Vec<SeriesRow> {
    let all = [&report.positivity, &report.cases, &report.hospitalizations];
    let (Some(start), Some(end)) = (
        all.iter().filter_map(|s| s.start()).min(),
        all.iter().filter_map(|s| s.end()).max(),
    ) else {
        return Vec::new();
    };
    let days = (end - start).num_days();
    (0..=days)
        .map(|offset| {
            let date = start + Duration::days(offset);
            SeriesRow {
                date,
                positivity: report.positivity.get(date),
                new_cases: report.cases.get(date),
                new_hospitalizations: report.hospitalizations.get(date),
            }
        })
        .collect()
}

fn write_field(path: &Path, field: &SpatialField) -> Result<(), ReportError> {
    let mut writer = csv::Writer::from_path(path)?;
    for ((p, prediction), variance) in field
        .points
        .iter()
        .zip(&field.predictions)
        .zip(&field.variances)
    {
        writer.serialize(FieldRow {
            lng: p.lng,
            lat: p.lat,
            prediction: *prediction,
            variance: *variance,
        })?;
    }
    writer.flush()?;
    Ok(())
}

impl ReportSink for DirectoryReportSink {
    fn emit(&self, report: &LocationReport) -> Result<(), ReportError> {
        let dir = self.location_dir(&report.location);
        fs::create_dir_all(&dir)?;

        let summary = Summary {
            location: &report.location,
            config: &report.config,
            scoring: &report.scoring,
            dependency_cases: report.dependency_cases.as_ref(),
            dependency_hospitalizations: report.dependency_hospitalizations.as_ref(),
            models: ForecastModels {
                strategy: &report.predictor_forecast.strategy,
                positivity: &report.predictor_forecast.model,
                cases: &report.cases_forecast.model,
                hospitalizations: &report.hospitalizations_forecast.model,
            },
            sentiment_field: report.sentiment_field.as_ref().map(FieldSummary::from),
            outcome_field: report.outcome_field.as_ref().map(FieldSummary::from),
        };
        let toml_string = toml::to_string_pretty(&summary)?;
        let mut file = BufWriter::new(fs::File::create(dir.join("summary.toml"))?);
        file.write_all(toml_string.as_bytes())?;
        file.flush()?;

        let mut writer = csv::Writer::from_path(dir.join("series.csv"))?;
        for row in series_rows(report) {
            writer.serialize(row)?;
        }
        writer.flush()?;

        let mut writer = csv::Writer::from_path(dir.join("forecasts.csv"))?;
        let forecasts = [
            ("positivity", &report.predictor_forecast.points),
            ("new_cases", &report.cases_forecast.points),
            ("new_hospitalizations", &report.hospitalizations_forecast.points),
        ];
        for (series, points) in forecasts {
            for point in points {
                writer.serialize(ForecastRow::new(series, point))?;
            }
        }
        writer.flush()?;

        for (name, field) in [
            ("sentiment_field.csv", &report.sentiment_field),
            ("outcome_field.csv", &report.outcome_field),
        ] {
            if let Some(field) = field.computed() {
                write_field(&dir.join(name), field)?;
            }
        }
        log::info!(
            "Wrote report for '{}' to '{}'.",
            report.location,
            dir.display()
        );
        Ok(())
    }
}
