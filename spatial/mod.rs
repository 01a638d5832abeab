//! # Spatial Interpolator
//!
//! Kriges point observations onto a random grid inside the location's bounding box.
//! Sentiment is interpolated with ordinary kriging; the outcome surface is then kriged
//! with the interpolated sentiment as an external drift, so it can only be computed once
//! the sentiment field exists.

pub mod grid;
pub mod kriging;
pub mod variogram;

use crate::series::DailySeries;
use crate::types::{Coordinates, SentimentRecord};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use grid::sample_grid;
pub use kriging::{Covariate, krige};
pub use variogram::{EmpiricalVariogram, VariogramKind, VariogramModel};

/// Mean Earth radius (IUGG), kilometres.
const EARTH_RADIUS_KM: f64 = 6_371.008_8;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpatialError {
    #[error(
        "Kriging needs at least 3 non-collinear support points after deduplication; found {found} usable points."
    )]
    InsufficientSupport { found: usize },
    #[error("Variogram fit failed: {0}")]
    VariogramFit(String),
    #[error("Covariate has {found} values where {expected} were expected ({which}).")]
    CovariateMismatch {
        which: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("Bounding box is degenerate or not finite: {0:?}")]
    InvalidBoundingBox(crate::types::BoundingBox),
    #[error("The target grid is empty.")]
    EmptyGrid,
    #[error("Kriging system could not be solved: {0}")]
    Linalg(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub location: Coordinates,
    pub value: f64,
}

/// Predictions and kriging variances on a set of target points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialField {
    pub points: Vec<Coordinates>,
    pub predictions: Vec<f64>,
    pub variances: Vec<f64>,
    pub variogram: VariogramModel,
    /// Support points left after deduplication.
    pub support: usize,
    pub external_drift: bool,
}

pub fn haversine_km(a: Coordinates, b: Coordinates) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlat = lat2 - lat1;
    let dlng = (b.lng - a.lng).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// One observation per geotagged sentiment record.
pub fn sentiment_observations(records: &[SentimentRecord]) -> Vec<Observation> {
    records
        .iter()
        .filter_map(|r| {
            Some(Observation {
                location: r.coordinates?,
                value: r.mean_positivity,
            })
        })
        .collect()
}

/// Outcome observations for the drift model: each geotagged record carries the outcome
/// value of its day, with the record's own positivity as the drift covariate. Records on
/// days without an outcome value are skipped.
pub fn outcome_observations(
    records: &[SentimentRecord],
    outcome: &DailySeries,
) -> (Vec<Observation>, Vec<f64>) {
    records
        .iter()
        .filter_map(|r| {
            let location = r.coordinates?;
            let value = outcome.get(r.day)?;
            Some((Observation { location, value }, r.mean_positivity))
        })
        .unzip()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use chrono::NaiveDate;

    fn record(day: u32, coords: Option<(f64, f64)>, positivity: f64) -> SentimentRecord {
        SentimentRecord {
            author_id: "a".into(),
            document_id: format!("d{day}"),
            day: NaiveDate::from_ymd_opt(2020, 4, day).unwrap(),
            coordinates: coords.map(|(lng, lat)| Coordinates { lng, lat }),
            mean_positivity: positivity,
            informative_tokens: 1,
        }
    }

    #[test]
    fn one_degree_of_latitude() {
        let a = Coordinates { lng: 0.0, lat: 0.0 };
        let b = Coordinates { lng: 0.0, lat: 1.0 };
        assert_abs_diff_eq!(haversine_km(a, b), 111.195, epsilon = 0.01);
        assert_eq!(haversine_km(a, a), 0.0);
    }

    #[test]
    fn outcome_observations_pair_value_with_positivity() {
        let records = vec![
            record(1, Some((1.0, 2.0)), 7.0),
            record(2, None, 8.0),
            record(3, Some((3.0, 4.0)), 2.0),
            record(9, Some((5.0, 6.0)), 1.0),
        ];
        let outcome = DailySeries::new(
            NaiveDate::from_ymd_opt(2020, 4, 1).unwrap(),
            vec![Some(10.0), Some(11.0), Some(12.0)],
        );
        let (obs, covariate) = outcome_observations(&records, &outcome);
        assert_eq!(obs.len(), 2);
        assert_eq!(obs[1].value, 12.0);
        assert_eq!(covariate, vec![7.0, 2.0]);
        assert_eq!(sentiment_observations(&records).len(), 3);
    }
}
