// ========================================================================================
//                             High-Level Data Contracts
// ========================================================================================

// This file is ONLY for types that are SHARED BETWEEN FILES, not types that only are used in one file.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Record-level parse failures. The offending record is dropped and the run continues.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Malformed coordinates '{raw}': {reason}")]
    Coordinates { raw: String, reason: &'static str },
    #[error("Unrecognised timestamp '{0}'")]
    Timestamp(String),
    #[error("Malformed calendar date '{0}'. Expected YYYY-MM-DD.")]
    Date(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lng: f64,
    pub lat: f64,
}

impl Coordinates {
    /// Bit-exact key, used wherever identical support points must be detected.
    #[inline]
    pub fn key(&self) -> (u64, u64) {
        (self.lng.to_bits(), self.lat.to_bits())
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.5}, {:.5})", self.lng, self.lat)
    }
}

/// Accepts `"lng,lat"`, `"lng lat"` and the bracketed forms `"[lng, lat]"` / `"(lng, lat)"`.
pub fn parse_coordinates(raw: &str) -> Result<Coordinates, ParseError> {
    let malformed = |reason| ParseError::Coordinates {
        raw: raw.to_string(),
        reason,
    };
    let trimmed = raw
        .trim()
        .trim_start_matches(['[', '('])
        .trim_end_matches([']', ')']);
    let parts: Vec<&str> = trimmed
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|p| !p.is_empty())
        .collect();
    if parts.len() != 2 {
        return Err(malformed("expected exactly two numeric components"));
    }
    let lng: f64 = parts[0]
        .parse()
        .map_err(|_| malformed("longitude is not a number"))?;
    let lat: f64 = parts[1]
        .parse()
        .map_err(|_| malformed("latitude is not a number"))?;
    if !(-180.0..=180.0).contains(&lng) {
        return Err(malformed("longitude outside [-180, 180]"));
    }
    if !(-90.0..=90.0).contains(&lat) {
        return Err(malformed("latitude outside [-90, 90]"));
    }
    Ok(Coordinates { lng, lat })
}

/// Resolves a document timestamp to its calendar day. Offsets are honoured, so the day
/// is the one local to the timestamp as written.
pub fn parse_timestamp(raw: &str) -> Result<NaiveDate, ParseError> {
    let s = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.date_naive());
    }
    // Twitter's legacy created_at format.
    if let Ok(dt) = DateTime::parse_from_str(s, "%a %b %d %H:%M:%S %z %Y") {
        return Ok(dt.date_naive());
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(dt.date());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| ParseError::Timestamp(raw.to_string()))
}

pub fn parse_date(raw: &str) -> Result<NaiveDate, ParseError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| ParseError::Date(raw.to_string()))
}

/// A raw social-media post as delivered by the document source. Immutable once ingested;
/// timestamp and coordinates stay in their wire form until the scorer parses them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub author_id: String,
    pub document_id: String,
    pub timestamp: String,
    #[serde(alias = "raw_text")]
    pub text: String,
    #[serde(default)]
    pub popularity_count: u64,
    #[serde(default)]
    pub coordinates: Option<String>,
}

/// Mean positivity of one document's informative tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentRecord {
    pub author_id: String,
    pub document_id: String,
    pub day: NaiveDate,
    pub coordinates: Option<Coordinates>,
    pub mean_positivity: f64,
    pub informative_tokens: usize,
}

/// One row of the epidemiological source. Hospitalizations arrive as a running total.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpiObservation {
    pub date: NaiveDate,
    pub new_cases: Option<f64>,
    pub cumulative_hospitalizations: Option<f64>,
}

/// Daily epidemiological outcomes after differencing the cumulative hospitalization count.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpiRecord {
    pub date: NaiveDate,
    pub new_cases: Option<f64>,
    pub new_hospitalizations: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lng: f64,
    pub min_lat: f64,
    pub max_lng: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn is_valid(&self) -> bool {
        self.min_lng.is_finite()
            && self.min_lat.is_finite()
            && self.max_lng.is_finite()
            && self.max_lat.is_finite()
            && self.min_lng < self.max_lng
            && self.min_lat < self.max_lat
    }

    pub fn contains(&self, point: Coordinates) -> bool {
        point.lng >= self.min_lng
            && point.lng <= self.max_lng
            && point.lat >= self.min_lat
            && point.lat <= self.max_lat
    }
}

/// Marks whether a non-fatal stage produced a result. Stages that could not run carry
/// the reason instead of a placeholder value that could be mistaken for a measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageOutcome<T> {
    Computed(T),
    NotComputed { reason: String },
}

impl<T> StageOutcome<T> {
    pub fn from_result<E: fmt::Display>(stage: &str, result: Result<T, E>) -> Self {
        match result {
            Ok(value) => StageOutcome::Computed(value),
            Err(e) => {
                log::warn!("{stage} could not be computed: {e}");
                StageOutcome::NotComputed {
                    reason: e.to_string(),
                }
            }
        }
    }

    pub fn computed(&self) -> Option<&T> {
        match self {
            StageOutcome::Computed(value) => Some(value),
            StageOutcome::NotComputed { .. } => None,
        }
    }

    pub fn is_computed(&self) -> bool {
        matches!(self, StageOutcome::Computed(_))
    }

    pub fn as_ref(&self) -> StageOutcome<&T> {
        match self {
            StageOutcome::Computed(value) => StageOutcome::Computed(value),
            StageOutcome::NotComputed { reason } => StageOutcome::NotComputed {
                reason: reason.clone(),
            },
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> StageOutcome<U> {
        match self {
            StageOutcome::Computed(value) => StageOutcome::Computed(f(value)),
            StageOutcome::NotComputed { reason } => StageOutcome::NotComputed { reason },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_coordinates_supports_common_layouts() {
        let expected = Coordinates {
            lng: -73.98,
            lat: 40.75,
        };
        assert_eq!(parse_coordinates("-73.98,40.75").unwrap(), expected);
        assert_eq!(parse_coordinates(" -73.98 40.75 ").unwrap(), expected);
        assert_eq!(parse_coordinates("[-73.98, 40.75]").unwrap(), expected);
        assert_eq!(parse_coordinates("(-73.98,40.75)").unwrap(), expected);
    }

    #[test]
    fn parse_coordinates_rejects_malformed_input() {
        assert!(matches!(
            parse_coordinates("40.75"),
            Err(ParseError::Coordinates { .. })
        ));
        assert!(matches!(
            parse_coordinates("east,40.75"),
            Err(ParseError::Coordinates { .. })
        ));
        assert!(matches!(
            parse_coordinates("-200.0,40.75"),
            Err(ParseError::Coordinates { .. })
        ));
    }

    #[test]
    fn parse_timestamp_resolves_calendar_day() {
        let day = NaiveDate::from_ymd_opt(2020, 3, 15).unwrap();
        assert_eq!(parse_timestamp("2020-03-15T23:10:00Z").unwrap(), day);
        assert_eq!(
            parse_timestamp("Sun Mar 15 23:10:00 +0000 2020").unwrap(),
            day
        );
        assert_eq!(parse_timestamp("2020-03-15 08:00:00").unwrap(), day);
        assert_eq!(parse_timestamp("2020-03-15").unwrap(), day);
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn stage_outcome_keeps_failure_reason() {
        let outcome: StageOutcome<f64> =
            StageOutcome::from_result("test stage", Err::<f64, _>("too few points"));
        assert!(!outcome.is_computed());
        assert_eq!(outcome.computed(), None);
        match outcome {
            StageOutcome::NotComputed { reason } => assert_eq!(reason, "too few points"),
            StageOutcome::Computed(_) => panic!("expected NotComputed"),
        }
    }
}
