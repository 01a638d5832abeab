// ========================================================================================
//                               External Data Collaborators
// ========================================================================================
//
// The core never fetches data itself. Each collaborator is a trait so a scheduler can
// plug in live feeds; the file-backed implementations here serve the CLI and tests.

use crate::types::{BoundingBox, Document, EpiObservation, parse_date};
use ahash::AHashMap;
use polars::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("I/O error while reading input data: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to read CSV input: {0}")]
    Csv(#[from] csv::Error),
    #[error("Failed to read epidemiological table: {0}")]
    Polars(#[from] PolarsError),
    #[error("Required column '{0}' was not found in '{1}'.")]
    MissingColumn(String, String),
    #[error("No bounding box is known for location '{0}'.")]
    UnknownLocation(String),
}

pub trait DocumentSource: Send + Sync {
    fn documents(&self, location: &str) -> Result<Vec<Document>, SourceError>;
}

pub trait EpiSource: Send + Sync {
    fn observations(&self, location: &str) -> Result<Vec<EpiObservation>, SourceError>;
}

pub trait BoundingBoxSource: Send + Sync {
    fn bounding_box(&self, location: &str) -> Result<BoundingBox, SourceError>;
}

/// Documents from a CSV file with the columns
/// `author_id, document_id, timestamp, text, popularity_count, coordinates`.
/// Rows that fail to decode are skipped with a warning.
pub struct CsvDocumentSource {
    path: PathBuf,
}

impl CsvDocumentSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DocumentSource for CsvDocumentSource {
    fn documents(&self, location: &str) -> Result<Vec<Document>, SourceError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(&self.path)?;
        let mut documents = Vec::new();
        let mut skipped = 0usize;
        for (row, record) in reader.deserialize::<Document>().enumerate() {
            match record {
                Ok(doc) => documents.push(doc),
                Err(e) => {
                    skipped += 1;
                    log::warn!("Skipping document row {}: {e}", row + 1);
                }
            }
        }
        log::info!(
            "Loaded {} documents for '{location}' from '{}' ({skipped} rows skipped).",
            documents.len(),
            self.path.display()
        );
        Ok(documents)
    }
}

/// Daily epidemiological rows from a CSV file with the columns
/// `date, new_cases, cumulative_hospitalizations`. Empty cells are missing values.
pub struct CsvEpiSource {
    path: PathBuf,
}

impl CsvEpiSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

fn numeric_column(df: &DataFrame, name: &str, path: &Path) -> Result<Vec<Option<f64>>, SourceError> {
    if !df.get_column_names().iter().any(|c| c.as_str() == name) {
        return Err(SourceError::MissingColumn(
            name.to_string(),
            path.display().to_string(),
        ));
    }
    let casted = df.column(name)?.cast(&DataType::Float64)?;
    Ok(casted
        .f64()?
        .into_iter()
        .map(|v| v.filter(|x| x.is_finite()))
        .collect())
}

impl EpiSource for CsvEpiSource {
    fn observations(&self, location: &str) -> Result<Vec<EpiObservation>, SourceError> {
        let df = CsvReader::new(File::open(&self.path)?)
            .with_options(CsvReadOptions::default().with_has_header(true))
            .finish()?;

        if !df.get_column_names().iter().any(|c| c.as_str() == "date") {
            return Err(SourceError::MissingColumn(
                "date".to_string(),
                self.path.display().to_string(),
            ));
        }
        let dates = df.column("date")?.cast(&DataType::String)?;
        let new_cases = numeric_column(&df, "new_cases", &self.path)?;
        let cumulative = numeric_column(&df, "cumulative_hospitalizations", &self.path)?;

        let mut observations = Vec::with_capacity(df.height());
        let mut skipped = 0usize;
        for (row, raw) in dates.str()?.into_iter().enumerate() {
            let date = match parse_date(raw.unwrap_or("")) {
                Ok(date) => date,
                Err(e) => {
                    skipped += 1;
                    log::warn!("Skipping epidemiological row {}: {e}", row + 1);
                    continue;
                }
            };
            observations.push(EpiObservation {
                date,
                new_cases: new_cases[row],
                cumulative_hospitalizations: cumulative[row],
            });
        }
        log::info!(
            "Loaded {} epidemiological rows for '{location}' from '{}' ({skipped} rows skipped).",
            observations.len(),
            self.path.display()
        );
        Ok(observations)
    }
}

/// Fixed location → bounding box table. Lookups ignore case and surrounding whitespace.
pub struct StaticGazetteer {
    entries: AHashMap<String, BoundingBox>,
}

fn gazetteer_key(location: &str) -> String {
    location.trim().to_lowercase()
}

impl StaticGazetteer {
    pub fn empty() -> Self {
        Self {
            entries: AHashMap::new(),
        }
    }

    /// Bounding boxes for the largest US metropolitan areas.
    pub fn builtin() -> Self {
        let table = [
            ("New York", -74.2591, 40.4774, -73.7004, 40.9176),
            ("Los Angeles", -118.6682, 33.7037, -118.1553, 34.3373),
            ("Chicago", -87.9401, 41.6445, -87.5241, 42.0230),
            ("Houston", -95.7880, 29.5236, -95.0145, 30.1107),
            ("Phoenix", -112.3241, 33.2903, -111.9259, 33.9208),
            ("Philadelphia", -75.2803, 39.8670, -74.9557, 40.1379),
            ("San Antonio", -98.8053, 29.2241, -98.2220, 29.7398),
            ("San Diego", -117.2822, 32.5348, -116.9082, 33.1141),
            ("Dallas", -96.9990, 32.6180, -96.4637, 33.0237),
            ("Seattle", -122.4596, 47.4810, -122.2244, 47.7341),
        ];
        let mut gazetteer = Self::empty();
        for (name, min_lng, min_lat, max_lng, max_lat) in table {
            gazetteer = gazetteer.with_entry(
                name,
                BoundingBox {
                    min_lng,
                    min_lat,
                    max_lng,
                    max_lat,
                },
            );
        }
        gazetteer
    }

    pub fn with_entry(mut self, location: &str, bbox: BoundingBox) -> Self {
        self.entries.insert(gazetteer_key(location), bbox);
        self
    }
}

impl BoundingBoxSource for StaticGazetteer {
    fn bounding_box(&self, location: &str) -> Result<BoundingBox, SourceError> {
        self.entries
            .get(&gazetteer_key(location))
            .copied()
            .ok_or_else(|| SourceError::UnknownLocation(location.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_temp(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn documents_load_and_bad_rows_are_skipped() {
        let file = write_temp(
            "author_id,document_id,timestamp,text,popularity_count,coordinates\n\
             u1,t1,2020-04-01T10:00:00Z,stay safe everyone,3,\"-73.9,40.7\"\n\
             u2,t2,2020-04-02T11:00:00Z,so tired of this,not-a-number,\n\
             u3,t3,2020-04-02T12:00:00Z,hospital is full,0,\n",
        );
        let docs = CsvDocumentSource::new(file.path())
            .documents("New York")
            .unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].coordinates.as_deref(), Some("-73.9,40.7"));
        assert_eq!(docs[1].document_id, "t3");
        assert_eq!(docs[1].coordinates, None);
    }

    #[test]
    fn epi_rows_keep_missing_cells() {
        let file = write_temp(
            "date,new_cases,cumulative_hospitalizations\n\
             2020-04-01,10,50\n\
             2020-04-02,,55\n\
             2020-04-03,12,\n",
        );
        let rows = CsvEpiSource::new(file.path()).observations("x").unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].date, NaiveDate::from_ymd_opt(2020, 4, 1).unwrap());
        assert_eq!(rows[1].new_cases, None);
        assert_eq!(rows[1].cumulative_hospitalizations, Some(55.0));
        assert_eq!(rows[2].cumulative_hospitalizations, None);
    }

    #[test]
    fn epi_rows_with_unusable_dates_are_skipped() {
        let file = write_temp(
            "date,new_cases,cumulative_hospitalizations\n\
             2020-04-01,10,50\n\
             04/02/2020,11,52\n\
             2020-04-03,12,55\n",
        );
        let rows = CsvEpiSource::new(file.path()).observations("x").unwrap();
        let dates: Vec<NaiveDate> = rows.iter().map(|r| r.date).collect();
        assert_eq!(
            dates,
            vec![
                NaiveDate::from_ymd_opt(2020, 4, 1).unwrap(),
                NaiveDate::from_ymd_opt(2020, 4, 3).unwrap(),
            ]
        );
        assert_eq!(rows[1].cumulative_hospitalizations, Some(55.0));
    }

    #[test]
    fn epi_source_requires_its_columns() {
        let file = write_temp("date,new_cases\n2020-04-01,10\n");
        assert!(matches!(
            CsvEpiSource::new(file.path()).observations("x"),
            Err(SourceError::MissingColumn(..))
        ));
    }

    #[test]
    fn gazetteer_lookup_ignores_case() {
        let gazetteer = StaticGazetteer::builtin();
        let bbox = gazetteer.bounding_box("  new york ").unwrap();
        assert!(bbox.is_valid());
        assert!(matches!(
            gazetteer.bounding_box("Atlantis"),
            Err(SourceError::UnknownLocation(_))
        ));
    }
}
