//! # Daily Series Construction
//!
//! Every downstream stage consumes values on a contiguous calendar-day axis. Days
//! without data are stored as `None` and stay missing all the way through: no stage
//! is allowed to read a missing day as zero.

use crate::types::{EpiObservation, EpiRecord, SentimentRecord};
use chrono::{Duration, NaiveDate};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySeries {
    start: NaiveDate,
    values: Vec<Option<f64>>,
}

impl DailySeries {
    pub fn new(start: NaiveDate, values: Vec<Option<f64>>) -> Self {
        let values = values
            .into_iter()
            .map(|v| v.filter(|x| x.is_finite()))
            .collect();
        Self { start, values }
    }

    /// Averages all observations falling on the same day and lays the result out on a
    /// gap-free axis from the earliest to the latest observed day.
    pub fn from_daily_means<I>(observations: I) -> Self
    where
        I: IntoIterator<Item = (NaiveDate, f64)>,
    {
        let mut by_day: BTreeMap<NaiveDate, (f64, usize)> = BTreeMap::new();
        for (day, value) in observations {
            if !value.is_finite() {
                continue;
            }
            let slot = by_day.entry(day).or_insert((0.0, 0));
            slot.0 += value;
            slot.1 += 1;
        }
        let (Some(&first), Some(&last)) = (by_day.keys().next(), by_day.keys().next_back())
        else {
            return Self {
                start: NaiveDate::default(),
                values: Vec::new(),
            };
        };
        let len = (last - first).num_days() as usize + 1;
        let mut values = vec![None; len];
        for (day, (sum, count)) in by_day {
            values[(day - first).num_days() as usize] = Some(sum / count as f64);
        }
        Self {
            start: first,
            values,
        }
    }

    /// Daily mean positivity across all sentiment records of each day.
    pub fn from_sentiment(records: &[SentimentRecord]) -> Self {
        Self::from_daily_means(records.iter().map(|r| (r.day, r.mean_positivity)))
    }

    pub fn start(&self) -> Option<NaiveDate> {
        (!self.values.is_empty()).then_some(self.start)
    }

    pub fn end(&self) -> Option<NaiveDate> {
        (!self.values.is_empty()).then(|| self.date_at(self.values.len() - 1))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[Option<f64>] {
        &self.values
    }

    pub fn date_at(&self, index: usize) -> NaiveDate {
        self.start + Duration::days(index as i64)
    }

    pub fn get(&self, day: NaiveDate) -> Option<f64> {
        if self.values.is_empty() || day < self.start {
            return None;
        }
        let idx = (day - self.start).num_days() as usize;
        self.values.get(idx).copied().flatten()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, Option<f64>)> + '_ {
        self.values
            .iter()
            .enumerate()
            .map(|(i, v)| (self.date_at(i), *v))
    }

    pub fn observed(&self) -> impl Iterator<Item = (NaiveDate, f64)> + '_ {
        self.iter().filter_map(|(d, v)| v.map(|x| (d, x)))
    }

    pub fn observed_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }

    /// Drops every day after `cutoff`.
    pub fn truncate_after(&self, cutoff: NaiveDate) -> Self {
        if self.values.is_empty() || cutoff < self.start {
            return Self {
                start: self.start,
                values: Vec::new(),
            };
        }
        let keep = ((cutoff - self.start).num_days() as usize + 1).min(self.values.len());
        Self {
            start: self.start,
            values: self.values[..keep].to_vec(),
        }
    }

    /// Values on the axis `start, start+1, ..., start+len-1`; days outside this series are missing.
    pub fn reindex(&self, start: NaiveDate, len: usize) -> Vec<Option<f64>> {
        (0..len)
            .map(|i| self.get(start + Duration::days(i as i64)))
            .collect()
    }

    pub fn map_observed<F: Fn(f64) -> f64>(&self, f: F) -> Self {
        Self {
            start: self.start,
            values: self.values.iter().map(|v| v.map(&f)).collect(),
        }
    }
}

/// Two series laid on their union date axis.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedPair {
    pub start: NaiveDate,
    pub left: Vec<Option<f64>>,
    pub right: Vec<Option<f64>>,
}

impl AlignedPair {
    pub fn new(left: &DailySeries, right: &DailySeries) -> Option<Self> {
        let start = match (left.start(), right.start()) {
            (Some(a), Some(b)) => a.min(b),
            (Some(a), None) => a,
            (None, Some(b)) => b,
            (None, None) => return None,
        };
        let end = left.end().into_iter().chain(right.end()).max()?;
        let len = (end - start).num_days() as usize + 1;
        Some(Self {
            start,
            left: left.reindex(start, len),
            right: right.reindex(start, len),
        })
    }

    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    /// Days on which both series are observed.
    pub fn complete_cases(&self) -> Vec<(NaiveDate, f64, f64)> {
        self.left
            .iter()
            .zip(&self.right)
            .enumerate()
            .filter_map(|(i, (l, r))| {
                Some((self.start + Duration::days(i as i64), (*l)?, (*r)?))
            })
            .collect()
    }
}

/// Derives daily hospitalizations as the first difference of the cumulative count. The
/// first record of every run of consecutive days has no predecessor, so its difference
/// is missing rather than zero. Duplicate dates keep their first occurrence.
pub fn difference_hospitalizations(observations: &[EpiObservation]) -> Vec<EpiRecord> {
    let mut sorted: Vec<EpiObservation> = observations.to_vec();
    sorted.sort_by_key(|o| o.date);
    let deduped: Vec<EpiObservation> = sorted
        .into_iter()
        .dedup_by(|a, b| {
            let duplicate = a.date == b.date;
            if duplicate {
                log::warn!(
                    "Duplicate epidemiological record for {}; keeping the first.",
                    a.date
                );
            }
            duplicate
        })
        .collect();

    let mut records = Vec::with_capacity(deduped.len());
    let mut previous: Option<&EpiObservation> = None;
    for obs in &deduped {
        let new_hospitalizations = match previous {
            Some(prev) if prev.date + Duration::days(1) == obs.date => {
                match (prev.cumulative_hospitalizations, obs.cumulative_hospitalizations) {
                    (Some(before), Some(now)) => Some(now - before),
                    _ => None,
                }
            }
            _ => None,
        };
        records.push(EpiRecord {
            date: obs.date,
            new_cases: obs.new_cases,
            new_hospitalizations,
        });
        previous = Some(obs);
    }
    records
}

/// Case and hospitalization series on the epidemiological source's own date axis.
#[derive(Debug, Clone, PartialEq)]
pub struct EpiSeries {
    pub cases: DailySeries,
    pub hospitalizations: DailySeries,
}

impl EpiSeries {
    pub fn from_records(records: &[EpiRecord]) -> Self {
        let Some(first) = records.iter().map(|r| r.date).min() else {
            let empty = DailySeries::new(NaiveDate::default(), Vec::new());
            return Self {
                cases: empty.clone(),
                hospitalizations: empty,
            };
        };
        let last = records.iter().map(|r| r.date).max().unwrap_or(first);
        let len = (last - first).num_days() as usize + 1;
        let mut cases = vec![None; len];
        let mut hospitalizations = vec![None; len];
        for r in records {
            let idx = (r.date - first).num_days() as usize;
            cases[idx] = r.new_cases;
            hospitalizations[idx] = r.new_hospitalizations;
        }
        Self {
            cases: DailySeries::new(first, cases),
            hospitalizations: DailySeries::new(first, hospitalizations),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 4, d).unwrap()
    }

    fn cumulative(values: &[(u32, f64)]) -> Vec<EpiObservation> {
        values
            .iter()
            .map(|&(d, c)| EpiObservation {
                date: day(d),
                new_cases: None,
                cumulative_hospitalizations: Some(c),
            })
            .collect()
    }

    #[test]
    fn first_difference_marks_run_start_missing() {
        let records =
            difference_hospitalizations(&cumulative(&[(1, 100.0), (2, 100.0), (3, 120.0), (4, 115.0)]));
        let diffs: Vec<Option<f64>> = records.iter().map(|r| r.new_hospitalizations).collect();
        assert_eq!(diffs, vec![None, Some(0.0), Some(20.0), Some(-5.0)]);
    }

    #[test]
    fn gaps_restart_the_difference_run() {
        let records =
            difference_hospitalizations(&cumulative(&[(1, 10.0), (2, 12.0), (5, 20.0), (6, 21.0)]));
        let diffs: Vec<Option<f64>> = records.iter().map(|r| r.new_hospitalizations).collect();
        assert_eq!(diffs, vec![None, Some(2.0), None, Some(1.0)]);
    }

    #[test]
    fn unsorted_and_duplicate_dates_are_normalised() {
        let records =
            difference_hospitalizations(&cumulative(&[(2, 15.0), (1, 10.0), (2, 99.0)]));
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].new_hospitalizations, Some(5.0));
    }

    #[test]
    fn daily_means_leave_gaps_missing() {
        let series = DailySeries::from_daily_means(vec![
            (day(1), 2.0),
            (day(1), 4.0),
            (day(4), 9.0),
        ]);
        assert_eq!(series.start(), Some(day(1)));
        assert_eq!(series.end(), Some(day(4)));
        assert_eq!(series.values(), &[Some(3.0), None, None, Some(9.0)]);
        assert_eq!(series.get(day(2)), None);
        assert_eq!(series.get(day(30)), None);
        assert_eq!(series.observed_count(), 2);
    }

    #[test]
    fn truncation_and_alignment() {
        let a = DailySeries::new(day(1), vec![Some(1.0), Some(2.0), None, Some(4.0)]);
        let b = DailySeries::new(day(3), vec![Some(30.0), Some(40.0), Some(50.0)]);
        let t = a.truncate_after(day(2));
        assert_eq!(t.values(), &[Some(1.0), Some(2.0)]);

        let pair = AlignedPair::new(&a, &b).unwrap();
        assert_eq!(pair.start, day(1));
        assert_eq!(pair.len(), 5);
        assert_eq!(pair.complete_cases(), vec![(day(4), 4.0, 40.0)]);
    }

    #[test]
    fn epi_series_follow_record_dates() {
        let records = difference_hospitalizations(&cumulative(&[(1, 50.0), (2, 55.0), (3, 54.0)]));
        let epi = EpiSeries::from_records(&records);
        assert_eq!(
            epi.hospitalizations.values(),
            &[None, Some(5.0), Some(-1.0)]
        );
        assert_eq!(epi.cases.observed_count(), 0);
    }
}
