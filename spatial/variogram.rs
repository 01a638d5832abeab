//! Empirical semivariogram and automatic model fitting.
//!
//! Pairs are binned by great-circle distance up to a third of the support's bounding
//! diagonal. Each candidate model is linear in nugget and partial sill once the range is
//! fixed, so those two come from non-negative weighted least squares (weights
//! `N_pairs / h^2`), and the range is found by golden-section search on its logarithm.

use super::{SpatialError, haversine_km};
use crate::types::Coordinates;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

pub const DEFAULT_BINS: usize = 15;
/// Fewer populated bins than this under the default cutoff widens it to all pairs.
const MIN_POPULATED_BINS: usize = 3;
const GOLDEN_ITERATIONS: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariogramKind {
    Spherical,
    Exponential,
    Gaussian,
}

impl VariogramKind {
    pub const ALL: [VariogramKind; 3] = [
        VariogramKind::Spherical,
        VariogramKind::Exponential,
        VariogramKind::Gaussian,
    ];

    /// Normalised structure function; `range` is the practical range for the
    /// asymptotic models.
    fn shape(self, h: f64, range: f64) -> f64 {
        let r = h / range;
        match self {
            VariogramKind::Spherical => {
                if r >= 1.0 {
                    1.0
                } else {
                    1.5 * r - 0.5 * r.powi(3)
                }
            }
            VariogramKind::Exponential => 1.0 - (-3.0 * r).exp(),
            VariogramKind::Gaussian => 1.0 - (-3.0 * r * r).exp(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VariogramModel {
    pub kind: VariogramKind,
    pub nugget: f64,
    pub partial_sill: f64,
    /// Kilometres.
    pub range: f64,
}

impl VariogramModel {
    pub fn sill(&self) -> f64 {
        self.nugget + self.partial_sill
    }

    /// Semivariance at distance `h` km. Zero at zero distance, so kriging honours the data.
    pub fn gamma(&self, h: f64) -> f64 {
        if h <= 0.0 {
            0.0
        } else {
            self.nugget + self.partial_sill * self.kind.shape(h, self.range)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VariogramBin {
    pub distance: f64,
    pub semivariance: f64,
    pub pairs: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmpiricalVariogram {
    pub bins: Vec<VariogramBin>,
    pub cutoff: f64,
}

#[derive(Clone, Copy, Default)]
struct BinAccumulator {
    distance: f64,
    semivariance: f64,
    pairs: usize,
}

fn bbox_diagonal(points: &[Coordinates]) -> f64 {
    let fold = |f: fn(f64, f64) -> f64, init: f64, get: fn(&Coordinates) -> f64| {
        points.iter().map(get).fold(init, f)
    };
    let min = Coordinates {
        lng: fold(f64::min, f64::INFINITY, |c| c.lng),
        lat: fold(f64::min, f64::INFINITY, |c| c.lat),
    };
    let max = Coordinates {
        lng: fold(f64::max, f64::NEG_INFINITY, |c| c.lng),
        lat: fold(f64::max, f64::NEG_INFINITY, |c| c.lat),
    };
    haversine_km(min, max)
}

fn bin_pairs(points: &[Coordinates], values: &[f64], cutoff: f64, n_bins: usize) -> Vec<VariogramBin> {
    let width = cutoff / n_bins as f64;
    // Per-row partial bins, merged in row order so the result is thread-count independent.
    let rows: Vec<Vec<BinAccumulator>> = (0..points.len())
        .into_par_iter()
        .map(|i| {
            let mut acc = vec![BinAccumulator::default(); n_bins];
            for j in (i + 1)..points.len() {
                let h = haversine_km(points[i], points[j]);
                if h <= 0.0 || h > cutoff {
                    continue;
                }
                let bin = ((h / width) as usize).min(n_bins - 1);
                let diff = values[i] - values[j];
                acc[bin].distance += h;
                acc[bin].semivariance += 0.5 * diff * diff;
                acc[bin].pairs += 1;
            }
            acc
        })
        .collect();

    let mut total = vec![BinAccumulator::default(); n_bins];
    for row in rows {
        for (t, r) in total.iter_mut().zip(row) {
            t.distance += r.distance;
            t.semivariance += r.semivariance;
            t.pairs += r.pairs;
        }
    }
    total
        .into_iter()
        .filter(|b| b.pairs > 0)
        .map(|b| VariogramBin {
            distance: b.distance / b.pairs as f64,
            semivariance: b.semivariance / b.pairs as f64,
            pairs: b.pairs,
        })
        .collect()
}

impl EmpiricalVariogram {
    pub fn compute(points: &[Coordinates], values: &[f64], n_bins: usize) -> Self {
        let n_bins = n_bins.max(1);
        let cutoff = bbox_diagonal(points) / 3.0;
        let bins = bin_pairs(points, values, cutoff, n_bins);
        if bins.len() >= MIN_POPULATED_BINS {
            return Self { bins, cutoff };
        }
        let full = points
            .iter()
            .enumerate()
            .flat_map(|(i, a)| points[i + 1..].iter().map(move |b| haversine_km(*a, *b)))
            .fold(0.0, f64::max);
        log::debug!(
            "Only {} populated lag bins within {cutoff:.3} km; widening the cutoff to {full:.3} km.",
            bins.len()
        );
        Self {
            bins: bin_pairs(points, values, full, n_bins),
            cutoff: full,
        }
    }
}

struct LinearFit {
    nugget: f64,
    partial_sill: f64,
    sse: f64,
}

/// Non-negative weighted least squares of the bin semivariances on `[1, shape]`.
fn fit_linear(bins: &[VariogramBin], kind: VariogramKind, range: f64) -> LinearFit {
    let rows: Vec<(f64, f64, f64)> = bins
        .iter()
        .map(|b| {
            let h = b.distance.max(1e-9);
            (b.pairs as f64 / (h * h), kind.shape(h, range), b.semivariance)
        })
        .collect();
    let (mut sw, mut sf, mut sff, mut sg, mut sfg) = (0.0, 0.0, 0.0, 0.0, 0.0);
    for &(w, f, g) in &rows {
        sw += w;
        sf += w * f;
        sff += w * f * f;
        sg += w * g;
        sfg += w * f * g;
    }

    let only_sill = || if sff > 0.0 { (sfg / sff).max(0.0) } else { 0.0 };
    let det = sw * sff - sf * sf;
    let (mut nugget, mut partial_sill) = if det > 1e-12 * sw * sff {
        let c1 = (sw * sfg - sf * sg) / det;
        ((sg - c1 * sf) / sw, c1)
    } else {
        (0.0, only_sill())
    };
    if nugget < 0.0 {
        nugget = 0.0;
        partial_sill = only_sill();
    }
    if partial_sill < 0.0 {
        partial_sill = 0.0;
        nugget = sg / sw;
    }

    let sse = rows
        .iter()
        .map(|&(w, f, g)| w * (g - nugget - partial_sill * f).powi(2))
        .sum();
    LinearFit {
        nugget,
        partial_sill,
        sse,
    }
}

fn fit_kind(bins: &[VariogramBin], kind: VariogramKind, cutoff: f64) -> (VariogramModel, f64) {
    let phi = (5f64.sqrt() - 1.0) / 2.0;
    let (mut lo, mut hi) = ((cutoff / 50.0).ln(), (cutoff * 3.0).ln());
    let sse_at = |log_range: f64| fit_linear(bins, kind, log_range.exp()).sse;
    let mut x1 = hi - phi * (hi - lo);
    let mut x2 = lo + phi * (hi - lo);
    let (mut f1, mut f2) = (sse_at(x1), sse_at(x2));
    for _ in 0..GOLDEN_ITERATIONS {
        if f1 <= f2 {
            hi = x2;
            x2 = x1;
            f2 = f1;
            x1 = hi - phi * (hi - lo);
            f1 = sse_at(x1);
        } else {
            lo = x1;
            x1 = x2;
            f1 = f2;
            x2 = lo + phi * (hi - lo);
            f2 = sse_at(x2);
        }
    }
    let range = ((lo + hi) / 2.0).exp();
    let fit = fit_linear(bins, kind, range);
    (
        VariogramModel {
            kind,
            nugget: fit.nugget,
            partial_sill: fit.partial_sill,
            range,
        },
        fit.sse,
    )
}

/// Fits every model kind and keeps the one with the smallest weighted error; earlier
/// kinds in [`VariogramKind::ALL`] win ties.
pub fn fit_variogram(empirical: &EmpiricalVariogram) -> Result<VariogramModel, SpatialError> {
    if empirical.bins.is_empty() || empirical.cutoff.is_nan() || empirical.cutoff <= 0.0 {
        return Err(SpatialError::VariogramFit(
            "no point pairs at positive distance".to_string(),
        ));
    }
    let mut best: Option<(VariogramModel, f64)> = None;
    for kind in VariogramKind::ALL {
        let (model, sse) = fit_kind(&empirical.bins, kind, empirical.cutoff);
        log::debug!(
            "{kind:?} variogram: nugget {:.5}, partial sill {:.5}, range {:.3} km, wSSE {sse:.6}",
            model.nugget,
            model.partial_sill,
            model.range
        );
        if !sse.is_finite() || !model.sill().is_finite() {
            continue;
        }
        if best.as_ref().is_none_or(|(_, b)| sse < *b) {
            best = Some((model, sse));
        }
    }
    match best {
        Some((model, _)) if model.sill() > 0.0 => Ok(model),
        Some(_) => Err(SpatialError::VariogramFit(
            "observations show no spatial variance".to_string(),
        )),
        None => Err(SpatialError::VariogramFit(
            "no candidate model produced a finite fit".to_string(),
        )),
    }
}
