//! Box-kernel estimators of mutual information and transfer entropy.
//!
//! Probabilities are neighbourhood counts under the maximum norm: two samples are
//! neighbours when every coordinate differs by at most the kernel width. Each sample
//! counts as its own neighbour, so every log ratio is finite. Results are in bits.
//!
//! Inputs are day-aligned slices with explicit gaps. A sample is formed only when every
//! coordinate it needs is observed; missing days never contribute.

use super::EstimatorError;
use rayon::prelude::*;

/// Minimum number of joint samples for either estimator.
const MIN_SAMPLES: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KernelSettings {
    pub width: f64,
    /// Standardise each series to zero mean and unit variance before estimation, which
    /// makes `width` a multiple of each series' standard deviation.
    pub normalise: bool,
}

impl KernelSettings {
    pub fn new(width: f64) -> Self {
        Self {
            width,
            normalise: true,
        }
    }

    fn validate(&self) -> Result<(), EstimatorError> {
        if self.width.is_finite() && self.width > 0.0 {
            Ok(())
        } else {
            Err(EstimatorError::InvalidKernelWidth(self.width))
        }
    }
}

fn check_lengths(source: &[Option<f64>], dest: &[Option<f64>]) -> Result<(), EstimatorError> {
    if source.len() != dest.len() {
        return Err(EstimatorError::LengthMismatch {
            source_len: source.len(),
            dest_len: dest.len(),
        });
    }
    Ok(())
}

fn standardise(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let observed: Vec<f64> = values.iter().flatten().copied().collect();
    if observed.is_empty() {
        return values.to_vec();
    }
    let n = observed.len() as f64;
    let mean = observed.iter().sum::<f64>() / n;
    let var = observed.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let sd = if var > 0.0 { var.sqrt() } else { 1.0 };
    values.iter().map(|v| v.map(|x| (x - mean) / sd)).collect()
}

fn prepare(values: &[Option<f64>], settings: &KernelSettings) -> Vec<Option<f64>> {
    if settings.normalise {
        standardise(values)
    } else {
        values.to_vec()
    }
}

/// Mean over samples of `log2` of a per-sample ratio. Summation happens sequentially
/// after the parallel map so the result does not depend on the thread count.
fn mean_log2<F>(n: usize, per_sample: F) -> f64
where
    F: Fn(usize) -> f64 + Sync + Send,
{
    let terms: Vec<f64> = (0..n).into_par_iter().map(per_sample).collect();
    terms.iter().sum::<f64>() / n as f64
}

/// Mutual information between `source[t - lag]` and `dest[t]`.
pub fn mutual_information(
    source: &[Option<f64>],
    dest: &[Option<f64>],
    lag: usize,
    settings: &KernelSettings,
) -> Result<f64, EstimatorError> {
    settings.validate()?;
    check_lengths(source, dest)?;
    let source = prepare(source, settings);
    let dest = prepare(dest, settings);

    let pairs: Vec<(f64, f64)> = (lag..dest.len())
        .filter_map(|t| Some((source[t - lag]?, dest[t]?)))
        .collect();
    mutual_information_of_pairs(&pairs, settings.width)
}

pub(crate) fn mutual_information_of_pairs(
    pairs: &[(f64, f64)],
    width: f64,
) -> Result<f64, EstimatorError> {
    let n = pairs.len();
    if n < MIN_SAMPLES {
        return Err(EstimatorError::TooFewObservations {
            required: MIN_SAMPLES,
            found: n,
        });
    }
    let mi = mean_log2(n, |i| {
        let (xi, yi) = pairs[i];
        let (mut cx, mut cy, mut cxy) = (0usize, 0usize, 0usize);
        for &(xj, yj) in pairs {
            let near_x = (xj - xi).abs() <= width;
            let near_y = (yj - yi).abs() <= width;
            cx += near_x as usize;
            cy += near_y as usize;
            cxy += (near_x && near_y) as usize;
        }
        (n as f64 * cxy as f64 / (cx as f64 * cy as f64)).log2()
    });
    Ok(mi)
}

/// Transfer entropy from `source` to `dest` with destination history length 1, where
/// the source leads by `lag` days: each sample is
/// `(dest[t + 1], dest[t], source[t + 1 - lag])`.
pub fn transfer_entropy(
    source: &[Option<f64>],
    dest: &[Option<f64>],
    lag: usize,
    settings: &KernelSettings,
) -> Result<f64, EstimatorError> {
    if lag == 0 {
        return Err(EstimatorError::ZeroLag);
    }
    settings.validate()?;
    check_lengths(source, dest)?;
    let source = prepare(source, settings);
    let dest = prepare(dest, settings);

    let samples: Vec<[f64; 3]> = (lag - 1..dest.len().saturating_sub(1))
        .filter_map(|t| Some([dest[t + 1]?, dest[t]?, source[t + 1 - lag]?]))
        .collect();
    let n = samples.len();
    if n < MIN_SAMPLES {
        return Err(EstimatorError::TooFewObservations {
            required: MIN_SAMPLES,
            found: n,
        });
    }

    let width = settings.width;
    let te = mean_log2(n, |i| {
        let [next_i, past_i, src_i] = samples[i];
        let (mut c_past, mut c_past_src, mut c_next_past, mut c_all) =
            (0usize, 0usize, 0usize, 0usize);
        for &[next_j, past_j, src_j] in &samples {
            if (past_j - past_i).abs() > width {
                continue;
            }
            c_past += 1;
            let near_next = (next_j - next_i).abs() <= width;
            let near_src = (src_j - src_i).abs() <= width;
            c_past_src += near_src as usize;
            c_next_past += near_next as usize;
            c_all += (near_next && near_src) as usize;
        }
        (c_all as f64 * c_past as f64 / (c_past_src as f64 * c_next_past as f64)).log2()
    });
    Ok(te)
}
