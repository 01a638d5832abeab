use super::EstimatorError;
use super::kernel::{KernelSettings, mutual_information, transfer_entropy};
use super::normalize::MinMax;
use crate::series::{AlignedPair, DailySeries};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Relationship statistics between a predictor and one outcome, computed once per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyResult {
    /// `None` when fewer than two complete days exist or either side has no variance.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pearson_correlation: Option<f64>,
    pub complete_cases: usize,
    /// Always at least 1.
    pub optimal_lag: usize,
    pub mutual_information: f64,
    pub transfer_entropy: f64,
    /// Mutual information indexed by lag, from lag 0 up to the last lag with enough
    /// paired days (at most `max_lag`).
    pub mutual_information_by_lag: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LagSearch {
    pub lag: usize,
    pub mutual_information: f64,
    pub profile: Vec<f64>,
}

pub fn pearson_correlation(pairs: &[(f64, f64)]) -> Option<f64> {
    if pairs.len() < 2 {
        return None;
    }
    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for &(x, y) in pairs {
        let dx = x - mean_x;
        let dy = y - mean_y;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx <= 0.0 || syy <= 0.0 {
        return None;
    }
    Some((sxy / (sxx.sqrt() * syy.sqrt())).clamp(-1.0, 1.0))
}

/// Scans lags `1..=max_lag` for the largest mutual information. The running best starts
/// at lag 0 with zero information, so a positive lag is selected only when it carries
/// some. When none does, the search settles on lag 1, because downstream transfer
/// entropy is undefined at lag 0.
///
/// Long lags leave fewer paired days. The profile stops at the first lag that cannot be
/// evaluated; only lags 0 and 1 are required.
pub fn search_optimal_lag(
    source: &[Option<f64>],
    dest: &[Option<f64>],
    max_lag: usize,
    settings: &KernelSettings,
) -> Result<LagSearch, EstimatorError> {
    let last_lag = max_lag.max(1);
    let evaluated: Vec<Result<f64, EstimatorError>> = (0..=last_lag)
        .into_par_iter()
        .map(|lag| mutual_information(source, dest, lag, settings))
        .collect();

    let mut profile = Vec::with_capacity(evaluated.len());
    for (lag, result) in evaluated.into_iter().enumerate() {
        match result {
            Ok(mi) => profile.push(mi),
            Err(e) if lag > 1 => {
                log::warn!("Lag search stops at lag {}: lag {lag} cannot be evaluated ({e}).", lag - 1);
                break;
            }
            Err(e) => return Err(e),
        }
    }

    let mut best_lag = 0;
    let mut best_mi = 0.0;
    for (lag, &mi) in profile.iter().enumerate().take(max_lag + 1).skip(1) {
        log::debug!("lag {lag}: mutual information {mi:.5} bits");
        if mi > best_mi {
            best_lag = lag;
            best_mi = mi;
        }
    }
    if best_lag == 0 {
        log::info!("No positive lag carried mutual information; using lag 1.");
        best_lag = 1;
        best_mi = profile[1];
    }
    Ok(LagSearch {
        lag: best_lag,
        mutual_information: best_mi,
        profile,
    })
}

/// Runs the full dependency analysis of `outcome` on `predictor`.
///
/// Both series are min-max scaled with their own constants, laid on their union date
/// axis, and correlated over complete cases only. The lag search and transfer entropy
/// see the same scaled, gap-preserving series.
pub fn estimate(
    predictor: &DailySeries,
    outcome: &DailySeries,
    max_lag: usize,
    kernel_width: f64,
) -> Result<DependencyResult, EstimatorError> {
    let scale = |s: &DailySeries| match MinMax::fit(s.values()) {
        Some(mm) => mm.apply(s),
        None => s.clone(),
    };
    let predictor = scale(predictor);
    let outcome = scale(outcome);

    let Some(aligned) = AlignedPair::new(&predictor, &outcome) else {
        return Err(EstimatorError::TooFewObservations {
            required: 2,
            found: 0,
        });
    };
    let complete: Vec<(f64, f64)> = aligned
        .complete_cases()
        .into_iter()
        .map(|(_, x, y)| (x, y))
        .collect();
    let pearson = pearson_correlation(&complete);
    log::info!(
        "Dependency estimation over {} aligned days ({} complete); Pearson r = {}",
        aligned.len(),
        complete.len(),
        pearson.map_or_else(|| "undefined".to_string(), |r| format!("{r:.4}"))
    );

    let settings = KernelSettings::new(kernel_width);
    let search = search_optimal_lag(&aligned.left, &aligned.right, max_lag, &settings)?;
    let te = transfer_entropy(&aligned.left, &aligned.right, search.lag, &settings)?;
    log::info!(
        "Selected lag {} (MI {:.5} bits); transfer entropy {:.5} bits.",
        search.lag,
        search.mutual_information,
        te
    );

    Ok(DependencyResult {
        pearson_correlation: pearson,
        complete_cases: complete.len(),
        optimal_lag: search.lag,
        mutual_information: search.mutual_information,
        transfer_entropy: te,
        mutual_information_by_lag: search.profile,
    })
}
