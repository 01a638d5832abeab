//! Ordinary kriging and kriging with an external drift.
//!
//! The kriging matrix depends only on the support points, so it is factorised once and
//! each target point costs a single triangular solve. Targets are solved in parallel;
//! each solve is independent, so the field does not depend on the thread count.

use super::variogram::{DEFAULT_BINS, EmpiricalVariogram, VariogramModel, fit_variogram};
use super::{Observation, SpatialError, SpatialField, haversine_km};
use crate::types::Coordinates;
use ahash::AHashSet;
use ndarray::{Array1, Array2};
use ndarray_linalg::{FactorizeInto, LeastSquaresSvd, Solve};
use rayon::prelude::*;

/// External drift values at the support points and at the targets.
#[derive(Debug, Clone, PartialEq)]
pub struct Covariate {
    pub at_observations: Vec<f64>,
    pub at_targets: Vec<f64>,
}

struct Support {
    points: Vec<Coordinates>,
    values: Vec<f64>,
    drift: Option<Vec<f64>>,
}

/// Keeps the first observation at each coordinate and drops non-finite values.
fn deduplicate(observations: &[Observation], drift: Option<&[f64]>) -> Support {
    let mut seen = AHashSet::with_capacity(observations.len());
    let mut support = Support {
        points: Vec::with_capacity(observations.len()),
        values: Vec::with_capacity(observations.len()),
        drift: drift.map(|_| Vec::with_capacity(observations.len())),
    };
    for (i, obs) in observations.iter().enumerate() {
        let f = drift.map(|d| d[i]);
        if !obs.value.is_finite() || f.is_some_and(|f| !f.is_finite()) {
            continue;
        }
        if !seen.insert(obs.location.key()) {
            log::debug!("Dropping duplicate support point at {}.", obs.location);
            continue;
        }
        support.points.push(obs.location);
        support.values.push(obs.value);
        if let (Some(out), Some(f)) = (support.drift.as_mut(), f) {
            out.push(f);
        }
    }
    support
}

/// True when every point lies on one line in the lng/lat plane.
fn is_collinear(points: &[Coordinates]) -> bool {
    let Some(&p0) = points.first() else {
        return true;
    };
    let offset = |p: &Coordinates| (p.lng - p0.lng, p.lat - p0.lat);
    let (dx, dy) = points
        .iter()
        .map(offset)
        .max_by(|a, b| (a.0.hypot(a.1)).total_cmp(&b.0.hypot(b.1)))
        .unwrap_or((0.0, 0.0));
    let scale = dx * dx + dy * dy;
    if scale == 0.0 {
        return true;
    }
    points.iter().map(offset).all(|(x, y)| (dx * y - dy * x).abs() <= 1e-10 * scale)
}

fn check_lengths(
    observations: &[Observation],
    covariate: Option<&Covariate>,
    targets: &[Coordinates],
) -> Result<(), SpatialError> {
    if targets.is_empty() {
        return Err(SpatialError::EmptyGrid);
    }
    if let Some(c) = covariate {
        if c.at_observations.len() != observations.len() {
            return Err(SpatialError::CovariateMismatch {
                which: "support points",
                expected: observations.len(),
                found: c.at_observations.len(),
            });
        }
        if c.at_targets.len() != targets.len() {
            return Err(SpatialError::CovariateMismatch {
                which: "target grid",
                expected: targets.len(),
                found: c.at_targets.len(),
            });
        }
    }
    Ok(())
}

fn prepare_support(
    observations: &[Observation],
    covariate: Option<&Covariate>,
) -> Result<Support, SpatialError> {
    let support = deduplicate(observations, covariate.map(|c| c.at_observations.as_slice()));
    let n = support.points.len();
    if n < 3 || is_collinear(&support.points) {
        return Err(SpatialError::InsufficientSupport { found: n });
    }
    Ok(support)
}

/// Residuals of the support values after the linear drift `a + b * f`.
fn drift_residuals(values: &[f64], drift: &[f64]) -> Result<Vec<f64>, SpatialError> {
    let n = values.len();
    let mut design = Array2::<f64>::ones((n, 2));
    for (i, &f) in drift.iter().enumerate() {
        design[[i, 1]] = f;
    }
    let target = Array1::from(values.to_vec());
    let coef = design
        .least_squares(&target)
        .map_err(|e| SpatialError::Linalg(e.to_string()))?
        .solution;
    Ok(values
        .iter()
        .zip(drift)
        .map(|(v, f)| v - coef[0] - coef[1] * f)
        .collect())
}

/// Interpolates `observations` at `targets`, fitting the variogram automatically. With
/// a covariate the variogram is fit to the drift residuals and the drift enters the
/// kriging system as an extra unbiasedness constraint.
pub fn krige(
    observations: &[Observation],
    covariate: Option<&Covariate>,
    targets: &[Coordinates],
) -> Result<SpatialField, SpatialError> {
    check_lengths(observations, covariate, targets)?;
    let support = prepare_support(observations, covariate)?;
    let residuals = match &support.drift {
        Some(drift) => drift_residuals(&support.values, drift)?,
        None => support.values.clone(),
    };
    let empirical = EmpiricalVariogram::compute(&support.points, &residuals, DEFAULT_BINS);
    let model = fit_variogram(&empirical)?;
    log::info!(
        "Fitted {:?} variogram on {} support points: nugget {:.5}, partial sill {:.5}, range {:.3} km.",
        model.kind,
        support.points.len(),
        model.nugget,
        model.partial_sill,
        model.range
    );
    solve_field(&support, covariate, targets, model)
}

/// Kriging with a fixed variogram model.
pub fn krige_with_model(
    observations: &[Observation],
    covariate: Option<&Covariate>,
    targets: &[Coordinates],
    model: VariogramModel,
) -> Result<SpatialField, SpatialError> {
    check_lengths(observations, covariate, targets)?;
    let support = prepare_support(observations, covariate)?;
    solve_field(&support, covariate, targets, model)
}

fn solve_field(
    support: &Support,
    covariate: Option<&Covariate>,
    targets: &[Coordinates],
    model: VariogramModel,
) -> Result<SpatialField, SpatialError> {
    let n = support.points.len();
    let size = n + 1 + support.drift.is_some() as usize;

    let mut system = Array2::<f64>::zeros((size, size));
    for i in 0..n {
        for j in (i + 1)..n {
            let g = model.gamma(haversine_km(support.points[i], support.points[j]));
            system[[i, j]] = g;
            system[[j, i]] = g;
        }
        system[[i, n]] = 1.0;
        system[[n, i]] = 1.0;
        if let Some(drift) = &support.drift {
            system[[i, n + 1]] = drift[i];
            system[[n + 1, i]] = drift[i];
        }
    }
    let lu = system
        .factorize_into()
        .map_err(|e| SpatialError::Linalg(e.to_string()))?;

    let solved: Vec<Result<(f64, f64), SpatialError>> = targets
        .par_iter()
        .enumerate()
        .map(|(k, target)| {
            let mut rhs = Array1::<f64>::zeros(size);
            for (i, p) in support.points.iter().enumerate() {
                rhs[i] = model.gamma(haversine_km(*p, *target));
            }
            rhs[n] = 1.0;
            if let Some(c) = covariate.filter(|_| support.drift.is_some()) {
                rhs[n + 1] = c.at_targets[k];
            }
            let weights = lu
                .solve(&rhs)
                .map_err(|e| SpatialError::Linalg(e.to_string()))?;
            let prediction: f64 = weights
                .iter()
                .zip(&support.values)
                .map(|(w, z)| w * z)
                .sum();
            let variance = weights.dot(&rhs).max(0.0);
            Ok((prediction, variance))
        })
        .collect();
    let (predictions, variances): (Vec<f64>, Vec<f64>) =
        solved.into_iter().collect::<Result<Vec<_>, _>>()?.into_iter().unzip();

    Ok(SpatialField {
        points: targets.to_vec(),
        predictions,
        variances,
        variogram: model,
        support: n,
        external_drift: support.drift.is_some(),
    })
}
