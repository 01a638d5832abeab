//! # Regression with ARIMA Errors
//!
//! The endogenous series `y` is modelled as `y'_t = mu + beta * x'_t + n_t`, where `'`
//! denotes `d`-fold differencing, `mu` is only present when `d = 0`, and `n_t` follows
//! an ARMA(p, q) process.
//!
//! Estimation is two-step. Regression coefficients come from least squares on the
//! differenced data; ARMA coefficients then minimise the conditional sum of squares
//! (CSS) of the regression residuals with BFGS. The optimiser works on unconstrained
//! parameters mapped through `tanh` partial autocorrelations and the Durbin-Levinson
//! recursion, so every candidate it visits is stationary (AR) and invertible (MA).
//!
//! Missing days inside the window are replaced by the model's one-step prediction and
//! contribute nothing to the sum of squares.

use super::ForecastError;
use ndarray::{Array1, Array2};
use ndarray_linalg::LeastSquaresSvd;
use serde::{Deserialize, Serialize};
use std::fmt;
use wolfe_bfgs::{Bfgs, BfgsSolution};

/// 5% critical value of the KPSS level-stationarity statistic.
pub const KPSS_CRITICAL_5PCT: f64 = 0.463;

const BFGS_TOLERANCE: f64 = 1e-6;
const BFGS_MAX_ITERATIONS: usize = 200;
const GRADIENT_STEP: f64 = 1e-6;
/// Raw parameters beyond this magnitude sit on the flat tails of `tanh`.
const RAW_BOUND: f64 = 6.0;
const SIGMA2_FLOOR: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArimaOrder {
    pub p: usize,
    pub d: usize,
    pub q: usize,
}

impl fmt::Display for ArimaOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ARIMA({},{},{})", self.p, self.d, self.q)
    }
}

/// Gaussian predictive distribution for one horizon step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Predictive {
    pub mean: f64,
    pub sd: f64,
}

/// Human-readable description of a fitted model, carried into the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSummary {
    pub order: ArimaOrder,
    pub intercept: Option<f64>,
    pub exog_coefficient: Option<f64>,
    pub ar: Vec<f64>,
    pub ma: Vec<f64>,
    pub sigma2: f64,
    pub log_likelihood: f64,
    pub aicc: f64,
    pub observations: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Regression {
    intercept: Option<f64>,
    exog_coefficient: Option<f64>,
}

impl Regression {
    fn num_coefficients(&self) -> usize {
        self.intercept.is_some() as usize + self.exog_coefficient.is_some() as usize
    }

    fn mean(&self, x: Option<f64>) -> f64 {
        self.intercept.unwrap_or(0.0) + self.exog_coefficient.unwrap_or(0.0) * x.unwrap_or(0.0)
    }
}

/// `d`-fold first differences. A difference touching a missing day is missing.
pub fn difference(values: &[Option<f64>], d: usize) -> Vec<Option<f64>> {
    let mut current = values.to_vec();
    for _ in 0..d {
        current = current
            .windows(2)
            .map(|w| Some(w[1]? - w[0]?))
            .collect();
    }
    current
}

/// Least squares of `y` on an optional intercept and an optional regressor, over days
/// where every involved value is observed. Returns the coefficients and the residual
/// series on the original axis.
fn regress(
    y: &[Option<f64>],
    x: Option<&[Option<f64>]>,
    include_mean: bool,
) -> Result<(Regression, Vec<Option<f64>>), ForecastError> {
    let ncols = include_mean as usize + x.is_some() as usize;
    if ncols == 0 {
        return Ok((Regression::default(), y.to_vec()));
    }
    let rows: Vec<(f64, Option<f64>)> = (0..y.len())
        .filter_map(|t| match (y[t], x.map(|x| x[t])) {
            (Some(yv), None) => Some((yv, None)),
            (Some(yv), Some(Some(xv))) => Some((yv, Some(xv))),
            _ => None,
        })
        .collect();
    if rows.len() <= ncols {
        return Err(ForecastError::InsufficientData {
            found: rows.len(),
            required: ncols + 1,
        });
    }

    let mut design = Array2::<f64>::zeros((rows.len(), ncols));
    let mut target = Array1::<f64>::zeros(rows.len());
    for (r, &(yv, xv)) in rows.iter().enumerate() {
        if include_mean {
            design[[r, 0]] = 1.0;
        }
        if let Some(xv) = xv {
            design[[r, ncols - 1]] = xv;
        }
        target[r] = yv;
    }
    let solution = design
        .least_squares(&target)
        .map_err(|e| ForecastError::Linalg(e.to_string()))?
        .solution;

    let regression = Regression {
        intercept: include_mean.then(|| solution[0]),
        exog_coefficient: x.map(|_| solution[ncols - 1]),
    };
    let residuals = (0..y.len())
        .map(|t| {
            let yv = y[t]?;
            let xv = match x {
                Some(x) => Some(x[t]?),
                None => None,
            };
            Some(yv - regression.mean(xv))
        })
        .collect();
    Ok((regression, residuals))
}

/// KPSS statistic for level stationarity, with the Bartlett-window long-run variance
/// truncated at `floor(3 * sqrt(n) / 13)` lags. `None` for constant or tiny samples.
pub fn kpss_level_statistic(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 3 {
        return None;
    }
    let nf = n as f64;
    let mean = values.iter().sum::<f64>() / nf;
    let e: Vec<f64> = values.iter().map(|v| v - mean).collect();

    let mut partial = 0.0;
    let mut eta = 0.0;
    for &v in &e {
        partial += v;
        eta += partial * partial;
    }

    let lags = (3.0 * nf.sqrt() / 13.0).floor() as usize;
    let mut s2 = e.iter().map(|v| v * v).sum::<f64>() / nf;
    for j in 1..=lags.min(n - 1) {
        let weight = 1.0 - j as f64 / (lags as f64 + 1.0);
        let cov: f64 = (j..n).map(|t| e[t] * e[t - j]).sum::<f64>() / nf;
        s2 += 2.0 * weight * cov;
    }
    if s2.is_nan() || s2 <= 0.0 {
        return None;
    }
    Some(eta / (nf * nf * s2))
}

/// Differences until the KPSS test no longer rejects level stationarity at 5%, up to
/// `max_d`. With a regressor the test runs on the regression residuals.
pub fn select_differencing(
    endog: &[Option<f64>],
    exog: Option<&[Option<f64>]>,
    max_d: usize,
) -> usize {
    for d in 0..max_d {
        let y = difference(endog, d);
        let x = exog.map(|x| difference(x, d));
        let Ok((_, residuals)) = regress(&y, x.as_deref(), true) else {
            return d;
        };
        let observed: Vec<f64> = residuals.into_iter().flatten().collect();
        match kpss_level_statistic(&observed) {
            Some(stat) if stat > KPSS_CRITICAL_5PCT => {
                log::debug!("KPSS statistic {stat:.4} at d = {d}; differencing again.");
            }
            _ => return d,
        }
    }
    max_d
}

/// Maps unconstrained values to the coefficients of a stationary AR polynomial via
/// partial autocorrelations `tanh(raw_k)`.
fn pacf_to_coefficients(raw: &[f64]) -> Vec<f64> {
    let mut phi: Vec<f64> = Vec::with_capacity(raw.len());
    for (k, r) in raw.iter().map(|v| v.tanh()).enumerate() {
        let mut next: Vec<f64> = (0..k).map(|j| phi[j] - r * phi[k - 1 - j]).collect();
        next.push(r);
        phi = next;
    }
    phi
}

fn unpack(raw: &Array1<f64>, p: usize) -> (Vec<f64>, Vec<f64>) {
    let raw: Vec<f64> = raw.iter().map(|v| v.clamp(-RAW_BOUND, RAW_BOUND)).collect();
    let ar = pacf_to_coefficients(&raw[..p]);
    let ma = pacf_to_coefficients(&raw[p..])
        .into_iter()
        .map(|c| -c)
        .collect();
    (ar, ma)
}

fn one_step(ar: &[f64], ma: &[f64], filled: &[f64], residuals: &[f64]) -> f64 {
    let t = filled.len();
    let ar_part: f64 = ar
        .iter()
        .take(t)
        .enumerate()
        .map(|(i, phi)| phi * filled[t - 1 - i])
        .sum();
    let ma_part: f64 = ma
        .iter()
        .take(t)
        .enumerate()
        .map(|(j, theta)| theta * residuals[t - 1 - j])
        .sum();
    ar_part + ma_part
}

struct CssPass {
    filled: Vec<f64>,
    residuals: Vec<f64>,
    sse: f64,
    count: usize,
}

/// Conditional sum of squares. The first `p` days only seed the recursion; missing
/// values in the seed are set to the process mean of zero.
fn css_pass(ar: &[f64], ma: &[f64], noise: &[Option<f64>]) -> CssPass {
    let p = ar.len();
    let mut filled = Vec::with_capacity(noise.len());
    let mut residuals = Vec::with_capacity(noise.len());
    let mut sse = 0.0;
    let mut count = 0usize;
    for (t, value) in noise.iter().enumerate() {
        if t < p {
            filled.push(value.unwrap_or(0.0));
            residuals.push(0.0);
            continue;
        }
        let prediction = one_step(ar, ma, &filled, &residuals);
        match value {
            Some(v) => {
                let e = v - prediction;
                sse += e * e;
                count += 1;
                filled.push(*v);
                residuals.push(e);
            }
            None => {
                filled.push(prediction);
                residuals.push(0.0);
            }
        }
    }
    CssPass {
        filled,
        residuals,
        sse,
        count,
    }
}

fn optimise_arma(
    p: usize,
    q: usize,
    noise: &[Option<f64>],
) -> Result<(Vec<f64>, Vec<f64>), ForecastError> {
    let series = noise.to_vec();
    let objective = move |raw: &Array1<f64>| -> f64 {
        let (ar, ma) = unpack(raw, p);
        let pass = css_pass(&ar, &ma, &series);
        if pass.count == 0 {
            return 1e10;
        }
        (pass.sse / pass.count as f64).max(f64::MIN_POSITIVE).ln()
    };
    let cost_and_grad = move |raw: &Array1<f64>| -> (f64, Array1<f64>) {
        let safe_raw = raw.mapv(|v| v.clamp(-RAW_BOUND, RAW_BOUND));
        let cost = objective(&safe_raw);
        let mut grad = Array1::zeros(raw.len());
        for i in 0..raw.len() {
            let mut up = safe_raw.clone();
            up[i] += GRADIENT_STEP;
            let mut down = safe_raw.clone();
            down[i] -= GRADIENT_STEP;
            grad[i] = (objective(&up) - objective(&down)) / (2.0 * GRADIENT_STEP);
        }
        (cost, grad)
    };

    let BfgsSolution {
        final_point,
        final_value,
        iterations,
        ..
    } = Bfgs::new(Array1::zeros(p + q), cost_and_grad)
        .with_tolerance(BFGS_TOLERANCE)
        .with_max_iterations(BFGS_MAX_ITERATIONS)
        .run()
        .map_err(|e| ForecastError::OptimizationFailed(format!("BFGS failed: {e:?}")))?;
    log::debug!(
        "CSS optimisation for ARMA({p},{q}) finished in {iterations} iterations (log mean square {final_value:.6})."
    );
    Ok(unpack(&final_point, p))
}

/// Psi weights of the integrated model: coefficients of `theta(B) / (phi(B) (1 - B)^d)`.
fn psi_weights(ar: &[f64], ma: &[f64], d: usize, count: usize) -> Vec<f64> {
    let mut poly = vec![1.0];
    poly.extend(ar.iter().map(|phi| -phi));
    for _ in 0..d {
        let mut next = vec![0.0; poly.len() + 1];
        for (i, &c) in poly.iter().enumerate() {
            next[i] += c;
            next[i + 1] -= c;
        }
        poly = next;
    }
    let mut psi = Vec::with_capacity(count);
    for j in 0..count {
        if j == 0 {
            psi.push(1.0);
            continue;
        }
        let theta_j = ma.get(j - 1).copied().unwrap_or(0.0);
        let feedback: f64 = (1..poly.len().min(j + 1))
            .map(|i| poly[i] * psi[j - i])
            .sum();
        psi.push(theta_j - feedback);
    }
    psi
}

/// A fitted regression-with-ARIMA-errors model, retaining the training window it needs
/// to forecast from its origin.
#[derive(Debug, Clone)]
pub struct ArimaFit {
    order: ArimaOrder,
    regression: Regression,
    ar: Vec<f64>,
    ma: Vec<f64>,
    sigma2: f64,
    log_likelihood: f64,
    aicc: f64,
    observations: usize,
    endog: Vec<Option<f64>>,
    exog: Option<Vec<Option<f64>>>,
    filled: Vec<f64>,
    residuals: Vec<f64>,
}

impl ArimaFit {
    pub fn fit(
        endog: &[Option<f64>],
        exog: Option<&[Option<f64>]>,
        order: ArimaOrder,
    ) -> Result<Self, ForecastError> {
        let ArimaOrder { p, d, q } = order;
        let y = difference(endog, d);
        let x = exog.map(|x| difference(x, d));
        let (regression, noise) = regress(&y, x.as_deref(), d == 0)?;

        let num_params = p + q + regression.num_coefficients() + 1;
        let usable = noise.iter().skip(p).filter(|v| v.is_some()).count();
        if usable < num_params + 2 {
            return Err(ForecastError::InsufficientData {
                found: usable,
                required: num_params + 2,
            });
        }

        let (ar, ma) = if p + q == 0 {
            (Vec::new(), Vec::new())
        } else {
            optimise_arma(p, q, &noise)?
        };
        let pass = css_pass(&ar, &ma, &noise);
        let n = pass.count as f64;
        let sigma2 = (pass.sse / n).max(SIGMA2_FLOOR);
        let log_likelihood = -0.5 * n * ((2.0 * std::f64::consts::PI * sigma2).ln() + 1.0);
        let k = num_params as f64;
        let aicc = -2.0 * log_likelihood + 2.0 * k + 2.0 * k * (k + 1.0) / (n - k - 1.0);

        Ok(Self {
            order,
            regression,
            ar,
            ma,
            sigma2,
            log_likelihood,
            aicc,
            observations: pass.count,
            endog: endog.to_vec(),
            exog: exog.map(<[Option<f64>]>::to_vec),
            filled: pass.filled,
            residuals: pass.residuals,
        })
    }

    pub fn order(&self) -> ArimaOrder {
        self.order
    }

    pub fn aicc(&self) -> f64 {
        self.aicc
    }

    pub fn sigma2(&self) -> f64 {
        self.sigma2
    }

    pub fn ar(&self) -> &[f64] {
        &self.ar
    }

    pub fn ma(&self) -> &[f64] {
        &self.ma
    }

    pub fn summary(&self) -> ModelSummary {
        ModelSummary {
            order: self.order,
            intercept: self.regression.intercept,
            exog_coefficient: self.regression.exog_coefficient,
            ar: self.ar.clone(),
            ma: self.ma.clone(),
            sigma2: self.sigma2,
            log_likelihood: self.log_likelihood,
            aicc: self.aicc,
            observations: self.observations,
        }
    }

    /// The training window on its original scale with every missing day replaced by
    /// the model's in-sample prediction, so forecasts can start from a day without data.
    fn imputed_levels(&self) -> Vec<f64> {
        let d = self.order.d;
        let x_diff = self.exog.as_ref().map(|x| {
            let filled: Vec<Option<f64>> = carry_forward(x).into_iter().map(Some).collect();
            difference(&filled, d)
        });
        let poly = difference_polynomial(d);
        let fallback = self.endog.iter().flatten().next().copied().unwrap_or(0.0);

        let mut levels: Vec<f64> = Vec::with_capacity(self.endog.len());
        for (t, value) in self.endog.iter().enumerate() {
            let level = match value {
                Some(v) => *v,
                None if t < d => levels.last().copied().unwrap_or(fallback),
                None => {
                    let i = t - d;
                    let x = x_diff.as_ref().and_then(|x| x[i]);
                    let noise = self.filled.get(i).copied().unwrap_or(0.0);
                    let differenced = self.regression.mean(x) + noise;
                    differenced - (1..=d).map(|k| poly[k] * levels[t - k]).sum::<f64>()
                }
            };
            levels.push(level);
        }
        levels
    }

    /// Forecasts `horizon` steps past the last training day. Models with a regressor
    /// need exactly `horizon` future regressor values.
    pub fn forecast(
        &self,
        horizon: usize,
        future_exog: Option<&[f64]>,
    ) -> Result<Vec<Predictive>, ForecastError> {
        let d = self.order.d;

        // Delta^l y at the origin for l < d, the anchors for undoing the differencing.
        let mut levels = Vec::with_capacity(d);
        if d > 0 {
            let history = self.imputed_levels();
            let mut current = history[history.len() - d..].to_vec();
            for _ in 0..d {
                levels.push(*current.last().unwrap_or(&0.0));
                current = current.windows(2).map(|w| w[1] - w[0]).collect();
            }
        }

        let future_x: Option<Vec<f64>> = match &self.exog {
            None => None,
            Some(history) => {
                let future = future_exog.ok_or(ForecastError::MissingExogenous)?;
                if future.len() != horizon {
                    return Err(ForecastError::ExogenousLength {
                        expected: horizon,
                        found: future.len(),
                    });
                }
                let history = carry_forward(history);
                let mut combined = history[history.len() - d..].to_vec();
                combined.extend_from_slice(future);
                for _ in 0..d {
                    combined = combined.windows(2).map(|w| w[1] - w[0]).collect();
                }
                Some(combined)
            }
        };

        let mut filled = self.filled.clone();
        let mut residuals = self.residuals.clone();
        let psi = psi_weights(&self.ar, &self.ma, d, horizon);
        let mut cumulative_psi2 = 0.0;
        let mut out = Vec::with_capacity(horizon);
        for step in 0..horizon {
            let noise = one_step(&self.ar, &self.ma, &filled, &residuals);
            filled.push(noise);
            residuals.push(0.0);

            let x = future_x.as_ref().map(|fx| fx[step]);
            let mut value = self.regression.mean(x) + noise;
            for level in levels.iter_mut().rev() {
                *level += value;
                value = *level;
            }

            cumulative_psi2 += psi[step] * psi[step];
            out.push(Predictive {
                mean: value,
                sd: (self.sigma2 * cumulative_psi2).sqrt(),
            });
        }
        Ok(out)
    }
}

/// Regressor values with gaps filled by the last observed value. Leading gaps take the
/// first observed value.
fn carry_forward(values: &[Option<f64>]) -> Vec<f64> {
    let mut last = values.iter().flatten().next().copied().unwrap_or(0.0);
    values
        .iter()
        .map(|v| {
            if let Some(x) = v {
                last = *x;
            }
            last
        })
        .collect()
}

/// Coefficients of `(1 - B)^d`, lowest power first.
fn difference_polynomial(d: usize) -> Vec<f64> {
    let mut poly = vec![1.0];
    for _ in 0..d {
        let mut next = vec![0.0; poly.len() + 1];
        for (i, &c) in poly.iter().enumerate() {
            next[i] += c;
            next[i + 1] -= c;
        }
        poly = next;
    }
    poly
}
