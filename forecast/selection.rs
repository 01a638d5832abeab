use super::arima::{ArimaFit, ArimaOrder, select_differencing};
use super::{ForecastError, MIN_TRAINING_OBSERVATIONS};
use serde::{Deserialize, Serialize};

/// Chooses and fits a model for one training window.
pub trait OrderSelection: Send + Sync {
    fn name(&self) -> &'static str;

    fn select(
        &self,
        endog: &[Option<f64>],
        exog: Option<&[Option<f64>]>,
    ) -> Result<ArimaFit, ForecastError>;
}

/// Stepwise-free automatic selection: the differencing order comes from repeated KPSS
/// tests, then every (p, q) in the grid is fit and the lowest AICc wins. Candidates are
/// visited by increasing `p + q`, then `p`; ties keep the simpler model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiccGridSearch {
    pub max_p: usize,
    pub max_d: usize,
    pub max_q: usize,
}

impl Default for AiccGridSearch {
    fn default() -> Self {
        Self {
            max_p: 3,
            max_d: 2,
            max_q: 2,
        }
    }
}

impl AiccGridSearch {
    fn candidates(&self, d: usize) -> Vec<ArimaOrder> {
        let mut orders = Vec::new();
        for total in 0..=(self.max_p + self.max_q) {
            for p in 0..=total.min(self.max_p) {
                let q = total - p;
                if q <= self.max_q {
                    orders.push(ArimaOrder { p, d, q });
                }
            }
        }
        orders
    }
}

impl OrderSelection for AiccGridSearch {
    fn name(&self) -> &'static str {
        "aicc-grid"
    }

    fn select(
        &self,
        endog: &[Option<f64>],
        exog: Option<&[Option<f64>]>,
    ) -> Result<ArimaFit, ForecastError> {
        let observed = endog.iter().filter(|v| v.is_some()).count();
        if observed < MIN_TRAINING_OBSERVATIONS {
            return Err(ForecastError::InsufficientData {
                found: observed,
                required: MIN_TRAINING_OBSERVATIONS,
            });
        }

        let d = select_differencing(endog, exog, self.max_d);
        let candidates = self.candidates(d);
        let tried = candidates.len();
        let mut best: Option<ArimaFit> = None;
        let mut last_error = None;
        for order in candidates {
            match ArimaFit::fit(endog, exog, order) {
                Ok(fit) => {
                    log::debug!("{order}: AICc {:.4}", fit.aicc());
                    if best.as_ref().is_none_or(|b| fit.aicc() < b.aicc()) {
                        best = Some(fit);
                    }
                }
                Err(e) => {
                    log::debug!("{order} skipped: {e}");
                    last_error = Some(e);
                }
            }
        }

        match best {
            Some(fit) => {
                log::info!(
                    "Selected {} (AICc {:.4}) from {tried} candidates.",
                    fit.order(),
                    fit.aicc()
                );
                Ok(fit)
            }
            // Every candidate failing on data volume is a data problem, not a search one.
            None => match last_error {
                Some(e @ ForecastError::InsufficientData { .. }) => Err(e),
                _ => Err(ForecastError::NoCandidate { tried }),
            },
        }
    }
}
