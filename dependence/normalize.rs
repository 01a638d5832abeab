use crate::series::DailySeries;
use serde::{Deserialize, Serialize};

/// Min-max scaling constants taken from one series' own observed values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MinMax {
    pub min: f64,
    pub max: f64,
}

impl MinMax {
    /// `None` when the series has no observed values.
    pub fn fit<'a, I>(values: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a Option<f64>>,
    {
        values
            .into_iter()
            .flatten()
            .filter(|v| v.is_finite())
            .fold(None, |acc, &v| match acc {
                None => Some(Self { min: v, max: v }),
                Some(MinMax { min, max }) => Some(Self {
                    min: min.min(v),
                    max: max.max(v),
                }),
            })
    }

    #[inline]
    pub fn range(&self) -> f64 {
        self.max - self.min
    }

    /// A constant series has no spread to scale and maps onto zero.
    #[inline]
    pub fn normalize(&self, value: f64) -> f64 {
        let range = self.range();
        if range > 0.0 {
            (value - self.min) / range
        } else {
            0.0
        }
    }

    #[inline]
    pub fn denormalize(&self, scaled: f64) -> f64 {
        self.min + scaled * self.range()
    }

    pub fn apply(&self, series: &DailySeries) -> DailySeries {
        series.map_observed(|v| self.normalize(v))
    }
}
