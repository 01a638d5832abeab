//! # Dependency Estimator
//!
//! Quantifies how strongly the daily positivity signal is associated with an
//! epidemiological outcome: Pearson correlation on complete cases, a mutual-information
//! lag search, and transfer entropy at the selected lag. All measures are descriptive;
//! none of them licenses a causal reading.

pub mod estimate;
pub mod kernel;
pub mod normalize;

use thiserror::Error;

pub use estimate::{DependencyResult, LagSearch, estimate, pearson_correlation, search_optimal_lag};
pub use kernel::{KernelSettings, mutual_information, transfer_entropy};
pub use normalize::MinMax;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EstimatorError {
    #[error(
        "Kernel estimation needs at least {required} paired observations, but only {found} were available."
    )]
    TooFewObservations { required: usize, found: usize },
    #[error(
        "Transfer entropy is undefined at lag 0; the source must lead the destination by at least one day."
    )]
    ZeroLag,
    #[error("Source and destination series must share one date axis (lengths {source_len} and {dest_len}).")]
    LengthMismatch { source_len: usize, dest_len: usize },
    #[error("Kernel width must be a positive finite number, got {0}.")]
    InvalidKernelWidth(f64),
}
