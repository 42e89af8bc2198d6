#![deny(unreachable_pub)]

//! Per-item weight attribution from aggregate order weights.
//!
//! Orders are weighed as a whole; this crate learns what each product weighs from that
//! stream of totals and uses the estimates to flag orders that are missing an item.

// Core modules
pub mod consts;
pub mod errors;
pub mod types;

// Feature modules
pub mod config;
pub mod estimator;
pub mod evaluation;
pub mod verification;

// Re-exports
pub use config::{AppConfig, EstimatorConfig};
pub use errors::{Error, InvalidOrderReason, Result};
pub use estimator::{
    build_estimator, BayesianRegressionEstimator, CompletenessReport, ConfidenceStatus,
    EmaEstimator, EstimatorKind, KalmanEstimator, MissingCandidate, OrderWeightEstimate,
    UpdateOutcome, WeightEstimator,
};
pub use evaluation::{ConvergenceEvaluator, ConvergenceReport};
pub use types::*;
pub use verification::{OrderVerifier, VerificationResult, VerificationStatus};
