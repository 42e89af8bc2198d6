//! Offline evaluation of estimators against known product weights.

mod convergence;

pub use convergence::{ground_truth, ConvergenceEvaluator, ConvergenceReport};
