//! Online per-product weight estimation from aggregate order weights.
//!
//! Every estimator sees the same thing: an order (which products, how many of each) and
//! one scale reading for the whole bag. They differ in how that single number is
//! attributed back to individual products.
//!
//! # Module Structure
//!
//! - `ema`: exponential moving average fed by an equally shared error signal
//! - `kalman`: independent scalar Kalman filter per product, adaptive Q and gain
//! - `bayesian`: joint Gaussian posterior over all product weights (conjugate regression)
//! - `classification`: Bayesian completeness test ("which item is missing")
//! - `mock`: fixed-weight estimator for tests

mod bayesian;
mod classification;
mod ema;
mod kalman;
mod mock;

pub use bayesian::{BayesianRegressionEstimator, BayesianState, CredibleInterval};
pub use classification::{CompletenessReport, MissingCandidate};
pub use ema::{EmaEstimator, EmaProductState, EmaState};
pub use kalman::{KalmanEstimator, KalmanState, ProductWeightFilter};
pub use mock::MockEstimator;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::EstimatorConfig;
use crate::errors::{Error, InvalidOrderReason, Result};
use crate::types::{Order, PriorTable, ProductId};

// ============================================================================
// Shared result types
// ============================================================================

/// Three-level confidence taxonomy shared by all estimators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfidenceStatus {
    Learning,
    Medium,
    High,
}

impl ConfidenceStatus {
    /// Map a [0, 1] confidence score onto the taxonomy (HIGH > 0.8, MEDIUM > 0.5).
    pub fn from_score(score: f64) -> Self {
        if score > crate::consts::HIGH_CONFIDENCE_SCORE {
            ConfidenceStatus::High
        } else if score > crate::consts::MEDIUM_CONFIDENCE_SCORE {
            ConfidenceStatus::Medium
        } else {
            ConfidenceStatus::Learning
        }
    }

    /// Whether verification may rely on this product.
    pub fn is_confident(self) -> bool {
        !matches!(self, ConfidenceStatus::Learning)
    }
}

impl fmt::Display for ConfidenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConfidenceStatus::Learning => "LEARNING",
            ConfidenceStatus::Medium => "MEDIUM",
            ConfidenceStatus::High => "HIGH",
        };
        f.write_str(s)
    }
}

/// Predicted aggregate weight of an order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderWeightEstimate {
    /// Σ estimate × quantity (g)
    pub weight: f64,
    /// Aggregate uncertainty of `weight` (g²)
    pub variance: f64,
}

impl OrderWeightEstimate {
    pub fn std_dev(&self) -> f64 {
        self.variance.max(0.0).sqrt()
    }
}

/// What an `update` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// State absorbed the observation.
    Applied,
    /// Precondition violated; state untouched.
    Ignored(InvalidOrderReason),
    /// The step would have stored a non-finite value; state untouched.
    NonFinite,
}

impl UpdateOutcome {
    pub fn is_applied(self) -> bool {
        matches!(self, UpdateOutcome::Applied)
    }
}

// ============================================================================
// WeightEstimator Trait
// ============================================================================

/// Behavioural contract shared by every weight estimator.
///
/// Read methods never mutate state and never fail for unknown products; they fall back to
/// the configured prior. `update` is the only mutator.
///
/// # Usage in Tests
///
/// ```ignore
/// use order_weight_estimator::estimator::{MockEstimator, WeightEstimator};
///
/// let mock = MockEstimator::new().with_weight("taco", 150.0);
/// assert_eq!(mock.infer_item_weight(&"taco".into()), 150.0);
/// ```
pub trait WeightEstimator: Send + Sync {
    /// Display name including the key tuning parameters.
    fn name(&self) -> String;

    /// Current per-unit point estimate (prior mean when never observed).
    fn infer_item_weight(&self, product_id: &ProductId) -> f64;

    /// Predicted total for every item in `order` (missing flags ignored) with uncertainty.
    fn infer_order_weight(&self, order: &Order) -> OrderWeightEstimate;

    /// Incorporate one aggregate observation.
    ///
    /// Orders failing [`Order::validate_for_learning`] return `Ok(Ignored)` and leave state
    /// unchanged. `Err` is reserved for numeric failures the caller must know about.
    fn update(&mut self, order: &Order, measured_weight: f64) -> Result<UpdateOutcome>;

    /// Number of observations attributed to a product.
    fn observation_count(&self, product_id: &ProductId) -> u64;

    /// Confidence bucket for a product (LEARNING when unknown).
    fn confidence_status(&self, product_id: &ProductId) -> ConfidenceStatus;

    /// Clear all learned state back to priors.
    fn reset(&mut self);
}

// ============================================================================
// Factory
// ============================================================================

/// Which estimator implementation to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimatorKind {
    Ema,
    Kalman,
    #[serde(alias = "bayesian")]
    BayesianRegression,
}

impl EstimatorKind {
    pub const ALL: [EstimatorKind; 3] = [
        EstimatorKind::Ema,
        EstimatorKind::Kalman,
        EstimatorKind::BayesianRegression,
    ];
}

impl FromStr for EstimatorKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "ema" => Ok(EstimatorKind::Ema),
            "kalman" => Ok(EstimatorKind::Kalman),
            "bayesian" | "bayesian_regression" | "bayes" => Ok(EstimatorKind::BayesianRegression),
            other => Err(Error::UnknownEstimator(other.to_string())),
        }
    }
}

impl fmt::Display for EstimatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EstimatorKind::Ema => "ema",
            EstimatorKind::Kalman => "kalman",
            EstimatorKind::BayesianRegression => "bayesian",
        };
        f.write_str(s)
    }
}

/// Build a fresh, independent estimator. Switching algorithms never carries state over.
pub fn build_estimator(
    kind: EstimatorKind,
    config: &EstimatorConfig,
    priors: PriorTable,
) -> Box<dyn WeightEstimator> {
    match kind {
        EstimatorKind::Ema => Box::new(EmaEstimator::new(config.ema.clone(), priors)),
        EstimatorKind::Kalman => Box::new(KalmanEstimator::new(config.kalman.clone(), priors)),
        EstimatorKind::BayesianRegression => Box::new(BayesianRegressionEstimator::new(
            config.bayesian.clone(),
            priors,
        )),
    }
}
