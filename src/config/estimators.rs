//! Per-estimator tuning parameters.

use serde::{Deserialize, Serialize};

use crate::consts::*;
use crate::errors::{Error, Result};

fn ensure_positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(Error::config(format!("{name} must be positive and finite, got {value}")))
    }
}

fn ensure_probability(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 && value < 1.0 {
        Ok(())
    } else {
        Err(Error::config(format!("{name} must be in (0, 1), got {value}")))
    }
}

/// Configuration for the exponential-moving-average estimator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmaConfig {
    /// Learning rate α applied to the per-unit error share
    pub alpha: f64,
    /// Observations needed before the count factor saturates at 1
    pub confidence_saturation: f64,
    /// EWMA decay for the squared per-unit error (variance proxy)
    pub error_variance_decay: f64,
    /// Variance reported for never-observed products (g²)
    pub prior_variance: f64,
}

impl Default for EmaConfig {
    fn default() -> Self {
        Self {
            alpha: EMA_ALPHA,
            confidence_saturation: 10.0,
            error_variance_decay: 0.9,
            prior_variance: BAYES_PRIOR_VARIANCE,
        }
    }
}

impl EmaConfig {
    pub fn validate(&self) -> Result<()> {
        ensure_probability("ema.alpha", self.alpha)?;
        ensure_positive("ema.confidence_saturation", self.confidence_saturation)?;
        ensure_probability("ema.error_variance_decay", self.error_variance_decay)?;
        ensure_positive("ema.prior_variance", self.prior_variance)
    }
}

/// Variance floors used when summing per-item Kalman uncertainty into an order variance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KalmanVarianceFloors {
    /// Floor while the product is still learning (g²)
    pub learning: f64,
    /// Floor while P is above `medium_above` (g²)
    pub medium: f64,
    /// P above which the medium floor applies (g²)
    pub medium_above: f64,
    /// Floor otherwise; roughly R + Q·0.5 + slack (g²)
    pub settled: f64,
}

impl Default for KalmanVarianceFloors {
    fn default() -> Self {
        Self {
            learning: 100.0,
            medium: 50.0,
            medium_above: 35.0,
            settled: 29.0,
        }
    }
}

/// Configuration for the per-product Kalman estimator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KalmanConfig {
    /// Measurement noise R (g²)
    pub measurement_noise: f64,
    /// Base process noise Q (g²)
    pub process_noise: f64,
    /// Initial variance P₀ for a new product (g²)
    pub initial_variance: f64,
    /// |error| above which Q is boosted (g)
    pub error_threshold: f64,
    /// Upper bound on the Q boost multiplier
    pub max_q_boost: f64,
    /// Scale for adaptive gain blending γ = min(1, 0.5 + |e|/scale) (g)
    pub gain_blend_scale: f64,
    /// Observations before a product can leave LEARNING
    pub min_observations: u64,
    /// P above which a product is MEDIUM rather than HIGH (g²)
    pub medium_variance: f64,
    pub variance_floors: KalmanVarianceFloors,
}

impl Default for KalmanConfig {
    fn default() -> Self {
        Self {
            measurement_noise: KALMAN_MEASUREMENT_NOISE,
            process_noise: KALMAN_PROCESS_NOISE,
            initial_variance: KALMAN_INITIAL_VARIANCE,
            error_threshold: KALMAN_ERROR_THRESHOLD,
            max_q_boost: KALMAN_MAX_Q_BOOST,
            gain_blend_scale: KALMAN_GAIN_BLEND_SCALE,
            min_observations: 10,
            medium_variance: 50.0,
            variance_floors: KalmanVarianceFloors::default(),
        }
    }
}

impl KalmanConfig {
    /// Lower bound every filter variance is held to: max(R, 0.5·Q).
    pub fn variance_floor(&self) -> f64 {
        self.measurement_noise.max(0.5 * self.process_noise)
    }

    pub fn validate(&self) -> Result<()> {
        ensure_positive("kalman.measurement_noise", self.measurement_noise)?;
        ensure_positive("kalman.process_noise", self.process_noise)?;
        ensure_positive("kalman.initial_variance", self.initial_variance)?;
        ensure_positive("kalman.error_threshold", self.error_threshold)?;
        ensure_positive("kalman.gain_blend_scale", self.gain_blend_scale)?;
        if self.initial_variance < self.variance_floor() {
            return Err(Error::config(format!(
                "kalman.initial_variance must be >= max(R, 0.5*Q) = {}, got {}",
                self.variance_floor(),
                self.initial_variance
            )));
        }
        if !(self.max_q_boost.is_finite() && self.max_q_boost >= 1.0) {
            return Err(Error::config(format!(
                "kalman.max_q_boost must be >= 1, got {}",
                self.max_q_boost
            )));
        }
        Ok(())
    }
}

/// Configuration for the joint Bayesian linear-regression estimator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BayesianConfig {
    /// Measurement noise variance σ² of the aggregate reading (g²)
    pub measurement_noise: f64,
    /// Prior variance on the diagonal for a newly seen product (g²)
    pub prior_variance: f64,
    /// Smoothing constant k in the sample factor n / (n + k)
    pub confidence_smoothing: f64,
    /// Scale in the variance factor 1 / (1 + Σᵢᵢ / scale); defaults to the prior variance
    pub confidence_variance_scale: Option<f64>,
    /// Relative asymmetry tolerated in the posterior covariance before rejecting it
    pub symmetry_tolerance: f64,
    pub classifier: ClassifierConfig,
}

impl Default for BayesianConfig {
    fn default() -> Self {
        Self {
            measurement_noise: BAYES_MEASUREMENT_NOISE,
            prior_variance: BAYES_PRIOR_VARIANCE,
            confidence_smoothing: BAYES_CONFIDENCE_SMOOTHING,
            confidence_variance_scale: None,
            symmetry_tolerance: 1e-8,
            classifier: ClassifierConfig::default(),
        }
    }
}

impl BayesianConfig {
    pub fn variance_scale(&self) -> f64 {
        self.confidence_variance_scale.unwrap_or(self.prior_variance)
    }

    pub fn validate(&self) -> Result<()> {
        ensure_positive("bayesian.measurement_noise", self.measurement_noise)?;
        ensure_positive("bayesian.prior_variance", self.prior_variance)?;
        ensure_positive("bayesian.confidence_smoothing", self.confidence_smoothing)?;
        ensure_positive("bayesian.confidence_variance_scale", self.variance_scale())?;
        ensure_positive("bayesian.symmetry_tolerance", self.symmetry_tolerance)?;
        self.classifier.validate()
    }
}

/// Configuration for the completeness hypothesis test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Prior probability that the order is complete
    pub prior_complete: f64,
    /// Below this P(missing | y) the order is reported complete
    pub missing_threshold: f64,
    /// Number of ranked candidates to report
    pub top_k: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            prior_complete: PRIOR_COMPLETE,
            missing_threshold: MISSING_PROBABILITY_THRESHOLD,
            top_k: TOP_MISSING_CANDIDATES,
        }
    }
}

impl ClassifierConfig {
    pub fn validate(&self) -> Result<()> {
        ensure_probability("classifier.prior_complete", self.prior_complete)?;
        ensure_probability("classifier.missing_threshold", self.missing_threshold)?;
        if self.top_k == 0 {
            return Err(Error::config("classifier.top_k must be at least 1"));
        }
        Ok(())
    }
}

/// Tuning for all three estimators plus the shared prior mean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Per-unit weight assumed for products without a catalog prior (g)
    pub default_prior_mean: f64,
    pub ema: EmaConfig,
    pub kalman: KalmanConfig,
    pub bayesian: BayesianConfig,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            default_prior_mean: DEFAULT_PRIOR_MEAN,
            ema: EmaConfig::default(),
            kalman: KalmanConfig::default(),
            bayesian: BayesianConfig::default(),
        }
    }
}

impl EstimatorConfig {
    pub fn validate(&self) -> Result<()> {
        ensure_positive("default_prior_mean", self.default_prior_mean)?;
        self.ema.validate()?;
        self.kalman.validate()?;
        self.bayesian.validate()
    }
}
