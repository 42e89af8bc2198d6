//! Default tuning constants.
//!
//! Several of these were tuned empirically against simulated quick-service orders
//! (25 products, 45-485 g per unit, ~2 g scale noise). They are starting points, not
//! analytically derived values; every one is overridable through [`crate::config`].

/// Neutral per-unit weight (grams) for products with no catalog prior.
pub const DEFAULT_PRIOR_MEAN: f64 = 200.0;

/// EMA learning rate.
pub const EMA_ALPHA: f64 = 0.2;

/// Kalman measurement noise R (g²).
pub const KALMAN_MEASUREMENT_NOISE: f64 = 10.0;
/// Kalman base process noise Q (g²). Empirical.
pub const KALMAN_PROCESS_NOISE: f64 = 30.0;
/// Kalman initial variance P₀ (g²).
pub const KALMAN_INITIAL_VARIANCE: f64 = 1000.0;
/// Error magnitude (g) above which process noise is boosted.
pub const KALMAN_ERROR_THRESHOLD: f64 = 5.0;
/// Cap on the process-noise boost multiplier.
pub const KALMAN_MAX_Q_BOOST: f64 = 10.0;
/// Error scale (g) for adaptive gain blending: γ = min(1, 0.5 + |e|/scale).
pub const KALMAN_GAIN_BLEND_SCALE: f64 = 50.0;

/// Bayesian measurement noise σ² (g²). Empirical: chosen from several hand-tuned
/// (noise, prior mean, prior variance) triples as the one that neither collapsed nor
/// under-fit on simulated data.
pub const BAYES_MEASUREMENT_NOISE: f64 = 1200.0;
/// Bayesian prior variance for a newly seen product (g²). Empirical.
pub const BAYES_PRIOR_VARIANCE: f64 = 200.0;
/// Smoothing constant k in the sample factor n / (n + k).
pub const BAYES_CONFIDENCE_SMOOTHING: f64 = 10.0;

/// Prior probability that an order is complete.
pub const PRIOR_COMPLETE: f64 = 0.9;
/// Report an order as complete when P(missing | y) falls below this.
pub const MISSING_PROBABILITY_THRESHOLD: f64 = 0.05;
/// Number of missing-item candidates reported.
pub const TOP_MISSING_CANDIDATES: usize = 3;

/// Evaluator convergence tolerance (g).
pub const CONVERGENCE_ERROR_THRESHOLD: f64 = 5.0;

/// Order verification threshold in tolerance-sigmas.
pub const VERIFICATION_SIGMA_THRESHOLD: f64 = 3.0;
/// Relative weight tolerance defining one verification sigma.
pub const VERIFICATION_RELATIVE_TOLERANCE: f64 = 0.05;

/// Confidence score above which a product is HIGH.
pub const HIGH_CONFIDENCE_SCORE: f64 = 0.8;
/// Confidence score above which a product is MEDIUM.
pub const MEDIUM_CONFIDENCE_SCORE: f64 = 0.5;

/// z-value for a 95% credible interval.
pub const CREDIBLE_Z_95: f64 = 1.96;
