//! Bayesian completeness classification.
//!
//! Given the expected composition of an order and its scale reading, compare
//! H0 ("everything is in the bag") against Hᵢ ("one unit of product i is missing")
//! using the posterior predictive of each hypothesis:
//!
//! ```text
//! y | H ~ N(x_Hᵀμ, x_HᵀΣx_H + σ²)
//! ```
//!
//! Priors: P(H0) = prior_complete, P(Hᵢ) = (1 − prior_complete) / n_products.
//! Posteriors are normalized in log space so very unlikely hypotheses do not underflow.

use serde::{Deserialize, Serialize};

use super::BayesianRegressionEstimator;
use crate::errors::{Error, InvalidOrderReason, Result};
use crate::types::{Order, ProductId};

/// One "this product is missing" hypothesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingCandidate {
    pub product_id: ProductId,
    /// Posterior probability of this hypothesis
    pub probability: f64,
    /// Expected reading with one unit of this product removed (g)
    pub predicted_weight_if_missing: f64,
}

/// Outcome of [`BayesianRegressionEstimator::classify`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletenessReport {
    pub measured_weight: f64,
    /// Predictive mean under H0 (g)
    pub predicted_weight: f64,
    /// Predictive variance under H0, including measurement noise (g²)
    pub predicted_variance: f64,
    pub prob_complete: f64,
    pub prob_missing: f64,
    /// Ranked candidates; empty when the order is judged complete
    pub top_missing_candidates: Vec<MissingCandidate>,
}

impl CompletenessReport {
    pub fn is_complete(&self) -> bool {
        self.top_missing_candidates.is_empty()
    }

    /// Most likely missing product, if any.
    pub fn most_likely_missing(&self) -> Option<&MissingCandidate> {
        self.top_missing_candidates.first()
    }
}

fn log_normal_pdf(y: f64, mean: f64, variance: f64) -> f64 {
    -0.5 * (2.0 * std::f64::consts::PI * variance).ln() - (y - mean).powi(2) / (2.0 * variance)
}

impl BayesianRegressionEstimator {
    /// Classify an order as complete or missing one unit of some product.
    ///
    /// `order` lists the expected items; missing flags on it are ignored. Never mutates state.
    /// A reading so far from every hypothesis that all likelihoods underflow is reported as
    /// [`Error::NumericDegeneracy`].
    pub fn classify(&self, order: &Order, measured_weight: f64) -> Result<CompletenessReport> {
        order.validate_structure()?;
        if !measured_weight.is_finite() {
            return Err(InvalidOrderReason::NonFiniteWeight.into());
        }

        let classifier = &self.config().classifier;
        let noise = self.config().measurement_noise;

        let expected: Vec<(ProductId, f64)> = order
            .items
            .iter()
            .map(|item| (item.product_id.clone(), item.quantity as f64))
            .collect();

        let (predicted_weight, parameter_variance) = self.linear_prediction(&expected);
        let predicted_variance = parameter_variance + noise;

        let n_products = expected.len() as f64;
        let log_prior_complete = classifier.prior_complete.ln();
        let log_prior_missing = ((1.0 - classifier.prior_complete) / n_products).ln();

        let log_complete = log_prior_complete
            + log_normal_pdf(measured_weight, predicted_weight, predicted_variance);

        let alternatives: Vec<(ProductId, f64, f64)> = order
            .items
            .iter()
            .enumerate()
            .map(|(i, missing_item)| {
                let product_id = &missing_item.product_id;
                let reduced: Vec<(ProductId, f64)> = order
                    .items
                    .iter()
                    .enumerate()
                    .map(|(j, item)| {
                        let present = if i == j {
                            item.clone().with_missing().present_quantity()
                        } else {
                            item.quantity
                        };
                        (item.product_id.clone(), present as f64)
                    })
                    .filter(|(_, q)| *q > 0.0)
                    .collect();
                let (mean, variance) = self.linear_prediction(&reduced);
                let log_posterior =
                    log_prior_missing + log_normal_pdf(measured_weight, mean, variance + noise);
                (product_id.clone(), mean, log_posterior)
            })
            .collect();

        let max_log = alternatives
            .iter()
            .map(|(_, _, lp)| *lp)
            .fold(log_complete, f64::max);
        if !max_log.is_finite() {
            // every hypothesis underflowed; the posterior is undefined
            return Err(Error::degenerate("classification likelihood", expected.len()));
        }
        let normalizer = (log_complete - max_log).exp()
            + alternatives
                .iter()
                .map(|(_, _, lp)| (lp - max_log).exp())
                .sum::<f64>();

        let prob_complete = (log_complete - max_log).exp() / normalizer;
        if !prob_complete.is_finite() {
            return Err(Error::degenerate("classification likelihood", expected.len()));
        }
        let prob_missing = (1.0 - prob_complete).max(0.0);

        let top_missing_candidates = if prob_missing < classifier.missing_threshold {
            Vec::new()
        } else {
            let mut candidates: Vec<MissingCandidate> = alternatives
                .into_iter()
                .map(|(product_id, mean, lp)| MissingCandidate {
                    product_id,
                    probability: (lp - max_log).exp() / normalizer,
                    predicted_weight_if_missing: mean,
                })
                .collect();
            candidates.sort_by(|a, b| b.probability.total_cmp(&a.probability));
            candidates.truncate(classifier.top_k);
            candidates
        };

        tracing::debug!(
            measured_weight,
            predicted_weight,
            prob_complete,
            candidates = top_missing_candidates.len(),
            "Order classified"
        );

        Ok(CompletenessReport {
            measured_weight,
            predicted_weight,
            predicted_variance,
            prob_complete,
            prob_missing,
            top_missing_candidates,
        })
    }
}
