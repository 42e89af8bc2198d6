//! Order verification against any estimator.
//!
//! An order verifies when every item's estimate is trusted (MEDIUM or HIGH) and the scale
//! reading lies within `sigma_threshold` tolerance-sigmas of the inferred total, where one
//! sigma is `relative_tolerance` of the inferred weight.

use serde::{Deserialize, Serialize};

use crate::config::VerificationConfig;
use crate::estimator::{ConfidenceStatus, WeightEstimator};
use crate::types::{Order, ProductId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    /// Weight matches a confident prediction
    Verified,
    /// At least one item is still LEARNING; no judgement made
    LearningInProgress,
    /// Confident prediction, but the reading is out of tolerance
    WeightDiscrepancy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub status: VerificationStatus,
    pub measured_weight: f64,
    pub inferred_weight: f64,
    /// |measured − inferred| in tolerance-sigmas
    pub sigma: f64,
    /// Items whose estimate is still LEARNING
    pub learning_products: Vec<ProductId>,
}

/// Verifies orders with a fixed tolerance policy.
#[derive(Debug, Clone, Default)]
pub struct OrderVerifier {
    config: VerificationConfig,
}

impl OrderVerifier {
    pub fn new(config: VerificationConfig) -> Self {
        Self { config }
    }

    /// Tolerance-sigma distance between the reading and the inferred weight.
    pub fn sigma(&self, measured_weight: f64, inferred_weight: f64) -> f64 {
        let tolerance = inferred_weight * self.config.relative_tolerance;
        if !(tolerance > 0.0) {
            return f64::INFINITY;
        }
        (measured_weight - inferred_weight).abs() / tolerance
    }

    /// Verify `order` (its expected items) against `order.measured_weight`.
    pub fn verify(&self, estimator: &dyn WeightEstimator, order: &Order) -> VerificationResult {
        let inferred_weight = estimator.infer_order_weight(order).weight;
        let measured_weight = order.measured_weight;
        let sigma = self.sigma(measured_weight, inferred_weight);

        let learning_products: Vec<ProductId> = order
            .items
            .iter()
            .filter(|item| {
                estimator.confidence_status(&item.product_id) == ConfidenceStatus::Learning
            })
            .map(|item| item.product_id.clone())
            .collect();

        let status = if !learning_products.is_empty() {
            VerificationStatus::LearningInProgress
        } else if sigma <= self.config.sigma_threshold {
            VerificationStatus::Verified
        } else {
            VerificationStatus::WeightDiscrepancy
        };

        tracing::debug!(
            estimator = %estimator.name(),
            measured_weight,
            inferred_weight,
            sigma,
            ?status,
            "Order verified"
        );

        VerificationResult {
            status,
            measured_weight,
            inferred_weight,
            sigma,
            learning_products,
        }
    }
}
