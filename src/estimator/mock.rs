//! Mock estimator for testing.

use std::collections::HashMap;

use super::{ConfidenceStatus, OrderWeightEstimate, UpdateOutcome, WeightEstimator};
use crate::errors::Result;
use crate::types::{Order, ProductId};

/// Fixed-weight estimator for testing the evaluator and verifier.
///
/// Returns configured weights, counts updates, never learns.
#[derive(Debug, Clone)]
pub struct MockEstimator {
    pub weights: HashMap<ProductId, f64>,
    pub default_weight: f64,
    pub status: ConfidenceStatus,
    pub updates: u64,
}

impl Default for MockEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEstimator {
    /// Create a mock with every product at 200 g and HIGH confidence.
    pub fn new() -> Self {
        Self {
            weights: HashMap::new(),
            default_weight: crate::consts::DEFAULT_PRIOR_MEAN,
            status: ConfidenceStatus::High,
            updates: 0,
        }
    }

    pub fn with_weight(mut self, product_id: impl Into<ProductId>, weight: f64) -> Self {
        self.weights.insert(product_id.into(), weight);
        self
    }

    pub fn with_status(mut self, status: ConfidenceStatus) -> Self {
        self.status = status;
        self
    }
}

impl WeightEstimator for MockEstimator {
    fn name(&self) -> String {
        "Mock".to_string()
    }

    fn infer_item_weight(&self, product_id: &ProductId) -> f64 {
        self.weights
            .get(product_id)
            .copied()
            .unwrap_or(self.default_weight)
    }

    fn infer_order_weight(&self, order: &Order) -> OrderWeightEstimate {
        let weight = order
            .items
            .iter()
            .map(|item| self.infer_item_weight(&item.product_id) * item.quantity as f64)
            .sum();
        OrderWeightEstimate {
            weight,
            variance: 0.0,
        }
    }

    fn update(&mut self, order: &Order, measured_weight: f64) -> Result<UpdateOutcome> {
        if let Some(reason) = order.learning_rejection(measured_weight) {
            return Ok(UpdateOutcome::Ignored(reason));
        }
        self.updates += 1;
        Ok(UpdateOutcome::Applied)
    }

    fn observation_count(&self, _product_id: &ProductId) -> u64 {
        self.updates
    }

    fn confidence_status(&self, _product_id: &ProductId) -> ConfidenceStatus {
        self.status
    }

    fn reset(&mut self) {
        self.updates = 0;
    }
}
