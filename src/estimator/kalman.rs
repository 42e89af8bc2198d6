//! Per-product scalar Kalman filters.
//!
//! Each product carries an independent filter on its per-unit weight:
//! - State equation: w_t = w_{t-1} + η_t, η ~ N(0, Q) (slow drift in recipe/portioning)
//! - Observation: z_t = w_t + ε_t, ε ~ N(0, R)
//!
//! A multi-product order only yields one reading, so z is attributed to each product in
//! proportion to its share of the predicted total before the scalar filters run.
//!
//! Two adaptations on top of the textbook filter:
//! 1. Process noise is boosted when the innovation is large, so a product whose prior is
//!    far off re-opens its variance instead of crawling.
//! 2. The gain is blended by γ = min(1, 0.5 + |e|/scale): small innovations are
//!    half-trusted (noise), large ones fully trusted.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{ConfidenceStatus, OrderWeightEstimate, UpdateOutcome, WeightEstimator};
use crate::config::KalmanConfig;
use crate::errors::Result;
use crate::types::{Order, PriorTable, ProductId};

// ============================================================================
// Scalar filter
// ============================================================================

/// Kalman filter for one product's per-unit weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductWeightFilter {
    /// Posterior mean (g)
    pub x: f64,
    /// Posterior variance (g²)
    pub p: f64,
    pub observation_count: u64,
}

impl ProductWeightFilter {
    pub fn new(initial_weight: f64, initial_variance: f64) -> Self {
        Self {
            x: initial_weight,
            p: initial_variance,
            observation_count: 0,
        }
    }

    /// Filter after absorbing attributed measurement `z`. Does not modify `self`.
    pub fn updated(&self, z: f64, config: &KalmanConfig) -> Self {
        let error = z - self.x;
        let abs_error = error.abs();

        let effective_q = if abs_error > config.error_threshold {
            config.process_noise * (1.0 + abs_error / config.error_threshold).min(config.max_q_boost)
        } else {
            config.process_noise
        };

        // Predict
        let p_prior = self.p + effective_q;

        // Update
        let k = p_prior / (p_prior + config.measurement_noise);
        let gamma = (0.5 + abs_error / config.gain_blend_scale).min(1.0);
        let blended_gain = gamma * k;

        let x = self.x + blended_gain * error;
        let p = ((1.0 - blended_gain) * p_prior).max(config.variance_floor());

        Self {
            x,
            p,
            observation_count: self.observation_count + 1,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.p.is_finite()
    }

    /// Standard deviation of the weight estimate.
    pub fn uncertainty(&self) -> f64 {
        self.p.sqrt()
    }
}

// ============================================================================
// Estimator
// ============================================================================

/// Snapshot of all Kalman state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KalmanState {
    pub filters: BTreeMap<ProductId, ProductWeightFilter>,
}

/// Weight estimator backed by one [`ProductWeightFilter`] per product.
#[derive(Debug, Clone)]
pub struct KalmanEstimator {
    config: KalmanConfig,
    priors: PriorTable,
    state: KalmanState,
}

impl KalmanEstimator {
    pub fn new(config: KalmanConfig, priors: PriorTable) -> Self {
        Self {
            config,
            priors,
            state: KalmanState::default(),
        }
    }

    pub fn state(&self) -> &KalmanState {
        &self.state
    }

    pub fn config(&self) -> &KalmanConfig {
        &self.config
    }

    /// Current filter, or a fresh one seeded from the prior.
    ///
    /// The seed variance is never below [`KalmanConfig::variance_floor`].
    pub fn filter(&self, product_id: &ProductId) -> ProductWeightFilter {
        self.state
            .filters
            .get(product_id)
            .cloned()
            .unwrap_or_else(|| {
                ProductWeightFilter::new(
                    self.priors.mean_for(product_id),
                    self.config.initial_variance.max(self.config.variance_floor()),
                )
            })
    }

    fn status_of(&self, filter: &ProductWeightFilter) -> ConfidenceStatus {
        if filter.observation_count < self.config.min_observations {
            ConfidenceStatus::Learning
        } else if filter.p > self.config.medium_variance {
            ConfidenceStatus::Medium
        } else {
            ConfidenceStatus::High
        }
    }

    /// Per-unit variance used for order inference, floored by confidence band.
    fn inference_variance(&self, filter: &ProductWeightFilter) -> f64 {
        let floors = &self.config.variance_floors;
        let floor = if self.status_of(filter) == ConfidenceStatus::Learning {
            floors.learning
        } else if filter.p > floors.medium_above {
            floors.medium
        } else {
            floors.settled
        };
        filter.p.max(floor)
    }

    /// Attributed per-unit measurement for each line of a learning order.
    fn attribute(&self, order: &Order, measured_weight: f64) -> Vec<(ProductId, f64)> {
        if let [item] = order.items.as_slice() {
            return vec![(item.product_id.clone(), measured_weight / item.quantity as f64)];
        }

        let predicted_total: f64 = order
            .items
            .iter()
            .map(|item| self.filter(&item.product_id).x * item.quantity as f64)
            .sum();

        if predicted_total > 0.0 {
            order
                .items
                .iter()
                .map(|item| {
                    let x = self.filter(&item.product_id).x;
                    (item.product_id.clone(), x * measured_weight / predicted_total)
                })
                .collect()
        } else {
            let per_unit = measured_weight / order.total_quantity() as f64;
            order
                .items
                .iter()
                .map(|item| (item.product_id.clone(), per_unit))
                .collect()
        }
    }
}

impl WeightEstimator for KalmanEstimator {
    fn name(&self) -> String {
        format!(
            "Kalman (R={}, Q={})",
            self.config.measurement_noise, self.config.process_noise
        )
    }

    fn infer_item_weight(&self, product_id: &ProductId) -> f64 {
        self.filter(product_id).x
    }

    fn infer_order_weight(&self, order: &Order) -> OrderWeightEstimate {
        let mut weight = 0.0;
        let mut variance = 0.0;
        for item in &order.items {
            let filter = self.filter(&item.product_id);
            let q = item.quantity as f64;
            weight += filter.x * q;
            variance += q * q * self.inference_variance(&filter);
        }
        OrderWeightEstimate { weight, variance }
    }

    fn update(&mut self, order: &Order, measured_weight: f64) -> Result<UpdateOutcome> {
        if let Some(reason) = order.learning_rejection(measured_weight) {
            tracing::debug!(%reason, "Kalman update ignored");
            return Ok(UpdateOutcome::Ignored(reason));
        }

        let mut candidates = Vec::with_capacity(order.items.len());
        for (product_id, z) in self.attribute(order, measured_weight) {
            if !(z > 0.0 && z.is_finite()) {
                tracing::debug!(product = %product_id, z, "Non-positive attributed measurement skipped");
                continue;
            }
            let next = self.filter(&product_id).updated(z, &self.config);
            candidates.push((product_id, next));
        }

        if !candidates.iter().all(|(_, f)| f.is_finite()) {
            tracing::warn!(measured_weight, "Kalman update produced non-finite state, skipped");
            return Ok(UpdateOutcome::NonFinite);
        }

        for (product_id, next) in candidates {
            tracing::debug!(
                product = %product_id,
                x = next.x,
                p = next.p,
                n = next.observation_count,
                "Kalman filter updated"
            );
            self.state.filters.insert(product_id, next);
        }
        Ok(UpdateOutcome::Applied)
    }

    fn observation_count(&self, product_id: &ProductId) -> u64 {
        self.state
            .filters
            .get(product_id)
            .map_or(0, |f| f.observation_count)
    }

    fn confidence_status(&self, product_id: &ProductId) -> ConfidenceStatus {
        self.state
            .filters
            .get(product_id)
            .map_or(ConfidenceStatus::Learning, |f| self.status_of(f))
    }

    fn reset(&mut self) {
        self.state.filters.clear();
    }
}
