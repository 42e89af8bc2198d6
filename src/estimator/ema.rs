//! Exponential-moving-average weight estimator.
//!
//! The order error is shared equally per unit across every item, and each product's
//! estimate moves by α times that share. Cheap and robust, but an item that always ships
//! together with a heavy partner inherits part of the partner's error.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{ConfidenceStatus, OrderWeightEstimate, UpdateOutcome, WeightEstimator};
use crate::config::EmaConfig;
use crate::errors::Result;
use crate::types::{Order, PriorTable, ProductId};

/// Learned state for one product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmaProductState {
    /// Per-unit weight estimate (g)
    pub estimate: f64,
    pub observation_count: u64,
    /// Confidence score in [0, 1] from the latest update
    pub confidence_score: f64,
    /// EWMA of squared per-unit errors (g²)
    pub error_variance: f64,
}

/// Snapshot of all EMA state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmaState {
    pub products: BTreeMap<ProductId, EmaProductState>,
}

/// EMA estimator with equal per-unit error attribution.
#[derive(Debug, Clone)]
pub struct EmaEstimator {
    config: EmaConfig,
    priors: PriorTable,
    state: EmaState,
}

impl EmaEstimator {
    pub fn new(config: EmaConfig, priors: PriorTable) -> Self {
        Self {
            config,
            priors,
            state: EmaState::default(),
        }
    }

    pub fn state(&self) -> &EmaState {
        &self.state
    }

    pub fn config(&self) -> &EmaConfig {
        &self.config
    }

    fn estimate(&self, product_id: &ProductId) -> f64 {
        self.state
            .products
            .get(product_id)
            .map(|p| p.estimate)
            .unwrap_or_else(|| self.priors.mean_for(product_id))
    }

    fn item_variance(&self, product_id: &ProductId) -> f64 {
        self.state
            .products
            .get(product_id)
            .map(|p| p.error_variance)
            .unwrap_or(self.config.prior_variance)
    }

    /// Next state for one product given this order's per-unit error.
    fn advance(&self, product_id: &ProductId, error_per_unit: f64) -> EmaProductState {
        let (estimate, count, variance) = match self.state.products.get(product_id) {
            Some(p) => (p.estimate, p.observation_count, p.error_variance),
            None => (
                self.priors.mean_for(product_id),
                0,
                self.config.prior_variance,
            ),
        };

        let new_estimate = estimate + self.config.alpha * error_per_unit;
        let observation_count = count + 1;

        let count_factor = (observation_count as f64 / self.config.confidence_saturation).min(1.0);
        let error_factor = 1.0 - (error_per_unit / new_estimate).abs();
        let confidence_score = (count_factor * error_factor).clamp(0.0, 1.0);

        let decay = self.config.error_variance_decay;
        let error_variance = decay * variance + (1.0 - decay) * error_per_unit.powi(2);

        EmaProductState {
            estimate: new_estimate,
            observation_count,
            confidence_score,
            error_variance,
        }
    }
}

impl WeightEstimator for EmaEstimator {
    fn name(&self) -> String {
        format!("EMA (alpha={})", self.config.alpha)
    }

    fn infer_item_weight(&self, product_id: &ProductId) -> f64 {
        self.estimate(product_id)
    }

    fn infer_order_weight(&self, order: &Order) -> OrderWeightEstimate {
        order
            .items
            .iter()
            .fold(OrderWeightEstimate { weight: 0.0, variance: 0.0 }, |acc, item| {
                let q = item.quantity as f64;
                OrderWeightEstimate {
                    weight: acc.weight + self.estimate(&item.product_id) * q,
                    variance: acc.variance + self.item_variance(&item.product_id) * q * q,
                }
            })
    }

    fn update(&mut self, order: &Order, measured_weight: f64) -> Result<UpdateOutcome> {
        if let Some(reason) = order.learning_rejection(measured_weight) {
            tracing::debug!(%reason, "EMA update ignored");
            return Ok(UpdateOutcome::Ignored(reason));
        }

        let total_units = order.total_quantity() as f64;
        let predicted: f64 = order
            .items
            .iter()
            .map(|item| self.estimate(&item.product_id) * item.quantity as f64)
            .sum();
        let error_per_unit = (measured_weight - predicted) / total_units;

        let candidates: Vec<(ProductId, EmaProductState)> = order
            .items
            .iter()
            .map(|item| (item.product_id.clone(), self.advance(&item.product_id, error_per_unit)))
            .collect();

        let all_finite = candidates.iter().all(|(_, s)| {
            s.estimate.is_finite() && s.confidence_score.is_finite() && s.error_variance.is_finite()
        });
        if !all_finite {
            tracing::warn!(
                measured_weight,
                predicted,
                "EMA update produced non-finite state, skipped"
            );
            return Ok(UpdateOutcome::NonFinite);
        }

        for (product_id, next) in candidates {
            tracing::debug!(
                product = %product_id,
                estimate = next.estimate,
                confidence = next.confidence_score,
                "EMA estimate updated"
            );
            self.state.products.insert(product_id, next);
        }
        Ok(UpdateOutcome::Applied)
    }

    fn observation_count(&self, product_id: &ProductId) -> u64 {
        self.state
            .products
            .get(product_id)
            .map_or(0, |p| p.observation_count)
    }

    fn confidence_status(&self, product_id: &ProductId) -> ConfidenceStatus {
        self.state
            .products
            .get(product_id)
            .map_or(ConfidenceStatus::Learning, |p| {
                ConfidenceStatus::from_score(p.confidence_score)
            })
    }

    fn reset(&mut self) {
        self.state.products.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OrderItem;

    fn estimator() -> EmaEstimator {
        EmaEstimator::new(EmaConfig::default(), PriorTable::default())
    }

    fn single(id: &str, measured: f64) -> Order {
        Order::new(vec![OrderItem::new(id, 1)], measured)
    }

    #[test]
    fn test_single_item_moves_alpha_toward_measurement() {
        let mut ema = estimator();
        let outcome = ema.update(&single("taco", 150.0), 150.0).unwrap();
        assert_eq!(outcome, UpdateOutcome::Applied);

        // 200 + 0.2 · (150 − 200)
        let est = ema.infer_item_weight(&"taco".into());
        assert!((est - 190.0).abs() < 1e-9, "estimate {est}");
        assert_eq!(ema.observation_count(&"taco".into()), 1);
    }

    #[test]
    fn test_single_item_converges() {
        let mut ema = estimator();
        let mut last_gap = f64::INFINITY;
        for _ in 0..80 {
            ema.update(&single("taco", 150.0), 150.0).unwrap();
            let gap = (ema.infer_item_weight(&"taco".into()) - 150.0).abs();
            assert!(gap < last_gap, "gap did not shrink: {gap} >= {last_gap}");
            last_gap = gap;
        }
        assert!(last_gap < 0.01, "did not converge: {last_gap}");
        assert_eq!(ema.confidence_status(&"taco".into()), ConfidenceStatus::High);
    }

    #[test]
    fn test_error_shared_per_unit() {
        let mut ema = estimator();
        let order = Order::new(vec![OrderItem::new("a", 1), OrderItem::new("b", 3)], 1000.0);
        ema.update(&order, 1000.0).unwrap();

        // predicted 800, error 200 over 4 units → +0.2·50 each
        assert!((ema.infer_item_weight(&"a".into()) - 210.0).abs() < 1e-9);
        assert!((ema.infer_item_weight(&"b".into()) - 210.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_order_is_noop() {
        let mut ema = estimator();
        ema.update(&single("a", 180.0), 180.0).unwrap();
        let before = ema.state().clone();

        let order = Order::new(
            vec![OrderItem::new("a", 1), OrderItem::new("b", 1).with_missing()],
            180.0,
        );
        let outcome = ema.update(&order, 180.0).unwrap();
        assert!(matches!(outcome, UpdateOutcome::Ignored(_)));
        assert_eq!(ema.state(), &before);
    }

    #[test]
    fn test_unknown_product_falls_back_to_prior() {
        let ema = EmaEstimator::new(
            EmaConfig::default(),
            PriorTable::default().with_mean("twists", 50.0),
        );
        assert!((ema.infer_item_weight(&"twists".into()) - 50.0).abs() < 1e-12);
        assert_eq!(ema.confidence_status(&"twists".into()), ConfidenceStatus::Learning);

        let estimate = ema.infer_order_weight(&Order::new(vec![OrderItem::new("twists", 2)], 0.0));
        assert!((estimate.weight - 100.0).abs() < 1e-12);
        assert!((estimate.variance - 4.0 * ema.config().prior_variance).abs() < 1e-9);
    }

    #[test]
    fn test_huge_quantities_update_without_overflow() {
        let mut ema = estimator();
        let order = Order::new(
            vec![OrderItem::new("a", u32::MAX), OrderItem::new("b", 2)],
            500.0,
        );
        let outcome = ema.update(&order, 500.0).unwrap();
        assert_eq!(outcome, UpdateOutcome::Applied);
        assert!(ema.infer_item_weight(&"a".into()).is_finite());
    }

    #[test]
    fn test_reset_clears_state() {
        let mut ema = estimator();
        ema.update(&single("a", 120.0), 120.0).unwrap();
        ema.reset();
        assert_eq!(ema.observation_count(&"a".into()), 0);
        assert!((ema.infer_item_weight(&"a".into()) - 200.0).abs() < 1e-12);
    }
}
