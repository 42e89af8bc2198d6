//! Convergence evaluation: how many orders until each product estimate is within
//! tolerance of its ground-truth mean.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::EvaluationConfig;
use crate::estimator::{UpdateOutcome, WeightEstimator};
use crate::types::{Order, ProductCatalog, ProductId};

/// Per-estimator convergence summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceReport {
    pub estimator_name: String,
    pub orders_processed: usize,
    /// 1-based order index at which each product first came within tolerance
    pub per_product_convergence_order: BTreeMap<ProductId, Option<usize>>,
    pub converged_count: usize,
    pub mean_convergence_order: Option<f64>,
    /// Orders rejected by the learning preconditions
    pub ignored_updates: usize,
    /// Updates rejected for numeric reasons (degeneracy or non-finite state)
    pub degenerate_updates: usize,
}

impl ConvergenceReport {
    pub fn product_count(&self) -> usize {
        self.per_product_convergence_order.len()
    }

    pub fn all_converged(&self) -> bool {
        self.converged_count == self.product_count()
    }

    /// Ranking score, lower is better.
    ///
    /// Mean convergence order over all tracked products, counting a product that never
    /// converged as `orders_processed + 1`. `None` when nothing converged.
    pub fn score(&self) -> Option<f64> {
        if self.converged_count == 0 {
            return None;
        }
        let penalty = (self.orders_processed + 1) as f64;
        let total: f64 = self
            .per_product_convergence_order
            .values()
            .map(|order| order.map_or(penalty, |n| n as f64))
            .sum();
        Some(total / self.product_count() as f64)
    }
}

/// Ground-truth per-unit means from a catalog.
pub fn ground_truth<C: ProductCatalog + ?Sized>(catalog: &C) -> BTreeMap<ProductId, f64> {
    catalog
        .products()
        .iter()
        .map(|p| (p.id.clone(), p.true_mean()))
        .collect()
}

/// Replays order sequences through estimators and records convergence.
#[derive(Debug, Clone, Default)]
pub struct ConvergenceEvaluator {
    config: EvaluationConfig,
}

impl ConvergenceEvaluator {
    pub fn new(config: EvaluationConfig) -> Self {
        Self { config }
    }

    /// Reset `estimator`, replay `orders` and report per-product convergence.
    ///
    /// Stops early once every product in `truth` has converged. Numeric failures are
    /// counted and logged; evaluation continues.
    pub fn evaluate(
        &self,
        estimator: &mut dyn WeightEstimator,
        orders: &[Order],
        truth: &BTreeMap<ProductId, f64>,
    ) -> ConvergenceReport {
        estimator.reset();

        let mut convergence: BTreeMap<ProductId, Option<usize>> =
            truth.keys().map(|id| (id.clone(), None)).collect();
        let mut converged_count = 0;
        let mut orders_processed = 0;
        let mut ignored_updates = 0;
        let mut degenerate_updates = 0;

        for (index, order) in orders.iter().enumerate() {
            if converged_count == convergence.len() {
                break;
            }
            let order_number = index + 1;
            orders_processed = order_number;

            match estimator.update(order, order.measured_weight) {
                Ok(UpdateOutcome::Applied) => {}
                Ok(UpdateOutcome::Ignored(_)) => ignored_updates += 1,
                Ok(UpdateOutcome::NonFinite) => degenerate_updates += 1,
                Err(e) => {
                    tracing::warn!(order = order_number, error = %e, "Update failed during evaluation");
                    degenerate_updates += 1;
                }
            }

            for (product_id, converged_at) in convergence.iter_mut() {
                if converged_at.is_some() || estimator.observation_count(product_id) == 0 {
                    continue;
                }
                let error = (estimator.infer_item_weight(product_id) - truth[product_id]).abs();
                if error < self.config.error_threshold {
                    *converged_at = Some(order_number);
                    converged_count += 1;
                }
            }
        }

        let mean_convergence_order = if converged_count > 0 {
            let sum: usize = convergence.values().flatten().sum();
            Some(sum as f64 / converged_count as f64)
        } else {
            None
        };

        let report = ConvergenceReport {
            estimator_name: estimator.name(),
            orders_processed,
            per_product_convergence_order: convergence,
            converged_count,
            mean_convergence_order,
            ignored_updates,
            degenerate_updates,
        };

        tracing::info!(
            estimator = %report.estimator_name,
            orders = report.orders_processed,
            converged = report.converged_count,
            products = report.product_count(),
            mean_order = ?report.mean_convergence_order,
            "Convergence evaluation complete"
        );
        report
    }

    /// Evaluate every estimator on the same orders and rank by [`ConvergenceReport::score`].
    ///
    /// Each estimator is reset first, so no state leaks between runs.
    pub fn evaluate_all(
        &self,
        estimators: &mut [Box<dyn WeightEstimator>],
        orders: &[Order],
        truth: &BTreeMap<ProductId, f64>,
    ) -> Vec<ConvergenceReport> {
        let mut reports: Vec<ConvergenceReport> = estimators
            .iter_mut()
            .map(|estimator| self.evaluate(estimator.as_mut(), orders, truth))
            .collect();

        reports.sort_by(|a, b| match (a.score(), b.score()) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        reports
    }
}
