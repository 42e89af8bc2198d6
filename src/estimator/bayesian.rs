//! Joint Bayesian linear regression over all product weights.
//!
//! Model: y = xᵀβ + ε, ε ~ N(0, σ²), with a Gaussian prior β ~ N(μ, Σ), where x holds
//! the quantity of each known product in the order. Each order is one conjugate update:
//!
//! ```text
//! Σ' = (Σ⁻¹ + x xᵀ / σ²)⁻¹
//! μ' = Σ' (Σ⁻¹ μ + x y / σ²)
//! ```
//!
//! Unlike the per-product filters, off-diagonal covariance lets a reading of {A, B}
//! sharpen A + B while leaving A − B uncertain until the products are seen apart.
//!
//! The dimension grows on first sight of a product. The dense matrices are rebuilt on
//! growth, which is fine at catalog scale (tens of products).

use std::collections::{BTreeMap, HashMap};

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use super::{ConfidenceStatus, OrderWeightEstimate, UpdateOutcome, WeightEstimator};
use crate::config::BayesianConfig;
use crate::consts::CREDIBLE_Z_95;
use crate::errors::{Error, Result};
use crate::types::{Order, PriorTable, ProductId};

/// 95% credible interval for one product weight.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CredibleInterval {
    pub mean: f64,
    pub std_dev: f64,
    pub lower: f64,
    pub upper: f64,
}

/// Serializable snapshot of the posterior.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BayesianState {
    /// Known products in matrix order
    pub product_ids: Vec<ProductId>,
    pub mean: Vec<f64>,
    /// Row-major d × d covariance
    pub covariance: Vec<f64>,
    pub observation_counts: BTreeMap<ProductId, u64>,
}

/// Posterior parameters, kept together so an update can be staged and committed at once.
#[derive(Debug, Clone)]
struct Posterior {
    product_ids: Vec<ProductId>,
    index: HashMap<ProductId, usize>,
    mean: DVector<f64>,
    covariance: DMatrix<f64>,
}

impl Posterior {
    fn empty() -> Self {
        Self {
            product_ids: Vec::new(),
            index: HashMap::new(),
            mean: DVector::zeros(0),
            covariance: DMatrix::zeros(0, 0),
        }
    }

    fn dim(&self) -> usize {
        self.product_ids.len()
    }

    /// Append a product with the given prior. No-op if already present.
    fn ensure_product(&mut self, product_id: &ProductId, prior_mean: f64, prior_variance: f64) {
        if self.index.contains_key(product_id) {
            return;
        }
        let d = self.dim();
        let old_mean = &self.mean;
        let old_cov = &self.covariance;

        let mean = DVector::from_fn(d + 1, |i, _| if i < d { old_mean[i] } else { prior_mean });
        let covariance = DMatrix::from_fn(d + 1, d + 1, |i, j| {
            if i < d && j < d {
                old_cov[(i, j)]
            } else if i == j {
                prior_variance
            } else {
                0.0
            }
        });

        self.mean = mean;
        self.covariance = covariance;
        self.index.insert(product_id.clone(), d);
        self.product_ids.push(product_id.clone());
    }

    /// Design vector over the current dimension.
    fn design(&self, units: &[(ProductId, f64)]) -> DVector<f64> {
        let mut x = DVector::zeros(self.dim());
        for (product_id, q) in units {
            if let Some(&i) = self.index.get(product_id) {
                x[i] += q;
            }
        }
        x
    }
}

/// Weight estimator maintaining a joint Gaussian posterior.
#[derive(Debug, Clone)]
pub struct BayesianRegressionEstimator {
    config: BayesianConfig,
    priors: PriorTable,
    posterior: Posterior,
    observation_counts: HashMap<ProductId, u64>,
}

impl BayesianRegressionEstimator {
    pub fn new(config: BayesianConfig, priors: PriorTable) -> Self {
        Self {
            config,
            priors,
            posterior: Posterior::empty(),
            observation_counts: HashMap::new(),
        }
    }

    pub fn config(&self) -> &BayesianConfig {
        &self.config
    }

    /// Number of products in the posterior.
    pub fn dimension(&self) -> usize {
        self.posterior.dim()
    }

    pub fn known_products(&self) -> &[ProductId] {
        &self.posterior.product_ids
    }

    pub fn covariance(&self) -> &DMatrix<f64> {
        &self.posterior.covariance
    }

    pub fn mean(&self) -> &DVector<f64> {
        &self.posterior.mean
    }

    /// Add a product with its prior if not already known. Idempotent.
    pub fn ensure_product(&mut self, product_id: &ProductId) {
        let prior_mean = self.priors.mean_for(product_id);
        self.posterior
            .ensure_product(product_id, prior_mean, self.config.prior_variance);
    }

    pub fn state(&self) -> BayesianState {
        let d = self.dimension();
        let covariance = (0..d)
            .flat_map(|i| (0..d).map(move |j| (i, j)))
            .map(|(i, j)| self.posterior.covariance[(i, j)])
            .collect();
        BayesianState {
            product_ids: self.posterior.product_ids.clone(),
            mean: self.posterior.mean.iter().copied().collect(),
            covariance,
            observation_counts: self
                .observation_counts
                .iter()
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
        }
    }

    /// Posterior (mean, variance) of one product weight; prior for unknown products.
    pub fn marginal(&self, product_id: &ProductId) -> (f64, f64) {
        match self.posterior.index.get(product_id) {
            Some(&i) => (self.posterior.mean[i], self.posterior.covariance[(i, i)]),
            None => (self.priors.mean_for(product_id), self.config.prior_variance),
        }
    }

    /// 95% credible interval, `None` for products never seen.
    pub fn credible_interval(&self, product_id: &ProductId) -> Option<CredibleInterval> {
        let &i = self.posterior.index.get(product_id)?;
        let mean = self.posterior.mean[i];
        let std_dev = self.posterior.covariance[(i, i)].max(0.0).sqrt();
        Some(CredibleInterval {
            mean,
            std_dev,
            lower: mean - CREDIBLE_Z_95 * std_dev,
            upper: mean + CREDIBLE_Z_95 * std_dev,
        })
    }

    /// Confidence score in [0, 1]: variance shrinkage times sample sufficiency.
    pub fn product_confidence(&self, product_id: &ProductId) -> f64 {
        let Some(&i) = self.posterior.index.get(product_id) else {
            return 0.0;
        };
        let variance = self.posterior.covariance[(i, i)];
        let n = self.observation_count(product_id) as f64;
        let variance_factor = 1.0 / (1.0 + variance / self.config.variance_scale());
        let sample_factor = n / (n + self.config.confidence_smoothing);
        (variance_factor * sample_factor).clamp(0.0, 1.0)
    }

    /// Mean and parameter variance of Σ qᵢβᵢ for arbitrary (product, quantity) pairs.
    ///
    /// Known products contribute through the full covariance; unknown ones add their prior
    /// mean and an independent prior variance.
    pub(crate) fn linear_prediction(&self, units: &[(ProductId, f64)]) -> (f64, f64) {
        let x = self.posterior.design(units);
        let mut mean = x.dot(&self.posterior.mean);
        let mut variance = x.dot(&(&self.posterior.covariance * &x));

        for (product_id, q) in units {
            if !self.posterior.index.contains_key(product_id) {
                mean += q * self.priors.mean_for(product_id);
                variance += q * q * self.config.prior_variance;
            }
        }
        (mean, variance)
    }

    /// Stage the conjugate update on a copy of the posterior.
    fn staged_update(&self, order: &Order, measured_weight: f64) -> Result<Posterior> {
        let mut next = self.posterior.clone();
        for item in &order.items {
            next.ensure_product(
                &item.product_id,
                self.priors.mean_for(&item.product_id),
                self.config.prior_variance,
            );
        }
        let d = next.dim();

        let units: Vec<(ProductId, f64)> = order
            .items
            .iter()
            .map(|item| (item.product_id.clone(), item.quantity as f64))
            .collect();
        let x = next.design(&units);
        let noise = self.config.measurement_noise;

        let prior_chol = next
            .covariance
            .clone()
            .cholesky()
            .ok_or_else(|| Error::degenerate("prior covariance factorization", d))?;
        let prior_precision = prior_chol.inverse();

        let precision = &prior_precision + (&x * x.transpose()) / noise;
        let rhs = &prior_precision * &next.mean + &x * (measured_weight / noise);

        let post_chol = precision
            .cholesky()
            .ok_or_else(|| Error::degenerate("posterior precision factorization", d))?;
        let covariance = post_chol.inverse();
        let mean = post_chol.solve(&rhs);

        // Relative asymmetry check before symmetrizing away round-off
        let scale = covariance.amax().max(f64::MIN_POSITIVE);
        let asymmetry = (&covariance - covariance.transpose()).amax() / scale;
        if !(asymmetry <= self.config.symmetry_tolerance) {
            return Err(Error::degenerate("covariance symmetry", d));
        }
        let covariance = (&covariance + covariance.transpose()) * 0.5;

        if !mean.iter().all(|v| v.is_finite()) || !covariance.iter().all(|v| v.is_finite()) {
            return Err(Error::degenerate("non-finite posterior", d));
        }
        if covariance.clone().cholesky().is_none() {
            return Err(Error::degenerate("posterior positive-definiteness", d));
        }

        next.mean = mean;
        next.covariance = covariance;
        Ok(next)
    }
}

impl WeightEstimator for BayesianRegressionEstimator {
    fn name(&self) -> String {
        format!(
            "Bayesian Regression (noise={}, prior_var={})",
            self.config.measurement_noise, self.config.prior_variance
        )
    }

    fn infer_item_weight(&self, product_id: &ProductId) -> f64 {
        self.marginal(product_id).0
    }

    /// Parameter uncertainty only (xᵀΣx); the classifier adds σ² for the predictive.
    fn infer_order_weight(&self, order: &Order) -> OrderWeightEstimate {
        let units: Vec<(ProductId, f64)> = order
            .items
            .iter()
            .map(|item| (item.product_id.clone(), item.quantity as f64))
            .collect();
        let (weight, variance) = self.linear_prediction(&units);
        OrderWeightEstimate { weight, variance }
    }

    fn update(&mut self, order: &Order, measured_weight: f64) -> Result<UpdateOutcome> {
        if let Some(reason) = order.learning_rejection(measured_weight) {
            tracing::debug!(%reason, "Bayesian update ignored");
            return Ok(UpdateOutcome::Ignored(reason));
        }

        let next = match self.staged_update(order, measured_weight) {
            Ok(next) => next,
            Err(e) => {
                tracing::warn!(error = %e, measured_weight, "Bayesian update rejected, posterior unchanged");
                return Err(e);
            }
        };

        self.posterior = next;
        for item in &order.items {
            *self
                .observation_counts
                .entry(item.product_id.clone())
                .or_insert(0) += u64::from(item.quantity);
        }

        tracing::debug!(
            dimension = self.dimension(),
            measured_weight,
            "Bayesian posterior updated"
        );
        Ok(UpdateOutcome::Applied)
    }

    fn observation_count(&self, product_id: &ProductId) -> u64 {
        self.observation_counts.get(product_id).copied().unwrap_or(0)
    }

    fn confidence_status(&self, product_id: &ProductId) -> ConfidenceStatus {
        ConfidenceStatus::from_score(self.product_confidence(product_id))
    }

    fn reset(&mut self) {
        self.posterior = Posterior::empty();
        self.observation_counts.clear();
    }
}
