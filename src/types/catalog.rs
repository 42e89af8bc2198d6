//! Product catalog types and the prior table estimators read from.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::orders::ProductId;

/// A sellable product with its static weight knowledge.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    #[serde(default)]
    pub name: String,
    /// Expected per-unit weight range [min, max] in grams
    #[serde(alias = "trueRange")]
    pub expected_range: (f64, f64),
    /// Ground-truth mean weight, when known (used by the evaluator)
    #[serde(default)]
    pub mean_weight: Option<f64>,
}

impl Product {
    pub fn new(id: impl Into<ProductId>, expected_range: (f64, f64)) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            expected_range,
            mean_weight: None,
        }
    }

    /// Midpoint of the expected range.
    pub fn range_midpoint(&self) -> f64 {
        (self.expected_range.0 + self.expected_range.1) / 2.0
    }

    /// Ground-truth mean, falling back to the range midpoint.
    pub fn true_mean(&self) -> f64 {
        self.mean_weight.unwrap_or_else(|| self.range_midpoint())
    }
}

/// Source of static per-product prior knowledge.
///
/// Implemented by whatever owns the product list; the estimators only consume it.
pub trait ProductCatalog {
    /// All products known to the catalog.
    fn products(&self) -> &[Product];

    /// Look up a single product.
    fn product(&self, id: &ProductId) -> Option<&Product> {
        self.products().iter().find(|p| &p.id == id)
    }
}

impl ProductCatalog for Vec<Product> {
    fn products(&self) -> &[Product] {
        self
    }
}

impl ProductCatalog for [Product] {
    fn products(&self) -> &[Product] {
        self
    }
}

/// Prior mean per product, with a neutral default for anything uncatalogued.
///
/// Estimators use this for never-observed products and to seed new state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorTable {
    default_mean: f64,
    means: HashMap<ProductId, f64>,
}

impl PriorTable {
    /// Table with only a default mean.
    pub fn new(default_mean: f64) -> Self {
        Self {
            default_mean,
            means: HashMap::new(),
        }
    }

    /// Seed from a catalog: each product's prior is the midpoint of its expected range.
    pub fn from_catalog<C: ProductCatalog + ?Sized>(catalog: &C, default_mean: f64) -> Self {
        let means = catalog
            .products()
            .iter()
            .filter(|p| p.range_midpoint().is_finite())
            .map(|p| (p.id.clone(), p.range_midpoint()))
            .collect();
        Self {
            default_mean,
            means,
        }
    }

    /// Register or override a single product prior.
    pub fn with_mean(mut self, id: impl Into<ProductId>, mean: f64) -> Self {
        self.means.insert(id.into(), mean);
        self
    }

    pub fn mean_for(&self, id: &ProductId) -> f64 {
        self.means.get(id).copied().unwrap_or(self.default_mean)
    }

    pub fn default_mean(&self) -> f64 {
        self.default_mean
    }

    pub fn len(&self) -> usize {
        self.means.len()
    }

    pub fn is_empty(&self) -> bool {
        self.means.is_empty()
    }
}

impl Default for PriorTable {
    fn default() -> Self {
        Self::new(crate::consts::DEFAULT_PRIOR_MEAN)
    }
}
