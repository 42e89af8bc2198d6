//! Order-related types.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::errors::{Error, InvalidOrderReason};

/// Opaque product identifier.
///
/// Uses Arc<str> for cheap cloning into per-product maps.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(Arc<str>);

impl ProductId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProductId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ProductId {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

fn default_quantity() -> u32 {
    1
}

/// A single line of an order.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: ProductId,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    /// One unit was expected but is physically absent from the bag.
    #[serde(default)]
    pub missing: bool,
}

impl OrderItem {
    pub fn new(product_id: impl Into<ProductId>, quantity: u32) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
            missing: false,
        }
    }

    /// Mark one unit of this line as absent.
    pub fn with_missing(mut self) -> Self {
        self.missing = true;
        self
    }

    /// Units that actually contribute to the scale reading.
    ///
    /// A missing flag removes exactly one unit; a single-unit line drops to zero.
    pub fn present_quantity(&self) -> u32 {
        if self.missing {
            self.quantity.saturating_sub(1)
        } else {
            self.quantity
        }
    }
}

/// An order as submitted to the scale: expected items plus one aggregate reading.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub items: Vec<OrderItem>,
    #[serde(default)]
    pub measured_weight: f64,
}

impl Order {
    pub fn new(items: Vec<OrderItem>, measured_weight: f64) -> Self {
        Self {
            items,
            measured_weight,
        }
    }

    /// Whether any line has a missing unit.
    pub fn has_missing_item(&self) -> bool {
        self.items.iter().any(|item| item.missing)
    }

    /// Total number of expected units across all lines.
    pub fn total_quantity(&self) -> u64 {
        self.items.iter().map(|item| u64::from(item.quantity)).sum()
    }

    /// Number of distinct products in the order.
    pub fn product_count(&self) -> usize {
        self.items.len()
    }

    fn structure_rejection(&self) -> Result<(), InvalidOrderReason> {
        if self.items.is_empty() {
            return Err(InvalidOrderReason::Empty);
        }
        let mut seen = HashSet::with_capacity(self.items.len());
        for item in &self.items {
            if item.quantity == 0 {
                return Err(InvalidOrderReason::ZeroQuantity);
            }
            if !seen.insert(&item.product_id) {
                return Err(InvalidOrderReason::DuplicateProduct);
            }
        }
        Ok(())
    }

    fn learning_check(&self, measured_weight: f64) -> Result<(), InvalidOrderReason> {
        self.structure_rejection()?;
        if self.has_missing_item() {
            return Err(InvalidOrderReason::MissingItem);
        }
        if !measured_weight.is_finite() {
            return Err(InvalidOrderReason::NonFiniteWeight);
        }
        if measured_weight <= 0.0 {
            return Err(InvalidOrderReason::NonPositiveWeight);
        }
        Ok(())
    }

    /// Check the structural invariants shared by learning and classification:
    /// non-empty, unique product ids, every quantity at least one.
    pub fn validate_structure(&self) -> Result<(), Error> {
        Ok(self.structure_rejection()?)
    }

    /// Check that this order together with `measured_weight` may be used to update an
    /// estimator.
    pub fn validate_for_learning(&self, measured_weight: f64) -> Result<(), Error> {
        Ok(self.learning_check(measured_weight)?)
    }

    /// Learning-precondition check returning the bare reason.
    pub(crate) fn learning_rejection(&self, measured_weight: f64) -> Option<InvalidOrderReason> {
        self.learning_check(measured_weight).err()
    }
}
