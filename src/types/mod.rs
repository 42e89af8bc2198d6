//! Shared data model: orders, product ids and catalog priors.

mod catalog;
mod orders;

pub use catalog::*;
pub use orders::*;
