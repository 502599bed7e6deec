//! Shared vocabulary of the catalog consistency harness.
//!
//! Provides the store and API representations of products and categories,
//! the canonical snapshot both are normalized into, the harness error
//! taxonomy, and configuration loading.

pub mod config;
pub mod error;
pub mod model;
pub mod snapshot;

pub use config::HarnessConfig;
pub use error::{FailureKind, HarnessError, Result};
pub use model::{Category, CategoryDto, EntityKind, Product, ProductDto, SeededCategory};
pub use snapshot::{EntitySnapshot, FieldDiff};
