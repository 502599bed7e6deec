//! Store rows and API bodies for products and categories.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which entity a value, snapshot or error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Product,
    Category,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Product => write!(f, "product"),
            EntityKind::Category => write!(f, "category"),
        }
    }
}

/// Row of the `categories` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub title: String,
}

/// Row of the `products` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub title: String,
    pub price: i64,
    /// Foreign key into `categories`
    pub category_id: i64,
}

/// Product as exchanged with the REST service.
///
/// `id` is left out of the body when unset so create requests never carry
/// one by accident. The other fields serialize as `null` when unset, which
/// is how malformed writes are expressed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub price: Option<i64>,
    #[serde(default)]
    pub category_title: Option<String>,
}

impl ProductDto {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_price(mut self, price: i64) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_category_title(mut self, category_title: impl Into<String>) -> Self {
        self.category_title = Some(category_title.into());
        self
    }
}

/// Category as returned by `GET /categories/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryDto {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub title: Option<String>,
    /// Products filed under the category
    #[serde(default)]
    pub products: Vec<ProductDto>,
}

/// Categories the service is provisioned with before any test runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeededCategory {
    Food,
    Furniture,
}

impl SeededCategory {
    pub const ALL: [SeededCategory; 2] = [SeededCategory::Food, SeededCategory::Furniture];

    pub fn id(self) -> i64 {
        match self {
            SeededCategory::Food => 1,
            SeededCategory::Furniture => 2,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            SeededCategory::Food => "Food",
            SeededCategory::Furniture => "Furniture",
        }
    }
}
