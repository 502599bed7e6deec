//! Canonical snapshots: the normalized `{id, title, price, category_title}`
//! view both the API and the store are translated into before comparison.

use std::fmt::Display;

use serde::Serialize;

use crate::error::{HarnessError, Result};
use crate::model::{Category, CategoryDto, EntityKind, Product, ProductDto};

/// Normalized view of a product or category.
///
/// Products always carry `price` and `category_title`; categories carry
/// neither.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntitySnapshot {
    pub kind: EntityKind,
    pub id: i64,
    pub title: String,
    pub price: Option<i64>,
    pub category_title: Option<String>,
}

/// One field that differs between an expected and an actual snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldDiff {
    pub field: String,
    pub expected: String,
    pub actual: String,
}

impl FieldDiff {
    fn new(field: &str, expected: impl Display, actual: impl Display) -> Self {
        Self {
            field: field.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Converts the diff into a `FieldMismatch` error.
    pub fn to_error(&self) -> HarnessError {
        HarnessError::FieldMismatch {
            field: self.field.clone(),
            expected: self.expected.clone(),
            actual: self.actual.clone(),
        }
    }
}

impl EntitySnapshot {
    pub fn product(
        id: i64,
        title: impl Into<String>,
        price: i64,
        category_title: impl Into<String>,
    ) -> Self {
        Self {
            kind: EntityKind::Product,
            id,
            title: title.into(),
            price: Some(price),
            category_title: Some(category_title.into()),
        }
    }

    pub fn category(id: i64, title: impl Into<String>) -> Self {
        Self {
            kind: EntityKind::Category,
            id,
            title: title.into(),
            price: None,
            category_title: None,
        }
    }

    /// Builds a product snapshot from an API body.
    ///
    /// # Errors
    /// `ProtocolViolation` if any canonical field is missing.
    pub fn from_product_dto(dto: &ProductDto) -> Result<Self> {
        let missing = |field: &str| {
            HarnessError::ProtocolViolation(format!("product body is missing '{}'", field))
        };
        let id = dto.id.ok_or_else(|| missing("id"))?;
        let title = dto.title.clone().ok_or_else(|| missing("title"))?;
        let price = dto.price.ok_or_else(|| missing("price"))?;
        let category_title = dto
            .category_title
            .clone()
            .ok_or_else(|| missing("categoryTitle"))?;
        Ok(Self::product(id, title, price, category_title))
    }

    /// Builds a category snapshot from an API body.
    pub fn from_category_dto(dto: &CategoryDto) -> Result<Self> {
        let id = dto.id.ok_or_else(|| {
            HarnessError::ProtocolViolation("category body is missing 'id'".to_string())
        })?;
        let title = dto.title.clone().ok_or_else(|| {
            HarnessError::ProtocolViolation("category body is missing 'title'".to_string())
        })?;
        Ok(Self::category(id, title))
    }

    /// Builds a product snapshot from a store row, resolving its category
    /// reference to a title.
    ///
    /// # Errors
    /// `InconsistentState` if the referenced category does not exist.
    pub fn from_product_row(product: &Product, category: Option<&Category>) -> Result<Self> {
        match category {
            Some(category) if category.id == product.category_id => Ok(Self::product(
                product.id,
                product.title.clone(),
                product.price,
                category.title.clone(),
            )),
            _ => Err(HarnessError::InconsistentState {
                entity: EntityKind::Product,
                id: product.id,
                detail: format!(
                    "category_id {} does not resolve to a category",
                    product.category_id
                ),
            }),
        }
    }

    pub fn from_category_row(category: &Category) -> Self {
        Self::category(category.id, category.title.clone())
    }

    /// Compares `self` (expected) against `actual`, field by field.
    ///
    /// Returns an empty vector when the snapshots agree.
    pub fn diff(&self, actual: &EntitySnapshot) -> Vec<FieldDiff> {
        let mut diffs = Vec::new();
        if self.kind != actual.kind {
            diffs.push(FieldDiff::new("kind", self.kind, actual.kind));
        }
        if self.id != actual.id {
            diffs.push(FieldDiff::new("id", self.id, actual.id));
        }
        if self.title != actual.title {
            diffs.push(FieldDiff::new("title", &self.title, &actual.title));
        }
        if self.price != actual.price {
            diffs.push(FieldDiff::new(
                "price",
                render(&self.price),
                render(&actual.price),
            ));
        }
        if self.category_title != actual.category_title {
            diffs.push(FieldDiff::new(
                "category_title",
                render(&self.category_title),
                render(&actual.category_title),
            ));
        }
        diffs
    }

    /// Same values under a different id; used when the id is assigned by the
    /// store after the expectation was drafted.
    pub fn with_id(mut self, id: i64) -> Self {
        self.id = id;
        self
    }
}

fn render<T: Display>(value: &Option<T>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "null".to_string(),
    }
}
