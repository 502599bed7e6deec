//! Declarative scenario model.
//!
//! A scenario is a fixture, an ordered list of steps and a final
//! consistency expectation. Scenarios are plain data; the
//! [`ScenarioRunner`](crate::runner::ScenarioRunner) gives them meaning.

use catalog_core::ProductDto;

/// Product draft a scenario starts from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Fixture {
    /// Generated title and price in the seeded `Food` category
    #[default]
    Product,
    /// Fixed values
    Explicit {
        title: String,
        price: i64,
        category: String,
    },
    /// Generated product that also carries an id absent from the store
    ClientSuppliedId,
    /// Seeded `Food` category with `title` and `price` left null
    NullFields,
    /// Generated product with `title` left null
    NullTitle,
    /// Generated product with `price` left null
    NullPrice,
    /// Generated product in a category title no row carries
    UnknownCategory,
    /// Generated product in a category created for this scenario and
    /// removed at cleanup
    FreshCategory,
}

impl Fixture {
    pub fn explicit(title: impl Into<String>, price: i64, category: impl Into<String>) -> Self {
        Fixture::Explicit {
            title: title.into(),
            price,
            category: category.into(),
        }
    }
}

/// Change to a single draft field.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FieldEdit<T> {
    #[default]
    Keep,
    Set(T),
    /// Send the field as `null`
    Clear,
}

impl<T: Clone> FieldEdit<T> {
    fn apply(&self, field: &mut Option<T>) {
        match self {
            FieldEdit::Keep => {}
            FieldEdit::Set(value) => *field = Some(value.clone()),
            FieldEdit::Clear => *field = None,
        }
    }
}

/// Edit applied to the current draft by an API update.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProductEdit {
    pub title: FieldEdit<String>,
    pub price: FieldEdit<i64>,
    pub category_title: FieldEdit<String>,
}

impl ProductEdit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears every field.
    pub fn cleared() -> Self {
        Self {
            title: FieldEdit::Clear,
            price: FieldEdit::Clear,
            category_title: FieldEdit::Clear,
        }
    }

    pub fn clear_title(mut self) -> Self {
        self.title = FieldEdit::Clear;
        self
    }

    pub fn clear_price(mut self) -> Self {
        self.price = FieldEdit::Clear;
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = FieldEdit::Set(title.into());
        self
    }

    pub fn price(mut self, price: i64) -> Self {
        self.price = FieldEdit::Set(price);
        self
    }

    pub fn category_title(mut self, category_title: impl Into<String>) -> Self {
        self.category_title = FieldEdit::Set(category_title.into());
        self
    }

    pub fn apply(&self, draft: &mut ProductDto) {
        self.title.apply(&mut draft.title);
        self.price.apply(&mut draft.price);
        self.category_title.apply(&mut draft.category_title);
    }
}

/// Write performed behind the API's back, straight into the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Divergence {
    /// Delete the scenario's product row
    DeleteRow,
    /// Overwrite every column of the scenario's product row
    Overwrite {
        title: String,
        price: i64,
        category_title: String,
    },
}

impl Divergence {
    pub fn overwrite(title: impl Into<String>, price: i64, category_title: impl Into<String>) -> Self {
        Divergence::Overwrite {
            title: title.into(),
            price,
            category_title: category_title.into(),
        }
    }
}

/// One thing a step does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// `POST /products` with the current draft
    CreateProduct,
    /// `GET /products/{id}` of the scenario's product
    GetProduct,
    /// `GET /products/{id}` of an id absent from the store
    GetUnknownProduct,
    /// `GET /products`, then a listing consistency check
    ListProducts,
    /// `PUT /products` with the edited draft; `send_id` controls whether the
    /// scenario's product id travels in the body
    UpdateProduct { edit: ProductEdit, send_id: bool },
    /// `DELETE /products/{id}` of the scenario's product
    DeleteProduct,
    InjectDivergence(Divergence),
    /// `GET /categories/{id}`, then a category consistency check
    GetCategory { id: i64, title: Option<String> },
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::CreateProduct => "create_product",
            Action::GetProduct => "get_product",
            Action::GetUnknownProduct => "get_unknown_product",
            Action::ListProducts => "list_products",
            Action::UpdateProduct { .. } => "update_product",
            Action::DeleteProduct => "delete_product",
            Action::InjectDivergence(Divergence::DeleteRow) => "db_delete_product",
            Action::InjectDivergence(Divergence::Overwrite { .. }) => "db_overwrite_product",
            Action::GetCategory { .. } => "get_category",
        }
    }
}

/// An action plus what it must produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub action: Action,
    /// Status the API must answer with; unchecked when `None`
    pub expect_status: Option<u16>,
    /// Change of the product row count across the step
    pub product_delta: Option<i64>,
    /// Change of the category row count across the step
    pub category_delta: Option<i64>,
}

impl Step {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            expect_status: None,
            product_delta: None,
            category_delta: None,
        }
    }

    pub fn expect(mut self, status: u16) -> Self {
        self.expect_status = Some(status);
        self
    }

    pub fn products(mut self, delta: i64) -> Self {
        self.product_delta = Some(delta);
        self
    }

    pub fn categories(mut self, delta: i64) -> Self {
        self.category_delta = Some(delta);
        self
    }
}

/// Final check run once every step passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsistencyExpectation {
    /// Reconcile the scenario's product against its expected snapshot
    #[default]
    Consistent,
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scenario {
    pub name: String,
    pub fixture: Fixture,
    pub steps: Vec<Step>,
    pub consistency: ConsistencyExpectation,
    /// Accept a row the API does not expose in the final check
    pub tolerate_store_only: bool,
}

impl Scenario {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fixture: Fixture::default(),
            steps: Vec::new(),
            consistency: ConsistencyExpectation::default(),
            tolerate_store_only: false,
        }
    }

    pub fn fixture(mut self, fixture: Fixture) -> Self {
        self.fixture = fixture;
        self
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn consistency(mut self, consistency: ConsistencyExpectation) -> Self {
        self.consistency = consistency;
        self
    }

    pub fn tolerate_store_only(mut self) -> Self {
        self.tolerate_store_only = true;
        self
    }
}
