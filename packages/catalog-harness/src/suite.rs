//! The standard scenario suite.

use catalog_core::SeededCategory;

use crate::scenario::{
    Action, ConsistencyExpectation, Divergence, Fixture, ProductEdit, Scenario, Step,
};

fn create() -> Step {
    Step::new(Action::CreateProduct).expect(201).products(1)
}

fn rejected_create() -> Step {
    Step::new(Action::CreateProduct).expect(400).products(0)
}

fn get(status: u16) -> Step {
    Step::new(Action::GetProduct).expect(status)
}

fn db_delete() -> Step {
    Step::new(Action::InjectDivergence(Divergence::DeleteRow)).products(-1)
}

fn update(edit: ProductEdit, send_id: bool) -> Action {
    Action::UpdateProduct { edit, send_id }
}

/// Every scenario the harness knows, in execution order.
pub fn standard_suite() -> Vec<Scenario> {
    let food = SeededCategory::Food;
    vec![
        Scenario::new("create_product").step(create()),
        Scenario::new("create_product_with_id")
            .fixture(Fixture::ClientSuppliedId)
            .step(rejected_create())
            .consistency(ConsistencyExpectation::Skip),
        Scenario::new("create_product_with_null_fields")
            .fixture(Fixture::NullFields)
            .step(rejected_create()),
        Scenario::new("create_product_with_null_title")
            .fixture(Fixture::NullTitle)
            .step(rejected_create()),
        Scenario::new("create_product_with_null_price")
            .fixture(Fixture::NullPrice)
            .step(rejected_create()),
        Scenario::new("create_product_with_unknown_category")
            .fixture(Fixture::UnknownCategory)
            .step(rejected_create()),
        Scenario::new("get_product_by_id").step(create()).step(get(200)),
        Scenario::new("get_after_db_delete")
            .step(create())
            .step(db_delete())
            .step(get(404)),
        Scenario::new("get_unknown_product")
            .step(Step::new(Action::GetUnknownProduct).expect(404)),
        Scenario::new("list_products")
            .step(create())
            .step(Step::new(Action::ListProducts).expect(200)),
        Scenario::new("db_overwrite_is_reflected")
            .step(create())
            .step(
                Step::new(Action::InjectDivergence(Divergence::overwrite(
                    "New title",
                    1500,
                    SeededCategory::Furniture.title(),
                )))
                .products(0),
            )
            .step(get(200)),
        Scenario::new("update_product")
            .step(create())
            .step(
                Step::new(update(ProductEdit::new().title("Updated dish").price(175), true))
                    .expect(200)
                    .products(0),
            )
            .step(get(200)),
        Scenario::new("update_without_id")
            .step(create())
            .step(
                Step::new(update(ProductEdit::new().price(1), false))
                    .expect(400)
                    .products(0),
            ),
        Scenario::new("update_with_null_fields")
            .step(create())
            .step(
                Step::new(update(ProductEdit::cleared(), true))
                    .expect(400)
                    .products(0),
            ),
        Scenario::new("update_with_null_title")
            .step(create())
            .step(
                Step::new(update(ProductEdit::new().clear_title(), true))
                    .expect(400)
                    .products(0),
            )
            .step(get(200)),
        Scenario::new("update_with_null_price")
            .step(create())
            .step(
                Step::new(update(ProductEdit::new().clear_price(), true))
                    .expect(400)
                    .products(0),
            )
            .step(get(200)),
        Scenario::new("update_after_delete")
            .step(create())
            .step(db_delete())
            .step(
                Step::new(update(ProductEdit::new().price(1), true))
                    .expect(404)
                    .products(0),
            ),
        Scenario::new("delete_product")
            .step(create())
            .step(Step::new(Action::DeleteProduct).expect(200).products(-1))
            .step(get(404)),
        Scenario::new("delete_after_delete")
            .step(create())
            .step(db_delete())
            .step(Step::new(Action::DeleteProduct).expect(404).products(0)),
        Scenario::new("get_category_food").step(
            Step::new(Action::GetCategory {
                id: food.id(),
                title: Some(food.title().to_string()),
            })
            .expect(200)
            .categories(0),
        ),
        Scenario::new("product_in_fresh_category")
            .fixture(Fixture::FreshCategory)
            .step(create().categories(0))
            .step(get(200)),
        Scenario::new("pasta")
            .fixture(Fixture::explicit("Pasta", 120, food.title()))
            .step(create())
            .step(Step::new(Action::DeleteProduct).expect(200).products(-1)),
    ]
}

/// Looks a scenario of the standard suite up by name.
pub fn find(name: &str) -> Option<Scenario> {
    standard_suite().into_iter().find(|s| s.name == name)
}
