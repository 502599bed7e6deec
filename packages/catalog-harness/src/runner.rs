//! Scenario execution.
//!
//! The runner owns the per-scenario bookkeeping: the current product draft,
//! the snapshot the store and API are expected to converge on, and every row
//! the scenario created. Steps run in order and the first failing step ends
//! the scenario; cleanup runs regardless.

use std::future::Future;
use std::time::Instant;

use catalog_client::{ApiClient, ApiResponse};
use catalog_core::{
    EntitySnapshot, FieldDiff, HarnessConfig, HarnessError, Product, ProductDto, Result,
    SeededCategory,
};
use catalog_oracle::{unique_title, DbOracle};

use crate::checker::{ConsistencyChecker, Failure, ReconciliationPolicy};
use crate::fixtures::{SeededGenerator, ValueGenerator};
use crate::report::{FailureRecord, ScenarioReport, StepRecord, SuiteReport};
use crate::scenario::{Action, ConsistencyExpectation, Divergence, Fixture, Scenario, Step};

type StepResult<T> = std::result::Result<T, Failure>;

#[derive(Debug, Default)]
struct RunState {
    draft: ProductDto,
    /// Id the service assigned to the scenario's product
    product_id: Option<i64>,
    /// `None` once the product is expected to be gone
    expected: Option<EntitySnapshot>,
    created_products: Vec<i64>,
    created_categories: Vec<i64>,
    /// Product rows a create added without reporting their ids
    untracked_products: i64,
}

impl RunState {
    fn product_id(&self, action: &Action) -> Result<i64> {
        self.product_id.ok_or_else(|| {
            HarnessError::Config(format!(
                "step '{}' needs a product created by an earlier step",
                action.name()
            ))
        })
    }

    /// Snapshot of the draft stored under `id`; `None` while the draft has
    /// null fields.
    fn draft_snapshot(&self, id: i64) -> Option<EntitySnapshot> {
        match (&self.draft.title, self.draft.price, &self.draft.category_title) {
            (Some(title), Some(price), Some(category)) => Some(EntitySnapshot::product(
                id,
                title.clone(),
                price,
                category.clone(),
            )),
            _ => None,
        }
    }
}

/// Check deferred until status and count deltas have passed.
#[derive(Debug)]
enum FollowUp {
    None,
    /// A returned body must match what the scenario committed
    Echo {
        expected: EntitySnapshot,
        actual: Result<EntitySnapshot>,
    },
    Product {
        id: i64,
        expected: Option<EntitySnapshot>,
    },
    Category {
        id: i64,
        expected: Option<EntitySnapshot>,
    },
    Listing,
}

#[derive(Debug)]
struct Answer {
    /// `None` for steps that only touch the store
    status: Option<u16>,
    raw_error: Option<String>,
    follow_up: FollowUp,
}

impl Answer {
    fn store_only() -> Self {
        Self {
            status: None,
            raw_error: None,
            follow_up: FollowUp::None,
        }
    }

    fn from_response<T>(response: &ApiResponse<T>) -> Self {
        Self {
            status: Some(response.status),
            raw_error: response.raw_error.clone(),
            follow_up: FollowUp::None,
        }
    }

    fn then(mut self, follow_up: FollowUp) -> Self {
        self.follow_up = follow_up;
        self
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Counts {
    products: Option<i64>,
    categories: Option<i64>,
}

/// Executes scenarios against one service and its store.
pub struct ScenarioRunner<G = SeededGenerator> {
    api: ApiClient,
    oracle: DbOracle,
    checker: ConsistencyChecker,
    generator: G,
}

impl ScenarioRunner<SeededGenerator> {
    /// Builds a runner from configuration; without a configured seed the
    /// generator is seeded from entropy.
    pub fn from_config(config: &HarnessConfig) -> Result<Self> {
        let api = ApiClient::from_config(config)?;
        let oracle = DbOracle::from_config(config);
        let generator = match config.seed {
            Some(seed) => SeededGenerator::new(seed),
            None => SeededGenerator::from_entropy(),
        };
        Ok(Self::new(
            api,
            oracle,
            ReconciliationPolicy::from_config(config),
            generator,
        ))
    }
}

impl<G: ValueGenerator> ScenarioRunner<G> {
    pub fn new(api: ApiClient, oracle: DbOracle, policy: ReconciliationPolicy, generator: G) -> Self {
        let checker = ConsistencyChecker::new(api.clone(), oracle.clone(), policy);
        Self {
            api,
            oracle,
            checker,
            generator,
        }
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// Runs every scenario in order.
    pub async fn run_all(&mut self, scenarios: &[Scenario]) -> SuiteReport {
        let mut suite = SuiteReport {
            seed: self.generator.replay_seed(),
            ..SuiteReport::default()
        };
        for scenario in scenarios {
            let report = self.run(scenario).await;
            suite.push(report);
        }
        tracing::info!(
            passed = suite.passed,
            failed = suite.failed,
            "suite finished"
        );
        suite
    }

    /// Runs one scenario, then removes every row it created.
    pub async fn run(&mut self, scenario: &Scenario) -> ScenarioReport {
        let started = Instant::now();
        tracing::info!(scenario = %scenario.name, "scenario started");

        let mut state = RunState::default();
        let mut steps = Vec::with_capacity(scenario.steps.len());
        let failure = self
            .execute(scenario, &mut state, &mut steps)
            .await
            .err();
        let cleanup_failures = self.cleanup(&state).await;

        let report = ScenarioReport {
            name: scenario.name.clone(),
            steps,
            failure,
            cleanup_failures,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        match &report.failure {
            None if report.passed() => tracing::info!(
                scenario = %report.name,
                elapsed_ms = report.elapsed_ms,
                "scenario passed"
            ),
            None => tracing::warn!(
                scenario = %report.name,
                leftovers = report.cleanup_failures.len(),
                "scenario left rows behind"
            ),
            Some(failure) => tracing::warn!(
                scenario = %report.name,
                step = ?failure.step,
                kind = ?failure.kind,
                message = %failure.message,
                "scenario failed"
            ),
        }
        report
    }

    async fn execute(
        &mut self,
        scenario: &Scenario,
        state: &mut RunState,
        records: &mut Vec<StepRecord>,
    ) -> std::result::Result<(), FailureRecord> {
        self.prepare(&scenario.fixture, state)
            .await
            .map_err(|e| FailureRecord::from_error(None, e))?;

        for (index, step) in scenario.steps.iter().enumerate() {
            let started = Instant::now();
            let (status, result) = self.execute_step(step, state).await;
            records.push(StepRecord {
                action: step.action.name(),
                status,
                elapsed_ms: started.elapsed().as_millis() as u64,
            });
            result.map_err(|f| FailureRecord::new(Some(index), f))?;
        }

        if scenario.consistency == ConsistencyExpectation::Consistent {
            if let Some(id) = state.product_id {
                let policy = ReconciliationPolicy {
                    tolerate_store_only: scenario.tolerate_store_only,
                    ..*self.checker.policy()
                };
                self.checker
                    .with_policy(policy)
                    .check_product(id, state.expected.as_ref())
                    .await
                    .into_result()
                    .map_err(|f| FailureRecord::new(None, f))?;
            }
        }
        Ok(())
    }

    async fn prepare(&mut self, fixture: &Fixture, state: &mut RunState) -> Result<()> {
        let food = SeededCategory::Food.title();
        state.draft = match fixture {
            Fixture::Product => self.generated(food),
            Fixture::Explicit {
                title,
                price,
                category,
            } => ProductDto::new()
                .with_title(title.clone())
                .with_price(*price)
                .with_category_title(category.clone()),
            Fixture::ClientSuppliedId => {
                let taken = self.store_product_ids().await?;
                let id = self.generator.absent_id(&taken);
                self.generated(food).with_id(id)
            }
            Fixture::NullFields => ProductDto::new().with_category_title(food),
            Fixture::NullTitle => ProductDto {
                title: None,
                ..self.generated(food)
            },
            Fixture::NullPrice => ProductDto {
                price: None,
                ..self.generated(food)
            },
            Fixture::UnknownCategory => {
                let taken: Vec<String> = self
                    .oracle
                    .list_categories()
                    .await?
                    .into_iter()
                    .map(|c| c.title)
                    .collect();
                let base = self.generator.category_title();
                let title = unique_title(&base, &taken);
                self.generated(&title)
            }
            Fixture::FreshCategory => {
                let base = self.generator.category_title();
                let category = self.oracle.create_category(&base).await?;
                state.created_categories.push(category.id);
                tracing::debug!(id = category.id, title = %category.title, "fixture category created");
                self.generated(&category.title)
            }
        };
        Ok(())
    }

    fn generated(&mut self, category: &str) -> ProductDto {
        ProductDto::new()
            .with_title(self.generator.product_title())
            .with_price(self.generator.price())
            .with_category_title(category)
    }

    async fn store_product_ids(&self) -> Result<Vec<i64>> {
        Ok(self
            .oracle
            .list_products()
            .await?
            .iter()
            .map(|p| p.id)
            .collect())
    }

    /// Returns the status the step observed alongside its outcome, so the
    /// status is reported even when the step fails.
    async fn execute_step(
        &mut self,
        step: &Step,
        state: &mut RunState,
    ) -> (Option<u16>, StepResult<()>) {
        let before = match self.counts(step).await {
            Ok(counts) => counts,
            Err(e) => return (None, Err(e.into())),
        };
        let tracked = state.created_products.len();
        let performed = self.perform(&step.action, state).await;
        if let (Action::CreateProduct, Some(before)) = (&step.action, before.products) {
            if let Err(e) = self.note_untracked(before, tracked, state).await {
                tracing::warn!(error = %e, "could not count products after create");
            }
        }
        let answer = match performed {
            Ok(answer) => answer,
            Err(failure) => return (None, Err(failure)),
        };
        let status = answer.status;
        (status, self.settle(step, answer, before).await)
    }

    async fn counts(&self, step: &Step) -> Result<Counts> {
        let mut counts = Counts::default();
        if step.product_delta.is_some() || step.action == Action::CreateProduct {
            counts.products = Some(self.oracle.count_products().await?);
        }
        if step.category_delta.is_some() {
            counts.categories = Some(self.oracle.count_categories().await?);
        }
        Ok(counts)
    }

    /// Records rows the last create added beyond the ids it reported, so
    /// cleanup can flag what it cannot remove.
    async fn note_untracked(&self, before: i64, tracked: usize, state: &mut RunState) -> Result<()> {
        let added = self.oracle.count_products().await? - before;
        let reported = (state.created_products.len() - tracked) as i64;
        if added > reported {
            tracing::warn!(added, reported, "create_product stored rows without reporting ids");
            state.untracked_products += added - reported;
        }
        Ok(())
    }

    async fn perform(&mut self, action: &Action, state: &mut RunState) -> StepResult<Answer> {
        let answer = match action {
            Action::CreateProduct => {
                let response = self.api.create_product(&state.draft).await?;
                let answer = Answer::from_response(&response);
                // Any accepted create is removed at cleanup, expected or not.
                if let Some(id) = response
                    .body
                    .as_ref()
                    .and_then(|b| b.id)
                    .filter(|_| response.is_success())
                {
                    state.created_products.push(id);
                }
                if response.status != 201 {
                    return Ok(answer);
                }
                let body = response.into_body("create_product")?;
                let id = body.id.ok_or_else(|| {
                    HarnessError::ProtocolViolation(
                        "create_product answered 201 without an id".to_string(),
                    )
                })?;
                state.product_id = Some(id);
                state.expected = state.draft_snapshot(id);
                tracing::debug!(id, "product created");
                match state.expected.clone() {
                    Some(expected) => answer.then(FollowUp::Echo {
                        expected,
                        actual: EntitySnapshot::from_product_dto(&body),
                    }),
                    None => answer,
                }
            }
            Action::GetProduct => {
                let id = state.product_id(action)?;
                let response = self.api.get_product(id).await?;
                let answer = Answer::from_response(&response);
                match (response.status, state.expected.clone()) {
                    (200, Some(expected)) => answer.then(FollowUp::Echo {
                        expected,
                        actual: response
                            .require_body("get_product")
                            .and_then(EntitySnapshot::from_product_dto),
                    }),
                    _ => answer,
                }
            }
            Action::GetUnknownProduct => {
                let taken = self.store_product_ids().await?;
                let id = self.generator.absent_id(&taken);
                let response = self.api.get_product(id).await?;
                Answer::from_response(&response).then(FollowUp::Product { id, expected: None })
            }
            Action::ListProducts => {
                let response = self.api.list_products().await?;
                let answer = Answer::from_response(&response);
                if response.status == 200 {
                    answer.then(FollowUp::Listing)
                } else {
                    answer
                }
            }
            Action::UpdateProduct { edit, send_id } => {
                let id = state.product_id(action)?;
                let mut edited = state.draft.clone();
                edit.apply(&mut edited);
                let request = ProductDto {
                    id: send_id.then_some(id),
                    ..edited.clone()
                };
                let response = self.api.update_product(&request).await?;
                let answer = Answer::from_response(&response);
                if response.status != 200 {
                    return Ok(answer);
                }
                state.draft = edited;
                state.expected = state.draft_snapshot(id);
                answer.then(FollowUp::Product {
                    id,
                    expected: state.expected.clone(),
                })
            }
            Action::DeleteProduct => {
                let id = state.product_id(action)?;
                let response = self.api.delete_product(id).await?;
                if response.status == 200 {
                    state.expected = None;
                }
                Answer::from_response(&response)
            }
            Action::InjectDivergence(divergence) => {
                let id = state.product_id(action)?;
                self.inject(id, divergence, state).await?;
                Answer::store_only()
            }
            Action::GetCategory { id, title } => {
                let response = self.api.get_category(*id).await?;
                let answer = Answer::from_response(&response);
                if response.status == 200 {
                    answer.then(FollowUp::Category {
                        id: *id,
                        expected: title.as_ref().map(|t| EntitySnapshot::category(*id, t.clone())),
                    })
                } else {
                    answer
                }
            }
        };
        Ok(answer)
    }

    async fn inject(&self, id: i64, divergence: &Divergence, state: &mut RunState) -> Result<()> {
        match divergence {
            Divergence::DeleteRow => {
                self.oracle.delete_product_by_id(id).await?;
                state.expected = None;
            }
            Divergence::Overwrite {
                title,
                price,
                category_title,
            } => {
                let category = self
                    .oracle
                    .find_category_by_title(category_title)
                    .await?
                    .ok_or_else(|| {
                        HarnessError::Config(format!(
                            "overwrite targets unknown category '{}'",
                            category_title
                        ))
                    })?;
                self.oracle
                    .update_product_direct(&Product {
                        id,
                        title: title.clone(),
                        price: *price,
                        category_id: category.id,
                    })
                    .await?;
                state.draft = ProductDto::new()
                    .with_title(title.clone())
                    .with_price(*price)
                    .with_category_title(category_title.clone());
                state.expected = state.draft_snapshot(id);
            }
        }
        tracing::debug!(id, action = ?divergence, "divergence injected");
        Ok(())
    }

    /// Status check, then count deltas, then the deferred follow-up.
    async fn settle(&self, step: &Step, answer: Answer, before: Counts) -> StepResult<()> {
        check_status(step, &answer)?;
        self.check_deltas(step, before).await?;
        match answer.follow_up {
            FollowUp::None => Ok(()),
            FollowUp::Echo { expected, actual } => compare(&expected, &actual?),
            FollowUp::Product { id, expected } => self
                .checker
                .check_product(id, expected.as_ref())
                .await
                .into_result(),
            FollowUp::Category { id, expected } => self
                .checker
                .check_category(id, expected.as_ref())
                .await
                .into_result(),
            FollowUp::Listing => self.checker.check_product_listing().await.into_result(),
        }
    }

    async fn check_deltas(&self, step: &Step, before: Counts) -> Result<()> {
        if let (Some(expected), Some(before)) = (step.product_delta, before.products) {
            let after = self.oracle.count_products().await?;
            check_delta("products", expected, after - before)?;
        }
        if let (Some(expected), Some(before)) = (step.category_delta, before.categories) {
            let after = self.oracle.count_categories().await?;
            check_delta("categories", expected, after - before)?;
        }
        Ok(())
    }

    /// Deletes every created row, products first. Returns what could not be
    /// removed.
    async fn cleanup(&self, state: &RunState) -> Vec<FailureRecord> {
        let mut failures = Vec::new();
        let oracle = &self.oracle;
        for &id in &state.created_products {
            let subject = format!("product {}", id);
            if let Err(e) = remove(&subject, move || oracle.delete_product_by_id(id)).await {
                failures.push(FailureRecord::cleanup(&subject, e));
            }
        }
        for &id in &state.created_categories {
            let subject = format!("category {}", id);
            if let Err(e) = remove(&subject, move || oracle.delete_category_by_id(id)).await {
                failures.push(FailureRecord::cleanup(&subject, e));
            }
        }
        if state.untracked_products > 0 {
            failures.push(FailureRecord::cleanup(
                "products",
                HarnessError::ProtocolViolation(format!(
                    "create_product stored {} row(s) without reporting an id",
                    state.untracked_products
                )),
            ));
        }
        failures
    }
}

/// Runs a cleanup delete; a transient failure gets one more attempt and an
/// already-absent row counts as removed.
async fn remove<F, Fut>(subject: &str, delete: F) -> Result<()>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut result = delete().await;
    if let Err(e) = &result {
        if e.is_transient() {
            tracing::warn!(subject, error = %e, "cleanup failed, retrying once");
            result = delete().await;
        }
    }
    match result {
        Ok(()) | Err(HarnessError::NotFound { .. }) => Ok(()),
        Err(e) => {
            tracing::warn!(subject, error = %e, "cleanup left a row behind");
            Err(e)
        }
    }
}

fn check_status(step: &Step, answer: &Answer) -> Result<()> {
    let (Some(expected), Some(actual)) = (step.expect_status, answer.status) else {
        return Ok(());
    };
    if expected == actual {
        return Ok(());
    }
    if (200..300).contains(&expected) && actual == 400 {
        return Err(HarnessError::ValidationRejected {
            status: actual,
            message: answer.raw_error.clone().unwrap_or_default(),
        });
    }
    Err(HarnessError::UnexpectedStatus {
        operation: step.action.name().to_string(),
        expected,
        actual,
    })
}

fn check_delta(table: &str, expected: i64, actual: i64) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(HarnessError::CountMismatch {
            table: table.to_string(),
            expected,
            actual,
        })
    }
}

fn compare(expected: &EntitySnapshot, actual: &EntitySnapshot) -> StepResult<()> {
    let diff = expected.diff(actual);
    let Some(reason) = diff.first().map(FieldDiff::to_error) else {
        return Ok(());
    };
    Err(Failure { reason, diff })
}
