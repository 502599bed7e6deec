//! Consistency checking between the API view and the store view.
//!
//! The invariant being checked: the API's view of an entity is always a
//! faithful projection of the store's view, with no phantom or stale
//! entities. The store is read right after an API call with no
//! synchronization barrier, so divergent outcomes are re-observed after a
//! bounded backoff before they are declared.

use std::time::Duration;

use catalog_client::ApiClient;
use catalog_core::{
    EntityKind, EntitySnapshot, FailureKind, FieldDiff, HarnessConfig, HarnessError, Result,
};
use catalog_oracle::DbOracle;

/// Largest product id the schema hands out (five digits).
const MAX_PRODUCT_ID: i64 = 99_999;

/// Rules for how much divergence is tolerated before a check fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconciliationPolicy {
    /// Accept entities present in the store but not exposed by the API
    /// (delayed visibility, deletion races)
    pub tolerate_store_only: bool,
    /// Re-observations after a divergent outcome
    pub max_retries: u32,
    /// Wait before the first re-observation; doubled for each further one
    pub retry_backoff: Duration,
}

impl Default for ReconciliationPolicy {
    fn default() -> Self {
        Self {
            tolerate_store_only: false,
            max_retries: 1,
            retry_backoff: Duration::from_millis(250),
        }
    }
}

impl ReconciliationPolicy {
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self {
            tolerate_store_only: false,
            max_retries: config.max_retries,
            retry_backoff: config.retry_backoff(),
        }
    }

    pub fn tolerating_store_only(mut self) -> Self {
        self.tolerate_store_only = true;
        self
    }

    fn backoff_for(&self, attempt: u32) -> Duration {
        self.retry_backoff * 2u32.saturating_pow(attempt)
    }
}

/// Why a check failed, plus every field that differed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub reason: HarnessError,
    pub diff: Vec<FieldDiff>,
}

impl From<HarnessError> for Failure {
    fn from(reason: HarnessError) -> Self {
        Self {
            reason,
            diff: Vec::new(),
        }
    }
}

/// Outcome of a consistency check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail(Failure),
}

impl Verdict {
    pub fn fail(reason: HarnessError) -> Self {
        Verdict::Fail(reason.into())
    }

    fn mismatch(diff: Vec<FieldDiff>) -> Self {
        let Some(reason) = diff.first().map(FieldDiff::to_error) else {
            return Verdict::Pass;
        };
        Verdict::Fail(Failure { reason, diff })
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Verdict::Pass => None,
            Verdict::Fail(failure) => Some(failure),
        }
    }

    /// `Ok` on pass, the failure otherwise.
    pub fn into_result(self) -> std::result::Result<(), Failure> {
        match self {
            Verdict::Pass => Ok(()),
            Verdict::Fail(failure) => Err(failure),
        }
    }

    /// Divergent outcomes may be lag and are worth re-observing; anything
    /// else is final.
    fn is_divergence(&self) -> bool {
        self.failure().is_some_and(|f| {
            matches!(
                f.reason.kind(),
                FailureKind::InconsistentState | FailureKind::FieldMismatch | FailureKind::NotFound
            )
        })
    }
}

/// Applies the reconciliation policy to one observation of an entity.
///
/// # Arguments
/// * `api` - Snapshot built from the API answer, `None` on 404
/// * `store` - Snapshot built from the store rows, `None` if absent
/// * `expected` - What the scenario committed, `None` when it expects absence
pub fn reconcile(
    entity: EntityKind,
    id: i64,
    api: Option<&EntitySnapshot>,
    store: Option<&EntitySnapshot>,
    expected: Option<&EntitySnapshot>,
    policy: &ReconciliationPolicy,
) -> Verdict {
    match (api, store) {
        (None, None) => match expected {
            None => Verdict::Pass,
            Some(_) => Verdict::fail(HarnessError::NotFound { entity, id }),
        },
        (None, Some(_)) if policy.tolerate_store_only => Verdict::Pass,
        (None, Some(_)) => Verdict::fail(HarnessError::InconsistentState {
            entity,
            id,
            detail: "present in the store but the API reports it absent".to_string(),
        }),
        (Some(_), None) => Verdict::fail(HarnessError::InconsistentState {
            entity,
            id,
            detail: "exposed by the API but absent from the store".to_string(),
        }),
        (Some(api), Some(store)) => {
            let verdict = Verdict::mismatch(store.diff(api));
            match (verdict, expected) {
                (Verdict::Pass, Some(expected)) => Verdict::mismatch(expected.diff(store)),
                (verdict, _) => verdict,
            }
        }
    }
}

/// Compares the product listing of both views.
///
/// Every listed API product must exist in the store with the same fields;
/// every store row must be listed unless the policy tolerates store-only
/// entities; every store row must satisfy the schema's sanity rules.
pub fn reconcile_listing(
    api: &[EntitySnapshot],
    store: &[EntitySnapshot],
    policy: &ReconciliationPolicy,
) -> Verdict {
    for row in store {
        if let Err(reason) = check_row_sanity(row) {
            return Verdict::fail(reason);
        }
    }

    let mut diff = Vec::new();
    for listed in api {
        match store.iter().find(|row| row.id == listed.id) {
            None => {
                return Verdict::fail(HarnessError::InconsistentState {
                    entity: EntityKind::Product,
                    id: listed.id,
                    detail: "listed by the API but absent from the store".to_string(),
                })
            }
            Some(row) => diff.extend(row.diff(listed)),
        }
    }
    if !diff.is_empty() {
        return Verdict::mismatch(diff);
    }

    if !policy.tolerate_store_only {
        if let Some(row) = store.iter().find(|row| api.iter().all(|a| a.id != row.id)) {
            return Verdict::fail(HarnessError::InconsistentState {
                entity: EntityKind::Product,
                id: row.id,
                detail: "present in the store but missing from the API listing".to_string(),
            });
        }
    }
    Verdict::Pass
}

fn check_row_sanity(row: &EntitySnapshot) -> Result<()> {
    let problem = if !(1..=MAX_PRODUCT_ID).contains(&row.id) {
        Some("id is outside 1..=99999")
    } else if row.title.is_empty() {
        Some("title is empty")
    } else if row.price.is_none() {
        Some("price is missing")
    } else if row.category_title.is_none() {
        Some("category reference is missing")
    } else {
        None
    };
    match problem {
        Some(detail) => Err(HarnessError::InconsistentState {
            entity: EntityKind::Product,
            id: row.id,
            detail: detail.to_string(),
        }),
        None => Ok(()),
    }
}

/// Fetches both views of an entity and reconciles them.
#[derive(Debug, Clone)]
pub struct ConsistencyChecker {
    api: ApiClient,
    oracle: DbOracle,
    policy: ReconciliationPolicy,
}

impl ConsistencyChecker {
    pub fn new(api: ApiClient, oracle: DbOracle, policy: ReconciliationPolicy) -> Self {
        Self {
            api,
            oracle,
            policy,
        }
    }

    pub fn policy(&self) -> &ReconciliationPolicy {
        &self.policy
    }

    /// Same views, different policy.
    pub fn with_policy(&self, policy: ReconciliationPolicy) -> Self {
        Self {
            api: self.api.clone(),
            oracle: self.oracle.clone(),
            policy,
        }
    }

    pub async fn check_product(&self, id: i64, expected: Option<&EntitySnapshot>) -> Verdict {
        self.check(EntityKind::Product, id, expected).await
    }

    pub async fn check_category(&self, id: i64, expected: Option<&EntitySnapshot>) -> Verdict {
        self.check(EntityKind::Category, id, expected).await
    }

    /// Reconciles `GET /products` against every product row.
    pub async fn check_product_listing(&self) -> Verdict {
        self.with_retries("product listing", || async move {
            let api = self.api_listing().await?;
            let store = self.oracle.product_snapshots().await?;
            Ok::<_, HarnessError>(reconcile_listing(&api, &store, &self.policy))
        })
        .await
    }

    async fn check(&self, entity: EntityKind, id: i64, expected: Option<&EntitySnapshot>) -> Verdict {
        self.with_retries(&format!("{} {}", entity, id), || async move {
            let (api, store) = match entity {
                EntityKind::Product => (
                    self.api_product(id).await?,
                    self.oracle.product_snapshot(id).await?,
                ),
                EntityKind::Category => (
                    self.api_category(id).await?,
                    self.oracle.category_snapshot(id).await?,
                ),
            };
            Ok::<_, HarnessError>(reconcile(
                entity,
                id,
                api.as_ref(),
                store.as_ref(),
                expected,
                &self.policy,
            ))
        })
        .await
    }

    /// Runs `observe` until it yields a non-divergent verdict or the retry
    /// allowance is spent. Observation errors end the check immediately.
    async fn with_retries<F, Fut>(&self, subject: &str, observe: F) -> Verdict
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<Verdict>>,
    {
        let mut attempt = 0;
        loop {
            let verdict = match observe().await {
                Ok(verdict) => verdict,
                Err(reason) => return Verdict::fail(reason),
            };
            if !verdict.is_divergence() || attempt >= self.policy.max_retries {
                return verdict;
            }
            let delay = self.policy.backoff_for(attempt);
            if let Some(failure) = verdict.failure() {
                tracing::warn!(
                    subject,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    reason = %failure.reason,
                    "views diverge, re-observing"
                );
            }
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn api_product(&self, id: i64) -> Result<Option<EntitySnapshot>> {
        let response = self.api.get_product(id).await?;
        match response.status {
            200 => EntitySnapshot::from_product_dto(response.require_body("get_product")?).map(Some),
            404 => Ok(None),
            actual => Err(HarnessError::UnexpectedStatus {
                operation: "get_product".to_string(),
                expected: 200,
                actual,
            }),
        }
    }

    async fn api_category(&self, id: i64) -> Result<Option<EntitySnapshot>> {
        let response = self.api.get_category(id).await?;
        match response.status {
            200 => {
                EntitySnapshot::from_category_dto(response.require_body("get_category")?).map(Some)
            }
            404 => Ok(None),
            actual => Err(HarnessError::UnexpectedStatus {
                operation: "get_category".to_string(),
                expected: 200,
                actual,
            }),
        }
    }

    async fn api_listing(&self) -> Result<Vec<EntitySnapshot>> {
        let response = self.api.list_products().await?;
        if response.status != 200 {
            return Err(HarnessError::UnexpectedStatus {
                operation: "list_products".to_string(),
                expected: 200,
                actual: response.status,
            });
        }
        response
            .require_body("list_products")?
            .iter()
            .map(EntitySnapshot::from_product_dto)
            .collect()
    }
}
