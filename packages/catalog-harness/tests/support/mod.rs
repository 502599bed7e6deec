#![allow(dead_code)]

pub mod service;
pub mod store;

use std::time::Duration;

use catalog_client::ApiClient;
use catalog_harness::{ConsistencyChecker, ReconciliationPolicy, ScenarioRunner, SeededGenerator};
use catalog_oracle::DbOracle;

pub use service::{Behavior, TestService};
pub use store::{provision, Store};

pub const TIMEOUT: Duration = Duration::from_secs(2);

/// A scratch store with a service in front of it.
pub struct TestEnv {
    pub service: TestService,
    pub store: Store,
    pub api: ApiClient,
    pub oracle: DbOracle,
}

impl TestEnv {
    pub async fn start(behavior: Behavior) -> Self {
        let store = provision();
        let service = TestService::spawn(store.path(), behavior).await;
        let api = ApiClient::new(service.base_url(), TIMEOUT).unwrap();
        let oracle = store.oracle(TIMEOUT);
        Self {
            service,
            store,
            api,
            oracle,
        }
    }

    pub fn checker(&self, policy: ReconciliationPolicy) -> ConsistencyChecker {
        ConsistencyChecker::new(self.api.clone(), self.oracle.clone(), policy)
    }

    pub fn runner(&self, seed: u64) -> ScenarioRunner<SeededGenerator> {
        ScenarioRunner::new(
            self.api.clone(),
            self.oracle.clone(),
            fast_policy(),
            SeededGenerator::new(seed),
        )
    }
}

/// Strict policy with a short retry, for services that answer consistently.
pub fn fast_policy() -> ReconciliationPolicy {
    ReconciliationPolicy {
        tolerate_store_only: false,
        max_retries: 1,
        retry_backoff: Duration::from_millis(50),
    }
}
