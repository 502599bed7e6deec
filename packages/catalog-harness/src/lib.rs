//! Consistency harness for the products/categories service.
//!
//! Drives the REST API through [`catalog_client::ApiClient`], observes the
//! backing store through [`catalog_oracle::DbOracle`] and checks that the
//! API's view of every entity is a faithful projection of the store's.
//!
//! # Example
//!
//! ```no_run
//! use catalog_core::HarnessConfig;
//! use catalog_harness::{standard_suite, ScenarioRunner};
//!
//! # async fn run() -> catalog_core::Result<()> {
//! let config = HarnessConfig::new();
//! let mut runner = ScenarioRunner::from_config(&config)?;
//! let report = runner.run_all(&standard_suite()).await;
//! assert!(report.all_passed());
//! # Ok(())
//! # }
//! ```

pub mod checker;
pub mod fixtures;
pub mod report;
pub mod runner;
pub mod scenario;
pub mod suite;

pub use checker::{ConsistencyChecker, Failure, ReconciliationPolicy, Verdict};
pub use fixtures::{SeededGenerator, ValueGenerator};
pub use report::{FailureRecord, ScenarioReport, StepRecord, SuiteReport};
pub use runner::ScenarioRunner;
pub use scenario::{
    Action, ConsistencyExpectation, Divergence, FieldEdit, Fixture, ProductEdit, Scenario, Step,
};
pub use suite::{find, standard_suite};
