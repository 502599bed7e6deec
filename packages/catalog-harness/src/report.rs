//! Scenario and suite reports.

use serde::Serialize;

use catalog_core::{FailureKind, FieldDiff, HarnessError};

use crate::checker::Failure;

/// One executed step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub action: &'static str,
    /// Status the API answered with; `None` for store-only steps
    pub status: Option<u16>,
    pub elapsed_ms: u64,
}

/// Why a scenario failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    /// Index of the failing step; `None` for fixture setup and the final check
    pub step: Option<usize>,
    pub kind: FailureKind,
    pub message: String,
    pub diff: Vec<FieldDiff>,
}

impl FailureRecord {
    pub fn new(step: Option<usize>, failure: Failure) -> Self {
        Self {
            step,
            kind: failure.reason.kind(),
            message: failure.reason.to_string(),
            diff: failure.diff,
        }
    }

    pub fn from_error(step: Option<usize>, err: HarnessError) -> Self {
        Self::new(step, err.into())
    }

    /// A row cleanup could not remove; `subject` names the row.
    pub fn cleanup(subject: &str, err: HarnessError) -> Self {
        Self {
            step: None,
            kind: err.kind(),
            message: format!("{}: {}", subject, err),
            diff: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioReport {
    pub name: String,
    pub steps: Vec<StepRecord>,
    pub failure: Option<FailureRecord>,
    /// Rows that could not be removed
    pub cleanup_failures: Vec<FailureRecord>,
    pub elapsed_ms: u64,
}

impl ScenarioReport {
    /// A scenario passes when every step and the final check passed and
    /// every row it created was removed.
    pub fn passed(&self) -> bool {
        self.failure.is_none() && self.cleanup_failures.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct SuiteReport {
    pub seed: Option<u64>,
    pub passed: usize,
    pub failed: usize,
    pub scenarios: Vec<ScenarioReport>,
}

impl SuiteReport {
    pub fn push(&mut self, report: ScenarioReport) {
        if report.passed() {
            self.passed += 1;
        } else {
            self.failed += 1;
        }
        self.scenarios.push(report);
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(name: &str, failure: Option<FailureRecord>) -> ScenarioReport {
        ScenarioReport {
            name: name.to_string(),
            steps: vec![StepRecord {
                action: "create_product",
                status: Some(201),
                elapsed_ms: 3,
            }],
            failure,
            cleanup_failures: Vec::new(),
            elapsed_ms: 5,
        }
    }

    #[test]
    fn test_suite_counts() {
        let mut suite = SuiteReport::default();
        suite.push(report("ok", None));
        suite.push(report(
            "broken",
            Some(FailureRecord::from_error(
                Some(0),
                HarnessError::Transport("refused".to_string()),
            )),
        ));

        assert_eq!(suite.passed, 1);
        assert_eq!(suite.failed, 1);
        assert!(!suite.all_passed());
    }

    #[test]
    fn test_leftover_rows_fail_the_scenario() {
        let mut leaky = report("leaky", None);
        leaky.cleanup_failures.push(FailureRecord::cleanup(
            "product 42",
            HarnessError::StoreUnavailable("database is locked".to_string()),
        ));
        assert!(!leaky.passed());

        let record = &leaky.cleanup_failures[0];
        assert_eq!(record.kind, FailureKind::StoreUnavailable);
        assert_eq!(record.message, "product 42: Store unavailable: database is locked");

        let mut suite = SuiteReport::default();
        suite.push(leaky);
        assert_eq!(suite.failed, 1);
        assert!(!suite.all_passed());

        let value: serde_json::Value = serde_json::from_str(&suite.to_json().unwrap()).unwrap();
        assert_eq!(
            value["scenarios"][0]["cleanup_failures"][0]["kind"],
            "store_unavailable"
        );
    }

    #[test]
    fn test_json_shape() {
        let mut suite = SuiteReport {
            seed: Some(7),
            ..SuiteReport::default()
        };
        suite.push(report(
            "broken",
            Some(FailureRecord::from_error(
                None,
                HarnessError::CountMismatch {
                    table: "products".to_string(),
                    expected: 1,
                    actual: 0,
                },
            )),
        ));

        let value: serde_json::Value = serde_json::from_str(&suite.to_json().unwrap()).unwrap();
        assert_eq!(value["seed"], 7);
        assert_eq!(value["failed"], 1);
        assert_eq!(value["scenarios"][0]["failure"]["kind"], "count_mismatch");
        assert_eq!(value["scenarios"][0]["steps"][0]["status"], 201);
    }
}
