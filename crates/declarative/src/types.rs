//! Core types for declarative resource management

use crate::diff::ChangeOperation;
use crate::graph::ResourceRef;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Observed state of a resource on the remote system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RemoteSnapshot {
    pub exists: bool,
    /// Observed values; only meaningful when `exists` is true
    #[serde(default)]
    pub values: BTreeMap<String, Value>,
}

impl RemoteSnapshot {
    /// The resource does not exist remotely
    pub fn absent() -> Self {
        Self::default()
    }

    /// The resource exists with the given observed values
    pub fn present(values: BTreeMap<String, Value>) -> Self {
        Self {
            exists: true,
            values,
        }
    }

    /// Observed value of a property; missing values read as null
    pub fn value(&self, name: &str) -> &Value {
        static NULL: Value = Value::Null;
        self.values.get(name).unwrap_or(&NULL)
    }
}

/// Result of applying one change operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplyResult {
    /// Resource was created
    Created,
    /// Resource was modified
    Modified,
    /// Resource was removed
    Removed,
    /// Apply failed
    Failed { error: String },
    /// Apply was skipped
    Skipped { reason: String },
}

impl ApplyResult {
    /// Check if the result represents success (no failure)
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }

    /// The result an operation produces when it succeeds
    pub fn applied(operation: &ChangeOperation) -> Self {
        match operation {
            ChangeOperation::Create => Self::Created,
            ChangeOperation::Update { .. } => Self::Modified,
            ChangeOperation::Delete => Self::Removed,
        }
    }
}

/// Per-operation outcome reported by the executor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationReport {
    pub resource: ResourceRef,
    pub operation: ChangeOperation,
    pub result: ApplyResult,
}

/// Summary of execution results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteSummary {
    pub created: usize,
    pub modified: usize,
    pub removed: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl ExecuteSummary {
    /// Total number of actual changes made
    pub fn total_changes(&self) -> usize {
        self.created + self.modified + self.removed
    }

    /// Check if execution was fully successful (no failures)
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Total number of operations processed
    pub fn total(&self) -> usize {
        self.created + self.modified + self.removed + self.skipped + self.failed
    }

    /// Add a result to the summary
    pub fn add_result(&mut self, result: &ApplyResult) {
        match result {
            ApplyResult::Created => self.created += 1,
            ApplyResult::Modified => self.modified += 1,
            ApplyResult::Removed => self.removed += 1,
            ApplyResult::Failed { .. } => self.failed += 1,
            ApplyResult::Skipped { .. } => self.skipped += 1,
        }
    }

    /// Build a summary from operation reports
    pub fn from_reports(reports: &[OperationReport]) -> Self {
        let mut summary = Self::default();
        for report in reports {
            summary.add_result(&report.result);
        }
        summary
    }
}

/// Options for execution
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Don't make changes, just show what would happen
    pub dry_run: bool,
    /// Number of independent components applied in parallel
    pub jobs: usize,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            jobs: 4,
        }
    }
}
