//! State diffing
//!
//! Compares a descriptor against a snapshot of remote state and emits the
//! minimal ordered list of change operations. Properties are always
//! compared in schema declaration order, so identical inputs give
//! identical output.

use crate::graph::ResourceRef;
use crate::resource::{Ensure, ResourceDescriptor};
use crate::types::RemoteSnapshot;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One change to apply to the remote system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeOperation {
    /// Create the resource with all desired values
    Create,
    /// Change one property
    Update {
        property: String,
        old: Value,
        new: Value,
    },
    /// Remove the resource
    Delete,
}

impl fmt::Display for ChangeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update { property, old, new } => write!(f, "{property}: {old} -> {new}"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// Compute the change operations that converge `current` to `desired`
///
/// Unmanaged properties (desired value null) and parameters are never
/// compared. Absent resources ignore property values entirely.
pub fn diff(desired: &ResourceDescriptor, current: &RemoteSnapshot) -> Vec<ChangeOperation> {
    match (desired.ensure(), current.exists) {
        (Ensure::Present, false) => vec![ChangeOperation::Create],
        (Ensure::Absent, true) => vec![ChangeOperation::Delete],
        (Ensure::Absent, false) => Vec::new(),
        (Ensure::Present, true) => desired
            .schema()
            .managed_properties()
            .filter_map(|property| {
                let new = desired.value(&property.name)?;
                if new.is_null() {
                    return None;
                }
                let old = current.value(&property.name);
                if property.values_equal(new, old) {
                    return None;
                }
                Some(ChangeOperation::Update {
                    property: property.name.clone(),
                    old: old.clone(),
                    new: new.clone(),
                })
            })
            .collect(),
    }
}

/// Conceptually apply operations to a snapshot
///
/// `Create` sets every managed desired value, `Update` sets one property
/// and `Delete` clears the snapshot.
pub fn converge_snapshot(
    desired: &ResourceDescriptor,
    current: &RemoteSnapshot,
    operations: &[ChangeOperation],
) -> RemoteSnapshot {
    let mut snapshot = current.clone();
    for operation in operations {
        apply_operation(&mut snapshot, desired, operation);
    }
    snapshot
}

/// Apply a single operation to a snapshot in place
pub fn apply_operation(
    snapshot: &mut RemoteSnapshot,
    desired: &ResourceDescriptor,
    operation: &ChangeOperation,
) {
    match operation {
        ChangeOperation::Create => {
            snapshot.exists = true;
            snapshot.values = desired.managed_values();
        }
        ChangeOperation::Update { property, new, .. } => {
            snapshot.values.insert(property.clone(), new.clone());
        }
        ChangeOperation::Delete => {
            snapshot.exists = false;
            snapshot.values.clear();
        }
    }
}

/// The changes computed for one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDiff {
    pub resource: ResourceRef,
    pub operations: Vec<ChangeOperation>,
}

impl ResourceDiff {
    /// Check if this diff represents an addition
    pub fn is_addition(&self) -> bool {
        matches!(self.operations.as_slice(), [ChangeOperation::Create])
    }

    /// Check if this diff represents a removal
    pub fn is_removal(&self) -> bool {
        matches!(self.operations.as_slice(), [ChangeOperation::Delete])
    }

    /// Check if this diff represents a modification
    pub fn is_modification(&self) -> bool {
        !self.operations.is_empty()
            && self
                .operations
                .iter()
                .all(|op| matches!(op, ChangeOperation::Update { .. }))
    }
}

/// Diff summary statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffSummary {
    /// Number of resources to add
    pub additions: usize,
    /// Number of resources to remove
    pub removals: usize,
    /// Number of resources to modify
    pub modifications: usize,
    /// Number of property updates across modified resources
    pub property_updates: usize,
}

impl DiffSummary {
    /// Create a summary from a list of diffs
    pub fn from_diffs<'a, I>(diffs: I) -> Self
    where
        I: IntoIterator<Item = &'a ResourceDiff>,
    {
        let mut summary = Self::default();
        for diff in diffs {
            if diff.is_addition() {
                summary.additions += 1;
            } else if diff.is_removal() {
                summary.removals += 1;
            } else if diff.is_modification() {
                summary.modifications += 1;
                summary.property_updates += diff.operations.len();
            }
        }
        summary
    }

    /// Total number of changed resources
    pub fn total(&self) -> usize {
        self.additions + self.removals + self.modifications
    }

    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }
}
