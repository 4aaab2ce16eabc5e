//! Collaborator traits
//!
//! These traits let the engine run without depending on any concrete
//! backend, UI or prompt implementation. Reading remote state and
//! applying changes both happen outside this crate.

use crate::diff::ChangeOperation;
use crate::error::StateReadError;
use crate::graph::ResourceRef;
use crate::resource::ResourceDescriptor;
use crate::types::{ApplyResult, RemoteSnapshot};
use anyhow::Result;
use std::collections::BTreeMap;

/// Reads the current remote state of a resource
///
/// Implementations may perform network or file I/O. Failures are
/// propagated to the caller unchanged; retry policy belongs to the caller.
pub trait StateReader: Send + Sync {
    fn read(&self, type_name: &str, identity: &str) -> Result<RemoteSnapshot, StateReadError>;
}

/// A fixed set of snapshots; undeclared resources read as absent
impl StateReader for BTreeMap<ResourceRef, RemoteSnapshot> {
    fn read(&self, type_name: &str, identity: &str) -> Result<RemoteSnapshot, StateReadError> {
        Ok(self
            .get(&ResourceRef::new(type_name, identity))
            .cloned()
            .unwrap_or_default())
    }
}

/// Applies change operations to the remote system
///
/// The executor calls this in resolved order and never concurrently for
/// resources that share an ordering edge.
pub trait Applier: Send + Sync {
    fn apply(&self, descriptor: &ResourceDescriptor, operation: &ChangeOperation) -> Result<()>;
}

/// Progress callback for execution operations
///
/// Implement this trait to receive progress updates during execution.
pub trait ProgressCallback: Send {
    /// Called before a component of the plan starts
    fn on_batch_start(&mut self, count: usize);

    /// Called when an operation finishes
    fn on_operation_complete(
        &mut self,
        resource: &ResourceRef,
        operation: &ChangeOperation,
        result: &ApplyResult,
    );

    /// Called when every component has finished
    fn on_batch_complete(&mut self);
}

/// Confirmation callback for user interaction
pub trait ConfirmCallback: Send {
    /// Ask the user to confirm an action
    ///
    /// # Returns
    /// `true` if the user confirmed, `false` otherwise
    fn confirm(&mut self, prompt: &str) -> Result<bool>;
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_batch_start(&mut self, _count: usize) {}
    fn on_operation_complete(
        &mut self,
        _resource: &ResourceRef,
        _operation: &ChangeOperation,
        _result: &ApplyResult,
    ) {
    }
    fn on_batch_complete(&mut self) {}
}

/// Auto-confirm callback (always returns true)
pub struct AutoConfirm;

impl ConfirmCallback for AutoConfirm {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Auto-decline callback (always returns false)
pub struct AutoDecline;

impl ConfirmCallback for AutoDecline {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(false)
    }
}
