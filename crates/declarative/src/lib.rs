//! # Declarative
//!
//! A declarative resource convergence engine.
//!
//! Resource types are described by schemas. A declaration is validated
//! against its schema into a [`ResourceDescriptor`], compared with a
//! [`RemoteSnapshot`] of the remote system to produce change operations,
//! and placed in a deterministic order that respects explicit and
//! synthesized ordering edges.
//!
//! ## Core Concepts
//!
//! - **ResourceSchema**: The properties a resource type accepts and how they are validated
//! - **ResourceDescriptor**: A validated declaration of one resource's desired state
//! - **ChangeOperation**: Create, update one property, or delete
//! - **ConvergencePlan**: Diffs grouped into independently ordered components
//! - **Executor**: Hands operations to an [`Applier`] with component parallelism
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{
//!     ConvergencePlan, Ensure, ExecuteOptions, SchemaRegistry, Value, execute_simple,
//! };
//! use std::collections::BTreeMap;
//!
//! let registry = SchemaRegistry::builtin();
//! let raw = BTreeMap::from([
//!     ("url".to_string(), Value::from("http://localhost:9090")),
//!     ("type".to_string(), Value::from("prometheus")),
//! ]);
//! let prom = registry.build("datasource", "prometheus", Ensure::Present, &raw)?;
//!
//! let plan = ConvergencePlan::build(vec![prom], &[], registry.auto_requires(), &reader)?;
//! let outcome = execute_simple(&plan, &applier, &ExecuteOptions::default())?;
//! ```
//!
//! ## Collaborator Traits
//!
//! - [`StateReader`]: Reads the current state of a resource
//! - [`Applier`]: Performs change operations
//! - [`ProgressCallback`]: Receives progress updates
//! - [`ConfirmCallback`]: Handles user confirmations
//!
//! The crate performs no I/O of its own and never logs; all failures are
//! returned as typed errors.

pub mod context;
pub mod diff;
pub mod error;
pub mod executor;
pub mod graph;
pub mod planner;
pub mod registry;
pub mod resource;
pub mod schema;
pub mod types;
pub mod value;

// Re-export main types at crate root
pub use context::{
    Applier, AutoConfirm, AutoDecline, ConfirmCallback, NoProgress, ProgressCallback, StateReader,
};
pub use diff::{
    ChangeOperation, DiffSummary, ResourceDiff, apply_operation, converge_snapshot, diff,
};
pub use error::{
    DescriptorError, PlanError, ResolveError, SchemaError, StateReadError, ValidationError,
};
pub use executor::{ExecuteOutcome, execute, execute_simple};
pub use graph::{
    AutoRequire, Component, OrderingEdge, ResourceRef, auto_edges, dependents, resolve,
    resolve_components,
};
pub use planner::{
    BlockedComponent, ConvergencePlan, PlannedChange, PlannedComponent, matches_target,
    ordering_edges,
};
pub use registry::{SchemaRegistry, global};
pub use resource::{Ensure, ResourceDescriptor};
pub use schema::{
    Comparison, PropertyKind, PropertySchema, ResourceSchema, Validator, ValueType,
};
pub use types::{ApplyResult, ExecuteOptions, ExecuteSummary, OperationReport, RemoteSnapshot};
pub use value::Value;
