//! Execution engine for converge
//!
//! The engine wires the declarative library to the terminal:
//! 1. Displaying - Show the plan's diffs and blocked resources
//! 2. Executing - Confirm, apply with progress, and summarize

pub mod differ;
pub mod executor;

pub use executor::{ExecuteOptions, execute};
