//! Error types for the declarative crate
//!
//! Every failure is returned to the caller as a typed value; nothing in
//! this crate logs or retries.

use crate::graph::ResourceRef;
use std::fmt;
use thiserror::Error;

/// A single property-level validation failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A mandatory property was omitted and has no default
    #[error("missing required property '{name}'")]
    MissingRequiredProperty { name: String },

    /// The value is not one of the property's allowed values
    #[error("invalid value {given} for '{name}' (allowed: {})", .allowed.join(", "))]
    InvalidEnumValue {
        name: String,
        given: String,
        allowed: Vec<String>,
    },

    /// The value has the wrong shape or failed a format validator
    #[error("invalid value for '{name}': {reason}")]
    InvalidFormat { name: String, reason: String },

    /// The declaration names a property the schema does not define
    #[error("unknown property '{name}'")]
    UnknownProperty { name: String },

    /// The resource identity is empty
    #[error("resource identity cannot be empty")]
    EmptyIdentity,

    /// No schema is registered for the resource type
    #[error("unknown resource type '{type_name}'")]
    UnknownResourceType { type_name: String },
}

/// All validation failures for one resource declaration
///
/// Construction reports every failing property at once rather than
/// stopping at the first one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorError {
    pub type_name: String,
    pub identity: String,
    pub errors: Vec<ValidationError>,
}

impl DescriptorError {
    pub fn reference(&self) -> ResourceRef {
        ResourceRef::new(&self.type_name, &self.identity)
    }

    /// The first failure reported (unknown keys precede property failures)
    pub fn first(&self) -> Option<&ValidationError> {
        self.errors.first()
    }

    /// Whether any failure matches the predicate
    pub fn any<F>(&self, predicate: F) -> bool
    where
        F: Fn(&ValidationError) -> bool,
    {
        self.errors.iter().any(predicate)
    }
}

impl fmt::Display for DescriptorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}[{}]: ", self.type_name, self.identity)?;
        for (i, err) in self.errors.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for DescriptorError {}

/// Errors raised while ordering resources
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// The ordering edges form a cycle
    #[error("dependency cycle: {}", format_cycle(.cycle))]
    DependencyCycle { cycle: Vec<ResourceRef> },

    /// An edge refers to a resource that was not declared
    #[error("{reference} is referenced by an ordering edge but not declared")]
    UnknownResource { reference: ResourceRef },
}

fn format_cycle(cycle: &[ResourceRef]) -> String {
    let mut parts: Vec<String> = cycle.iter().map(ToString::to_string).collect();
    if let Some(first) = cycle.first() {
        parts.push(first.to_string());
    }
    parts.join(" -> ")
}

/// Failure reported by an external state reader
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to read state of {reference}: {reason}")]
pub struct StateReadError {
    pub reference: ResourceRef,
    pub reason: String,
}

impl StateReadError {
    pub fn new(reference: ResourceRef, reason: impl Into<String>) -> Self {
        Self {
            reference,
            reason: reason.into(),
        }
    }
}

/// Errors in resource type definitions
#[derive(Error, Debug)]
pub enum SchemaError {
    /// Two properties of one type share a name
    #[error("duplicate property '{property}' in type '{type_name}'")]
    DuplicateProperty { type_name: String, property: String },

    /// A property's default does not pass its own validation
    #[error("invalid default for '{type_name}.{property}': {source}")]
    InvalidDefault {
        type_name: String,
        property: String,
        #[source]
        source: ValidationError,
    },

    /// A definition names a validator that is not built in
    #[error("unknown validator '{name}'")]
    UnknownValidator { name: String },

    /// A type definition refers to a malformed resource reference
    #[error("invalid resource reference '{0}' (expected type[identity])")]
    InvalidReference(String),

    /// Type definition source failed to parse
    #[error("invalid type definitions: {0}")]
    Parse(#[from] toml::de::Error),

    /// The process-wide registry was already initialised
    #[error("schema registry already installed")]
    AlreadyInstalled,
}

/// Result type for schema operations
pub type Result<T> = std::result::Result<T, SchemaError>;

/// Errors raised while building a convergence plan
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// The same resource was declared twice
    #[error("{0} is declared more than once")]
    DuplicateResource(ResourceRef),

    /// The ordering edges are malformed for the whole graph
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// Current state could not be read
    #[error(transparent)]
    StateRead(#[from] StateReadError),
}
