//! Resource descriptors
//!
//! A [`ResourceDescriptor`] is one validated desired-state declaration.
//! It is immutable once built; redeclaring a resource means building a
//! new descriptor.

use crate::error::{DescriptorError, ValidationError};
use crate::graph::ResourceRef;
use crate::schema::ResourceSchema;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Target existence state of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Ensure {
    #[default]
    Present,
    Absent,
}

impl fmt::Display for Ensure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Present => write!(f, "present"),
            Self::Absent => write!(f, "absent"),
        }
    }
}

impl FromStr for Ensure {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "present" => Ok(Self::Present),
            "absent" => Ok(Self::Absent),
            other => Err(ValidationError::InvalidEnumValue {
                name: "ensure".to_string(),
                given: other.to_string(),
                allowed: vec!["present".to_string(), "absent".to_string()],
            }),
        }
    }
}

/// A validated desired-state declaration
#[derive(Debug, Clone)]
pub struct ResourceDescriptor {
    schema: Arc<ResourceSchema>,
    identity: String,
    ensure: Ensure,
    values: BTreeMap<String, Value>,
}

impl ResourceDescriptor {
    /// Validate raw values against `schema` and build a descriptor
    ///
    /// Every failure is collected; on error nothing is returned but the
    /// complete list. Required properties are only enforced when the
    /// resource should be present.
    pub fn build(
        schema: Arc<ResourceSchema>,
        identity: impl Into<String>,
        ensure: Ensure,
        raw_values: &BTreeMap<String, Value>,
    ) -> Result<Self, DescriptorError> {
        let identity = identity.into();
        let mut errors = Vec::new();

        if identity.trim().is_empty() {
            errors.push(ValidationError::EmptyIdentity);
        }

        for name in raw_values.keys() {
            if schema.property(name).is_none() {
                errors.push(ValidationError::UnknownProperty { name: name.clone() });
            }
        }

        let mut values = BTreeMap::new();
        for property in schema.properties() {
            match property.validate(raw_values.get(&property.name)) {
                Ok(value) => {
                    values.insert(property.name.clone(), value);
                }
                Err(ValidationError::MissingRequiredProperty { .. })
                    if ensure == Ensure::Absent =>
                {
                    values.insert(property.name.clone(), Value::Null);
                }
                Err(err) => errors.push(err),
            }
        }

        if !errors.is_empty() {
            return Err(DescriptorError {
                type_name: schema.type_name.clone(),
                identity,
                errors,
            });
        }

        Ok(Self {
            schema,
            identity,
            ensure,
            values,
        })
    }

    pub fn type_name(&self) -> &str {
        &self.schema.type_name
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn ensure(&self) -> Ensure {
        self.ensure
    }

    pub fn schema(&self) -> &ResourceSchema {
        &self.schema
    }

    /// Validated value of a property or parameter
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// All validated values, keyed by property name
    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    /// Desired values of managed (non-null) remote-state properties
    pub fn managed_values(&self) -> BTreeMap<String, Value> {
        self.schema
            .managed_properties()
            .filter_map(|p| {
                self.values
                    .get(&p.name)
                    .filter(|v| !v.is_null())
                    .map(|v| (p.name.clone(), v.clone()))
            })
            .collect()
    }

    pub fn reference(&self) -> ResourceRef {
        ResourceRef::new(self.type_name(), &self.identity)
    }
}
