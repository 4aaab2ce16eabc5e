//! Property and resource schemas
//!
//! A resource type is a fixed, ordered list of [`PropertySchema`]s. Each one
//! carries its own validation rules, so there is a single validation path
//! for every type instead of ad hoc checks per resource.

use crate::error::{Result, SchemaError, ValidationError};
use crate::value::Value;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

/// Whether an attribute is client-side only or reflects remote state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PropertyKind {
    /// Locates or configures the resource client-side; never diffed
    Parameter,
    /// Remote state; diffed against the current snapshot
    #[default]
    Property,
}

/// Expected shape of a property value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    #[default]
    Any,
    String,
    /// Accepts booleans and the strings "true"/"false"
    Boolean,
    Integer,
    /// Accepts floats, integers and numeric strings
    Float,
    /// Accepts a list of strings or a single string
    StringList,
    Map,
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parameter => write!(f, "parameter"),
            Self::Property => write!(f, "property"),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Any => "any",
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::StringList => "string_list",
            Self::Map => "map",
        };
        f.write_str(name)
    }
}

/// How desired and current values are compared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Comparison {
    #[default]
    Exact,
    /// Lists compare as multisets
    Unordered,
}

/// Signature of a format check; the error string becomes the reason
pub type ValidatorFn = fn(&Value) -> std::result::Result<(), String>;

/// A named, pure format check
#[derive(Clone, Copy)]
pub struct Validator {
    pub name: &'static str,
    check: ValidatorFn,
}

impl Validator {
    pub const fn new(name: &'static str, check: ValidatorFn) -> Self {
        Self { name, check }
    }

    pub fn check(&self, value: &Value) -> std::result::Result<(), String> {
        (self.check)(value)
    }

    /// Look up a built-in validator by name
    pub fn builtin(name: &str) -> Option<Self> {
        BUILTIN_VALIDATORS.iter().find(|v| v.name == name).copied()
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Validator").field(&self.name).finish()
    }
}

/// Validators addressable by name from type definitions
pub const BUILTIN_VALIDATORS: &[Validator] = &[
    Validator::new("http_url", http_url),
    Validator::new("absolute_path", absolute_path),
    Validator::new("non_empty", non_empty),
];

static HTTP_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://[^\s/?#]+[^\s]*$").expect("http url pattern is valid")
});

/// Absolute URL with an http or https scheme and a host
pub fn http_url(value: &Value) -> std::result::Result<(), String> {
    match value {
        Value::String(s) if HTTP_URL.is_match(s) => Ok(()),
        Value::String(s) => Err(format!("{s} is not a valid URL")),
        other => Err(format!("expected URL string, got {}", other.kind_name())),
    }
}

/// Path starting with '/'
pub fn absolute_path(value: &Value) -> std::result::Result<(), String> {
    match value {
        Value::String(s) if s.starts_with('/') => Ok(()),
        Value::String(s) => Err(format!("{s} is not an absolute path")),
        other => Err(format!("expected path string, got {}", other.kind_name())),
    }
}

/// Non-blank string or non-empty collection
pub fn non_empty(value: &Value) -> std::result::Result<(), String> {
    let empty = match value {
        Value::String(s) => s.trim().is_empty(),
        Value::List(items) => items.is_empty(),
        Value::Map(map) => map.is_empty(),
        Value::Null => true,
        Value::Bool(_) | Value::Integer(_) | Value::Float(_) => false,
    };
    if empty {
        Err("value cannot be empty".to_string())
    } else {
        Ok(())
    }
}

/// One manageable attribute of a resource type
#[derive(Debug, Clone)]
pub struct PropertySchema {
    pub name: String,
    pub kind: PropertyKind,
    pub value_type: ValueType,
    pub validator: Option<Validator>,
    pub allowed_values: Option<Vec<Value>>,
    pub default: Option<Value>,
    pub required: bool,
    pub comparison: Comparison,
    /// Values must be redacted when displayed
    pub sensitive: bool,
    pub description: Option<String>,
}

impl PropertySchema {
    fn new(name: impl Into<String>, kind: PropertyKind) -> Self {
        Self {
            name: name.into(),
            kind,
            value_type: ValueType::Any,
            validator: None,
            allowed_values: None,
            default: None,
            required: false,
            comparison: Comparison::Exact,
            sensitive: false,
            description: None,
        }
    }

    /// A remote-state property, diffed against snapshots
    pub fn property(name: impl Into<String>) -> Self {
        Self::new(name, PropertyKind::Property)
    }

    /// A client-side parameter, never diffed
    pub fn parameter(name: impl Into<String>) -> Self {
        Self::new(name, PropertyKind::Parameter)
    }

    pub fn value_type(mut self, value_type: ValueType) -> Self {
        self.value_type = value_type;
        self
    }

    pub fn validator(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn allowed<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.allowed_values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn unordered(mut self) -> Self {
        self.comparison = Comparison::Unordered;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn is_property(&self) -> bool {
        self.kind == PropertyKind::Property
    }

    /// Validate a raw value, substituting the default when it is omitted
    ///
    /// An explicit null counts as omitted. Optional properties without a
    /// default validate to [`Value::Null`].
    pub fn validate(&self, raw: Option<&Value>) -> std::result::Result<Value, ValidationError> {
        let raw = match raw {
            Some(value) if !value.is_null() => value,
            _ => {
                if let Some(default) = &self.default {
                    return Ok(default.clone());
                }
                if self.required {
                    return Err(ValidationError::MissingRequiredProperty {
                        name: self.name.clone(),
                    });
                }
                return Ok(Value::Null);
            }
        };

        let value = self.normalize(raw).map_err(|reason| self.format_error(reason))?;
        self.check_allowed(&value)?;

        if let Some(validator) = &self.validator {
            match &value {
                Value::List(items) if self.value_type == ValueType::StringList => {
                    for item in items {
                        validator.check(item).map_err(|r| self.format_error(r))?;
                    }
                }
                other => validator.check(other).map_err(|r| self.format_error(r))?,
            }
        }

        Ok(value)
    }

    /// Compare two values using this property's equality notion
    pub fn values_equal(&self, desired: &Value, current: &Value) -> bool {
        match (self.comparison, desired, current) {
            (Comparison::Unordered, Value::List(a), Value::List(b)) => same_elements(a, b),
            _ => desired == current,
        }
    }

    fn normalize(&self, raw: &Value) -> std::result::Result<Value, String> {
        let mismatch = |expected: &str| format!("expected {expected}, got {}", raw.kind_name());
        match (self.value_type, raw) {
            (ValueType::Any, value) => Ok(value.clone()),
            (ValueType::String, Value::String(_)) => Ok(raw.clone()),
            (ValueType::String, _) => Err(mismatch("string")),
            (ValueType::Boolean, Value::Bool(_)) => Ok(raw.clone()),
            (ValueType::Boolean, Value::String(s)) => match s.as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(format!("expected true or false, got {s}")),
            },
            (ValueType::Boolean, _) => Err(mismatch("boolean")),
            (ValueType::Integer, Value::Integer(_)) => Ok(raw.clone()),
            (ValueType::Integer, Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .map(Value::Integer)
                .map_err(|_| format!("expected integer, got {s}")),
            (ValueType::Integer, _) => Err(mismatch("integer")),
            (ValueType::Float, Value::Float(_)) => Ok(raw.clone()),
            (ValueType::Float, Value::Integer(n)) => Ok(Value::Float(*n as f64)),
            (ValueType::Float, Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| format!("expected float, got {s}")),
            (ValueType::Float, _) => Err(mismatch("float")),
            (ValueType::StringList, Value::String(s)) => Ok(Value::strings([s.as_str()])),
            (ValueType::StringList, Value::List(items)) => {
                if items.iter().all(|item| matches!(item, Value::String(_))) {
                    Ok(raw.clone())
                } else {
                    Err("expected a list of strings".to_string())
                }
            }
            (ValueType::StringList, _) => Err(mismatch("list of strings")),
            (ValueType::Map, Value::Map(_)) => Ok(raw.clone()),
            (ValueType::Map, _) => Err(mismatch("map")),
        }
    }

    fn check_allowed(&self, value: &Value) -> std::result::Result<(), ValidationError> {
        let Some(allowed) = &self.allowed_values else {
            return Ok(());
        };
        if allowed.contains(value) {
            return Ok(());
        }
        Err(ValidationError::InvalidEnumValue {
            name: self.name.clone(),
            given: bare(value),
            allowed: allowed.iter().map(bare).collect(),
        })
    }

    fn format_error(&self, reason: String) -> ValidationError {
        ValidationError::InvalidFormat {
            name: self.name.clone(),
            reason,
        }
    }
}

fn bare(value: &Value) -> String {
    value
        .as_str()
        .map(ToString::to_string)
        .unwrap_or_else(|| value.to_string())
}

fn same_elements(a: &[Value], b: &[Value]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut used = vec![false; b.len()];
    a.iter().all(|item| {
        let found = b
            .iter()
            .enumerate()
            .find(|(i, candidate)| !used[*i] && *candidate == item)
            .map(|(i, _)| i);
        match found {
            Some(i) => {
                used[i] = true;
                true
            }
            None => false,
        }
    })
}

/// The ordered property set of one resource type
#[derive(Debug, Clone)]
pub struct ResourceSchema {
    pub type_name: String,
    pub description: Option<String>,
    properties: Vec<PropertySchema>,
}

impl ResourceSchema {
    /// Build a schema, rejecting duplicate names and invalid defaults
    ///
    /// Defaults are stored in normalised form, so an omitted value and the
    /// same value written out explicitly validate identically.
    pub fn new(type_name: impl Into<String>, mut properties: Vec<PropertySchema>) -> Result<Self> {
        let type_name = type_name.into();

        for i in 0..properties.len() {
            let (earlier, rest) = properties.split_at_mut(i);
            let property = &mut rest[0];
            if earlier.iter().any(|p| p.name == property.name) {
                return Err(SchemaError::DuplicateProperty {
                    type_name,
                    property: property.name.clone(),
                });
            }
            if let Some(default) = property.default.take() {
                let normalised =
                    property
                        .validate(Some(&default))
                        .map_err(|source| SchemaError::InvalidDefault {
                            type_name: type_name.clone(),
                            property: property.name.clone(),
                            source,
                        })?;
                property.default = Some(normalised);
            }
        }

        Ok(Self {
            type_name,
            description: None,
            properties,
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Look up a property by name
    pub fn property(&self, name: &str) -> Option<&PropertySchema> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// All attributes in declaration order
    pub fn properties(&self) -> &[PropertySchema] {
        &self.properties
    }

    /// Remote-state properties in declaration order
    pub fn managed_properties(&self) -> impl Iterator<Item = &PropertySchema> {
        self.properties.iter().filter(|p| p.is_property())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url_property() -> PropertySchema {
        PropertySchema::property("url")
            .value_type(ValueType::String)
            .validator(Validator::new("http_url", http_url))
    }

    #[test]
    fn test_http_url_validator() {
        let schema = url_property();
        assert_eq!(
            schema.validate(Some(&"https://example.com".into())),
            Ok(Value::from("https://example.com"))
        );
        assert!(matches!(
            schema.validate(Some(&"ftp://x".into())),
            Err(ValidationError::InvalidFormat { name, .. }) if name == "url"
        ));
        assert!(schema.validate(Some(&"http://".into())).is_err());
    }

    #[test]
    fn test_default_used_when_omitted() {
        let schema = PropertySchema::property("access_mode")
            .allowed(["direct", "proxy"])
            .default_value("direct");
        assert_eq!(schema.validate(None), Ok(Value::from("direct")));
        assert_eq!(schema.validate(Some(&Value::Null)), Ok(Value::from("direct")));
    }

    #[test]
    fn test_missing_required() {
        let schema = url_property().required();
        assert_eq!(
            schema.validate(None),
            Err(ValidationError::MissingRequiredProperty {
                name: "url".to_string()
            })
        );
    }

    #[test]
    fn test_optional_without_default_is_null() {
        assert_eq!(url_property().validate(None), Ok(Value::Null));
    }

    #[test]
    fn test_invalid_enum_value() {
        let schema = PropertySchema::property("access_mode").allowed(["direct", "proxy"]);
        assert_eq!(
            schema.validate(Some(&"tunnel".into())),
            Err(ValidationError::InvalidEnumValue {
                name: "access_mode".to_string(),
                given: "tunnel".to_string(),
                allowed: vec!["direct".to_string(), "proxy".to_string()],
            })
        );
    }

    #[test]
    fn test_boolean_accepts_strings() {
        let schema = PropertySchema::property("is_default").value_type(ValueType::Boolean);
        assert_eq!(schema.validate(Some(&"true".into())), Ok(Value::Bool(true)));
        assert_eq!(schema.validate(Some(&false.into())), Ok(Value::Bool(false)));
        assert!(schema.validate(Some(&"yes".into())).is_err());
    }

    #[test]
    fn test_float_accepts_integers_and_strings() {
        let schema = PropertySchema::property("ratio").value_type(ValueType::Float);
        assert_eq!(schema.validate(Some(&Value::Float(0.5))), Ok(Value::Float(0.5)));
        assert_eq!(schema.validate(Some(&2.into())), Ok(Value::Float(2.0)));
        assert_eq!(schema.validate(Some(&"1.25".into())), Ok(Value::Float(1.25)));
        assert!(schema.validate(Some(&"fast".into())).is_err());
        assert!(schema.validate(Some(&true.into())).is_err());
    }

    #[test]
    fn test_string_list_validates_each_item() {
        let schema = PropertySchema::property("cgroups")
            .value_type(ValueType::StringList)
            .validator(Validator::new("absolute_path", absolute_path));
        assert_eq!(
            schema.validate(Some(&"/var/lib/test1".into())),
            Ok(Value::strings(["/var/lib/test1"]))
        );
        let err = schema
            .validate(Some(&Value::strings(["/ok", "relative"])))
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidFormat { .. }));
    }

    #[test]
    fn test_unordered_comparison() {
        let schema = PropertySchema::property("cgroups").unordered();
        let a = Value::strings(["a", "b", "a"]);
        assert!(schema.values_equal(&a, &Value::strings(["b", "a", "a"])));
        assert!(!schema.values_equal(&a, &Value::strings(["a", "b", "b"])));
        assert!(!url_property().values_equal(&a, &Value::strings(["b", "a", "a"])));
    }

    #[test]
    fn test_schema_rejects_duplicates_and_bad_defaults() {
        let dup = ResourceSchema::new(
            "thing",
            vec![PropertySchema::property("a"), PropertySchema::parameter("a")],
        );
        assert!(matches!(dup, Err(SchemaError::DuplicateProperty { .. })));

        let bad_default = ResourceSchema::new("thing", vec![url_property().default_value("")]);
        assert!(matches!(bad_default, Err(SchemaError::InvalidDefault { .. })));
    }

    #[test]
    fn test_managed_properties_skip_parameters() {
        let schema = ResourceSchema::new(
            "thing",
            vec![
                PropertySchema::parameter("endpoint"),
                PropertySchema::property("a"),
                PropertySchema::property("b"),
            ],
        )
        .unwrap();
        let names: Vec<_> = schema.managed_properties().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[test]
    fn test_builtin_lookup() {
        assert_eq!(Validator::builtin("http_url").map(|v| v.name), Some("http_url"));
        assert!(Validator::builtin("nope").is_none());
    }
}
