//! Schema registry
//!
//! Holds the resource types known to the process. A registry is assembled
//! at startup (built-in types plus TOML definitions), installed once, and
//! read-only from then on.
//!
//! ## Definition format
//!
//! ```toml
//! [[type]]
//! name = "alert_channel"
//! autorequire = ["service[grafana-server]"]
//!
//! [[type.property]]
//! name = "endpoint"
//! type = "string"
//! validator = "http_url"
//! required = true
//!
//! [[type.property]]
//! name = "severity"
//! allowed = ["info", "critical"]
//! default = "critical"
//! ```

use crate::error::{DescriptorError, Result, SchemaError, ValidationError};
use crate::graph::{AutoRequire, ResourceRef};
use crate::resource::{Ensure, ResourceDescriptor};
use crate::schema::{
    Comparison, PropertyKind, PropertySchema, ResourceSchema, Validator, ValueType, absolute_path,
    http_url,
};
use crate::value::Value;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

static GLOBAL: OnceLock<SchemaRegistry> = OnceLock::new();

/// Resource types and their auto-require conventions
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    types: BTreeMap<String, Arc<ResourceSchema>>,
    rules: Vec<AutoRequire>,
}

impl SchemaRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in resource types
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        let types = builtin_types().expect("built-in resource types are well-formed");
        for (schema, rules) in types {
            registry.register(schema, rules);
        }
        registry
    }

    /// Add or replace a type together with its auto-require rules
    pub fn register(&mut self, schema: ResourceSchema, rules: Vec<AutoRequire>) {
        let type_name = schema.type_name.clone();
        self.rules.retain(|r| r.dependent_type != type_name);
        self.rules.extend(rules);
        self.types.insert(type_name, Arc::new(schema));
    }

    /// Add the types defined in a TOML document
    pub fn load_toml(&mut self, source: &str) -> Result<()> {
        let definitions: Definitions = toml::from_str(source)?;
        for definition in definitions.types {
            let (schema, rules) = definition.into_schema()?;
            self.register(schema, rules);
        }
        Ok(())
    }

    /// Look up a resource type
    pub fn get(&self, type_name: &str) -> Option<Arc<ResourceSchema>> {
        self.types.get(type_name).cloned()
    }

    /// All registered types, sorted by name
    pub fn types(&self) -> impl Iterator<Item = &ResourceSchema> {
        self.types.values().map(AsRef::as_ref)
    }

    /// Auto-require conventions for all registered types
    pub fn auto_requires(&self) -> &[AutoRequire] {
        &self.rules
    }

    /// Build a descriptor for a registered type
    pub fn build(
        &self,
        type_name: &str,
        identity: &str,
        ensure: Ensure,
        raw_values: &BTreeMap<String, Value>,
    ) -> std::result::Result<ResourceDescriptor, DescriptorError> {
        let schema = self.get(type_name).ok_or_else(|| DescriptorError {
            type_name: type_name.to_string(),
            identity: identity.to_string(),
            errors: vec![ValidationError::UnknownResourceType {
                type_name: type_name.to_string(),
            }],
        })?;
        ResourceDescriptor::build(schema, identity, ensure, raw_values)
    }

    /// Make this registry the process-wide one
    ///
    /// Fails if a registry was already installed or [`global`] has
    /// already been called.
    pub fn install(self) -> Result<&'static Self> {
        let mut slot = Some(self);
        let installed = GLOBAL.get_or_init(|| slot.take().unwrap_or_default());
        if slot.is_some() {
            return Err(SchemaError::AlreadyInstalled);
        }
        Ok(installed)
    }
}

/// The process-wide registry; the built-in types unless one was installed
pub fn global() -> &'static SchemaRegistry {
    GLOBAL.get_or_init(SchemaRegistry::builtin)
}

fn builtin_types() -> Result<Vec<(ResourceSchema, Vec<AutoRequire>)>> {
    let url = || Validator::new("http_url", http_url);

    let datasource = ResourceSchema::new(
        "datasource",
        vec![
            PropertySchema::parameter("grafana_url")
                .value_type(ValueType::String)
                .validator(url())
                .describe("The URL of the Grafana server"),
            PropertySchema::parameter("grafana_user")
                .value_type(ValueType::String)
                .describe("The username for the Grafana server"),
            PropertySchema::parameter("grafana_password")
                .value_type(ValueType::String)
                .sensitive()
                .describe("The password for the Grafana server"),
            PropertySchema::property("url")
                .value_type(ValueType::String)
                .validator(url())
                .required()
                .describe("The URL of the datasource"),
            PropertySchema::property("type")
                .value_type(ValueType::String)
                .required()
                .describe("The datasource type"),
            PropertySchema::property("user")
                .value_type(ValueType::String)
                .describe("The username for the datasource"),
            PropertySchema::property("password")
                .value_type(ValueType::String)
                .sensitive()
                .describe("The password for the datasource"),
            PropertySchema::property("database")
                .value_type(ValueType::String)
                .describe("The name of the database"),
            PropertySchema::property("access_mode")
                .value_type(ValueType::String)
                .allowed(["direct", "proxy"])
                .default_value("direct")
                .describe("Whether the datasource is accessed directly or not by the clients"),
            PropertySchema::property("is_default")
                .value_type(ValueType::Boolean)
                .default_value(false)
                .describe("Whether the datasource is the default one"),
            PropertySchema::property("json_data")
                .value_type(ValueType::Map)
                .describe("Additional JSON data to configure the datasource"),
        ],
    );

    let cgroups = ResourceSchema::new(
        "collectd_plugin_cgroups",
        vec![
            PropertySchema::property("cgroups")
                .value_type(ValueType::StringList)
                .validator(Validator::new("absolute_path", absolute_path))
                .default_value(Value::List(Vec::new()))
                .describe("Cgroups to select or ignore"),
            PropertySchema::property("ignore_selected")
                .value_type(ValueType::Boolean)
                .default_value(false)
                .describe("Invert the cgroup selection"),
        ],
    );

    let service = ResourceSchema::new(
        "service",
        vec![
            PropertySchema::property("enable")
                .value_type(ValueType::Boolean)
                .default_value(true)
                .describe("Whether the service starts at boot"),
        ],
    );

    Ok(vec![
        (
            datasource?.with_description("Manage datasources in Grafana"),
            vec![AutoRequire::new(
                "datasource",
                ResourceRef::new("service", "grafana-server"),
            )],
        ),
        (
            cgroups?.with_description("collectd cgroups plugin settings"),
            Vec::new(),
        ),
        (service?.with_description("A system service"), Vec::new()),
    ])
}

#[derive(Debug, Deserialize)]
struct Definitions {
    #[serde(rename = "type", default)]
    types: Vec<TypeDefinition>,
}

#[derive(Debug, Deserialize)]
struct TypeDefinition {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    autorequire: Vec<String>,
    #[serde(rename = "property", default)]
    properties: Vec<PropertyDefinition>,
}

#[derive(Debug, Deserialize)]
struct PropertyDefinition {
    name: String,
    #[serde(default)]
    kind: PropertyKind,
    #[serde(rename = "type", default)]
    value_type: ValueType,
    #[serde(default)]
    validator: Option<String>,
    #[serde(default)]
    allowed: Option<Vec<toml::Value>>,
    #[serde(default)]
    default: Option<toml::Value>,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    comparison: Comparison,
    #[serde(default)]
    sensitive: bool,
    #[serde(default)]
    description: Option<String>,
}

impl TypeDefinition {
    fn into_schema(self) -> Result<(ResourceSchema, Vec<AutoRequire>)> {
        let rules = self
            .autorequire
            .iter()
            .map(|r| Ok(AutoRequire::new(&self.name, r.parse::<ResourceRef>()?)))
            .collect::<Result<Vec<_>>>()?;

        let properties = self
            .properties
            .into_iter()
            .map(PropertyDefinition::into_property)
            .collect::<Result<Vec<_>>>()?;

        let mut schema = ResourceSchema::new(self.name, properties)?;
        schema.description = self.description;
        Ok((schema, rules))
    }
}

impl PropertyDefinition {
    fn into_property(self) -> Result<PropertySchema> {
        let validator = match self.validator {
            Some(name) => Some(
                Validator::builtin(&name).ok_or(SchemaError::UnknownValidator { name })?,
            ),
            None => None,
        };
        Ok(PropertySchema {
            name: self.name,
            kind: self.kind,
            value_type: self.value_type,
            validator,
            allowed_values: self
                .allowed
                .map(|values| values.into_iter().map(Value::from).collect()),
            default: self.default.map(Value::from),
            required: self.required,
            comparison: self.comparison,
            sensitive: self.sensitive,
            description: self.description,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::diff;
    use crate::types::RemoteSnapshot;

    #[test]
    fn test_builtin_types() {
        let registry = SchemaRegistry::builtin();
        let names: Vec<_> = registry.types().map(|t| t.type_name.as_str()).collect();
        assert_eq!(names, ["collectd_plugin_cgroups", "datasource", "service"]);

        let datasource = registry.get("datasource").unwrap();
        assert_eq!(datasource.properties().len(), 11);
        assert_eq!(datasource.managed_properties().count(), 8);
        assert!(datasource.property("password").unwrap().sensitive);

        assert_eq!(
            registry.auto_requires(),
            [AutoRequire::new(
                "datasource",
                ResourceRef::new("service", "grafana-server")
            )]
        );
    }

    #[test]
    fn test_build_datasource() {
        let registry = SchemaRegistry::builtin();
        let raw = BTreeMap::from([
            ("url".to_string(), Value::from("https://example.com")),
            ("type".to_string(), Value::from("prometheus")),
            ("is_default".to_string(), Value::from("true")),
        ]);
        let desc = registry
            .build("datasource", "prom", Ensure::Present, &raw)
            .unwrap();
        assert_eq!(desc.value("is_default"), Some(&Value::Bool(true)));
        assert_eq!(desc.value("access_mode"), Some(&Value::from("direct")));

        let bad = BTreeMap::from([
            ("url".to_string(), Value::from("ftp://x")),
            ("type".to_string(), Value::from("prometheus")),
        ]);
        let err = registry
            .build("datasource", "prom", Ensure::Present, &bad)
            .unwrap_err();
        assert!(matches!(
            err.first(),
            Some(ValidationError::InvalidFormat { name, .. }) if name == "url"
        ));
    }

    #[test]
    fn test_unknown_type() {
        let err = SchemaRegistry::new()
            .build("widget", "w", Ensure::Present, &BTreeMap::new())
            .unwrap_err();
        assert_eq!(
            err.errors,
            [ValidationError::UnknownResourceType {
                type_name: "widget".to_string()
            }]
        );
    }

    #[test]
    fn test_load_toml_definitions() {
        let mut registry = SchemaRegistry::builtin();
        registry
            .load_toml(
                r#"
[[type]]
name = "alert_channel"
description = "Alert notification channel"
autorequire = ["service[grafana-server]"]

[[type.property]]
name = "grafana_url"
kind = "parameter"
validator = "http_url"

[[type.property]]
name = "endpoint"
type = "string"
validator = "http_url"
required = true

[[type.property]]
name = "severity"
allowed = ["info", "critical"]
default = "critical"

[[type.property]]
name = "tags"
type = "string_list"
comparison = "unordered"
"#,
            )
            .unwrap();

        let schema = registry.get("alert_channel").unwrap();
        assert_eq!(schema.description.as_deref(), Some("Alert notification channel"));
        assert_eq!(schema.properties().len(), 4);
        assert_eq!(
            schema.property("grafana_url").unwrap().kind,
            PropertyKind::Parameter
        );
        assert_eq!(
            schema.property("tags").unwrap().comparison,
            Comparison::Unordered
        );
        assert_eq!(registry.auto_requires().len(), 2);

        let desc = registry
            .build(
                "alert_channel",
                "pager",
                Ensure::Present,
                &BTreeMap::from([("endpoint".to_string(), Value::from("https://pager.example"))]),
            )
            .unwrap();
        assert_eq!(desc.value("severity"), Some(&Value::from("critical")));
    }

    #[test]
    fn test_string_defaults_are_normalised() {
        let mut registry = SchemaRegistry::new();
        registry
            .load_toml(
                r#"
[[type]]
name = "exporter"

[[type.property]]
name = "enabled"
type = "boolean"
default = "false"

[[type.property]]
name = "paths"
type = "string_list"
validator = "absolute_path"
default = "/var"
"#,
            )
            .unwrap();

        let schema = registry.get("exporter").unwrap();
        assert_eq!(schema.property("enabled").unwrap().default, Some(Value::Bool(false)));
        assert_eq!(
            schema.property("paths").unwrap().default,
            Some(Value::strings(["/var"]))
        );

        let omitted = registry
            .build("exporter", "node", Ensure::Present, &BTreeMap::new())
            .unwrap();
        let explicit = registry
            .build(
                "exporter",
                "node",
                Ensure::Present,
                &BTreeMap::from([
                    ("enabled".to_string(), Value::from("false")),
                    ("paths".to_string(), Value::from("/var")),
                ]),
            )
            .unwrap();
        assert_eq!(omitted.values(), explicit.values());

        let converged = RemoteSnapshot::present(explicit.managed_values());
        assert!(diff(&omitted, &converged).is_empty());
    }

    #[test]
    fn test_load_toml_rejects_unknown_validator() {
        let err = SchemaRegistry::new()
            .load_toml(
                r#"
[[type]]
name = "thing"
[[type.property]]
name = "x"
validator = "email"
"#,
            )
            .unwrap_err();
        assert!(matches!(err, SchemaError::UnknownValidator { name } if name == "email"));
    }

    #[test]
    fn test_load_toml_rejects_bad_reference() {
        let err = SchemaRegistry::new()
            .load_toml("[[type]]\nname = \"thing\"\nautorequire = [\"grafana-server\"]\n")
            .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidReference(_)));
    }

    #[test]
    fn test_install_only_once() {
        let first = global();
        assert!(first.get("datasource").is_some());
        assert!(matches!(
            SchemaRegistry::new().install(),
            Err(SchemaError::AlreadyInstalled)
        ));
    }
}
