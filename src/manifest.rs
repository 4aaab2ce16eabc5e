//! Manifest loading
//!
//! A manifest declares resources, extra ordering edges, auto-require
//! conventions and where to find schema definitions and state:
//!
//! ```toml
//! [settings]
//! state_file = "~/.local/state/converge/grafana.json"
//! schemas = ["types/alerting.toml"]
//!
//! [[autorequire]]
//! type = "collectd_plugin_cgroups"
//! requires = "service[collectd]"
//!
//! [[resource]]
//! type = "datasource"
//! name = "prometheus"
//! require = ["service[prometheus]"]
//!
//! [resource.values]
//! url = "http://localhost:9090"
//! type = "prometheus"
//! ```

use anyhow::{Context, Result};
use declarative::{
    AutoRequire, DescriptorError, Ensure, OrderingEdge, ResourceDescriptor, ResourceRef,
    SchemaRegistry, Value,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default, rename = "autorequire")]
    pub autorequires: Vec<AutoRequireEntry>,
    #[serde(default, rename = "resource")]
    pub resources: Vec<ResourceEntry>,

    /// Directory relative paths are resolved against
    #[serde(skip)]
    base_dir: PathBuf,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Where observed state is kept
    #[serde(default)]
    pub state_file: Option<String>,
    /// Extra type definition files
    #[serde(default)]
    pub schemas: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AutoRequireEntry {
    #[serde(rename = "type")]
    pub dependent_type: String,
    pub requires: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceEntry {
    #[serde(rename = "type")]
    pub type_name: String,
    pub name: String,
    #[serde(default)]
    pub ensure: Ensure,
    /// Resources that must converge before this one
    #[serde(default)]
    pub require: Vec<String>,
    /// Resources that must converge after this one
    #[serde(default)]
    pub before: Vec<String>,
    #[serde(default)]
    pub values: toml::Table,
}

impl ResourceEntry {
    pub fn reference(&self) -> ResourceRef {
        ResourceRef::new(&self.type_name, &self.name)
    }

    fn raw_values(&self) -> BTreeMap<String, Value> {
        self.values
            .iter()
            .map(|(k, v)| (k.clone(), Value::from(v.clone())))
            .collect()
    }
}

impl Manifest {
    /// Load a manifest from disk
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
        let mut manifest = Self::parse(&content)
            .with_context(|| format!("Failed to parse manifest: {}", path.display()))?;
        manifest.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        log::debug!(
            "Loaded {} resources from {}",
            manifest.resources.len(),
            path.display()
        );
        Ok(manifest)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Expand `~` and environment variables, then resolve against the manifest directory
    pub fn resolve_path(&self, raw: &str) -> Result<PathBuf> {
        let expanded = shellexpand::full(raw)
            .with_context(|| format!("Failed to expand path: {raw}"))?;
        let path = PathBuf::from(expanded.as_ref());
        if path.is_absolute() {
            Ok(path)
        } else {
            Ok(self.base_dir.join(path))
        }
    }

    /// State file location: the override, then the manifest setting, then the default
    pub fn state_path(&self, state_override: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = state_override {
            return Ok(path.to_path_buf());
        }
        match &self.settings.state_file {
            Some(raw) => self.resolve_path(raw),
            None => default_state_file(),
        }
    }

    /// Built-in types plus every schema file the manifest names
    pub fn registry(&self) -> Result<SchemaRegistry> {
        let mut registry = SchemaRegistry::builtin();
        for raw in &self.settings.schemas {
            let path = self.resolve_path(raw)?;
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read type definitions: {}", path.display()))?;
            registry
                .load_toml(&content)
                .with_context(|| format!("Invalid type definitions in {}", path.display()))?;
            log::debug!("Loaded type definitions from {}", path.display());
        }
        Ok(registry)
    }

    /// Auto-require rules declared in the manifest
    pub fn auto_requires(&self) -> Result<Vec<AutoRequire>> {
        let mut rules = Vec::with_capacity(self.autorequires.len());
        for entry in &self.autorequires {
            let requires = entry
                .requires
                .parse::<ResourceRef>()
                .with_context(|| format!("Invalid autorequire for '{}'", entry.dependent_type))?;
            rules.push(AutoRequire::new(&entry.dependent_type, requires));
        }
        Ok(rules)
    }

    /// Explicit ordering edges from `require` and `before`
    pub fn edges(&self) -> Result<Vec<OrderingEdge>> {
        let mut edges = Vec::new();
        for entry in &self.resources {
            let this = entry.reference();
            for raw in &entry.require {
                let other = raw
                    .parse::<ResourceRef>()
                    .with_context(|| format!("Invalid require on {this}"))?;
                edges.push(OrderingEdge::new(other, this.clone()));
            }
            for raw in &entry.before {
                let other = raw
                    .parse::<ResourceRef>()
                    .with_context(|| format!("Invalid before on {this}"))?;
                edges.push(OrderingEdge::new(this.clone(), other));
            }
        }
        Ok(edges)
    }

    /// Every declared resource, in manifest order
    pub fn references(&self) -> Vec<ResourceRef> {
        self.resources.iter().map(ResourceEntry::reference).collect()
    }

    /// Validate every declaration, splitting valid descriptors from failures
    pub fn descriptors(&self, registry: &SchemaRegistry) -> Declarations {
        let mut declarations = Declarations::default();
        for entry in &self.resources {
            match registry.build(&entry.type_name, &entry.name, entry.ensure, &entry.raw_values()) {
                Ok(descriptor) => declarations.valid.push(descriptor),
                Err(e) => {
                    log::debug!("{e}");
                    declarations.rejected.push(e);
                }
            }
        }
        declarations
    }
}

/// Declarations split by whether they passed validation
#[derive(Debug, Default)]
pub struct Declarations {
    pub valid: Vec<ResourceDescriptor>,
    /// Every failure for each rejected declaration
    pub rejected: Vec<DescriptorError>,
}

/// Default state file (~/.local/state/converge/state.json)
pub fn default_state_file() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home
        .join(".local")
        .join("state")
        .join("converge")
        .join("state.json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::ValidationError;
    use tempfile::TempDir;

    const MANIFEST: &str = r#"
[settings]
state_file = "state.json"

[[autorequire]]
type = "collectd_plugin_cgroups"
requires = "service[collectd]"

[[resource]]
type = "service"
name = "grafana-server"

[[resource]]
type = "datasource"
name = "prometheus"
require = ["service[prometheus]"]

[resource.values]
url = "http://localhost:9090"
type = "prometheus"
is_default = true

[[resource]]
type = "collectd_plugin_cgroups"
name = "cgroups"
ensure = "absent"
before = ["service[collectd]"]
"#;

    #[test]
    fn test_parse_manifest() {
        let manifest = Manifest::parse(MANIFEST).unwrap();
        assert_eq!(manifest.resources.len(), 3);
        assert_eq!(manifest.resources[2].ensure, Ensure::Absent);
        assert_eq!(manifest.settings.state_file.as_deref(), Some("state.json"));
    }

    #[test]
    fn test_edges() {
        let manifest = Manifest::parse(MANIFEST).unwrap();
        let edges = manifest.edges().unwrap();
        assert_eq!(
            edges,
            [
                OrderingEdge::new(
                    ResourceRef::new("service", "prometheus"),
                    ResourceRef::new("datasource", "prometheus"),
                ),
                OrderingEdge::new(
                    ResourceRef::new("collectd_plugin_cgroups", "cgroups"),
                    ResourceRef::new("service", "collectd"),
                ),
            ]
        );
    }

    #[test]
    fn test_auto_requires() {
        let manifest = Manifest::parse(MANIFEST).unwrap();
        let rules = manifest.auto_requires().unwrap();
        assert_eq!(
            rules,
            [AutoRequire::new(
                "collectd_plugin_cgroups",
                ResourceRef::new("service", "collectd"),
            )]
        );
    }

    #[test]
    fn test_descriptors() {
        let manifest = Manifest::parse(MANIFEST).unwrap();
        let registry = SchemaRegistry::builtin();
        let declarations = manifest.descriptors(&registry);
        assert!(declarations.rejected.is_empty());
        let descriptors = declarations.valid;
        assert_eq!(descriptors.len(), 3);
        assert_eq!(
            descriptors[1].value("access_mode"),
            Some(&Value::from("direct"))
        );
    }

    #[test]
    fn test_descriptors_collect_every_failure() {
        let manifest = Manifest::parse(
            r#"
[[resource]]
type = "datasource"
name = "broken"

[resource.values]
url = "ftp://x"
type = "prometheus"

[[resource]]
type = "service"
name = "grafana-server"

[[resource]]
type = "dashboard"
name = "home"
"#,
        )
        .unwrap();
        let declarations = manifest.descriptors(&SchemaRegistry::builtin());
        assert_eq!(declarations.valid.len(), 1);
        assert_eq!(
            declarations.valid[0].reference(),
            ResourceRef::new("service", "grafana-server")
        );
        let errors = declarations.rejected;
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[1].reference(), ResourceRef::new("dashboard", "home"));
        assert!(matches!(
            errors[0].first(),
            Some(ValidationError::InvalidFormat { name, .. }) if name == "url"
        ));
        assert!(matches!(
            errors[1].first(),
            Some(ValidationError::UnknownResourceType { .. })
        ));
    }

    #[test]
    fn test_unknown_manifest_key() {
        assert!(Manifest::parse("[[resource]]\ntype = \"service\"\nname = \"x\"\nvalue = 1\n").is_err());
    }

    #[test]
    fn test_load_resolves_relative_paths() {
        let dir = TempDir::new().unwrap();
        let types = dir.path().join("types.toml");
        fs::write(
            &types,
            r#"
[[type]]
name = "alert_channel"

[[type.property]]
name = "endpoint"
type = "string"
validator = "http_url"
required = true
"#,
        )
        .unwrap();
        let path = dir.path().join("converge.toml");
        fs::write(
            &path,
            "[settings]\nstate_file = \"state.json\"\nschemas = [\"types.toml\"]\n",
        )
        .unwrap();

        let manifest = Manifest::load(&path).unwrap();
        assert_eq!(
            manifest.state_path(None).unwrap(),
            dir.path().join("state.json")
        );
        assert_eq!(
            manifest.state_path(Some(Path::new("/tmp/other.json"))).unwrap(),
            PathBuf::from("/tmp/other.json")
        );
        assert!(manifest.registry().unwrap().get("alert_channel").is_some());
    }
}
