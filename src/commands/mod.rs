//! Subcommand implementations
//!
//! Every command starts from the same [`Workspace`]: the manifest, the
//! schema registry it builds and the auto-require rules that apply.

pub mod apply;
pub mod diff;
pub mod order;
pub mod types;
pub mod validate;

use anyhow::Result;
use declarative::{
    AutoRequire, ConvergencePlan, DescriptorError, ResourceRef, SchemaRegistry, dependents,
    matches_target, ordering_edges,
};
use std::collections::BTreeSet;

use crate::Context;
use crate::manifest::Manifest;
use crate::state::FileBackend;

/// Everything loaded from a manifest
pub struct Workspace {
    pub manifest: Manifest,
    pub registry: SchemaRegistry,
    pub rules: Vec<AutoRequire>,
}

/// A plan over the valid declarations, plus what had to be left out
pub struct Planned {
    pub plan: ConvergencePlan,
    /// Declarations that failed validation
    pub rejected: Vec<DescriptorError>,
    /// Valid resources ordered after a rejected one
    pub held: Vec<ResourceRef>,
}

impl Planned {
    /// Whether anything declared was left out of the plan
    pub fn is_partial(&self) -> bool {
        !self.rejected.is_empty() || !self.held.is_empty()
    }
}

impl Workspace {
    /// Load the manifest with its type definitions and auto-require rules
    pub fn load(ctx: &Context) -> Result<Self> {
        let manifest = Manifest::load(&ctx.manifest)?;
        let registry = manifest.registry()?;

        let mut rules = registry.auto_requires().to_vec();
        rules.extend(manifest.auto_requires()?);

        Ok(Self {
            manifest,
            registry,
            rules,
        })
    }

    /// Open the state backend named by the manifest or `--state`
    pub fn backend(&self, ctx: &Context) -> Result<FileBackend> {
        let path = self.manifest.state_path(ctx.state.as_deref())?;
        log::debug!("Using state file {}", path.display());
        FileBackend::open(path)
    }

    /// Validate, diff and order every declared resource
    ///
    /// Invalid declarations are left out of the plan, together with every
    /// resource ordered after them. Edges touching either are dropped.
    pub fn plan(&self, backend: &FileBackend, target: Option<&str>) -> Result<Planned> {
        let declarations = self.manifest.descriptors(&self.registry);
        let edges = ordering_edges(
            &self.manifest.references(),
            &self.manifest.edges()?,
            &self.rules,
        )?;

        let mut excluded: BTreeSet<ResourceRef> = declarations
            .rejected
            .iter()
            .map(DescriptorError::reference)
            .collect();
        let held: Vec<ResourceRef> = dependents(&edges, &excluded)
            .into_iter()
            .filter(|r| !excluded.contains(r))
            .collect();
        excluded.extend(held.iter().cloned());

        let descriptors = declarations
            .valid
            .into_iter()
            .filter(|d| !excluded.contains(&d.reference()))
            .collect();
        let edges: Vec<_> = edges
            .into_iter()
            .filter(|e| !excluded.contains(&e.before) && !excluded.contains(&e.after))
            .collect();

        let plan = ConvergencePlan::build(descriptors, &edges, &[], backend)?;
        log::debug!(
            "Planned {} operations in {} groups ({} blocked, {} rejected, {} held)",
            plan.total_operations(),
            plan.components.len(),
            plan.blocked.len(),
            declarations.rejected.len(),
            held.len()
        );

        Ok(Planned {
            plan: plan.filter_by_target(target),
            rejected: declarations
                .rejected
                .into_iter()
                .filter(|e| matches_target(&e.reference(), target))
                .collect(),
            held: held
                .into_iter()
                .filter(|r| matches_target(r, target))
                .collect(),
        })
    }
}

/// Context for a manifest written into `dir`, with state beside it
#[cfg(test)]
pub fn test_context(dir: &std::path::Path, manifest: &str) -> Context {
    let path = dir.join("converge.toml");
    std::fs::write(&path, manifest).unwrap();
    Context {
        verbose: 0,
        quiet: true,
        manifest: path,
        state: Some(dir.join("state.json")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MANIFEST: &str = r#"
[[resource]]
type = "service"
name = "grafana-server"

[[resource]]
type = "datasource"
name = "broken"

[resource.values]
url = "ftp://x"
type = "prometheus"

[[resource]]
type = "datasource"
name = "prom"
require = ["datasource[broken]"]

[resource.values]
url = "http://localhost:9090"
type = "prometheus"

[[resource]]
type = "datasource"
name = "influx"

[resource.values]
url = "http://localhost:8086"
type = "influxdb"
"#;

    #[test]
    fn test_plan_leaves_out_rejected_and_their_dependents() {
        let dir = TempDir::new().unwrap();
        let ctx = test_context(dir.path(), MANIFEST);
        let workspace = Workspace::load(&ctx).unwrap();
        let backend = workspace.backend(&ctx).unwrap();

        let planned = workspace.plan(&backend, None).unwrap();

        assert!(planned.is_partial());
        assert_eq!(planned.rejected.len(), 1);
        assert_eq!(
            planned.rejected[0].reference(),
            ResourceRef::new("datasource", "broken")
        );
        assert_eq!(planned.held, [ResourceRef::new("datasource", "prom")]);
        assert_eq!(
            planned.plan.order(),
            [
                ResourceRef::new("service", "grafana-server"),
                ResourceRef::new("datasource", "influx"),
            ]
        );
        assert!(!planned.plan.has_blocked());
    }

    #[test]
    fn test_plan_target_narrows_rejected() {
        let dir = TempDir::new().unwrap();
        let ctx = test_context(dir.path(), MANIFEST);
        let workspace = Workspace::load(&ctx).unwrap();
        let backend = workspace.backend(&ctx).unwrap();

        let planned = workspace.plan(&backend, Some("service")).unwrap();

        assert!(!planned.is_partial());
        assert_eq!(
            planned.plan.order(),
            [ResourceRef::new("service", "grafana-server")]
        );
    }

    #[test]
    fn test_plan_rejects_duplicates() {
        let dir = TempDir::new().unwrap();
        let ctx = test_context(
            dir.path(),
            "[[resource]]\ntype = \"service\"\nname = \"a\"\n\n[[resource]]\ntype = \"service\"\nname = \"a\"\n",
        );
        let workspace = Workspace::load(&ctx).unwrap();
        let backend = workspace.backend(&ctx).unwrap();

        let err = workspace.plan(&backend, None).err().unwrap();
        assert!(err.to_string().contains("service[a]"));
    }
}
