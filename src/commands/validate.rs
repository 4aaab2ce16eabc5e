use anyhow::{Result, bail};
use declarative::{ordering_edges, resolve_components};

use crate::Context;
use crate::ui;

use super::Workspace;

/// Validate every declaration and the ordering between them
pub fn run(ctx: &Context) -> Result<()> {
    let workspace = Workspace::load(ctx)?;
    let manifest = &workspace.manifest;

    let declarations = manifest.descriptors(&workspace.registry);
    for error in &declarations.rejected {
        ui::error(&error.reference().to_string());
        for failure in &error.errors {
            ui::dim(&failure.to_string());
        }
    }

    let refs = manifest.references();
    let edges = ordering_edges(&refs, &manifest.edges()?, &workspace.rules)?;
    if !declarations.rejected.is_empty() {
        bail!("{} invalid resources", declarations.rejected.len());
    }

    let components = resolve_components(&refs, &edges)?;
    let cycles: Vec<_> = components
        .iter()
        .filter_map(|c| c.order.as_ref().err())
        .collect();
    if !cycles.is_empty() {
        for cycle in &cycles {
            ui::error(&cycle.to_string());
        }
        bail!("{} dependency cycles", cycles.len());
    }

    if !ctx.quiet {
        ui::success(&format!(
            "{} resources valid ({} ordering edges)",
            refs.len(),
            edges.len()
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_context;
    use tempfile::TempDir;

    #[test]
    fn test_validate_accepts_repeated_edges() {
        let dir = TempDir::new().unwrap();
        let ctx = test_context(
            dir.path(),
            r#"
[[resource]]
type = "service"
name = "grafana-server"

[[resource]]
type = "datasource"
name = "prom"
require = ["service[grafana-server]", "service[grafana-server]"]

[resource.values]
url = "http://localhost:9090"
type = "prometheus"
"#,
        );

        run(&ctx).unwrap();
    }

    #[test]
    fn test_validate_rejects_duplicate_declarations() {
        let dir = TempDir::new().unwrap();
        let ctx = test_context(
            dir.path(),
            r#"
[[resource]]
type = "service"
name = "grafana-server"

[[resource]]
type = "service"
name = "grafana-server"
ensure = "absent"
"#,
        );

        let err = run(&ctx).unwrap_err();
        assert_eq!(
            err.to_string(),
            "service[grafana-server] is declared more than once"
        );
    }

    #[test]
    fn test_validate_reports_cycles() {
        let dir = TempDir::new().unwrap();
        let ctx = test_context(
            dir.path(),
            r#"
[[resource]]
type = "service"
name = "a"
before = ["service[b]"]

[[resource]]
type = "service"
name = "b"
before = ["service[a]"]
"#,
        );

        let err = run(&ctx).unwrap_err();
        assert_eq!(err.to_string(), "1 dependency cycles");
    }

    #[test]
    fn test_validate_reports_invalid_resources() {
        let dir = TempDir::new().unwrap();
        let ctx = test_context(
            dir.path(),
            r#"
[[resource]]
type = "datasource"
name = "broken"

[resource.values]
url = "ftp://x"
type = "prometheus"
"#,
        );

        let err = run(&ctx).unwrap_err();
        assert_eq!(err.to_string(), "1 invalid resources");
    }
}
