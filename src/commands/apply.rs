use anyhow::{Result, bail};

use crate::Context;
use crate::cli::ApplyArgs;
use crate::engine::differ::display_rejected;
use crate::engine::{self, ExecuteOptions};

use super::Workspace;

/// Make the current state match the manifest
///
/// Valid resources converge even when other declarations are rejected or
/// blocked by a cycle; the command still fails afterwards.
pub fn run(ctx: &Context, args: ApplyArgs) -> Result<()> {
    let workspace = Workspace::load(ctx)?;
    let backend = workspace.backend(ctx)?;
    let planned = workspace.plan(&backend, args.target.as_deref())?;
    let plan = &planned.plan;

    display_rejected(&planned.rejected, &planned.held);

    let opts = ExecuteOptions {
        dry_run: args.dry_run,
        jobs: args.jobs,
        yes: args.yes,
        quiet: ctx.quiet,
    };
    let outcome = engine::execute(plan, &backend, &opts)?;

    if !args.dry_run && outcome.summary.total_changes() > 0 {
        backend.persist()?;
    }

    if !outcome.summary.is_success() {
        bail!("{} operations failed", outcome.summary.failed);
    }
    if plan.has_blocked() {
        let blocked: usize = plan.blocked.iter().map(|b| b.members.len()).sum();
        bail!("{blocked} resources blocked by dependency cycles");
    }
    if planned.is_partial() {
        bail!(
            "{} invalid resources ({} more held back)",
            planned.rejected.len(),
            planned.held.len()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_context;
    use crate::state::StateFile;
    use std::fs;
    use tempfile::TempDir;

    const MANIFEST: &str = r#"
[[resource]]
type = "service"
name = "grafana-server"

[[resource]]
type = "datasource"
name = "prom"

[resource.values]
url = "http://localhost:9090"
type = "prometheus"
"#;

    fn args(dry_run: bool) -> ApplyArgs {
        ApplyArgs {
            target: None,
            dry_run,
            yes: true,
            jobs: 2,
        }
    }

    #[test]
    fn test_apply_persists_only_on_change() {
        let dir = TempDir::new().unwrap();
        let ctx = test_context(dir.path(), MANIFEST);
        let state_path = dir.path().join("state.json");

        run(&ctx, args(true)).unwrap();
        assert!(!state_path.exists());

        run(&ctx, args(false)).unwrap();
        let written = fs::read_to_string(&state_path).unwrap();
        let state = StateFile::load(&state_path).unwrap();
        assert_eq!(state.resources.len(), 2);
        assert!(state.resources.contains_key("datasource[prom]"));

        // Already converged: the file is left untouched
        run(&ctx, args(false)).unwrap();
        assert_eq!(fs::read_to_string(&state_path).unwrap(), written);
    }

    #[test]
    fn test_apply_fails_when_blocked_but_converges_the_rest() {
        let dir = TempDir::new().unwrap();
        let manifest = format!(
            "{MANIFEST}{}",
            r#"
[[resource]]
type = "service"
name = "a"
require = ["service[b]"]

[[resource]]
type = "service"
name = "b"
require = ["service[a]"]
"#
        );
        let ctx = test_context(dir.path(), &manifest);

        let err = run(&ctx, args(false)).unwrap_err();
        assert_eq!(err.to_string(), "2 resources blocked by dependency cycles");

        let state = StateFile::load(&dir.path().join("state.json")).unwrap();
        assert!(state.resources.contains_key("service[grafana-server]"));
        assert!(state.resources.contains_key("datasource[prom]"));
        assert!(!state.resources.contains_key("service[a]"));
    }

    #[test]
    fn test_apply_fails_on_rejected_but_converges_the_rest() {
        let dir = TempDir::new().unwrap();
        let manifest = format!(
            "{MANIFEST}{}",
            r#"
[[resource]]
type = "datasource"
name = "broken"
before = ["service[collectd]"]

[resource.values]
url = "ftp://x"
type = "prometheus"

[[resource]]
type = "service"
name = "collectd"
"#
        );
        let ctx = test_context(dir.path(), &manifest);

        let err = run(&ctx, args(false)).unwrap_err();
        assert_eq!(err.to_string(), "1 invalid resources (1 more held back)");

        let state = StateFile::load(&dir.path().join("state.json")).unwrap();
        assert_eq!(
            state.resources.keys().collect::<Vec<_>>(),
            ["datasource[prom]", "service[grafana-server]"]
        );
    }
}
