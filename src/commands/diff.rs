use anyhow::Result;

use crate::Context;
use crate::engine::differ::{display_blocked, display_plan, display_rejected};
use crate::ui;

use super::Workspace;

/// Preview what apply would change
pub fn run(ctx: &Context, target: Option<&str>) -> Result<()> {
    let workspace = Workspace::load(ctx)?;
    let backend = workspace.backend(ctx)?;
    let planned = workspace.plan(&backend, target)?;

    if !ctx.quiet {
        ui::header("Converge Diff");
        ui::kv("Manifest", &ctx.manifest.display().to_string());
        ui::kv("State", &backend.path().display().to_string());
    }

    display_plan(&planned.plan);
    display_blocked(&planned.plan.blocked);
    display_rejected(&planned.rejected, &planned.held);
    Ok(())
}
