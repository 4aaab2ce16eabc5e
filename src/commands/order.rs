use anyhow::Result;
use colored::Colorize;

use crate::Context;
use crate::engine::differ::{display_blocked, display_rejected};
use crate::ui;

use super::Workspace;

/// Show the order resources would be applied in
pub fn run(ctx: &Context, target: Option<&str>) -> Result<()> {
    let workspace = Workspace::load(ctx)?;
    let backend = workspace.backend(ctx)?;
    let planned = workspace.plan(&backend, target)?;
    let plan = &planned.plan;

    ui::header("Apply Order");

    if plan.components.is_empty() && plan.blocked.is_empty() && !planned.is_partial() {
        ui::info("No resources declared");
        return Ok(());
    }

    let total = plan.order().len();
    let mut position = 0;
    for (index, component) in plan.components.iter().enumerate() {
        ui::section(&format!("Group {}", index + 1));
        for step in &component.steps {
            position += 1;
            let status = match step.operations.len() {
                0 => "converged".dimmed().to_string(),
                1 => "1 change".yellow().to_string(),
                n => format!("{n} changes").yellow().to_string(),
            };
            ui::step(position, total, &format!("{} {}", step.reference(), status));
        }
    }

    display_blocked(&plan.blocked);
    display_rejected(&planned.rejected, &planned.held);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_context;
    use tempfile::TempDir;

    #[test]
    fn test_order_reports_cycles_without_failing() {
        let dir = TempDir::new().unwrap();
        let ctx = test_context(
            dir.path(),
            r#"
[[resource]]
type = "service"
name = "a"
require = ["service[b]"]

[[resource]]
type = "service"
name = "b"
require = ["service[a]"]

[[resource]]
type = "service"
name = "c"
"#,
        );

        run(&ctx, None).unwrap();
        run(&ctx, Some("service.c")).unwrap();
    }
}
