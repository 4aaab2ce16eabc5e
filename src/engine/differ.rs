//! Diff display - converge-specific UI

use colored::Colorize;
use declarative::{
    BlockedComponent, ChangeOperation, ConvergencePlan, DescriptorError, DiffSummary,
    PlannedChange, ResourceDescriptor, ResourceRef, Value,
};
use std::collections::BTreeMap;

const VALUE_WIDTH: usize = 48;

/// Display the changes in a plan in a user-friendly format
pub fn display_plan(plan: &ConvergencePlan) {
    let changes: Vec<&PlannedChange> = plan.steps().filter(|s| !s.is_converged()).collect();

    if changes.is_empty() {
        println!();
        println!("  {} No changes needed", "✓".green());
        return;
    }

    // Group by resource type, keeping plan order within a type
    let mut by_type: BTreeMap<&str, Vec<&PlannedChange>> = BTreeMap::new();
    for change in &changes {
        by_type
            .entry(change.descriptor.type_name())
            .or_default()
            .push(change);
    }

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Convergence Diff".bold()
    );
    println!("│");

    for (type_name, type_changes) in &by_type {
        println!("│ {}", type_name.bold());
        for change in type_changes {
            display_change(change);
        }
        println!("│");
    }

    let summary = DiffSummary::from_diffs(&plan.diffs());
    println!("├─────────────────────────────────────────────────────┤");
    println!(
        "│ Summary: {} changes ({} to create, {} to modify, {} to remove)",
        summary.total().to_string().bold(),
        summary.additions.to_string().green(),
        summary.modifications.to_string().yellow(),
        summary.removals.to_string().red()
    );
    println!("└─────────────────────────────────────────────────────┘");
}

fn display_change(change: &PlannedChange) {
    let descriptor = &change.descriptor;
    let identity = descriptor.identity();

    match change.operations.as_slice() {
        [ChangeOperation::Create] => {
            println!("│   {} {:<30} {}", "+".green(), identity, "(create)".dimmed());
            for (name, value) in descriptor.managed_values() {
                println!(
                    "│       {} = {}",
                    name.dimmed(),
                    render_value(descriptor, &name, &value)
                );
            }
        }
        [ChangeOperation::Delete] => {
            println!("│   {} {:<30} {}", "-".red(), identity, "(will remove)".dimmed());
        }
        operations => {
            println!("│   {} {}", "~".yellow(), identity);
            for operation in operations {
                if let ChangeOperation::Update { property, old, new } = operation {
                    println!(
                        "│       {}: {} → {}",
                        property,
                        render_value(descriptor, property, old).dimmed(),
                        render_value(descriptor, property, new)
                    );
                }
            }
        }
    }
}

/// Render a value for display, hiding sensitive properties
pub fn render_value(descriptor: &ResourceDescriptor, property: &str, value: &Value) -> String {
    let sensitive = descriptor
        .schema()
        .property(property)
        .is_some_and(|p| p.sensitive);
    if sensitive && !value.is_null() {
        return "(sensitive)".to_string();
    }
    if value.is_null() {
        return "(unset)".to_string();
    }
    crate::ui::truncate(&value.to_string(), VALUE_WIDTH)
}

/// Display resources that are blocked by ordering cycles
pub fn display_blocked(blocked: &[BlockedComponent]) {
    if blocked.is_empty() {
        return;
    }

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Blocked Resources".yellow().bold()
    );
    println!("│");
    for component in blocked {
        println!("│  {}  {}", "⚠".yellow(), component.error);
        for member in &component.members {
            println!("│  • {member}");
        }
        println!("│");
    }
    println!("│  These resources will not be converged until the cycle is removed.");
    println!("└─────────────────────────────────────────────────────────────┘");
}

/// Display declarations that failed validation and what waits on them
pub fn display_rejected(rejected: &[DescriptorError], held: &[ResourceRef]) {
    if rejected.is_empty() && held.is_empty() {
        return;
    }

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Rejected Resources".red().bold()
    );
    println!("│");
    for error in rejected {
        println!("│  {}  {}", "✗".red(), error.reference());
        for failure in &error.errors {
            println!("│     {}", failure.to_string().dimmed());
        }
    }
    if !held.is_empty() {
        println!("│");
        println!("│  {} Ordered after a rejected resource:", "⊘".dimmed());
        for reference in held {
            println!("│  • {reference}");
        }
    }
    println!("│");
    println!("│  These resources will not be converged until the declarations are fixed.");
    println!("└─────────────────────────────────────────────────────────────┘");
}
