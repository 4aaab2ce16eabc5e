use anyhow::{Result, bail};
use colored::Colorize;
use declarative::{PropertySchema, ResourceSchema, SchemaRegistry};

use crate::Context;
use crate::ui;

use super::Workspace;

/// List known resource types and their properties
pub fn run(ctx: &Context, name: Option<&str>) -> Result<()> {
    // Types are still listable without a manifest
    let workspace;
    let registry: &SchemaRegistry = if ctx.manifest.exists() {
        workspace = Workspace::load(ctx)?;
        &workspace.registry
    } else {
        declarative::global()
    };

    let schemas: Vec<&ResourceSchema> = registry
        .types()
        .filter(|s| name.is_none_or(|n| s.type_name == n))
        .collect();

    if let Some(n) = name
        && schemas.is_empty()
    {
        bail!("Unknown resource type '{n}'");
    }

    ui::header("Resource Types");
    for schema in schemas {
        ui::section(&schema.type_name);
        if let Some(description) = &schema.description {
            ui::dim(description);
        }
        for property in schema.properties() {
            println!("    {}", describe_property(property));
        }
        for rule in registry
            .auto_requires()
            .iter()
            .filter(|r| r.dependent_type == schema.type_name)
        {
            println!("    {} {}", "requires".dimmed(), rule.requires);
        }
    }
    Ok(())
}

/// One-line summary of a property's rules
fn describe_property(property: &PropertySchema) -> String {
    let mut line = format!("{:<18} {}", property.name.bold(), property.value_type);
    if !property.is_property() {
        line.push_str(&format!(" {}", property.kind.to_string().dimmed()));
    }
    if property.required {
        line.push_str(&format!(" {}", "required".yellow()));
    }
    if let Some(allowed) = &property.allowed_values {
        let names: Vec<String> = allowed.iter().map(ToString::to_string).collect();
        line.push_str(&format!(" one of [{}]", names.join(", ")));
    }
    if let Some(default) = &property.default {
        line.push_str(&format!(" default {default}"));
    }
    if let Some(validator) = &property.validator {
        line.push_str(&format!(" ({})", validator.name));
    }
    if property.sensitive {
        line.push_str(&format!(" {}", "sensitive".red()));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_context;
    use tempfile::TempDir;

    #[test]
    fn test_run_lists_manifest_types() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("types.toml"),
            "[[type]]\nname = \"alert_channel\"\n\n[[type.property]]\nname = \"endpoint\"\ntype = \"string\"\n",
        )
        .unwrap();
        let ctx = test_context(dir.path(), "[settings]\nschemas = [\"types.toml\"]\n");

        run(&ctx, Some("alert_channel")).unwrap();
        run(&ctx, Some("datasource")).unwrap();
        let err = run(&ctx, Some("dashboard")).unwrap_err();
        assert_eq!(err.to_string(), "Unknown resource type 'dashboard'");
    }

    #[test]
    fn test_describe_property() {
        colored::control::set_override(false);
        let registry = SchemaRegistry::builtin();
        let schema = registry.get("datasource").unwrap();

        let url = describe_property(schema.property("url").unwrap());
        assert!(url.contains("required"));
        assert!(url.contains("(http_url)"));

        let access = describe_property(schema.property("access_mode").unwrap());
        assert!(access.contains(r#"one of ["direct", "proxy"]"#));
        assert!(access.contains(r#"default "direct""#));

        let user = describe_property(schema.property("grafana_password").unwrap());
        assert!(user.contains("parameter"));
        assert!(user.contains("sensitive"));
    }
}
