use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "converge")]
#[command(version)]
#[command(about = "Converge declared resources to their desired state", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Manifest declaring the desired resources
    #[arg(
        short = 'f',
        long,
        global = true,
        env = "CONVERGE_MANIFEST",
        default_value = "converge.toml"
    )]
    pub manifest: PathBuf,

    /// State file to read and update (overrides the manifest setting)
    #[arg(long, global = true, env = "CONVERGE_STATE")]
    pub state: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Validate every declaration in the manifest
    Validate,

    /// List known resource types and their properties
    Types(TypesArgs),

    /// Preview what apply would change
    Diff(TargetArgs),

    /// Show the order resources would be applied in
    Order(TargetArgs),

    /// Make the current state match the manifest
    Apply(ApplyArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Parser)]
pub struct TypesArgs {
    /// Only show this type
    pub name: Option<String>,
}

#[derive(Parser)]
pub struct TargetArgs {
    /// Limit to a type or a single resource (e.g. "datasource" or "datasource.prometheus")
    pub target: Option<String>,
}

#[derive(Parser)]
pub struct ApplyArgs {
    /// Limit to a type or a single resource (e.g. "datasource" or "datasource.prometheus")
    pub target: Option<String>,

    /// Dry run - show what would be done
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Number of independent resource groups applied in parallel
    #[arg(short, long, default_value = "4")]
    pub jobs: usize,
}
