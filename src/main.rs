mod cli;
mod commands;
mod engine;
mod manifest;
mod progress;
mod state;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;
use std::path::PathBuf;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    pub manifest: PathBuf,
    pub state: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        manifest: cli.manifest,
        state: cli.state,
    };

    log::debug!("converge {} (verbosity {})", env!("CARGO_PKG_VERSION"), ctx.verbose);

    match cli.command {
        Command::Validate => commands::validate::run(&ctx),
        Command::Types(args) => commands::types::run(&ctx, args.name.as_deref()),
        Command::Diff(args) => commands::diff::run(&ctx, args.target.as_deref()),
        Command::Order(args) => commands::order::run(&ctx, args.target.as_deref()),
        Command::Apply(args) => commands::apply::run(&ctx, args),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "converge", &mut io::stdout());
            Ok(())
        }
    }
}
