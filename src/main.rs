//! Zas - an incremental static site builder for Markdown and HTML trees.

mod build;
mod cli;
mod compiler;
mod config;
mod i18n;
mod init;
mod logger;
mod reaper;
mod utils;

use anyhow::Result;
use build::{BuildOptions, build_site};
use clap::Parser;
use cli::{Cli, Commands};
use config::{SUBCOMMAND_PREFIX, SiteConfig};
use init::init_repository;
use std::ffi::OsString;

fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Some(Commands::Init) => init_repository(&cli.root),
        Some(Commands::Generate) | None => generate(&cli),
        Some(Commands::External(args)) => run_external(args),
    }
}

/// Load the repository at `--root` and build it.
fn generate(cli: &Cli) -> Result<()> {
    let config = SiteConfig::load(&cli.root)?;
    let options = BuildOptions {
        full: cli.full,
        verbose: cli.verbose,
    };

    let stats = build_site(config, options)?;
    log!("generate"; "{} rendered, {} reaped", stats.rendered, stats.reaped.len());
    Ok(())
}

/// Hand `name args...` to the `zs<name>` executable.
fn run_external(args: &[OsString]) -> Result<()> {
    let Some((name, rest)) = args.split_first() else {
        anyhow::bail!("Missing subcommand");
    };

    let mut program = OsString::from(SUBCOMMAND_PREFIX);
    program.push(name);

    let mut cmd = Vec::with_capacity(args.len());
    cmd.push(program);
    cmd.extend(rest.iter().cloned());
    utils::exec::passthrough(&cmd)
}
