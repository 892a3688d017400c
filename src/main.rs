mod cli;
mod commands;
mod config;
mod lock;
mod paths;
mod progress;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
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
    };
    log::debug!("usbforge {} (verbosity {})", env!("CARGO_PKG_VERSION"), ctx.verbose);

    match cli.command {
        Command::Disks { json } => commands::disks::run(json),
        Command::Install(args) => commands::install::run(&ctx, args),
        Command::Erase(args) => commands::erase::run(&ctx, args),
        Command::Keys => commands::keys::run(),
        Command::Doctor => commands::doctor::run(),
        Command::Config(cmd) => commands::config::run(cmd),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "usbforge", &mut io::stdout());
            Ok(())
        }
    }
}
