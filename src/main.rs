mod cli;
mod commands;
mod config;
mod engine;
mod progress;
mod stacks;
mod state;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command, OutputFormat};
use std::io;
use std::path::PathBuf;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    pub output: OutputFormat,
    pub config: Option<PathBuf>,
    pub state_dir: Option<PathBuf>,
}

impl Context {
    /// Colored output, spinners and progress bars
    pub fn human(&self) -> bool {
        self.output == OutputFormat::Human
    }

    pub fn json(&self) -> bool {
        self.output == OutputFormat::Json
    }
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
        output: cli.output,
        config: cli.config,
        state_dir: cli.state_dir,
    };
    log::trace!("verbosity {}", ctx.verbose);

    match cli.command {
        Command::Refresh(args) => commands::refresh::run(&ctx, &args),
        Command::Preview(args) => commands::preview::run(&ctx, &args),
        Command::Up(args) => commands::up::run(&ctx, &args),
        Command::Destroy(args) => commands::destroy::run(&ctx, &args),
        Command::State(cmd) => commands::state::run(&ctx, &cmd),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "mirrorstack", &mut io::stdout());
            Ok(())
        }
    }
}
