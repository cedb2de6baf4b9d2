use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mirrorstack")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Provision a GitHub repository and its GitLab mirror", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (default: ~/.config/mirrorstack/config.toml)
    #[arg(long, global = true, env = "MIRRORSTACK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory holding one state file per stack
    #[arg(long, global = true, env = "MIRRORSTACK_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, global = true, default_value = "human")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Colored tables and progress bars
    Human,
    /// One JSON object per line
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Re-read live state for every recorded resource and resolve lookups
    Refresh(StackArgs),

    /// Show what `up` would change
    Preview(PreviewArgs),

    /// Create or update resources to match the declaration
    Up(ApplyArgs),

    /// Delete every resource a stack manages
    Destroy(ApplyArgs),

    /// Inspect local state files
    #[command(subcommand)]
    State(StateCommand),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StackSelector {
    /// The GitHub repository stack
    #[value(name = "dev-desired-state")]
    DesiredState,
    /// The GitLab mirror stack
    #[value(name = "dev-desired-state-mirrored")]
    Mirrored,
    /// Both stacks, GitHub first
    All,
}

impl StackSelector {
    /// Stack name, or `None` for all stacks
    pub fn name(self) -> Option<&'static str> {
        match self {
            Self::DesiredState => Some("dev-desired-state"),
            Self::Mirrored => Some("dev-desired-state-mirrored"),
            Self::All => None,
        }
    }
}

#[derive(Args)]
pub struct StackArgs {
    /// Stack to operate on
    #[arg(short, long, value_enum, default_value = "all")]
    pub stack: StackSelector,
}

#[derive(Args)]
pub struct PreviewArgs {
    #[command(flatten)]
    pub stack: StackArgs,

    /// Only show changes for a resource type or `type.name`
    #[arg(short, long)]
    pub target: Option<String>,

    /// Plan against the recorded state without contacting the forges
    #[arg(long)]
    pub skip_refresh: bool,
}

#[derive(Args)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub stack: StackArgs,

    /// Plan against the recorded state without refreshing it first
    #[arg(long)]
    pub skip_refresh: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Dry run - show what would be done
    #[arg(short, long)]
    pub dry_run: bool,

    /// Number of operations to run in parallel (overrides config)
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Stop starting new operations after the first failure
    #[arg(long)]
    pub fail_fast: bool,
}

#[derive(Subcommand)]
pub enum StateCommand {
    /// Show the resources recorded for a stack
    Show(StackArgs),

    /// Print the state file location
    Path(StackArgs),
}
