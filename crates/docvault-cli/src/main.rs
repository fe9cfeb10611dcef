mod commands;
mod logging;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use commands::run::WorkflowKind;

#[derive(Parser)]
#[command(
    name = "docvault",
    version,
    about = "Paginated document backup and clean jobs"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

/// Options shared by the `backup` and `clean` commands.
#[derive(Args)]
struct RunArgs {
    /// Path to job YAML file
    job: PathBuf,
    /// Perform writes. Without this flag the run is a dry run unless the
    /// job file sets `run.dry_run: false`.
    #[arg(long)]
    execute: bool,
    /// Dispatch mode override (single, multi)
    #[arg(long)]
    mode: Option<String>,
    /// Page size override
    #[arg(long)]
    page_size: Option<u32>,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy every matching source document into the destination container
    Backup(RunArgs),
    /// Back up, verify, then replace each source document with its cleaned form
    Clean(RunArgs),
    /// Validate a job file and the containers it names
    Check {
        /// Path to job YAML file
        job: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init(&cli.log_level);

    match cli.command {
        Commands::Backup(args) => run(WorkflowKind::Backup, args).await,
        Commands::Clean(args) => run(WorkflowKind::Clean, args).await,
        Commands::Check { job } => commands::check::execute(&job).await,
    }
}

async fn run(kind: WorkflowKind, args: RunArgs) -> anyhow::Result<()> {
    let overrides = commands::run::Overrides {
        execute: args.execute,
        mode: args.mode,
        page_size: args.page_size,
    };
    commands::run::execute(&args.job, kind, overrides).await
}
