mod commands;
mod logging;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "dblooper",
    version,
    about = "Run a parameterized SQL statement once per input row"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a job: one statement per input row
    Run {
        /// Path to job YAML file
        job: PathBuf,
    },
    /// Validate job configuration, input columns, and connectivity
    Check {
        /// Path to job YAML file
        job: PathBuf,
    },
    /// Print the compiled statement without connecting
    Compile {
        /// Path to job YAML file
        job: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init(&cli.log_level);

    match cli.command {
        Commands::Run { job } => commands::run::execute(&job).await,
        Commands::Check { job } => commands::check::execute(&job).await,
        Commands::Compile { job } => commands::compile::execute(&job),
    }
}
