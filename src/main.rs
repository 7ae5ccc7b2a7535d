mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use mediafetch::observability;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    observability::init(cli.verbose);

    let result = match cli.command {
        Commands::Acquire(args) => commands::run_acquire(args, cli.config).await,
        Commands::Pack(args) => Ok(commands::run_pack(args).await),
        Commands::Classify(args) => Ok(commands::run_classify(&args.urls)),
        Commands::Config => commands::run_config(cli.config),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "Setup failed");
            eprintln!("error: {e}");
            ExitCode::from(2)
        }
    }
}
