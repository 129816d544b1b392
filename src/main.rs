//! dashsync - live state synchronization client for the command-center
//! dashboard.

use clap::Parser;
use std::process::ExitCode;

use dashsync::cli::Commands;
use dashsync::logging;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Commands::parse();

    let _guard = match logging::init(args.log_format) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match args.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
