use std::process::ExitCode;

use apigw_authorizer::cli::{Cli, run};
use clap::Parser;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "Authorizer failed");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
