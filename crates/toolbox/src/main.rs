//! Demo MCP tool server speaking JSON-RPC over stdio.
//!
//! stdout carries protocol messages only; logs go to stderr.

mod calc;
mod server;
mod tools;

use std::process::ExitCode;

use tokio::io::BufReader;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    info!(tools = tools::list().len(), "{} ready", server::SERVER_NAME);

    match server::serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "stdio transport failed");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
