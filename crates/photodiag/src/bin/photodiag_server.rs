//! Photodiag REST Server
//!
//! HTTP REST API server generating and validating photo diagnoses.

use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use photodiag::server::startup::start_server;

#[derive(Parser)]
#[command(name = "photodiag_server")]
#[command(about = "Photodiag REST API Server")]
#[command(version)]
struct Args {
  /// Server bind address
  #[arg(long, default_value = "127.0.0.1:3000")]
  bind: SocketAddr,

  /// Enable verbose logging
  #[arg(short, long)]
  verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
  let args = Args::parse();

  // RUST_LOG wins; otherwise keep dependencies quiet unless verbose
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
    if args.verbose {
      EnvFilter::new("info,lance=warn,lance_datafusion=warn,datafusion=warn")
    } else {
      EnvFilter::new("photodiag=info,lance=error,lance_datafusion=error,datafusion=error,warn")
    }
  });

  tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

  tracing::info!("Starting Photodiag REST Server v{}", env!("CARGO_PKG_VERSION"));
  tracing::info!("Binding to address: {}", args.bind);

  start_server(args.bind).await?;

  Ok(())
}
