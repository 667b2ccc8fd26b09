//! provider-failover service.
//!
//! Loads a TOML configuration, registers the configured providers, runs the
//! health prober and (optionally) the admin API, reloads providers on file
//! change or SIGHUP, and exits cleanly on SIGINT/SIGTERM.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
#[command(name = "provider-failover")]
#[command(about = "Provider resilience and failover service", long_about = None)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    provider_failover::lifecycle::launch(&args.config).await?;
    Ok(())
}
