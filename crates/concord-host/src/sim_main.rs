//! Replay navigation steps against an in-memory host page.
//!
//!   concord-sim --config page.toml
//!   CONCORD_LOG=concord_core=debug concord-sim --config page.toml

use anyhow::Context;
use clap::Parser;
use concord_host::{HostConfig, Simulation};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "concord-sim", about = "Run cross-application guard checks on a simulated page")]
struct Args {
    /// Page description (participants, routes, steps)
    #[arg(long, env = "CONCORD_CONFIG")]
    config: PathBuf,

    /// Log filter
    #[arg(long, env = "CONCORD_LOG", default_value = "info")]
    log: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&args.log)?)
        .with_writer(std::io::stderr)
        .init();

    let config = HostConfig::load(&args.config)?;
    tracing::info!(
        "loaded {} participants and {} steps from {}",
        config.participants.len(),
        config.steps.len(),
        args.config.display()
    );

    let sim = Simulation::new(&config).context("mounting participants")?;
    for report in sim.run(&config).await {
        println!("{}", serde_json::to_string(&report)?);
    }

    Ok(())
}
