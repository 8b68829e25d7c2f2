//! CLI entry point: bring the forked chain set up, fund the wallet, report
//! balances, then supervise the simulator until exit or interrupt.

use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;
use forknet_config::DevnetConfig;
use forknet_core::{Devnet, cast::CastClient, simulator::SimulatorOptions};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Forked multi-chain devnet bootstrapper")]
struct Args {
    /// Path to the devnet configuration file.
    #[arg(long, short, default_value = "forknet.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let args = Args::parse();
    let config = DevnetConfig::load_from_file(&args.config).with_context(|| {
        format!("failed to load devnet config from {}", args.config.display())
    })?;
    info!(
        chains = config.chains().len(),
        starting_port = config.starting_port(),
        "configuration loaded"
    );

    let bring_up = async {
        let devnet = Devnet::bootstrap(config, CastClient::new(), SimulatorOptions::default())
            .await
            .context("devnet bootstrap failed")?;

        for chain in devnet.verify_balances().await {
            info!(chain = %chain.chain, balances = %chain.summary(), "wallet balances");
        }

        anyhow::Ok(devnet)
    };

    // An interrupt mid-bootstrap drops the in-flight future; the simulator
    // child is killed with it.
    let mut devnet = tokio::select! {
        outcome = bring_up => outcome?,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received; aborting bootstrap");
            return Ok(());
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("interrupt received; shutting down"),
        status = devnet.wait() => info!(status = ?status.ok(), "simulator exited"),
    }
    devnet.shutdown().await;

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
