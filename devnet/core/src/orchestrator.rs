//! Drives a devnet run end to end: simulator up, wallet resolved and
//! funded, balances verified, simulator supervised until exit.

use std::fmt;

use thiserror::Error;
use tracing::info;

use forknet_config::DevnetConfig;

use crate::{
    balances::{self, ChainBalances},
    cast::CastClient,
    funding::{self, FundingError},
    simulator::{Simulator, SimulatorError, SimulatorOptions},
    wallet::{self, WalletError, WalletIdentity},
};

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Simulator(#[from] SimulatorError),
    #[error(transparent)]
    Wallet(#[from] WalletError),
    #[error(transparent)]
    Funding(#[from] FundingError),
}

/// A running, funded devnet.
///
/// Owns the simulator process for the lifetime of the run; dropping the
/// handle (or calling [`Devnet::shutdown`]) takes the simulator with it.
pub struct Devnet {
    config: DevnetConfig,
    cast: CastClient,
    simulator: Simulator,
    wallet: WalletIdentity,
    rpc_host: String,
}

impl fmt::Debug for Devnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Devnet")
            .field("config", &self.config)
            .field("wallet", &self.wallet)
            .field("rpc_host", &self.rpc_host)
            .finish_non_exhaustive()
    }
}

impl Devnet {
    /// Bring the chain set up, resolve the wallet, and fund it.
    ///
    /// Every fatal error path tears the simulator down (kill + wait) before
    /// returning, so no orphaned process survives a failed bootstrap.
    pub async fn bootstrap(
        config: DevnetConfig,
        cast: CastClient,
        options: SimulatorOptions,
    ) -> Result<Self, BootstrapError> {
        let simulator = Simulator::launch(&config, &cast, &options).await?;

        let wallet = match wallet::resolve(&cast, config.wallet_secret()).await {
            Ok(wallet) => wallet,
            Err(err) => {
                simulator.shutdown().await;
                return Err(err.into());
            }
        };

        let tasks = funding::funding_tasks(&config);
        if let Err(err) =
            funding::fund_wallet(&cast, &config, wallet.address(), &options.rpc_host, tasks).await
        {
            simulator.shutdown().await;
            return Err(err.into());
        }

        Ok(Self {
            config,
            cast,
            simulator,
            wallet,
            rpc_host: options.rpc_host,
        })
    }

    #[must_use]
    pub fn wallet(&self) -> &WalletIdentity {
        &self.wallet
    }

    #[must_use]
    pub fn config(&self) -> &DevnetConfig {
        &self.config
    }

    /// Query and return the stably-ordered balance report.
    pub async fn verify_balances(&self) -> Vec<ChainBalances> {
        balances::collect_balances(&self.cast, &self.config, self.wallet.address(), &self.rpc_host)
            .await
    }

    /// Block until the simulator exits on its own.
    pub async fn wait(&mut self) -> std::io::Result<std::process::ExitStatus> {
        self.simulator.wait().await
    }

    /// Terminate the simulator and wait for it to exit.
    pub async fn shutdown(self) {
        self.simulator.shutdown().await;
        info!("devnet stopped");
    }
}
