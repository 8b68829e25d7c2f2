//! Supervises the fork-simulator child process.
//!
//! The simulator is a singleton resource: only this module starts, probes,
//! or terminates it. `kill_on_drop` backs every early-return path so no
//! simulator process survives the run.

use std::{env, io, process::Stdio, time::Duration};

use forknet_config::DevnetConfig;
use thiserror::Error;
use tokio::{
    process::{Child, Command},
    time::{sleep, timeout},
};
use tracing::{debug, error, info, warn};

use crate::cast::CastClient;

const SIMULATOR_BINARY: &str = "supersim";
const DEFAULT_BIND_HOST: &str = "0.0.0.0";
const DEFAULT_RPC_HOST: &str = "127.0.0.1";

const READY_POLL_INTERVAL: Duration = Duration::from_secs(2);
const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(60);
const READY_TIMEOUT_ENV: &str = "FORKNET_READY_TIMEOUT_SECS";

// Any cheap read-only call that decodes to a non-empty value once the fork
// serves traffic. Replaceable; nothing downstream depends on this contract.
const DEFAULT_PROBE_CONTRACT: &str = "0x7F6D3A4c8a1111DDbFe282794f4D608aB7Cb23A2";
const DEFAULT_PROBE_SIGNATURE: &str = "MAX_TOKENS()(uint256)";

/// Read-only call used to decide when the fork is serving traffic.
#[derive(Clone, Debug)]
pub struct ReadinessProbe {
    pub contract: String,
    pub signature: String,
}

impl Default for ReadinessProbe {
    fn default() -> Self {
        Self {
            contract: DEFAULT_PROBE_CONTRACT.to_owned(),
            signature: DEFAULT_PROBE_SIGNATURE.to_owned(),
        }
    }
}

/// Settings for launching the fork-simulator.
#[derive(Clone, Debug)]
pub struct SimulatorOptions {
    pub binary: String,
    /// Address the simulator binds its RPC listeners on.
    pub bind_host: String,
    /// Host used when talking to the forked chains.
    pub rpc_host: String,
    pub probe: ReadinessProbe,
    pub ready_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for SimulatorOptions {
    fn default() -> Self {
        Self {
            binary: SIMULATOR_BINARY.to_owned(),
            bind_host: DEFAULT_BIND_HOST.to_owned(),
            rpc_host: DEFAULT_RPC_HOST.to_owned(),
            probe: ReadinessProbe::default(),
            ready_timeout: ready_timeout_from_env(),
            poll_interval: READY_POLL_INTERVAL,
        }
    }
}

#[derive(Debug, Error)]
pub enum SimulatorError {
    #[error("devnet config declares no chains to fork")]
    NoChains,
    #[error("failed to spawn simulator '{binary}': {source}")]
    Spawn {
        binary: String,
        #[source]
        source: io::Error,
    },
    #[error("simulator did not become ready within {timeout:?}")]
    NeverReady { timeout: Duration },
}

/// Handle owning the running fork-simulator process.
pub struct Simulator {
    child: Child,
}

impl Simulator {
    /// Launch the simulator for the configured chain set and block until the
    /// first chain answers the readiness probe.
    ///
    /// On a missed deadline the child is terminated before the error is
    /// returned; no balance or funding work can run against a dead fork.
    pub async fn launch(
        config: &DevnetConfig,
        cast: &CastClient,
        options: &SimulatorOptions,
    ) -> Result<Self, SimulatorError> {
        let first_chain = config.chains().first().ok_or(SimulatorError::NoChains)?;
        let chain_list = chain_list(config);

        info!(
            chains = %chain_list,
            starting_port = config.starting_port(),
            "launching fork-simulator"
        );

        let mut command = Command::new(&options.binary);
        command
            .arg("fork")
            .arg(format!("--l2.host={}", options.bind_host))
            .arg(format!("--l2.starting.port={}", config.starting_port()))
            .arg(format!("--chains={chain_list}"))
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let child = command.spawn().map_err(|source| SimulatorError::Spawn {
            binary: options.binary.clone(),
            source,
        })?;
        let mut simulator = Self { child };

        let probe_url = first_chain.rpc_url(&options.rpc_host);
        debug!(
            contract = %options.probe.contract,
            url = %probe_url,
            "polling simulator readiness"
        );

        let ready = timeout(options.ready_timeout, async {
            loop {
                match cast
                    .call(&options.probe.contract, &options.probe.signature, &[], &probe_url)
                    .await
                {
                    Ok(value) if !value.is_empty() => break,
                    Ok(_) => debug!("readiness probe returned empty output"),
                    Err(err) => debug!(error = %err, "readiness probe not answered yet"),
                }
                sleep(options.poll_interval).await;
            }
        })
        .await;

        if ready.is_err() {
            error!(
                timeout = ?options.ready_timeout,
                "simulator never became ready; terminating it"
            );
            simulator.terminate().await;
            return Err(SimulatorError::NeverReady {
                timeout: options.ready_timeout,
            });
        }

        info!("fork-simulator is ready");
        for chain in config.chains() {
            info!(
                chain = %chain.name,
                id = %chain.id,
                endpoint = %chain.rpc_url(&options.rpc_host),
                "forked chain endpoint"
            );
        }

        Ok(simulator)
    }

    /// Block until the child exits on its own.
    pub async fn wait(&mut self) -> io::Result<std::process::ExitStatus> {
        self.child.wait().await
    }

    /// Terminate the child and wait for it to exit.
    pub async fn shutdown(mut self) {
        info!("stopping fork-simulator");
        self.terminate().await;
    }

    async fn terminate(&mut self) {
        match self.child.kill().await {
            Ok(()) => debug!("fork-simulator terminated"),
            // kill() errors when the child has already exited.
            Err(err) => warn!(error = %err, "could not kill fork-simulator"),
        }
    }
}

/// Comma-joined, lower-cased chain names, the form the simulator's
/// `--chains` flag expects.
fn chain_list(config: &DevnetConfig) -> String {
    config
        .chains()
        .iter()
        .map(|chain| chain.name.to_ascii_lowercase())
        .collect::<Vec<_>>()
        .join(",")
}

fn ready_timeout_from_env() -> Duration {
    env::var(READY_TIMEOUT_ENV)
        .ok()
        .and_then(|raw| raw.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_READY_TIMEOUT)
}
