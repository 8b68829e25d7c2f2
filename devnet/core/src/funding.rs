//! Funds the wallet by impersonating holder accounts on each forked chain.
//!
//! Tasks run in a bounded pool and are isolated from each other: a failed
//! impersonation or transfer is logged and dropped, never escalated, and the
//! balance verification phase is the arbiter of what actually landed.
//! Several tasks draining the same holder concurrently race on nonces; the
//! retry/backoff policy absorbs that instead of serializing the pool.

use std::{sync::Arc, time::Duration};

use forknet_config::DevnetConfig;
use num_bigint::BigUint;
use thiserror::Error;
use tokio::{sync::Semaphore, task::JoinSet, time::sleep};
use tracing::{error, info, warn};

use crate::{
    MAX_CONCURRENT_TASKS,
    cast::{CastClient, CastError},
};

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_secs(2);
const BACKOFF_FACTOR: f64 = 1.5;

#[derive(Debug, Error)]
pub enum FundingError {
    #[error("funding request references unknown chain '{chain}'")]
    UnknownChain { chain: String },
}

/// One transfer to execute: move `amount` of the token at `address` from
/// `holder` to the wallet on `chain`.
#[derive(Clone, Debug)]
pub struct FundingTask {
    pub chain: String,
    pub token: String,
    pub address: String,
    pub amount: BigUint,
    pub holder: String,
}

/// Expand the configured balance entries into funding tasks, in configured
/// order.
#[must_use]
pub fn funding_tasks(config: &DevnetConfig) -> Vec<FundingTask> {
    config
        .chains()
        .iter()
        .flat_map(|chain| {
            chain.balances.iter().map(|request| FundingTask {
                chain: chain.name.clone(),
                token: request.token.clone(),
                address: request.address.clone(),
                amount: request.amount.clone(),
                holder: request.holder.clone(),
            })
        })
        .collect()
}

/// Execute all funding tasks and wait for every one of them to finish.
///
/// The only error is an unknown chain name, raised before any transfer is
/// attempted; per-task failures are logged and consume only their own task.
pub async fn fund_wallet(
    cast: &CastClient,
    config: &DevnetConfig,
    wallet_address: &str,
    rpc_host: &str,
    tasks: Vec<FundingTask>,
) -> Result<(), FundingError> {
    if tasks.is_empty() {
        info!("no token balances configured; skipping funding");
        return Ok(());
    }

    let mut work = Vec::with_capacity(tasks.len());
    for task in tasks {
        let chain = config
            .chain(&task.chain)
            .ok_or_else(|| FundingError::UnknownChain {
                chain: task.chain.clone(),
            })?;
        let rpc_url = chain.rpc_url(rpc_host);
        work.push((task, rpc_url));
    }

    let limit = work.len().min(MAX_CONCURRENT_TASKS);
    info!(tasks = work.len(), limit, "funding wallet");

    let semaphore = Arc::new(Semaphore::new(limit));
    let mut pool = JoinSet::new();
    for (task, rpc_url) in work {
        let cast = cast.clone();
        let wallet = wallet_address.to_owned();
        let semaphore = Arc::clone(&semaphore);
        pool.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return;
            };
            run_funding_task(&cast, &task, &rpc_url, &wallet).await;
        });
    }

    while let Some(joined) = pool.join_next().await {
        if let Err(err) = joined {
            error!(error = %err, "funding task panicked");
        }
    }

    info!("funding complete");
    Ok(())
}

async fn run_funding_task(cast: &CastClient, task: &FundingTask, rpc_url: &str, wallet: &str) {
    let amount = task.amount.to_string();
    let mut delay = INITIAL_BACKOFF;

    for attempt in 0..=MAX_RETRIES {
        if let Err(err) = cast.impersonate_account(&task.holder, rpc_url).await {
            warn!(
                chain = %task.chain,
                holder = %task.holder,
                error = %err,
                "impersonation failed; dropping funding task"
            );
            return;
        }

        match cast
            .send_token_transfer(&task.address, wallet, &amount, &task.holder, rpc_url)
            .await
        {
            Ok(()) => {
                info!(
                    chain = %task.chain,
                    token = %task.token,
                    amount = %amount,
                    "funded"
                );
                return;
            }
            Err(err) if is_contention_error(&err) => {
                if attempt == MAX_RETRIES {
                    error!(
                        chain = %task.chain,
                        token = %task.token,
                        attempts = MAX_RETRIES + 1,
                        error = %err,
                        "transfer still underpriced; giving up"
                    );
                    return;
                }
                warn!(
                    chain = %task.chain,
                    token = %task.token,
                    delay = ?delay,
                    attempt = attempt + 1,
                    "underpriced transfer; backing off before retry"
                );
                sleep(delay).await;
                delay = delay.mul_f64(BACKOFF_FACTOR);
            }
            Err(err) => {
                error!(
                    chain = %task.chain,
                    token = %task.token,
                    error = %err,
                    "transfer failed; dropping funding task"
                );
                return;
            }
        }
    }
}

/// Concurrent transfers from one impersonated holder conflict on sequencing;
/// the simulator reports those as the underpriced/replacement class.
fn is_contention_error(err: &CastError) -> bool {
    match err {
        CastError::Failed { stderr, .. } => stderr.contains("underpriced"),
        CastError::Spawn { .. } | CastError::Timeout { .. } => false,
    }
}
