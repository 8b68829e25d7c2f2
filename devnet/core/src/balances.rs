//! Queries native and token balances for the wallet across all chains.

use std::sync::Arc;

use forknet_config::{ChainDescriptor, DevnetConfig};
use num_bigint::BigUint;
use tokio::{sync::Semaphore, task::JoinSet};
use tracing::{debug, error};

use crate::{MAX_CONCURRENT_TASKS, cast::CastClient};

const BALANCE_OF_SIGNATURE: &str = "balanceOf(address)(uint256)";
const NATIVE_SYMBOL: &str = "ETH";

/// Positive token balance held by the wallet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenBalance {
    pub token: String,
    pub amount: BigUint,
}

/// Balance snapshot for one chain.
///
/// `native` is `None` when the query failed, which is reported differently
/// from an actual zero.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainBalances {
    pub chain: String,
    pub native: Option<BigUint>,
    pub tokens: Vec<TokenBalance>,
}

impl ChainBalances {
    /// One-line rendering: `<native> ETH, <amount> <token>, ...`.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut line = match &self.native {
            Some(value) => format!("{value} {NATIVE_SYMBOL}"),
            None => "Failed".to_owned(),
        };
        for token in &self.tokens {
            line.push_str(&format!(", {} {}", token.amount, token.token));
        }
        line
    }
}

/// Query all configured chains concurrently and return per-chain balances
/// sorted by chain name, independent of completion order.
pub async fn collect_balances(
    cast: &CastClient,
    config: &DevnetConfig,
    wallet_address: &str,
    rpc_host: &str,
) -> Vec<ChainBalances> {
    let chains = config.chains();
    if chains.is_empty() {
        return Vec::new();
    }

    let limit = chains.len().min(MAX_CONCURRENT_TASKS);
    let semaphore = Arc::new(Semaphore::new(limit));
    let mut pool = JoinSet::new();
    for chain in chains.iter().cloned() {
        let cast = cast.clone();
        let wallet = wallet_address.to_owned();
        let rpc_url = chain.rpc_url(rpc_host);
        let semaphore = Arc::clone(&semaphore);
        pool.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return None;
            };
            Some(chain_balances(&cast, &chain, &rpc_url, &wallet).await)
        });
    }

    let mut report = Vec::with_capacity(chains.len());
    while let Some(joined) = pool.join_next().await {
        match joined {
            Ok(Some(balances)) => report.push(balances),
            Ok(None) => {}
            Err(err) => error!(error = %err, "balance task panicked"),
        }
    }

    // Completion order is nondeterministic; the report order must not be.
    report.sort_by(|a, b| a.chain.cmp(&b.chain));
    report
}

async fn chain_balances(
    cast: &CastClient,
    chain: &ChainDescriptor,
    rpc_url: &str,
    wallet: &str,
) -> ChainBalances {
    let native = match cast.native_balance(wallet, rpc_url).await {
        Ok(raw) => parse_uint_output(&raw),
        Err(err) => {
            debug!(chain = %chain.name, error = %err, "native balance query failed");
            None
        }
    };

    let mut tokens = Vec::new();
    for request in &chain.balances {
        let amount = match cast
            .call(&request.address, BALANCE_OF_SIGNATURE, &[wallet], rpc_url)
            .await
        {
            Ok(raw) => parse_uint_output(&raw).unwrap_or_default(),
            Err(err) => {
                debug!(
                    chain = %chain.name,
                    token = %request.token,
                    error = %err,
                    "token balance query failed"
                );
                BigUint::default()
            }
        };
        if amount > BigUint::default() {
            tokens.push(TokenBalance {
                token: request.token.clone(),
                amount,
            });
        }
    }

    ChainBalances {
        chain: chain.name.clone(),
        native,
        tokens,
    }
}

/// Parse a decoded uint from the chain client.
///
/// Large values arrive with a bracketed display annotation
/// (`"1000000000000000000000 [1e21]"`); only the integer prefix before the
/// bracket is authoritative. Malformed input parses to `None`, never panics.
#[must_use]
pub fn parse_uint_output(raw: &str) -> Option<BigUint> {
    let numeric = raw.split('[').next().unwrap_or(raw).trim();
    if numeric.is_empty() {
        return None;
    }
    numeric.parse().ok()
}
