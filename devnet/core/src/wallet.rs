//! Resolves the funded wallet's identity from the configured secret.

use std::fmt;

use thiserror::Error;
use tracing::info;

use crate::cast::{CastClient, CastError};

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("failed to derive the wallet address: {source}")]
    Derive {
        #[source]
        source: CastError,
    },
}

/// Wallet receiving the devnet funds: public address plus the configured
/// secret. Resolved once at startup, read-only afterwards.
#[derive(Clone)]
pub struct WalletIdentity {
    address: String,
    secret: String,
}

impl WalletIdentity {
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    #[must_use]
    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for WalletIdentity {
    // The secret stays out of logs and debug output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletIdentity")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Derive the public address for the configured secret.
///
/// Derivation is deterministic, so a failure is fatal and never retried.
pub async fn resolve(cast: &CastClient, secret: &str) -> Result<WalletIdentity, WalletError> {
    let address = cast
        .wallet_address(secret)
        .await
        .map_err(|source| WalletError::Derive { source })?;

    info!(address = %address, "wallet resolved");

    Ok(WalletIdentity {
        address,
        secret: secret.to_owned(),
    })
}
