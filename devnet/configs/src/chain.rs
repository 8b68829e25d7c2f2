use num_bigint::BigUint;

/// A single forked chain in the devnet, with its assigned RPC port.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainDescriptor {
    pub name: String,
    pub id: String,
    pub port: u16,
    pub balances: Vec<TokenBalanceRequest>,
}

impl ChainDescriptor {
    /// RPC endpoint the fork-simulator serves this chain on.
    #[must_use]
    pub fn rpc_url(&self, host: &str) -> String {
        format!("http://{host}:{}", self.port)
    }
}

/// A token balance the wallet should end up with, sourced from `holder`.
///
/// `amount` is in the token's smallest unit; `token` is a display symbol
/// only and never interpreted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenBalanceRequest {
    pub token: String,
    pub address: String,
    pub amount: BigUint,
    pub holder: String,
}
