//! Typed configuration for the devnet: which chains to fork, which token
//! balances to seed, and the wallet that receives them.
//!
//! The document is decoded strictly; anything the schema does not know is
//! rejected at load time instead of being silently defaulted.

mod chain;

use std::{
    collections::HashSet,
    fmt, fs, io,
    path::{Path, PathBuf},
};

use num_bigint::BigUint;
use serde::{
    Deserialize, Deserializer,
    de::{self, Visitor},
};
use thiserror::Error;
use tracing::debug;

pub use chain::{ChainDescriptor, TokenBalanceRequest};

pub const DEFAULT_STARTING_PORT: u16 = 4444;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse devnet config: {source}")]
    Parse {
        #[from]
        source: serde_yaml::Error,
    },
    #[error("no wallet secret configured")]
    MissingWalletSecret,
    #[error("chain entry {index} has an empty name")]
    EmptyChainName { index: usize },
    #[error("duplicate chain name '{name}'")]
    DuplicateChain { name: String },
    #[error("port range exhausted assigning a port to chain '{name}'")]
    PortRangeExhausted { name: String },
}

/// Validated devnet configuration. Constructed once at startup and passed by
/// reference into each component; nothing reads it through global state.
#[derive(Clone)]
pub struct DevnetConfig {
    wallet_secret: String,
    starting_port: u16,
    chains: Vec<ChainDescriptor>,
}

impl DevnetConfig {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "loading devnet config");
        Self::from_yaml_str(&raw)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        let document: Document = serde_yaml::from_str(raw)?;
        Self::from_document(document)
    }

    /// The configured wallet private key.
    #[must_use]
    pub fn wallet_secret(&self) -> &str {
        &self.wallet_secret
    }

    #[must_use]
    pub const fn starting_port(&self) -> u16 {
        self.starting_port
    }

    /// Chains in configured order; the i-th chain owns port
    /// `starting_port + i`.
    #[must_use]
    pub fn chains(&self) -> &[ChainDescriptor] {
        &self.chains
    }

    /// Look a chain up by name, ignoring ASCII case.
    #[must_use]
    pub fn chain(&self, name: &str) -> Option<&ChainDescriptor> {
        self.chains
            .iter()
            .find(|chain| chain.name.eq_ignore_ascii_case(name))
    }

    fn from_document(document: Document) -> Result<Self, ConfigError> {
        let manifest = document.devnet;

        let wallet_secret = manifest
            .wallet
            .and_then(|wallet| wallet.secret)
            .filter(|secret| !secret.trim().is_empty())
            .ok_or(ConfigError::MissingWalletSecret)?;

        let starting_port = manifest.starting_port;
        let mut seen = HashSet::new();
        let mut chains = Vec::with_capacity(manifest.chains.len());
        for (index, entry) in manifest.chains.into_iter().enumerate() {
            let name = entry.name.trim().to_owned();
            if name.is_empty() {
                return Err(ConfigError::EmptyChainName { index });
            }
            if !seen.insert(name.to_ascii_lowercase()) {
                return Err(ConfigError::DuplicateChain { name });
            }
            let port = starting_port
                .checked_add(index as u16)
                .ok_or_else(|| ConfigError::PortRangeExhausted { name: name.clone() })?;

            chains.push(ChainDescriptor {
                name,
                id: entry.id,
                port,
                balances: entry
                    .balances
                    .into_iter()
                    .map(|balance| TokenBalanceRequest {
                        token: balance.token,
                        address: balance.address,
                        amount: balance.amount,
                        holder: balance.holder,
                    })
                    .collect(),
            });
        }

        Ok(Self {
            wallet_secret,
            starting_port,
            chains,
        })
    }
}

impl fmt::Debug for DevnetConfig {
    // The wallet secret stays out of logs and debug output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DevnetConfig")
            .field("starting_port", &self.starting_port)
            .field("chains", &self.chains)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Document {
    devnet: Manifest,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Manifest {
    #[serde(default = "default_starting_port")]
    starting_port: u16,
    #[serde(default)]
    wallet: Option<WalletManifest>,
    #[serde(default)]
    chains: Vec<ChainManifest>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WalletManifest {
    #[serde(default)]
    secret: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ChainManifest {
    name: String,
    #[serde(deserialize_with = "scalar_string")]
    id: String,
    #[serde(default)]
    balances: Vec<BalanceManifest>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BalanceManifest {
    token: String,
    address: String,
    #[serde(deserialize_with = "uint_amount")]
    amount: BigUint,
    holder: String,
}

const fn default_starting_port() -> u16 {
    DEFAULT_STARTING_PORT
}

/// Chain ids appear both quoted and as bare numbers in the wild; accept
/// either and keep the string form.
fn scalar_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    struct ScalarVisitor;

    impl Visitor<'_> for ScalarVisitor {
        type Value = String;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a string or integer scalar")
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
            Ok(value.to_owned())
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
            Ok(value.to_string())
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
            Ok(value.to_string())
        }
    }

    deserializer.deserialize_any(ScalarVisitor)
}

/// Amounts are smallest-unit token quantities and routinely exceed `u64`;
/// accept non-negative integer scalars or decimal strings.
fn uint_amount<'de, D>(deserializer: D) -> Result<BigUint, D::Error>
where
    D: Deserializer<'de>,
{
    struct AmountVisitor;

    impl Visitor<'_> for AmountVisitor {
        type Value = BigUint;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a non-negative integer or decimal string")
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
            value
                .trim()
                .parse()
                .map_err(|_| E::custom(format!("invalid amount '{value}'")))
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
            Ok(BigUint::from(value))
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
            u64::try_from(value)
                .map(BigUint::from)
                .map_err(|_| E::custom("amount must be non-negative"))
        }
    }

    deserializer.deserialize_any(AmountVisitor)
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;

    const SAMPLE: &str = r#"
devnet:
  starting_port: 4444
  wallet:
    secret: "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d"
  chains:
    - name: OP
      id: "10"
      balances:
        - token: VELO
          address: "0x9560e827af36c94d2ac33a39bce1fe78631088db"
          amount: "10000000000000000000"
          holder: "0xdFf4B9b5f7b54b6B2F228bDaf15f60cDfBdFbfd7"
    - name: Lisk
      id: 1135
      balances: []
"#;

    #[test]
    fn decodes_sample_document() {
        let config = DevnetConfig::from_yaml_str(SAMPLE).expect("sample should decode");
        assert_eq!(config.starting_port(), 4444);
        assert_eq!(config.chains().len(), 2);

        let op = &config.chains()[0];
        assert_eq!(op.name, "OP");
        assert_eq!(op.id, "10");
        assert_eq!(op.balances.len(), 1);
        assert_eq!(
            op.balances[0].amount,
            "10000000000000000000".parse::<BigUint>().unwrap()
        );

        // Numeric chain ids are stringified, not rejected.
        assert_eq!(config.chains()[1].id, "1135");
    }

    #[test]
    fn ports_follow_configured_order() {
        let raw = r#"
devnet:
  starting_port: 5000
  wallet:
    secret: "0xsecret"
  chains:
    - name: OP
      id: "10"
    - name: Base
      id: "8453"
    - name: Lisk
      id: "1135"
"#;
        let config = DevnetConfig::from_yaml_str(raw).unwrap();
        let ports: Vec<u16> = config.chains().iter().map(|chain| chain.port).collect();
        assert_eq!(ports, vec![5000, 5001, 5002]);

        let unique: HashSet<u16> = ports.iter().copied().collect();
        assert_eq!(unique.len(), ports.len());
    }

    #[test]
    fn starting_port_defaults_when_omitted() {
        let raw = r#"
devnet:
  wallet:
    secret: "0xsecret"
  chains:
    - name: OP
      id: "10"
"#;
        let config = DevnetConfig::from_yaml_str(raw).unwrap();
        assert_eq!(config.starting_port(), DEFAULT_STARTING_PORT);
        assert_eq!(config.chains()[0].rpc_url("127.0.0.1"), "http://127.0.0.1:4444");
    }

    #[test]
    fn missing_wallet_secret_is_fatal() {
        let missing = "devnet:\n  chains: []\n";
        assert!(matches!(
            DevnetConfig::from_yaml_str(missing),
            Err(ConfigError::MissingWalletSecret)
        ));

        let empty = "devnet:\n  wallet:\n    secret: \"  \"\n  chains: []\n";
        assert!(matches!(
            DevnetConfig::from_yaml_str(empty),
            Err(ConfigError::MissingWalletSecret)
        ));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let raw = r#"
devnet:
  wallet:
    secret: "0xsecret"
  chains:
    - name: OP
      id: "10"
      fee_tier: 3
"#;
        assert!(matches!(
            DevnetConfig::from_yaml_str(raw),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn negative_amounts_are_rejected() {
        let raw = r#"
devnet:
  wallet:
    secret: "0xsecret"
  chains:
    - name: OP
      id: "10"
      balances:
        - token: VELO
          address: "0x9560"
          amount: -5
          holder: "0xdead"
"#;
        assert!(matches!(
            DevnetConfig::from_yaml_str(raw),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn integer_amounts_are_accepted() {
        let raw = r#"
devnet:
  wallet:
    secret: "0xsecret"
  chains:
    - name: OP
      id: "10"
      balances:
        - token: USDC
          address: "0x0b2c"
          amount: 250000000
          holder: "0xdead"
"#;
        let config = DevnetConfig::from_yaml_str(raw).unwrap();
        assert_eq!(
            config.chains()[0].balances[0].amount,
            BigUint::from(250_000_000_u64)
        );
    }

    #[test]
    fn duplicate_chain_names_are_rejected_case_insensitively() {
        let raw = r#"
devnet:
  wallet:
    secret: "0xsecret"
  chains:
    - name: OP
      id: "10"
    - name: op
      id: "10"
"#;
        assert!(matches!(
            DevnetConfig::from_yaml_str(raw),
            Err(ConfigError::DuplicateChain { .. })
        ));
    }

    #[test]
    fn chain_lookup_ignores_case() {
        let config = DevnetConfig::from_yaml_str(SAMPLE).unwrap();
        assert!(config.chain("op").is_some());
        assert!(config.chain("LISK").is_some());
        assert!(config.chain("base").is_none());
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = DevnetConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.chains().len(), 2);
    }

    #[test]
    fn debug_output_redacts_the_secret() {
        let config = DevnetConfig::from_yaml_str(SAMPLE).unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("59c6995e"));
    }
}
