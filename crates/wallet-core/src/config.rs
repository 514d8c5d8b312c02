//! Wallet configuration.
//!
//! Loaded from an optional TOML file. Missing sections and fields fall back
//! to defaults; endpoints left unset resolve per network.

use std::path::Path;

use chain_btc::network::BtcNetwork;
use serde::Deserialize;

use crate::error::WalletError;

/// Local spell composer and broadcast service.
pub const DEFAULT_WALLET_API: &str = "http://localhost:9123";

/// Charms indexer for testnet4.
pub const TESTNET_CHARMS_INDEX: &str = "https://api-t4.charms.dev";

/// Local charms indexer, used for networks without a public one.
pub const LOCAL_CHARMS_INDEX: &str = "http://localhost:3355";

/// Top-level configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    pub network: BtcNetwork,
    pub fee_rate_sat_vbyte: u64,
    pub endpoints: EndpointConfig,
}

impl Default for WalletConfig {
    fn default() -> Self {
        WalletConfig {
            network: BtcNetwork::default(),
            fee_rate_sat_vbyte: 1,
            endpoints: EndpointConfig::default(),
        }
    }
}

/// Collaborator base URLs. `None` means the network default.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub utxo_index: Option<String>,
    pub spell_composer: Option<String>,
    pub charms_index: Option<String>,
    pub broadcaster: Option<String>,
    pub explorer: Option<String>,
}

impl WalletConfig {
    /// Load configuration from `path`. Returns defaults if the file doesn't
    /// exist and an error if it exists but cannot be parsed.
    pub fn load(path: &Path) -> Result<Self, WalletError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                let config = Self::from_toml_str(&contents)?;
                tracing::info!("Loaded config from {}", path.display());
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(WalletError::Config(format!(
                "failed to read {}: {e}",
                path.display()
            ))),
        }
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, WalletError> {
        let config: WalletConfig = toml::from_str(contents)?;
        if config.fee_rate_sat_vbyte == 0 {
            return Err(WalletError::Config("fee_rate_sat_vbyte must be positive".into()));
        }
        Ok(config)
    }

    pub fn utxo_index_url(&self) -> String {
        resolve(&self.endpoints.utxo_index, self.network.default_rpc_url())
    }

    pub fn spell_composer_url(&self) -> String {
        resolve(&self.endpoints.spell_composer, DEFAULT_WALLET_API)
    }

    pub fn charms_index_url(&self) -> String {
        let fallback = match self.network {
            BtcNetwork::Testnet => TESTNET_CHARMS_INDEX,
            BtcNetwork::Mainnet | BtcNetwork::Signet => LOCAL_CHARMS_INDEX,
        };
        resolve(&self.endpoints.charms_index, fallback)
    }

    pub fn broadcaster_url(&self) -> String {
        resolve(&self.endpoints.broadcaster, DEFAULT_WALLET_API)
    }

    pub fn explorer_url(&self) -> String {
        resolve(&self.endpoints.explorer, self.network.explorer_url())
    }

    /// Explorer link for a transaction.
    pub fn tx_link(&self, txid: &str) -> String {
        format!("{}/tx/{txid}", self.explorer_url())
    }
}

fn resolve(configured: &Option<String>, fallback: &str) -> String {
    configured
        .as_deref()
        .map(|url| url.trim_end_matches('/'))
        .filter(|url| !url.is_empty())
        .unwrap_or(fallback)
        .to_string()
}
