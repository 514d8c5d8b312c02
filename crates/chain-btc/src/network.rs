use std::str::FromStr;

use bitcoin::Network;
use serde::{Deserialize, Serialize};

use crate::error::BtcError;

/// Default address-index endpoint for Bitcoin mainnet.
pub const MAINNET_RPC: &str = "https://mempool.space/api";

/// Default address-index endpoint for Bitcoin testnet (testnet4).
pub const TESTNET_RPC: &str = "https://mempool.space/testnet4/api";

/// Default address-index endpoint for Bitcoin signet.
pub const SIGNET_RPC: &str = "https://mempool.space/signet/api";

/// Supported Bitcoin networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BtcNetwork {
    Mainnet,
    Testnet,
    Signet,
}

impl BtcNetwork {
    /// Convert to the `bitcoin` crate's `Network` type.
    pub fn to_bitcoin_network(self) -> Network {
        match self {
            BtcNetwork::Mainnet => Network::Bitcoin,
            BtcNetwork::Testnet => Network::Testnet,
            BtcNetwork::Signet => Network::Signet,
        }
    }

    /// Return the default address-index endpoint for this network.
    pub fn default_rpc_url(self) -> &'static str {
        match self {
            BtcNetwork::Mainnet => MAINNET_RPC,
            BtcNetwork::Testnet => TESTNET_RPC,
            BtcNetwork::Signet => SIGNET_RPC,
        }
    }

    /// Block explorer base URL used for transaction links.
    pub fn explorer_url(self) -> &'static str {
        match self {
            BtcNetwork::Mainnet => "https://mempool.space",
            BtcNetwork::Testnet => "https://mempool.space/testnet4",
            BtcNetwork::Signet => "https://mempool.space/signet",
        }
    }
}

impl Default for BtcNetwork {
    fn default() -> Self {
        BtcNetwork::Testnet
    }
}

impl FromStr for BtcNetwork {
    type Err = BtcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" | "bitcoin" => Ok(BtcNetwork::Mainnet),
            "testnet" | "testnet4" => Ok(BtcNetwork::Testnet),
            "signet" => Ok(BtcNetwork::Signet),
            other => Err(BtcError::InvalidNetwork(other.to_string())),
        }
    }
}

impl std::fmt::Display for BtcNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BtcNetwork::Mainnet => write!(f, "mainnet"),
            BtcNetwork::Testnet => write!(f, "testnet"),
            BtcNetwork::Signet => write!(f, "signet"),
        }
    }
}
