use bitcoin::address::{Address, AddressType, NetworkUnchecked};
use bitcoin::secp256k1::{Secp256k1, XOnlyPublicKey};
use bitcoin::CompressedPublicKey;

use crate::error::BtcError;
use crate::network::BtcNetwork;
use crate::witness::SpendPath;

fn compressed_key(pubkey_bytes: &[u8; 33]) -> Result<CompressedPublicKey, BtcError> {
    CompressedPublicKey::from_slice(pubkey_bytes).map_err(|e| {
        BtcError::InvalidPublicKey(format!("failed to parse compressed public key: {e}"))
    })
}

/// Derive a legacy P2PKH address from a compressed public key.
pub fn pubkey_to_p2pkh_address(
    pubkey_bytes: &[u8; 33],
    network: BtcNetwork,
) -> Result<String, BtcError> {
    let compressed_pk = compressed_key(pubkey_bytes)?;
    let address = Address::p2pkh(compressed_pk.pubkey_hash(), network.to_bitcoin_network());
    Ok(address.to_string())
}

/// Derive a P2WPKH (native SegWit bech32) address from a compressed public key.
///
/// Returns `bc1q...` for mainnet, `tb1q...` for testnet/signet.
pub fn pubkey_to_p2wpkh_address(
    pubkey_bytes: &[u8; 33],
    network: BtcNetwork,
) -> Result<String, BtcError> {
    let compressed_pk = compressed_key(pubkey_bytes)?;
    let address = Address::p2wpkh(&compressed_pk, network.to_bitcoin_network());
    Ok(address.to_string())
}

/// Derive a key-path-only P2TR address from an x-only internal key.
pub fn x_only_to_p2tr_address(x_only: &[u8; 32], network: BtcNetwork) -> Result<String, BtcError> {
    let internal_key = XOnlyPublicKey::from_slice(x_only)
        .map_err(|e| BtcError::InvalidPublicKey(format!("invalid x-only key: {e}")))?;
    let secp = Secp256k1::verification_only();
    let address = Address::p2tr(&secp, internal_key, None, network.to_bitcoin_network());
    Ok(address.to_string())
}

/// Parse an address and require it to belong to `network`.
pub fn parse_address(address: &str, network: BtcNetwork) -> Result<Address, BtcError> {
    address
        .trim()
        .parse::<Address<NetworkUnchecked>>()
        .map_err(|e| BtcError::InvalidAddress(format!("failed to parse address: {e}")))?
        .require_network(network.to_bitcoin_network())
        .map_err(|e| BtcError::InvalidAddress(format!("address is for another network: {e}")))
}

/// Validate a Bitcoin address string for the given network.
///
/// Returns `true` if the address is valid for the specified network,
/// `false` if it is valid but for a different network.
pub fn validate_address(address: &str, network: BtcNetwork) -> Result<bool, BtcError> {
    let parsed = address
        .trim()
        .parse::<Address<NetworkUnchecked>>()
        .map_err(|e| BtcError::InvalidAddress(format!("failed to parse address: {e}")))?;

    Ok(parsed.is_valid_for_network(network.to_bitcoin_network()))
}

/// Locking script bytes for an address.
pub fn script_pubkey_for_address(address: &str, network: BtcNetwork) -> Result<Vec<u8>, BtcError> {
    Ok(parse_address(address, network)?.script_pubkey().to_bytes())
}

/// The spend path used to unlock outputs paying to `address`.
pub fn spend_path_for_address(address: &str, network: BtcNetwork) -> Result<SpendPath, BtcError> {
    let parsed = parse_address(address, network)?;
    match parsed.address_type() {
        Some(AddressType::P2pkh) => Ok(SpendPath::LegacyP2pkh),
        Some(AddressType::P2wpkh) => Ok(SpendPath::SegwitP2wpkh),
        Some(AddressType::P2tr) => Ok(SpendPath::TaprootKeyPath),
        other => Err(BtcError::InvalidAddress(format!(
            "unsupported address type {other:?} for {address}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Compressed public key for private key 1 (the generator point).
    const G_PUBKEY: &str = "0279BE667EF9DCBBAC55A06295CE870B07029BFCDB2DCE28D959F2815B16F81798";

    fn g_pubkey() -> [u8; 33] {
        hex::decode(G_PUBKEY).unwrap().try_into().unwrap()
    }

    #[test]
    fn p2wpkh_mainnet_test_vector() {
        let address = pubkey_to_p2wpkh_address(&g_pubkey(), BtcNetwork::Mainnet).unwrap();
        assert_eq!(address, "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4");
    }

    #[test]
    fn p2wpkh_testnet_test_vector() {
        let address = pubkey_to_p2wpkh_address(&g_pubkey(), BtcNetwork::Testnet).unwrap();
        assert_eq!(address, "tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx");
    }

    #[test]
    fn p2pkh_mainnet_test_vector() {
        let address = pubkey_to_p2pkh_address(&g_pubkey(), BtcNetwork::Mainnet).unwrap();
        assert_eq!(address, "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH");
    }

    #[test]
    fn p2tr_address_shape() {
        let x_only: [u8; 32] = g_pubkey()[1..].try_into().unwrap();
        let address = x_only_to_p2tr_address(&x_only, BtcNetwork::Signet).unwrap();
        assert!(address.starts_with("tb1p"), "expected tb1p prefix, got {address}");
        assert_eq!(
            spend_path_for_address(&address, BtcNetwork::Signet).unwrap(),
            SpendPath::TaprootKeyPath
        );
        let script = script_pubkey_for_address(&address, BtcNetwork::Signet).unwrap();
        assert_eq!(&script[..2], &[0x51, 0x20]);
    }

    #[test]
    fn invalid_pubkey_returns_error() {
        let result = pubkey_to_p2wpkh_address(&[0u8; 33], BtcNetwork::Mainnet);
        assert!(matches!(result, Err(BtcError::InvalidPublicKey(_))));
    }

    #[test]
    fn validate_mainnet_address_on_testnet_returns_false() {
        let valid = validate_address(
            "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4",
            BtcNetwork::Testnet,
        )
        .unwrap();
        assert!(!valid);
    }

    #[test]
    fn validate_garbage_address_returns_error() {
        assert!(validate_address("notanaddress!!!", BtcNetwork::Mainnet).is_err());
    }

    #[test]
    fn spend_paths_by_address_type() {
        assert_eq!(
            spend_path_for_address("1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa", BtcNetwork::Mainnet)
                .unwrap(),
            SpendPath::LegacyP2pkh
        );
        assert_eq!(
            spend_path_for_address(
                "tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx",
                BtcNetwork::Testnet
            )
            .unwrap(),
            SpendPath::SegwitP2wpkh
        );
    }

    #[test]
    fn p2sh_has_no_spend_path() {
        let err = spend_path_for_address("3J98t1WpEZ73CNmQviecrnyiWrnqRhWNLy", BtcNetwork::Mainnet)
            .unwrap_err();
        assert!(matches!(err, BtcError::InvalidAddress(_)));
    }

    #[test]
    fn script_pubkey_for_p2wpkh() {
        let script = script_pubkey_for_address(
            "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4",
            BtcNetwork::Mainnet,
        )
        .unwrap();
        assert_eq!(
            hex::encode(script),
            "0014751e76e8199196d454941c45d1b3a323f1433bd6"
        );
    }

    #[test]
    fn wrong_network_fails_parse() {
        assert!(matches!(
            parse_address("bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4", BtcNetwork::Signet),
            Err(BtcError::InvalidAddress(_))
        ));
    }
}
