//! Private key import, key pairs, and the two signature schemes.
//!
//! ECDSA signatures are produced with `k256` (RFC 6979 nonces, low-S).
//! Schnorr signatures and x-only keys go through `bitcoin::secp256k1`.

use bitcoin::secp256k1::{self, Keypair, Message, PublicKey, Secp256k1, SecretKey};
use crypto_utils::hash::sha256;
use crypto_utils::random::random_bytes_fixed;
use crypto_utils::zeroizing::{SecretKeyBytes, ZeroizingBytes};
use k256::ecdsa::{signature::hazmat::PrehashSigner, Signature, SigningKey};
use tracing::debug;

use crate::error::BtcError;

/// Length of a base58check-decoded BIP32 extended key payload.
const EXTENDED_KEY_PAYLOAD_LEN: usize = 78;

/// A validated secp256k1 secret scalar. Zeroed on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKey(SecretKeyBytes);

impl PrivateKey {
    /// Wrap raw bytes after checking they form a valid scalar.
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, BtcError> {
        SecretKey::from_slice(&bytes)
            .map_err(|e| BtcError::InvalidPrivateKey(e.to_string()))?;
        Ok(Self(SecretKeyBytes::new(bytes)))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }

    /// Lowercase hex encoding. Callers must treat the result as secret.
    pub fn to_hex(&self) -> String {
        hex::encode(self.as_bytes())
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PrivateKey(..)")
    }
}

/// Normalize an imported private key.
///
/// Accepts 64 hex characters (with or without a `0x` prefix) or a base58check
/// `xprv`/`tprv` extended key, in which case the trailing 32 bytes of the
/// payload are the scalar.
pub fn normalize_private_key(input: &str) -> Result<PrivateKey, BtcError> {
    let trimmed = input.trim();

    if trimmed.starts_with("xprv") || trimmed.starts_with("tprv") {
        return decode_extended_key(trimmed);
    }

    let hex_part = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    if hex_part.is_empty() || !hex_part.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(BtcError::InvalidPrivateKeyFormat(
            "expected 64 hex characters or an xprv/tprv extended key".into(),
        ));
    }
    if hex_part.len() != 64 {
        return Err(BtcError::InvalidPrivateKeyLength(hex_part.len()));
    }

    let decoded = ZeroizingBytes::new(
        hex::decode(hex_part).map_err(|e| BtcError::InvalidPrivateKeyFormat(e.to_string()))?,
    );
    let secret = SecretKeyBytes::from_slice(&decoded)?;
    PrivateKey::from_bytes(*secret.as_bytes())
}

fn decode_extended_key(encoded: &str) -> Result<PrivateKey, BtcError> {
    let payload = ZeroizingBytes::new(
        bs58::decode(encoded)
            .with_check(None)
            .into_vec()
            .map_err(|e| {
                BtcError::InvalidPrivateKeyFormat(format!("bad extended key encoding: {e}"))
            })?,
    );

    if payload.len() != EXTENDED_KEY_PAYLOAD_LEN {
        return Err(BtcError::InvalidPrivateKeyFormat(format!(
            "extended key payload must be {EXTENDED_KEY_PAYLOAD_LEN} bytes, got {}",
            payload.len()
        )));
    }

    let secret = SecretKeyBytes::from_slice(&payload[payload.len() - 32..])?;
    debug!("extracted scalar from extended private key");
    PrivateKey::from_bytes(*secret.as_bytes())
}

/// A private key with its derived public forms.
#[derive(Clone)]
pub struct KeyPair {
    private_key: PrivateKey,
    public_key: [u8; 33],
    x_only: [u8; 32],
}

impl KeyPair {
    /// Generate a fresh key pair from OS randomness.
    pub fn generate() -> Result<Self, BtcError> {
        // Rejection-sample until the bytes are a valid scalar.
        loop {
            let candidate: [u8; 32] = random_bytes_fixed();
            if let Ok(private_key) = PrivateKey::from_bytes(candidate) {
                return Self::from_private_key(private_key);
            }
        }
    }

    pub fn from_private_key(private_key: PrivateKey) -> Result<Self, BtcError> {
        let secp = Secp256k1::signing_only();
        let secret = SecretKey::from_slice(private_key.as_bytes())
            .map_err(|e| BtcError::InvalidPrivateKey(e.to_string()))?;
        let public = PublicKey::from_secret_key(&secp, &secret);
        let (x_only, _parity) = public.x_only_public_key();

        Ok(Self {
            private_key,
            public_key: public.serialize(),
            x_only: x_only.serialize(),
        })
    }

    pub fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }

    /// 33-byte compressed SEC1 public key.
    pub fn public_key(&self) -> &[u8; 33] {
        &self.public_key
    }

    /// 32-byte x-only key used for Taproot outputs.
    pub fn x_only_public_key(&self) -> &[u8; 32] {
        &self.x_only
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &hex::encode(self.public_key))
            .finish_non_exhaustive()
    }
}

/// Sign a 32-byte digest with ECDSA, returning the DER-encoded signature.
pub fn ecdsa_sign(digest: &[u8; 32], private_key: &PrivateKey) -> Result<Vec<u8>, BtcError> {
    let signing_key = SigningKey::from_bytes(private_key.as_bytes().into())
        .map_err(|e| BtcError::InvalidPrivateKey(format!("invalid signing key: {e}")))?;

    let signature: Signature = signing_key
        .sign_prehash(digest)
        .map_err(|e| BtcError::SigningError(format!("ECDSA signing failed: {e}")))?;
    let signature = signature.normalize_s().unwrap_or(signature);

    Ok(signature.to_der().as_bytes().to_vec())
}

/// Produce a BIP340 Schnorr signature.
///
/// `message` is either a 32-byte digest, signed as-is, or a 33-byte
/// `digest || sighash_type` message, which is reduced with a single SHA-256
/// first.
pub fn schnorr_sign(message: &[u8], key: &[u8]) -> Result<[u8; 64], BtcError> {
    if key.len() != 32 {
        return Err(BtcError::InvalidKeyLength(key.len()));
    }

    let digest: [u8; 32] = match message.len() {
        32 => message
            .try_into()
            .map_err(|_| BtcError::SigningError("message conversion failed".into()))?,
        33 => sha256(message),
        n => {
            return Err(BtcError::SigningError(format!(
                "schnorr message must be 32 or 33 bytes, got {n}"
            )))
        }
    };

    let secp = Secp256k1::signing_only();
    let keypair = Keypair::from_seckey_slice(&secp, key)
        .map_err(|e| BtcError::InvalidPrivateKey(e.to_string()))?;
    let msg = Message::from_digest(digest);
    let signature = secp.sign_schnorr_no_aux_rand(&msg, &keypair);

    Ok(signature.serialize())
}

/// Verify a Schnorr signature produced by [`schnorr_sign`].
pub fn schnorr_verify(message: &[u8], signature: &[u8; 64], x_only: &[u8; 32]) -> bool {
    let digest: [u8; 32] = match message.len() {
        32 => match message.try_into() {
            Ok(d) => d,
            Err(_) => return false,
        },
        33 => sha256(message),
        _ => return false,
    };

    let secp = Secp256k1::verification_only();
    let (Ok(sig), Ok(key)) = (
        secp256k1::schnorr::Signature::from_slice(signature),
        secp256k1::XOnlyPublicKey::from_slice(x_only),
    ) else {
        return false;
    };
    secp.verify_schnorr(&sig, &Message::from_digest(digest), &key)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::ecdsa::{signature::hazmat::PrehashVerifier, VerifyingKey};

    const KEY_HEX: &str = "0000000000000000000000000000000000000000000000000000000000000001";

    /// BIP32 test vector 1 master key.
    const XPRV: &str = "xprv9s21ZrQH143K3QTDL4LXw2F7HEK3wJUD2nW2nRk4stbPy6cq3jPPqjiChkVvvNKmPGJxWUtg6LnF5kejMRNNU3TGtRBeJgk33yuGBxrMPHi";
    const XPRV_SCALAR: &str = "e8f32e723decf4051aefac8e2c93c9c5b214313817cdb01a1494b917c8436b35";

    /// The same master key with the testnet version bytes.
    const TPRV: &str = "tprv8ZgxMBicQKsPeDgjzdC36fs6bMjGApWDNLR9erAXMs5skhMv36j9MV5ecvfavji5khqjWaWSFhN3YcCUUdiKH6isR4Pwy3U5y5egddBr16m";

    #[test]
    fn normalizes_bare_hex() {
        let key = normalize_private_key(KEY_HEX).unwrap();
        assert_eq!(key.to_hex(), KEY_HEX);
    }

    #[test]
    fn normalizes_prefixed_hex_and_whitespace() {
        let key = normalize_private_key(&format!("  0x{KEY_HEX}\n")).unwrap();
        assert_eq!(key.to_hex(), KEY_HEX);
    }

    #[test]
    fn normalization_is_stable() {
        let once = normalize_private_key(KEY_HEX).unwrap();
        let twice = normalize_private_key(&once.to_hex()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn extracts_scalar_from_xprv() {
        let key = normalize_private_key(XPRV).unwrap();
        assert_eq!(key.to_hex(), XPRV_SCALAR);
    }

    #[test]
    fn extracts_scalar_from_tprv() {
        let key = normalize_private_key(TPRV).unwrap();
        assert_eq!(key.to_hex(), XPRV_SCALAR);
        assert_eq!(key, normalize_private_key(XPRV).unwrap());
    }

    #[test]
    fn rejects_extended_key_with_wrong_payload_length() {
        // Valid base58check, but a 77-byte payload.
        let short = "tprvhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhhjTnMjg";
        assert_eq!(bs58::decode(short).with_check(None).into_vec().unwrap().len(), 77);
        assert!(matches!(
            normalize_private_key(short),
            Err(BtcError::InvalidPrivateKeyFormat(msg)) if msg.contains("78 bytes")
        ));
    }

    #[test]
    fn rejects_bad_extended_key_checksum() {
        let mut broken = XPRV.to_string();
        broken.pop();
        broken.push('j');
        assert!(matches!(
            normalize_private_key(&broken),
            Err(BtcError::InvalidPrivateKeyFormat(_))
        ));
    }

    #[test]
    fn rejects_non_hex() {
        assert!(matches!(
            normalize_private_key("not a key"),
            Err(BtcError::InvalidPrivateKeyFormat(_))
        ));
        assert!(matches!(
            normalize_private_key(""),
            Err(BtcError::InvalidPrivateKeyFormat(_))
        ));
    }

    #[test]
    fn rejects_wrong_hex_length() {
        assert!(matches!(
            normalize_private_key("abcd"),
            Err(BtcError::InvalidPrivateKeyLength(4))
        ));
    }

    #[test]
    fn rejects_zero_scalar() {
        let zero = "0".repeat(64);
        assert!(matches!(
            normalize_private_key(&zero),
            Err(BtcError::InvalidPrivateKey(_))
        ));
    }

    #[test]
    fn generator_point_public_key() {
        let pair = KeyPair::from_private_key(normalize_private_key(KEY_HEX).unwrap()).unwrap();
        assert_eq!(
            hex::encode(pair.public_key()),
            "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798"
        );
        assert_eq!(&pair.public_key()[1..], pair.x_only_public_key());
    }

    #[test]
    fn generated_pairs_differ() {
        let a = KeyPair::generate().unwrap();
        let b = KeyPair::generate().unwrap();
        assert_ne!(a.public_key(), b.public_key());
        assert_eq!(a.public_key().len(), 33);
    }

    #[test]
    fn debug_output_hides_secret() {
        let pair = KeyPair::from_private_key(normalize_private_key(KEY_HEX).unwrap()).unwrap();
        let rendered = format!("{pair:?}");
        assert!(!rendered.contains(KEY_HEX));
        assert_eq!(format!("{:?}", pair.private_key()), "PrivateKey(..)");
    }

    #[test]
    fn ecdsa_signature_verifies() {
        let key = normalize_private_key(KEY_HEX).unwrap();
        let digest = sha256(b"charms");
        let der = ecdsa_sign(&digest, &key).unwrap();

        let signing_key = SigningKey::from_bytes(key.as_bytes().into()).unwrap();
        let verifying_key = VerifyingKey::from(&signing_key);
        let sig = Signature::from_der(&der).unwrap();
        assert!(verifying_key.verify_prehash(&digest, &sig).is_ok());
        assert!(sig.normalize_s().is_none(), "signature must be low-S");
    }

    #[test]
    fn ecdsa_is_deterministic() {
        let key = normalize_private_key(KEY_HEX).unwrap();
        let digest = sha256(b"rfc6979");
        assert_eq!(
            ecdsa_sign(&digest, &key).unwrap(),
            ecdsa_sign(&digest, &key).unwrap()
        );
    }

    #[test]
    fn schnorr_accepts_32_and_33_byte_messages() {
        let pair = KeyPair::generate().unwrap();
        let digest = sha256(b"commit");

        let sig32 = schnorr_sign(&digest, pair.private_key().as_bytes()).unwrap();
        assert!(schnorr_verify(&digest, &sig32, pair.x_only_public_key()));

        let mut with_type = digest.to_vec();
        with_type.push(0x81);
        let sig33 = schnorr_sign(&with_type, pair.private_key().as_bytes()).unwrap();
        assert!(schnorr_verify(&with_type, &sig33, pair.x_only_public_key()));
        assert_ne!(sig32, sig33);
    }

    #[test]
    fn schnorr_rejects_short_key() {
        assert!(matches!(
            schnorr_sign(&[0u8; 32], &[1u8; 31]),
            Err(BtcError::InvalidKeyLength(31))
        ));
    }

    #[test]
    fn schnorr_rejects_odd_message_length() {
        let pair = KeyPair::generate().unwrap();
        assert!(matches!(
            schnorr_sign(&[0u8; 20], pair.private_key().as_bytes()),
            Err(BtcError::SigningError(_))
        ));
    }
}
