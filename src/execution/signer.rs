use blake2::digest::consts::{U20, U32};
use blake2::{Blake2b, Digest};
use ed25519_dalek::{Signer, SigningKey};

use crate::error::ChainError;

type Blake2b160 = Blake2b<U20>;
type Blake2b256 = Blake2b<U32>;

// base58check prefixes
const EDSK_SEED: [u8; 4] = [13, 15, 58, 7];
const EDSK_EXPANDED: [u8; 4] = [43, 246, 78, 7];
const EDPK: [u8; 4] = [13, 15, 37, 217];
const TZ1: [u8; 3] = [6, 161, 159];
const EDSIG: [u8; 5] = [9, 245, 205, 134, 18];

/// Watermark for generic (manager) operations
const GENERIC_OPERATION_WATERMARK: u8 = 0x03;

/// Ed25519 signer holding an unencrypted `edsk...` key in memory
pub struct InMemorySigner {
    key: SigningKey,
    public_key_hash: String,
}

impl InMemorySigner {
    /// Accepts both the 32-byte seed form and the 64-byte expanded form.
    pub fn from_secret_key(secret: &str) -> Result<Self, ChainError> {
        let decoded = bs58::decode(secret.trim())
            .with_check(None)
            .into_vec()
            .map_err(|e| ChainError::InvalidKey(format!("base58check: {}", e)))?;

        let seed: [u8; 32] = if decoded.len() == EDSK_SEED.len() + 32
            && decoded.starts_with(&EDSK_SEED)
        {
            decoded[EDSK_SEED.len()..]
                .try_into()
                .map_err(|_| ChainError::InvalidKey("bad seed length".to_string()))?
        } else if decoded.len() == EDSK_EXPANDED.len() + 64 && decoded.starts_with(&EDSK_EXPANDED)
        {
            // libsodium layout: seed || public key
            decoded[EDSK_EXPANDED.len()..EDSK_EXPANDED.len() + 32]
                .try_into()
                .map_err(|_| ChainError::InvalidKey("bad seed length".to_string()))?
        } else {
            return Err(ChainError::InvalidKey(
                "only unencrypted ed25519 (edsk) keys are supported".to_string(),
            ));
        };

        let key = SigningKey::from_bytes(&seed);
        let public_key_hash = encode_public_key_hash(key.verifying_key().as_bytes());

        Ok(Self {
            key,
            public_key_hash,
        })
    }

    /// `tz1...` address of this key
    pub fn public_key_hash(&self) -> &str {
        &self.public_key_hash
    }

    /// `edpk...` public key
    pub fn public_key(&self) -> String {
        with_prefix(&EDPK, self.key.verifying_key().as_bytes())
    }

    /// Sign forged operation bytes; returns the raw 64-byte signature.
    pub fn sign_operation(&self, forged: &[u8]) -> [u8; 64] {
        let mut watermarked = Vec::with_capacity(forged.len() + 1);
        watermarked.push(GENERIC_OPERATION_WATERMARK);
        watermarked.extend_from_slice(forged);

        let digest = Blake2b256::digest(&watermarked);
        self.key.sign(digest.as_slice()).to_bytes()
    }

    /// `edsig...` encoding of a raw signature
    pub fn encode_signature(signature: &[u8; 64]) -> String {
        with_prefix(&EDSIG, signature)
    }
}

fn encode_public_key_hash(public_key: &[u8]) -> String {
    let hash = Blake2b160::digest(public_key);
    with_prefix(&TZ1, hash.as_slice())
}

fn with_prefix(prefix: &[u8], payload: &[u8]) -> String {
    let mut bytes = Vec::with_capacity(prefix.len() + payload.len());
    bytes.extend_from_slice(prefix);
    bytes.extend_from_slice(payload);
    bs58::encode(bytes).with_check().into_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signature, Verifier};

    // Well-known sandbox account ("alice")
    const ALICE_SK: &str = "edsk3QoqBuvdamxouPhin7swCvkQNgq4jP5KZPbwWNnwdZpSpJiEbq";
    const ALICE_PKH: &str = "tz1VSUr8wwNhLAzempoch5d6hLRiTh8Cjcjb";

    #[test]
    fn test_public_key_hash_from_seed_key() {
        let signer = InMemorySigner::from_secret_key(ALICE_SK).unwrap();
        assert_eq!(signer.public_key_hash(), ALICE_PKH);
        assert!(signer.public_key().starts_with("edpk"));
    }

    #[test]
    fn test_expanded_key_matches_seed_key() {
        let seed_signer = InMemorySigner::from_secret_key(ALICE_SK).unwrap();

        let decoded = bs58::decode(ALICE_SK).with_check(None).into_vec().unwrap();
        let mut expanded = EDSK_EXPANDED.to_vec();
        expanded.extend_from_slice(&decoded[EDSK_SEED.len()..]);
        expanded.extend_from_slice(seed_signer.key.verifying_key().as_bytes());
        let expanded_sk = bs58::encode(expanded).with_check().into_string();

        let expanded_signer = InMemorySigner::from_secret_key(&expanded_sk).unwrap();
        assert_eq!(expanded_signer.public_key_hash(), ALICE_PKH);
    }

    #[test]
    fn test_signature_verifies_over_watermarked_digest() {
        let signer = InMemorySigner::from_secret_key(ALICE_SK).unwrap();
        let forged = hex::decode("a1b2c3d4").unwrap();

        let raw = signer.sign_operation(&forged);
        let mut watermarked = vec![GENERIC_OPERATION_WATERMARK];
        watermarked.extend_from_slice(&forged);
        let digest = Blake2b256::digest(&watermarked);

        let signature = Signature::from_bytes(&raw);
        assert!(signer
            .key
            .verifying_key()
            .verify(digest.as_slice(), &signature)
            .is_ok());
        assert!(InMemorySigner::encode_signature(&raw).starts_with("edsig"));
    }

    #[test]
    fn test_rejects_garbage_keys() {
        assert!(matches!(
            InMemorySigner::from_secret_key("not-a-key"),
            Err(ChainError::InvalidKey(_))
        ));
        // valid base58check, wrong prefix (a tz1 address)
        assert!(matches!(
            InMemorySigner::from_secret_key(ALICE_PKH),
            Err(ChainError::InvalidKey(_))
        ));
    }
}
