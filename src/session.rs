use anyhow::{anyhow, Context, Result};
use ethers::core::k256::ecdsa::SigningKey;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, RecoveryMessage, Signature, H256};
use rand::rngs::OsRng;
use rand::RngCore;
use std::str::FromStr;

/// Ephemeral secp256k1 session keypair.
///
/// Created once per login (or restored from a persisted session config) and
/// used to sign both the authentication challenge and user-operation hashes.
/// All derived material (public keys, address) is a pure function of the
/// private key; the key never rotates in place.
#[derive(Clone, Debug)]
pub struct SessionKey {
    wallet: LocalWallet,
}

impl SessionKey {
    /// Generates a fresh random session key.
    pub fn generate() -> Result<Self> {
        let mut rng = OsRng;
        // Very low probability of invalid key; loop until the curve accepts.
        for _ in 0..64 {
            let mut bytes = [0u8; 32];
            rng.fill_bytes(&mut bytes);
            if bytes.iter().all(|b| *b == 0) {
                continue;
            }
            if let Ok(wallet) = LocalWallet::from_str(&hex::encode(bytes)) {
                return Ok(Self { wallet });
            }
        }
        Err(anyhow!(
            "failed to generate a valid random session key after multiple attempts"
        ))
    }

    /// Restores a session key from a hex private key, with or without a
    /// `0x` prefix.
    pub fn from_private_key(hex_key: &str) -> Result<Self> {
        let hex_key = hex_key.strip_prefix("0x").unwrap_or(hex_key);
        let wallet = LocalWallet::from_str(hex_key).context("invalid session private key")?;
        Ok(Self { wallet })
    }

    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    pub fn private_key_hex(&self) -> String {
        format!("0x{}", hex::encode(self.signer().to_bytes()))
    }

    /// 65-byte uncompressed SEC1 public key (0x04 prefix).
    pub fn public_key_uncompressed(&self) -> Vec<u8> {
        self.signer()
            .verifying_key()
            .to_encoded_point(false)
            .as_bytes()
            .to_vec()
    }

    /// 33-byte compressed SEC1 public key.
    #[allow(dead_code)]
    pub fn public_key_compressed(&self) -> Vec<u8> {
        self.signer()
            .verifying_key()
            .to_encoded_point(true)
            .as_bytes()
            .to_vec()
    }

    pub fn public_key_hex(&self) -> String {
        format!("0x{}", hex::encode(self.public_key_uncompressed()))
    }

    /// Recoverable ECDSA signature over the raw 32-byte hash. No EIP-191
    /// personal-message prefix is applied.
    pub fn sign_hash(&self, hash: H256) -> Result<Signature> {
        self.wallet
            .sign_hash(hash)
            .context("failed to sign hash with session key")
    }

    /// Local sanity check: does `signature` recover to this key's address
    /// for the given raw hash?
    #[allow(dead_code)]
    pub fn verify_signature(&self, hash: H256, signature: &Signature) -> bool {
        signature
            .recover(RecoveryMessage::Hash(hash))
            .map(|addr| addr == self.address())
            .unwrap_or(false)
    }

    fn signer(&self) -> &SigningKey {
        self.wallet.signer()
    }
}
