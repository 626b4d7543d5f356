use crate::encoding::{pad32, uint48_bytes};
use crate::session::SessionKey;
use anyhow::{anyhow, bail, Context, Result};
use ethers::abi::{decode, encode, ParamType, Token};
use ethers::types::{Address, Bytes, H256, U256};
use ethers::utils::keccak256;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A uint48 unix timestamp, normalizable from seconds, a wall-clock time,
/// or an offset from now.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Timestamp(pub u64);

impl From<u64> for Timestamp {
    fn from(secs: u64) -> Self {
        Timestamp(secs)
    }
}

impl From<SystemTime> for Timestamp {
    fn from(t: SystemTime) -> Self {
        // Pre-epoch times clamp to zero.
        Timestamp(
            t.duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
        )
    }
}

impl From<Duration> for Timestamp {
    fn from(from_now: Duration) -> Self {
        Timestamp::from(SystemTime::now() + from_now)
    }
}

/// Sponsorship validity window. `valid_after` defaults to zero (valid
/// immediately).
#[derive(Clone, Copy, Debug, Default)]
pub struct ValidityWindow {
    pub valid_until: Timestamp,
    pub valid_after: Timestamp,
}

impl ValidityWindow {
    pub fn until(valid_until: impl Into<Timestamp>) -> Self {
        Self {
            valid_until: valid_until.into(),
            valid_after: Timestamp(0),
        }
    }

    #[allow(dead_code)]
    pub fn new(valid_until: impl Into<Timestamp>, valid_after: impl Into<Timestamp>) -> Self {
        Self {
            valid_until: valid_until.into(),
            valid_after: valid_after.into(),
        }
    }
}

/// Digest the paymaster contract verifies: keccak256 of the packed
/// `(bytes32 nonce, address, uint48 validUntil, uint48 validAfter)` blob.
pub fn paymaster_hash(
    client_swa: Address,
    nonce: U256,
    window: ValidityWindow,
) -> Result<H256> {
    let mut blob = Vec::with_capacity(32 + 20 + 6 + 6);
    blob.extend_from_slice(&pad32(nonce));
    blob.extend_from_slice(client_swa.as_bytes());
    blob.extend_from_slice(&uint48_bytes(window.valid_until.0, "validUntil")?);
    blob.extend_from_slice(&uint48_bytes(window.valid_after.0, "validAfter")?);
    Ok(H256::from(keccak256(blob)))
}

/// Builds the signed `paymasterData` field: the client address and validity
/// window, plus the client key's raw-hash signature over [`paymaster_hash`],
/// ABI-encoded as `(address, uint48, uint48, bytes)`.
pub fn build_paymaster_data(
    client_swa: Address,
    client_key: &SessionKey,
    nonce: U256,
    window: ValidityWindow,
) -> Result<Bytes> {
    let digest = paymaster_hash(client_swa, nonce, window)?;
    let signature = client_key
        .sign_hash(digest)
        .context("failed to sign paymaster data")?;

    Ok(Bytes::from(encode(&[
        Token::Address(client_swa),
        Token::Uint(U256::from(window.valid_until.0)),
        Token::Uint(U256::from(window.valid_after.0)),
        Token::Bytes(signature.to_vec()),
    ])))
}

/// Decodes a `paymasterData` blob back into its parts.
#[allow(dead_code)]
pub fn decode_paymaster_data(data: &Bytes) -> Result<(Address, u64, u64, Bytes)> {
    let tokens = decode(
        &[
            ParamType::Address,
            ParamType::Uint(48),
            ParamType::Uint(48),
            ParamType::Bytes,
        ],
        data.as_ref(),
    )
    .context("malformed paymasterData")?;

    match <[Token; 4]>::try_from(tokens) {
        Ok([Token::Address(addr), Token::Uint(until), Token::Uint(after), Token::Bytes(sig)]) => {
            if until.bits() > 48 || after.bits() > 48 {
                bail!("paymasterData timestamps exceed uint48");
            }
            Ok((addr, until.as_u64(), after.as_u64(), Bytes::from(sig)))
        }
        _ => Err(anyhow!("unexpected paymasterData token shape")),
    }
}
