use crate::encoding::{pad16, pad32};
use crate::session::SessionKey;
use crate::types::{PackedUserOperation, UserOperation};
use anyhow::{anyhow, Context, Result};
use ethers::abi::{encode, Token};
use ethers::types::{Address, Bytes, H256, U256};
use ethers::utils::keccak256;

/// Packs a fully populated [`UserOperation`] into its on-chain tuple form.
///
/// Every field except `signature` must be present. Gas and fee values wider
/// than 16 bytes are rejected rather than truncated.
pub fn pack(op: &UserOperation) -> Result<PackedUserOperation> {
    let sender = require(op.sender, "sender")?;
    let nonce = require(op.nonce, "nonce")?;
    let call_data = require_bytes(&op.call_data, "callData")?;
    let call_gas_limit = require(op.call_gas_limit, "callGasLimit")?;
    let verification_gas_limit = require(op.verification_gas_limit, "verificationGasLimit")?;
    let pre_verification_gas = require(op.pre_verification_gas, "preVerificationGas")?;
    let max_fee_per_gas = require(op.max_fee_per_gas, "maxFeePerGas")?;
    let max_priority_fee_per_gas = require(op.max_priority_fee_per_gas, "maxPriorityFeePerGas")?;
    // The paymaster must be defined; the zero address is the "no paymaster"
    // sentinel and packs to an empty paymasterAndData.
    let paymaster = require(op.paymaster, "paymaster")?;
    let paymaster_verification_gas_limit = require(
        op.paymaster_verification_gas_limit,
        "paymasterVerificationGasLimit",
    )?;
    let paymaster_post_op_gas_limit =
        require(op.paymaster_post_op_gas_limit, "paymasterPostOpGasLimit")?;
    let paymaster_data = require_bytes(&op.paymaster_data, "paymasterData")?;

    let mut account_gas_limits = [0u8; 32];
    account_gas_limits[..16]
        .copy_from_slice(&pad16(verification_gas_limit, "verificationGasLimit")?);
    account_gas_limits[16..].copy_from_slice(&pad16(call_gas_limit, "callGasLimit")?);

    let mut gas_fees = [0u8; 32];
    gas_fees[..16].copy_from_slice(&pad16(max_fee_per_gas, "maxFeePerGas")?);
    gas_fees[16..].copy_from_slice(&pad16(max_priority_fee_per_gas, "maxPriorityFeePerGas")?);

    let paymaster_and_data = pack_paymaster_and_data(
        paymaster,
        paymaster_verification_gas_limit,
        paymaster_post_op_gas_limit,
        &paymaster_data,
    )?;

    Ok(PackedUserOperation {
        sender,
        nonce,
        init_code: Bytes::default(),
        call_data,
        account_gas_limits,
        pre_verification_gas,
        gas_fees,
        paymaster_and_data,
    })
}

/// paymaster (20) | paymasterVerificationGasLimit (16) |
/// paymasterPostOpGasLimit (16) | paymasterData. Empty for the zero address.
fn pack_paymaster_and_data(
    paymaster: Address,
    verification_gas_limit: U256,
    post_op_gas_limit: U256,
    data: &Bytes,
) -> Result<Bytes> {
    if paymaster == Address::zero() {
        return Ok(Bytes::default());
    }
    let mut out = Vec::with_capacity(20 + 16 + 16 + data.len());
    out.extend_from_slice(paymaster.as_bytes());
    out.extend_from_slice(&pad16(verification_gas_limit, "paymasterVerificationGasLimit")?);
    out.extend_from_slice(&pad16(post_op_gas_limit, "paymasterPostOpGasLimit")?);
    out.extend_from_slice(data.as_ref());
    Ok(Bytes::from(out))
}

/// Canonical signing hash of a packed operation.
///
/// Two-stage keccak256: the inner digest commits to the operation fields,
/// the outer digest domain-separates by entry point and chain id so a
/// signature cannot be replayed across environments. Must match the
/// on-chain verifier bit for bit.
pub fn hash(packed: &PackedUserOperation, entry_point: Address, chain_id: u64) -> H256 {
    let inner = keccak256(encode(&[
        Token::Address(packed.sender),
        Token::FixedBytes(pad32(packed.nonce).to_vec()),
        Token::FixedBytes(keccak256(&packed.init_code).to_vec()),
        Token::FixedBytes(keccak256(&packed.call_data).to_vec()),
        Token::FixedBytes(packed.account_gas_limits.to_vec()),
        Token::Uint(packed.pre_verification_gas),
        Token::FixedBytes(packed.gas_fees.to_vec()),
        Token::FixedBytes(keccak256(&packed.paymaster_and_data).to_vec()),
    ]));

    H256::from(keccak256(encode(&[
        Token::FixedBytes(inner.to_vec()),
        Token::Address(entry_point),
        Token::Uint(U256::from(chain_id)),
    ])))
}

/// Packs, hashes, and signs `op` with the session key, attaching the
/// 65-byte recoverable signature. Returns the signed hash.
pub fn sign(
    op: &mut UserOperation,
    entry_point: Address,
    chain_id: u64,
    key: &SessionKey,
) -> Result<H256> {
    let packed = pack(op).context("cannot sign an incomplete user operation")?;
    let op_hash = hash(&packed, entry_point, chain_id);
    let signature = key.sign_hash(op_hash)?;
    op.signature = Some(Bytes::from(signature.to_vec()));
    Ok(op_hash)
}

fn require<T: Copy>(field: Option<T>, name: &str) -> Result<T> {
    field.ok_or_else(|| anyhow!("invalid user operation: missing {name}"))
}

fn require_bytes(field: &Option<Bytes>, name: &str) -> Result<Bytes> {
    field
        .clone()
        .ok_or_else(|| anyhow!("invalid user operation: missing {name}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use uuid::Uuid;

    const SESSION_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn sandbox_op() -> UserOperation {
        let job_uuid = Uuid::from_str("b9e16100-446f-4050-84ed-a846d2bae528").unwrap();
        UserOperation {
            sender: Some(
                "0x61795557B50DC229199cE51c46935d7eC560c52F"
                    .parse()
                    .unwrap(),
            ),
            nonce: Some(crate::encoding::nonce_from_uuid(job_uuid)),
            call_data: Some(Bytes::from(vec![0xde, 0xad, 0xbe, 0xef])),
            call_gas_limit: Some(U256::from(0x493e0u64)),
            verification_gas_limit: Some(U256::from(0x30d40u64)),
            pre_verification_gas: Some(U256::from(0xc350u64)),
            max_fee_per_gas: Some(U256::from(0xba43b7400u64)),
            max_priority_fee_per_gas: Some(U256::from(0xba43b7400u64)),
            paymaster: Some(
                "0x0871051BfF8C7041c985dEddFA8eF63d23AD3Fa0"
                    .parse()
                    .unwrap(),
            ),
            paymaster_verification_gas_limit: Some(U256::from(0x186a0u64)),
            paymaster_post_op_gas_limit: Some(U256::from(0x186a0u64)),
            paymaster_data: Some(Bytes::from(vec![0x01, 0x02])),
            signature: None,
        }
    }

    fn sandbox_entry_point() -> Address {
        "0x8D29ECb381CA4874767Ef3744F6df37748B12715"
            .parse()
            .unwrap()
    }

    #[test]
    fn pack_rejects_missing_fields() {
        let mut op = sandbox_op();
        op.call_data = None;
        let err = pack(&op).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid user operation: missing callData"
        );

        let mut op = sandbox_op();
        op.paymaster = None;
        assert!(pack(&op).is_err());
    }

    #[test]
    fn account_gas_limits_concatenate_left_padded_halves() {
        let packed = pack(&sandbox_op()).unwrap();
        assert_eq!(
            hex::encode(packed.account_gas_limits),
            "00000000000000000000000000030d40000000000000000000000000000493e0"
        );
        assert_eq!(
            hex::encode(packed.gas_fees),
            "00000000000000000000000ba43b740000000000000000000000000ba43b7400"
        );
    }

    #[test]
    fn pack_rejects_oversized_gas_values() {
        let mut op = sandbox_op();
        op.max_fee_per_gas = Some(U256::from(1) << 130);
        assert!(pack(&op).is_err());
    }

    #[test]
    fn paymaster_and_data_layout() {
        let packed = pack(&sandbox_op()).unwrap();
        let blob = packed.paymaster_and_data.as_ref();
        assert_eq!(blob.len(), 20 + 16 + 16 + 2);
        assert_eq!(
            hex::encode(&blob[..20]),
            "0871051bff8c7041c985deddfa8ef63d23ad3fa0"
        );
        assert_eq!(&blob[52..], &[0x01, 0x02]);
    }

    #[test]
    fn zero_paymaster_packs_to_empty_blob_and_init_code_is_empty() {
        let mut op = sandbox_op();
        op.paymaster = Some(Address::zero());
        let packed = pack(&op).unwrap();
        assert!(packed.paymaster_and_data.is_empty());
        assert!(packed.init_code.is_empty());
    }

    #[test]
    fn hash_is_deterministic_and_domain_separated() {
        let packed = pack(&sandbox_op()).unwrap();
        let entry_point = sandbox_entry_point();
        let h1 = hash(&packed, entry_point, 8801);
        let h2 = hash(&packed, entry_point, 8801);
        assert_eq!(h1, h2);
        // Different chain or entry point must change the hash.
        assert_ne!(h1, hash(&packed, entry_point, 137));
        assert_ne!(h1, hash(&packed, Address::zero(), 8801));
    }

    #[test]
    fn hash_tracks_exactly_the_committed_fields() {
        let entry_point = sandbox_entry_point();
        let base = hash(&pack(&sandbox_op()).unwrap(), entry_point, 8801);

        let mut op = sandbox_op();
        op.call_data = Some(Bytes::from(vec![0x00]));
        assert_ne!(base, hash(&pack(&op).unwrap(), entry_point, 8801));

        let mut op = sandbox_op();
        op.nonce = Some(U256::from(7u64));
        assert_ne!(base, hash(&pack(&op).unwrap(), entry_point, 8801));

        let mut op = sandbox_op();
        op.pre_verification_gas = Some(U256::from(1u64));
        assert_ne!(base, hash(&pack(&op).unwrap(), entry_point, 8801));

        // The signature is not committed: attaching one leaves the hash as is.
        let mut op = sandbox_op();
        op.signature = Some(Bytes::from(vec![0u8; 65]));
        assert_eq!(base, hash(&pack(&op).unwrap(), entry_point, 8801));
    }

    #[test]
    fn sign_attaches_recoverable_signature() {
        let key = SessionKey::from_private_key(SESSION_KEY).unwrap();
        let mut op = sandbox_op();
        let op_hash = sign(&mut op, sandbox_entry_point(), 8801, &key).unwrap();

        let sig_bytes = op.signature.clone().unwrap();
        assert_eq!(sig_bytes.len(), 65);

        let sig = ethers::types::Signature::try_from(sig_bytes.as_ref()).unwrap();
        assert!(key.verify_signature(op_hash, &sig));

        // Signing is deterministic (RFC 6979): same op, same signature.
        let mut op2 = sandbox_op();
        sign(&mut op2, sandbox_entry_point(), 8801, &key).unwrap();
        assert_eq!(op.signature, op2.signature);
    }

    #[test]
    fn sign_fails_fast_on_incomplete_operations() {
        let key = SessionKey::from_private_key(SESSION_KEY).unwrap();
        let mut op = UserOperation::default();
        assert!(sign(&mut op, sandbox_entry_point(), 8801, &key).is_err());
        assert!(op.signature.is_none());
    }
}
