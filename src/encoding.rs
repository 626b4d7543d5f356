use crate::types::UserOperation;
use anyhow::{anyhow, bail, Result};
use ethers::types::{Address, Bytes, H256, U256};
use uuid::Uuid;

pub fn fmt_address(addr: Address) -> String {
    format!("0x{}", hex::encode(addr.as_bytes()))
}

pub fn fmt_h256(h: H256) -> String {
    format!("0x{}", hex::encode(h.as_bytes()))
}

/// JSON-RPC "quantity" encoding.
pub fn fmt_u256(v: U256) -> String {
    if v.is_zero() {
        "0x0".to_string()
    } else {
        format!("0x{:x}", v)
    }
}

pub fn fmt_bytes(b: &Bytes) -> String {
    format!("0x{}", hex::encode(b.as_ref()))
}

/// Full-width 32-byte hex, as the gateway expects for nonces.
pub fn fmt_bytes32(v: U256) -> String {
    format!("0x{}", hex::encode(pad32(v)))
}

pub fn parse_u256_quantity(s: &str) -> Result<U256> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    if s.is_empty() {
        return Ok(U256::zero());
    }
    Ok(U256::from_str_radix(s, 16)?)
}

/// Left-pad to 16 bytes (big-endian). Values wider than 128 bits are an
/// error, never a truncation.
pub fn pad16(v: U256, field: &str) -> Result<[u8; 16]> {
    if v.bits() > 128 {
        bail!("{field} does not fit in 16 bytes: {v}");
    }
    let mut buf = [0u8; 32];
    v.to_big_endian(&mut buf);
    let mut out = [0u8; 16];
    out.copy_from_slice(&buf[16..32]);
    Ok(out)
}

/// Left-pad to 32 bytes (big-endian).
pub fn pad32(v: U256) -> [u8; 32] {
    let mut buf = [0u8; 32];
    v.to_big_endian(&mut buf);
    buf
}

/// Big-endian 6-byte encoding of a uint48 timestamp.
pub fn uint48_bytes(v: u64, field: &str) -> Result<[u8; 6]> {
    if v >> 48 != 0 {
        bail!("{field} does not fit in uint48: {v}");
    }
    let be = v.to_be_bytes();
    let mut out = [0u8; 6];
    out.copy_from_slice(&be[2..8]);
    Ok(out)
}

/// A UUID reinterpreted as a big-endian 128-bit integer (the job nonce).
pub fn nonce_from_uuid(id: Uuid) -> U256 {
    U256::from(id.as_u128())
}

/// Inverse of [`nonce_from_uuid`]; fails if the value does not fit in 128 bits.
#[allow(dead_code)]
pub fn uuid_from_nonce(nonce: U256) -> Result<Uuid> {
    if nonce.bits() > 128 {
        bail!("nonce does not fit in a 128-bit UUID: {nonce}");
    }
    Ok(Uuid::from_u128(nonce.as_u128()))
}

/// Gateway wire format for a (signed or unsigned) user operation.
pub fn user_op_to_json(op: &UserOperation) -> Result<serde_json::Value> {
    let sender = op
        .sender
        .ok_or_else(|| anyhow!("invalid user operation: missing sender"))?;
    let nonce = op
        .nonce
        .ok_or_else(|| anyhow!("invalid user operation: missing nonce"))?;

    let quantity = |v: Option<U256>| v.map(fmt_u256);
    let blob = |b: &Option<Bytes>| b.as_ref().map(fmt_bytes);

    Ok(serde_json::json!({
        "sender": fmt_address(sender),
        "nonce": fmt_bytes32(nonce),
        "callData": blob(&op.call_data),
        "callGasLimit": quantity(op.call_gas_limit),
        "verificationGasLimit": quantity(op.verification_gas_limit),
        "preVerificationGas": quantity(op.pre_verification_gas),
        "maxFeePerGas": quantity(op.max_fee_per_gas),
        "maxPriorityFeePerGas": quantity(op.max_priority_fee_per_gas),
        "paymaster": op.paymaster.map(fmt_address),
        "paymasterVerificationGasLimit": quantity(op.paymaster_verification_gas_limit),
        "paymasterPostOpGasLimit": quantity(op.paymaster_post_op_gas_limit),
        "paymasterData": blob(&op.paymaster_data),
        "signature": blob(&op.signature),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn pad16_left_pads_small_values() {
        let out = pad16(U256::from(0x30d40u64), "verificationGasLimit").unwrap();
        assert_eq!(hex::encode(out), "00000000000000000000000000030d40");
    }

    #[test]
    fn pad16_rejects_values_over_128_bits() {
        let too_wide = U256::from(1) << 128;
        let err = pad16(too_wide, "maxFeePerGas").unwrap_err();
        assert!(err.to_string().contains("maxFeePerGas"));
    }

    #[test]
    fn uint48_rejects_values_over_48_bits() {
        assert!(uint48_bytes(1 << 48, "validUntil").is_err());
        let out = uint48_bytes((1 << 48) - 1, "validUntil").unwrap();
        assert_eq!(out, [0xff; 6]);
    }

    #[test]
    fn nonce_round_trips_through_uuid() {
        let id = Uuid::from_str("b9e16100-446f-4050-84ed-a846d2bae528").unwrap();
        let nonce = nonce_from_uuid(id);
        assert_eq!(uuid_from_nonce(nonce).unwrap(), id);
        // MSB-first: the first UUID byte lands in byte 16 of the padded nonce.
        assert_eq!(pad32(nonce)[16], 0xb9);
        assert_eq!(pad32(nonce)[31], 0x28);
    }

    #[test]
    fn quantity_formatting() {
        assert_eq!(fmt_u256(U256::zero()), "0x0");
        assert_eq!(fmt_u256(U256::from(0x493e0u64)), "0x493e0");
        assert_eq!(
            parse_u256_quantity("0x493e0").unwrap(),
            U256::from(0x493e0u64)
        );
        assert_eq!(parse_u256_quantity("0x").unwrap(), U256::zero());
    }

    #[test]
    fn wire_json_uses_full_width_nonce() {
        let op = UserOperation {
            sender: Some(Address::zero()),
            nonce: Some(U256::from(1u64)),
            ..Default::default()
        };
        let json = user_op_to_json(&op).unwrap();
        assert_eq!(
            json["nonce"],
            "0x0000000000000000000000000000000000000000000000000000000000000001"
        );
    }

    #[test]
    fn wire_json_requires_sender() {
        let op = UserOperation::default();
        assert!(user_op_to_json(&op).is_err());
    }
}
