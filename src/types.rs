use anyhow::{anyhow, Result};
use ethers::types::{Address, Bytes, U256};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// ERC-4337 user operation as assembled by the intent flow (EntryPoint v0.7
/// field split: paymaster address and gas limits are separate fields until
/// packing).
///
/// Every field except `signature` must be populated before packing; the
/// codec rejects partial operations. `paymaster` may be the zero address,
/// which packs to an empty `paymasterAndData`.
#[derive(Clone, Debug, Default)]
pub struct UserOperation {
    pub sender: Option<Address>,
    pub nonce: Option<U256>,
    pub call_data: Option<Bytes>,
    pub call_gas_limit: Option<U256>,
    pub verification_gas_limit: Option<U256>,
    pub pre_verification_gas: Option<U256>,
    pub max_fee_per_gas: Option<U256>,
    pub max_priority_fee_per_gas: Option<U256>,
    pub paymaster: Option<Address>,
    pub paymaster_verification_gas_limit: Option<U256>,
    pub paymaster_post_op_gas_limit: Option<U256>,
    pub paymaster_data: Option<Bytes>,
    pub signature: Option<Bytes>,
}

/// On-chain tuple layout consumed by the entry point. Derived from a fully
/// populated [`UserOperation`]; immutable once built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackedUserOperation {
    pub sender: Address,
    pub nonce: U256,
    /// Always empty: counterfactual deployment via factory is not supported.
    pub init_code: Bytes,
    pub call_data: Bytes,
    /// verificationGasLimit (16 bytes) | callGasLimit (16 bytes).
    pub account_gas_limits: [u8; 32],
    pub pre_verification_gas: U256,
    /// maxFeePerGas (16 bytes) | maxPriorityFeePerGas (16 bytes).
    pub gas_fees: [u8; 32],
    /// paymaster | verification gas | postOp gas | paymasterData, or empty.
    pub paymaster_and_data: Bytes,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntentType {
    TokenTransfer,
    NftTransfer,
    RawTransaction,
    NftMint,
    NftCreateCollection,
}

impl IntentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentType::TokenTransfer => "TOKEN_TRANSFER",
            IntentType::NftTransfer => "NFT_TRANSFER",
            IntentType::RawTransaction => "RAW_TRANSACTION",
            IntentType::NftMint => "NFT_MINT",
            IntentType::NftCreateCollection => "NFT_CREATE_COLLECTION",
        }
    }
}

impl fmt::Display for IntentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntentType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "TOKEN_TRANSFER" => Ok(IntentType::TokenTransfer),
            "NFT_TRANSFER" => Ok(IntentType::NftTransfer),
            "RAW_TRANSACTION" => Ok(IntentType::RawTransaction),
            "NFT_MINT" => Ok(IntentType::NftMint),
            "NFT_CREATE_COLLECTION" => Ok(IntentType::NftCreateCollection),
            other => Err(anyhow!("unknown intent type: {other}")),
        }
    }
}

/// Move `amount` of an ERC-20 (or native, when `token` is empty) to
/// `recipient` on the chain named by `caip2_id`.
#[derive(Clone, Debug)]
pub struct TokenTransferIntent {
    pub caip2_id: String,
    pub recipient: String,
    pub token: String,
    pub amount: U256,
}

#[derive(Clone, Debug)]
pub struct NftTransferIntent {
    pub caip2_id: String,
    pub nft_id: String,
    pub recipient: String,
    pub collection: String,
    pub nft_type: String,
    pub amount: U256,
}

/// One or more pre-built transactions, passed through to the target chain
/// as opaque JSON.
#[derive(Clone, Debug)]
pub struct RawTransactionIntent {
    pub caip2_id: String,
    pub transactions: Vec<Value>,
}

#[derive(Clone, Debug)]
pub enum Intent {
    TokenTransfer(TokenTransferIntent),
    NftTransfer(NftTransferIntent),
    RawTransaction(RawTransactionIntent),
}

impl Intent {
    pub fn caip2_id(&self) -> &str {
        match self {
            Intent::TokenTransfer(i) => &i.caip2_id,
            Intent::NftTransfer(i) => &i.caip2_id,
            Intent::RawTransaction(i) => &i.caip2_id,
        }
    }

    pub fn intent_type(&self) -> IntentType {
        match self {
            Intent::TokenTransfer(_) => IntentType::TokenTransfer,
            Intent::NftTransfer(_) => IntentType::NftTransfer,
            Intent::RawTransaction(_) => IntentType::RawTransaction,
        }
    }
}
