use crate::registry::{resolve_policy, ChainPolicy, ChainRecord};
use crate::types::{Intent, IntentType};
use anyhow::{Context, Result};
use ethers::abi::{encode, AbiParser, Function, Token};
use ethers::types::{Address, Bytes, U256};

/// Selector of the account's `executeUserOp` dispatch, the first element of
/// the outer call-data tuple.
pub const EXECUTE_USEROP_SELECTOR: [u8; 4] = [0x8d, 0xd7, 0x71, 0x2f];

/// Fixed job-manager entry point every intent is routed through.
const INITIATE_JOB: &str = "function initiateJob(uint256 jobId, address clientId, address userId, address feePayer, bytes policyInfo, bytes gsnData, bytes jobParameters, string intentType)";

/// Accounts a job is attributed to: the vendor client, the end user's smart
/// wallet, and whoever pays the fee (usually the client again).
#[derive(Clone, Copy, Debug)]
pub struct JobParties {
    pub client_swa: Address,
    pub user_swa: Address,
    pub fee_payer: Address,
}

/// Builds the `callData` field of a user operation for one intent.
///
/// The CAIP-2 id is resolved against the registry first; an unsupported
/// chain aborts before any ABI encoding is done. The result is the
/// ABI-encoded `(bytes4, address, uint256, bytes)` tuple wrapping the
/// `initiateJob` invocation.
pub fn build_call_data(
    intent: &Intent,
    job_id: U256,
    job_manager: Address,
    parties: JobParties,
    chains: &[ChainRecord],
) -> Result<Bytes> {
    let policy = resolve_policy(chains, intent.caip2_id())?;

    let inner = initiate_job_fn()?
        .encode_input(&[
            Token::Uint(job_id),
            Token::Address(parties.client_swa),
            Token::Address(parties.user_swa),
            Token::Address(parties.fee_payer),
            Token::Bytes(encode_policy_info(policy)),
            Token::Bytes(encode_gsn_data()),
            Token::Bytes(encode_job_parameters(intent)?),
            Token::String(intent.intent_type().as_str().to_string()),
        ])
        .context("failed to encode initiateJob call")?;

    Ok(Bytes::from(encode(&[
        Token::FixedBytes(EXECUTE_USEROP_SELECTOR.to_vec()),
        Token::Address(job_manager),
        Token::Uint(U256::zero()),
        Token::Bytes(inner),
    ])))
}

fn initiate_job_fn() -> Result<Function> {
    let abi = AbiParser::default()
        .parse(&[INITIATE_JOB])
        .context("failed to parse initiateJob ABI")?;
    Ok(abi.function("initiateJob")?.clone())
}

/// `(bool gsnEnabled, bool sponsorshipEnabled)` from the registry lookup.
fn encode_policy_info(policy: ChainPolicy) -> Vec<u8> {
    encode(&[Token::Tuple(vec![
        Token::Bool(policy.gsn_enabled),
        Token::Bool(policy.sponsorship_enabled),
    ])])
}

/// `(bool isRequired, string[] requiredNetworks, bytes[] tokens)` — the GSN
/// relay structure is part of the wire format but never exercised.
fn encode_gsn_data() -> Vec<u8> {
    encode(&[Token::Tuple(vec![
        Token::Bool(false),
        Token::Array(vec![]),
        Token::Array(vec![]),
    ])])
}

/// Intent-specific `jobParameters` tuple.
fn encode_job_parameters(intent: &Intent) -> Result<Vec<u8>> {
    let tuple = match intent {
        Intent::TokenTransfer(i) => vec![
            Token::String(i.caip2_id.clone()),
            Token::String(i.recipient.clone()),
            Token::String(i.token.clone()),
            Token::Uint(i.amount),
        ],
        Intent::NftTransfer(i) => vec![
            Token::String(i.caip2_id.clone()),
            Token::String(i.nft_id.clone()),
            Token::String(i.recipient.clone()),
            Token::String(i.collection.clone()),
            Token::String(i.nft_type.clone()),
            Token::Uint(i.amount),
        ],
        Intent::RawTransaction(i) => {
            let mut txs = Vec::with_capacity(i.transactions.len());
            for tx in &i.transactions {
                let raw = serde_json::to_vec(tx).context("failed to serialize transaction")?;
                txs.push(Token::Bytes(raw));
            }
            vec![Token::String(i.caip2_id.clone()), Token::Array(txs)]
        }
    };
    Ok(encode(&[Token::Tuple(tuple)]))
}
