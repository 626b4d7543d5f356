mod config;
mod encoding;
mod gateway;
mod intent;
mod paymaster;
mod registry;
mod session;
mod types;
mod userop;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use config::{DeploymentConfig, Environment};
use ethers::types::{Address, U256};
use gateway::{EstimatePayload, GasDetails, GatewayClient, PollPolicy};
use paymaster::ValidityWindow;
use registry::RegistryClient;
use session::SessionKey;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use types::{
    Intent, IntentType, NftTransferIntent, RawTransactionIntent, TokenTransferIntent,
    UserOperation,
};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "okto-aa", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate (or restore) a session key and print its public material.
    Session(SessionArgs),

    /// Build, sign, and submit a TOKEN_TRANSFER intent.
    TokenTransfer(TokenTransferArgs),

    /// Build, sign, and submit an NFT_TRANSFER intent.
    NftTransfer(NftTransferArgs),

    /// Build, sign, and submit a RAW_TRANSACTION intent.
    RawTransaction(RawTransactionArgs),

    /// Fetch (or poll) the order status of a previously submitted intent.
    Status(StatusArgs),
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Deployment environment: sandbox, staging, or production.
    #[arg(long, default_value = "sandbox", env = "OKTO_AA_ENV")]
    environment: String,

    /// Gateway auth token (issued by the vendor's login flow).
    #[arg(long, env = "OKTO_AA_AUTH_TOKEN")]
    auth_token: String,

    /// Session private key used to sign the user operation.
    ///
    /// Recommended: set via env var OKTO_AA_SESSION_PRIVATE_KEY.
    #[arg(long, env = "OKTO_AA_SESSION_PRIVATE_KEY")]
    session_private_key: String,

    /// Client private key used to sign the paymaster data.
    #[arg(long, env = "OKTO_AA_CLIENT_PRIVATE_KEY")]
    client_private_key: String,

    /// Client smart wallet address (the sponsoring party).
    #[arg(long, env = "OKTO_AA_CLIENT_SWA")]
    client_swa: String,

    /// User smart wallet address (the operation sender).
    #[arg(long, env = "OKTO_AA_USER_SWA")]
    user_swa: String,

    /// Fee payer address. Defaults to the client smart wallet.
    #[arg(long, env = "OKTO_AA_FEE_PAYER")]
    fee_payer: Option<String>,

    /// Paymaster sponsorship validity, in minutes from now.
    #[arg(long, default_value_t = 10)]
    valid_minutes: u64,

    /// Ask the gateway to estimate gas before signing (otherwise fixed
    /// per-environment defaults are used).
    #[arg(long)]
    estimate: bool,

    /// Build and sign the operation but do not submit it.
    #[arg(long)]
    dry_run: bool,

    /// Do not poll for the order result after submitting.
    #[arg(long)]
    no_wait: bool,

    /// Max order-status polls before giving up.
    #[arg(long, default_value_t = 30)]
    max_attempts: u32,

    /// Interval between order-status polls, in milliseconds.
    #[arg(long, default_value_t = 3000)]
    poll_interval_ms: u64,
}

#[derive(Args, Debug)]
struct SessionArgs {
    /// Restore from an existing private key instead of generating one.
    #[arg(long, env = "OKTO_AA_SESSION_PRIVATE_KEY")]
    private_key: Option<String>,

    /// Where to write the generated session env file.
    #[arg(long, default_value = ".secrets")]
    secrets_dir: PathBuf,
}

#[derive(Args, Debug)]
struct TokenTransferArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Target chain, e.g. eip155:137.
    #[arg(long)]
    caip2_id: String,

    /// Recipient wallet address on the target chain.
    #[arg(long)]
    recipient: String,

    /// Token contract address; empty for the chain's native token.
    #[arg(long, default_value = "")]
    token: String,

    /// Amount in the token's base units.
    #[arg(long)]
    amount: String,
}

#[derive(Args, Debug)]
struct NftTransferArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Target chain, e.g. eip155:137.
    #[arg(long)]
    caip2_id: String,

    /// NFT token id within the collection.
    #[arg(long)]
    nft_id: String,

    /// Recipient wallet address on the target chain.
    #[arg(long)]
    recipient: String,

    /// Collection contract address.
    #[arg(long)]
    collection: String,

    /// Token standard, e.g. ERC721 or ERC1155.
    #[arg(long, default_value = "ERC721")]
    nft_type: String,

    /// Number of tokens to transfer (1 for ERC721).
    #[arg(long, default_value = "1")]
    amount: String,
}

#[derive(Args, Debug)]
struct RawTransactionArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Target chain, e.g. eip155:137.
    #[arg(long)]
    caip2_id: String,

    /// Transaction as a JSON object; repeat for a batch.
    #[arg(long = "transaction", required = true)]
    transactions: Vec<String>,
}

#[derive(Args, Debug)]
struct StatusArgs {
    /// Deployment environment: sandbox, staging, or production.
    #[arg(long, default_value = "sandbox", env = "OKTO_AA_ENV")]
    environment: String,

    /// Gateway auth token.
    #[arg(long, env = "OKTO_AA_AUTH_TOKEN")]
    auth_token: String,

    /// Intent (job) id returned by a previous submission.
    #[arg(long)]
    intent_id: String,

    /// Intent type, e.g. TOKEN_TRANSFER.
    #[arg(long)]
    intent_type: String,

    /// Poll until terminal instead of a single fetch.
    #[arg(long)]
    wait: bool,

    /// Max order-status polls before giving up.
    #[arg(long, default_value_t = 30)]
    max_attempts: u32,

    /// Interval between order-status polls, in milliseconds.
    #[arg(long, default_value_t = 3000)]
    poll_interval_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Command::Session(args) => cmd_session(args),
        Command::TokenTransfer(args) => {
            let intent = Intent::TokenTransfer(TokenTransferIntent {
                caip2_id: args.caip2_id,
                recipient: args.recipient,
                token: args.token,
                amount: parse_amount(&args.amount)?,
            });
            send_intent(args.common, intent).await
        }
        Command::NftTransfer(args) => {
            let intent = Intent::NftTransfer(NftTransferIntent {
                caip2_id: args.caip2_id,
                nft_id: args.nft_id,
                recipient: args.recipient,
                collection: args.collection,
                nft_type: args.nft_type,
                amount: parse_amount(&args.amount)?,
            });
            send_intent(args.common, intent).await
        }
        Command::RawTransaction(args) => {
            let mut transactions = Vec::with_capacity(args.transactions.len());
            for (i, raw) in args.transactions.iter().enumerate() {
                let tx = serde_json::from_str(raw)
                    .with_context(|| format!("--transaction #{} is not valid JSON", i + 1))?;
                transactions.push(tx);
            }
            let intent = Intent::RawTransaction(RawTransactionIntent {
                caip2_id: args.caip2_id,
                transactions,
            });
            send_intent(args.common, intent).await
        }
        Command::Status(args) => cmd_status(args).await,
    }
}

fn cmd_session(args: SessionArgs) -> Result<()> {
    let (key, generated) = match args.private_key.as_deref() {
        Some(pk) => (SessionKey::from_private_key(pk)?, false),
        None => (SessionKey::generate()?, true),
    };

    if generated {
        let path = args
            .secrets_dir
            .join(format!("session_{}.env", hex::encode(key.address().as_bytes())));
        write_session_env_file(&path, &key)?;
        // Never print the private key itself.
        eprintln!("generated new session key; saved to {}", path.display());
    }

    println!("sessionAddress:    {}", encoding::fmt_address(key.address()));
    println!("sessionPublicKey:  {}", key.public_key_hex());
    Ok(())
}

fn write_session_env_file(path: &PathBuf, key: &SessionKey) -> Result<()> {
    let contents = format!(
        "# Generated by okto-aa session\n# DO NOT COMMIT THIS FILE.\nexport OKTO_AA_SESSION_PRIVATE_KEY={}\nexport OKTO_AA_SESSION_ADDRESS={}\n",
        key.private_key_hex(),
        encoding::fmt_address(key.address()),
    );

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("failed to create secrets dir")?;
    }

    fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))?;

    // Best-effort restrictive permissions (unix).
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perm = fs::Permissions::from_mode(0o600);
        let _ = fs::set_permissions(path, perm);
    }

    Ok(())
}

async fn send_intent(common: CommonArgs, intent: Intent) -> Result<()> {
    let environment: Environment = common.environment.parse()?;
    let cfg = DeploymentConfig::for_environment(environment)?;

    let session = SessionKey::from_private_key(&common.session_private_key)
        .context("invalid --session-private-key")?;
    let client_key = SessionKey::from_private_key(&common.client_private_key)
        .context("invalid --client-private-key")?;

    let client_swa: Address = common
        .client_swa
        .parse()
        .map_err(|e| anyhow!("invalid --client-swa address: {e}"))?;
    let user_swa: Address = common
        .user_swa
        .parse()
        .map_err(|e| anyhow!("invalid --user-swa address: {e}"))?;
    let fee_payer: Address = match common.fee_payer.as_deref() {
        Some(s) => s
            .parse()
            .map_err(|e| anyhow!("invalid --fee-payer address: {e}"))?,
        None => client_swa,
    };

    let registry = RegistryClient::new(cfg.bff_base_url.clone(), common.auth_token.clone());
    let chains = registry
        .supported_chains()
        .await
        .context("chain registry lookup failed")?;

    let job_uuid = Uuid::new_v4();
    let nonce = encoding::nonce_from_uuid(job_uuid);
    tracing::info!(job_id = %job_uuid, intent_type = %intent.intent_type(), "building intent");

    let call_data = intent::build_call_data(
        &intent,
        nonce,
        cfg.job_manager,
        intent::JobParties {
            client_swa,
            user_swa,
            fee_payer,
        },
        &chains,
    )?;

    let window = ValidityWindow::until(Duration::from_secs(common.valid_minutes * 60));
    let paymaster_data = paymaster::build_paymaster_data(client_swa, &client_key, nonce, window)?;

    let mut op = UserOperation {
        sender: Some(user_swa),
        nonce: Some(nonce),
        call_data: Some(call_data),
        call_gas_limit: Some(cfg.gas.call_gas_limit),
        verification_gas_limit: Some(cfg.gas.verification_gas_limit),
        pre_verification_gas: Some(cfg.gas.pre_verification_gas),
        max_fee_per_gas: Some(cfg.gas.max_fee_per_gas),
        max_priority_fee_per_gas: Some(cfg.gas.max_priority_fee_per_gas),
        paymaster: Some(cfg.paymaster),
        paymaster_verification_gas_limit: Some(cfg.gas.paymaster_verification_gas_limit),
        paymaster_post_op_gas_limit: Some(cfg.gas.paymaster_post_op_gas_limit),
        paymaster_data: Some(paymaster_data.clone()),
        signature: None,
    };

    let gw = GatewayClient::new(
        cfg.gateway_rpc_url.clone(),
        cfg.bff_base_url.clone(),
        common.auth_token.clone(),
    );

    if common.estimate {
        let payload = EstimatePayload {
            r#type: intent.intent_type().as_str().to_string(),
            job_id: job_uuid.to_string(),
            fee_payer_address: common.fee_payer.clone(),
            paymaster_data: encoding::fmt_bytes(&paymaster_data),
            gas_details: GasDetails {
                max_fee_per_gas: encoding::fmt_u256(cfg.gas.max_fee_per_gas),
                max_priority_fee_per_gas: encoding::fmt_u256(cfg.gas.max_priority_fee_per_gas),
            },
            details: intent_details(&intent),
        };
        let estimate = gw.estimate(&payload).await.context("gas estimate failed")?;
        gateway::apply_gas_estimate(&mut op, &estimate)?;
        tracing::info!("applied gateway gas estimate");
    }

    let op_hash = userop::sign(&mut op, cfg.entry_point, cfg.chain_id, &session)?;

    println!(
        "UserOperation (signed):\n{}",
        serde_json::to_string_pretty(&encoding::user_op_to_json(&op)?)?
    );
    println!("\nuserOpHash: {}", encoding::fmt_h256(op_hash));

    if common.dry_run {
        println!("\n--dry-run set: not submitting user operation.");
        return Ok(());
    }

    let job_id = gw.execute(&op).await.context("gateway execute failed")?;
    println!("\njobId: {job_id}");

    if common.no_wait {
        println!("--no-wait set: not polling for order status.");
        return Ok(());
    }

    let policy = PollPolicy {
        interval: Duration::from_millis(common.poll_interval_ms),
        max_attempts: common.max_attempts,
    };
    let order = gw
        .wait_for_order(&job_id, intent.intent_type(), policy)
        .await?;

    println!("\norder status: {}", order.status);
    println!("{}", serde_json::to_string_pretty(&order.detail)?);
    Ok(())
}

async fn cmd_status(args: StatusArgs) -> Result<()> {
    let environment: Environment = args.environment.parse()?;
    let cfg = DeploymentConfig::for_environment(environment)?;
    let intent_type: IntentType = args.intent_type.parse()?;

    let gw = GatewayClient::new(
        cfg.gateway_rpc_url.clone(),
        cfg.bff_base_url.clone(),
        args.auth_token.clone(),
    );

    let order = if args.wait {
        let policy = PollPolicy {
            interval: Duration::from_millis(args.poll_interval_ms),
            max_attempts: args.max_attempts,
        };
        gw.wait_for_order(&args.intent_id, intent_type, policy)
            .await?
    } else {
        gw.order_status(&args.intent_id, intent_type).await?
    };

    println!("order status: {}", order.status);
    println!("{}", serde_json::to_string_pretty(&order.detail)?);
    Ok(())
}

/// Estimation `details` payload, mirroring the per-intent job parameters.
fn intent_details(intent: &Intent) -> serde_json::Value {
    match intent {
        Intent::TokenTransfer(i) => serde_json::json!({
            "caip2Id": i.caip2_id,
            "recipientWalletAddress": i.recipient,
            "tokenAddress": i.token,
            "amount": encoding::fmt_u256(i.amount),
        }),
        Intent::NftTransfer(i) => serde_json::json!({
            "caip2Id": i.caip2_id,
            "nftId": i.nft_id,
            "recipientWalletAddress": i.recipient,
            "collectionAddress": i.collection,
            "nftType": i.nft_type,
            "amount": encoding::fmt_u256(i.amount),
        }),
        Intent::RawTransaction(i) => serde_json::json!({
            "caip2Id": i.caip2_id,
            "transactions": i.transactions,
        }),
    }
}

fn parse_amount(s: &str) -> Result<U256> {
    U256::from_dec_str(s).with_context(|| format!("invalid amount (expected integer): {s}"))
}
