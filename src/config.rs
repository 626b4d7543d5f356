use anyhow::{anyhow, Context, Result};
use ethers::types::{Address, U256};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Sandbox,
    Staging,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Sandbox => "sandbox",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sandbox" => Ok(Environment::Sandbox),
            "staging" => Ok(Environment::Staging),
            "production" => Ok(Environment::Production),
            other => Err(anyhow!(
                "unknown environment {other} (expected sandbox, staging, or production)"
            )),
        }
    }
}

/// Fixed gas defaults for operations built without a gateway estimate.
#[derive(Debug, Clone, Copy)]
pub struct GasDefaults {
    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    pub paymaster_verification_gas_limit: U256,
    pub paymaster_post_op_gas_limit: U256,
}

impl Default for GasDefaults {
    fn default() -> Self {
        Self {
            call_gas_limit: U256::from(0x493e0u64),
            verification_gas_limit: U256::from(0x30d40u64),
            pre_verification_gas: U256::from(0xc350u64),
            max_fee_per_gas: U256::from(0xba43b7400u64),
            max_priority_fee_per_gas: U256::from(0xba43b7400u64),
            paymaster_verification_gas_limit: U256::from(0x186a0u64),
            paymaster_post_op_gas_limit: U256::from(0x186a0u64),
        }
    }
}

/// Per-environment deployment constants. The contract addresses and chain id
/// identify a specific deployed system and must not be edited.
#[derive(Debug, Clone)]
pub struct DeploymentConfig {
    #[allow(dead_code)]
    pub environment: Environment,
    pub gateway_rpc_url: String,
    pub bff_base_url: String,
    pub entry_point: Address,
    pub paymaster: Address,
    pub job_manager: Address,
    pub chain_id: u64,
    pub gas: GasDefaults,
}

impl DeploymentConfig {
    pub fn for_environment(environment: Environment) -> Result<Self> {
        let (gateway_rpc_url, bff_base_url, entry_point, paymaster, job_manager, chain_id) =
            match environment {
                Environment::Sandbox => (
                    "https://sandbox-okto-gateway.oktostage.com/rpc",
                    "https://sandbox-api.okto.tech",
                    "0x8D29ECb381CA4874767Ef3744F6df37748B12715",
                    "0x0871051BfF8C7041c985dEddFA8eF63d23AD3Fa0",
                    "0x21E822446C32FA22b29392F29597ebdcFd8511f8",
                    8801u64,
                ),
                Environment::Staging => (
                    "https://okto-gateway.oktostage.com/rpc",
                    "https://3p-bff.oktostage.com",
                    "0x322eF240AD89d19a50Ca092CC40Fc3fF87491317",
                    "0xc2c3a3Aa33A24B81a4C5a264b4e894BE9db12Acb",
                    "0x0543aD80b41C5f5956d34503668CDb965deCB617",
                    24879u64,
                ),
                Environment::Production => (
                    "https://okto-gateway.okto.tech/rpc",
                    "https://apigw.okto.tech",
                    "0xA5E95a08229A816c9f3902E4a5a618C3928ad3bA",
                    "0xB0E2BD2efe99F5fC4CF484aa61A21A1D28f8E3Ca",
                    "0xED8Fe2543efFF64FC3567B03b612AA82C409579a",
                    8088u64,
                ),
            };

        Ok(Self {
            environment,
            gateway_rpc_url: gateway_rpc_url.to_string(),
            bff_base_url: bff_base_url.to_string(),
            entry_point: parse_addr(entry_point).context("invalid entry point address")?,
            paymaster: parse_addr(paymaster).context("invalid paymaster address")?,
            job_manager: parse_addr(job_manager).context("invalid job manager address")?,
            chain_id,
            gas: GasDefaults::default(),
        })
    }
}

fn parse_addr(s: &str) -> Result<Address> {
    s.parse::<Address>().map_err(|e| anyhow!("{e}"))
}
