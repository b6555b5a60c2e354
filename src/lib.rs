use alloy::{
    dyn_abi::DynSolValue,
    primitives::{Address, B256},
};

pub mod artifacts;
pub mod chain;
pub mod config;
pub mod console;
pub mod deploy;
pub mod error;
pub mod explorer;

/// Contract deployed by this tool.
pub const CONTRACT_NAME: &str = "OufGovernanceToken";

/// The only network on which the deployed contract is verified.
pub const VERIFICATION_NETWORK: &str = "arbitrum-sepolia";

/// Named account that signs and pays for the deployment.
pub const DEPLOYER_ACCOUNT: &str = "deployer";

#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentRequest {
    pub contract_name: String,
    pub deployer: Address,
    pub constructor_args: Vec<DynSolValue>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentResult {
    pub address: Address,
    pub transaction: TransactionLog,
}

/// Inclusion details of the creation transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionLog {
    pub transaction_hash: B256,
    pub block_number: Option<u64>,
    pub gas_used: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkContext {
    pub name: String,
}

impl NetworkContext {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn is_verification_target(&self) -> bool {
        self.name == VERIFICATION_NETWORK
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VerificationRequest {
    pub contract_name: String,
    pub address: Address,
    pub constructor_args: Vec<DynSolValue>,
}

impl VerificationRequest {
    pub fn for_deployment(request: &DeploymentRequest, result: &DeploymentResult) -> Self {
        Self {
            contract_name: request.contract_name.clone(),
            address: result.address,
            constructor_args: request.constructor_args.clone(),
        }
    }
}
