use alloy::primitives::{Address, B256};
use std::path::PathBuf;
use thiserror::Error;

/// Failures that abort a deployment run.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("failed to resolve named account `{name}`: {reason}")]
    AccountResolution { name: String, reason: String },

    #[error(transparent)]
    Deployment(#[from] DeploymentError),
}

#[derive(Debug, Error)]
pub enum DeploymentError {
    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error("rpc request failed: {0}")]
    Rpc(#[from] alloy::transports::TransportError),

    #[error("failed waiting for transaction inclusion: {0}")]
    Inclusion(#[from] alloy::providers::PendingTransactionError),

    #[error("network is configured for chain id {expected}, but the rpc reports {actual}")]
    ChainIdMismatch { expected: u64, actual: u64 },

    #[error("creation transaction {0} reverted")]
    Reverted(B256),

    #[error("receipt of transaction {0} has no contract address")]
    MissingContractAddress(B256),
}

/// Failures of the explorer verification step. These never abort a run.
#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("explorer request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("unexpected explorer response: {0}")]
    InvalidResponse(String),

    #[error("contract {0} is already verified")]
    AlreadyVerified(Address),

    #[error("explorer rate limit reached: {0}")]
    RateLimited(String),

    #[error("explorer rejected verification: {0}")]
    Rejected(String),

    #[error("no explorer api key configured for network `{0}`")]
    MissingApiKey(String),

    #[error("verification still pending after {0} status checks")]
    StillPending(usize),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("no artifact named `{name}` under {}", .root.display())]
    NotFound { name: String, root: PathBuf },

    #[error("artifact name `{name}` is ambiguous: {}", format_paths(.paths))]
    Ambiguous { name: String, paths: Vec<PathBuf> },

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("artifact `{0}` has no creation bytecode (abstract contract or interface?)")]
    EmptyBytecode(String),

    #[error("constructor of `{contract}` takes {expected} arguments, got {actual}")]
    ConstructorArity {
        contract: String,
        expected: usize,
        actual: usize,
    },

    #[error("constructor argument {index} of `{contract}` does not match type {expected}")]
    ConstructorType {
        contract: String,
        index: usize,
        expected: String,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown network `{0}`")]
    UnknownNetwork(String),

    #[error("invalid private key for account `{name}`: {reason}")]
    InvalidPrivateKey { name: String, reason: String },

    #[error("account `{name}` is stored with address {stored}, but its key derives {derived}")]
    AddressMismatch {
        name: String,
        stored: Address,
        derived: Address,
    },
}

fn format_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
