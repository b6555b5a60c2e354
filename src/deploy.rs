//! The deploy script: deploy `OufGovernanceToken`, then verify it on Arbiscan
//! when running against `arbitrum-sepolia`.

use crate::{
    CONTRACT_NAME, DEPLOYER_ACCOUNT, DeploymentRequest, DeploymentResult, NetworkContext,
    VERIFICATION_NETWORK, VerificationRequest,
    error::{DeployError, DeploymentError, VerificationError},
};
use alloy::{dyn_abi::DynSolValue, primitives::Address};
use async_trait::async_trait;
use std::{fmt, time::Duration};

/// Pause between inclusion of the creation transaction and the verification
/// request, so the explorer has indexed the new contract.
pub const VERIFICATION_DELAY: Duration = Duration::from_secs(30);

#[async_trait]
pub trait AccountResolver: Send + Sync {
    async fn resolve(&self, name: &str) -> Result<Address, DeployError>;
}

#[async_trait]
pub trait ContractDeployer: Send + Sync {
    async fn deploy(
        &self,
        request: &DeploymentRequest,
    ) -> Result<DeploymentResult, DeploymentError>;
}

#[async_trait]
pub trait Verifier: Send + Sync {
    async fn verify(&self, request: &VerificationRequest) -> Result<(), VerificationError>;
}

/// Wait strategy used for the pre-verification delay.
#[async_trait]
pub trait Delay: Send + Sync {
    async fn wait(&self, duration: Duration);
}

/// Sink for the human-readable status lines of a run.
pub trait Reporter: Send + Sync {
    fn report(&self, status: &Status);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioDelay;

#[async_trait]
impl Delay for TokioDelay {
    async fn wait(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoDelay;

#[async_trait]
impl Delay for NoDelay {
    async fn wait(&self, _duration: Duration) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Deploying { contract: String, network: String },
    Deployer(Address),
    Deployed { contract: String, address: Address },
    VerificationStarted,
    VerificationCompleted,
    VerificationFailed(String),
    VerificationSkipped { network: String },
}

impl Status {
    pub fn is_error(&self) -> bool {
        matches!(self, Status::VerificationFailed(_))
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Deploying { contract, network } => {
                write!(f, "Deploying {contract} to {network}...")
            }
            Status::Deployer(address) => write!(f, "Deployer: {address}"),
            Status::Deployed { contract, address } => write!(f, "{contract} deployed to: {address}"),
            Status::VerificationStarted => write!(f, "\nArbiscan verification in progress..."),
            Status::VerificationCompleted => write!(f, "Arbiscan verification completed ✅"),
            Status::VerificationFailed(reason) => write!(f, "Error during verification: {reason}"),
            Status::VerificationSkipped { network } => {
                write!(f, "Not on {VERIFICATION_NETWORK} ({network}) - skipping verification")
            }
        }
    }
}

/// Collaborators a deploy run is executed against.
pub struct Environment<'a> {
    pub accounts: &'a dyn AccountResolver,
    pub deployer: &'a dyn ContractDeployer,
    pub verifier: &'a dyn Verifier,
    pub delay: &'a dyn Delay,
    pub reporter: &'a dyn Reporter,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    Verified,
    Failed(String),
    Skipped,
}

impl fmt::Display for VerificationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerificationOutcome::Verified => write!(f, "verified"),
            VerificationOutcome::Failed(reason) => write!(f, "failed: {reason}"),
            VerificationOutcome::Skipped => write!(f, "skipped"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Deployment {
    pub request: DeploymentRequest,
    pub result: DeploymentResult,
    pub verification: VerificationOutcome,
}

/// A deploy unit: which contract, under which tags, and how long to wait
/// before asking the explorer to verify it.
#[derive(Debug, Clone)]
pub struct DeployScript {
    pub contract_name: String,
    pub tags: Vec<String>,
    pub verification_delay: Duration,
}

impl Default for DeployScript {
    fn default() -> Self {
        Self {
            contract_name: CONTRACT_NAME.to_string(),
            tags: vec![CONTRACT_NAME.to_string()],
            verification_delay: VERIFICATION_DELAY,
        }
    }
}

impl DeployScript {
    /// An empty filter selects every script.
    pub fn matches_tags(&self, filter: &[String]) -> bool {
        filter.is_empty() || filter.iter().any(|tag| self.tags.contains(tag))
    }

    pub async fn run(
        &self,
        network: &NetworkContext,
        env: &Environment<'_>,
    ) -> Result<Deployment, DeployError> {
        deploy_and_verify(self, network, env).await
    }
}

pub async fn deploy_and_verify(
    script: &DeployScript,
    network: &NetworkContext,
    env: &Environment<'_>,
) -> Result<Deployment, DeployError> {
    log::info!(
        "Running deploy script for {} on network `{}`",
        script.contract_name,
        network.name
    );

    let deployer = env.accounts.resolve(DEPLOYER_ACCOUNT).await?;

    env.reporter.report(&Status::Deploying {
        contract: script.contract_name.clone(),
        network: network.name.clone(),
    });
    env.reporter.report(&Status::Deployer(deployer));

    let request = DeploymentRequest {
        contract_name: script.contract_name.clone(),
        deployer,
        constructor_args: vec![DynSolValue::Address(deployer)],
    };
    let result = env.deployer.deploy(&request).await?;
    log::debug!("Creation transaction: {:?}", result.transaction);

    env.reporter.report(&Status::Deployed {
        contract: script.contract_name.clone(),
        address: result.address,
    });

    let verification = if network.is_verification_target() {
        verify(script, &request, &result, env).await
    } else {
        env.reporter.report(&Status::VerificationSkipped {
            network: network.name.clone(),
        });
        VerificationOutcome::Skipped
    };

    Ok(Deployment {
        request,
        result,
        verification,
    })
}

async fn verify(
    script: &DeployScript,
    request: &DeploymentRequest,
    result: &DeploymentResult,
    env: &Environment<'_>,
) -> VerificationOutcome {
    env.reporter.report(&Status::VerificationStarted);

    log::debug!(
        "Waiting {:?} before verifying {}",
        script.verification_delay,
        result.address
    );
    env.delay.wait(script.verification_delay).await;

    let verification = VerificationRequest::for_deployment(request, result);
    match env.verifier.verify(&verification).await {
        Ok(()) => {
            env.reporter.report(&Status::VerificationCompleted);
            VerificationOutcome::Verified
        }
        Err(err) => {
            log::warn!("Verification of {} failed: {err:?}", result.address);
            let reason = err.to_string();
            env.reporter.report(&Status::VerificationFailed(reason.clone()));
            VerificationOutcome::Failed(reason)
        }
    }
}
