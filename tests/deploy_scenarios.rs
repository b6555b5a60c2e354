use alloy::{
    dyn_abi::DynSolValue,
    primitives::{Address, address},
};
use async_trait::async_trait;
use ouf_deploy::{
    DeploymentRequest, DeploymentResult, NetworkContext, TransactionLog, VerificationRequest,
    deploy::{
        AccountResolver, ContractDeployer, DeployScript, Environment, NoDelay, Reporter, Status,
        VerificationOutcome, Verifier,
    },
    error::{DeployError, DeploymentError, VerificationError},
};
use std::sync::Mutex;

const DEPLOYER: Address = address!("0x0000000000000000000000000000000000000abc");
const DEPLOYED: Address = address!("0x0000000000000000000000000000000000000def");

struct Deployer;

#[async_trait]
impl AccountResolver for Deployer {
    async fn resolve(&self, _name: &str) -> Result<Address, DeployError> {
        Ok(DEPLOYER)
    }
}

#[derive(Default)]
struct Chain {
    requests: Mutex<Vec<DeploymentRequest>>,
}

#[async_trait]
impl ContractDeployer for Chain {
    async fn deploy(
        &self,
        request: &DeploymentRequest,
    ) -> Result<DeploymentResult, DeploymentError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(DeploymentResult {
            address: DEPLOYED,
            transaction: TransactionLog::default(),
        })
    }
}

#[derive(Default)]
struct Explorer {
    reject: bool,
    requests: Mutex<Vec<VerificationRequest>>,
}

#[async_trait]
impl Verifier for Explorer {
    async fn verify(&self, request: &VerificationRequest) -> Result<(), VerificationError> {
        self.requests.lock().unwrap().push(request.clone());
        if self.reject {
            return Err(VerificationError::Rejected("Fail - Unable to verify".into()));
        }
        Ok(())
    }
}

#[derive(Default)]
struct Lines(Mutex<Vec<String>>);

impl Reporter for Lines {
    fn report(&self, status: &Status) {
        self.0.lock().unwrap().push(status.to_string());
    }
}

async fn run(network: &str, explorer: &Explorer) -> (VerificationOutcome, Vec<String>, Chain) {
    let chain = Chain::default();
    let lines = Lines::default();
    let env = Environment {
        accounts: &Deployer,
        deployer: &chain,
        verifier: explorer,
        delay: &NoDelay,
        reporter: &lines,
    };

    let deployment = DeployScript::default()
        .run(&NetworkContext::new(network), &env)
        .await
        .expect("deployment succeeds");
    let lines = lines.0.into_inner().unwrap();
    (deployment.verification, lines, chain)
}

#[tokio::test]
async fn scenario_a_mainnet_skips_verification() {
    let explorer = Explorer::default();
    let (outcome, lines, chain) = run("mainnet", &explorer).await;

    let requests = chain.requests.into_inner().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].constructor_args, vec![DynSolValue::Address(DEPLOYER)]);

    assert_eq!(outcome, VerificationOutcome::Skipped);
    assert!(explorer.requests.lock().unwrap().is_empty());
    assert!(lines.iter().any(|line| line.contains("skipping verification")));
}

#[tokio::test]
async fn scenario_b_arbitrum_sepolia_verifies() {
    let explorer = Explorer::default();
    let (outcome, lines, _) = run("arbitrum-sepolia", &explorer).await;

    assert_eq!(outcome, VerificationOutcome::Verified);
    assert_eq!(
        lines,
        vec![
            "Deploying OufGovernanceToken to arbitrum-sepolia...".to_string(),
            format!("Deployer: {DEPLOYER}"),
            format!("OufGovernanceToken deployed to: {DEPLOYED}"),
            "\nArbiscan verification in progress...".to_string(),
            "Arbiscan verification completed ✅".to_string(),
        ]
    );

    let requests = explorer.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].address, DEPLOYED);
    assert_eq!(requests[0].constructor_args, vec![DynSolValue::Address(DEPLOYER)]);
}

#[tokio::test]
async fn scenario_c_verification_error_is_logged_not_raised() {
    let explorer = Explorer {
        reject: true,
        ..Default::default()
    };
    let (outcome, lines, _) = run("arbitrum-sepolia", &explorer).await;

    assert_eq!(
        outcome,
        VerificationOutcome::Failed("explorer rejected verification: Fail - Unable to verify".into())
    );
    assert_eq!(
        lines.last().map(String::as_str),
        Some("Error during verification: explorer rejected verification: Fail - Unable to verify")
    );
    assert!(!lines.iter().any(|line| line.contains("completed")));
}
