//! JSON-RPC side of a deployment: named signing accounts and the contract
//! creation transaction.

use crate::{
    DeploymentRequest, DeploymentResult, TransactionLog,
    artifacts::ArtifactStore,
    deploy::{AccountResolver, ContractDeployer},
    error::{ConfigError, DeployError, DeploymentError},
};
use alloy::{
    network::{EthereumWallet, TransactionBuilder},
    primitives::Address,
    providers::{DynProvider, Provider, ProviderBuilder},
    rpc::types::TransactionRequest,
    signers::local::PrivateKeySigner,
};
use anyhow::Context as _;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Signing accounts addressable by name, e.g. `deployer`.
#[derive(Debug, Clone, Default)]
pub struct NamedAccounts {
    signers: BTreeMap<String, PrivateKeySigner>,
}

impl NamedAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, signer: PrivateKeySigner) {
        self.signers.insert(name.into(), signer);
    }

    pub fn insert_key(&mut self, name: &str, private_key: &str) -> Result<Address, ConfigError> {
        let signer = parse_private_key(name, private_key)?;
        let address = signer.address();
        self.insert(name, signer);
        Ok(address)
    }

    pub fn address(&self, name: &str) -> Option<Address> {
        self.signers.get(name).map(PrivateKeySigner::address)
    }

    pub fn is_empty(&self) -> bool {
        self.signers.is_empty()
    }

    /// Wallet holding every named signer; the first one is the default.
    pub fn wallet(&self) -> Option<EthereumWallet> {
        let mut signers = self.signers.values().cloned();
        let mut wallet = EthereumWallet::from(signers.next()?);
        for signer in signers {
            wallet.register_signer(signer);
        }
        Some(wallet)
    }
}

#[async_trait]
impl AccountResolver for NamedAccounts {
    async fn resolve(&self, name: &str) -> Result<Address, DeployError> {
        self.address(name)
            .ok_or_else(|| DeployError::AccountResolution {
                name: name.to_string(),
                reason: "no such named account; run `set account` first".to_string(),
            })
    }
}

pub fn parse_private_key(name: &str, private_key: &str) -> Result<PrivateKeySigner, ConfigError> {
    private_key
        .trim()
        .parse()
        .map_err(|err: alloy::signers::local::LocalSignerError| ConfigError::InvalidPrivateKey {
            name: name.to_string(),
            reason: err.to_string(),
        })
}

/// Sends creation transactions through a wallet-backed provider.
pub struct RpcDeployer {
    provider: DynProvider,
    artifacts: ArtifactStore,
}

impl RpcDeployer {
    pub fn new(provider: DynProvider, artifacts: ArtifactStore) -> Self {
        Self {
            provider,
            artifacts,
        }
    }

    pub fn connect(
        rpc_url: &str,
        wallet: EthereumWallet,
        artifacts: ArtifactStore,
    ) -> anyhow::Result<Self> {
        let url = rpc_url
            .parse::<reqwest::Url>()
            .with_context(|| format!("invalid rpc url `{rpc_url}`"))?;
        let provider = ProviderBuilder::new()
            .wallet(wallet)
            .connect_http(url)
            .erased();
        Ok(Self::new(provider, artifacts))
    }

    /// Fails when the endpoint serves a different chain than configured.
    pub async fn ensure_chain_id(&self, expected: u64) -> Result<(), DeploymentError> {
        let actual = self.provider.get_chain_id().await?;
        if actual != expected {
            return Err(DeploymentError::ChainIdMismatch { expected, actual });
        }
        Ok(())
    }
}

#[async_trait]
impl ContractDeployer for RpcDeployer {
    async fn deploy(
        &self,
        request: &DeploymentRequest,
    ) -> Result<DeploymentResult, DeploymentError> {
        let artifact = self.artifacts.load(&request.contract_name)?;
        let code = artifact.creation_code(&request.constructor_args)?;

        log::info!(
            "Deploying {} from {}",
            artifact.fully_qualified_name(),
            request.deployer
        );
        log::info!("  Creation code size: {} bytes", code.len());

        let tx = TransactionRequest::default()
            .with_from(request.deployer)
            .with_deploy_code(code);

        let pending = self.provider.send_transaction(tx).await?;
        let tx_hash = *pending.tx_hash();
        log::info!("Creation transaction sent: {tx_hash}, waiting for receipt ...");

        let receipt = pending.get_receipt().await?;
        if !receipt.status() {
            log::error!("Creation transaction {tx_hash} reverted");
            return Err(DeploymentError::Reverted(tx_hash));
        }

        let address = receipt
            .contract_address
            .ok_or(DeploymentError::MissingContractAddress(tx_hash))?;
        log::info!(
            "{} deployed at {address} (block {:?}, gas used {})",
            request.contract_name,
            receipt.block_number,
            receipt.gas_used
        );

        Ok(DeploymentResult {
            address,
            transaction: TransactionLog {
                transaction_hash: tx_hash,
                block_number: receipt.block_number,
                gas_used: receipt.gas_used,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::network::NetworkWallet;

    // Hardhat/anvil default account #0.
    const KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const ADDRESS: Address = alloy::primitives::address!("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266");

    #[tokio::test]
    async fn resolves_deployer_from_private_key() {
        let mut accounts = NamedAccounts::new();
        let address = accounts.insert_key("deployer", KEY).unwrap();

        assert_eq!(address, ADDRESS);
        assert_eq!(accounts.resolve("deployer").await.unwrap(), ADDRESS);
    }

    #[tokio::test]
    async fn unknown_account_is_a_resolution_error() {
        let accounts = NamedAccounts::new();
        let err = accounts.resolve("deployer").await.unwrap_err();
        assert!(matches!(err, DeployError::AccountResolution { name, .. } if name == "deployer"));
    }

    #[test]
    fn rejects_malformed_keys() {
        let mut accounts = NamedAccounts::new();
        assert!(matches!(
            accounts.insert_key("deployer", "0x1234"),
            Err(ConfigError::InvalidPrivateKey { .. })
        ));
        assert!(accounts.is_empty());
        assert!(accounts.wallet().is_none());
    }

    #[test]
    fn wallet_holds_every_named_signer() {
        let mut accounts = NamedAccounts::new();
        accounts.insert_key("deployer", KEY).unwrap();
        accounts.insert("other", PrivateKeySigner::random());

        let wallet = accounts.wallet().unwrap();
        assert!(NetworkWallet::<alloy::network::Ethereum>::has_signer_for(&wallet, &ADDRESS));
        assert!(NetworkWallet::<alloy::network::Ethereum>::has_signer_for(&wallet, &accounts.address("other").unwrap()));
    }
}
