use crate::{NetworkContext, VERIFICATION_NETWORK, error::ConfigError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const ARBITRUM_SEPOLIA_RPC: &str = "https://sepolia-rollup.arbitrum.io/rpc";
pub const ARBITRUM_SEPOLIA_CHAIN_ID: u64 = 421_614;
/// Unified Etherscan-family API; the chain is selected with `chainid`.
pub const ETHERSCAN_V2_API: &str = "https://api.etherscan.io/v2/api";

pub const LOCALHOST_RPC: &str = "http://127.0.0.1:8545";
pub const LOCALHOST_CHAIN_ID: u64 = 31_337;

/// Fallback source for the explorer API key.
pub const API_KEY_ENV: &str = "ETHERSCAN_API_KEY";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub rpc_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explorer: Option<ExplorerConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplorerConfig {
    pub api_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

pub fn builtin_networks() -> BTreeMap<String, NetworkConfig> {
    BTreeMap::from([
        (
            VERIFICATION_NETWORK.to_string(),
            NetworkConfig {
                rpc_url: ARBITRUM_SEPOLIA_RPC.to_string(),
                chain_id: Some(ARBITRUM_SEPOLIA_CHAIN_ID),
                explorer: Some(ExplorerConfig {
                    api_url: ETHERSCAN_V2_API.to_string(),
                    api_key: None,
                }),
            },
        ),
        (
            "localhost".to_string(),
            NetworkConfig {
                rpc_url: LOCALHOST_RPC.to_string(),
                chain_id: Some(LOCALHOST_CHAIN_ID),
                explorer: None,
            },
        ),
    ])
}

/// A network selected for a run, with its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedNetwork {
    pub name: String,
    pub config: NetworkConfig,
}

impl ResolvedNetwork {
    pub fn context(&self) -> NetworkContext {
        NetworkContext::new(self.name.clone())
    }

    /// Explorer API key from the network config, else from `env_key`.
    pub fn api_key(&self, env_key: Option<String>) -> Option<String> {
        self.config
            .explorer
            .as_ref()
            .and_then(|explorer| explorer.api_key.clone())
            .filter(|key| !key.trim().is_empty())
            .or(env_key.filter(|key| !key.trim().is_empty()))
    }
}

/// Looks `name` up in the stored networks first, then in the built-ins.
pub fn resolve_network(
    stored: &BTreeMap<String, NetworkConfig>,
    name: &str,
) -> Result<ResolvedNetwork, ConfigError> {
    let config = stored
        .get(name)
        .cloned()
        .or_else(|| builtin_networks().remove(name))
        .ok_or_else(|| ConfigError::UnknownNetwork(name.to_string()))?;

    Ok(ResolvedNetwork {
        name: name.to_string(),
        config,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_arbitrum_sepolia_uses_etherscan_v2() {
        let network = resolve_network(&BTreeMap::new(), VERIFICATION_NETWORK).unwrap();
        assert_eq!(network.config.chain_id, Some(ARBITRUM_SEPOLIA_CHAIN_ID));
        assert_eq!(
            network.config.explorer.as_ref().unwrap().api_url,
            ETHERSCAN_V2_API
        );
        assert!(network.context().is_verification_target());
    }

    #[test]
    fn stored_network_overrides_builtin() {
        let stored = BTreeMap::from([(
            "localhost".to_string(),
            NetworkConfig {
                rpc_url: "http://127.0.0.1:9545".to_string(),
                chain_id: None,
                explorer: None,
            },
        )]);

        let network = resolve_network(&stored, "localhost").unwrap();
        assert_eq!(network.config.rpc_url, "http://127.0.0.1:9545");
        assert_eq!(network.config.chain_id, None);
    }

    #[test]
    fn unknown_network() {
        assert!(matches!(
            resolve_network(&BTreeMap::new(), "mainnet"),
            Err(ConfigError::UnknownNetwork(name)) if name == "mainnet"
        ));
    }

    #[test]
    fn configured_api_key_wins_over_environment() {
        let mut network = resolve_network(&BTreeMap::new(), VERIFICATION_NETWORK).unwrap();
        assert_eq!(network.api_key(None), None);
        assert_eq!(network.api_key(Some("env".into())).as_deref(), Some("env"));
        assert_eq!(network.api_key(Some("  ".into())), None);

        network.config.explorer.as_mut().unwrap().api_key = Some("stored".into());
        assert_eq!(network.api_key(Some("env".into())).as_deref(), Some("stored"));
    }

    #[test]
    fn blank_configured_api_key_falls_back_to_environment() {
        let mut network = resolve_network(&BTreeMap::new(), VERIFICATION_NETWORK).unwrap();
        network.config.explorer.as_mut().unwrap().api_key = Some("   ".into());

        assert_eq!(network.api_key(Some("env".into())).as_deref(), Some("env"));
        assert_eq!(network.api_key(None), None);
    }
}
