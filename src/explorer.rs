//! Source verification against Etherscan-compatible explorer APIs (Arbiscan).

use crate::{
    VerificationRequest, artifacts::ArtifactStore, deploy::Verifier, error::VerificationError,
};
use alloy::{hex, primitives::Address};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);
const DEFAULT_MAX_STATUS_CHECKS: usize = 20;

const STATUS_PENDING: &str = "Pending in queue";
const STATUS_PASS: &str = "Pass - Verified";

#[derive(Debug, Deserialize)]
struct ExplorerResponse {
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    result: Value,
}

impl ExplorerResponse {
    fn is_ok(&self) -> bool {
        self.status == "1"
    }

    fn result_text(&self) -> String {
        match &self.result {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }

    fn into_error(self, address: Address) -> VerificationError {
        let text = self.result_text();
        let detail = if text.is_empty() || text == "null" {
            self.message
        } else {
            text
        };
        classify_failure(detail, address)
    }
}

fn classify_failure(detail: String, address: Address) -> VerificationError {
    let lower = detail.to_ascii_lowercase();
    if lower.contains("rate limit") {
        VerificationError::RateLimited(detail)
    } else if lower.contains("already verified") {
        VerificationError::AlreadyVerified(address)
    } else {
        VerificationError::Rejected(detail)
    }
}

/// Submits standard-JSON source verification and polls for its result.
pub struct ExplorerVerifier {
    client: Client,
    network: String,
    api_url: String,
    api_key: Option<String>,
    chain_id: Option<u64>,
    artifacts: ArtifactStore,
    poll_interval: Duration,
    max_status_checks: usize,
}

impl ExplorerVerifier {
    pub fn new(
        network: impl Into<String>,
        api_url: impl Into<String>,
        api_key: Option<String>,
        artifacts: ArtifactStore,
    ) -> Result<Self, VerificationError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            client,
            network: network.into(),
            api_url: api_url.into(),
            api_key,
            chain_id: None,
            artifacts,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_status_checks: DEFAULT_MAX_STATUS_CHECKS,
        })
    }

    /// Selects the chain on multichain endpoints through the `chainid` query parameter.
    pub fn with_chain_id(mut self, chain_id: Option<u64>) -> Self {
        self.chain_id = chain_id;
        self
    }

    pub fn with_polling(mut self, interval: Duration, max_checks: usize) -> Self {
        self.poll_interval = interval;
        self.max_status_checks = max_checks.max(1);
        self
    }

    fn with_chain(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.chain_id {
            Some(chain_id) => builder.query(&[("chainid", chain_id)]),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<ExplorerResponse, VerificationError> {
        let response = self.with_chain(builder).send().await?;
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(VerificationError::RateLimited(format!(
                "HTTP {}",
                response.status()
            )));
        }
        parse_response(response.error_for_status()?).await
    }

    async fn get(&self, params: &[(&str, &str)]) -> Result<ExplorerResponse, VerificationError> {
        self.send(self.client.get(&self.api_url).query(params)).await
    }

    async fn is_verified(
        &self,
        api_key: &str,
        address: Address,
    ) -> Result<bool, VerificationError> {
        let address_str = address.to_string();
        let response = self
            .get(&[
                ("module", "contract"),
                ("action", "getsourcecode"),
                ("address", address_str.as_str()),
                ("apikey", api_key),
            ])
            .await?;

        if !response.is_ok() {
            return Err(response.into_error(address));
        }

        let source = response
            .result
            .get(0)
            .and_then(|entry| entry.get("SourceCode"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        Ok(!source.is_empty())
    }

    async fn submit(
        &self,
        api_key: &str,
        request: &VerificationRequest,
    ) -> Result<String, VerificationError> {
        let artifact = self.artifacts.load(&request.contract_name)?;
        let build_info = self.artifacts.build_info(&request.contract_name)?;
        let constructor_args =
            hex::encode(artifact.encode_constructor_args(&request.constructor_args)?);
        let source = build_info.input.to_string();
        let address = request.address.to_string();
        let contract_name = artifact.fully_qualified_name();
        let compiler_version = build_info.compiler_version();

        log::info!(
            "Submitting {contract_name} at {address} for verification (compiler {compiler_version})"
        );

        let form = [
            ("apikey", api_key),
            ("module", "contract"),
            ("action", "verifysourcecode"),
            ("contractaddress", address.as_str()),
            ("sourceCode", source.as_str()),
            ("codeformat", "solidity-standard-json-input"),
            ("contractname", contract_name.as_str()),
            ("compilerversion", compiler_version.as_str()),
            // Misspelled on the explorer side.
            ("constructorArguements", constructor_args.as_str()),
        ];

        let response = self
            .send(self.client.post(&self.api_url).form(&form))
            .await?;

        if !response.is_ok() {
            return Err(response.into_error(request.address));
        }
        let guid = response.result_text();
        log::info!("Verification request accepted, guid: {guid}");
        Ok(guid)
    }

    async fn wait_for_result(
        &self,
        api_key: &str,
        guid: &str,
        address: Address,
    ) -> Result<(), VerificationError> {
        for check in 1..=self.max_status_checks {
            tokio::time::sleep(self.poll_interval).await;

            let response = self
                .get(&[
                    ("module", "contract"),
                    ("action", "checkverifystatus"),
                    ("guid", guid),
                    ("apikey", api_key),
                ])
                .await?;
            let text = response.result_text();
            log::debug!("Verification status check {check}: {text}");

            if text == STATUS_PENDING {
                continue;
            }
            if text == STATUS_PASS {
                return Ok(());
            }
            return Err(classify_failure(text, address));
        }

        Err(VerificationError::StillPending(self.max_status_checks))
    }
}

async fn parse_response(
    response: reqwest::Response,
) -> Result<ExplorerResponse, VerificationError> {
    let text = response.text().await?;
    serde_json::from_str(&text)
        .map_err(|_| VerificationError::InvalidResponse(text.chars().take(200).collect()))
}

#[async_trait]
impl Verifier for ExplorerVerifier {
    async fn verify(&self, request: &VerificationRequest) -> Result<(), VerificationError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| VerificationError::MissingApiKey(self.network.clone()))?;

        if self.is_verified(api_key, request.address).await? {
            return Err(VerificationError::AlreadyVerified(request.address));
        }

        let guid = self.submit(api_key, request).await?;
        self.wait_for_result(api_key, &guid, request.address).await
    }
}
