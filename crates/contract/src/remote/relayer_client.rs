use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use common::chain::{ContractError, ExitReceipt, StakingContract};
use common::models::StakeDetails;
use hmac::{Hmac, Mac};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::Sha256;
use tracing::{debug, error, info, warn};

use crate::remote::{
    ExitTradeResponse, HealthResponse, StakeCountResponse, StakeDetailsResponse,
    TransactionResponse,
};
use crate::traits::RelayerResponse;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateTradeValueRequest {
    new_value: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExitTradeRequest {
    final_value: String,
}

/// Talks to the transaction relayer that fronts the staking contract. The
/// relayer holds the signing key and waits for confirmations; this client only
/// authenticates its requests with an HMAC over timestamp, method, path and body.
#[derive(Clone)]
pub struct RelayerClient {
    client: Client,
    base_url: String,
    api_key: String,
    secret_key: String,
}

impl RelayerClient {
    pub fn new(
        base_url: &str,
        api_key: String,
        secret_key: String,
    ) -> Result<Self, ContractError> {
        let client = Client::builder()
            .user_agent("signal-stake-reconciler/0.1.0")
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| ContractError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            secret_key,
        })
    }

    fn sign(&self, payload: &str) -> Result<String, ContractError> {
        let mut mac = HmacSha256::new_from_slice(self.secret_key.as_bytes())
            .map_err(|e| ContractError::Transport(format!("invalid signing key: {e}")))?;
        mac.update(payload.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn signature_payload(timestamp: i64, method: &Method, path: &str, body: &str) -> String {
        format!("{}{}{}{}", timestamp, method.as_str(), path, body)
    }

    async fn send<R, T>(
        &self,
        call: &'static str,
        method: Method,
        path: &str,
        body: Option<String>,
    ) -> Result<T, ContractError>
    where
        R: RelayerResponse<T> + DeserializeOwned,
    {
        let timestamp = Utc::now().timestamp_millis();
        let body = body.unwrap_or_default();
        let signature = self.sign(&Self::signature_payload(timestamp, &method, path, &body))?;
        let url = format!("{}{}", self.base_url, path);

        debug!("Relayer {} {} {}", call, method, url);

        let mut request = self
            .client
            .request(method, &url)
            .header("X-API-KEY", &self.api_key)
            .header("X-TIMESTAMP", timestamp.to_string())
            .header("X-SIGNATURE", signature);
        if !body.is_empty() {
            request = request.header(CONTENT_TYPE, "application/json").body(body);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| ContractError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let error_text = resp.text().await.unwrap_or_default();
            error!("Relayer {} failed: HTTP {}: {}", call, status, error_text);
            return Err(ContractError::Rejected {
                call,
                status: status.as_u16(),
                body: error_text,
            });
        }

        resp.json::<R>()
            .await
            .map_err(|e| ContractError::InvalidResponse {
                call,
                reason: e.to_string(),
            })?
            .to_domain()
    }

    fn encode_body<B: Serialize>(call: &'static str, body: &B) -> Result<String, ContractError> {
        serde_json::to_string(body).map_err(|e| ContractError::InvalidResponse {
            call,
            reason: format!("failed to encode request: {e}"),
        })
    }
}

#[async_trait]
impl StakingContract for RelayerClient {
    async fn health(&self) -> Result<(), ContractError> {
        self.send::<HealthResponse, _>("health", Method::GET, "/health", None)
            .await?;
        info!("Relayer at {} is healthy", self.base_url);
        Ok(())
    }

    async fn get_stake_count(&self, owner: &str) -> Result<u64, ContractError> {
        self.send::<StakeCountResponse, _>(
            "getStakeCount",
            Method::GET,
            &format!("/stakes/{owner}/count"),
            None,
        )
        .await
    }

    async fn get_stake_details(
        &self,
        owner: &str,
        index: u64,
    ) -> Result<StakeDetails, ContractError> {
        self.send::<StakeDetailsResponse, _>(
            "getStakeDetails",
            Method::GET,
            &format!("/stakes/{owner}/{index}"),
            None,
        )
        .await
    }

    async fn update_trade_value(
        &self,
        owner: &str,
        index: u64,
        new_value: u128,
    ) -> Result<String, ContractError> {
        let body = Self::encode_body(
            "updateTradeValue",
            &UpdateTradeValueRequest {
                new_value: new_value.to_string(),
            },
        )?;

        info!("Updating trade value of {}#{} to {}", owner, index, new_value);
        self.send::<TransactionResponse, _>(
            "updateTradeValue",
            Method::POST,
            &format!("/stakes/{owner}/{index}/trade-value"),
            Some(body),
        )
        .await
    }

    async fn exit_trade(
        &self,
        owner: &str,
        index: u64,
        final_value: u128,
    ) -> Result<ExitReceipt, ContractError> {
        let body = Self::encode_body(
            "exitTrade",
            &ExitTradeRequest {
                final_value: final_value.to_string(),
            },
        )?;

        info!("Exiting trade {}#{} with final value {}", owner, index, final_value);
        let path = format!("/stakes/{owner}/{index}/exit");
        let receipt = self
            .send::<ExitTradeResponse, _>("exitTrade", Method::POST, &path, Some(body))
            .await?;
        if !receipt.success {
            warn!("Relayer reported exitTrade for {}#{} as unsuccessful", owner, index);
        }
        Ok(receipt)
    }
}
