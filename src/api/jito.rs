use crate::errors::{BundlerError, Result};
use crate::models::api::{BundleStatusInfo, GetBundleStatusesResult, JitoRpcResponse, JsonRpcRequest};
use async_trait::async_trait;
use log::{debug, error, info};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::time::Duration;
use uuid::Uuid;

/// Bundle status as reported by a block engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleStatus {
    Landed { slot: u64 },
    Failed(String),
    Pending,
}

impl From<Option<BundleStatusInfo>> for BundleStatus {
    fn from(info: Option<BundleStatusInfo>) -> Self {
        match info {
            None => BundleStatus::Pending,
            Some(info) => match info.err {
                Some(err) if !err.is_null() && err.get("Ok").is_none() => BundleStatus::Failed(err.to_string()),
                _ => match info.confirmation_status.as_deref() {
                    Some("confirmed") | Some("finalized") => BundleStatus::Landed { slot: info.slot },
                    _ => BundleStatus::Pending,
                },
            },
        }
    }
}

/// JSON-RPC surface of a bundle block engine.
#[async_trait]
pub trait BundleRelay: Send + Sync {
    /// Submits base64-encoded transactions; returns the bundle id.
    async fn send_bundle(&self, url: &str, encoded_transactions: &[String], timeout: Duration) -> Result<String>;

    async fn bundle_status(&self, url: &str, bundle_id: &str, timeout: Duration) -> Result<BundleStatus>;
}

pub fn bundles_endpoint(block_engine_url: &str) -> String {
    if block_engine_url.ends_with("/api/v1/bundles") {
        block_engine_url.to_string()
    } else {
        format!("{}/api/v1/bundles", block_engine_url.trim_end_matches('/'))
    }
}

pub struct JitoRelayClient {
    http: Client,
}

impl Default for JitoRelayClient {
    fn default() -> Self {
        Self::new()
    }
}

impl JitoRelayClient {
    pub fn new() -> Self {
        Self { http: Client::new() }
    }

    async fn call<P: Serialize + Send + Sync, T: DeserializeOwned>(
        &self,
        url: &str,
        method: &'static str,
        params: P,
        timeout: Duration,
    ) -> Result<T> {
        let endpoint = bundles_endpoint(url);
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: Uuid::new_v4().to_string(),
            method,
            params,
        };

        let response = self
            .http
            .post(&endpoint)
            .json(&request)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| BundlerError::Relay(format!("{} to {} failed: {}", method, endpoint, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BundlerError::Relay(format!("Failed to read {} response: {}", method, e)))?;
        debug!("{} response status {} body {}", method, status, body);

        let parsed: JitoRpcResponse<T> = serde_json::from_str(&body).map_err(|e| {
            error!("Malformed {} response from {} (status {}): {}", method, endpoint, status, body);
            BundlerError::Relay(format!("Malformed {} response: {}", method, e))
        })?;

        if let Some(rpc_error) = parsed.error {
            return Err(BundlerError::Relay(format!("{} error (status {}): {}", method, status, rpc_error)));
        }
        if !status.is_success() {
            return Err(BundlerError::Relay(format!("{} failed with status {}", method, status)));
        }
        parsed
            .result
            .ok_or_else(|| BundlerError::Relay(format!("{} response carried no result", method)))
    }
}

#[async_trait]
impl BundleRelay for JitoRelayClient {
    async fn send_bundle(&self, url: &str, encoded_transactions: &[String], timeout: Duration) -> Result<String> {
        let params = json!([encoded_transactions, { "encoding": "base64" }]);
        let bundle_id: String = self.call(url, "sendBundle", params, timeout).await?;
        info!("Bundle accepted by {}: {}", url, bundle_id);
        Ok(bundle_id)
    }

    async fn bundle_status(&self, url: &str, bundle_id: &str, timeout: Duration) -> Result<BundleStatus> {
        let params = json!([[bundle_id]]);
        let result: GetBundleStatusesResult = self.call(url, "getBundleStatuses", params, timeout).await?;
        Ok(result.value.into_iter().next().flatten().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_is_normalized() {
        assert_eq!(
            bundles_endpoint("https://mainnet.block-engine.jito.wtf/"),
            "https://mainnet.block-engine.jito.wtf/api/v1/bundles"
        );
        assert_eq!(bundles_endpoint("https://x/api/v1/bundles"), "https://x/api/v1/bundles");
    }

    #[test]
    fn error_response_without_result_parses() {
        let parsed: JitoRpcResponse<String> = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": "1",
            "error": { "code": -32097, "message": "rate limited" }
        }))
        .unwrap();
        assert!(parsed.result.is_none());
        assert_eq!(parsed.error.unwrap()["code"], -32097);

        let parsed: JitoRpcResponse<String> =
            serde_json::from_value(json!({ "jsonrpc": "2.0", "id": "1", "result": "bundle-id" })).unwrap();
        assert_eq!(parsed.result.as_deref(), Some("bundle-id"));
        assert!(parsed.error.is_none());
    }

    #[test]
    fn status_mapping() {
        let landed: GetBundleStatusesResult = serde_json::from_value(json!({
            "context": { "slot": 10 },
            "value": [{ "bundle_id": "b", "transactions": [], "slot": 9,
                        "confirmation_status": "confirmed", "err": { "Ok": null } }]
        }))
        .unwrap();
        assert_eq!(
            BundleStatus::from(landed.value.into_iter().next().flatten()),
            BundleStatus::Landed { slot: 9 }
        );

        let failed = BundleStatusInfo {
            bundle_id: "b".into(),
            transactions: vec![],
            slot: 9,
            confirmation_status: Some("processed".into()),
            err: Some(json!({ "Err": "BundleFailure" })),
        };
        assert!(matches!(BundleStatus::from(Some(failed)), BundleStatus::Failed(_)));
        assert_eq!(BundleStatus::from(None), BundleStatus::Pending);
    }

    #[tokio::test]
    async fn unreachable_relay_is_a_relay_error() {
        let client = JitoRelayClient::new();
        let result = client
            .send_bundle("http://127.0.0.1:9", &["AA==".to_string()], Duration::from_millis(200))
            .await;
        assert!(matches!(result, Err(BundlerError::Relay(_))));
    }
}
