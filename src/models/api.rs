use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Debug, Serialize, Deserialize)]
pub struct IpfsResponse {
    #[serde(rename = "metadataUri")]
    pub metadata_uri: String,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcRequest<P: Serialize> {
    pub jsonrpc: &'static str,
    pub id: String,
    pub method: &'static str,
    pub params: P,
}

#[derive(Debug, Deserialize, Clone)]
pub struct JitoRpcResponse<T> {
    pub result: Option<T>,
    #[serde(default)]
    pub error: Option<JsonValue>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BundleStatusesContext {
    pub slot: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BundleStatusInfo {
    pub bundle_id: String,
    #[serde(default)]
    pub transactions: Vec<String>,
    #[serde(default)]
    pub slot: u64,
    #[serde(default)]
    pub confirmation_status: Option<String>,
    #[serde(default)]
    pub err: Option<JsonValue>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GetBundleStatusesResult {
    pub context: BundleStatusesContext,
    #[serde(default)]
    pub value: Vec<Option<BundleStatusInfo>>,
}
