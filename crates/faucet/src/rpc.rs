//! JSON-RPC client for the full node

use crate::config::FaucetConfig;
use crate::error::{FaucetError, FaucetResult};
use serde_json::{json, Value};
use tracing::debug;

/// Minimal client for the node's JSON-RPC interface
pub struct NodeRpcClient {
    rpc_url: String,
    credentials: Option<(String, Option<String>)>,
    client: reqwest::Client,
}

impl NodeRpcClient {
    pub fn new(config: &FaucetConfig) -> FaucetResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.rpc_timeout())
            .build()
            .map_err(|e| FaucetError::Rpc(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            rpc_url: config.rpc_url.clone(),
            credentials: config
                .rpc_user
                .clone()
                .map(|user| (user, config.rpc_password.clone())),
            client,
        })
    }

    async fn call(&self, method: &str, params: Value) -> FaucetResult<Value> {
        let payload = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": "faucet"
        });

        let mut request = self.client.post(&self.rpc_url).json(&payload);
        if let Some((user, password)) = &self.credentials {
            request = request.basic_auth(user, password.as_ref());
        }

        let response = request
            .send()
            .await
            .map_err(|e| FaucetError::Rpc(format!("Request failed: {}", e)))?;

        let json: Value = response
            .json()
            .await
            .map_err(|e| FaucetError::Rpc(format!("Invalid response: {}", e)))?;

        match json.get("error") {
            Some(Value::Null) | None => {}
            Some(error) => return Err(FaucetError::Rpc(error.to_string())),
        }

        debug!(method, "Node RPC call succeeded");
        Ok(json.get("result").cloned().unwrap_or(Value::Null))
    }

    /// Current chain height
    pub async fn get_block_count(&self) -> FaucetResult<u64> {
        let result = self.call("getblockcount", json!([])).await?;
        result
            .as_u64()
            .ok_or_else(|| FaucetError::Rpc(format!("Unexpected block count: {}", result)))
    }

    /// Ask the node whether `address` is valid on its network
    pub async fn validate_address(&self, address: &str) -> FaucetResult<bool> {
        let result = self.call("validateaddress", json!([address])).await?;
        Ok(result
            .get("isvalid")
            .and_then(Value::as_bool)
            .unwrap_or(false))
    }
}
