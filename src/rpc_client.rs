//! Monero daemon JSON-RPC client
//!
//! Three lookups are needed by the audit: chain height, block by height and
//! transaction by hash. The first two go through `/json_rpc`; monerod only
//! serves transaction lookups on its own `/get_transactions` path, next to
//! `/json_rpc` under the same base URL. Every request and response is
//! written to the operational log. Failures are logged with their typed cause and then
//! folded into `None`, so a bad height never aborts the surrounding loop.

use crate::audit_log::AuditLog;
use crate::error::RpcError;
use crate::model::{BlockInfo, RawBlock, RawTransaction, TransactionOutputs};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

/// Node data interface consumed by the audit
#[async_trait]
pub trait NodeRpc: Send + Sync {
    /// Index of the most recently accepted block (block count minus one)
    async fn current_height(&self) -> Option<u64>;

    /// Resolve a height to its hash and decoded payload
    async fn fetch_block(&self, height: u64) -> Option<BlockInfo>;

    /// Resolve a transaction hash to its output amounts
    async fn fetch_transaction(&self, hash: &str) -> Option<TransactionOutputs>;
}

/// RPC client configuration
#[derive(Debug, Clone)]
pub struct RpcConfig {
    /// RPC URL (e.g., "http://127.0.0.1:18081/json_rpc")
    pub url: String,
    /// Request timeout
    pub timeout: Duration,
}

/// JSON-RPC client for monerod
pub struct MoneroRpcClient {
    client: Client,
    config: RpcConfig,
    log: AuditLog,
}

impl MoneroRpcClient {
    /// Create a new RPC client
    pub fn new(config: RpcConfig, log: AuditLog) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;
        log.debug(format!("RPC endpoint set to {}", config.url));
        Ok(Self {
            client,
            config,
            log,
        })
    }

    /// Make an RPC call, returning the `result` member
    async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": "0",
            "method": method,
            "params": params
        });
        self.log
            .debug(format!("RPC call: {} with params {}", method, body["params"]));

        let response = self.client.post(&self.config.url).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RpcError::Status(status));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| RpcError::Malformed(e.to_string()))?;
        self.log.debug(format!("RPC response {}: {}", method, json));

        extract_result(json)
    }

    /// Base URL of the node: the RPC URL without its `/json_rpc` suffix
    pub fn base_url(&self) -> &str {
        base_url(&self.config.url)
    }

    /// POST a plain JSON body to one of monerod's non-JSON-RPC endpoints
    async fn other_call(&self, path: &str, body: Value) -> Result<Value, RpcError> {
        let url = format!("{}/{}", self.base_url(), path.trim_start_matches('/'));
        self.log.debug(format!("RPC call: {} with body {}", path, body));

        let response = self.client.post(&url).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RpcError::Status(status));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| RpcError::Malformed(e.to_string()))?;
        self.log.debug(format!("RPC response {}: {}", path, json));

        match json.get("status").and_then(Value::as_str) {
            Some("OK") | None => Ok(json),
            Some(other) => Err(RpcError::Remote(format!("status {}", other))),
        }
    }

    /// Run a lookup and fold its failure into `None` after logging the cause
    fn fold<T>(&self, what: &str, outcome: Result<T, RpcError>) -> Option<T> {
        match outcome {
            Ok(value) => Some(value),
            Err(e) => {
                self.log.error(format!("RPC {} failed: {}", what, e));
                None
            }
        }
    }

    pub async fn try_current_height(&self) -> Result<u64, RpcError> {
        let result = self.call("get_block_count", serde_json::json!({})).await?;
        parse_block_count(&result)
    }

    pub async fn try_fetch_block(&self, height: u64) -> Result<BlockInfo, RpcError> {
        let result = self
            .call("get_block", serde_json::json!({ "height": height }))
            .await?;
        parse_block(height, &result)
    }

    pub async fn try_fetch_transaction(&self, hash: &str) -> Result<TransactionOutputs, RpcError> {
        let response = self
            .other_call(
                "/get_transactions",
                serde_json::json!({ "txs_hashes": [hash], "decode_as_json": true }),
            )
            .await?;
        parse_transaction(hash, &response)
    }
}

#[async_trait]
impl NodeRpc for MoneroRpcClient {
    async fn current_height(&self) -> Option<u64> {
        let outcome = self.try_current_height().await;
        self.fold("get_block_count", outcome)
    }

    async fn fetch_block(&self, height: u64) -> Option<BlockInfo> {
        let outcome = self.try_fetch_block(height).await;
        let block = self.fold(&format!("get_block {}", height), outcome)?;
        self.log
            .debug(format!("Block {} fetched with hash {}", height, block.hash));
        Some(block)
    }

    async fn fetch_transaction(&self, hash: &str) -> Option<TransactionOutputs> {
        let outcome = self.try_fetch_transaction(hash).await;
        self.fold(&format!("get_transactions {}", hash), outcome)
    }
}

/// Strip a trailing `/json_rpc` (and any trailing slash) from an RPC URL
pub fn base_url(url: &str) -> &str {
    let url = url.trim_end_matches('/');
    url.strip_suffix("/json_rpc").unwrap_or(url)
}

/// Split a JSON-RPC envelope into its `result` or its `error`
pub fn extract_result(mut json: Value) -> Result<Value, RpcError> {
    if let Some(error) = json.get("error") {
        if !error.is_null() {
            return Err(RpcError::Remote(error.to_string()));
        }
    }
    match json.get_mut("result").map(Value::take) {
        Some(Value::Null) | None => Err(RpcError::MissingField("result")),
        Some(result) => Ok(result),
    }
}

/// `get_block_count` result → height of the tip
pub fn parse_block_count(result: &Value) -> Result<u64, RpcError> {
    let count = result
        .get("count")
        .and_then(Value::as_u64)
        .ok_or(RpcError::MissingField("count"))?;
    count
        .checked_sub(1)
        .ok_or_else(|| RpcError::Malformed("block count is zero".to_string()))
}

/// `get_block` result → [`BlockInfo`]
pub fn parse_block(height: u64, result: &Value) -> Result<BlockInfo, RpcError> {
    let hash = result
        .get("block_header")
        .and_then(|h| h.get("hash"))
        .and_then(Value::as_str)
        .ok_or(RpcError::MissingField("block_header.hash"))?
        .to_string();
    let embedded = result
        .get("json")
        .and_then(Value::as_str)
        .ok_or(RpcError::MissingField("json"))?;
    let block: RawBlock = serde_json::from_str(embedded)
        .map_err(|e| RpcError::Malformed(format!("block {} json: {}", height, e)))?;
    Ok(BlockInfo {
        height,
        hash,
        block,
    })
}

/// `/get_transactions` response → [`TransactionOutputs`] of the first entry
pub fn parse_transaction(hash: &str, result: &Value) -> Result<TransactionOutputs, RpcError> {
    let first = result
        .get("txs")
        .and_then(Value::as_array)
        .and_then(|txs| txs.first())
        .ok_or_else(|| RpcError::NotFound(hash.to_string()))?;
    let embedded = first
        .get("as_json")
        .and_then(Value::as_str)
        .ok_or(RpcError::MissingField("as_json"))?;
    let tx: RawTransaction = serde_json::from_str(embedded)
        .map_err(|e| RpcError::Malformed(format!("transaction {} json: {}", hash, e)))?;
    Ok(TransactionOutputs {
        hash: hash.to_string(),
        amounts: tx.vout.iter().map(|out| out.amount).collect(),
    })
}
