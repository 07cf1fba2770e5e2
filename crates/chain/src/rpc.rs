//! JSON-RPC client for Ethereum nodes and private relays.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use pintswap_types::{Address, Hash256, U256};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::error::{ChainError, ChainResult};
use crate::provider::{CallRequest, ChainProvider, TransactionReceipt};

/// Default private relay for zero-tip transactions.
pub const DEFAULT_RELAY_URL: &str = "https://rpc.flashbots.net";

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// Minimal JSON-RPC 2.0 transport over HTTP.
pub struct JsonRpcClient {
    url: String,
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Make an RPC call. A `null` result is returned as `None`.
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> ChainResult<Option<T>> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChainError::Transport {
                method: method.to_string(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ChainError::Transport {
                method: method.to_string(),
                reason: format!("http {}: {}", status, body),
            });
        }

        let result: RpcResponse<T> = response.json().await.map_err(|e| ChainError::InvalidResponse {
            method: method.to_string(),
            reason: e.to_string(),
        })?;

        if let Some(error) = result.error {
            return Err(ChainError::Rpc {
                method: method.to_string(),
                code: error.code,
                message: error.message,
            });
        }

        Ok(result.result)
    }

    /// Like [`call`](Self::call) but a `null` result is an error.
    pub async fn call_required<T: DeserializeOwned>(&self, method: &str, params: Value) -> ChainResult<T> {
        self.call(method, params)
            .await?
            .ok_or_else(|| ChainError::InvalidResponse {
                method: method.to_string(),
                reason: "null result".to_string(),
            })
    }
}

fn hex_data(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

fn quantity_u64(method: &str, value: U256) -> ChainResult<u64> {
    if value > U256::from(u64::MAX) {
        return Err(ChainError::InvalidResponse {
            method: method.to_string(),
            reason: format!("quantity {} exceeds u64", value),
        });
    }
    Ok(value.low_u64())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: Hash256,
    block_number: U256,
    status: Option<U256>,
    gas_used: U256,
    contract_address: Option<Address>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcBlockHeader {
    base_fee_per_gas: Option<U256>,
}

/// [`ChainProvider`] backed by a node's JSON-RPC endpoint.
pub struct JsonRpcProvider {
    rpc: JsonRpcClient,
}

impl JsonRpcProvider {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            rpc: JsonRpcClient::new(url),
        }
    }
}

#[async_trait]
impl ChainProvider for JsonRpcProvider {
    async fn chain_id(&self) -> ChainResult<u64> {
        let id: U256 = self.rpc.call_required("eth_chainId", json!([])).await?;
        quantity_u64("eth_chainId", id)
    }

    async fn transaction_count(&self, address: Address) -> ChainResult<u64> {
        let count: U256 = self
            .rpc
            .call_required("eth_getTransactionCount", json!([address, "pending"]))
            .await?;
        quantity_u64("eth_getTransactionCount", count)
    }

    async fn balance(&self, address: Address) -> ChainResult<U256> {
        self.rpc
            .call_required("eth_getBalance", json!([address, "latest"]))
            .await
    }

    async fn gas_price(&self) -> ChainResult<U256> {
        self.rpc.call_required("eth_gasPrice", json!([])).await
    }

    async fn base_fee(&self) -> ChainResult<U256> {
        let header: RpcBlockHeader = self
            .rpc
            .call_required("eth_getBlockByNumber", json!(["latest", false]))
            .await?;
        header.base_fee_per_gas.ok_or_else(|| ChainError::InvalidResponse {
            method: "eth_getBlockByNumber".to_string(),
            reason: "block has no base fee".to_string(),
        })
    }

    async fn estimate_gas(&self, request: &CallRequest) -> ChainResult<U256> {
        let mut call = serde_json::Map::new();
        if let Some(from) = request.from {
            call.insert("from".into(), json!(from));
        }
        if let Some(to) = request.to {
            call.insert("to".into(), json!(to));
        }
        if !request.value.is_zero() {
            call.insert("value".into(), json!(request.value));
        }
        call.insert("data".into(), json!(hex_data(&request.data)));
        self.rpc
            .call_required("eth_estimateGas", json!([Value::Object(call)]))
            .await
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> ChainResult<Hash256> {
        let hash = self
            .rpc
            .call_required("eth_sendRawTransaction", json!([hex_data(raw)]))
            .await?;
        debug!(tx = ?hash, "broadcast transaction");
        Ok(hash)
    }

    async fn transaction_receipt(&self, hash: Hash256) -> ChainResult<Option<TransactionReceipt>> {
        let receipt: Option<RpcReceipt> = self
            .rpc
            .call("eth_getTransactionReceipt", json!([hash]))
            .await?;
        receipt
            .map(|r| {
                Ok(TransactionReceipt {
                    transaction_hash: r.transaction_hash,
                    block_number: quantity_u64("eth_getTransactionReceipt", r.block_number)?,
                    // pre-byzantium receipts carry no status
                    status: r.status.map_or(true, |s| !s.is_zero()),
                    gas_used: r.gas_used,
                    contract_address: r.contract_address,
                })
            })
            .transpose()
    }
}

/// Submits transactions to a private relay instead of the public mempool.
pub struct RelayClient {
    rpc: JsonRpcClient,
}

impl RelayClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            rpc: JsonRpcClient::new(url),
        }
    }

    pub async fn send_raw_transaction(&self, raw: &[u8]) -> ChainResult<Hash256> {
        let hash = self
            .rpc
            .call_required("eth_sendRawTransaction", json!([hex_data(raw)]))
            .await?;
        info!(tx = ?hash, relay = self.rpc.url(), "submitted transaction to private relay");
        Ok(hash)
    }
}

impl Default for RelayClient {
    fn default() -> Self {
        Self::new(DEFAULT_RELAY_URL)
    }
}
