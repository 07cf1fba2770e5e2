//! Chain access seam.

use std::time::Duration;

use async_trait::async_trait;
use pintswap_types::{Address, Hash256, U256};
use tracing::debug;

use crate::error::{ChainError, ChainResult};

/// Parameters for gas estimation. `to == None` estimates a contract creation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallRequest {
    pub from: Option<Address>,
    pub to: Option<Address>,
    pub value: U256,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionReceipt {
    pub transaction_hash: Hash256,
    pub block_number: u64,
    /// `true` when execution succeeded.
    pub status: bool,
    pub gas_used: U256,
    pub contract_address: Option<Address>,
}

impl TransactionReceipt {
    /// Fail with [`ChainError::Reverted`] unless the transaction succeeded.
    pub fn ensure_success(self) -> ChainResult<Self> {
        if self.status {
            Ok(self)
        } else {
            Err(ChainError::Reverted(self.transaction_hash))
        }
    }
}

/// Read and broadcast access to an EVM chain.
#[async_trait]
pub trait ChainProvider: Send + Sync {
    async fn chain_id(&self) -> ChainResult<u64>;

    /// Next nonce for `address`, counting pending transactions.
    async fn transaction_count(&self, address: Address) -> ChainResult<u64>;

    async fn balance(&self, address: Address) -> ChainResult<U256>;

    async fn gas_price(&self) -> ChainResult<U256>;

    /// Base fee of the latest block.
    async fn base_fee(&self) -> ChainResult<U256>;

    async fn estimate_gas(&self, request: &CallRequest) -> ChainResult<U256>;

    async fn send_raw_transaction(&self, raw: &[u8]) -> ChainResult<Hash256>;

    async fn transaction_receipt(&self, hash: Hash256) -> ChainResult<Option<TransactionReceipt>>;
}

/// Poll until `hash` is included.
pub async fn wait_for_receipt(
    provider: &dyn ChainProvider,
    hash: Hash256,
    poll_interval: Duration,
) -> ChainResult<TransactionReceipt> {
    loop {
        if let Some(receipt) = provider.transaction_receipt(hash).await? {
            debug!(tx = ?hash, block = receipt.block_number, "transaction included");
            return Ok(receipt);
        }
        tokio::time::sleep(poll_interval).await;
    }
}
