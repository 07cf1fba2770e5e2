//! In-memory chain used by unit tests.

use std::collections::HashMap;

use async_trait::async_trait;
use pintswap_types::{Address, Hash256, U256};
use tokio::sync::Mutex;

use crate::error::{ChainError, ChainResult};
use crate::provider::{CallRequest, ChainProvider, TransactionReceipt};
use crate::tx::transaction_hash;
use crate::wallet::{TransactionRequest, Wallet};

#[derive(Default)]
struct MockState {
    nonces: HashMap<Address, u64>,
    sent: Vec<Vec<u8>>,
    estimate_failures: usize,
    estimate_calls: usize,
}

pub(crate) struct MockProvider {
    chain_id: u64,
    pub gas_price: U256,
    pub base_fee: U256,
    pub estimate: U256,
    state: Mutex<MockState>,
}

impl MockProvider {
    pub(crate) fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            gas_price: U256::from(10u64),
            base_fee: U256::from(8u64),
            estimate: U256::from(100_000u64),
            state: Mutex::new(MockState::default()),
        }
    }

    pub(crate) async fn set_nonce(&self, address: Address, nonce: u64) {
        self.state.lock().await.nonces.insert(address, nonce);
    }

    pub(crate) async fn fail_estimates(&self, count: usize) {
        self.state.lock().await.estimate_failures = count;
    }

    pub(crate) async fn estimate_calls(&self) -> usize {
        self.state.lock().await.estimate_calls
    }

    pub(crate) async fn sent(&self) -> Vec<Vec<u8>> {
        self.state.lock().await.sent.clone()
    }
}

#[async_trait]
impl ChainProvider for MockProvider {
    async fn chain_id(&self) -> ChainResult<u64> {
        Ok(self.chain_id)
    }

    async fn transaction_count(&self, address: Address) -> ChainResult<u64> {
        Ok(self.state.lock().await.nonces.get(&address).copied().unwrap_or(0))
    }

    async fn balance(&self, _address: Address) -> ChainResult<U256> {
        Ok(U256::zero())
    }

    async fn gas_price(&self) -> ChainResult<U256> {
        Ok(self.gas_price)
    }

    async fn base_fee(&self) -> ChainResult<U256> {
        Ok(self.base_fee)
    }

    async fn estimate_gas(&self, _request: &CallRequest) -> ChainResult<U256> {
        let mut state = self.state.lock().await;
        state.estimate_calls += 1;
        if state.estimate_failures > 0 {
            state.estimate_failures -= 1;
            return Err(ChainError::Rpc {
                method: "eth_estimateGas".into(),
                code: -32000,
                message: "header not found".into(),
            });
        }
        Ok(self.estimate)
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> ChainResult<Hash256> {
        self.state.lock().await.sent.push(raw.to_vec());
        Ok(transaction_hash(raw))
    }

    async fn transaction_receipt(&self, hash: Hash256) -> ChainResult<Option<TransactionReceipt>> {
        Ok(Some(TransactionReceipt {
            transaction_hash: hash,
            block_number: 1,
            status: true,
            gas_used: U256::from(21_000u64),
            contract_address: None,
        }))
    }
}

#[derive(Default)]
struct WalletState {
    requests: Vec<TransactionRequest>,
    waited: usize,
}

/// Records requests and reports every transaction as successful.
pub(crate) struct MockWallet {
    address: Address,
    state: Mutex<WalletState>,
}

impl MockWallet {
    pub(crate) fn new(address: Address) -> Self {
        Self {
            address,
            state: Mutex::new(WalletState::default()),
        }
    }

    pub(crate) async fn requests(&self) -> Vec<TransactionRequest> {
        self.state.lock().await.requests.clone()
    }

    pub(crate) async fn waited(&self) -> usize {
        self.state.lock().await.waited
    }
}

#[async_trait]
impl Wallet for MockWallet {
    fn address(&self) -> Address {
        self.address
    }

    async fn send_transaction(&self, request: TransactionRequest) -> ChainResult<Hash256> {
        let mut state = self.state.lock().await;
        state.requests.push(request);
        Ok(Hash256::from_low_u64_be(state.requests.len() as u64))
    }

    async fn wait_for_transaction(&self, hash: Hash256) -> ChainResult<TransactionReceipt> {
        self.state.lock().await.waited += 1;
        Ok(TransactionReceipt {
            transaction_hash: hash,
            block_number: 1,
            status: true,
            gas_used: U256::from(46_000u64),
            contract_address: None,
        })
    }
}
