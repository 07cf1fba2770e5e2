//! The local account that pays for approvals and funds shared addresses.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k256::ecdsa::SigningKey;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use pintswap_types::{Address, Hash256, U256};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::address::address_from_public_key;
use crate::error::{ChainError, ChainResult};
use crate::provider::{wait_for_receipt, CallRequest, ChainProvider, TransactionReceipt};
use crate::tx::{Fees, TxSignature, UnsignedTransaction};

/// A plain value/data transfer from the local account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionRequest {
    pub to: Address,
    pub value: U256,
    pub data: Vec<u8>,
}

#[async_trait]
pub trait Wallet: Send + Sync {
    fn address(&self) -> Address;

    /// Sign and broadcast, returning the transaction hash.
    async fn send_transaction(&self, request: TransactionRequest) -> ChainResult<Hash256>;

    /// Wait until `hash` is included and succeeded.
    async fn wait_for_transaction(&self, hash: Hash256) -> ChainResult<TransactionReceipt>;
}

/// Signs legacy EIP-155 transactions with an in-memory secp256k1 key.
pub struct LocalWallet {
    key: SigningKey,
    address: Address,
    provider: Arc<dyn ChainProvider>,
    poll_interval: Duration,
    /// Serializes nonce assignment across concurrent trades.
    send_lock: Mutex<()>,
}

impl LocalWallet {
    pub fn new(key: SigningKey, provider: Arc<dyn ChainProvider>) -> ChainResult<Self> {
        let address =
            address_from_public_key(key.verifying_key().to_encoded_point(false).as_bytes())?;
        Ok(Self {
            key,
            address,
            provider,
            poll_interval: Duration::from_secs(1),
            send_lock: Mutex::new(()),
        })
    }

    /// Load from a hex private key, with or without `0x`.
    pub fn from_hex(secret: &str, provider: Arc<dyn ChainProvider>) -> ChainResult<Self> {
        let bytes = hex::decode(secret.trim().trim_start_matches("0x"))
            .map_err(|e| ChainError::Signing(format!("invalid private key hex: {}", e)))?;
        let key = SigningKey::from_slice(&bytes)
            .map_err(|e| ChainError::Signing(format!("invalid private key: {}", e)))?;
        Self::new(key, provider)
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Raw signed encoding of `tx`.
    pub fn sign_transaction(&self, tx: &UnsignedTransaction) -> ChainResult<Vec<u8>> {
        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(tx.sighash().as_bytes())
            .map_err(|e| ChainError::Signing(e.to_string()))?;
        let bytes = signature.to_bytes();
        let signature = TxSignature::from_parts(&bytes[..32], &bytes[32..], recovery_id.to_byte())?;
        Ok(tx.encode_signed(&signature))
    }
}

#[async_trait]
impl Wallet for LocalWallet {
    fn address(&self) -> Address {
        self.address
    }

    async fn send_transaction(&self, request: TransactionRequest) -> ChainResult<Hash256> {
        let _guard = self.send_lock.lock().await;

        let chain_id = self.provider.chain_id().await?;
        let nonce = self.provider.transaction_count(self.address).await?;
        let gas_price = self.provider.gas_price().await?;
        let gas_limit = self
            .provider
            .estimate_gas(&CallRequest {
                from: Some(self.address),
                to: Some(request.to),
                value: request.value,
                data: request.data.clone(),
            })
            .await?;

        let tx = UnsignedTransaction {
            chain_id,
            nonce,
            fees: Fees::Legacy { gas_price },
            gas_limit,
            to: Some(request.to),
            value: request.value,
            data: request.data,
        };
        let raw = self.sign_transaction(&tx)?;
        let hash = self.provider.send_raw_transaction(&raw).await?;
        info!(tx = ?hash, to = ?request.to, nonce, "sent transaction");
        Ok(hash)
    }

    async fn wait_for_transaction(&self, hash: Hash256) -> ChainResult<TransactionReceipt> {
        debug!(tx = ?hash, "waiting for transaction");
        wait_for_receipt(self.provider.as_ref(), hash, self.poll_interval)
            .await?
            .ensure_success()
    }
}
