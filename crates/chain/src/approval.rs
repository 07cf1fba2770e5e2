//! Authorizing the trade address to move a party's tokens.

use std::sync::Arc;

use async_trait::async_trait;
use pintswap_types::{Address, Hash256, Permit, U256};
use tracing::info;

use crate::address::coerce_native;
use crate::error::ChainResult;
use crate::wallet::{TransactionRequest, Wallet};

const APPROVE_SELECTOR: [u8; 4] = [0x09, 0x5e, 0xa7, 0xb3];
const DEPOSIT_SELECTOR: [u8; 4] = [0xd0, 0xe3, 0x0d, 0xb0];

/// Outcome of authorizing a spender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Approval {
    /// An on-chain `approve`; the caller waits for inclusion before relying on it.
    Transaction(Hash256),
    /// An off-chain signature the settlement contract redeems itself.
    Permit(Permit),
}

#[async_trait]
pub trait Approver: Send + Sync {
    /// Allow `spender` to transfer `amount` of `token` from the local account.
    /// The zero address means the native currency.
    async fn approve(&self, token: Address, amount: U256, spender: Address) -> ChainResult<Approval>;
}

/// Sends ERC-20 `approve` transactions from the local wallet, wrapping native
/// currency first when the offer side is the zero address.
pub struct WalletApprover {
    wallet: Arc<dyn Wallet>,
    wrapped_native: Address,
    /// Wait for the wrapping deposit to be included before approving.
    await_receipts: bool,
}

impl WalletApprover {
    pub fn new(wallet: Arc<dyn Wallet>, wrapped_native: Address, await_receipts: bool) -> Self {
        Self {
            wallet,
            wrapped_native,
            await_receipts,
        }
    }
}

#[async_trait]
impl Approver for WalletApprover {
    async fn approve(&self, token: Address, amount: U256, spender: Address) -> ChainResult<Approval> {
        if token.is_zero() {
            let hash = self
                .wallet
                .send_transaction(TransactionRequest {
                    to: self.wrapped_native,
                    value: amount,
                    data: DEPOSIT_SELECTOR.to_vec(),
                })
                .await?;
            info!(tx = ?hash, amount = %amount, "wrapping native currency");
            if self.await_receipts {
                self.wallet.wait_for_transaction(hash).await?;
            }
        }

        let token = coerce_native(token, self.wrapped_native);
        let hash = self
            .wallet
            .send_transaction(TransactionRequest {
                to: token,
                value: U256::zero(),
                data: approve_calldata(spender, amount),
            })
            .await?;
        info!(tx = ?hash, token = ?token, spender = ?spender, "sent approval");
        Ok(Approval::Transaction(hash))
    }
}

/// ABI-encoded `approve(address,uint256)`.
pub fn approve_calldata(spender: Address, amount: U256) -> Vec<u8> {
    let mut data = Vec::with_capacity(4 + 64);
    data.extend_from_slice(&APPROVE_SELECTOR);
    data.extend_from_slice(&[0u8; 12]);
    data.extend_from_slice(spender.as_bytes());
    let mut word = [0u8; 32];
    amount.to_big_endian(&mut word);
    data.extend_from_slice(&word);
    data
}
