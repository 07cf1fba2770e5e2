//! Ethereum side of a PintSwap trade.
//!
//! - [`assembler`]: the single-use settlement contract both parties derive
//! - [`builder`]: fee selection and the unsigned contract-creation transaction
//! - [`tx`]: legacy and EIP-1559 encoding, sighashes and decoding
//! - [`approval`], [`wallet`], [`provider`], [`rpc`]: chain access seams
//!   and their JSON-RPC implementations

pub mod address;
pub mod approval;
pub mod assembler;
pub mod builder;
pub mod error;
pub mod provider;
pub mod rpc;
pub mod tx;
pub mod wallet;

#[cfg(test)]
mod testing;

pub use address::{
    address_from_public_key, coerce_native, create_address, recover_address, wrapped_native,
};
pub use approval::{approve_calldata, Approval, Approver, WalletApprover};
pub use assembler::{assemble, AssemblerError, SwapParams};
pub use builder::{BuilderConfig, PreparedTransaction, TransactionBuilder, DEFAULT_GAS_HEADROOM};
pub use error::{ChainError, ChainResult};
pub use provider::{wait_for_receipt, CallRequest, ChainProvider, TransactionReceipt};
pub use rpc::{JsonRpcClient, JsonRpcProvider, RelayClient, DEFAULT_RELAY_URL};
pub use tx::{transaction_hash, Fees, TxSignature, UnsignedTransaction};
pub use wallet::{LocalWallet, TransactionRequest, Wallet};
