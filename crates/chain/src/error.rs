//! Chain access error types.

use pintswap_types::Hash256;
use thiserror::Error;

use crate::assembler::AssemblerError;

#[derive(Debug, Error)]
pub enum ChainError {
    /// The node answered with a JSON-RPC error object.
    #[error("rpc error {code} in {method}: {message}")]
    Rpc {
        method: String,
        code: i64,
        message: String,
    },

    /// The request never produced a usable answer (connection, HTTP status).
    #[error("rpc transport failure in {method}: {reason}")]
    Transport { method: String, reason: String },

    #[error("invalid rpc response for {method}: {reason}")]
    InvalidResponse { method: String, reason: String },

    #[error("transaction {0:?} reverted")]
    Reverted(Hash256),

    #[error("contract creation transaction must not have a recipient")]
    NonEmptyRecipient,

    #[error("malformed transaction: {0}")]
    MalformedTransaction(String),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("no wrapped native token known for chain {0}")]
    NoWrappedNative(u64),

    #[error("contract assembly failed: {0}")]
    Assembly(#[from] AssemblerError),

    #[error("gas cost overflows 256 bits: {0}")]
    GasOverflow(&'static str),
}

impl ChainError {
    /// Failures worth retrying with the same request.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ChainError::Rpc { .. } | ChainError::Transport { .. } | ChainError::InvalidResponse { .. }
        )
    }
}

pub type ChainResult<T> = std::result::Result<T, ChainError>;
