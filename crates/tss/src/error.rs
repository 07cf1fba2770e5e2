use thiserror::Error;

#[derive(Debug, Error)]
pub enum TssError {
    #[error("malformed {step} message: {reason}")]
    InvalidMessage { step: &'static str, reason: String },

    #[error("{0} called out of order")]
    OutOfOrder(&'static str),

    #[error("commitment does not open in {0}")]
    CommitmentMismatch(&'static str),

    #[error("counterparty share is inconsistent with the joint public key")]
    InconsistentShare,

    #[error("invalid key share: {0}")]
    InvalidKeyShare(String),

    #[error("joint signature does not verify: {0}")]
    InvalidSignature(String),

    #[error("key share serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type TssResult<T> = std::result::Result<T, TssError>;
