//! Offer model errors.

use primitive_types::U256;
use thiserror::Error;

/// Errors raised while scaling or merging offers.
///
/// These reject a single fill request and never affect other trades.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OfferError {
    #[error("fill amount {requested} exceeds offer capacity {available}")]
    CapacityExceeded { requested: U256, available: U256 },

    #[error("offers do not share a single token pair")]
    MixedPair,

    #[error("offer amount overflows 256 bits")]
    Overflow,

    #[error("cannot merge an empty batch")]
    Empty,
}

pub type OfferResult<T> = std::result::Result<T, OfferError>;
