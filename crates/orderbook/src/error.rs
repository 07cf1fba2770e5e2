//! Orderbook error types.

use pintswap_types::Hash256;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderbookError {
    /// No listed offer has this hash, or it is already reserved by another trade.
    #[error("unknown offer {0:?}")]
    UnknownOffer(Hash256),
}

pub type OrderbookResult<T> = std::result::Result<T, OrderbookError>;
