//! Offer storage for a PintSwap node.
//!
//! [`Orderbook`] holds the offers this node makes. Fills reserve offers
//! atomically and failed trades restore them. [`PeerOfferCache`] tracks what
//! remote peers announce.

mod book;
mod cache;
pub mod error;

pub use book::Orderbook;
pub use cache::PeerOfferCache;
pub use error::{OrderbookError, OrderbookResult};
