//! Shared types for PintSwap.
//!
//! Offers are the unit of trade intent: a maker advertises that it gives a
//! fixed amount of one token for a fixed amount of another. Offers are
//! identified by a packed keccak hash that every peer computes identically.

pub mod error;
pub mod offer;
pub mod permit;
pub mod primitives;

pub use error::{OfferError, OfferResult};
pub use offer::{Fill, Offer};
pub use permit::{
    Eip2612Permit, Permit, Permit2Transfer, RecoverableSignature, TradePermits, PERMIT2_ADDRESS,
};
pub use primitives::{keccak256, Address, Hash256, PeerId, U256};
