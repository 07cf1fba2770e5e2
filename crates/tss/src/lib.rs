//! Two-party threshold ECDSA as seen by the trade coordinator.
//!
//! The coordinator only moves opaque messages between the steps defined in
//! [`traits`]. [`CleartextEcdsa`] implements them with real secp256k1
//! arithmetic; a deployment that needs secrecy of the shares plugs a
//! Lindell-style scheme in behind [`TwoPartyEcdsa`].

pub mod cleartext;
pub mod error;
pub mod share;
pub mod traits;

pub use cleartext::CleartextEcdsa;
pub use error::{TssError, TssResult};
pub use share::{KeyShare, Party};
pub use traits::{
    KeygenInitiator, KeygenResponder, RawSignature, SignInitiator, SignResponder, TwoPartyEcdsa,
};
