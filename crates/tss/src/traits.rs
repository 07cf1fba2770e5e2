//! Message-passing contract of the two-party ECDSA primitive.
//!
//! Key generation: P1 `step1 -> A`, P2 `step1(A) -> B`, P1 `step2(B) -> C`,
//! P2 `step2(C)`. Signing: P1 `step1 -> D`, P2 `step1(D) -> E`,
//! P1 `step2(E) -> F`, P2 `step2(F) -> G`, P1 `step3(G)`.
//! Messages are opaque bytes carried one per frame.

use crate::error::TssResult;
use crate::share::KeyShare;

/// A finished signature with big-endian scalars as the primitive returns them.
/// `r` and `s` may be shorter than 32 bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSignature {
    pub r: Vec<u8>,
    pub s: Vec<u8>,
    pub recovery_id: u8,
}

pub trait KeygenInitiator: Send {
    fn step1(&mut self) -> TssResult<Vec<u8>>;
    fn step2(&mut self, msg_b: &[u8]) -> TssResult<Vec<u8>>;
    fn export_key_share(&self) -> TssResult<KeyShare>;
}

pub trait KeygenResponder: Send {
    fn step1(&mut self, msg_a: &[u8]) -> TssResult<Vec<u8>>;
    fn step2(&mut self, msg_c: &[u8]) -> TssResult<()>;
    fn export_key_share(&self) -> TssResult<KeyShare>;
}

pub trait SignInitiator: Send {
    fn step1(&mut self) -> TssResult<Vec<u8>>;
    fn step2(&mut self, msg_e: &[u8]) -> TssResult<Vec<u8>>;
    fn step3(&mut self, msg_g: &[u8]) -> TssResult<()>;
    fn export_signature(&self) -> TssResult<RawSignature>;
}

pub trait SignResponder: Send {
    fn step1(&mut self, msg_d: &[u8]) -> TssResult<Vec<u8>>;
    fn step2(&mut self, msg_f: &[u8]) -> TssResult<Vec<u8>>;
}

/// Builds protocol sessions for one scheme.
pub trait TwoPartyEcdsa: Send + Sync {
    fn keygen_initiator(&self) -> Box<dyn KeygenInitiator>;

    fn keygen_responder(&self) -> Box<dyn KeygenResponder>;

    /// Signing session for a 32-byte prehash.
    fn sign_initiator(&self, share: &KeyShare, hash: [u8; 32]) -> TssResult<Box<dyn SignInitiator>>;

    fn sign_responder(&self, share: &KeyShare, hash: [u8; 32]) -> TssResult<Box<dyn SignResponder>>;
}
