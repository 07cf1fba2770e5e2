//! Ethereum primitives shared by every crate.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

pub use primitive_types::{H160 as Address, H256 as Hash256, U256};

/// Keccak-256 digest of `data`.
pub fn keccak256(data: &[u8]) -> Hash256 {
    Hash256::from_slice(&Keccak256::digest(data))
}

/// Identifier of a remote peer as understood by the transport layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PeerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keccak_empty_input() {
        assert_eq!(
            hex::encode(keccak256(&[]).as_bytes()),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_peer_id_display() {
        let peer = PeerId::from("QmPeer");
        assert_eq!(peer.to_string(), "QmPeer");
        assert_eq!(peer.as_str(), "QmPeer");
    }
}
