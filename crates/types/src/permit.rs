//! Off-chain transfer authorizations that substitute for an approval
//! transaction.

use serde::{Deserialize, Serialize};

use crate::primitives::{Address, Hash256, U256};

/// Canonical Permit2 deployment, identical on every supported chain.
pub const PERMIT2_ADDRESS: Address = Address([
    0x00, 0x00, 0x00, 0x00, 0x00, 0x22, 0xd4, 0x73, 0x03, 0x0f, 0x11, 0x6d, 0xde, 0xe9, 0xf6,
    0xb4, 0x3a, 0xc7, 0x8b, 0xa3,
]);

/// A 65-byte secp256k1 signature in `r ‖ s ‖ v` order, `v` in {27, 28}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoverableSignature {
    pub r: Hash256,
    pub s: Hash256,
    pub v: u8,
}

impl RecoverableSignature {
    pub const LEN: usize = 65;

    pub fn to_bytes(&self) -> [u8; 65] {
        let mut out = [0u8; 65];
        out[..32].copy_from_slice(self.r.as_bytes());
        out[32..64].copy_from_slice(self.s.as_bytes());
        out[64] = self.v;
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::LEN {
            return None;
        }
        Some(Self {
            r: Hash256::from_slice(&bytes[..32]),
            s: Hash256::from_slice(&bytes[32..64]),
            v: bytes[64],
        })
    }
}

/// EIP-2612 `permit` on the token itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eip2612Permit {
    pub token: Address,
    pub owner: Address,
    pub spender: Address,
    pub value: U256,
    pub nonce: U256,
    pub deadline: U256,
    pub signature: RecoverableSignature,
}

/// Permit2 signature transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permit2Transfer {
    pub token: Address,
    pub owner: Address,
    pub spender: Address,
    pub amount: U256,
    pub nonce: U256,
    pub deadline: U256,
    pub signature: RecoverableSignature,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Permit {
    Eip2612(Eip2612Permit),
    Permit2(Permit2Transfer),
}

impl Permit {
    pub fn owner(&self) -> Address {
        match self {
            Permit::Eip2612(p) => p.owner,
            Permit::Permit2(p) => p.owner,
        }
    }

    pub fn token(&self) -> Address {
        match self {
            Permit::Eip2612(p) => p.token,
            Permit::Permit2(p) => p.token,
        }
    }
}

/// Permits supplied by either side of a trade.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradePermits {
    pub maker: Option<Permit>,
    pub taker: Option<Permit>,
}
