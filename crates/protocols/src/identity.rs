//! Node identity for the TCP transport.
//!
//! A peer id is the `0x`-prefixed Ethereum address of a secp256k1 key. A
//! dialer proves it holds that key by signing the listener's hello nonce.

use k256::ecdsa::SigningKey;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use pintswap_chain::{recover_address, TxSignature};
use pintswap_types::{keccak256, Address, Hash256, PeerId};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::{NetworkError, NetworkResult};

const HELLO_DOMAIN: &[u8] = b"pintswap/hello";

pub const HELLO_NONCE_LEN: usize = 32;

/// `r ‖ s ‖ recovery id`.
pub const HELLO_SIGNATURE_LEN: usize = 65;

#[derive(Clone)]
pub struct Identity {
    key: SigningKey,
    peer_id: PeerId,
}

impl Identity {
    pub fn new(key: SigningKey) -> Self {
        let point = key.verifying_key().to_encoded_point(false);
        let address = Address::from_slice(&keccak256(&point.as_bytes()[1..]).as_bytes()[12..]);
        Self {
            key,
            peer_id: peer_id_for(&address),
        }
    }

    pub fn random() -> Self {
        Self::new(SigningKey::random(&mut OsRng))
    }

    pub fn from_hex(secret: &str) -> NetworkResult<Self> {
        let bytes = hex::decode(secret.trim().trim_start_matches("0x"))
            .map_err(|e| NetworkError::Identity(format!("invalid key hex: {}", e)))?;
        let key = SigningKey::from_slice(&bytes)
            .map_err(|e| NetworkError::Identity(format!("invalid key: {}", e)))?;
        Ok(Self::new(key))
    }

    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    /// Sign the hello for a stream to `listener` on `protocol`.
    pub fn sign_hello(
        &self,
        listener: &PeerId,
        nonce: &[u8],
        protocol: &str,
    ) -> NetworkResult<Vec<u8>> {
        let digest = hello_digest(listener, nonce, protocol);
        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(digest.as_bytes())
            .map_err(|e| NetworkError::Identity(e.to_string()))?;
        let mut out = signature.to_bytes().to_vec();
        out.push(recovery_id.to_byte());
        Ok(out)
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("peer_id", &self.peer_id)
            .finish_non_exhaustive()
    }
}

pub fn peer_id_for(address: &Address) -> PeerId {
    PeerId::new(format!("0x{}", hex::encode(address.as_bytes())))
}

pub fn random_nonce() -> [u8; HELLO_NONCE_LEN] {
    let mut nonce = [0u8; HELLO_NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Check that `signature` over the hello was made by the key behind `claimed`.
pub fn verify_hello(
    claimed: &PeerId,
    listener: &PeerId,
    nonce: &[u8],
    protocol: &str,
    signature: &[u8],
) -> NetworkResult<()> {
    if signature.len() != HELLO_SIGNATURE_LEN {
        return Err(NetworkError::Handshake(format!(
            "hello signature is {} bytes",
            signature.len()
        )));
    }
    let signature = TxSignature::from_parts(&signature[..32], &signature[32..64], signature[64])
        .map_err(|e| NetworkError::Handshake(e.to_string()))?;
    let signer = recover_address(&hello_digest(listener, nonce, protocol), &signature)
        .map_err(|e| NetworkError::Handshake(e.to_string()))?;
    if peer_id_for(&signer) != *claimed {
        return Err(NetworkError::Handshake(format!(
            "hello for {} signed by {}",
            claimed,
            peer_id_for(&signer)
        )));
    }
    Ok(())
}

fn hello_digest(listener: &PeerId, nonce: &[u8], protocol: &str) -> Hash256 {
    let mut preimage = Vec::with_capacity(
        HELLO_DOMAIN.len() + listener.as_str().len() + nonce.len() + protocol.len() + 2,
    );
    preimage.extend_from_slice(HELLO_DOMAIN);
    preimage.extend_from_slice(listener.as_str().as_bytes());
    preimage.push(0);
    preimage.extend_from_slice(nonce);
    preimage.push(0);
    preimage.extend_from_slice(protocol.as_bytes());
    keccak256(&preimage)
}
