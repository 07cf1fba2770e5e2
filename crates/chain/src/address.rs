//! Address derivation: shared threshold-key addresses, CREATE addresses and
//! wrapped-native token lookup.

use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::PublicKey;
use pintswap_types::{keccak256, Address, Hash256};
use rlp::RlpStream;

use crate::error::{ChainError, ChainResult};
use crate::tx::TxSignature;

const fn nibble(c: u8) -> u8 {
    match c {
        b'0'..=b'9' => c - b'0',
        b'a'..=b'f' => c - b'a' + 10,
        b'A'..=b'F' => c - b'A' + 10,
        _ => panic!("invalid hex digit"),
    }
}

/// Parse a `0x`-prefixed address literal at compile time.
pub const fn address_literal(s: &str) -> Address {
    let bytes = s.as_bytes();
    let mut out = [0u8; 20];
    let mut i = 0;
    while i < 20 {
        out[i] = (nibble(bytes[2 + 2 * i]) << 4) | nibble(bytes[3 + 2 * i]);
        i += 1;
    }
    Address(out)
}

pub const WETH_MAINNET: Address = address_literal("0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2");
pub const WETH_GOERLI: Address = address_literal("0xB4FBF271143F4FBf7B91A5ded31805e42b2208d6");
pub const WETH_SEPOLIA: Address = address_literal("0xfFf9976782d46CC05630D1f6eBAb18b2324d6B14");
pub const WETH_OP_STACK: Address = address_literal("0x4200000000000000000000000000000000000006");
pub const WETH_ARBITRUM: Address = address_literal("0x82aF49447D8a07e3bd95BD0d56f35241523fBab1");

/// Canonical wrapped-native token for a chain.
pub fn wrapped_native(chain_id: u64) -> Option<Address> {
    match chain_id {
        1 => Some(WETH_MAINNET),
        5 => Some(WETH_GOERLI),
        11155111 => Some(WETH_SEPOLIA),
        10 | 8453 => Some(WETH_OP_STACK),
        42161 => Some(WETH_ARBITRUM),
        _ => None,
    }
}

/// Replace the zero address (native currency) with the wrapped-native token.
pub fn coerce_native(token: Address, wrapped: Address) -> Address {
    if token.is_zero() {
        wrapped
    } else {
        token
    }
}

/// Ethereum address of a secp256k1 public key in any SEC1 encoding.
pub fn address_from_public_key(sec1: &[u8]) -> ChainResult<Address> {
    let key = PublicKey::from_sec1_bytes(sec1)
        .map_err(|e| ChainError::InvalidPublicKey(e.to_string()))?;
    Ok(address_from_point(&key.to_encoded_point(false).as_bytes()[1..]))
}

fn address_from_point(uncompressed_xy: &[u8]) -> Address {
    Address::from_slice(&keccak256(uncompressed_xy).as_bytes()[12..])
}

/// Address of the contract created by `sender`'s transaction with `nonce`.
pub fn create_address(sender: &Address, nonce: u64) -> Address {
    let mut stream = RlpStream::new_list(2);
    stream.append(sender);
    stream.append(&nonce);
    Address::from_slice(&keccak256(&stream.out()).as_bytes()[12..])
}

/// Recover the signer of a 32-byte prehash.
pub fn recover_address(prehash: &Hash256, signature: &TxSignature) -> ChainResult<Address> {
    let mut rs = [0u8; 64];
    rs[..32].copy_from_slice(signature.r.as_bytes());
    rs[32..].copy_from_slice(signature.s.as_bytes());
    let sig = Signature::from_slice(&rs).map_err(|e| ChainError::Signing(e.to_string()))?;
    let recovery_id = RecoveryId::from_byte(signature.recovery_id)
        .ok_or_else(|| ChainError::Signing(format!("bad recovery id {}", signature.recovery_id)))?;
    let key = VerifyingKey::recover_from_prehash(prehash.as_bytes(), &sig, recovery_id)
        .map_err(|e| ChainError::Signing(e.to_string()))?;
    Ok(address_from_point(&key.to_encoded_point(false).as_bytes()[1..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex_address(s: &str) -> Address {
        Address::from_slice(&hex::decode(s).unwrap())
    }

    #[test]
    fn test_address_from_generator() {
        // secret key 1
        let mut g = vec![0x04];
        g.extend(hex::decode("79be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798").unwrap());
        g.extend(hex::decode("483ada7726a3c4655da4fbfc0e1108a8fd17b448a68554199c47d08ffb10d4b8").unwrap());
        let expected = hex_address("7e5f4552091a69125d5dfcb7b8c2659029395bdf");
        assert_eq!(address_from_public_key(&g).unwrap(), expected);

        let compressed =
            hex::decode("0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798").unwrap();
        assert_eq!(address_from_public_key(&compressed).unwrap(), expected);
    }

    #[test]
    fn test_create_address() {
        let sender = hex_address("6ac7ea33f8831ea9dcc53393aaa88b25a785dbf0");
        assert_eq!(
            create_address(&sender, 0),
            hex_address("cd234a471b72ba2f1ccf0a70fcaba648a5eecd8d")
        );
        assert_eq!(
            create_address(&sender, 1),
            hex_address("343c43a37d37dff08ae8c4a11544c718abb4fcf8")
        );
    }

    #[test]
    fn test_wrapped_native() {
        assert_eq!(
            wrapped_native(1),
            Some(hex_address("c02aaa39b223fe8d0a0e5c4f27ead9083c756cc2"))
        );
        assert_eq!(wrapped_native(8453), wrapped_native(10));
        assert_eq!(wrapped_native(31337), None);
    }

    #[test]
    fn test_coerce_native() {
        let weth = WETH_MAINNET;
        let token = Address::repeat_byte(5);
        assert_eq!(coerce_native(Address::zero(), weth), weth);
        assert_eq!(coerce_native(token, weth), token);
    }

    #[test]
    fn test_invalid_public_key() {
        assert!(address_from_public_key(&[0x02; 10]).is_err());
    }
}
