//! Ethereum transaction encoding.
//!
//! Legacy transactions follow EIP-155. Fee-market transactions follow EIP-1559
//! with an empty access list.

use pintswap_types::{keccak256, Address, Hash256, U256};
use rlp::{DecoderError, Rlp, RlpStream};

use crate::error::{ChainError, ChainResult};

const EIP1559_TYPE: u8 = 0x02;

/// Fee fields of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fees {
    Legacy {
        gas_price: U256,
    },
    Eip1559 {
        max_priority_fee_per_gas: U256,
        max_fee_per_gas: U256,
    },
}

impl Fees {
    /// Zero-tip fee-market fees, paid for by a direct coinbase transfer.
    pub fn rebate(base_fee: U256) -> Self {
        Fees::Eip1559 {
            max_priority_fee_per_gas: U256::zero(),
            max_fee_per_gas: base_fee,
        }
    }

    /// True for zero-tip transactions that only a private relay will include.
    pub fn is_rebate(&self) -> bool {
        matches!(self, Fees::Eip1559 { max_priority_fee_per_gas, .. } if max_priority_fee_per_gas.is_zero())
    }

    /// Highest price per gas the sender may pay.
    pub fn max_gas_price(&self) -> U256 {
        match self {
            Fees::Legacy { gas_price } => *gas_price,
            Fees::Eip1559 {
                max_fee_per_gas, ..
            } => *max_fee_per_gas,
        }
    }
}

/// A recoverable ECDSA signature over a transaction sighash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxSignature {
    pub r: Hash256,
    pub s: Hash256,
    /// 0 or 1.
    pub recovery_id: u8,
}

impl TxSignature {
    /// Build from big-endian `r`/`s` of any length up to 32 bytes.
    pub fn from_parts(r: &[u8], s: &[u8], recovery_id: u8) -> ChainResult<Self> {
        Ok(Self {
            r: left_pad_32("r", r)?,
            s: left_pad_32("s", s)?,
            recovery_id,
        })
    }

    /// The `v` value in the 27/28 convention.
    pub fn v(&self) -> u8 {
        self.recovery_id + 27
    }

    fn eip155_v(&self, chain_id: u64) -> u64 {
        u64::from(self.recovery_id) + 35 + 2 * chain_id
    }
}

fn left_pad_32(field: &str, bytes: &[u8]) -> ChainResult<Hash256> {
    if bytes.len() > 32 {
        return Err(ChainError::Signing(format!(
            "{} is {} bytes, expected at most 32",
            field,
            bytes.len()
        )));
    }
    let mut out = [0u8; 32];
    out[32 - bytes.len()..].copy_from_slice(bytes);
    Ok(Hash256::from(out))
}

/// A transaction awaiting its signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransaction {
    pub chain_id: u64,
    pub nonce: u64,
    pub fees: Fees,
    pub gas_limit: U256,
    /// `None` creates a contract.
    pub to: Option<Address>,
    pub value: U256,
    pub data: Vec<u8>,
}

impl UnsignedTransaction {
    /// Fail with [`ChainError::NonEmptyRecipient`] unless this creates a contract.
    pub fn ensure_contract_creation(&self) -> ChainResult<()> {
        match self.to {
            None => Ok(()),
            Some(_) => Err(ChainError::NonEmptyRecipient),
        }
    }

    /// Serialization that the sighash is taken over.
    pub fn encode_unsigned(&self) -> Vec<u8> {
        self.encode(None)
    }

    pub fn sighash(&self) -> Hash256 {
        keccak256(&self.encode_unsigned())
    }

    /// Raw signed transaction ready for `eth_sendRawTransaction`.
    pub fn encode_signed(&self, signature: &TxSignature) -> Vec<u8> {
        self.encode(Some(signature))
    }

    fn encode(&self, signature: Option<&TxSignature>) -> Vec<u8> {
        match self.fees {
            Fees::Legacy { gas_price } => {
                let mut stream = RlpStream::new_list(9);
                stream.append(&self.nonce);
                stream.append(&gas_price);
                self.append_body(&mut stream);
                match signature {
                    Some(sig) => {
                        stream.append(&sig.eip155_v(self.chain_id));
                        append_word(&mut stream, &sig.r);
                        append_word(&mut stream, &sig.s);
                    }
                    None => {
                        stream.append(&self.chain_id);
                        stream.append(&0u8);
                        stream.append(&0u8);
                    }
                }
                stream.out().to_vec()
            }
            Fees::Eip1559 {
                max_priority_fee_per_gas,
                max_fee_per_gas,
            } => {
                let mut stream = RlpStream::new_list(if signature.is_some() { 12 } else { 9 });
                stream.append(&self.chain_id);
                stream.append(&self.nonce);
                stream.append(&max_priority_fee_per_gas);
                stream.append(&max_fee_per_gas);
                self.append_body(&mut stream);
                stream.begin_list(0);
                if let Some(sig) = signature {
                    stream.append(&sig.recovery_id);
                    append_word(&mut stream, &sig.r);
                    append_word(&mut stream, &sig.s);
                }
                let mut out = vec![EIP1559_TYPE];
                out.extend_from_slice(&stream.out());
                out
            }
        }
    }

    fn append_body(&self, stream: &mut RlpStream) {
        stream.append(&self.gas_limit);
        match &self.to {
            Some(to) => stream.append(to),
            None => stream.append_empty_data(),
        };
        stream.append(&self.value);
        stream.append(&self.data);
    }

    /// Decode an unsigned serialization produced by [`encode_unsigned`].
    ///
    /// [`encode_unsigned`]: UnsignedTransaction::encode_unsigned
    pub fn decode_unsigned(raw: &[u8]) -> ChainResult<Self> {
        match raw.first() {
            Some(&EIP1559_TYPE) => Self::decode_eip1559(&raw[1..]),
            Some(b) if *b >= 0xc0 => Self::decode_legacy(raw),
            Some(b) => Err(ChainError::MalformedTransaction(format!(
                "unsupported transaction type 0x{:02x}",
                b
            ))),
            None => Err(ChainError::MalformedTransaction("empty transaction".into())),
        }
    }

    fn decode_legacy(data: &[u8]) -> ChainResult<Self> {
        let rlp = Rlp::new(data);
        expect_list(&rlp, 9)?;
        if !decode_u256(&rlp, 7)?.is_zero() || !decode_u256(&rlp, 8)?.is_zero() {
            return Err(ChainError::MalformedTransaction(
                "legacy transaction is already signed".into(),
            ));
        }
        Ok(Self {
            nonce: decode_u64(&rlp, 0)?,
            fees: Fees::Legacy {
                gas_price: decode_u256(&rlp, 1)?,
            },
            gas_limit: decode_u256(&rlp, 2)?,
            to: decode_optional_address(&rlp, 3)?,
            value: decode_u256(&rlp, 4)?,
            data: decode_bytes(&rlp, 5)?,
            chain_id: decode_u64(&rlp, 6)?,
        })
    }

    fn decode_eip1559(data: &[u8]) -> ChainResult<Self> {
        let rlp = Rlp::new(data);
        expect_list(&rlp, 9)?;
        Ok(Self {
            chain_id: decode_u64(&rlp, 0)?,
            nonce: decode_u64(&rlp, 1)?,
            fees: Fees::Eip1559 {
                max_priority_fee_per_gas: decode_u256(&rlp, 2)?,
                max_fee_per_gas: decode_u256(&rlp, 3)?,
            },
            gas_limit: decode_u256(&rlp, 4)?,
            to: decode_optional_address(&rlp, 5)?,
            value: decode_u256(&rlp, 6)?,
            data: decode_bytes(&rlp, 7)?,
        })
    }
}

/// Hash under which a raw signed transaction is known to the network.
pub fn transaction_hash(raw_signed: &[u8]) -> Hash256 {
    keccak256(raw_signed)
}

fn append_word(stream: &mut RlpStream, word: &Hash256) {
    stream.append(&U256::from_big_endian(word.as_bytes()));
}

// Helper functions for RLP decoding

fn expect_list(rlp: &Rlp, items: usize) -> ChainResult<()> {
    if !rlp.is_list() {
        return Err(ChainError::MalformedTransaction("expected rlp list".into()));
    }
    let count = rlp.item_count().map_err(|e| rlp_error("item count", e))?;
    if count != items {
        return Err(ChainError::MalformedTransaction(format!(
            "expected {} fields, got {}",
            items, count
        )));
    }
    Ok(())
}

fn decode_u64(rlp: &Rlp, index: usize) -> ChainResult<u64> {
    rlp.at(index)
        .and_then(|r| r.as_val())
        .map_err(|e| rlp_error(&format!("field {}", index), e))
}

fn decode_u256(rlp: &Rlp, index: usize) -> ChainResult<U256> {
    let bytes = decode_bytes(rlp, index)?;
    if bytes.len() > 32 {
        return Err(ChainError::MalformedTransaction(format!(
            "field {} too large: {} bytes",
            index,
            bytes.len()
        )));
    }
    Ok(U256::from_big_endian(&bytes))
}

fn decode_bytes(rlp: &Rlp, index: usize) -> ChainResult<Vec<u8>> {
    rlp.at(index)
        .and_then(|r| r.as_val::<Vec<u8>>())
        .map_err(|e| rlp_error(&format!("field {}", index), e))
}

fn decode_optional_address(rlp: &Rlp, index: usize) -> ChainResult<Option<Address>> {
    let bytes = decode_bytes(rlp, index)?;
    match bytes.len() {
        0 => Ok(None),
        20 => Ok(Some(Address::from_slice(&bytes))),
        n => Err(ChainError::MalformedTransaction(format!(
            "invalid address length at field {}: {} bytes",
            index, n
        ))),
    }
}

fn rlp_error(field: &str, e: DecoderError) -> ChainError {
    ChainError::MalformedTransaction(format!("rlp decode error for {}: {:?}", field, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eip155_example() -> UnsignedTransaction {
        UnsignedTransaction {
            chain_id: 1,
            nonce: 9,
            fees: Fees::Legacy {
                gas_price: U256::from(20_000_000_000u64),
            },
            gas_limit: U256::from(21_000u64),
            to: Some(Address::repeat_byte(0x35)),
            value: U256::from(1_000_000_000_000_000_000u64),
            data: Vec::new(),
        }
    }

    #[test]
    fn test_eip155_signing_payload() {
        let tx = eip155_example();
        assert_eq!(
            hex::encode(tx.encode_unsigned()),
            "ec098504a817c800825208943535353535353535353535353535353535353535880de0b6b3a764000080018080"
        );
        assert_eq!(
            hex::encode(tx.sighash().as_bytes()),
            "daf5a779ae972f972197303d7b574746c7ef83eadac0f2791ad23db92e4c8e53"
        );
    }

    #[test]
    fn test_eip155_signed_encoding() {
        let tx = eip155_example();
        let sig = TxSignature::from_parts(
            &hex::decode("28ef61340bd939bc2195fe537567866003e1a15d3c71ff63e1590620aa636276").unwrap(),
            &hex::decode("67cbe9d8997f761aecb703304b3800ccf555c9f3dc64214b297fb1966a3b6d83").unwrap(),
            0,
        )
        .unwrap();
        assert_eq!(
            hex::encode(tx.encode_signed(&sig)),
            "f86c098504a817c800825208943535353535353535353535353535353535353535880de0b6b3a76400008025a028ef61340bd939bc2195fe537567866003e1a15d3c71ff63e1590620aa636276a067cbe9d8997f761aecb703304b3800ccf555c9f3dc64214b297fb1966a3b6d83"
        );
    }

    #[test]
    fn test_contract_creation_roundtrip() {
        let tx = UnsignedTransaction {
            chain_id: 5,
            nonce: 0,
            fees: Fees::Legacy {
                gas_price: U256::from(7u64),
            },
            gas_limit: U256::from(126_000u64),
            to: None,
            value: U256::zero(),
            data: vec![0x60, 0x00, 0xff],
        };
        assert!(tx.ensure_contract_creation().is_ok());
        assert_eq!(UnsignedTransaction::decode_unsigned(&tx.encode_unsigned()).unwrap(), tx);
    }

    #[test]
    fn test_eip1559_roundtrip_and_type() {
        let tx = UnsignedTransaction {
            chain_id: 1,
            nonce: 3,
            fees: Fees::rebate(U256::from(30_000_000_000u64)),
            gas_limit: U256::from(200_000u64),
            to: None,
            value: U256::zero(),
            data: vec![0xaa; 40],
        };
        let raw = tx.encode_unsigned();
        assert_eq!(raw[0], 0x02);
        assert!(tx.fees.is_rebate());
        assert_eq!(UnsignedTransaction::decode_unsigned(&raw).unwrap(), tx);

        let sig = TxSignature::from_parts(&[1], &[2], 1).unwrap();
        let signed = tx.encode_signed(&sig);
        assert_eq!(signed[0], 0x02);
        assert_ne!(signed, raw);
    }

    #[test]
    fn test_recipient_rejected() {
        let tx = eip155_example();
        assert!(matches!(
            tx.ensure_contract_creation(),
            Err(ChainError::NonEmptyRecipient)
        ));
    }

    #[test]
    fn test_signature_padding_and_v() {
        let sig = TxSignature::from_parts(&[0x01], &[0x02, 0x03], 1).unwrap();
        assert_eq!(sig.r.as_bytes()[31], 0x01);
        assert_eq!(sig.s.as_bytes()[30..], [0x02, 0x03]);
        assert_eq!(sig.v(), 28);
        assert!(TxSignature::from_parts(&[0u8; 33], &[1], 0).is_err());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(UnsignedTransaction::decode_unsigned(&[]).is_err());
        assert!(UnsignedTransaction::decode_unsigned(&[0x05, 0xc0]).is_err());
        assert!(UnsignedTransaction::decode_unsigned(&[0xc1, 0x80]).is_err());
    }

    #[test]
    fn test_fee_helpers() {
        let legacy = Fees::Legacy {
            gas_price: U256::from(9u64),
        };
        assert!(!legacy.is_rebate());
        assert_eq!(legacy.max_gas_price(), U256::from(9u64));
        assert_eq!(Fees::rebate(U256::from(4u64)).max_gas_price(), U256::from(4u64));
    }
}
