//! Schema messages, wire-compatible with the protobuf definitions:
//!
//! ```text
//! message Offer { bytes gives_token = 1; bytes gets_token = 2; bytes gives_amount = 3; bytes gets_amount = 4; }
//! message OfferList { repeated Offer offers = 1; }
//! message Fill { bytes offer_hash = 1; bytes amount = 2; }
//! message BatchFill { repeated Fill fills = 1; }
//! message NameQuery { string name = 1; }
//! message NameQueryResponse { int32 status = 1; string result = 2; }
//! message NameRegisterResponse { int32 status = 1; }
//! ```

use pintswap_types::{Address, Fill, Hash256, Offer, U256};

use crate::error::{CodecError, CodecResult};
use crate::wire::{put_bytes_field, put_varint_field, Field, FieldReader};

/// A message with a protobuf wire encoding.
pub trait WireMessage: Sized {
    fn encode_to(&self, buf: &mut Vec<u8>);

    fn decode(bytes: &[u8]) -> CodecResult<Self>;

    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode_to(&mut buf);
        buf
    }
}

// ============================================================================
// Scalar helpers
// ============================================================================

/// Minimal big-endian bytes; zero encodes as the empty string.
pub fn encode_amount(amount: &U256) -> Vec<u8> {
    let mut word = [0u8; 32];
    amount.to_big_endian(&mut word);
    let start = word.iter().position(|b| *b != 0).unwrap_or(32);
    word[start..].to_vec()
}

pub fn decode_amount(bytes: &[u8]) -> CodecResult<U256> {
    if bytes.len() > 32 {
        return Err(CodecError::invalid(
            "amount",
            format!("{} bytes exceeds 32", bytes.len()),
        ));
    }
    Ok(U256::from_big_endian(bytes))
}

pub fn encode_address(address: &Address) -> Vec<u8> {
    address.as_bytes().to_vec()
}

/// Addresses shorter than 20 bytes are left-padded with zeros.
pub fn decode_address(bytes: &[u8]) -> CodecResult<Address> {
    if bytes.len() > 20 {
        return Err(CodecError::invalid(
            "address",
            format!("{} bytes exceeds 20", bytes.len()),
        ));
    }
    let mut padded = [0u8; 20];
    padded[20 - bytes.len()..].copy_from_slice(bytes);
    Ok(Address::from(padded))
}

fn decode_hash(bytes: &[u8]) -> CodecResult<Hash256> {
    if bytes.len() > 32 {
        return Err(CodecError::invalid(
            "offer_hash",
            format!("{} bytes exceeds 32", bytes.len()),
        ));
    }
    let mut padded = [0u8; 32];
    padded[32 - bytes.len()..].copy_from_slice(bytes);
    Ok(Hash256::from(padded))
}

fn decode_string(field: &'static str, bytes: &[u8]) -> CodecResult<String> {
    String::from_utf8(bytes.to_vec()).map_err(|e| CodecError::invalid(field, e.to_string()))
}

fn expect_bytes<'a>(name: &'static str, value: Field<'a>) -> CodecResult<&'a [u8]> {
    match value {
        Field::Bytes(data) => Ok(data),
        _ => Err(CodecError::invalid(name, "expected length-delimited value")),
    }
}

fn expect_int32(name: &'static str, value: Field<'_>) -> CodecResult<i32> {
    match value {
        // int32 is sign-extended to 64 bits on the wire
        Field::Varint(v) => Ok(v as i64 as i32),
        _ => Err(CodecError::invalid(name, "expected varint value")),
    }
}

// ============================================================================
// Offers
// ============================================================================

impl WireMessage for Offer {
    fn encode_to(&self, buf: &mut Vec<u8>) {
        put_bytes_field(buf, 1, &encode_address(&self.gives_token));
        put_bytes_field(buf, 2, &encode_address(&self.gets_token));
        put_bytes_field(buf, 3, &encode_amount(&self.gives_amount));
        put_bytes_field(buf, 4, &encode_amount(&self.gets_amount));
    }

    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        let mut offer = Offer::new(Address::zero(), Address::zero(), 0u64, 0u64);
        let mut reader = FieldReader::new(bytes);
        while let Some((field, value)) = reader.next_field()? {
            match field {
                1 => offer.gives_token = decode_address(expect_bytes("gives_token", value)?)?,
                2 => offer.gets_token = decode_address(expect_bytes("gets_token", value)?)?,
                3 => offer.gives_amount = decode_amount(expect_bytes("gives_amount", value)?)?,
                4 => offer.gets_amount = decode_amount(expect_bytes("gets_amount", value)?)?,
                _ => {}
            }
        }
        Ok(offer)
    }
}

/// The offers a peer currently has listed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OfferList {
    pub offers: Vec<Offer>,
}

impl OfferList {
    pub fn new(offers: Vec<Offer>) -> Self {
        Self { offers }
    }
}

impl WireMessage for OfferList {
    fn encode_to(&self, buf: &mut Vec<u8>) {
        for offer in &self.offers {
            put_bytes_field(buf, 1, &offer.encode());
        }
    }

    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        let mut offers = Vec::new();
        let mut reader = FieldReader::new(bytes);
        while let Some((field, value)) = reader.next_field()? {
            if field == 1 {
                offers.push(Offer::decode(expect_bytes("offers", value)?)?);
            }
        }
        Ok(Self { offers })
    }
}

// ============================================================================
// Batch fills
// ============================================================================

impl WireMessage for Fill {
    fn encode_to(&self, buf: &mut Vec<u8>) {
        put_bytes_field(buf, 1, self.offer_hash.as_bytes());
        put_bytes_field(buf, 2, &encode_amount(&self.amount));
    }

    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        let mut fill = Fill::new(Hash256::zero(), 0u64);
        let mut reader = FieldReader::new(bytes);
        while let Some((field, value)) = reader.next_field()? {
            match field {
                1 => fill.offer_hash = decode_hash(expect_bytes("offer_hash", value)?)?,
                2 => fill.amount = decode_amount(expect_bytes("amount", value)?)?,
                _ => {}
            }
        }
        Ok(fill)
    }
}

/// A taker's request to fill one or more offers in one trade.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchFill {
    pub fills: Vec<Fill>,
}

impl BatchFill {
    pub fn new(fills: Vec<Fill>) -> Self {
        Self { fills }
    }

    pub fn hashes(&self) -> Vec<Hash256> {
        self.fills.iter().map(|f| f.offer_hash).collect()
    }
}

impl WireMessage for BatchFill {
    fn encode_to(&self, buf: &mut Vec<u8>) {
        for fill in &self.fills {
            put_bytes_field(buf, 1, &fill.encode());
        }
    }

    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        let mut fills = Vec::new();
        let mut reader = FieldReader::new(bytes);
        while let Some((field, value)) = reader.next_field()? {
            if field == 1 {
                fills.push(Fill::decode(expect_bytes("fills", value)?)?);
            }
        }
        Ok(Self { fills })
    }
}

// ============================================================================
// Name service
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameQuery {
    pub name: String,
}

impl WireMessage for NameQuery {
    fn encode_to(&self, buf: &mut Vec<u8>) {
        put_bytes_field(buf, 1, self.name.as_bytes());
    }

    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        let mut query = NameQuery::default();
        let mut reader = FieldReader::new(bytes);
        while let Some((field, value)) = reader.next_field()? {
            if field == 1 {
                query.name = decode_string("name", expect_bytes("name", value)?)?;
            }
        }
        Ok(query)
    }
}

/// `status == 0` means the name is not registered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameQueryResponse {
    pub status: i32,
    pub result: String,
}

impl WireMessage for NameQueryResponse {
    fn encode_to(&self, buf: &mut Vec<u8>) {
        put_varint_field(buf, 1, self.status as i64 as u64);
        put_bytes_field(buf, 2, self.result.as_bytes());
    }

    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        let mut response = NameQueryResponse::default();
        let mut reader = FieldReader::new(bytes);
        while let Some((field, value)) = reader.next_field()? {
            match field {
                1 => response.status = expect_int32("status", value)?,
                2 => response.result = decode_string("result", expect_bytes("result", value)?)?,
                _ => {}
            }
        }
        Ok(response)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameRegisterResponse {
    pub status: i32,
}

impl WireMessage for NameRegisterResponse {
    fn encode_to(&self, buf: &mut Vec<u8>) {
        put_varint_field(buf, 1, self.status as i64 as u64);
    }

    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        let mut response = NameRegisterResponse::default();
        let mut reader = FieldReader::new(bytes);
        while let Some((field, value)) = reader.next_field()? {
            if field == 1 {
                response.status = expect_int32("status", value)?;
            }
        }
        Ok(response)
    }
}
