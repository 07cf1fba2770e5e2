//! Protobuf wire-format primitives.

use bytes::{Buf, BufMut};

use crate::error::{CodecError, CodecResult};

const WIRE_VARINT: u8 = 0;
const WIRE_FIXED64: u8 = 1;
const WIRE_LEN: u8 = 2;
const WIRE_FIXED32: u8 = 5;

pub(crate) fn put_varint(buf: &mut impl BufMut, mut value: u64) {
    while value >= 0x80 {
        buf.put_u8((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

pub(crate) fn get_varint(buf: &mut impl Buf) -> CodecResult<u64> {
    let mut value = 0u64;
    for shift in (0..64).step_by(7) {
        if !buf.has_remaining() {
            return Err(CodecError::Truncated("varint"));
        }
        let byte = buf.get_u8();
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(CodecError::VarintOverflow)
}

fn put_key(buf: &mut impl BufMut, field: u32, wire_type: u8) {
    put_varint(buf, (u64::from(field) << 3) | u64::from(wire_type));
}

pub(crate) fn put_bytes_field(buf: &mut impl BufMut, field: u32, data: &[u8]) {
    put_key(buf, field, WIRE_LEN);
    put_varint(buf, data.len() as u64);
    buf.put_slice(data);
}

pub(crate) fn put_varint_field(buf: &mut impl BufMut, field: u32, value: u64) {
    put_key(buf, field, WIRE_VARINT);
    put_varint(buf, value);
}

/// A decoded field value. Fixed-width scalars are skipped since no
/// message in the schema uses them.
pub(crate) enum Field<'a> {
    Varint(u64),
    Bytes(&'a [u8]),
    Skipped,
}

/// Walks the fields of one encoded message.
pub(crate) struct FieldReader<'a> {
    buf: &'a [u8],
}

impl<'a> FieldReader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub(crate) fn next_field(&mut self) -> CodecResult<Option<(u32, Field<'a>)>> {
        if self.buf.is_empty() {
            return Ok(None);
        }

        let key = get_varint(&mut self.buf)?;
        let field = (key >> 3) as u32;
        let wire_type = (key & 0x7) as u8;

        let value = match wire_type {
            WIRE_VARINT => Field::Varint(get_varint(&mut self.buf)?),
            WIRE_LEN => {
                let len = get_varint(&mut self.buf)? as usize;
                if self.buf.len() < len {
                    return Err(CodecError::Truncated("length-delimited field"));
                }
                let (data, rest) = self.buf.split_at(len);
                self.buf = rest;
                Field::Bytes(data)
            }
            WIRE_FIXED64 => self.skip(8)?,
            WIRE_FIXED32 => self.skip(4)?,
            other => {
                return Err(CodecError::UnsupportedWireType {
                    field,
                    wire_type: other,
                })
            }
        };

        Ok(Some((field, value)))
    }

    fn skip(&mut self, n: usize) -> CodecResult<Field<'a>> {
        if self.buf.len() < n {
            return Err(CodecError::Truncated("fixed-width field"));
        }
        self.buf = &self.buf[n..];
        Ok(Field::Skipped)
    }
}
