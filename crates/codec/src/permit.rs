//! Permit payloads carried in the permit-or-empty trade frames.
//!
//! ```text
//! kind(1) | token(20) | owner(20) | spender(20) | amount(32) | nonce(32) | deadline(32) | r(32) s(32) v(1)
//! ```
//!
//! `kind` is 1 for EIP-2612 and 2 for Permit2. An empty frame means no permit.

use pintswap_types::{
    Address, Eip2612Permit, Permit, Permit2Transfer, RecoverableSignature, U256,
};

use crate::error::{CodecError, CodecResult};

const KIND_EIP2612: u8 = 1;
const KIND_PERMIT2: u8 = 2;

/// Encoded length of a non-empty permit payload.
pub const PERMIT_PAYLOAD_LEN: usize = 1 + 20 * 3 + 32 * 3 + RecoverableSignature::LEN;

pub fn encode_permit(permit: Option<&Permit>) -> Vec<u8> {
    let Some(permit) = permit else {
        return Vec::new();
    };

    let (kind, token, owner, spender, amount, nonce, deadline, signature) = match permit {
        Permit::Eip2612(p) => (
            KIND_EIP2612,
            p.token,
            p.owner,
            p.spender,
            p.value,
            p.nonce,
            p.deadline,
            p.signature,
        ),
        Permit::Permit2(p) => (
            KIND_PERMIT2,
            p.token,
            p.owner,
            p.spender,
            p.amount,
            p.nonce,
            p.deadline,
            p.signature,
        ),
    };

    let mut out = Vec::with_capacity(PERMIT_PAYLOAD_LEN);
    out.push(kind);
    for address in [token, owner, spender] {
        out.extend_from_slice(address.as_bytes());
    }
    for word in [amount, nonce, deadline] {
        let mut buf = [0u8; 32];
        word.to_big_endian(&mut buf);
        out.extend_from_slice(&buf);
    }
    out.extend_from_slice(&signature.to_bytes());
    out
}

pub fn decode_permit(bytes: &[u8]) -> CodecResult<Option<Permit>> {
    if bytes.is_empty() {
        return Ok(None);
    }
    if bytes.len() != PERMIT_PAYLOAD_LEN {
        return Err(CodecError::invalid(
            "permit",
            format!("expected {} bytes, got {}", PERMIT_PAYLOAD_LEN, bytes.len()),
        ));
    }

    let kind = bytes[0];
    let address = |i: usize| Address::from_slice(&bytes[1 + 20 * i..21 + 20 * i]);
    let word = |i: usize| U256::from_big_endian(&bytes[61 + 32 * i..93 + 32 * i]);
    let signature = RecoverableSignature::from_bytes(&bytes[157..])
        .ok_or_else(|| CodecError::invalid("permit", "bad signature length"))?;

    let (token, owner, spender) = (address(0), address(1), address(2));
    let (amount, nonce, deadline) = (word(0), word(1), word(2));

    match kind {
        KIND_EIP2612 => Ok(Some(Permit::Eip2612(Eip2612Permit {
            token,
            owner,
            spender,
            value: amount,
            nonce,
            deadline,
            signature,
        }))),
        KIND_PERMIT2 => Ok(Some(Permit::Permit2(Permit2Transfer {
            token,
            owner,
            spender,
            amount,
            nonce,
            deadline,
            signature,
        }))),
        other => Err(CodecError::invalid(
            "permit",
            format!("unknown permit kind {}", other),
        )),
    }
}
