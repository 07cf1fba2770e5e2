//! Swap contract assembler.
//!
//! Emits the init code of the single-use settlement contract. The code runs
//! once, inside the creation transaction signed by the shared key:
//!
//! 1. move `gives_amount` of `gives_token` from maker to taker
//! 2. move `gets_amount` of `gets_token` from taker to maker
//! 3. optionally pay the block's fee recipient
//! 4. `SELFDESTRUCT` to the maker
//!
//! Any failed call jumps to a shared revert block. Both peers assemble the
//! contract independently and compare the bytes, so the output depends only
//! on [`SwapParams`].

use std::collections::HashMap;

use pintswap_types::{
    Address, Eip2612Permit, Offer, Permit, Permit2Transfer, TradePermits, PERMIT2_ADDRESS, U256,
};
use thiserror::Error;

use crate::address::coerce_native;

const TRANSFER_FROM: u32 = 0x23b872dd;
const PERMIT_EIP2612: u32 = 0xd505accf;
const PERMIT2_TRANSFER_FROM: u32 = 0x30f28b7a;

/// Scratch word that receives ERC-20 return data.
const RETURN_BUFFER: u8 = 0x80;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblerError {
    #[error("contract exceeds jump range: {0} bytes")]
    CodeTooLarge(usize),

    #[error("jump to undefined label {0:?}")]
    UndefinedLabel(Label),
}

/// The subset of EVM opcodes the settlement contract uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    IsZero = 0x15,
    Shl = 0x1B,
    Address = 0x30,
    Coinbase = 0x41,
    MLoad = 0x51,
    MStore = 0x52,
    JumpI = 0x57,
    Gas = 0x5A,
    JumpDest = 0x5B,
    Push1 = 0x60,
    Push2 = 0x61,
    Dup1 = 0x80,
    Call = 0xF1,
    Revert = 0xFD,
    SelfDestruct = 0xFF,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Label {
    Revert,
}

/// Everything the settlement contract depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapParams {
    /// The merged offer being settled.
    pub offer: Offer,
    pub maker: Address,
    pub taker: Address,
    pub permits: TradePermits,
    /// Amount paid to `block.coinbase` after both transfers.
    pub pay_coinbase: Option<U256>,
    /// Replaces the zero address on either side of the offer.
    pub wrapped_native: Address,
}

/// Assemble the settlement contract init code.
pub fn assemble(params: &SwapParams) -> Result<Vec<u8>, AssemblerError> {
    let mut asm = Assembler::default();
    let gives_token = coerce_native(params.offer.gives_token, params.wrapped_native);
    let gets_token = coerce_native(params.offer.gets_token, params.wrapped_native);

    asm.transfer_leg(
        gives_token,
        params.maker,
        params.taker,
        params.offer.gives_amount,
        params.permits.maker.as_ref(),
    );
    asm.transfer_leg(
        gets_token,
        params.taker,
        params.maker,
        params.offer.gets_amount,
        params.permits.taker.as_ref(),
    );

    if let Some(amount) = params.pay_coinbase {
        asm.pay_coinbase(amount);
    }

    asm.push_address(params.maker);
    asm.op(Opcode::SelfDestruct);

    asm.mark(Label::Revert);
    asm.push_u8(0);
    asm.op(Opcode::Dup1);
    asm.op(Opcode::Revert);

    asm.finish()
}

#[derive(Default)]
struct Assembler {
    code: Vec<u8>,
    labels: HashMap<Label, usize>,
    fixups: Vec<(usize, Label)>,
}

impl Assembler {
    fn op(&mut self, op: Opcode) {
        self.code.push(op as u8);
    }

    /// Shortest `PUSHn` for `bytes` with leading zeros stripped; zero is `PUSH1 0`.
    fn push_bytes(&mut self, bytes: &[u8]) {
        let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
        let trimmed = if start == bytes.len() {
            &[0u8][..]
        } else {
            &bytes[start..]
        };
        self.code.push(Opcode::Push1 as u8 + (trimmed.len() as u8 - 1));
        self.code.extend_from_slice(trimmed);
    }

    fn push_u8(&mut self, value: u8) {
        self.push_bytes(&[value]);
    }

    fn push_u32(&mut self, value: u32) {
        self.push_bytes(&value.to_be_bytes());
    }

    fn push_u256(&mut self, value: U256) {
        let mut word = [0u8; 32];
        value.to_big_endian(&mut word);
        self.push_bytes(&word);
    }

    /// Addresses always take the full `PUSH20`.
    fn push_address(&mut self, address: Address) {
        self.code.push(Opcode::Push1 as u8 + 19);
        self.code.extend_from_slice(address.as_bytes());
    }

    fn push_label(&mut self, label: Label) {
        self.op(Opcode::Push2);
        self.fixups.push((self.code.len(), label));
        self.code.extend_from_slice(&[0, 0]);
    }

    fn mark(&mut self, label: Label) {
        self.labels.insert(label, self.code.len());
        self.op(Opcode::JumpDest);
    }

    fn finish(mut self) -> Result<Vec<u8>, AssemblerError> {
        if self.code.len() > usize::from(u16::MAX) {
            return Err(AssemblerError::CodeTooLarge(self.code.len()));
        }
        for (at, label) in &self.fixups {
            let target = *self
                .labels
                .get(label)
                .ok_or(AssemblerError::UndefinedLabel(*label))?;
            self.code[*at..*at + 2].copy_from_slice(&(target as u16).to_be_bytes());
        }
        Ok(self.code)
    }

    fn revert_if_zero(&mut self) {
        self.op(Opcode::IsZero);
        self.push_label(Label::Revert);
        self.op(Opcode::JumpI);
    }

    // ------------------------------------------------------------------------
    // Memory helpers
    // ------------------------------------------------------------------------

    fn store_selector(&mut self, selector: u32) {
        self.push_u32(selector);
        self.push_u8(0xe0);
        self.op(Opcode::Shl);
        self.push_u8(0);
        self.op(Opcode::MStore);
    }

    fn store_u256(&mut self, offset: u16, value: U256) {
        self.push_u256(value);
        self.push_bytes(&offset.to_be_bytes());
        self.op(Opcode::MStore);
    }

    fn store_address(&mut self, offset: u16, address: Address) {
        self.push_address(address);
        self.push_bytes(&offset.to_be_bytes());
        self.op(Opcode::MStore);
    }

    fn store_self(&mut self, offset: u16) {
        self.op(Opcode::Address);
        self.push_bytes(&offset.to_be_bytes());
        self.op(Opcode::MStore);
    }

    /// `CALL(gas, target, value, 0, args_len, ret_offset, ret_len)` followed
    /// by a revert on failure.
    fn call(&mut self, target: Option<Address>, value: U256, args_len: u16, ret: Option<u8>) {
        let (ret_offset, ret_len) = match ret {
            Some(offset) => (offset, 0x20),
            None => (0, 0),
        };
        self.push_u8(ret_len);
        self.push_u8(ret_offset);
        self.push_bytes(&args_len.to_be_bytes());
        self.push_u8(0);
        self.push_u256(value);
        match target {
            Some(address) => self.push_address(address),
            None => self.op(Opcode::Coinbase),
        }
        self.op(Opcode::Gas);
        self.op(Opcode::Call);
        self.revert_if_zero();
    }

    // ------------------------------------------------------------------------
    // Contract sections
    // ------------------------------------------------------------------------

    fn transfer_leg(
        &mut self,
        token: Address,
        from: Address,
        to: Address,
        amount: U256,
        permit: Option<&Permit>,
    ) {
        match permit {
            Some(Permit::Permit2(p)) => self.permit2_transfer(token, from, to, amount, p),
            Some(Permit::Eip2612(p)) => {
                self.eip2612_permit(token, from, p);
                self.transfer_from(token, from, to, amount);
            }
            None => self.transfer_from(token, from, to, amount),
        }
    }

    /// `token.transferFrom(from, to, amount)`; a returned `false` reverts and
    /// tokens that return nothing count as success.
    fn transfer_from(&mut self, token: Address, from: Address, to: Address, amount: U256) {
        self.store_selector(TRANSFER_FROM);
        self.store_address(0x04, from);
        self.store_address(0x24, to);
        self.store_u256(0x44, amount);
        self.store_u256(RETURN_BUFFER.into(), U256::one());
        self.call(Some(token), U256::zero(), 0x64, Some(RETURN_BUFFER));
        self.push_u8(RETURN_BUFFER);
        self.op(Opcode::MLoad);
        self.revert_if_zero();
    }

    /// `token.permit(owner, address(this), value, deadline, v, r, s)`.
    fn eip2612_permit(&mut self, token: Address, owner: Address, p: &Eip2612Permit) {
        self.store_selector(PERMIT_EIP2612);
        self.store_address(0x04, owner);
        self.store_self(0x24);
        self.store_u256(0x44, p.value);
        self.store_u256(0x64, p.deadline);
        self.store_u256(0x84, U256::from(p.signature.v));
        self.store_u256(0xa4, U256::from_big_endian(p.signature.r.as_bytes()));
        self.store_u256(0xc4, U256::from_big_endian(p.signature.s.as_bytes()));
        self.call(Some(token), U256::zero(), 0xe4, None);
    }

    /// `Permit2.permitTransferFrom(((token, amount), nonce, deadline), (to, requested), owner, signature)`.
    fn permit2_transfer(
        &mut self,
        token: Address,
        owner: Address,
        to: Address,
        requested: U256,
        p: &Permit2Transfer,
    ) {
        self.store_selector(PERMIT2_TRANSFER_FROM);
        self.store_address(0x04, token);
        self.store_u256(0x24, p.amount);
        self.store_u256(0x44, p.nonce);
        self.store_u256(0x64, p.deadline);
        self.store_address(0x84, to);
        self.store_u256(0xa4, requested);
        self.store_address(0xc4, owner);
        // dynamic `bytes signature` starts after the eight head words
        self.store_u256(0xe4, U256::from(0x100));
        self.store_u256(0x104, U256::from(65));
        self.store_u256(0x124, U256::from_big_endian(p.signature.r.as_bytes()));
        self.store_u256(0x144, U256::from_big_endian(p.signature.s.as_bytes()));
        self.store_u256(0x164, U256::from(p.signature.v) << 248usize);
        self.call(Some(PERMIT2_ADDRESS), U256::zero(), 0x184, None);
    }

    fn pay_coinbase(&mut self, amount: U256) {
        self.call(None, amount, 0, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pintswap_types::{Hash256, RecoverableSignature};

    fn base() -> SwapParams {
        SwapParams {
            offer: Offer::new(Address::repeat_byte(0x11), Address::repeat_byte(0x22), 100u64, 50u64),
            maker: Address::repeat_byte(0xaa),
            taker: Address::repeat_byte(0xbb),
            permits: TradePermits::default(),
            pay_coinbase: None,
            wrapped_native: Address::repeat_byte(0xee),
        }
    }

    fn signature() -> RecoverableSignature {
        RecoverableSignature {
            r: Hash256::repeat_byte(1),
            s: Hash256::repeat_byte(2),
            v: 27,
        }
    }

    fn eip2612(owner: Address) -> Permit {
        Permit::Eip2612(Eip2612Permit {
            token: Address::repeat_byte(0x11),
            owner,
            spender: Address::repeat_byte(0xcc),
            value: U256::from(100u64),
            nonce: U256::zero(),
            deadline: U256::from(1_000u64),
            signature: signature(),
        })
    }

    fn permit2(owner: Address) -> Permit {
        Permit::Permit2(Permit2Transfer {
            token: Address::repeat_byte(0x22),
            owner,
            spender: Address::repeat_byte(0xcc),
            amount: U256::from(50u64),
            nonce: U256::from(3u64),
            deadline: U256::from(1_000u64),
            signature: signature(),
        })
    }

    /// Opcode positions, skipping push immediates.
    fn instructions(code: &[u8]) -> Vec<usize> {
        let mut positions = Vec::new();
        let mut pc = 0;
        while pc < code.len() {
            positions.push(pc);
            let op = code[pc];
            pc += if (0x60..=0x7f).contains(&op) {
                1 + usize::from(op - 0x5f)
            } else {
                1
            };
        }
        positions
    }

    /// Destinations of every `PUSH2 target; JUMPI`.
    fn jump_targets(code: &[u8]) -> Vec<usize> {
        instructions(code)
            .into_iter()
            .filter(|pc| {
                code[*pc] == Opcode::Push2 as u8 && code.get(pc + 3) == Some(&(Opcode::JumpI as u8))
            })
            .map(|pc| usize::from(u16::from_be_bytes([code[pc + 1], code[pc + 2]])))
            .collect()
    }

    #[test]
    fn test_assembly_is_pure() {
        assert_eq!(assemble(&base()).unwrap(), assemble(&base()).unwrap());
    }

    #[test]
    fn test_layout_and_jump_targets() {
        let code = assemble(&base()).unwrap();

        // PUSH4 transferFrom selector first
        assert_eq!(&code[..5], &[0x63, 0x23, 0xb8, 0x72, 0xdd]);
        // shared revert block last
        assert_eq!(&code[code.len() - 5..], &[0x5b, 0x60, 0x00, 0x80, 0xfd]);
        // SELFDESTRUCT to the maker right before it
        let tail = code.len() - 5;
        assert_eq!(code[tail - 1], 0xff);
        assert_eq!(&code[tail - 21..tail - 1], Address::repeat_byte(0xaa).as_bytes());

        let targets = jump_targets(&code);
        // two checks per transferFrom
        assert_eq!(targets.len(), 4);
        assert!(targets.iter().all(|t| *t == tail));
        assert_eq!(code[tail], Opcode::JumpDest as u8);
    }

    #[test]
    fn test_no_push0() {
        let code = assemble(&SwapParams {
            offer: Offer::new(Address::repeat_byte(0x11), Address::repeat_byte(0x22), 0u64, 0u64),
            ..base()
        })
        .unwrap();
        assert!(instructions(&code).iter().all(|pc| code[*pc] != 0x5f));
    }

    #[test]
    fn test_every_argument_changes_output() {
        let reference = assemble(&base()).unwrap();
        let variants = vec![
            SwapParams {
                maker: Address::repeat_byte(0xab),
                ..base()
            },
            SwapParams {
                taker: Address::repeat_byte(0xbc),
                ..base()
            },
            SwapParams {
                offer: Offer::new(Address::repeat_byte(0x11), Address::repeat_byte(0x22), 101u64, 50u64),
                ..base()
            },
            SwapParams {
                offer: Offer::new(Address::repeat_byte(0x11), Address::repeat_byte(0x22), 100u64, 51u64),
                ..base()
            },
            SwapParams {
                offer: Offer::new(Address::repeat_byte(0x12), Address::repeat_byte(0x22), 100u64, 50u64),
                ..base()
            },
            SwapParams {
                offer: Offer::new(Address::repeat_byte(0x11), Address::repeat_byte(0x23), 100u64, 50u64),
                ..base()
            },
            SwapParams {
                permits: TradePermits {
                    maker: Some(eip2612(Address::repeat_byte(0xaa))),
                    taker: None,
                },
                ..base()
            },
            SwapParams {
                permits: TradePermits {
                    maker: None,
                    taker: Some(permit2(Address::repeat_byte(0xbb))),
                },
                ..base()
            },
            SwapParams {
                pay_coinbase: Some(U256::from(1u64)),
                ..base()
            },
        ];

        for (i, variant) in variants.iter().enumerate() {
            assert_ne!(assemble(variant).unwrap(), reference, "variant {} did not change output", i);
        }

        let coinbase_a = SwapParams {
            pay_coinbase: Some(U256::from(1u64)),
            ..base()
        };
        let coinbase_b = SwapParams {
            pay_coinbase: Some(U256::from(2u64)),
            ..base()
        };
        assert_ne!(assemble(&coinbase_a).unwrap(), assemble(&coinbase_b).unwrap());
    }

    #[test]
    fn test_native_token_coerced() {
        let native = SwapParams {
            offer: Offer::new(Address::zero(), Address::repeat_byte(0x22), 100u64, 50u64),
            ..base()
        };
        let wrapped = SwapParams {
            offer: Offer::new(Address::repeat_byte(0xee), Address::repeat_byte(0x22), 100u64, 50u64),
            ..base()
        };
        assert_eq!(assemble(&native).unwrap(), assemble(&wrapped).unwrap());
    }

    #[test]
    fn test_permit2_replaces_transfer_from() {
        let params = SwapParams {
            permits: TradePermits {
                maker: Some(permit2(Address::repeat_byte(0xaa))),
                taker: None,
            },
            ..base()
        };
        let code = assemble(&params).unwrap();
        let selector = [0x63, 0x30, 0xf2, 0x8b, 0x7a];
        assert!(code.windows(5).any(|w| w == selector));
        assert!(code.windows(20).any(|w| w == PERMIT2_ADDRESS.as_bytes()));
        // permit2 call check + taker transferFrom checks
        assert_eq!(jump_targets(&code).len(), 3);
    }

    #[test]
    fn test_eip2612_precedes_transfer_from() {
        let params = SwapParams {
            permits: TradePermits {
                maker: Some(eip2612(Address::repeat_byte(0xaa))),
                taker: None,
            },
            ..base()
        };
        let code = assemble(&params).unwrap();
        let permit_at = code.windows(5).position(|w| w == [0x63, 0xd5, 0x05, 0xac, 0xcf]).unwrap();
        let transfer_at = code.windows(5).position(|w| w == [0x63, 0x23, 0xb8, 0x72, 0xdd]).unwrap();
        assert!(permit_at < transfer_at);
        assert_eq!(jump_targets(&code).len(), 5);
    }

    #[test]
    fn test_coinbase_payment() {
        let params = SwapParams {
            pay_coinbase: Some(U256::from(0x1234u64)),
            ..base()
        };
        let code = assemble(&params).unwrap();
        // PUSH2 0x1234 COINBASE GAS CALL
        assert!(code.windows(6).any(|w| w == [0x61, 0x12, 0x34, 0x41, 0x5a, 0xf1]));
        assert_eq!(jump_targets(&code).len(), 5);
    }

    #[test]
    fn test_minimal_pushes() {
        let mut asm = Assembler::default();
        asm.push_u256(U256::zero());
        asm.push_u256(U256::from(0xffu64));
        asm.push_u256(U256::from(0x100u64));
        asm.push_u256(U256::MAX);
        let mut expected = vec![0x60, 0x00, 0x60, 0xff, 0x61, 0x01, 0x00, 0x7f];
        expected.extend_from_slice(&[0xff; 32]);
        assert_eq!(asm.code, expected);
    }
}
