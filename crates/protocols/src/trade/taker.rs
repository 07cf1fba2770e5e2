//! Taker side of create-trade.

use std::sync::Arc;

use pintswap_chain::{
    address_from_public_key, create_address, recover_address, PreparedTransaction, SwapParams,
    TransactionReceipt, TxSignature,
};
use pintswap_codec::{
    decode_address, decode_permit, encode_address, encode_amount, encode_permit, BatchFill,
    WireMessage,
};
use pintswap_tss::{KeyShare, KeygenInitiator, SignInitiator, TwoPartyEcdsa};
use pintswap_types::{Address, Fill, Offer, Permit, TradePermits, U256};
use tracing::debug;

use crate::error::{TradeError, TradeResult};
use crate::schema::Frame;
use crate::trade::machine::{Action, ActionResult, Input, Step};
use crate::trade::{TradeEvent, TradeOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    AwaitKeygenB,
    AwaitMakerAddress,
    AwaitNonce,
    AwaitApproval,
    AwaitMakerPermit,
    AwaitBuild,
    AwaitFunding,
    AwaitSignE,
    AwaitSignG,
    AwaitBroadcast,
    AwaitReceipt,
    Done,
}

/// Drives the taker through key generation, approval, transaction building,
/// joint signing and broadcast.
pub struct TakerMachine {
    state: State,
    fills: Vec<Fill>,
    merged: Offer,
    taker: Address,
    wrapped_native: Address,
    await_receipt: bool,
    tss: Arc<dyn TwoPartyEcdsa>,
    keygen: Box<dyn KeygenInitiator>,
    msg_b: Vec<u8>,
    share: Option<KeyShare>,
    maker: Address,
    shared: Address,
    own_permit: Option<Permit>,
    prepared: Option<PreparedTransaction>,
    signer: Option<Box<dyn SignInitiator>>,
    receipt: Option<TransactionReceipt>,
}

impl TakerMachine {
    /// Fill each `(offer, amount)` leg. Legs are scaled and merged up front,
    /// so an invalid batch fails before anything is sent.
    pub fn new(
        legs: &[(Offer, U256)],
        taker: Address,
        wrapped_native: Address,
        tss: Arc<dyn TwoPartyEcdsa>,
    ) -> TradeResult<Self> {
        if legs.is_empty() {
            return Err(TradeError::EmptyFill);
        }
        let scaled = legs
            .iter()
            .map(|(offer, amount)| offer.scale(*amount))
            .collect::<Result<Vec<_>, _>>()?;
        let merged = Offer::merge(&scaled)?;
        let fills = legs
            .iter()
            .map(|(offer, amount)| Fill::new(offer.hash(), *amount))
            .collect();

        Ok(Self {
            state: State::Start,
            fills,
            merged,
            taker,
            wrapped_native,
            await_receipt: true,
            keygen: tss.keygen_initiator(),
            tss,
            msg_b: Vec::new(),
            share: None,
            maker: Address::zero(),
            shared: Address::zero(),
            own_permit: None,
            prepared: None,
            signer: None,
            receipt: None,
        })
    }

    /// Complete right after broadcast instead of waiting for the receipt.
    pub fn with_await_receipt(mut self, await_receipt: bool) -> Self {
        self.await_receipt = await_receipt;
        self
    }

    /// The merged offer this trade settles.
    pub fn offer(&self) -> &Offer {
        &self.merged
    }

    pub fn fills(&self) -> &[Fill] {
        &self.fills
    }

    pub fn state(&self) -> &'static str {
        match self.state {
            State::Start => "starting",
            State::AwaitKeygenB => "awaiting keygen B",
            State::AwaitMakerAddress => "awaiting maker address",
            State::AwaitNonce => "fetching shared nonce",
            State::AwaitApproval => "approving",
            State::AwaitMakerPermit => "awaiting maker permit",
            State::AwaitBuild => "building transaction",
            State::AwaitFunding => "funding shared address",
            State::AwaitSignE => "awaiting sign E",
            State::AwaitSignG => "awaiting sign G",
            State::AwaitBroadcast => "broadcasting",
            State::AwaitReceipt => "awaiting receipt",
            State::Done => "done",
        }
    }

    pub fn expected_frame(&self) -> Option<Frame> {
        match self.state {
            State::AwaitKeygenB => Some(Frame::KeygenB),
            State::AwaitMakerAddress => Some(Frame::MakerAddress),
            State::AwaitMakerPermit => Some(Frame::MakerPermit),
            State::AwaitSignE => Some(Frame::SignE),
            State::AwaitSignG => Some(Frame::SignG),
            _ => None,
        }
    }

    pub fn outcome(&self) -> Option<TradeOutcome> {
        (self.state == State::Done).then(|| TradeOutcome {
            offer: self.merged,
            receipt: self.receipt.clone(),
        })
    }

    pub fn advance(&mut self, input: Input) -> TradeResult<Step> {
        match (self.state, input) {
            (State::Start, Input::Start) => {
                let msg_a = self.keygen.step1()?;
                self.state = State::AwaitKeygenB;
                Ok(Step::default()
                    .emit(TradeEvent::PeerConnected)
                    .send(Frame::BatchFill, BatchFill::new(self.fills.clone()).encode())
                    .send(Frame::KeygenA, msg_a))
            }
            (State::AwaitKeygenB, Input::Frame(msg_b)) => {
                self.msg_b = msg_b;
                self.state = State::AwaitMakerAddress;
                Ok(Step::default())
            }
            (State::AwaitMakerAddress, Input::Frame(payload)) => {
                self.maker = decode_address(&payload)?;
                let msg_c = self.keygen.step2(&self.msg_b)?;
                let share = self.keygen.export_key_share()?;
                self.shared = address_from_public_key(&share.public_key)?;
                self.share = Some(share);
                debug!(shared = ?self.shared, maker = ?self.maker, "derived shared address");
                self.state = State::AwaitNonce;
                Ok(Step::default()
                    .send(Frame::KeygenC, msg_c)
                    .then(Action::FetchNonce(self.shared)))
            }
            (State::AwaitNonce, Input::Action(ActionResult::Nonce(nonce))) => {
                let spender = create_address(&self.shared, nonce);
                self.state = State::AwaitApproval;
                Ok(Step::default().then(Action::Approve {
                    token: self.merged.gets_token,
                    amount: self.merged.gets_amount,
                    spender,
                }))
            }
            (State::AwaitApproval, Input::Action(ActionResult::Approved(permit))) => {
                self.own_permit = permit;
                self.state = State::AwaitMakerPermit;
                Ok(Step::default()
                    .emit(TradeEvent::ApprovalSent)
                    .send(Frame::TakerPermit, encode_permit(permit.as_ref())))
            }
            (State::AwaitMakerPermit, Input::Frame(payload)) => {
                let maker_permit = decode_permit(&payload)?;
                let params = SwapParams {
                    offer: self.merged,
                    maker: self.maker,
                    taker: self.taker,
                    permits: TradePermits {
                        maker: maker_permit,
                        taker: self.own_permit,
                    },
                    pay_coinbase: None,
                    wrapped_native: self.wrapped_native,
                };
                self.state = State::AwaitBuild;
                Ok(Step::default().then(Action::BuildTransaction {
                    params,
                    shared: self.shared,
                }))
            }
            (State::AwaitBuild, Input::Action(ActionResult::Built(prepared))) => {
                let needs_funding = !prepared.is_rebate() && !prepared.funding.is_zero();
                let funding = prepared.funding;
                self.prepared = Some(prepared);
                if needs_funding {
                    self.state = State::AwaitFunding;
                    Ok(Step::default()
                        .emit(TradeEvent::TxBuilt)
                        .then(Action::FundSharedAddress {
                            shared: self.shared,
                            amount: funding,
                        }))
                } else {
                    Ok(self.propose_transaction()?.emit(TradeEvent::TxBuilt))
                }
            }
            (State::AwaitFunding, Input::Action(ActionResult::Funded)) => self.propose_transaction(),
            (State::AwaitSignE, Input::Frame(msg_e)) => {
                let signer = self.signer.as_mut().ok_or(TradeError::UnexpectedInput("signing"))?;
                let msg_f = signer.step2(&msg_e)?;
                self.state = State::AwaitSignG;
                Ok(Step::default().send(Frame::SignF, msg_f))
            }
            (State::AwaitSignG, Input::Frame(msg_g)) => self.finalize_signature(&msg_g),
            (State::AwaitBroadcast, Input::Action(ActionResult::Broadcast(hash))) => {
                let step = Step::default().emit(TradeEvent::TxBroadcast(hash));
                if self.await_receipt {
                    self.state = State::AwaitReceipt;
                    Ok(step.then(Action::AwaitReceipt(hash)))
                } else {
                    self.state = State::Done;
                    Ok(step.emit(TradeEvent::Complete).finish())
                }
            }
            (State::AwaitReceipt, Input::Action(ActionResult::Receipt(receipt))) => {
                self.receipt = Some(receipt.ensure_success()?);
                self.state = State::Done;
                Ok(Step::default().emit(TradeEvent::Complete).finish())
            }
            _ => Err(TradeError::UnexpectedInput(self.state())),
        }
    }

    /// Send the unsigned transaction with its context and open signing.
    fn propose_transaction(&mut self) -> TradeResult<Step> {
        let (prepared, share) = match (&self.prepared, &self.share) {
            (Some(p), Some(s)) => (p, s),
            _ => return Err(TradeError::UnexpectedInput(self.state())),
        };
        let mut signer = self
            .tss
            .sign_initiator(share, prepared.tx.sighash().to_fixed_bytes())?;
        let msg_d = signer.step1()?;
        let coinbase = prepared
            .pay_coinbase
            .map(|amount| encode_amount(&amount))
            .unwrap_or_default();
        let step = Step::default()
            .send(Frame::UnsignedTx, prepared.tx.encode_unsigned())
            .send(Frame::CoinbaseAmount, coinbase)
            .send(Frame::TakerAddress, encode_address(&self.taker))
            .send(Frame::SignD, msg_d);
        self.signer = Some(signer);
        self.state = State::AwaitSignE;
        Ok(step)
    }

    fn finalize_signature(&mut self, msg_g: &[u8]) -> TradeResult<Step> {
        let (signer, prepared) = match (self.signer.as_mut(), &self.prepared) {
            (Some(s), Some(p)) => (s, p),
            _ => return Err(TradeError::UnexpectedInput("finalizing signature")),
        };
        signer.step3(msg_g)?;
        let raw = signer.export_signature()?;
        let signature = TxSignature::from_parts(&raw.r, &raw.s, raw.recovery_id)?;
        if recover_address(&prepared.tx.sighash(), &signature)? != self.shared {
            return Err(TradeError::SignatureMismatch);
        }
        let signed = prepared.tx.encode_signed(&signature);
        let rebate = prepared.is_rebate();
        self.state = State::AwaitBroadcast;
        Ok(Step::default().then(Action::Broadcast {
            raw: signed,
            rebate,
        }))
    }
}
