//! Maker side of create-trade.

use std::sync::Arc;

use pintswap_chain::{
    address_from_public_key, assemble, create_address, ChainError, SwapParams, UnsignedTransaction,
};
use pintswap_codec::{
    decode_address, decode_amount, decode_permit, encode_address, encode_permit, BatchFill,
    WireMessage,
};
use pintswap_orderbook::OrderbookError;
use pintswap_tss::{KeyShare, KeygenResponder, SignResponder, TwoPartyEcdsa};
use pintswap_types::{Address, Fill, Hash256, Offer, Permit, TradePermits, U256};
use tracing::{debug, warn};

use crate::error::{TradeError, TradeResult};
use crate::schema::Frame;
use crate::trade::machine::{Action, ActionResult, Input, Step};
use crate::trade::{TradeEvent, TradeOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    AwaitBatchFill,
    AwaitLookup,
    AwaitReserve,
    AwaitKeygenA,
    AwaitKeygenC,
    AwaitNonce,
    AwaitApproval,
    AwaitTakerPermit,
    AwaitUnsignedTx,
    AwaitCoinbase,
    AwaitTakerAddress,
    AwaitSignD,
    AwaitSignF,
    AwaitFinalize,
    Done,
}

/// Answers a fill: validates and reserves the offers, joins key generation,
/// approves, checks the taker's transaction against its own assembly and
/// co-signs it.
pub struct MakerMachine {
    state: State,
    maker: Address,
    wrapped_native: Address,
    tss: Arc<dyn TwoPartyEcdsa>,
    keygen: Box<dyn KeygenResponder>,
    fills: Vec<Fill>,
    merged: Option<Offer>,
    share: Option<KeyShare>,
    shared: Address,
    own_permit: Option<Permit>,
    taker_permit: Option<Permit>,
    tx: Option<UnsignedTransaction>,
    pay_coinbase: Option<U256>,
    signer: Option<Box<dyn SignResponder>>,
}

impl MakerMachine {
    pub fn new(maker: Address, wrapped_native: Address, tss: Arc<dyn TwoPartyEcdsa>) -> Self {
        Self {
            state: State::Start,
            maker,
            wrapped_native,
            keygen: tss.keygen_responder(),
            tss,
            fills: Vec::new(),
            merged: None,
            share: None,
            shared: Address::zero(),
            own_permit: None,
            taker_permit: None,
            tx: None,
            pay_coinbase: None,
            signer: None,
        }
    }

    pub fn state(&self) -> &'static str {
        match self.state {
            State::Start => "starting",
            State::AwaitBatchFill => "awaiting fill",
            State::AwaitLookup => "looking up offers",
            State::AwaitReserve => "reserving offers",
            State::AwaitKeygenA => "awaiting keygen A",
            State::AwaitKeygenC => "awaiting keygen C",
            State::AwaitNonce => "fetching shared nonce",
            State::AwaitApproval => "approving",
            State::AwaitTakerPermit => "awaiting taker permit",
            State::AwaitUnsignedTx => "awaiting transaction",
            State::AwaitCoinbase => "awaiting coinbase amount",
            State::AwaitTakerAddress => "awaiting taker address",
            State::AwaitSignD => "awaiting sign D",
            State::AwaitSignF => "awaiting sign F",
            State::AwaitFinalize => "finalizing offers",
            State::Done => "done",
        }
    }

    pub fn expected_frame(&self) -> Option<Frame> {
        match self.state {
            State::AwaitBatchFill => Some(Frame::BatchFill),
            State::AwaitKeygenA => Some(Frame::KeygenA),
            State::AwaitKeygenC => Some(Frame::KeygenC),
            State::AwaitTakerPermit => Some(Frame::TakerPermit),
            State::AwaitUnsignedTx => Some(Frame::UnsignedTx),
            State::AwaitCoinbase => Some(Frame::CoinbaseAmount),
            State::AwaitTakerAddress => Some(Frame::TakerAddress),
            State::AwaitSignD => Some(Frame::SignD),
            State::AwaitSignF => Some(Frame::SignF),
            _ => None,
        }
    }

    pub fn outcome(&self) -> Option<TradeOutcome> {
        match (self.state, self.merged) {
            (State::Done, Some(offer)) => Some(TradeOutcome {
                offer,
                receipt: None,
            }),
            _ => None,
        }
    }

    fn hashes(&self) -> Vec<Hash256> {
        self.fills.iter().map(|f| f.offer_hash).collect()
    }

    fn merged(&self) -> TradeResult<Offer> {
        self.merged.ok_or(TradeError::UnexpectedInput(self.state()))
    }

    pub fn advance(&mut self, input: Input) -> TradeResult<Step> {
        match (self.state, input) {
            (State::Start, Input::Start) => {
                self.state = State::AwaitBatchFill;
                Ok(Step::default().emit(TradeEvent::PeerConnected))
            }
            (State::AwaitBatchFill, Input::Frame(payload)) => {
                let batch = BatchFill::decode(&payload)?;
                if batch.fills.is_empty() {
                    return Err(TradeError::EmptyFill);
                }
                self.fills = batch.fills;
                self.state = State::AwaitLookup;
                Ok(Step::default().then(Action::LookupOffers(self.hashes())))
            }
            (State::AwaitLookup, Input::Action(ActionResult::Offers(found))) => {
                self.merged = Some(self.validate(&found)?);
                self.state = State::AwaitReserve;
                Ok(Step::default().then(Action::ReserveOffers(self.hashes())))
            }
            (State::AwaitReserve, Input::Action(ActionResult::Reserved(offers))) => {
                debug!(offers = offers.len(), "reserved offers");
                self.state = State::AwaitKeygenA;
                Ok(Step::default())
            }
            (State::AwaitKeygenA, Input::Frame(msg_a)) => {
                let msg_b = self.keygen.step1(&msg_a)?;
                self.state = State::AwaitKeygenC;
                Ok(Step::default()
                    .send(Frame::KeygenB, msg_b)
                    .send(Frame::MakerAddress, encode_address(&self.maker)))
            }
            (State::AwaitKeygenC, Input::Frame(msg_c)) => {
                self.keygen.step2(&msg_c)?;
                let share = self.keygen.export_key_share()?;
                self.shared = address_from_public_key(&share.public_key)?;
                self.share = Some(share);
                debug!(shared = ?self.shared, "derived shared address");
                self.state = State::AwaitNonce;
                Ok(Step::default().then(Action::FetchNonce(self.shared)))
            }
            (State::AwaitNonce, Input::Action(ActionResult::Nonce(nonce))) => {
                let merged = self.merged()?;
                self.state = State::AwaitApproval;
                Ok(Step::default().then(Action::Approve {
                    token: merged.gives_token,
                    amount: merged.gives_amount,
                    spender: create_address(&self.shared, nonce),
                }))
            }
            (State::AwaitApproval, Input::Action(ActionResult::Approved(permit))) => {
                self.own_permit = permit;
                self.state = State::AwaitTakerPermit;
                Ok(Step::default()
                    .emit(TradeEvent::ApprovalSent)
                    .send(Frame::MakerPermit, encode_permit(permit.as_ref())))
            }
            (State::AwaitTakerPermit, Input::Frame(payload)) => {
                self.taker_permit = decode_permit(&payload)?;
                self.state = State::AwaitUnsignedTx;
                Ok(Step::default())
            }
            (State::AwaitUnsignedTx, Input::Frame(payload)) => {
                self.tx = Some(UnsignedTransaction::decode_unsigned(&payload)?);
                self.state = State::AwaitCoinbase;
                Ok(Step::default())
            }
            (State::AwaitCoinbase, Input::Frame(payload)) => {
                self.pay_coinbase = if payload.is_empty() {
                    None
                } else {
                    Some(decode_amount(&payload)?)
                };
                self.state = State::AwaitTakerAddress;
                Ok(Step::default())
            }
            (State::AwaitTakerAddress, Input::Frame(payload)) => {
                let taker = decode_address(&payload)?;
                self.verify_transaction(taker)?;
                self.state = State::AwaitSignD;
                Ok(Step::default().emit(TradeEvent::TxBuilt))
            }
            (State::AwaitSignD, Input::Frame(msg_d)) => {
                let (tx, share) = match (&self.tx, &self.share) {
                    (Some(tx), Some(share)) => (tx, share),
                    _ => return Err(TradeError::UnexpectedInput(self.state())),
                };
                let mut signer = self
                    .tss
                    .sign_responder(share, tx.sighash().to_fixed_bytes())?;
                let msg_e = signer.step1(&msg_d)?;
                self.signer = Some(signer);
                self.state = State::AwaitSignF;
                Ok(Step::default().send(Frame::SignE, msg_e))
            }
            (State::AwaitSignF, Input::Frame(msg_f)) => {
                let signer = self
                    .signer
                    .as_mut()
                    .ok_or(TradeError::UnexpectedInput("signing"))?;
                let msg_g = signer.step2(&msg_f)?;
                self.state = State::AwaitFinalize;
                Ok(Step::default()
                    .send(Frame::SignG, msg_g)
                    .then(Action::FinalizeOffers(self.hashes())))
            }
            (State::AwaitFinalize, Input::Action(ActionResult::Finalized)) => {
                self.state = State::Done;
                Ok(Step::default().emit(TradeEvent::Complete).finish())
            }
            _ => Err(TradeError::UnexpectedInput(self.state())),
        }
    }

    /// Every hash must be listed, every fill within capacity and the batch a
    /// single pair, checked in that order before anything is reserved.
    fn validate(&self, found: &[Option<Offer>]) -> TradeResult<Offer> {
        if found.len() != self.fills.len() {
            return Err(TradeError::UnexpectedInput(self.state()));
        }
        let originals = self
            .fills
            .iter()
            .zip(found)
            .map(|(fill, offer)| {
                offer.ok_or(TradeError::Orderbook(OrderbookError::UnknownOffer(
                    fill.offer_hash,
                )))
            })
            .collect::<TradeResult<Vec<_>>>()?;
        let scaled = originals
            .iter()
            .zip(&self.fills)
            .map(|(offer, fill)| offer.scale(fill.amount))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Offer::merge(&scaled)?)
    }

    /// The taker's transaction must create exactly the contract this side
    /// assembles for the agreed trade.
    fn verify_transaction(&self, taker: Address) -> TradeResult<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or(TradeError::UnexpectedInput(self.state()))?;
        if tx.to.is_some() {
            warn!(to = ?tx.to, "taker proposed a transaction with a recipient");
            return Err(TradeError::NonEmptyRecipient);
        }
        let expected = assemble(&SwapParams {
            offer: self.merged()?,
            maker: self.maker,
            taker,
            permits: TradePermits {
                maker: self.own_permit,
                taker: self.taker_permit,
            },
            pay_coinbase: self.pay_coinbase,
            wrapped_native: self.wrapped_native,
        })
        .map_err(ChainError::from)?;
        if tx.data != expected {
            warn!(
                proposed = tx.data.len(),
                expected = expected.len(),
                "taker transaction does not match the swap contract"
            );
            return Err(TradeError::ContractMismatch);
        }
        Ok(())
    }
}
