//! Inputs and outputs shared by both role machines.

use pintswap_chain::{PreparedTransaction, SwapParams, TransactionReceipt};
use pintswap_types::{Address, Hash256, Offer, Permit, U256};

use crate::error::TradeResult;
use crate::schema::{Frame, Role};
use crate::trade::maker::MakerMachine;
use crate::trade::taker::TakerMachine;
use crate::trade::{TradeEvent, TradeOutcome};

/// What drives a machine forward.
#[derive(Debug)]
pub enum Input {
    /// The stream is open.
    Start,
    /// The next frame read from the counterparty.
    Frame(Vec<u8>),
    /// Result of the last requested [`Action`].
    Action(ActionResult),
}

/// Local asynchronous work a machine needs before it can continue.
#[derive(Debug, Clone)]
pub enum Action {
    LookupOffers(Vec<Hash256>),
    ReserveOffers(Vec<Hash256>),
    /// Transaction count of the shared address, which fixes the trade address.
    FetchNonce(Address),
    /// Authorize `spender`; an on-chain approval must be included before the
    /// result is reported.
    Approve {
        token: Address,
        amount: U256,
        spender: Address,
    },
    BuildTransaction {
        params: SwapParams,
        shared: Address,
    },
    /// Send gas money to the shared address and wait for inclusion.
    FundSharedAddress {
        shared: Address,
        amount: U256,
    },
    /// Submit a signed transaction; rebate transactions go to the private relay.
    Broadcast {
        raw: Vec<u8>,
        rebate: bool,
    },
    AwaitReceipt(Hash256),
    FinalizeOffers(Vec<Hash256>),
}

#[derive(Debug, Clone)]
pub enum ActionResult {
    Offers(Vec<Option<Offer>>),
    Reserved(Vec<Offer>),
    Nonce(u64),
    /// `Some` when the approval is an off-chain permit.
    Approved(Option<Permit>),
    Built(PreparedTransaction),
    Funded,
    Broadcast(Hash256),
    Receipt(TransactionReceipt),
    Finalized,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub frame: Frame,
    pub payload: Vec<u8>,
}

/// Everything one call to `advance` asks of the driver, applied in field order:
/// write `outbound`, emit `events`, then run `action` or, if there is none and
/// the trade is not `done`, read the next frame.
#[derive(Debug, Default)]
pub struct Step {
    pub outbound: Vec<Outbound>,
    pub action: Option<Action>,
    pub events: Vec<TradeEvent>,
    pub done: bool,
}

impl Step {
    pub(crate) fn send(mut self, frame: Frame, payload: Vec<u8>) -> Self {
        self.outbound.push(Outbound { frame, payload });
        self
    }

    pub(crate) fn then(mut self, action: Action) -> Self {
        self.action = Some(action);
        self
    }

    pub(crate) fn emit(mut self, event: TradeEvent) -> Self {
        self.events.push(event);
        self
    }

    pub(crate) fn finish(mut self) -> Self {
        self.done = true;
        self
    }
}

/// A role machine, selected by [`Role`].
pub enum TradeMachine {
    Maker(Box<MakerMachine>),
    Taker(Box<TakerMachine>),
}

impl TradeMachine {
    pub fn role(&self) -> Role {
        match self {
            TradeMachine::Maker(_) => Role::Maker,
            TradeMachine::Taker(_) => Role::Taker,
        }
    }

    pub fn advance(&mut self, input: Input) -> TradeResult<Step> {
        match self {
            TradeMachine::Maker(m) => m.advance(input),
            TradeMachine::Taker(m) => m.advance(input),
        }
    }

    /// The frame the machine is waiting for, if any.
    pub fn expected_frame(&self) -> Option<Frame> {
        match self {
            TradeMachine::Maker(m) => m.expected_frame(),
            TradeMachine::Taker(m) => m.expected_frame(),
        }
    }

    pub fn state(&self) -> &'static str {
        match self {
            TradeMachine::Maker(m) => m.state(),
            TradeMachine::Taker(m) => m.state(),
        }
    }

    /// Result once the machine reported `done`.
    pub fn outcome(&self) -> Option<TradeOutcome> {
        match self {
            TradeMachine::Maker(m) => m.outcome(),
            TradeMachine::Taker(m) => m.outcome(),
        }
    }
}

impl From<MakerMachine> for TradeMachine {
    fn from(machine: MakerMachine) -> Self {
        TradeMachine::Maker(Box::new(machine))
    }
}

impl From<TakerMachine> for TradeMachine {
    fn from(machine: TakerMachine) -> Self {
        TradeMachine::Taker(Box::new(machine))
    }
}
