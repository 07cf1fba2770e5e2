//! Trade coordination over one create-trade stream.
//!
//! Each role is a sans-IO state machine ([`MakerMachine`], [`TakerMachine`])
//! that consumes frames and local action results and emits frames, actions
//! and progress events. [`spawn_trade`] runs a machine against a stream on
//! its own task and hands back a [`TradeHandle`].

mod driver;
pub mod machine;
pub mod maker;
pub mod taker;

use std::sync::Arc;
use std::time::Duration;

use pintswap_chain::{
    Approver, ChainProvider, RelayClient, TransactionBuilder, TransactionReceipt, Wallet,
};
use pintswap_orderbook::Orderbook;
use pintswap_tss::TwoPartyEcdsa;
use pintswap_types::{Address, Hash256, Offer, PeerId};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::error::{TradeError, TradeResult};
use crate::schema::Role;

pub use driver::spawn_trade;
pub use machine::{Action, ActionResult, Input, Outbound, Step, TradeMachine};
pub use maker::MakerMachine;
pub use taker::TakerMachine;

/// Progress milestones, emitted in order.
///
/// Taker: `PeerConnected, ApprovalSent, TxBuilt, TxBroadcast, Complete`.
/// Maker: `PeerConnected, ApprovalSent, TxBuilt, Complete`, where `TxBuilt`
/// means the taker's transaction was verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeEvent {
    PeerConnected,
    ApprovalSent,
    TxBuilt,
    TxBroadcast(Hash256),
    Complete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeOutcome {
    /// The merged offer that settled.
    pub offer: Offer,
    /// Settlement receipt; only the taker waits for it.
    pub receipt: Option<TransactionReceipt>,
}

/// Chain access a trade needs.
#[derive(Clone)]
pub struct ChainContext {
    pub provider: Arc<dyn ChainProvider>,
    pub wallet: Arc<dyn Wallet>,
    pub approver: Arc<dyn Approver>,
    pub builder: Arc<TransactionBuilder>,
    pub relay: Arc<RelayClient>,
    pub wrapped_native: Address,
    pub receipt_poll_interval: Duration,
}

/// Shared state every trade task runs against.
#[derive(Clone)]
pub struct TradeContext {
    pub chain: ChainContext,
    pub tss: Arc<dyn TwoPartyEcdsa>,
    pub orderbook: Arc<Orderbook>,
}

/// Caller's view of a running trade.
pub struct TradeHandle {
    id: Uuid,
    role: Role,
    peer: PeerId,
    events: mpsc::UnboundedReceiver<TradeEvent>,
    completion: oneshot::Receiver<TradeResult<TradeOutcome>>,
}

impl TradeHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn peer(&self) -> &PeerId {
        &self.peer
    }

    /// Next progress event; `None` once the trade task has finished and all
    /// events were read.
    pub async fn next_event(&mut self) -> Option<TradeEvent> {
        self.events.recv().await
    }

    /// Wait for the trade to resolve.
    pub async fn wait(self) -> TradeResult<TradeOutcome> {
        self.completion
            .await
            .unwrap_or_else(|_| Err(TradeError::StreamClosed("trade task ended".into())))
    }

    /// Wait for the trade and collect every event it emitted.
    pub async fn finish(mut self) -> (Vec<TradeEvent>, TradeResult<TradeOutcome>) {
        let mut events = Vec::new();
        while let Some(event) = self.events.recv().await {
            events.push(event);
        }
        let result = self.wait().await;
        (events, result)
    }
}
