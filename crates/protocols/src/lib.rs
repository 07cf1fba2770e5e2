//! PintSwap peer protocols.
//!
//! - [`trade`]: the create-trade exchange, as maker and taker state machines
//!   plus a driver that runs them against a stream and the chain
//! - [`broadcast`]: periodic offer announcements and the peer offer cache feed
//! - [`names`]: name-service client and registry
//! - [`node`]: [`Pintswap`], which ties the above to a [`Network`]
//!
//! Transports implement [`Network`]; [`MemoryHub`] serves tests and
//! [`TcpNetwork`] connects real processes, authenticating dialers by their
//! [`Identity`] key.

pub mod broadcast;
pub mod error;
pub mod identity;
pub mod memory;
pub mod names;
pub mod network;
pub mod node;
pub mod schema;
pub mod tcp;
pub mod trade;

pub use broadcast::{
    start_publishing_offers, subscribe_offers, PeerOffersUpdated, PublisherHandle,
    DEFAULT_PUBLISH_INTERVAL,
};
pub use error::{
    NameError, NameResult, NetworkError, NetworkResult, TradeError, TradeResult,
};
pub use identity::{peer_id_for, Identity};
pub use memory::{MemoryHub, MemoryNetwork};
pub use names::{NameClient, NameRegistry, DEFAULT_TLD};
pub use network::{BoxedStream, IncomingStream, Network, PeerStream, PubsubMessage};
pub use node::{NodeOptions, Pintswap};
pub use schema::{Frame, Role};
pub use tcp::TcpNetwork;
pub use trade::{
    spawn_trade, ChainContext, MakerMachine, TakerMachine, TradeContext, TradeEvent,
    TradeHandle, TradeOutcome,
};
