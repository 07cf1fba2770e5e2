//! Error types for peer protocols.

use std::io;

use pintswap_chain::ChainError;
use pintswap_codec::CodecError;
use pintswap_orderbook::OrderbookError;
use pintswap_tss::TssError;
use pintswap_types::{OfferError, PeerId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetworkError {
    /// The peer is not known to the transport. Worth retrying while
    /// discovery catches up.
    #[error("peer {0} not found")]
    PeerNotFound(PeerId),

    #[error("peer {peer} does not serve {protocol}")]
    UnsupportedProtocol { peer: PeerId, protocol: String },

    #[error("failed to connect to peer {peer}: {source}")]
    ConnectionFailed {
        peer: PeerId,
        #[source]
        source: io::Error,
    },

    #[error("failed to bind listener on {address}: {source}")]
    BindFailed {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("invalid node identity: {0}")]
    Identity(String),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("network shut down")]
    Closed,
}

pub type NetworkResult<T> = std::result::Result<T, NetworkError>;

/// Fatal outcome of one trade. Trades are never retried internally.
#[derive(Debug, Error)]
pub enum TradeError {
    #[error("invalid fill: {0}")]
    Offer(#[from] OfferError),

    #[error(transparent)]
    Orderbook(#[from] OrderbookError),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("threshold signing error: {0}")]
    Tss(#[from] TssError),

    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    /// The proposed transaction does not deploy the agreed settlement contract.
    #[error("proposed transaction does not match the agreed swap contract")]
    ContractMismatch,

    #[error("settlement transaction must be a contract creation")]
    NonEmptyRecipient,

    #[error("joint signature does not recover to the shared address")]
    SignatureMismatch,

    /// Our side of the stream failed.
    #[error("trade stream closed: {0}")]
    StreamClosed(String),

    /// The counterparty closed the stream before the trade finished.
    #[error("counterparty aborted the trade")]
    CounterpartyAbort,

    #[error("unexpected input while {0}")]
    UnexpectedInput(&'static str),

    #[error("fill request names no offers")]
    EmptyFill,
}

pub type TradeResult<T> = std::result::Result<T, TradeError>;

#[derive(Debug, Error)]
pub enum NameError {
    #[error("name {0} is not registered")]
    NotRegistered(String),

    #[error("no name service peers configured for .{0}")]
    UnknownTld(String),

    #[error("invalid name {0:?}")]
    InvalidName(String),

    #[error("name service did not answer")]
    NoResponse,

    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

pub type NameResult<T> = std::result::Result<T, NameError>;
