//! Transport seam: dialing peers on a protocol and topic pubsub.

use async_trait::async_trait;
use pintswap_types::PeerId;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;

use crate::error::NetworkResult;

/// A bidirectional byte stream to one peer.
pub trait PeerStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> PeerStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

pub type BoxedStream = Box<dyn PeerStream>;

/// A stream a remote peer opened to us.
pub struct IncomingStream {
    pub peer: PeerId,
    pub protocol: String,
    pub stream: BoxedStream,
}

impl std::fmt::Debug for IncomingStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncomingStream")
            .field("peer", &self.peer)
            .field("protocol", &self.protocol)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PubsubMessage {
    pub from: PeerId,
    pub topic: String,
    pub data: Vec<u8>,
}

/// Capacity of the channels handed out by [`Network::subscribe`].
pub const SUBSCRIPTION_BUFFER: usize = 64;

#[async_trait]
pub trait Network: Send + Sync {
    fn local_peer_id(&self) -> &PeerId;

    /// Open a stream to `peer` speaking `protocol`.
    async fn dial(&self, peer: &PeerId, protocol: &str) -> NetworkResult<BoxedStream>;

    /// Deliver `data` to every peer subscribed to `topic`. Best effort.
    async fn publish(&self, topic: &str, data: Vec<u8>) -> NetworkResult<()>;

    /// Receive messages other peers publish on `topic`.
    async fn subscribe(&self, topic: &str) -> NetworkResult<mpsc::Receiver<PubsubMessage>>;
}
