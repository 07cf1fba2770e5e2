//! In-process network for tests and single-machine setups.
//!
//! Every [`MemoryNetwork`] joined to the same [`MemoryHub`] can dial the
//! others by peer id. Streams are `tokio::io::duplex` pairs.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use pintswap_types::PeerId;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, trace};

use crate::error::{NetworkError, NetworkResult};
use crate::network::{BoxedStream, IncomingStream, Network, PubsubMessage, SUBSCRIPTION_BUFFER};

/// Bytes buffered in each direction of a stream.
const STREAM_BUFFER: usize = 1024 * 1024;

const INCOMING_BUFFER: usize = 32;

struct Member {
    incoming: mpsc::Sender<IncomingStream>,
    subscriptions: HashMap<String, Vec<mpsc::Sender<PubsubMessage>>>,
}

/// Shared routing table of an in-process network.
#[derive(Clone, Default)]
pub struct MemoryHub {
    members: Arc<Mutex<HashMap<PeerId, Member>>>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `peer`. Streams other members open to it arrive on the
    /// returned receiver. Joining again replaces the previous registration.
    pub async fn join(&self, peer: PeerId) -> (MemoryNetwork, mpsc::Receiver<IncomingStream>) {
        let (tx, rx) = mpsc::channel(INCOMING_BUFFER);
        self.members.lock().await.insert(
            peer.clone(),
            Member {
                incoming: tx,
                subscriptions: HashMap::new(),
            },
        );
        debug!(peer = %peer, "joined memory network");
        (
            MemoryNetwork {
                local: peer,
                hub: self.clone(),
            },
            rx,
        )
    }

    /// Remove `peer`; later dials to it fail with `PeerNotFound`.
    pub async fn leave(&self, peer: &PeerId) {
        self.members.lock().await.remove(peer);
    }
}

pub struct MemoryNetwork {
    local: PeerId,
    hub: MemoryHub,
}

#[async_trait]
impl Network for MemoryNetwork {
    fn local_peer_id(&self) -> &PeerId {
        &self.local
    }

    async fn dial(&self, peer: &PeerId, protocol: &str) -> NetworkResult<BoxedStream> {
        let incoming = {
            let members = self.hub.members.lock().await;
            members
                .get(peer)
                .map(|m| m.incoming.clone())
                .ok_or_else(|| NetworkError::PeerNotFound(peer.clone()))?
        };

        let (ours, theirs) = tokio::io::duplex(STREAM_BUFFER);
        incoming
            .send(IncomingStream {
                peer: self.local.clone(),
                protocol: protocol.to_string(),
                stream: Box::new(theirs),
            })
            .await
            .map_err(|_| NetworkError::PeerNotFound(peer.clone()))?;
        trace!(from = %self.local, to = %peer, protocol, "opened memory stream");
        Ok(Box::new(ours))
    }

    async fn publish(&self, topic: &str, data: Vec<u8>) -> NetworkResult<()> {
        let mut members = self.hub.members.lock().await;
        for (peer, member) in members.iter_mut() {
            if *peer == self.local {
                continue;
            }
            if let Some(subscribers) = member.subscriptions.get_mut(topic) {
                subscribers.retain(|tx| !tx.is_closed());
                for tx in subscribers.iter() {
                    // Slow subscribers miss messages rather than stall publishers.
                    let _ = tx.try_send(PubsubMessage {
                        from: self.local.clone(),
                        topic: topic.to_string(),
                        data: data.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> NetworkResult<mpsc::Receiver<PubsubMessage>> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let mut members = self.hub.members.lock().await;
        let member = members.get_mut(&self.local).ok_or(NetworkError::Closed)?;
        member
            .subscriptions
            .entry(topic.to_string())
            .or_default()
            .push(tx);
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_dial_delivers_incoming_stream() {
        let hub = MemoryHub::new();
        let (alice, _alice_rx) = hub.join(PeerId::from("alice")).await;
        let (_bob, mut bob_rx) = hub.join(PeerId::from("bob")).await;

        let mut stream = alice.dial(&PeerId::from("bob"), "/test").await.unwrap();
        stream.write_all(b"hi").await.unwrap();

        let mut incoming = bob_rx.recv().await.unwrap();
        assert_eq!(incoming.peer, PeerId::from("alice"));
        assert_eq!(incoming.protocol, "/test");
        let mut buf = [0u8; 2];
        incoming.stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hi");
    }

    #[tokio::test]
    async fn test_dial_unknown_peer() {
        let hub = MemoryHub::new();
        let (alice, _rx) = hub.join(PeerId::from("alice")).await;
        let err = alice.dial(&PeerId::from("nobody"), "/test").await.err().unwrap();
        assert!(matches!(err, NetworkError::PeerNotFound(_)));
    }

    #[tokio::test]
    async fn test_publish_skips_sender() {
        let hub = MemoryHub::new();
        let (alice, _a) = hub.join(PeerId::from("alice")).await;
        let (bob, _b) = hub.join(PeerId::from("bob")).await;

        let mut alice_sub = alice.subscribe("topic").await.unwrap();
        let mut bob_sub = bob.subscribe("topic").await.unwrap();
        alice.publish("topic", vec![1, 2]).await.unwrap();

        let msg = bob_sub.recv().await.unwrap();
        assert_eq!(msg.from, PeerId::from("alice"));
        assert_eq!(msg.data, vec![1, 2]);
        assert!(alice_sub.try_recv().is_err());
    }
}
