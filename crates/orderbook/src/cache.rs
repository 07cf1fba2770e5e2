use std::collections::HashMap;

use pintswap_codec::{CodecResult, OfferList, WireMessage};
use pintswap_types::{keccak256, Hash256, Offer, PeerId};
use tokio::sync::RwLock;
use tracing::debug;

struct CachedList {
    payload_hash: Hash256,
    offers: Vec<Offer>,
}

/// Last offer list announced by each remote peer.
#[derive(Default)]
pub struct PeerOfferCache {
    peers: RwLock<HashMap<PeerId, CachedList>>,
}

impl PeerOfferCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an announced `OfferList` payload.
    ///
    /// Returns `true` when the peer's list changed. A payload identical to the
    /// cached one is not decoded again.
    pub async fn update(&self, peer: &PeerId, payload: &[u8]) -> CodecResult<bool> {
        let payload_hash = keccak256(payload);
        {
            let peers = self.peers.read().await;
            if peers.get(peer).map(|c| c.payload_hash) == Some(payload_hash) {
                return Ok(false);
            }
        }

        let offers = OfferList::decode(payload)?.offers;
        debug!(peer = %peer, count = offers.len(), "peer orderbook changed");
        self.peers.write().await.insert(
            peer.clone(),
            CachedList {
                payload_hash,
                offers,
            },
        );
        Ok(true)
    }

    /// Store a list fetched directly from the peer.
    pub async fn insert(&self, peer: &PeerId, offers: Vec<Offer>) {
        let payload_hash = keccak256(&OfferList::new(offers.clone()).encode());
        self.peers.write().await.insert(
            peer.clone(),
            CachedList {
                payload_hash,
                offers,
            },
        );
    }

    pub async fn get(&self, peer: &PeerId) -> Option<Vec<Offer>> {
        self.peers.read().await.get(peer).map(|c| c.offers.clone())
    }

    pub async fn peers(&self) -> Vec<PeerId> {
        self.peers.read().await.keys().cloned().collect()
    }

    pub async fn remove(&self, peer: &PeerId) -> bool {
        self.peers.write().await.remove(peer).is_some()
    }
}
