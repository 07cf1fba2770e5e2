use std::collections::HashMap;

use pintswap_types::{Hash256, Offer};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{OrderbookError, OrderbookResult};

struct Listing {
    seq: u64,
    offer: Offer,
}

#[derive(Default)]
struct BookState {
    listed: HashMap<Hash256, Listing>,
    /// Listing positions of offers held by in-flight trades, so a restore
    /// puts them back where they were. Drained by `finalize`, `restore` and
    /// `remove`; the trade driver always ends in one of the first two.
    reserved: HashMap<Hash256, u64>,
    next_seq: u64,
}

impl BookState {
    fn insert(&mut self, hash: Hash256, offer: Offer, seq: Option<u64>) {
        let seq = seq.unwrap_or_else(|| {
            self.next_seq += 1;
            self.next_seq
        });
        self.listed.entry(hash).or_insert(Listing { seq, offer });
    }
}

/// The offers this node currently makes, keyed by offer hash.
///
/// Every operation takes the same lock, so reservations made by concurrent
/// trades never overlap.
#[derive(Default)]
pub struct Orderbook {
    state: Mutex<BookState>,
}

impl Orderbook {
    pub fn new() -> Self {
        Self::default()
    }

    /// List an offer and return its hash. Listing the same offer twice is a no-op.
    pub async fn list(&self, offer: Offer) -> Hash256 {
        let hash = offer.hash();
        self.state.lock().await.insert(hash, offer, None);
        info!(offer_hash = ?hash, "listed offer");
        hash
    }

    pub async fn get(&self, hash: &Hash256) -> Option<Offer> {
        self.state.lock().await.listed.get(hash).map(|l| l.offer)
    }

    pub async fn contains(&self, hash: &Hash256) -> bool {
        self.state.lock().await.listed.contains_key(hash)
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.listed.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.listed.is_empty()
    }

    /// Delist an offer outright. An offer held by an in-flight trade loses its
    /// reservation and is not restored if that trade fails.
    pub async fn remove(&self, hash: &Hash256) -> Option<Offer> {
        let mut state = self.state.lock().await;
        if state.reserved.remove(hash).is_some() {
            debug!(offer_hash = ?hash, "withdrew reservation");
        }
        state.listed.remove(hash).map(|l| l.offer)
    }

    /// Remove and return every offer in `hashes`, or nothing at all.
    ///
    /// Fails with [`OrderbookError::UnknownOffer`] for the first hash that is
    /// not listed, which includes hashes already reserved by another trade and
    /// a hash repeated within `hashes`.
    pub async fn reserve(&self, hashes: &[Hash256]) -> OrderbookResult<Vec<Offer>> {
        let mut state = self.state.lock().await;

        for (i, hash) in hashes.iter().enumerate() {
            if !state.listed.contains_key(hash) || hashes[..i].contains(hash) {
                return Err(OrderbookError::UnknownOffer(*hash));
            }
        }

        let mut offers = Vec::with_capacity(hashes.len());
        for hash in hashes {
            if let Some(listing) = state.listed.remove(hash) {
                state.reserved.insert(*hash, listing.seq);
                offers.push(listing.offer);
            }
        }

        debug!(count = offers.len(), "reserved offers");
        Ok(offers)
    }

    /// Put reserved offers back after a failed trade. Offers removed while
    /// reserved stay delisted.
    pub async fn restore(&self, offers: &[Offer]) {
        let mut state = self.state.lock().await;
        let mut restored = 0;
        for offer in offers {
            let hash = offer.hash();
            if let Some(seq) = state.reserved.remove(&hash) {
                state.insert(hash, *offer, Some(seq));
                restored += 1;
            }
        }
        info!(count = restored, "restored offers");
    }

    /// Forget reservations after a successful trade. The offers stay delisted.
    pub async fn finalize(&self, hashes: &[Hash256]) {
        let mut state = self.state.lock().await;
        for hash in hashes {
            state.reserved.remove(hash);
        }
        debug!(count = hashes.len(), "finalized reservations");
    }

    /// Listed offers in listing order.
    pub async fn snapshot(&self) -> Vec<Offer> {
        let state = self.state.lock().await;
        let mut listings: Vec<&Listing> = state.listed.values().collect();
        listings.sort_by_key(|l| l.seq);
        listings.into_iter().map(|l| l.offer).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use pintswap_types::Address;

    fn offer(gives: u64, gets: u64) -> Offer {
        Offer::new(Address::repeat_byte(1), Address::repeat_byte(2), gives, gets)
    }

    #[tokio::test]
    async fn test_list_is_idempotent() {
        let book = Orderbook::new();
        let h1 = book.list(offer(100, 50)).await;
        let h2 = book.list(offer(100, 50)).await;
        assert_eq!(h1, h2);
        assert_eq!(h1, offer(100, 50).hash());
        assert_eq!(book.len().await, 1);
        assert_eq!(book.get(&h1).await, Some(offer(100, 50)));
    }

    #[tokio::test]
    async fn test_reserve_all_or_nothing() {
        let book = Orderbook::new();
        let h1 = book.list(offer(100, 50)).await;
        let missing = offer(1, 1).hash();

        let err = book.reserve(&[h1, missing]).await.unwrap_err();
        assert_eq!(err, OrderbookError::UnknownOffer(missing));
        assert!(book.contains(&h1).await);

        let taken = book.reserve(&[h1]).await.unwrap();
        assert_eq!(taken, vec![offer(100, 50)]);
        assert!(book.is_empty().await);
    }

    #[tokio::test]
    async fn test_reserve_rejects_duplicate_hash() {
        let book = Orderbook::new();
        let h1 = book.list(offer(100, 50)).await;
        assert_eq!(
            book.reserve(&[h1, h1]).await,
            Err(OrderbookError::UnknownOffer(h1))
        );
        assert!(book.contains(&h1).await);
    }

    #[tokio::test]
    async fn test_restore_reproduces_state() {
        let book = Orderbook::new();
        let h1 = book.list(offer(100, 50)).await;
        let h2 = book.list(offer(10, 5)).await;
        let h3 = book.list(offer(7, 3)).await;
        let before = book.snapshot().await;

        let taken = book.reserve(&[h2, h1]).await.unwrap();
        assert_eq!(book.snapshot().await, vec![offer(7, 3)]);

        book.restore(&taken).await;
        assert_eq!(book.snapshot().await, before);
        assert!(book.contains(&h3).await);
    }

    #[tokio::test]
    async fn test_finalize_keeps_offers_delisted() {
        let book = Orderbook::new();
        let h1 = book.list(offer(100, 50)).await;
        book.reserve(&[h1]).await.unwrap();
        book.finalize(&[h1]).await;
        assert!(!book.contains(&h1).await);
        assert_eq!(book.reserve(&[h1]).await, Err(OrderbookError::UnknownOffer(h1)));
    }

    #[tokio::test]
    async fn test_remove_withdraws_reservation() {
        let book = Orderbook::new();
        let h1 = book.list(offer(100, 50)).await;
        let h2 = book.list(offer(10, 5)).await;
        let taken = book.reserve(&[h1, h2]).await.unwrap();

        assert_eq!(book.remove(&h1).await, None);
        assert_eq!(book.state.lock().await.reserved.len(), 1);

        book.restore(&taken).await;
        assert!(!book.contains(&h1).await);
        assert!(book.contains(&h2).await);
        assert!(book.state.lock().await.reserved.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_overlapping_reservations() {
        let book = Arc::new(Orderbook::new());
        let shared = book.list(offer(100, 50)).await;
        let a_only = book.list(offer(10, 5)).await;
        let b_only = book.list(offer(7, 3)).await;

        let mut handles = Vec::new();
        for own in [a_only, b_only] {
            let book = book.clone();
            handles.push(tokio::spawn(async move { book.reserve(&[own, shared]).await }));
        }

        let mut successes = 0;
        let mut failures = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(OrderbookError::UnknownOffer(hash)) => {
                    assert_eq!(hash, shared);
                    failures += 1;
                }
            }
        }
        assert_eq!((successes, failures), (1, 1));
        // the loser's own offer is untouched
        assert_eq!(book.len().await, 1);
    }
}
