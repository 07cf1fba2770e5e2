//! Periodic offer announcements and the subscriber that caches them.

use std::sync::Arc;
use std::time::Duration;

use pintswap_codec::{OfferList, WireMessage};
use pintswap_orderbook::{Orderbook, PeerOfferCache};
use pintswap_types::{Offer, PeerId};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::NetworkResult;
use crate::network::Network;
use crate::schema::PUBLISH_ORDERS_TOPIC;

pub const DEFAULT_PUBLISH_INTERVAL: Duration = Duration::from_secs(10);

/// Encoded snapshot of the local orderbook.
pub async fn encode_offers(orderbook: &Orderbook) -> Vec<u8> {
    OfferList::new(orderbook.snapshot().await).encode()
}

/// Controls a running publish loop.
pub struct PublisherHandle {
    interval: watch::Sender<Duration>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl PublisherHandle {
    /// Change the period; takes effect after the current wait.
    pub fn set_interval(&self, interval: Duration) {
        let _ = self.interval.send(interval);
    }

    pub fn interval(&self) -> Duration {
        *self.interval.borrow()
    }

    /// Stop publishing and wait for the loop to exit.
    pub async fn stop(self) {
        self.cancel.cancel();
        let _ = self.task.await;
    }
}

/// Publish the orderbook on [`PUBLISH_ORDERS_TOPIC`] every `interval`,
/// starting immediately.
pub fn start_publishing_offers(
    network: Arc<dyn Network>,
    orderbook: Arc<Orderbook>,
    interval: Duration,
) -> PublisherHandle {
    let (interval_tx, mut interval_rx) = watch::channel(interval);
    let cancel = CancellationToken::new();
    let token = cancel.clone();

    let task = tokio::spawn(async move {
        info!(interval_ms = interval.as_millis() as u64, "publishing offers");
        loop {
            let payload = encode_offers(&orderbook).await;
            match network.publish(PUBLISH_ORDERS_TOPIC, payload).await {
                Ok(()) => debug!("published offers"),
                Err(e) => warn!(error = %e, "failed to publish offers"),
            }

            let period = *interval_rx.borrow_and_update();
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(period) => {}
            }
        }
        info!("stopped publishing offers");
    });

    PublisherHandle {
        interval: interval_tx,
        cancel,
        task,
    }
}

/// A peer announced an offer list different from the one cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerOffersUpdated {
    pub peer: PeerId,
    pub offers: Vec<Offer>,
}

/// Feed announcements into `cache`, reporting changed lists on the returned
/// channel. Undecodable announcements are logged and dropped.
pub async fn subscribe_offers(
    network: Arc<dyn Network>,
    cache: Arc<PeerOfferCache>,
) -> NetworkResult<(JoinHandle<()>, mpsc::Receiver<PeerOffersUpdated>)> {
    let mut messages = network.subscribe(PUBLISH_ORDERS_TOPIC).await?;
    let (tx, rx) = mpsc::channel(64);

    let task = tokio::spawn(async move {
        while let Some(message) = messages.recv().await {
            match cache.update(&message.from, &message.data).await {
                Ok(true) => {
                    let offers = cache.get(&message.from).await.unwrap_or_default();
                    debug!(peer = %message.from, offers = offers.len(), "peer offers changed");
                    // A lagging listener misses updates; the cache stays current.
                    let _ = tx.try_send(PeerOffersUpdated {
                        peer: message.from,
                        offers,
                    });
                }
                Ok(false) => {}
                Err(e) => warn!(peer = %message.from, error = %e, "bad offer announcement"),
            }
        }
    });

    Ok((task, rx))
}
