//! The PintSwap node: one handle over the local orderbook, the peer
//! protocols and trade spawning.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use pintswap_codec::{FramedStream, OfferList, WireMessage};
use pintswap_orderbook::{Orderbook, PeerOfferCache};
use pintswap_types::{Hash256, Offer, PeerId, U256};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::broadcast::{self, encode_offers, PeerOffersUpdated, PublisherHandle};
use crate::error::{NameResult, NetworkError, NetworkResult, TradeResult};
use crate::names::{NameClient, NameRegistry};
use crate::network::{BoxedStream, IncomingStream, Network};
use crate::schema::{
    CREATE_TRADE_PROTOCOL, NAME_QUERY_PROTOCOL, NAME_REGISTER_PROTOCOL, ORDERS_PROTOCOL,
};
use crate::trade::{spawn_trade, MakerMachine, TakerMachine, TradeContext, TradeHandle};

pub const DEFAULT_ORDERS_RETRY_DELAY: Duration = Duration::from_secs(3);
pub const DEFAULT_ORDERS_MAX_ATTEMPTS: u32 = 10;

#[derive(Debug, Clone)]
pub struct NodeOptions {
    /// Taker trades wait for the settlement receipt before completing.
    pub await_receipt: bool,
    pub publish_interval: Duration,
    /// Delay between `/orders` dials while the peer is not yet reachable.
    pub orders_retry_delay: Duration,
    pub orders_max_attempts: u32,
    /// Name-service peers per TLD.
    pub name_servers: HashMap<String, Vec<PeerId>>,
    /// Answer `/ns/*` streams from a local registry.
    pub serve_names: bool,
}

impl Default for NodeOptions {
    fn default() -> Self {
        Self {
            await_receipt: true,
            publish_interval: broadcast::DEFAULT_PUBLISH_INTERVAL,
            orders_retry_delay: DEFAULT_ORDERS_RETRY_DELAY,
            orders_max_attempts: DEFAULT_ORDERS_MAX_ATTEMPTS,
            name_servers: HashMap::new(),
            serve_names: false,
        }
    }
}

pub struct Pintswap {
    network: Arc<dyn Network>,
    ctx: Arc<TradeContext>,
    peer_offers: Arc<PeerOfferCache>,
    names: NameClient,
    registry: Option<Arc<NameRegistry>>,
    options: NodeOptions,
}

impl Pintswap {
    pub fn new(network: Arc<dyn Network>, ctx: TradeContext, options: NodeOptions) -> Self {
        let names = NameClient::new(network.clone(), options.name_servers.clone());
        let registry = options.serve_names.then(|| Arc::new(NameRegistry::new()));
        Self {
            network,
            ctx: Arc::new(ctx),
            peer_offers: Arc::new(PeerOfferCache::new()),
            names,
            registry,
            options,
        }
    }

    pub fn peer_id(&self) -> &PeerId {
        self.network.local_peer_id()
    }

    pub fn orderbook(&self) -> &Arc<Orderbook> {
        &self.ctx.orderbook
    }

    pub fn peer_offers(&self) -> &Arc<PeerOfferCache> {
        &self.peer_offers
    }

    pub fn options(&self) -> &NodeOptions {
        &self.options
    }

    /// Add an offer to the local book. Returns its hash.
    pub async fn list_offer(&self, offer: Offer) -> Hash256 {
        self.ctx.orderbook.list(offer).await
    }

    /// Serve incoming streams until the receiver closes. Trades started by
    /// counterparties are reported on the returned channel.
    pub fn serve(
        self: &Arc<Self>,
        mut incoming: mpsc::Receiver<IncomingStream>,
    ) -> (JoinHandle<()>, mpsc::UnboundedReceiver<TradeHandle>) {
        let (trades_tx, trades_rx) = mpsc::unbounded_channel();
        let node = Arc::clone(self);

        let task = tokio::spawn(async move {
            info!(peer = %node.peer_id(), "serving peer protocols");
            while let Some(stream) = incoming.recv().await {
                node.handle_incoming(stream, &trades_tx);
            }
            info!("incoming stream channel closed");
        });

        (task, trades_rx)
    }

    fn handle_incoming(
        &self,
        incoming: IncomingStream,
        trades: &mpsc::UnboundedSender<TradeHandle>,
    ) {
        let IncomingStream {
            peer,
            protocol,
            stream,
        } = incoming;
        debug!(peer = %peer, protocol = %protocol, "incoming stream");

        match protocol.as_str() {
            ORDERS_PROTOCOL => {
                let orderbook = self.ctx.orderbook.clone();
                tokio::spawn(async move {
                    if let Err(e) = send_offers(&orderbook, stream).await {
                        warn!(peer = %peer, error = %e, "failed to send offers");
                    }
                });
            }
            CREATE_TRADE_PROTOCOL => {
                let machine = MakerMachine::new(
                    self.ctx.chain.wallet.address(),
                    self.ctx.chain.wrapped_native,
                    self.ctx.tss.clone(),
                );
                let handle = spawn_trade(machine, stream, peer, self.ctx.clone());
                // Nobody listening is fine; the trade still runs.
                let _ = trades.send(handle);
            }
            NAME_QUERY_PROTOCOL => self.answer_names(peer, stream, true),
            NAME_REGISTER_PROTOCOL => self.answer_names(peer, stream, false),
            other => warn!(peer = %peer, protocol = other, "unsupported protocol"),
        }
    }

    fn answer_names(&self, peer: PeerId, stream: BoxedStream, query: bool) {
        let Some(registry) = self.registry.clone() else {
            debug!(peer = %peer, "not a name server; dropping stream");
            return;
        };
        tokio::spawn(async move {
            let result = if query {
                registry.handle_query(stream).await
            } else {
                registry.handle_register(&peer, stream).await
            };
            if let Err(e) = result {
                warn!(peer = %peer, error = %e, "name service request failed");
            }
        });
    }

    /// Fetch a peer's offers over `/orders` and cache them. Dials are
    /// retried while the peer is not yet known to the network.
    pub async fn get_trades_by_peer(&self, peer: &PeerId) -> NetworkResult<Vec<Offer>> {
        let mut attempt = 1;
        let stream = loop {
            match self.network.dial(peer, ORDERS_PROTOCOL).await {
                Ok(stream) => break stream,
                Err(NetworkError::PeerNotFound(_)) if attempt < self.options.orders_max_attempts => {
                    debug!(peer = %peer, attempt, "peer not found; retrying");
                    attempt += 1;
                    tokio::time::sleep(self.options.orders_retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        };

        let mut framed = FramedStream::new(stream);
        let payload = framed.read_frame().await?.ok_or(NetworkError::Closed)?;
        let offers = OfferList::decode(&payload)?.offers;
        self.peer_offers.insert(peer, offers.clone()).await;
        info!(peer = %peer, offers = offers.len(), "fetched peer offers");
        Ok(offers)
    }

    /// Take `amount` of the maker's `offer`.
    pub async fn create_trade(
        &self,
        peer: &PeerId,
        offer: Offer,
        amount: U256,
    ) -> TradeResult<TradeHandle> {
        self.create_batch_trade(peer, &[(offer, amount)]).await
    }

    /// Take several of one maker's offers in a single settlement. All legs
    /// must share a token pair.
    pub async fn create_batch_trade(
        &self,
        peer: &PeerId,
        legs: &[(Offer, U256)],
    ) -> TradeResult<TradeHandle> {
        let machine = TakerMachine::new(
            legs,
            self.ctx.chain.wallet.address(),
            self.ctx.chain.wrapped_native,
            self.ctx.tss.clone(),
        )?
        .with_await_receipt(self.options.await_receipt);

        let stream = self.network.dial(peer, CREATE_TRADE_PROTOCOL).await?;
        Ok(spawn_trade(machine, stream, peer.clone(), self.ctx.clone()))
    }

    pub fn start_publishing_offers(&self) -> PublisherHandle {
        broadcast::start_publishing_offers(
            self.network.clone(),
            self.ctx.orderbook.clone(),
            self.options.publish_interval,
        )
    }

    pub async fn subscribe_offers(
        &self,
    ) -> NetworkResult<(JoinHandle<()>, mpsc::Receiver<PeerOffersUpdated>)> {
        broadcast::subscribe_offers(self.network.clone(), self.peer_offers.clone()).await
    }

    pub async fn resolve_name(&self, name: &str) -> NameResult<String> {
        self.names.resolve(name).await
    }

    pub async fn register_name(&self, name: &str) -> NameResult<i32> {
        self.names.register(name).await
    }
}

async fn send_offers(orderbook: &Orderbook, stream: BoxedStream) -> NetworkResult<()> {
    let mut framed = FramedStream::new(stream);
    framed.write_frame(&encode_offers(orderbook).await).await?;
    framed.close().await?;
    Ok(())
}
