use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use pintswap_chain::{
    wrapped_native, ChainProvider, JsonRpcProvider, LocalWallet, RelayClient, TransactionBuilder,
    Wallet, WalletApprover,
};
use pintswap_orderbook::Orderbook;
use pintswap_protocols::{
    ChainContext, Identity, IncomingStream, Pintswap, TcpNetwork, TradeContext, TradeHandle,
    TradeOutcome,
};
use pintswap_types::{Hash256, Offer, PeerId};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::config::{parse_amount, AppConfig};

pub struct PintswapApp {
    config: AppConfig,
    node: Arc<Pintswap>,
    incoming: mpsc::Receiver<IncomingStream>,
}

impl PintswapApp {
    /// Connect to the chain, bind the listener and assemble the node.
    /// One-shot commands pass `listen = false` to bind an ephemeral port.
    pub async fn new(config: AppConfig, listen: bool) -> anyhow::Result<Self> {
        config.validate()?;

        let provider: Arc<dyn ChainProvider> =
            Arc::new(JsonRpcProvider::new(config.chain.rpc_url.clone()));
        let chain_id = provider
            .chain_id()
            .await
            .with_context(|| format!("failed to reach chain at {}", config.chain.rpc_url))?;
        let wrapped = match config.wrapped_native()? {
            Some(address) => address,
            None => wrapped_native(chain_id).ok_or_else(|| {
                anyhow!("no wrapped-native token known for chain {chain_id}; set chain.wrapped_native")
            })?,
        };

        let tss = config.threshold_scheme(chain_id)?;
        warn!(
            chain_id,
            "Using the insecure cleartext two-party ECDSA scheme; counterparties can sign without this node"
        );

        let secret = std::env::var(&config.chain.private_key_env)
            .with_context(|| format!("{} is not set", config.chain.private_key_env))?;
        let wallet = Arc::new(
            LocalWallet::from_hex(&secret, provider.clone())?
                .with_poll_interval(config.receipt_poll_interval()),
        );
        let identity_secret = std::env::var(config.identity_key_env())
            .with_context(|| format!("{} is not set", config.identity_key_env()))?;
        let identity = Identity::from_hex(&identity_secret)?;

        info!("Initializing PintSwap node");
        info!("  Peer ID: {}", identity.peer_id());
        info!("  Chain ID: {}", chain_id);
        info!("  Wallet: {:?}", wallet.address());
        info!("  Wrapped native: {:?}", wrapped);

        let ctx = TradeContext {
            chain: ChainContext {
                provider: provider.clone(),
                wallet: wallet.clone(),
                approver: Arc::new(WalletApprover::new(
                    wallet.clone(),
                    wrapped,
                    config.trade.await_receipts,
                )),
                builder: Arc::new(TransactionBuilder::new(
                    provider.clone(),
                    config.builder_config(),
                )),
                relay: Arc::new(RelayClient::new(config.chain.relay_url.clone())),
                wrapped_native: wrapped,
                receipt_poll_interval: config.receipt_poll_interval(),
            },
            tss,
            orderbook: Arc::new(Orderbook::new()),
        };

        let listen_addr = if listen {
            config.listen_addr()?
        } else {
            "0.0.0.0:0".parse()?
        };
        let (network, incoming) = TcpNetwork::bind(identity, listen_addr).await?;
        for (peer, addr) in config.bootstrap_peers()? {
            network.add_peer(peer, addr).await;
        }

        let node = Arc::new(Pintswap::new(Arc::new(network), ctx, config.node_options()));
        Ok(Self {
            config,
            node,
            incoming,
        })
    }

    /// Serve until Ctrl-C.
    pub async fn run(self) -> anyhow::Result<()> {
        for offer in self.config.offers()? {
            let hash = self.node.list_offer(offer).await;
            info!(offer_hash = ?hash, "offer listed from config");
        }

        let (serve_task, mut trades) = self.node.serve(self.incoming);
        let publisher = self.node.start_publishing_offers();
        let (subscriber_task, mut updates) = self.node.subscribe_offers().await?;

        info!("===================================");
        info!("PintSwap node running");
        info!("===================================");

        loop {
            tokio::select! {
                Some(handle) = trades.recv() => {
                    tokio::spawn(report_trade(handle));
                }
                Some(update) = updates.recv() => {
                    info!(peer = %update.peer, offers = update.offers.len(), "peer offers updated");
                }
                result = tokio::signal::ctrl_c() => {
                    result.context("failed to listen for shutdown signal")?;
                    info!("Shutting down");
                    break;
                }
            }
        }

        publisher.stop().await;
        subscriber_task.abort();
        serve_task.abort();
        Ok(())
    }

    pub async fn orders(self, peer: &str) -> anyhow::Result<()> {
        let offers = self.node.get_trades_by_peer(&PeerId::from(peer)).await?;
        if offers.is_empty() {
            println!("{peer} has no offers");
        }
        for offer in offers {
            print_offer(&offer);
        }
        Ok(())
    }

    pub async fn fill(self, peer: &str, offer_hash: &str, amount: &str) -> anyhow::Result<()> {
        let peer = PeerId::from(peer);
        let hash = parse_hash(offer_hash)?;
        let amount = parse_amount(amount)?;

        let offers = self.node.get_trades_by_peer(&peer).await?;
        let offer = offers
            .into_iter()
            .find(|o| o.hash() == hash)
            .ok_or_else(|| anyhow!("{peer} does not list offer {offer_hash}"))?;

        let handle = self.node.create_trade(&peer, offer, amount).await?;
        let outcome = report_trade(handle).await?;
        if let Some(receipt) = outcome.receipt {
            println!(
                "settled in block {} by {:?}",
                receipt.block_number, receipt.transaction_hash
            );
        }
        Ok(())
    }

    pub async fn resolve(self, name: &str) -> anyhow::Result<()> {
        println!("{}", self.node.resolve_name(name).await?);
        Ok(())
    }

    pub async fn register(self, name: &str) -> anyhow::Result<()> {
        match self.node.register_name(name).await? {
            1 => println!("registered {name} for {}", self.node.peer_id()),
            status => bail!("name service refused {name} (status {status})"),
        }
        Ok(())
    }
}

/// Log a trade's progress and return its outcome.
async fn report_trade(mut handle: TradeHandle) -> anyhow::Result<TradeOutcome> {
    let (id, role, peer) = (handle.id(), handle.role(), handle.peer().clone());
    while let Some(event) = handle.next_event().await {
        info!(trade_id = %id, role = %role, peer = %peer, event = ?event, "trade event");
    }
    match handle.wait().await {
        Ok(outcome) => {
            info!(trade_id = %id, role = %role, "trade complete");
            Ok(outcome)
        }
        Err(e) => {
            error!(trade_id = %id, role = %role, error = %e, "trade failed");
            Err(e.into())
        }
    }
}

fn print_offer(offer: &Offer) {
    println!(
        "{:?}  gives {} of {:?}  gets {} of {:?}",
        offer.hash(),
        offer.gives_amount,
        offer.gives_token,
        offer.gets_amount,
        offer.gets_token
    );
}

fn parse_hash(s: &str) -> anyhow::Result<Hash256> {
    let bytes = hex::decode(s.trim_start_matches("0x"))
        .with_context(|| format!("invalid offer hash {s:?}"))?;
    if bytes.len() != 32 {
        bail!("offer hash {s:?} must be 32 bytes");
    }
    Ok(Hash256::from_slice(&bytes))
}
