//! Shared fixtures: an in-memory chain, recording wallets and nodes joined
//! to a [`MemoryHub`] or bound to loopback TCP.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pintswap_chain::{
    transaction_hash, BuilderConfig, CallRequest, ChainProvider, ChainResult,
    RelayClient, TransactionBuilder, TransactionReceipt, TransactionRequest, Wallet,
    WalletApprover,
};
use pintswap_orderbook::Orderbook;
use pintswap_protocols::{
    ChainContext, Identity, IncomingStream, MemoryHub, Network, NodeOptions, Pintswap,
    TcpNetwork, TradeContext, TradeHandle,
};
use pintswap_tss::CleartextEcdsa;
use pintswap_types::{Address, Hash256, Offer, PeerId, U256};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

pub const CHAIN_ID: u64 = 1;

pub fn token_a() -> Address {
    Address::repeat_byte(0xaa)
}

pub fn token_b() -> Address {
    Address::repeat_byte(0xbb)
}

pub fn weth() -> Address {
    Address::repeat_byte(0xee)
}

/// 100 of token A for 50 of token B.
pub fn reference_offer() -> Offer {
    Offer::new(token_a(), token_b(), 100u64, 50u64)
}

#[derive(Default)]
struct ChainState {
    nonces: HashMap<Address, u64>,
    broadcast: Vec<Vec<u8>>,
}

/// A chain every node in a test shares, so both sides see the same nonces.
pub struct MockChain {
    state: Mutex<ChainState>,
}

impl MockChain {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ChainState::default()),
        }
    }

    pub async fn broadcast(&self) -> Vec<Vec<u8>> {
        self.state.lock().await.broadcast.clone()
    }
}

#[async_trait]
impl ChainProvider for MockChain {
    async fn chain_id(&self) -> ChainResult<u64> {
        Ok(CHAIN_ID)
    }

    async fn transaction_count(&self, address: Address) -> ChainResult<u64> {
        Ok(self.state.lock().await.nonces.get(&address).copied().unwrap_or(0))
    }

    async fn balance(&self, _address: Address) -> ChainResult<U256> {
        Ok(U256::zero())
    }

    async fn gas_price(&self) -> ChainResult<U256> {
        Ok(U256::from(10u64))
    }

    async fn base_fee(&self) -> ChainResult<U256> {
        Ok(U256::from(8u64))
    }

    async fn estimate_gas(&self, _request: &CallRequest) -> ChainResult<U256> {
        Ok(U256::from(150_000u64))
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> ChainResult<Hash256> {
        self.state.lock().await.broadcast.push(raw.to_vec());
        Ok(transaction_hash(raw))
    }

    async fn transaction_receipt(&self, hash: Hash256) -> ChainResult<Option<TransactionReceipt>> {
        Ok(Some(TransactionReceipt {
            transaction_hash: hash,
            block_number: 1,
            status: true,
            gas_used: U256::from(120_000u64),
            contract_address: None,
        }))
    }
}

/// Records every request; each transaction is included immediately.
pub struct MockWallet {
    address: Address,
    requests: Mutex<Vec<TransactionRequest>>,
}

impl MockWallet {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub async fn requests(&self) -> Vec<TransactionRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl Wallet for MockWallet {
    fn address(&self) -> Address {
        self.address
    }

    async fn send_transaction(&self, request: TransactionRequest) -> ChainResult<Hash256> {
        let mut requests = self.requests.lock().await;
        requests.push(request);
        let mut seed = self.address.as_bytes().to_vec();
        seed.extend_from_slice(&(requests.len() as u64).to_be_bytes());
        Ok(pintswap_types::keccak256(&seed))
    }

    async fn wait_for_transaction(&self, hash: Hash256) -> ChainResult<TransactionReceipt> {
        Ok(TransactionReceipt {
            transaction_hash: hash,
            block_number: 1,
            status: true,
            gas_used: U256::from(46_000u64),
            contract_address: None,
        })
    }
}

pub struct TestNode {
    pub node: Arc<Pintswap>,
    pub wallet: Arc<MockWallet>,
    /// Trades counterparties opened against this node.
    pub trades: mpsc::UnboundedReceiver<TradeHandle>,
    pub serve: JoinHandle<()>,
}

impl TestNode {
    pub fn peer_id(&self) -> PeerId {
        self.node.peer_id().clone()
    }

    pub fn orderbook(&self) -> &Arc<Orderbook> {
        self.node.orderbook()
    }

    pub async fn next_trade(&mut self) -> TradeHandle {
        tokio::time::timeout(Duration::from_secs(5), self.trades.recv())
            .await
            .expect("no trade within 5s")
            .expect("node stopped serving")
    }
}

pub fn test_options() -> NodeOptions {
    NodeOptions {
        orders_retry_delay: Duration::from_millis(10),
        orders_max_attempts: 3,
        ..NodeOptions::default()
    }
}

/// Join `name` to `hub` with its own wallet against the shared `chain`.
pub async fn spawn_node(
    hub: &MemoryHub,
    chain: Arc<MockChain>,
    name: &str,
    wallet_byte: u8,
    wrapped_native: Address,
    options: NodeOptions,
) -> TestNode {
    let (network, incoming) = hub.join(PeerId::from(name)).await;
    start_node(
        Arc::new(network),
        incoming,
        chain,
        wallet_byte,
        wrapped_native,
        options,
    )
}

/// Bind a node with a fresh identity on a loopback port.
pub async fn spawn_tcp_node(
    chain: Arc<MockChain>,
    wallet_byte: u8,
    options: NodeOptions,
) -> (TestNode, Arc<TcpNetwork>) {
    let (network, incoming) = TcpNetwork::bind(Identity::random(), "127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    let network = Arc::new(network);
    let node = start_node(
        network.clone(),
        incoming,
        chain,
        wallet_byte,
        weth(),
        options,
    );
    (node, network)
}

fn start_node(
    network: Arc<dyn Network>,
    incoming: mpsc::Receiver<IncomingStream>,
    chain: Arc<MockChain>,
    wallet_byte: u8,
    wrapped_native: Address,
    options: NodeOptions,
) -> TestNode {
    let wallet = Arc::new(MockWallet::new(Address::repeat_byte(wallet_byte)));
    let builder = TransactionBuilder::new(
        chain.clone(),
        BuilderConfig {
            retry_delay: Duration::from_millis(10),
            ..BuilderConfig::default()
        },
    );
    let ctx = TradeContext {
        chain: ChainContext {
            provider: chain,
            wallet: wallet.clone(),
            approver: Arc::new(WalletApprover::new(wallet.clone(), wrapped_native, false)),
            builder: Arc::new(builder),
            relay: Arc::new(RelayClient::default()),
            wrapped_native,
            receipt_poll_interval: Duration::from_millis(10),
        },
        tss: Arc::new(CleartextEcdsa),
        orderbook: Arc::new(Orderbook::new()),
    };

    let node = Arc::new(Pintswap::new(network, ctx, options));
    let (serve, trades) = node.serve(incoming);
    TestNode {
        node,
        wallet,
        trades,
        serve,
    }
}

/// A maker (wallet 0x11) and a taker (wallet 0x22) on one chain.
pub async fn maker_and_taker(hub: &MemoryHub) -> (TestNode, TestNode, Arc<MockChain>) {
    let chain = Arc::new(MockChain::new());
    let maker = spawn_node(hub, chain.clone(), "maker", 0x11, weth(), test_options()).await;
    let taker = spawn_node(hub, chain.clone(), "taker", 0x22, weth(), test_options()).await;
    (maker, taker, chain)
}
