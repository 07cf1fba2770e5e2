//! Orders fetch, offer broadcast and the name service through the node.

mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use common::*;
use pintswap_codec::FramedStream;
use pintswap_protocols::schema::NAME_REGISTER_PROTOCOL;
use pintswap_protocols::{Identity, MemoryHub, NameError, NetworkError, NodeOptions};
use pintswap_types::{Offer, PeerId};
use tokio::net::TcpStream;

#[tokio::test]
async fn test_get_trades_by_peer_caches_offers() {
    let hub = MemoryHub::new();
    let (maker, taker, _chain) = maker_and_taker(&hub).await;
    maker.node.list_offer(reference_offer()).await;

    let offers = taker.node.get_trades_by_peer(&maker.peer_id()).await.unwrap();
    assert_eq!(offers, vec![reference_offer()]);
    assert_eq!(
        taker.node.peer_offers().get(&maker.peer_id()).await,
        Some(vec![reference_offer()])
    );
}

#[tokio::test]
async fn test_get_trades_by_peer_waits_for_peer() {
    let hub = MemoryHub::new();
    let chain = Arc::new(MockChain::new());
    let options = NodeOptions {
        orders_max_attempts: 100,
        ..test_options()
    };
    let taker = spawn_node(&hub, chain.clone(), "taker", 0x22, weth(), options).await;

    let late_hub = hub.clone();
    let late = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        let maker = spawn_node(&late_hub, chain, "maker", 0x11, weth(), test_options()).await;
        maker.node.list_offer(reference_offer()).await;
        maker
    });

    let offers = taker
        .node
        .get_trades_by_peer(&PeerId::from("maker"))
        .await
        .unwrap();
    // The maker may answer before or after listing.
    assert!(offers.len() <= 1);
    late.await.unwrap();
}

#[tokio::test]
async fn test_get_trades_by_peer_gives_up() {
    let hub = MemoryHub::new();
    let (_maker, taker, _chain) = maker_and_taker(&hub).await;

    let result = taker.node.get_trades_by_peer(&PeerId::from("nobody")).await;
    assert!(matches!(result, Err(NetworkError::PeerNotFound(_))));
}

#[tokio::test]
async fn test_published_offers_reach_subscribers() {
    let hub = MemoryHub::new();
    let (maker, taker, _chain) = maker_and_taker(&hub).await;
    let (_task, mut updates) = taker.node.subscribe_offers().await.unwrap();

    let second = Offer::new(token_b(), token_a(), 7u64, 9u64);
    maker.node.list_offer(reference_offer()).await;
    maker.node.list_offer(second).await;
    let publisher = maker.node.start_publishing_offers();

    let update = tokio::time::timeout(Duration::from_secs(5), updates.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(update.peer, maker.peer_id());
    assert_eq!(update.offers.len(), 2);
    assert_eq!(
        taker.node.peer_offers().get(&maker.peer_id()).await.map(|o| o.len()),
        Some(2)
    );
    publisher.stop().await;
}

#[tokio::test]
async fn test_names_through_nodes() {
    let hub = MemoryHub::new();
    let chain = Arc::new(MockChain::new());
    let server_options = NodeOptions {
        serve_names: true,
        ..test_options()
    };
    let _server = spawn_node(&hub, chain.clone(), "QmServer", 0x01, weth(), server_options).await;

    let servers: HashMap<String, Vec<PeerId>> =
        [("drip".to_string(), vec![PeerId::from("QmServer")])].into_iter().collect();
    let client_options = NodeOptions {
        name_servers: servers,
        ..test_options()
    };
    let alice = spawn_node(&hub, chain.clone(), "QmAlice", 0x02, weth(), client_options.clone()).await;
    let bob = spawn_node(&hub, chain, "QmBob", 0x03, weth(), client_options).await;

    assert_eq!(alice.node.register_name("alice.drip").await.unwrap(), 1);
    assert_eq!(bob.node.register_name("alice.drip").await.unwrap(), 0);
    assert_eq!(bob.node.resolve_name("alice.drip").await.unwrap(), "QmAlice");
    assert_eq!(bob.node.resolve_name("QmAlice").await.unwrap(), "alice.drip");
    assert!(matches!(
        bob.node.resolve_name("carol.drip").await,
        Err(NameError::NotRegistered(_))
    ));
}

#[tokio::test]
async fn test_plain_node_ignores_name_requests() {
    let hub = MemoryHub::new();
    let (maker, _taker, chain) = maker_and_taker(&hub).await;
    let servers: HashMap<String, Vec<PeerId>> =
        [("drip".to_string(), vec![maker.peer_id()])].into_iter().collect();
    let client = spawn_node(
        &hub,
        chain,
        "client",
        0x44,
        weth(),
        NodeOptions {
            name_servers: servers,
            ..test_options()
        },
    )
    .await;

    // The stream is dropped unanswered.
    assert!(matches!(
        client.node.resolve_name("alice.drip").await,
        Err(NameError::NoResponse) | Err(NameError::Codec(_))
    ));
}

#[tokio::test]
async fn test_names_over_tcp() {
    let chain = Arc::new(MockChain::new());
    let (server, server_net) = spawn_tcp_node(
        chain.clone(),
        0x01,
        NodeOptions {
            serve_names: true,
            ..test_options()
        },
    )
    .await;
    let servers: HashMap<String, Vec<PeerId>> =
        [("drip".to_string(), vec![server.peer_id()])].into_iter().collect();
    let (alice, alice_net) = spawn_tcp_node(
        chain,
        0x02,
        NodeOptions {
            name_servers: servers,
            ..test_options()
        },
    )
    .await;
    alice_net
        .add_peer(server.peer_id(), server_net.local_addr())
        .await;

    assert_eq!(alice.node.register_name("alice.drip").await.unwrap(), 1);
    assert_eq!(
        alice.node.resolve_name("alice.drip").await.unwrap(),
        alice.peer_id().to_string()
    );
}

#[tokio::test]
async fn test_connection_claiming_another_peer_cannot_change_its_name() {
    let chain = Arc::new(MockChain::new());
    let (server, server_net) = spawn_tcp_node(
        chain.clone(),
        0x01,
        NodeOptions {
            serve_names: true,
            ..test_options()
        },
    )
    .await;
    let servers: HashMap<String, Vec<PeerId>> =
        [("drip".to_string(), vec![server.peer_id()])].into_iter().collect();
    let (alice, alice_net) = spawn_tcp_node(
        chain,
        0x02,
        NodeOptions {
            name_servers: servers,
            ..test_options()
        },
    )
    .await;
    alice_net
        .add_peer(server.peer_id(), server_net.local_addr())
        .await;
    assert_eq!(alice.node.register_name("alice.drip").await.unwrap(), 1);

    // Claim alice's peer id but sign the hello with another key.
    let mallory = Identity::random();
    let socket = TcpStream::connect(server_net.local_addr()).await.unwrap();
    let mut framed = FramedStream::new(socket);
    let nonce = framed.read_frame().await.unwrap().unwrap();
    let signature = mallory
        .sign_hello(&server.peer_id(), &nonce, NAME_REGISTER_PROTOCOL)
        .unwrap();
    framed
        .write_frame(alice.peer_id().as_str().as_bytes())
        .await
        .unwrap();
    framed
        .write_frame(NAME_REGISTER_PROTOCOL.as_bytes())
        .await
        .unwrap();
    framed.write_frame(&signature).await.unwrap();
    let _ = framed.write_frame(b"mallory").await;
    assert!(!matches!(framed.read_frame().await, Ok(Some(_))));

    assert_eq!(
        alice.node.resolve_name("alice.drip").await.unwrap(),
        alice.peer_id().to_string()
    );
    assert!(matches!(
        alice.node.resolve_name("mallory.drip").await,
        Err(NameError::NotRegistered(_))
    ));
}
