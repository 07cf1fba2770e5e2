//! Plain TCP transport.
//!
//! Each connection carries one protocol. The listener opens with a random
//! nonce frame; the dialer answers with its peer id, the protocol id and a
//! signature of the nonce by its [`Identity`] key. Connections whose signature
//! does not match the claimed peer id are dropped. Pubsub messages travel on
//! their own connections as a topic frame followed by a data frame, sent to
//! every peer in the address book.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pintswap_codec::FramedStream;
use pintswap_types::PeerId;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{NetworkError, NetworkResult};
use crate::identity::{random_nonce, verify_hello, Identity};
use crate::network::{
    BoxedStream, IncomingStream, Network, PeerStream, PubsubMessage, SUBSCRIPTION_BUFFER,
};

/// Protocol id used internally for pubsub deliveries.
pub const PUBSUB_PROTOCOL: &str = "/pintswap/0.1.0/pubsub";

const INCOMING_BUFFER: usize = 32;

/// Pause after a failed accept so descriptor exhaustion does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

type Subscriptions = Arc<RwLock<HashMap<String, Vec<mpsc::Sender<PubsubMessage>>>>>;

pub struct TcpNetwork {
    identity: Identity,
    local: PeerId,
    local_addr: SocketAddr,
    address_book: RwLock<HashMap<PeerId, SocketAddr>>,
    subscriptions: Subscriptions,
    listener: JoinHandle<()>,
}

impl TcpNetwork {
    /// Bind `listen_addr` and start accepting connections. The local peer id
    /// is the address of `identity`.
    pub async fn bind(
        identity: Identity,
        listen_addr: SocketAddr,
    ) -> NetworkResult<(Self, mpsc::Receiver<IncomingStream>)> {
        let local = identity.peer_id().clone();
        let listener =
            TcpListener::bind(listen_addr)
                .await
                .map_err(|e| NetworkError::BindFailed {
                    address: listen_addr.to_string(),
                    source: e,
                })?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| NetworkError::BindFailed {
                address: listen_addr.to_string(),
                source: e,
            })?;
        info!(peer = %local, address = %local_addr, "tcp network listening");

        let (tx, rx) = mpsc::channel(INCOMING_BUFFER);
        let subscriptions: Subscriptions = Arc::new(RwLock::new(HashMap::new()));
        let handle = tokio::spawn(accept_loop(
            listener,
            local.clone(),
            tx,
            subscriptions.clone(),
        ));

        Ok((
            Self {
                identity,
                local,
                local_addr,
                address_book: RwLock::new(HashMap::new()),
                subscriptions,
                listener: handle,
            },
            rx,
        ))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub async fn add_peer(&self, peer: PeerId, addr: SocketAddr) {
        debug!(peer = %peer, address = %addr, "added peer address");
        self.address_book.write().await.insert(peer, addr);
    }

    async fn connect(&self, peer: &PeerId, protocol: &str) -> NetworkResult<FramedStream<TcpStream>> {
        let addr = self
            .address_book
            .read()
            .await
            .get(peer)
            .copied()
            .ok_or_else(|| NetworkError::PeerNotFound(peer.clone()))?;
        let socket = TcpStream::connect(addr)
            .await
            .map_err(|e| NetworkError::ConnectionFailed {
                peer: peer.clone(),
                source: e,
            })?;
        socket.set_nodelay(true).ok();

        let mut framed = FramedStream::new(socket);
        let nonce = framed
            .read_frame()
            .await?
            .ok_or_else(|| NetworkError::Handshake("closed before nonce".into()))?;
        let signature = self.identity.sign_hello(peer, &nonce, protocol)?;
        framed.write_frame(self.local.as_str().as_bytes()).await?;
        framed.write_frame(protocol.as_bytes()).await?;
        framed.write_frame(&signature).await?;
        Ok(framed)
    }
}

impl Drop for TcpNetwork {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

#[async_trait]
impl Network for TcpNetwork {
    fn local_peer_id(&self) -> &PeerId {
        &self.local
    }

    async fn dial(&self, peer: &PeerId, protocol: &str) -> NetworkResult<BoxedStream> {
        let framed = self.connect(peer, protocol).await?;
        Ok(Box::new(framed.into_inner()))
    }

    async fn publish(&self, topic: &str, data: Vec<u8>) -> NetworkResult<()> {
        let peers: Vec<PeerId> = self.address_book.read().await.keys().cloned().collect();
        for peer in peers {
            let result = async {
                let mut framed = self.connect(&peer, PUBSUB_PROTOCOL).await?;
                framed.write_frame(topic.as_bytes()).await?;
                framed.write_frame(&data).await?;
                framed.close().await?;
                Ok::<_, NetworkError>(())
            }
            .await;
            if let Err(e) = result {
                warn!(peer = %peer, topic, error = %e, "pubsub delivery failed");
            }
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> NetworkResult<mpsc::Receiver<PubsubMessage>> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        self.subscriptions
            .write()
            .await
            .entry(topic.to_string())
            .or_default()
            .push(tx);
        Ok(rx)
    }
}

/// Source of inbound connections.
#[async_trait]
trait Acceptor: Send + 'static {
    type Stream: PeerStream + 'static;

    async fn accept(&self) -> io::Result<(Self::Stream, SocketAddr)>;
}

#[async_trait]
impl Acceptor for TcpListener {
    type Stream = TcpStream;

    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        let (socket, remote) = TcpListener::accept(self).await?;
        socket.set_nodelay(true).ok();
        Ok((socket, remote))
    }
}

async fn accept_loop<A: Acceptor>(
    listener: A,
    local: PeerId,
    incoming: mpsc::Sender<IncomingStream>,
    subscriptions: Subscriptions,
) {
    loop {
        match listener.accept().await {
            Ok((socket, remote)) => {
                let local = local.clone();
                let incoming = incoming.clone();
                let subscriptions = subscriptions.clone();
                tokio::spawn(async move {
                    if let Err(e) =
                        handle_connection(socket, &local, incoming, subscriptions).await
                    {
                        debug!(remote = %remote, error = %e, "dropped connection");
                    }
                });
            }
            Err(e) => {
                warn!(error = %e, "failed to accept connection");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
}

async fn read_text<S: PeerStream>(
    framed: &mut FramedStream<S>,
    what: &str,
) -> NetworkResult<String> {
    let frame = framed
        .read_frame()
        .await?
        .ok_or_else(|| NetworkError::Handshake(format!("closed before {}", what)))?;
    String::from_utf8(frame).map_err(|_| NetworkError::Handshake(format!("{} is not utf-8", what)))
}

async fn handle_connection<S: PeerStream + 'static>(
    socket: S,
    local: &PeerId,
    incoming: mpsc::Sender<IncomingStream>,
    subscriptions: Subscriptions,
) -> NetworkResult<()> {
    let mut framed = FramedStream::new(socket);
    let nonce = random_nonce();
    framed.write_frame(&nonce).await?;
    let peer = PeerId::new(read_text(&mut framed, "peer id").await?);
    let protocol = read_text(&mut framed, "protocol id").await?;
    let signature = framed
        .read_frame()
        .await?
        .ok_or_else(|| NetworkError::Handshake("closed before hello signature".into()))?;
    verify_hello(&peer, local, &nonce, &protocol, &signature)?;

    if protocol == PUBSUB_PROTOCOL {
        let topic = read_text(&mut framed, "topic").await?;
        let data = framed
            .read_frame()
            .await?
            .ok_or_else(|| NetworkError::Handshake("closed before pubsub data".into()))?;
        let mut subscriptions = subscriptions.write().await;
        if let Some(subscribers) = subscriptions.get_mut(&topic) {
            subscribers.retain(|tx| !tx.is_closed());
            for tx in subscribers.iter() {
                let _ = tx.try_send(PubsubMessage {
                    from: peer.clone(),
                    topic: topic.clone(),
                    data: data.clone(),
                });
            }
        }
        return Ok(());
    }

    debug!(peer = %peer, protocol = %protocol, "accepted stream");
    incoming
        .send(IncomingStream {
            peer,
            protocol,
            stream: Box::new(framed.into_inner()),
        })
        .await
        .map_err(|_| NetworkError::Closed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn node() -> (TcpNetwork, mpsc::Receiver<IncomingStream>) {
        TcpNetwork::bind(Identity::random(), "127.0.0.1:0".parse().unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_dial_authenticates_dialer() {
        let (alice, _a) = node().await;
        let (bob, mut bob_rx) = node().await;
        alice.add_peer(bob.local_peer_id().clone(), bob.local_addr()).await;

        let mut stream = alice.dial(bob.local_peer_id(), "/proto").await.unwrap();
        stream.write_all(b"ping").await.unwrap();

        let mut incoming = bob_rx.recv().await.unwrap();
        assert_eq!(&incoming.peer, alice.local_peer_id());
        assert_eq!(incoming.protocol, "/proto");
        let mut buf = [0u8; 4];
        incoming.stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
    }

    #[tokio::test]
    async fn test_publish_reaches_known_peers() {
        let (alice, _a) = node().await;
        let (bob, _b) = node().await;
        alice.add_peer(bob.local_peer_id().clone(), bob.local_addr()).await;

        let mut sub = bob.subscribe("offers").await.unwrap();
        alice.publish("offers", vec![9, 9]).await.unwrap();

        let msg = sub.recv().await.unwrap();
        assert_eq!(&msg.from, alice.local_peer_id());
        assert_eq!(msg.topic, "offers");
        assert_eq!(msg.data, vec![9, 9]);
    }

    #[tokio::test]
    async fn test_unknown_peer() {
        let (alice, _a) = node().await;
        let err = alice.dial(&PeerId::from("0xcarol"), "/proto").await.err().unwrap();
        assert!(matches!(err, NetworkError::PeerNotFound(_)));
    }

    struct FailingAcceptor(Arc<std::sync::atomic::AtomicUsize>);

    #[async_trait]
    impl Acceptor for FailingAcceptor {
        type Stream = TcpStream;

        async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
            self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Err(io::Error::new(io::ErrorKind::Other, "too many open files"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_accept_failures_back_off() {
        let attempts = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let (tx, _rx) = mpsc::channel(1);
        let task = tokio::spawn(accept_loop(
            FailingAcceptor(attempts.clone()),
            PeerId::from("0xlistener"),
            tx,
            Subscriptions::default(),
        ));

        tokio::time::sleep(ACCEPT_BACKOFF * 5 + ACCEPT_BACKOFF / 2).await;
        task.abort();
        let attempts = attempts.load(std::sync::atomic::Ordering::SeqCst);
        assert!((5..=7).contains(&attempts), "{attempts} accept attempts");
    }

    #[tokio::test]
    async fn test_claimed_peer_id_must_match_signer() {
        let (alice, _a) = node().await;
        let (bob, mut bob_rx) = node().await;
        let mallory = Identity::random();

        let socket = TcpStream::connect(bob.local_addr()).await.unwrap();
        let mut framed = FramedStream::new(socket);
        let nonce = framed.read_frame().await.unwrap().unwrap();
        let signature = mallory
            .sign_hello(bob.local_peer_id(), &nonce, "/proto")
            .unwrap();
        framed
            .write_frame(alice.local_peer_id().as_str().as_bytes())
            .await
            .unwrap();
        framed.write_frame(b"/proto").await.unwrap();
        framed.write_frame(&signature).await.unwrap();

        // The listener hangs up without delivering the stream.
        assert!(!matches!(framed.read_frame().await, Ok(Some(_))));
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dial_to_mislabelled_address_is_refused() {
        let (alice, _a) = node().await;
        let (bob, mut bob_rx) = node().await;
        let carol = PeerId::from("0x00000000000000000000000000000000000000ca");
        alice.add_peer(carol.clone(), bob.local_addr()).await;

        let mut stream = alice.dial(&carol, "/proto").await.unwrap();
        let mut buf = Vec::new();
        let _ = stream.read_to_end(&mut buf).await;
        assert!(buf.is_empty());
        assert!(bob_rx.try_recv().is_err());
    }
}
