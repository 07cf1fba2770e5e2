//! Name service: resolving `name.tld` to peer ids and back, and the registry
//! a name-service peer runs.

use std::collections::HashMap;
use std::sync::Arc;

use pintswap_codec::{FramedStream, NameQuery, NameQueryResponse, NameRegisterResponse, WireMessage};
use pintswap_types::PeerId;
use rand::seq::SliceRandom;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{NameError, NameResult, NetworkResult};
use crate::network::{BoxedStream, Network};
use crate::schema::{NAME_QUERY_PROTOCOL, NAME_REGISTER_PROTOCOL};

/// TLD assumed for single-label lookups.
pub const DEFAULT_TLD: &str = "drip";

/// Split a lookup into the query sent to the server and the TLD that picks
/// the server. A single label is looked up as-is under [`DEFAULT_TLD`].
fn split_lookup(name: &str) -> NameResult<(String, String)> {
    let parts: Vec<&str> = name.split('.').collect();
    if parts.iter().any(|p| p.is_empty()) {
        return Err(NameError::InvalidName(name.to_string()));
    }
    if parts.len() == 1 {
        return Ok((name.to_string(), DEFAULT_TLD.to_string()));
    }
    let (tld, labels) = parts.split_last().ok_or_else(|| NameError::InvalidName(name.to_string()))?;
    Ok((labels.join("."), tld.to_string()))
}

/// Client side of `/ns/query` and `/ns/register`.
pub struct NameClient {
    network: Arc<dyn Network>,
    /// Name-service peers per lowercase TLD.
    servers: HashMap<String, Vec<PeerId>>,
}

impl NameClient {
    pub fn new(network: Arc<dyn Network>, servers: HashMap<String, Vec<PeerId>>) -> Self {
        let servers = servers
            .into_iter()
            .map(|(tld, peers)| (tld.to_lowercase(), peers))
            .collect();
        Self { network, servers }
    }

    fn pick_server(&self, tld: &str) -> NameResult<PeerId> {
        self.servers
            .get(&tld.to_lowercase())
            .and_then(|peers| peers.choose(&mut rand::thread_rng()))
            .cloned()
            .ok_or_else(|| NameError::UnknownTld(tld.to_string()))
    }

    /// Resolve `alice.drip` to a peer id, or a bare peer id to its
    /// registered name (returned with `.drip` appended).
    pub async fn resolve(&self, name: &str) -> NameResult<String> {
        let (query, tld) = split_lookup(name)?;
        let server = self.pick_server(&tld)?;
        debug!(name, server = %server, "resolving name");

        let stream = self.network.dial(&server, NAME_QUERY_PROTOCOL).await?;
        let mut framed = FramedStream::new(stream);
        framed.write_frame(&NameQuery { name: query }.encode()).await?;
        let response = framed.read_frame().await?.ok_or(NameError::NoResponse)?;
        let response = NameQueryResponse::decode(&response)?;

        if response.status == 0 {
            return Err(NameError::NotRegistered(name.to_string()));
        }
        if name.contains('.') {
            Ok(response.result)
        } else {
            Ok(format!("{}.{}", response.result, tld))
        }
    }

    /// Claim `name.tld` for the local peer. Returns the server's status,
    /// `1` on success.
    pub async fn register(&self, name: &str) -> NameResult<i32> {
        let (label, tld) = match name.rsplit_once('.') {
            Some((label, tld)) if !label.is_empty() && !tld.is_empty() => (label, tld),
            _ => return Err(NameError::InvalidName(name.to_string())),
        };
        let server = self.pick_server(tld)?;

        let stream = self.network.dial(&server, NAME_REGISTER_PROTOCOL).await?;
        let mut framed = FramedStream::new(stream);
        framed.write_frame(label.as_bytes()).await?;
        let response = framed.read_frame().await?.ok_or(NameError::NoResponse)?;
        let status = NameRegisterResponse::decode(&response)?.status;
        info!(name, status, "registered name");
        Ok(status)
    }
}

/// Names served by a name-service peer. Each peer holds at most one name;
/// registering another releases the previous one.
#[derive(Default)]
pub struct NameRegistry {
    names: RwLock<HashMap<String, PeerId>>,
}

impl NameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forward lookup by name, falling back to reverse lookup by peer id.
    pub async fn lookup(&self, query: &str) -> Option<String> {
        let names = self.names.read().await;
        if let Some(peer) = names.get(query) {
            return Some(peer.to_string());
        }
        names
            .iter()
            .find(|(_, peer)| peer.as_str() == query)
            .map(|(name, _)| name.clone())
    }

    /// Returns `true` if `peer` now owns `name`.
    pub async fn register(&self, peer: &PeerId, name: &str) -> bool {
        if name.is_empty() {
            return false;
        }
        let mut names = self.names.write().await;
        match names.get(name) {
            Some(owner) if owner != peer => false,
            Some(_) => true,
            None => {
                names.retain(|_, owner| owner != peer);
                names.insert(name.to_string(), peer.clone());
                true
            }
        }
    }

    /// Answer one `/ns/query` stream.
    pub async fn handle_query(&self, stream: BoxedStream) -> NetworkResult<()> {
        let mut framed = FramedStream::new(stream);
        let Some(request) = framed.read_frame().await? else {
            return Ok(());
        };
        let query = NameQuery::decode(&request)?;
        let response = match self.lookup(&query.name).await {
            Some(result) => NameQueryResponse { status: 1, result },
            None => NameQueryResponse {
                status: 0,
                result: String::new(),
            },
        };
        debug!(query = %query.name, status = response.status, "answered name query");
        framed.write_frame(&response.encode()).await?;
        framed.close().await?;
        Ok(())
    }

    /// Answer one `/ns/register` stream opened by `peer`.
    pub async fn handle_register(&self, peer: &PeerId, stream: BoxedStream) -> NetworkResult<()> {
        let mut framed = FramedStream::new(stream);
        let Some(request) = framed.read_frame().await? else {
            return Ok(());
        };
        let registered = match String::from_utf8(request) {
            Ok(name) => self.register(peer, &name).await,
            Err(_) => false,
        };
        let status = i32::from(registered);
        info!(peer = %peer, status, "name registration");
        framed
            .write_frame(&NameRegisterResponse { status }.encode())
            .await?;
        framed.close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryHub;
    use tokio::sync::mpsc;

    use crate::network::IncomingStream;

    async fn serve(registry: Arc<NameRegistry>, mut incoming: mpsc::Receiver<IncomingStream>) {
        while let Some(stream) = incoming.recv().await {
            let registry = registry.clone();
            tokio::spawn(async move {
                let _ = match stream.protocol.as_str() {
                    NAME_QUERY_PROTOCOL => registry.handle_query(stream.stream).await,
                    NAME_REGISTER_PROTOCOL => {
                        registry.handle_register(&stream.peer, stream.stream).await
                    }
                    _ => Ok(()),
                };
            });
        }
    }

    async fn setup() -> (NameClient, NameClient) {
        let hub = MemoryHub::new();
        let (_server, incoming) = hub.join(PeerId::from("ns")).await;
        tokio::spawn(serve(Arc::new(NameRegistry::new()), incoming));

        let servers: HashMap<String, Vec<PeerId>> =
            [("DRIP".to_string(), vec![PeerId::from("ns")])].into_iter().collect();
        let (alice, _a) = hub.join(PeerId::from("QmAlice")).await;
        let (bob, _b) = hub.join(PeerId::from("QmBob")).await;
        (
            NameClient::new(Arc::new(alice), servers.clone()),
            NameClient::new(Arc::new(bob), servers),
        )
    }

    #[test]
    fn test_split_lookup() {
        assert_eq!(split_lookup("alice.drip").unwrap(), ("alice".into(), "drip".into()));
        assert_eq!(split_lookup("a.b.drip").unwrap(), ("a.b".into(), "drip".into()));
        assert_eq!(split_lookup("QmPeer").unwrap(), ("QmPeer".into(), "drip".into()));
        assert!(split_lookup("alice.").is_err());
        assert!(split_lookup("").is_err());
    }

    #[tokio::test]
    async fn test_register_and_resolve_both_ways() {
        let (alice, bob) = setup().await;

        assert_eq!(alice.register("alice.drip").await.unwrap(), 1);
        assert_eq!(bob.resolve("alice.drip").await.unwrap(), "QmAlice");
        assert_eq!(bob.resolve("QmAlice").await.unwrap(), "alice.drip");
    }

    #[tokio::test]
    async fn test_name_taken_by_other_peer() {
        let (alice, bob) = setup().await;

        assert_eq!(alice.register("alice.drip").await.unwrap(), 1);
        assert_eq!(alice.register("alice.drip").await.unwrap(), 1);
        assert_eq!(bob.register("alice.drip").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unregistered_and_unknown_tld() {
        let (alice, _bob) = setup().await;

        assert!(matches!(
            alice.resolve("nobody.drip").await,
            Err(NameError::NotRegistered(_))
        ));
        assert!(matches!(
            alice.resolve("alice.eth").await,
            Err(NameError::UnknownTld(_))
        ));
        assert!(matches!(
            alice.register("bare").await,
            Err(NameError::InvalidName(_))
        ));
    }

    #[tokio::test]
    async fn test_registry_reverse_lookup_follows_latest_name() {
        let registry = NameRegistry::new();
        let peer = PeerId::from("p1");
        assert!(registry.register(&peer, "first").await);
        assert!(registry.register(&peer, "second").await);
        assert_eq!(registry.lookup("p1").await.as_deref(), Some("second"));
        assert_eq!(registry.lookup("first").await, None);
    }
}
