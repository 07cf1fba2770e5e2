use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use pintswap_chain::{BuilderConfig, DEFAULT_GAS_HEADROOM, DEFAULT_RELAY_URL};
use pintswap_protocols::NodeOptions;
use pintswap_tss::{CleartextEcdsa, TwoPartyEcdsa};
use pintswap_types::{Address, Offer, PeerId, U256};
use serde::{Deserialize, Serialize};

const ENV_PREFIX: &str = "PINTSWAP";

/// Ethereum, Optimism, BNB Chain, Gnosis, Polygon, Fantom, Base, Arbitrum One,
/// Avalanche C-Chain.
const MAINNET_CHAIN_IDS: &[u64] = &[1, 10, 56, 100, 137, 250, 8453, 42161, 43114];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub node: NodeConfig,
    pub network: NetworkConfig,
    pub chain: ChainConfig,
    pub trade: TradeConfig,
    pub names: NamesConfig,
    #[serde(default)]
    pub tss: TssConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Environment variable holding the hex identity key. The peer id is that
    /// key's address. Unset means the wallet key doubles as identity.
    #[serde(default)]
    pub identity_key_env: Option<String>,
    pub listen_addr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// `peer_id@host:port` entries.
    pub bootstrap_peers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub relay_url: String,
    pub private_key_env: String,
    #[serde(default)]
    pub wrapped_native: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeConfig {
    pub await_receipts: bool,
    pub pay_coinbase: bool,
    pub gas_retry_delay_ms: u64,
    pub gas_headroom: u64,
    pub publish_interval_secs: u64,
    pub receipt_poll_interval_ms: u64,
    #[serde(default)]
    pub offers: Vec<OfferConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferConfig {
    pub gives_token: String,
    pub gets_token: String,
    /// Decimal base units.
    pub gives_amount: String,
    pub gets_amount: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamesConfig {
    pub serve: bool,
    /// Name-service peer ids per TLD.
    #[serde(default)]
    pub servers: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TssConfig {
    /// Run the cleartext two-party scheme. The maker learns the taker's key
    /// and nonce shares during signing and can then sign alone.
    #[serde(default)]
    pub insecure_cleartext: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node: NodeConfig {
                identity_key_env: None,
                listen_addr: "0.0.0.0:4001".to_string(),
            },
            network: NetworkConfig {
                bootstrap_peers: vec![],
            },
            chain: ChainConfig {
                rpc_url: "http://127.0.0.1:8545".to_string(),
                relay_url: DEFAULT_RELAY_URL.to_string(),
                private_key_env: "PINTSWAP_PRIVATE_KEY".to_string(),
                wrapped_native: None,
            },
            trade: TradeConfig {
                await_receipts: false,
                pay_coinbase: false,
                gas_retry_delay_ms: 1000,
                gas_headroom: DEFAULT_GAS_HEADROOM,
                publish_interval_secs: 10,
                receipt_poll_interval_ms: 1000,
                offers: vec![],
            },
            names: NamesConfig {
                serve: false,
                servers: HashMap::new(),
            },
            tss: TssConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}

impl AppConfig {
    /// Built-in defaults, then `config/default.toml` if present, then `path`,
    /// then `PINTSWAP__SECTION__KEY` environment variables.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let defaults = config::Config::try_from(&AppConfig::default())
            .context("failed to serialize default config")?;

        let mut builder = config::Config::builder()
            .add_source(defaults)
            .add_source(config::File::with_name("config/default").required(false));
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("network.bootstrap_peers")
                .try_parsing(true),
        );

        let app_config: AppConfig = builder
            .build()
            .context("failed to load configuration")?
            .try_deserialize()
            .context("invalid configuration")?;
        app_config.validate()?;
        Ok(app_config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if matches!(self.node.identity_key_env.as_deref(), Some("")) {
            bail!("node.identity_key_env cannot be empty");
        }
        self.listen_addr()?;
        self.bootstrap_peers()?;

        if self.chain.rpc_url.is_empty() {
            bail!("chain.rpc_url cannot be empty");
        }
        if self.chain.private_key_env.is_empty() {
            bail!("chain.private_key_env cannot be empty");
        }
        self.wrapped_native()?;

        if self.trade.publish_interval_secs == 0 {
            bail!("trade.publish_interval_secs must be positive");
        }
        self.offers()?;

        match self.logging.format.as_str() {
            "pretty" | "json" => {}
            other => bail!("logging.format must be \"pretty\" or \"json\", got {other:?}"),
        }
        Ok(())
    }

    /// Name of the environment variable holding the identity key.
    pub fn identity_key_env(&self) -> &str {
        self.node
            .identity_key_env
            .as_deref()
            .unwrap_or(&self.chain.private_key_env)
    }

    pub fn listen_addr(&self) -> anyhow::Result<SocketAddr> {
        self.node
            .listen_addr
            .parse()
            .with_context(|| format!("invalid node.listen_addr {:?}", self.node.listen_addr))
    }

    pub fn bootstrap_peers(&self) -> anyhow::Result<Vec<(PeerId, SocketAddr)>> {
        self.network
            .bootstrap_peers
            .iter()
            .map(|entry| parse_peer_addr(entry))
            .collect()
    }

    pub fn wrapped_native(&self) -> anyhow::Result<Option<Address>> {
        self.chain
            .wrapped_native
            .as_deref()
            .map(parse_address)
            .transpose()
    }

    pub fn offers(&self) -> anyhow::Result<Vec<Offer>> {
        self.trade
            .offers
            .iter()
            .map(|o| {
                Ok(Offer::new(
                    parse_address(&o.gives_token)?,
                    parse_address(&o.gets_token)?,
                    parse_amount(&o.gives_amount)?,
                    parse_amount(&o.gets_amount)?,
                ))
            })
            .collect()
    }

    pub fn builder_config(&self) -> BuilderConfig {
        BuilderConfig {
            gas_headroom: self.trade.gas_headroom,
            retry_delay: Duration::from_millis(self.trade.gas_retry_delay_ms),
            pay_coinbase: self.trade.pay_coinbase,
        }
    }

    pub fn receipt_poll_interval(&self) -> Duration {
        Duration::from_millis(self.trade.receipt_poll_interval_ms)
    }

    /// The two-party ECDSA scheme for `chain_id`. Only the cleartext scheme is
    /// linked in, so it must be opted into and is refused on mainnets.
    pub fn threshold_scheme(&self, chain_id: u64) -> anyhow::Result<Arc<dyn TwoPartyEcdsa>> {
        if !self.tss.insecure_cleartext {
            bail!(
                "no secure two-party ECDSA scheme is available; \
                 set tss.insecure_cleartext = true to run the cleartext scheme on a devnet"
            );
        }
        if MAINNET_CHAIN_IDS.contains(&chain_id) {
            bail!("tss.insecure_cleartext is refused on mainnet chain {chain_id}");
        }
        Ok(Arc::new(CleartextEcdsa))
    }

    pub fn node_options(&self) -> NodeOptions {
        let name_servers = self
            .names
            .servers
            .iter()
            .map(|(tld, peers)| {
                (
                    tld.clone(),
                    peers.iter().map(|p| PeerId::from(p.as_str())).collect(),
                )
            })
            .collect();
        NodeOptions {
            publish_interval: Duration::from_secs(self.trade.publish_interval_secs),
            name_servers,
            serve_names: self.names.serve,
            ..NodeOptions::default()
        }
    }
}

pub fn parse_address(s: &str) -> anyhow::Result<Address> {
    let bytes = hex::decode(s.trim_start_matches("0x"))
        .with_context(|| format!("invalid address {s:?}"))?;
    if bytes.len() != 20 {
        bail!("address {s:?} must be 20 bytes");
    }
    Ok(Address::from_slice(&bytes))
}

pub fn parse_amount(s: &str) -> anyhow::Result<U256> {
    U256::from_dec_str(s).map_err(|e| anyhow!("invalid amount {s:?}: {e:?}"))
}

pub fn parse_peer_addr(entry: &str) -> anyhow::Result<(PeerId, SocketAddr)> {
    let (peer, addr) = entry
        .split_once('@')
        .ok_or_else(|| anyhow!("peer entry {entry:?} must be peer_id@host:port"))?;
    let addr = addr
        .parse()
        .with_context(|| format!("invalid address in peer entry {entry:?}"))?;
    Ok((PeerId::from(peer), addr))
}
