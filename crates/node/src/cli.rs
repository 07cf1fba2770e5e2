use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "pintswap")]
#[command(version, about = "Peer-to-peer token swaps settled by a jointly signed transaction", long_about = None)]
pub struct Cli {
    /// Extra configuration file, layered over config/default.toml
    #[arg(short, long, global = true, env = "PINTSWAP_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve peers, list the configured offers and publish them (default mode)
    Run,

    /// Fetch a peer's offers
    Orders {
        #[arg(help = "Peer ID")]
        peer: String,
    },

    /// Take an offer from a peer
    Fill {
        #[arg(help = "Peer ID of the maker")]
        peer: String,

        #[arg(help = "Offer hash (0x-prefixed hex)")]
        offer_hash: String,

        #[arg(help = "Amount of the maker's gets token to pay, in base units")]
        amount: String,
    },

    /// Resolve name.tld to a peer ID, or a peer ID to its name
    Resolve {
        #[arg(help = "Name or peer ID")]
        name: String,
    },

    /// Register name.tld for this node's peer ID
    Register {
        #[arg(help = "Name including TLD, e.g. alice.drip")]
        name: String,
    },
}
