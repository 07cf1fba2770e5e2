mod app;
mod cli;
mod config;

use app::PintswapApp;
use clap::Parser;
use cli::{Cli, Commands};
use config::AppConfig;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Application error: {:#}", e);
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;
    init_tracing(&config.logging.level, &config.logging.format);

    info!("Configuration loaded");
    info!("  Listen Addr: {}", config.node.listen_addr);
    info!("  RPC: {}", config.chain.rpc_url);

    match cli.command {
        Some(Commands::Run) | None => PintswapApp::new(config, true).await?.run().await,
        Some(Commands::Orders { peer }) => PintswapApp::new(config, false).await?.orders(&peer).await,
        Some(Commands::Fill {
            peer,
            offer_hash,
            amount,
        }) => {
            PintswapApp::new(config, false)
                .await?
                .fill(&peer, &offer_hash, &amount)
                .await
        }
        Some(Commands::Resolve { name }) => PintswapApp::new(config, false).await?.resolve(&name).await,
        Some(Commands::Register { name }) => {
            PintswapApp::new(config, false).await?.register(&name).await
        }
    }
}

fn init_tracing(level: &str, format: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }
}
