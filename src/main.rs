mod aggregator;
mod api;
mod config;
mod feeds;
mod models;
mod prices;
mod reconciler;
mod service;

use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_writer(std::io::stdout)
        .with_target(false) // cleaner logs (no module names unless needed)
        .init();

    info!("Alpha stats service starting...");

    // Load configuration
    let cfg = config::load()?;
    info!("  Feed API: {}", cfg.feed_api_url);
    info!("  Quote API: {}", cfg.quote_api_url);
    info!("  Port: {}", cfg.port);
    info!("  Target contract: {:?}", cfg.target_contract);
    info!("  Price TTL: {}s", cfg.price_ttl_secs);

    let feeds = feeds::FeedClient::new(&cfg.feed_api_url, &cfg.feed_api_key)?;
    let quotes = prices::BinanceSource::new(&cfg.quote_api_url)?;
    let price_cache = prices::PriceCache::with_clock(
        Arc::new(quotes),
        Arc::new(prices::SystemClock),
        Duration::from_secs(cfg.price_ttl_secs),
    );

    let state = Arc::new(api::AppState {
        cfg: cfg.clone(),
        feeds,
        prices: price_cache,
    });

    // Spawn API task
    let api_handle = tokio::spawn({
        let cfg = cfg.clone();
        let state = Arc::clone(&state);
        async move { api::serve(cfg, state).await }
    });

    // Graceful shutdown
    tokio::select! {
        res = api_handle => match res {
            Ok(Ok(_)) => info!("API exited cleanly"),
            Ok(Err(e)) => error!("API error: {:?}", e),
            Err(e) => error!("API task panicked: {:?}", e),
        },
        _ = signal::ctrl_c() => {
            info!("Shutdown signal received, stopping...");
        }
    }

    info!("Alpha stats service stopped.");
    Ok(())
}
