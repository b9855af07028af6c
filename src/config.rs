use alloy::primitives::Address;
use dotenvy::dotenv;
use eyre::Result;
use std::env;
use tracing::info;

/// Alpha router contract the dashboard filters for by default
pub const DEFAULT_TARGET_CONTRACT: &str = "0xb300000b72DEAEb607a12d5f54773D1C19c7028d";

#[derive(Debug, Clone)]
pub struct Config {
    pub feed_api_url: String,
    pub feed_api_key: String,
    pub quote_api_url: String,
    pub target_contract: Option<Address>,
    pub max_transactions: usize,
    pub price_ttl_secs: u64,
    pub port: u16,
}

pub fn load() -> Result<Config> {
    dotenv().ok(); // load from .env file

    let feed_api_url = env::var("BSCSCAN_API_URL")
        .unwrap_or_else(|_| "https://api.bscscan.com/api".to_string());

    // feed API key (BscScan works unauthenticated at a heavily throttled rate)
    let feed_api_key = env::var("BSCSCAN_API_KEY")
        .or_else(|_| env::var("BSC_SCAN_API_KEY")) // alias support
        .unwrap_or_default();

    let quote_api_url =
        env::var("BINANCE_API_URL").unwrap_or_else(|_| "https://api.binance.com".to_string());

    // target contract filter; set TARGET_CONTRACT=none to disable
    let target_contract = match env::var("TARGET_CONTRACT") {
        Ok(s) if s.trim().is_empty() || s.trim().eq_ignore_ascii_case("none") => None,
        Ok(s) => s.trim().parse::<Address>().ok(),
        Err(_) => DEFAULT_TARGET_CONTRACT.parse::<Address>().ok(),
    };

    // cap on reconciled transactions per wallet query (default: 1500)
    let max_transactions = env::var("MAX_TRANSACTIONS")
        .unwrap_or_else(|_| "1500".to_string())
        .parse()
        .unwrap_or(1500);

    // price cache TTL in seconds (default: 60)
    let price_ttl_secs = env::var("PRICE_TTL_SECS")
        .unwrap_or_else(|_| "60".to_string())
        .parse()
        .unwrap_or(60);

    // API port (default: 8080)
    let port = env::var("PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse()
        .unwrap_or(8080);

    let cfg = Config {
        feed_api_url,
        feed_api_key,
        quote_api_url,
        target_contract,
        max_transactions,
        price_ttl_secs,
        port,
    };

    info!("Loaded config: {:?}", cfg);

    Ok(cfg)
}
