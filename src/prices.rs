// src/prices.rs
use async_trait::async_trait;
use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::warn;

pub const PRICE_TTL: Duration = Duration::from_secs(60);

/// Symbols pinned to 1 USD by policy, never fetched
const STABLE_SYMBOLS: [&str; 3] = ["USDC", "BSC-USD", "USDT"];

const FALLBACK_BATCH_SIZE: usize = 5;
const FALLBACK_PAUSE: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum PriceError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("quote endpoint returned HTTP {0}")]
    Status(StatusCode),
    #[error("unexpected quote payload: {0}")]
    Payload(String),
}

/// Upstream quote provider for USDT trading pairs
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// USD quote for one trading pair, e.g. "BNBUSDT"
    async fn quote(&self, pair: &str) -> Result<f64, PriceError>;

    /// One bulk request covering several pairs
    async fn quote_batch(&self, pairs: &[String]) -> Result<HashMap<String, f64>, PriceError>;
}

/// Millisecond clock, injectable so cache expiry is testable
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Map a token symbol (already uppercased) to its Binance trading pair
pub fn trading_pair(symbol: &str) -> String {
    match symbol {
        "BNB" => "BNBUSDT".to_string(),
        "ETH" => "ETHUSDT".to_string(),
        "BTC" => "BTCUSDT".to_string(),
        other => format!("{}USDT", other),
    }
}

#[derive(Debug, Deserialize)]
struct TickerPrice {
    symbol: String,
    price: String,
}

/// Binance spot ticker API
pub struct BinanceSource {
    client: Client,
    base_url: String,
}

impl BinanceSource {
    pub fn new(base_url: &str) -> Result<Self, PriceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl PriceSource for BinanceSource {
    async fn quote(&self, pair: &str) -> Result<f64, PriceError> {
        let url = format!("{}/api/v3/ticker/price?symbol={}", self.base_url, pair);
        let resp = self.client.get(&url).send().await?;
        if resp.status() != StatusCode::OK {
            return Err(PriceError::Status(resp.status()));
        }
        let ticker: TickerPrice = resp.json().await?;
        ticker
            .price
            .parse::<f64>()
            .map_err(|_| PriceError::Payload(format!("bad price for {}: {}", pair, ticker.price)))
    }

    async fn quote_batch(&self, pairs: &[String]) -> Result<HashMap<String, f64>, PriceError> {
        let symbols =
            serde_json::to_string(pairs).map_err(|e| PriceError::Payload(e.to_string()))?;
        let url = format!("{}/api/v3/ticker/price", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[("symbols", symbols.as_str())])
            .send()
            .await?;
        if resp.status() != StatusCode::OK {
            return Err(PriceError::Status(resp.status()));
        }
        let tickers: Vec<TickerPrice> = resp.json().await?;
        Ok(tickers
            .into_iter()
            .filter_map(|t| t.price.parse::<f64>().ok().map(|p| (t.symbol, p)))
            .collect())
    }
}

type SharedLookup = Shared<BoxFuture<'static, f64>>;

struct CacheState {
    prices: HashMap<String, f64>,
    expiry: HashMap<String, u64>,
    pending: HashMap<String, SharedLookup>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub total_cached: usize,
    pub valid_cache: usize,
    pub expired_cache: usize,
}

/// Symbol → USD price cache with a TTL and request coalescing: at most one
/// outstanding upstream lookup per symbol, all concurrent callers share its
/// result. Lookup failures degrade to a price of 0, cached for the TTL so a
/// failing upstream is not hammered; they never propagate.
pub struct PriceCache {
    state: Arc<Mutex<CacheState>>,
    source: Arc<dyn PriceSource>,
    clock: Arc<dyn Clock>,
    ttl_ms: u64,
}

impl PriceCache {
    pub fn new(source: Arc<dyn PriceSource>) -> Self {
        Self::with_clock(source, Arc::new(SystemClock), PRICE_TTL)
    }

    pub fn with_clock(source: Arc<dyn PriceSource>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(CacheState {
                prices: HashMap::new(),
                expiry: HashMap::new(),
                pending: HashMap::new(),
            })),
            source,
            clock,
            ttl_ms: ttl.as_millis() as u64,
        }
    }

    /// Current USD price for a token symbol. Never fails: a broken upstream
    /// resolves to 0.
    pub async fn fetch_price(&self, symbol: &str) -> f64 {
        let key = symbol.to_uppercase();
        if STABLE_SYMBOLS.contains(&key.as_str()) {
            return 1.0;
        }

        let lookup = {
            let mut state = self.state.lock().unwrap();
            let now = self.clock.now_ms();
            if let (Some(&price), Some(&expiry)) =
                (state.prices.get(&key), state.expiry.get(&key))
            {
                if expiry > now {
                    return price;
                }
            }
            let pending = state.pending.get(&key).cloned();
            if let Some(pending) = pending {
                pending
            } else {
                let fut = self.lookup_future(key.clone());
                state.pending.insert(key, fut.clone());
                fut
            }
        };
        lookup.await
    }

    fn lookup_future(&self, key: String) -> SharedLookup {
        let source = Arc::clone(&self.source);
        let state = Arc::clone(&self.state);
        let clock = Arc::clone(&self.clock);
        let ttl_ms = self.ttl_ms;
        async move {
            let pair = trading_pair(&key);
            let price = match source.quote(&pair).await {
                Ok(price) => price,
                Err(e) => {
                    warn!("Price lookup for {} failed: {}", key, e);
                    0.0
                }
            };
            let mut state = state.lock().unwrap();
            let expiry = clock.now_ms() + ttl_ms;
            state.prices.insert(key.clone(), price);
            state.expiry.insert(key.clone(), expiry);
            state.pending.remove(&key);
            price
        }
        .boxed()
        .shared()
    }

    /// Prices for a set of symbols via one bulk request, keyed by the
    /// symbols as the caller passed them. When the bulk request fails,
    /// falls back to the single-lookup path in sub-batches with a short
    /// pause in between.
    pub async fn fetch_prices(&self, symbols: &[String]) -> HashMap<String, f64> {
        let mut prices: HashMap<String, f64> = HashMap::new();
        let mut misses: Vec<String> = Vec::new(); // caller's spelling
        let mut seen: HashSet<String> = HashSet::new();
        for symbol in symbols {
            let key = symbol.to_uppercase();
            if !seen.insert(key.clone()) {
                continue;
            }
            if STABLE_SYMBOLS.contains(&key.as_str()) {
                prices.insert(symbol.clone(), 1.0);
            } else {
                misses.push(symbol.clone());
            }
        }
        if misses.is_empty() {
            return prices;
        }

        let pairs: Vec<String> = misses.iter().map(|s| trading_pair(&s.to_uppercase())).collect();
        match self.source.quote_batch(&pairs).await {
            Ok(quotes) => {
                for (symbol, pair) in misses.iter().zip(&pairs) {
                    prices.insert(symbol.clone(), quotes.get(pair).copied().unwrap_or(0.0));
                }
            }
            Err(e) => {
                warn!("Bulk price lookup failed, falling back to single quotes: {}", e);
                for (i, chunk) in misses.chunks(FALLBACK_BATCH_SIZE).enumerate() {
                    if i > 0 {
                        tokio::time::sleep(FALLBACK_PAUSE).await;
                    }
                    let fetched =
                        futures_util::future::join_all(chunk.iter().map(|s| self.fetch_price(s)))
                            .await;
                    for (symbol, price) in chunk.iter().zip(fetched) {
                        prices.insert(symbol.clone(), price);
                    }
                }
            }
        }
        prices
    }

    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        state.prices.clear();
        state.expiry.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock().unwrap();
        let now = self.clock.now_ms();
        let valid = state.expiry.values().filter(|&&e| e > now).count();
        CacheStats {
            total_cached: state.prices.len(),
            valid_cache: valid,
            expired_cache: state.prices.len().saturating_sub(valid),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    struct CountingSource {
        calls: AtomicUsize,
        batch_calls: AtomicUsize,
        price: f64,
        fail: bool,
        fail_batch: bool,
        delay: Duration,
    }

    impl CountingSource {
        fn fixed(price: f64) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                batch_calls: AtomicUsize::new(0),
                price,
                fail: false,
                fail_batch: false,
                delay: Duration::ZERO,
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                fail_batch: true,
                ..Self::fixed(0.0)
            }
        }

        fn slow(price: f64, delay: Duration) -> Self {
            Self {
                delay,
                ..Self::fixed(price)
            }
        }

        fn quote_calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PriceSource for CountingSource {
        async fn quote(&self, _pair: &str) -> Result<f64, PriceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail {
                Err(PriceError::Payload("simulated outage".to_string()))
            } else {
                Ok(self.price)
            }
        }

        async fn quote_batch(&self, pairs: &[String]) -> Result<HashMap<String, f64>, PriceError> {
            self.batch_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_batch {
                return Err(PriceError::Payload("simulated outage".to_string()));
            }
            Ok(pairs.iter().map(|p| (p.clone(), self.price)).collect())
        }
    }

    struct ManualClock(AtomicU64);

    impl ManualClock {
        fn advance(&self, ms: u64) {
            self.0.fetch_add(ms, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now_ms(&self) -> u64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    #[tokio::test]
    async fn stable_symbols_are_pinned_without_upstream_calls() {
        let source = Arc::new(CountingSource::fixed(999.0));
        let cache = PriceCache::new(Arc::clone(&source) as Arc<dyn PriceSource>);

        assert_eq!(cache.fetch_price("USDT").await, 1.0);
        assert_eq!(cache.fetch_price("USDC").await, 1.0);
        assert_eq!(cache.fetch_price("BSC-USD").await, 1.0);
        assert_eq!(cache.fetch_price("bsc-usd").await, 1.0);
        assert_eq!(source.quote_calls(), 0);
    }

    #[tokio::test]
    async fn concurrent_lookups_for_one_symbol_coalesce() {
        let source = Arc::new(CountingSource::slow(42.0, Duration::from_millis(50)));
        let cache = PriceCache::new(Arc::clone(&source) as Arc<dyn PriceSource>);

        let (a, b, c, d, e) = tokio::join!(
            cache.fetch_price("ETH"),
            cache.fetch_price("ETH"),
            cache.fetch_price("eth"),
            cache.fetch_price("ETH"),
            cache.fetch_price("ETH"),
        );
        assert_eq!((a, b, c, d, e), (42.0, 42.0, 42.0, 42.0, 42.0));
        assert_eq!(source.quote_calls(), 1);
    }

    #[tokio::test]
    async fn second_hit_within_the_ttl_is_served_from_cache() {
        let source = Arc::new(CountingSource::fixed(7.5));
        let cache = PriceCache::new(Arc::clone(&source) as Arc<dyn PriceSource>);

        assert_eq!(cache.fetch_price("CAKE").await, 7.5);
        assert_eq!(cache.fetch_price("CAKE").await, 7.5);
        assert_eq!(source.quote_calls(), 1);
    }

    #[tokio::test]
    async fn lookup_failure_degrades_to_zero_and_is_cached() {
        let source = Arc::new(CountingSource::failing());
        let cache = PriceCache::new(Arc::clone(&source) as Arc<dyn PriceSource>);

        assert_eq!(cache.fetch_price("XYZ").await, 0.0);
        // the zero is cached, the failing upstream is not asked again
        assert_eq!(cache.fetch_price("XYZ").await, 0.0);
        assert_eq!(source.quote_calls(), 1);
    }

    #[tokio::test]
    async fn expired_entries_are_refetched() {
        let source = Arc::new(CountingSource::fixed(3.0));
        let clock = Arc::new(ManualClock(AtomicU64::new(0)));
        let cache = PriceCache::with_clock(
            Arc::clone(&source) as Arc<dyn PriceSource>,
            Arc::clone(&clock) as Arc<dyn Clock>,
            Duration::from_secs(60),
        );

        assert_eq!(cache.fetch_price("CAKE").await, 3.0);
        clock.advance(59_000);
        assert_eq!(cache.fetch_price("CAKE").await, 3.0);
        assert_eq!(source.quote_calls(), 1);

        clock.advance(2_000);
        assert_eq!(cache.fetch_price("CAKE").await, 3.0);
        assert_eq!(source.quote_calls(), 2);
    }

    #[tokio::test]
    async fn batch_uses_one_bulk_request_and_pins_stables() {
        let source = Arc::new(CountingSource::fixed(10.0));
        let cache = PriceCache::new(Arc::clone(&source) as Arc<dyn PriceSource>);

        let symbols: Vec<String> = ["BNB", "CAKE", "USDT", "BNB"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let prices = cache.fetch_prices(&symbols).await;

        assert_eq!(prices["BNB"], 10.0);
        assert_eq!(prices["CAKE"], 10.0);
        assert_eq!(prices["USDT"], 1.0);
        assert_eq!(source.batch_calls.load(Ordering::SeqCst), 1);
        assert_eq!(source.quote_calls(), 0);
    }

    #[tokio::test]
    async fn batch_falls_back_to_single_lookups_when_bulk_fails() {
        let source = Arc::new(CountingSource {
            fail_batch: true,
            ..CountingSource::fixed(4.0)
        });
        let cache = PriceCache::new(Arc::clone(&source) as Arc<dyn PriceSource>);

        let symbols: Vec<String> = ["BNB", "CAKE", "eth"].iter().map(|s| s.to_string()).collect();
        let prices = cache.fetch_prices(&symbols).await;

        assert_eq!(prices["BNB"], 4.0);
        assert_eq!(prices["CAKE"], 4.0);
        assert_eq!(prices["eth"], 4.0);
        assert_eq!(source.quote_calls(), 3);
    }

    #[tokio::test]
    async fn batch_results_are_keyed_by_the_callers_spelling() {
        let source = Arc::new(CountingSource::fixed(6.0));
        let cache = PriceCache::new(Arc::clone(&source) as Arc<dyn PriceSource>);

        let symbols: Vec<String> = ["cake", "usdt", "Eth", "CAKE"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let prices = cache.fetch_prices(&symbols).await;

        // duplicates collapse to the first spelling seen
        assert_eq!(prices["cake"], 6.0);
        assert_eq!(prices["usdt"], 1.0);
        assert_eq!(prices["Eth"], 6.0);
        assert!(!prices.contains_key("CAKE"));
        assert_eq!(source.batch_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cache_stats_count_valid_and_expired_entries() {
        let source = Arc::new(CountingSource::fixed(2.0));
        let clock = Arc::new(ManualClock(AtomicU64::new(0)));
        let cache = PriceCache::with_clock(
            Arc::clone(&source) as Arc<dyn PriceSource>,
            Arc::clone(&clock) as Arc<dyn Clock>,
            Duration::from_secs(60),
        );

        cache.fetch_price("BNB").await;
        cache.fetch_price("CAKE").await;
        clock.advance(61_000);
        cache.fetch_price("ETH").await;

        let stats = cache.stats();
        assert_eq!(stats.total_cached, 3);
        assert_eq!(stats.valid_cache, 1);
        assert_eq!(stats.expired_cache, 2);

        cache.clear();
        assert_eq!(cache.stats().total_cached, 0);
    }

    #[test]
    fn trading_pair_aliases() {
        assert_eq!(trading_pair("BNB"), "BNBUSDT");
        assert_eq!(trading_pair("ETH"), "ETHUSDT");
        assert_eq!(trading_pair("BTC"), "BTCUSDT");
        assert_eq!(trading_pair("CAKE"), "CAKEUSDT");
    }
}
