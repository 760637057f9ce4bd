//! # Prices
//! Quote fetching with a primary/secondary source chain and synthetic gap
//! filling. Sources run concurrently under one (short) deadline; the first
//! source to supply a symbol wins, later ones only fill what is missing, and
//! any symbol still missing gets a synthetic quote.

pub mod sources;
pub mod synthetic;
pub mod types;

use metrics::counter;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::cache::{keys, CacheTier};
use crate::config::FetchConfig;
use crate::fanout;
use sources::{CoinCap, CoinGecko};
use types::{PriceQuote, PriceSource};

#[derive(Debug, Clone, Default)]
pub struct PriceBatch {
    /// Sorted by symbol, one per requested symbol.
    pub quotes: Vec<PriceQuote>,
    pub synthetic: bool,
    pub from_cache: bool,
}

pub struct PriceFetcher {
    sources: Vec<Arc<dyn PriceSource>>,
    cache: Arc<CacheTier>,
    deadline: Duration,
    ttl: Duration,
}

fn normalize(symbols: &[String]) -> Vec<String> {
    let mut s: Vec<String> = symbols
        .iter()
        .map(|c| c.trim().to_uppercase())
        .filter(|c| !c.is_empty())
        .collect();
    s.sort();
    s.dedup();
    s
}

impl PriceFetcher {
    pub fn new(sources: Vec<Arc<dyn PriceSource>>, cache: Arc<CacheTier>) -> Self {
        Self {
            sources,
            cache,
            deadline: Duration::from_millis(5_000),
            ttl: Duration::from_secs(60),
        }
    }

    pub fn from_config(cfg: &FetchConfig, cache: Arc<CacheTier>, client: reqwest::Client) -> Self {
        let sources: Vec<Arc<dyn PriceSource>> = vec![
            Arc::new(CoinGecko::new(&cfg.coingecko_url, client.clone())) as Arc<dyn PriceSource>,
            Arc::new(CoinCap::new(&cfg.coincap_url, client)) as Arc<dyn PriceSource>,
        ];
        Self::new(sources, cache).with_deadline(cfg.price_timeout())
    }

    pub fn with_deadline(mut self, d: Duration) -> Self {
        self.deadline = d;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn source_names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name().to_string()).collect()
    }

    /// Never fails and always returns one quote per (normalized) symbol.
    pub async fn fetch(&self, symbols: &[String]) -> PriceBatch {
        let wanted = normalize(symbols);
        if wanted.is_empty() {
            return PriceBatch::default();
        }
        let key = keys::prices(&wanted);

        if let Some(quotes) = self.cache.get::<Vec<PriceQuote>>(&key).await {
            debug!(%key, "prices cache hit");
            return PriceBatch {
                synthetic: quotes.iter().any(|q| q.is_synthetic),
                quotes,
                from_cache: true,
            };
        }

        let tasks = self
            .sources
            .iter()
            .map(|s| {
                let src = Arc::clone(s);
                let syms = wanted.clone();
                (s.name().to_string(), async move { src.fetch(&syms).await })
            })
            .collect();
        let gathered = fanout::gather("prices", tasks, self.deadline).await;

        let mut by_symbol: BTreeMap<String, PriceQuote> = BTreeMap::new();
        for quotes in gathered.results.into_iter().flatten() {
            for q in quotes {
                if wanted.contains(&q.symbol) && !by_symbol.contains_key(&q.symbol) {
                    by_symbol.insert(q.symbol.clone(), q);
                }
            }
        }

        let missing: Vec<&String> = wanted.iter().filter(|s| !by_symbol.contains_key(*s)).collect();
        let synthetic = !missing.is_empty();
        if synthetic {
            counter!("fetch_fallback_total", "kind" => "prices").increment(1);
            warn!(
                missing = ?missing,
                timed_out = gathered.timed_out,
                "price sources incomplete, filling with synthetic quotes"
            );
            for sym in missing {
                by_symbol.insert(sym.clone(), synthetic::quote(sym));
            }
        }

        let quotes: Vec<PriceQuote> = by_symbol.into_values().collect();
        if !synthetic {
            self.cache.set(&key, &quotes, self.ttl).await;
        }
        PriceBatch {
            quotes,
            synthetic,
            from_cache: false,
        }
    }
}
