// src/prices/types.rs
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceQuote {
    /// Upper-case ticker, e.g. "BTC".
    pub symbol: String,
    /// USD.
    pub current: f64,
    /// Percent over the last 24h.
    pub change_24h: f64,
    pub market_cap: Option<f64>,
    pub volume_24h: Option<f64>,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub is_synthetic: bool,
}

/// (symbol, CoinGecko/CoinCap asset id)
pub const COIN_IDS: &[(&str, &str)] = &[
    ("BTC", "bitcoin"),
    ("ETH", "ethereum"),
    ("SOL", "solana"),
    ("XRP", "ripple"),
    ("ADA", "cardano"),
    ("DOGE", "dogecoin"),
    ("BNB", "binancecoin"),
    ("AVAX", "avalanche-2"),
    ("DOT", "polkadot"),
    ("MATIC", "matic-network"),
    ("LINK", "chainlink"),
    ("LTC", "litecoin"),
];

pub fn asset_id(symbol: &str) -> Option<&'static str> {
    COIN_IDS
        .iter()
        .find(|(s, _)| s.eq_ignore_ascii_case(symbol))
        .map(|(_, id)| *id)
}

pub fn symbol_for(id: &str) -> Option<&'static str> {
    COIN_IDS.iter().find(|(_, i)| *i == id).map(|(s, _)| *s)
}

/// Best-effort quote client. Returning fewer quotes than requested is
/// fine; the fetcher fills the gaps.
#[async_trait::async_trait]
pub trait PriceSource: Send + Sync {
    async fn fetch(&self, symbols: &[String]) -> Result<Vec<PriceQuote>>;
    fn name(&self) -> &str;
}
