// tests/common/mod.rs
//
// Shared test doubles: stub news/price sources and an orchestrator wired
// only to them, so no test ever reaches the network.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crypto_sentiment_gateway::cache::CacheTier;
use crypto_sentiment_gateway::ingest::types::{NewsCategory, NewsItem, NewsQuery, NewsSource};
use crypto_sentiment_gateway::ingest::NewsFetcher;
use crypto_sentiment_gateway::orchestrator::Orchestrator;
use crypto_sentiment_gateway::prices::types::{PriceQuote, PriceSource};
use crypto_sentiment_gateway::prices::PriceFetcher;
use crypto_sentiment_gateway::protocol::ToolDispatcher;

pub fn news_item(title: &str, source: &str, age_min: i64) -> NewsItem {
    NewsItem {
        title: title.into(),
        content: String::new(),
        url: format!("https://news.example/{}", title.len()),
        source: source.into(),
        published_at: Utc::now() - chrono::Duration::minutes(age_min),
        mentioned_coins: vec![],
        category: NewsCategory::General,
        importance_score: 0.0,
        is_synthetic: false,
    }
}

pub fn bullish_headlines() -> Vec<NewsItem> {
    vec![
        news_item("Bitcoin surges to record high as ETF inflows soar", "CoinDesk", 5),
        news_item("Ethereum rally continues on strong adoption", "Cointelegraph", 12),
        news_item("Solana gains as institutional demand grows", "The Block", 20),
        news_item("Analysts bullish on crypto after strong week", "Decrypt", 30),
        news_item("Bitcoin miners report record profits", "CoinDesk", 40),
    ]
}

/// Returns the same items on every call and counts calls.
pub struct FixedNews {
    pub items: Vec<NewsItem>,
    pub calls: AtomicUsize,
}

impl FixedNews {
    pub fn new(items: Vec<NewsItem>) -> Arc<Self> {
        Arc::new(Self {
            items,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NewsSource for FixedNews {
    async fn fetch(&self, _q: &NewsQuery) -> anyhow::Result<Vec<NewsItem>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.items.clone())
    }
    fn name(&self) -> &str {
        "fixed"
    }
}

pub struct FailingNews;

#[async_trait]
impl NewsSource for FailingNews {
    async fn fetch(&self, _q: &NewsQuery) -> anyhow::Result<Vec<NewsItem>> {
        anyhow::bail!("connection refused")
    }
    fn name(&self) -> &str {
        "failing"
    }
}

/// Never answers.
pub struct HangingPrices;

#[async_trait]
impl PriceSource for HangingPrices {
    async fn fetch(&self, _symbols: &[String]) -> anyhow::Result<Vec<PriceQuote>> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(Vec::new())
    }
    fn name(&self) -> &str {
        "hanging"
    }
}

pub struct FixedPrices(pub Vec<PriceQuote>);

#[async_trait]
impl PriceSource for FixedPrices {
    async fn fetch(&self, _symbols: &[String]) -> anyhow::Result<Vec<PriceQuote>> {
        Ok(self.0.clone())
    }
    fn name(&self) -> &str {
        "fixed-prices"
    }
}

pub fn quote(symbol: &str, current: f64, change_24h: f64) -> PriceQuote {
    PriceQuote {
        symbol: symbol.into(),
        current,
        change_24h,
        market_cap: None,
        volume_24h: None,
        last_updated: Utc::now(),
        is_synthetic: false,
    }
}

pub fn orchestrator_with(
    news: Vec<Arc<dyn NewsSource>>,
    prices: Vec<Arc<dyn PriceSource>>,
) -> Orchestrator {
    let cache = Arc::new(CacheTier::in_memory(256));
    let news = NewsFetcher::new(news, cache.clone()).with_deadline(Duration::from_secs(2));
    let prices = PriceFetcher::new(prices, cache.clone()).with_deadline(Duration::from_secs(1));
    Orchestrator::new(cache, Arc::new(news), Arc::new(prices))
}

pub fn bullish_orchestrator() -> (Arc<FixedNews>, Orchestrator) {
    let src = FixedNews::new(bullish_headlines());
    let orch = orchestrator_with(
        vec![src.clone() as Arc<dyn NewsSource>],
        vec![Arc::new(FixedPrices(vec![
            quote("BTC", 67_000.0, 4.2),
            quote("ETH", 3_400.0, 3.1),
        ])) as Arc<dyn PriceSource>],
    );
    (src, orch)
}

pub fn dispatcher(orch: Orchestrator) -> ToolDispatcher {
    ToolDispatcher::new(Arc::new(orch))
}
