//! # Orchestrator
//! One invocation, start to finish:
//! cache lookup → news → prices (optional) → stage fan-out → fusion → cache write.
//!
//! `execute` always returns a [`Verdict`]. Zero news items after every
//! fallback is the single terminal path: it yields [`Verdict::terminal`],
//! which is not cached so a retry fetches again.

use futures_util::stream::{FuturesUnordered, StreamExt};
use metrics::{counter, histogram};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::ai_adapter::{DisabledClient, DynAiClient};
use crate::cache::{keys, CacheTier};
use crate::config::{FusionWeights, GatewayConfig};
use crate::fusion::{self, FusionInputs};
use crate::ingest::types::NewsItem;
use crate::ingest::NewsFetcher;
use crate::invocation::{Depth, Invocation};
use crate::prices::PriceFetcher;
use crate::progress::{Phase, ProgressReporter};
use crate::stages::{self, Stage, StageContext};
use crate::verdict::{DataQuality, Verdict};

/// Items handed to each stage at `quick` depth.
pub const QUICK_CORPUS: usize = 10;
/// Coins priced when the caller did not name any.
pub const DISCOVERED_COINS: usize = 5;
const FALLBACK_COINS: [&str; 2] = ["BTC", "ETH"];

/// Most-mentioned coins first (ties alphabetical); BTC/ETH if none.
pub fn discover_symbols(news: &[NewsItem], max: usize) -> Vec<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for it in news {
        for c in &it.mentioned_coins {
            *counts.entry(c.as_str()).or_default() += 1;
        }
    }
    if counts.is_empty() {
        return FALLBACK_COINS.iter().map(|s| s.to_string()).collect();
    }
    let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
    ranked
        .into_iter()
        .take(max)
        .map(|(s, _)| s.to_string())
        .collect()
}

fn elapsed_ms(t0: Instant) -> u64 {
    t0.elapsed().as_millis().min(u64::MAX as u128) as u64
}

pub struct Orchestrator {
    cache: Arc<CacheTier>,
    news: Arc<NewsFetcher>,
    prices: Arc<PriceFetcher>,
    stages: Vec<Arc<dyn Stage>>,
    weights: FusionWeights,
    analysis_ttl: Duration,
    stage_timeout: Duration,
}

impl Orchestrator {
    /// Default stages with AI disabled; see [`Orchestrator::with_stages`].
    pub fn new(cache: Arc<CacheTier>, news: Arc<NewsFetcher>, prices: Arc<PriceFetcher>) -> Self {
        Self {
            cache,
            news,
            prices,
            stages: stages::default_stages(Arc::new(DisabledClient)),
            weights: FusionWeights::default(),
            analysis_ttl: Duration::from_secs(600),
            stage_timeout: Duration::from_secs(20),
        }
    }

    /// Wire everything from configuration. The caller owns the cache so it
    /// can also run the durable-tier probe.
    pub fn from_config(cfg: &GatewayConfig, cache: Arc<CacheTier>, ai: DynAiClient) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("crypto-sentiment-gateway/0.1")
            .timeout(cfg.fetch.request_timeout())
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "http client builder failed; using defaults");
                reqwest::Client::new()
            });
        let news = NewsFetcher::from_config(&cfg.fetch, cache.clone(), client.clone())
            .with_ttl(Duration::from_secs(cfg.cache.news_ttl_secs));
        let prices = PriceFetcher::from_config(&cfg.fetch, cache.clone(), client)
            .with_ttl(Duration::from_secs(cfg.cache.prices_ttl_secs));

        Self::new(cache, Arc::new(news), Arc::new(prices))
            .with_stages(stages::default_stages(ai))
            .with_weights(cfg.stages.weights)
            .with_analysis_ttl(Duration::from_secs(cfg.cache.analysis_ttl_secs))
            .with_stage_timeout(Duration::from_millis(cfg.stages.timeout_ms))
    }

    pub fn with_stages(mut self, stages: Vec<Arc<dyn Stage>>) -> Self {
        self.stages = stages;
        self
    }

    pub fn with_weights(mut self, weights: FusionWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_analysis_ttl(mut self, ttl: Duration) -> Self {
        self.analysis_ttl = ttl;
        self
    }

    pub fn with_stage_timeout(mut self, t: Duration) -> Self {
        self.stage_timeout = t;
        self
    }

    pub fn cache(&self) -> &Arc<CacheTier> {
        &self.cache
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages
            .iter()
            .filter(|s| s.enabled())
            .map(|s| s.kind().as_str())
            .collect()
    }

    pub fn news_sources(&self) -> Vec<String> {
        self.news.source_names()
    }

    pub fn price_sources(&self) -> Vec<String> {
        self.prices.source_names()
    }

    fn active_stages(&self, depth: Depth) -> Vec<&Arc<dyn Stage>> {
        self.stages
            .iter()
            .filter(|s| s.enabled() && s.min_depth() <= depth)
            .collect()
    }

    pub async fn execute(&self, inv: &Invocation, progress: &ProgressReporter) -> Verdict {
        let t0 = Instant::now();
        progress.emit(Phase::Initializing, 5, "analysis started");

        let key = keys::analysis(&inv.fingerprint());
        if let Some(cached) = self.cache.get::<Verdict>(&key).await {
            counter!("analysis_cache_hits_total").increment(1);
            debug!(%key, "analysis cache hit");
            progress.emit(Phase::Done, 100, "served from cache");
            return cached.with_processing_time(elapsed_ms(t0));
        }
        counter!("analysis_cache_misses_total").increment(1);

        // FETCH_NEWS
        let news = self.news.fetch(inv.time_range(), inv.max_items()).await;
        progress.emit(
            Phase::NewsFetched,
            25,
            format!("{} news items", news.items.len()),
        );

        let active = self.active_stages(inv.depth());
        if news.items.is_empty() {
            counter!("analysis_terminal_total").increment(1);
            warn!(query = inv.query(), range = %inv.time_range(), "no news available, returning terminal verdict");
            progress.emit(Phase::Done, 100, "no news available");
            return Verdict::terminal(active.len(), elapsed_ms(t0));
        }

        // FETCH_PRICES?
        let (quotes, synthetic_prices) = if inv.include_prices() {
            let symbols = match inv.focus_coins() {
                Some(c) => c.to_vec(),
                None => discover_symbols(&news.items, DISCOVERED_COINS),
            };
            let batch = self.prices.fetch(&symbols).await;
            progress.emit(
                Phase::PricesFetched,
                40,
                format!("{} price quotes", batch.quotes.len()),
            );
            (batch.quotes, batch.synthetic)
        } else {
            progress.emit(Phase::PricesFetched, 40, "prices not requested");
            (Vec::new(), false)
        };

        // FAN_OUT_STAGES
        let corpus: &[NewsItem] = if inv.depth() == Depth::Quick {
            &news.items[..news.items.len().min(QUICK_CORPUS)]
        } else {
            &news.items
        };
        let ctx = StageContext::new(inv.query(), inv.depth(), inv.time_range())
            .with_prices(quotes)
            .with_focus_coins(inv.focus_coins().map(|c| c.to_vec()).unwrap_or_default());

        let total = active.len();
        let mut pending: FuturesUnordered<_> = active
            .iter()
            .map(|s| stages::run_isolated(s.as_ref(), corpus, &ctx, self.stage_timeout))
            .collect();
        let mut results = Vec::with_capacity(total);
        while let Some(r) = pending.next().await {
            let pct = 40 + (40 * (results.len() + 1) / total.max(1)) as u8;
            progress.stage_done(r.kind(), pct);
            results.push(r);
        }
        drop(pending);
        results.sort_by_key(|r| r.kind());

        // AGGREGATE
        let verdict = fusion::fuse(
            &results,
            &self.weights,
            FusionInputs {
                news_count: corpus.len(),
                data_quality: DataQuality {
                    synthetic_news: news.synthetic,
                    synthetic_prices,
                },
                processing_time_ms: elapsed_ms(t0),
            },
        );
        progress.emit(Phase::Aggregated, 90, "results fused");

        // CACHE_WRITE
        self.cache.set(&key, &verdict, self.analysis_ttl).await;
        progress.emit(Phase::Cached, 95, "verdict cached");

        let ms = elapsed_ms(t0);
        histogram!("analysis_duration_ms").record(ms as f64);
        info!(
            query = inv.query(),
            depth = inv.depth().as_str(),
            sentiment = verdict.overall_sentiment.as_str(),
            confidence = verdict.confidence_score,
            successful = verdict.analysis_stages.successful,
            total = verdict.analysis_stages.total,
            ms,
            "analysis complete"
        );
        progress.emit(Phase::Done, 100, "done");
        verdict
    }
}
