// src/ingest/mod.rs
//! # News ingest
//! Resilient news fetching: every configured source is queried in parallel
//! under one deadline, results are merged in source priority order,
//! annotated, windowed, deduplicated and ranked.
//!
//! The merged list is cached per time range (`news:<range>`); ranking and
//! truncation happen per request on top of it.

pub mod enrich;
pub mod providers;
pub mod source_weights;
pub mod synthetic;
pub mod types;

use chrono::{DateTime, Utc};
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cache::{keys, CacheTier};
use crate::config::FetchConfig;
use crate::fanout;
use crate::invocation::TimeRange;
use providers::{cryptocompare::CryptoCompareProvider, rss::RssProvider};
use source_weights::SourceWeights;
use types::{NewsItem, NewsQuery, NewsSource};

/// Characters of the normalized title compared for duplicates.
const TITLE_PREFIX: usize = 50;
const TITLE_SIMILARITY: f64 = 0.9;

/// Normalize text: collapse whitespace, trim, strip stray punctuation.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: once_cell::sync::Lazy<regex::Regex> =
        once_cell::sync::Lazy::new(|| regex::Regex::new(r"(?is)</?[^>]+>").expect("static regex"));
    out = RE_TAGS.replace_all(&out, "").to_string();

    // 3) Curly quotes to ASCII
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: once_cell::sync::Lazy<regex::Regex> =
        once_cell::sync::Lazy::new(|| regex::Regex::new(r"\s+").expect("static regex"));
    out = RE_WS.replace_all(&out, " ").trim().to_string();

    // 5) Strip trailing sentence punctuation (keep quotes)
    while let Some(last) = out.chars().last() {
        if matches!(last, '!' | '?' | '.' | ',') {
            out.pop();
        } else {
            break;
        }
    }

    // 6) Length cap
    if out.chars().count() > 1500 {
        out = out.chars().take(1500).collect();
    }

    out
}

fn title_key(title: &str) -> String {
    let cleaned: String = title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    cleaned
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(TITLE_PREFIX)
        .collect()
}

/// Drop items whose title prefix is (nearly) identical to an earlier one.
/// Earlier items win, so callers pass higher-priority sources first.
pub fn dedup_by_title(items: Vec<NewsItem>) -> (Vec<NewsItem>, usize) {
    let mut seen: Vec<String> = Vec::with_capacity(items.len());
    let mut kept = Vec::with_capacity(items.len());
    let mut dropped = 0usize;
    for it in items {
        let key = title_key(&it.title);
        let dup = seen
            .iter()
            .any(|k| *k == key || strsim::normalized_levenshtein(k, &key) >= TITLE_SIMILARITY);
        if dup {
            dropped += 1;
            continue;
        }
        seen.push(key);
        kept.push(it);
    }
    (kept, dropped)
}

/// 70% importance, 30% recency within the window. Stable for equal scores.
pub fn rank(items: &mut [NewsItem], now: DateTime<Utc>, window: Duration) {
    let w = window.as_secs();
    let score = |it: &NewsItem| {
        0.7 * it.importance_score + 0.3 * enrich::recency(it.published_at, now, w)
    };
    items.sort_by(|a, b| score(b).total_cmp(&score(a)));
}

#[derive(Debug, Clone, Default)]
pub struct NewsBatch {
    pub items: Vec<NewsItem>,
    /// Items come from the synthetic fallback.
    pub synthetic: bool,
    pub from_cache: bool,
}

pub struct NewsFetcher {
    sources: Vec<Arc<dyn NewsSource>>,
    cache: Arc<CacheTier>,
    weights: Arc<SourceWeights>,
    deadline: Duration,
    ttl: Duration,
    synthetic_fallback: bool,
}

impl NewsFetcher {
    /// Sources in priority order: the first one is the primary.
    pub fn new(sources: Vec<Arc<dyn NewsSource>>, cache: Arc<CacheTier>) -> Self {
        Self {
            sources,
            cache,
            weights: Arc::new(SourceWeights::default_seed()),
            deadline: Duration::from_millis(8_000),
            ttl: Duration::from_secs(300),
            synthetic_fallback: false,
        }
    }

    /// RSS feeds first (in config order), CryptoCompare last.
    pub fn from_config(cfg: &FetchConfig, cache: Arc<CacheTier>, client: reqwest::Client) -> Self {
        let mut sources: Vec<Arc<dyn NewsSource>> = cfg
            .rss_feeds
            .iter()
            .map(|f| {
                Arc::new(RssProvider::from_url(&f.name, &f.url, client.clone()))
                    as Arc<dyn NewsSource>
            })
            .collect();
        if let Some(url) = cfg.cryptocompare_url.as_deref() {
            sources.push(Arc::new(CryptoCompareProvider::new(url, client)));
        }
        Self::new(sources, cache)
            .with_weights(SourceWeights::load_from_file(&cfg.source_weights_path))
            .with_deadline(cfg.news_timeout())
            .with_synthetic_fallback(cfg.synthetic_news_fallback)
    }

    pub fn with_deadline(mut self, d: Duration) -> Self {
        self.deadline = d;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_synthetic_fallback(mut self, on: bool) -> Self {
        self.synthetic_fallback = on;
        self
    }

    pub fn with_weights(mut self, w: SourceWeights) -> Self {
        self.weights = Arc::new(w);
        self
    }

    pub fn source_names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name().to_string()).collect()
    }

    /// Never fails: an empty batch means every source (and the fallback,
    /// if enabled) came up empty.
    pub async fn fetch(&self, range: TimeRange, limit: usize) -> NewsBatch {
        let key = keys::news(range);
        let now = Utc::now();

        if let Some(mut items) = self.cache.get::<Vec<NewsItem>>(&key).await {
            debug!(%key, n = items.len(), "news cache hit");
            rank(&mut items, now, range.duration());
            items.truncate(limit);
            return NewsBatch {
                items,
                synthetic: false,
                from_cache: true,
            };
        }

        let merged = self.collect(range, limit, now).await;
        if !merged.is_empty() {
            self.cache.set(&key, &merged, self.ttl).await;
            let mut items = merged;
            rank(&mut items, now, range.duration());
            items.truncate(limit);
            return NewsBatch {
                items,
                synthetic: false,
                from_cache: false,
            };
        }

        if self.synthetic_fallback {
            counter!("fetch_fallback_total", "kind" => "news").increment(1);
            warn!(range = %range, "no news from any source, using synthetic items");
            let mut items = synthetic::generate(range, limit, now);
            rank(&mut items, now, range.duration());
            return NewsBatch {
                items,
                synthetic: true,
                from_cache: false,
            };
        }

        warn!(range = %range, "no news from any source");
        NewsBatch::default()
    }

    async fn collect(&self, range: TimeRange, limit: usize, now: DateTime<Utc>) -> Vec<NewsItem> {
        let query = NewsQuery {
            time_range: range,
            limit,
        };
        let tasks = self
            .sources
            .iter()
            .map(|s| {
                let src = Arc::clone(s);
                let q = query.clone();
                (s.name().to_string(), async move { src.fetch(&q).await })
            })
            .collect();
        let gathered = fanout::gather("news", tasks, self.deadline).await;

        // Sources that ignore the query still get windowed here.
        let cutoff = query.window_start(now);
        let mut merged = Vec::new();
        for items in gathered.results.into_iter().flatten() {
            for mut it in items {
                if it.published_at < cutoff {
                    continue;
                }
                enrich::annotate(&mut it, &self.weights);
                merged.push(it);
            }
        }

        let raw = merged.len();
        let (kept, dropped) = dedup_by_title(merged);
        info!(
            range = %range,
            raw,
            kept = kept.len(),
            dropped,
            failures = gathered.failures,
            timed_out = gathered.timed_out,
            "news collected"
        );
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::NewsCategory;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn item(title: &str, source: &str, age_min: i64) -> NewsItem {
        NewsItem {
            title: title.into(),
            content: String::new(),
            url: format!("https://{source}/{}", title.len()),
            source: source.into(),
            published_at: Utc::now() - chrono::Duration::minutes(age_min),
            mentioned_coins: vec![],
            category: NewsCategory::General,
            importance_score: 0.0,
            is_synthetic: false,
        }
    }

    struct Fixed {
        name: &'static str,
        items: Vec<NewsItem>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl NewsSource for Fixed {
        async fn fetch(&self, _q: &NewsQuery) -> anyhow::Result<Vec<NewsItem>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.items.clone())
        }
        fn name(&self) -> &str {
            self.name
        }
    }

    struct Failing;

    #[async_trait]
    impl NewsSource for Failing {
        async fn fetch(&self, _q: &NewsQuery) -> anyhow::Result<Vec<NewsItem>> {
            anyhow::bail!("connection refused")
        }
        fn name(&self) -> &str {
            "failing"
        }
    }

    #[test]
    fn normalize_text_collapses_ws_and_punct() {
        let s = "  Hello,&nbsp;&nbsp; world!!!  ";
        assert_eq!(normalize_text(s), "Hello, world");
    }

    #[test]
    fn near_identical_titles_collapse_to_first() {
        let items = vec![
            item("Bitcoin ETF sees record inflows today", "CoinDesk", 5),
            item("Bitcoin ETF sees record inflows, today!", "Cointelegraph", 3),
            item("Ethereum upgrade ships", "Cointelegraph", 2),
        ];
        let (kept, dropped) = dedup_by_title(items);
        assert_eq!(dropped, 1);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].source, "CoinDesk");
    }

    #[test]
    fn rank_prefers_importance_then_recency() {
        let now = Utc::now();
        let mut a = item("old but important", "x", 300);
        a.importance_score = 0.9;
        let b = item("fresh and dull", "x", 0);
        let mut items = vec![b, a];
        rank(&mut items, now, Duration::from_secs(6 * 3600));
        assert_eq!(items[0].title, "old but important");
    }

    #[tokio::test]
    async fn primary_wins_and_result_is_cached() {
        let primary = Arc::new(Fixed {
            name: "CoinDesk",
            items: vec![item("Solana rallies on DEX volume", "CoinDesk", 10)],
            calls: AtomicUsize::new(0),
        });
        let secondary = Arc::new(Fixed {
            name: "Cointelegraph",
            items: vec![
                item("Solana rallies on DEX volume", "Cointelegraph", 9),
                item("Stale story", "Cointelegraph", 60 * 30),
            ],
            calls: AtomicUsize::new(0),
        });
        let cache = Arc::new(CacheTier::in_memory(64));
        let sources: Vec<Arc<dyn NewsSource>> = vec![
            primary.clone() as Arc<dyn NewsSource>,
            secondary.clone() as Arc<dyn NewsSource>,
            Arc::new(Failing) as Arc<dyn NewsSource>,
        ];
        let f = NewsFetcher::new(sources, cache);

        let first = f.fetch(TimeRange::OneHour, 10).await;
        assert_eq!(first.items.len(), 1);
        assert_eq!(first.items[0].source, "CoinDesk");
        assert_eq!(first.items[0].mentioned_coins, vec!["SOL"]);
        assert!(!first.from_cache);

        let second = f.fetch(TimeRange::OneHour, 10).await;
        assert!(second.from_cache);
        assert_eq!(second.items, first.items);
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn total_failure_is_empty_unless_fallback_enabled() {
        let cache = Arc::new(CacheTier::in_memory(64));
        let failing = || vec![Arc::new(Failing) as Arc<dyn NewsSource>];
        let f = NewsFetcher::new(failing(), cache.clone());
        let batch = f.fetch(TimeRange::SixHours, 10).await;
        assert!(batch.items.is_empty());
        assert!(!batch.synthetic);

        let f = NewsFetcher::new(failing(), cache).with_synthetic_fallback(true);
        let batch = f.fetch(TimeRange::SixHours, 4).await;
        assert_eq!(batch.items.len(), 4);
        assert!(batch.synthetic);
        assert!(batch.items.iter().all(|i| i.is_synthetic));
    }
}
