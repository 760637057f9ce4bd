// src/ingest/types.rs
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::invocation::TimeRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NewsCategory {
    Regulation,
    Market,
    Technology,
    Adoption,
    Security,
    General,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewsItem {
    pub title: String,
    pub content: String,
    pub url: String,
    pub source: String, // e.g., "CoinDesk", "Cointelegraph"
    pub published_at: DateTime<Utc>,
    /// Derived by `ingest::enrich`, not authoritative.
    pub mentioned_coins: Vec<String>,
    pub category: NewsCategory,
    /// Derived, in [0, 1].
    pub importance_score: f64,
    /// Produced by the synthetic fallback rather than a real source.
    #[serde(default)]
    pub is_synthetic: bool,
}

/// What a source is asked for: items from the last `time_range`, at most
/// `limit` of them.
#[derive(Debug, Clone)]
pub struct NewsQuery {
    pub time_range: TimeRange,
    pub limit: usize,
}

impl NewsQuery {
    /// Oldest publication time inside the window.
    pub fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - chrono::Duration::from_std(self.time_range.duration())
            .unwrap_or_else(|_| chrono::Duration::hours(24))
    }

    /// Items inside the window, newest first, capped at `limit`.
    pub fn trim(&self, mut items: Vec<NewsItem>, now: DateTime<Utc>) -> Vec<NewsItem> {
        let start = self.window_start(now);
        items.retain(|it| it.published_at >= start);
        items.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        items.truncate(self.limit);
        items
    }
}

/// Best-effort news client. Sources apply their own request timeouts;
/// the fetcher races the whole fan-out against its own deadline.
#[async_trait::async_trait]
pub trait NewsSource: Send + Sync {
    async fn fetch(&self, query: &NewsQuery) -> Result<Vec<NewsItem>>;
    fn name(&self) -> &str;
}
