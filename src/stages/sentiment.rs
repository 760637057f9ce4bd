//! Lexicon sentiment over headlines and summaries.
//!
//! Each item gets a signed lexicon score (with short-range negation); items
//! are combined weighted by their importance.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use std::collections::HashMap;

use super::{settle, SentimentReport, Stage, StageContext, StageKind, StageResult};
use crate::ingest::types::NewsItem;
use crate::verdict::Sentiment;

static LEXICON: Lazy<HashMap<String, i32>> = Lazy::new(|| {
    let raw = include_str!("../../crypto_lexicon.json");
    serde_json::from_str::<HashMap<String, i32>>(raw).unwrap_or_else(|e| {
        tracing::error!(error = %e, "crypto lexicon unreadable; sentiment stage will stay neutral");
        HashMap::new()
    })
});

/// Per-item scores are capped at this magnitude before weighting.
const ITEM_CAP: f64 = 3.0;
const DEAD_ZONE: f64 = 0.15;

#[derive(Debug, Clone, Default)]
pub struct SentimentAnalyzer;

impl SentimentAnalyzer {
    pub fn new() -> Self {
        Self
    }

    #[inline]
    fn word_score(&self, w: &str) -> i32 {
        *LEXICON.get(w).unwrap_or(&0)
    }

    /// Returns (score, token count). A negator within the previous three
    /// tokens flips the sign of a scored word.
    pub fn score_text(&self, text: &str) -> (i32, usize) {
        let tokens: Vec<String> = tokenize(text).collect();
        let mut score: i32 = 0;

        for i in 0..tokens.len() {
            let base = self.word_score(tokens[i].as_str());
            if base == 0 {
                continue;
            }
            let negated = (1..=3).any(|k| i >= k && is_negator(tokens[i - k].as_str()));
            score += if negated { -base } else { base };
        }

        (score, tokens.len())
    }
}

fn tokenize(s: &str) -> impl Iterator<Item = String> + '_ {
    s.split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|t| !t.is_empty())
        .map(|t| t.to_ascii_lowercase())
}

fn is_negator(tok: &str) -> bool {
    matches!(
        tok,
        "not" | "no" | "never" | "isn't" | "wasn't" | "aren't" | "won't" | "can't" | "cannot"
            | "without" | "despite"
    )
}

pub struct SentimentStage {
    analyzer: SentimentAnalyzer,
}

impl SentimentStage {
    pub fn new() -> Self {
        Self {
            analyzer: SentimentAnalyzer::new(),
        }
    }

    fn evaluate(&self, news: &[NewsItem]) -> anyhow::Result<StageResult> {
        anyhow::ensure!(!news.is_empty(), "no news items to score");

        let mut weighted = 0.0;
        let mut total_w = 0.0;
        let (mut pos, mut neg, mut neu) = (0usize, 0usize, 0usize);
        let mut drivers: Vec<(f64, &str)> = Vec::new();

        for it in news {
            let (s, _) = self
                .analyzer
                .score_text(&format!("{} {}", it.title, it.content));
            let s = (s as f64).clamp(-ITEM_CAP, ITEM_CAP) / ITEM_CAP;
            let w = 0.5 + it.importance_score;
            weighted += w * s;
            total_w += w;
            match s {
                x if x > 0.0 => pos += 1,
                x if x < 0.0 => neg += 1,
                _ => neu += 1,
            }
            if s != 0.0 {
                drivers.push((w * s.abs(), it.title.as_str()));
            }
        }

        let score = if total_w > 0.0 { weighted / total_w } else { 0.0 };
        let coverage = (pos + neg) as f64 / news.len() as f64;
        let confidence = (0.6 * score.abs() + 0.4 * coverage).clamp(0.0, 1.0);

        drivers.sort_by(|a, b| b.0.total_cmp(&a.0));
        Ok(StageResult::Sentiment(SentimentReport {
            signal: Sentiment::from_score(score, DEAD_ZONE),
            confidence,
            degraded: false,
            score,
            positive: pos,
            negative: neg,
            neutral: neu,
            drivers: drivers.into_iter().take(3).map(|(_, t)| t.to_string()).collect(),
        }))
    }
}

impl Default for SentimentStage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Stage for SentimentStage {
    fn kind(&self) -> StageKind {
        StageKind::Sentiment
    }

    async fn analyze(&self, news: &[NewsItem], _ctx: &StageContext) -> StageResult {
        settle(self.kind(), self.evaluate(news))
    }
}
