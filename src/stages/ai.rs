//! AI assessment through the configured [`AiClient`](crate::ai_adapter::AiClient).
//! Runs from `standard` depth; `deep` hands the model the whole corpus.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use super::{settle, AiReport, Stage, StageContext, StageKind, StageResult};
use crate::ai_adapter::DynAiClient;
use crate::ingest::types::NewsItem;
use crate::invocation::Depth;
use crate::verdict::Sentiment;

const STANDARD_HEADLINES: usize = 10;

static RE_SENTIMENT: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)\b(bullish|bearish|neutral)\b").ok());
static RE_CONFIDENCE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)confidence\s*[:=]?\s*([01](?:\.\d+)?)").ok());
static RE_SUMMARY: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"(?i)summary\s*:\s*(.+)$").ok());

pub struct AiStage {
    client: DynAiClient,
}

impl AiStage {
    pub fn new(client: DynAiClient) -> Self {
        Self { client }
    }

    fn prompt(news: &[NewsItem], ctx: &StageContext) -> String {
        let take = if ctx.depth == Depth::Deep {
            news.len()
        } else {
            STANDARD_HEADLINES
        };
        let mut p = format!(
            "Query: {}\nWindow: {}\nHeadlines:\n",
            ctx.query, ctx.time_range
        );
        for it in news.iter().take(take) {
            p.push_str(&format!("- [{}] {}\n", it.source, it.title));
        }
        if !ctx.prices.is_empty() {
            p.push_str("Prices (24h change):\n");
            for q in &ctx.prices {
                p.push_str(&format!("- {} {:+.2}%\n", q.symbol, q.change_24h));
            }
        }
        p
    }

    async fn evaluate(&self, news: &[NewsItem], ctx: &StageContext) -> anyhow::Result<StageResult> {
        anyhow::ensure!(!news.is_empty(), "no news items");
        let Some(reply) = self.client.analyze(&Self::prompt(news, ctx)).await else {
            anyhow::bail!("no response from AI provider {}", self.client.provider_name());
        };
        let (signal, confidence, summary) = parse_reply(&reply)?;
        Ok(StageResult::Ai(AiReport {
            signal,
            confidence,
            degraded: false,
            provider: self.client.provider_name().to_string(),
            summary,
        }))
    }
}

/// `SENTIMENT: X; CONFIDENCE: 0.n; SUMMARY: ...`, tolerating loose formats.
pub fn parse_reply(reply: &str) -> anyhow::Result<(Sentiment, f64, Option<String>)> {
    let sentiment = RE_SENTIMENT
        .as_ref()
        .and_then(|re| re.captures(reply))
        .and_then(|c| c.get(1))
        .map(|m| match m.as_str().to_ascii_lowercase().as_str() {
            "bullish" => Sentiment::Bullish,
            "bearish" => Sentiment::Bearish,
            _ => Sentiment::Neutral,
        })
        .ok_or_else(|| anyhow::anyhow!("AI reply carries no sentiment"))?;
    let confidence = RE_CONFIDENCE
        .as_ref()
        .and_then(|re| re.captures(reply))
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .unwrap_or(0.5)
        .clamp(0.0, 1.0);
    let summary = RE_SUMMARY
        .as_ref()
        .and_then(|re| re.captures(reply))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty());
    Ok((sentiment, confidence, summary))
}

#[async_trait]
impl Stage for AiStage {
    fn kind(&self) -> StageKind {
        StageKind::Ai
    }

    fn min_depth(&self) -> Depth {
        Depth::Standard
    }

    fn enabled(&self) -> bool {
        self.client.is_enabled()
    }

    async fn analyze(&self, news: &[NewsItem], ctx: &StageContext) -> StageResult {
        settle(self.kind(), self.evaluate(news, ctx).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai_adapter::{DisabledClient, LimitedClient, MockProvider};
    use crate::ingest::types::NewsCategory;
    use crate::invocation::TimeRange;
    use chrono::Utc;
    use std::sync::Arc;

    fn news() -> Vec<NewsItem> {
        vec![NewsItem {
            title: "BTC steady".into(),
            content: String::new(),
            url: String::new(),
            source: "CoinDesk".into(),
            published_at: Utc::now(),
            mentioned_coins: vec!["BTC".into()],
            category: NewsCategory::Market,
            importance_score: 0.5,
            is_synthetic: false,
        }]
    }

    #[test]
    fn parses_structured_and_loose_replies() {
        let (s, c, sum) =
            parse_reply("SENTIMENT: BULLISH; CONFIDENCE: 0.72; SUMMARY: ETF demand strong").unwrap();
        assert_eq!(s, Sentiment::Bullish);
        assert!((c - 0.72).abs() < 1e-9);
        assert_eq!(sum.as_deref(), Some("ETF demand strong"));

        let (s, c, _) = parse_reply("Overall bearish tone").unwrap();
        assert_eq!(s, Sentiment::Bearish);
        assert_eq!(c, 0.5);

        assert!(parse_reply("no idea").is_err());
    }

    #[tokio::test]
    async fn mock_provider_yields_report() {
        let stage = AiStage::new(Arc::new(LimitedClient::new(MockProvider::neutral(), 10)));
        let ctx = StageContext::new("btc", Depth::Standard, TimeRange::SixHours);
        let r = stage.analyze(&news(), &ctx).await;
        assert!(!r.is_degraded());
        assert_eq!(r.signal(), Sentiment::Neutral);
        assert_eq!(r.signals().len(), 1);
    }

    #[tokio::test]
    async fn disabled_client_is_skipped_and_degrades_if_run() {
        let stage = AiStage::new(Arc::new(DisabledClient));
        assert!(!stage.enabled());
        assert!(AiStage::new(Arc::new(LimitedClient::new(MockProvider::neutral(), 1))).enabled());
        let ctx = StageContext::new("btc", Depth::Deep, TimeRange::SixHours);
        let r = stage.analyze(&news(), &ctx).await;
        assert!(r.is_degraded());
        assert_eq!(r.confidence(), 0.0);
    }
}
