//! Crowd psychology: hype vs fear language across the corpus, folded into a
//! 0..100 fear/greed index.

use async_trait::async_trait;

use super::{settle, BehavioralReport, Stage, StageContext, StageKind, StageResult};
use crate::ingest::types::NewsItem;
use crate::verdict::{BehavioralInsights, Sentiment};

const HYPE: &[&str] = &[
    "moon", "all-time high", "ath", "fomo", "soar", "surge", "rally", "record", "parabolic",
    "breakout", "euphoria",
];
const FUD: &[&str] = &[
    "crash", "fear", "panic", "dump", "hack", "ban", "lawsuit", "sell-off", "selloff", "plunge",
    "liquidat", "capitulat", "uncertain",
];

fn has_any(text: &str, words: &[&str]) -> bool {
    words.iter().any(|w| text.contains(w))
}

pub struct BehavioralStage;

impl BehavioralStage {
    fn evaluate(&self, news: &[NewsItem]) -> anyhow::Result<StageResult> {
        anyhow::ensure!(!news.is_empty(), "no news items");

        let n = news.len() as f64;
        let (mut hype, mut fud) = (0usize, 0usize);
        for it in news {
            let text = format!("{} {}", it.title, it.content).to_lowercase();
            if has_any(&text, HYPE) {
                hype += 1;
            }
            if has_any(&text, FUD) {
                fud += 1;
            }
        }
        let hype_level = hype as f64 / n;
        let fud_level = fud as f64 / n;
        let balance = hype_level - fud_level;
        let index = (50.0 + 50.0 * balance).round().clamp(0.0, 100.0) as u8;

        let mut notes = Vec::new();
        if index >= 75 {
            notes.push("extreme greed: crowded positioning, watch for reversals".to_string());
        } else if index <= 25 {
            notes.push("extreme fear: capitulation risk, contrarian setups possible".to_string());
        }
        if hype_level > 0.0 && fud_level > 0.0 && balance.abs() < 0.1 {
            notes.push("crowd is split between hype and fear".to_string());
        }

        let crowd = Sentiment::from_score(balance, 0.1);
        let sample = (n / 5.0).min(1.0);
        let confidence = ((balance.abs() + 0.2).min(1.0) * sample).clamp(0.0, 1.0);

        Ok(StageResult::Behavioral(BehavioralReport {
            signal: crowd,
            confidence,
            degraded: false,
            insights: BehavioralInsights {
                fear_greed_index: index,
                crowd_sentiment: crowd,
                hype_level,
                fud_level,
                notes,
            },
        }))
    }
}

#[async_trait]
impl Stage for BehavioralStage {
    fn kind(&self) -> StageKind {
        StageKind::Behavioral
    }

    async fn analyze(&self, news: &[NewsItem], _ctx: &StageContext) -> StageResult {
        settle(self.kind(), self.evaluate(news))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::NewsCategory;
    use crate::invocation::{Depth, TimeRange};
    use chrono::Utc;

    fn item(title: &str) -> NewsItem {
        NewsItem {
            title: title.into(),
            content: String::new(),
            url: String::new(),
            source: "x".into(),
            published_at: Utc::now(),
            mentioned_coins: vec![],
            category: NewsCategory::General,
            importance_score: 0.5,
            is_synthetic: false,
        }
    }

    #[tokio::test]
    async fn fear_dominated_corpus() {
        let news: Vec<NewsItem> = [
            "Exchange hack sparks panic",
            "Liquidations pile up as market plunges",
            "Traders fear further downside",
            "Lawsuit filed against issuer",
            "Calm session for altcoins",
        ]
        .iter()
        .map(|t| item(t))
        .collect();
        let ctx = StageContext::new("x", Depth::Standard, TimeRange::OneDay);
        let r = BehavioralStage.analyze(&news, &ctx).await;
        assert_eq!(r.signal(), Sentiment::Bearish);
        let StageResult::Behavioral(rep) = r else {
            panic!("wrong variant")
        };
        assert!(rep.insights.fear_greed_index <= 25);
        assert!(!rep.insights.notes.is_empty());
    }
}
