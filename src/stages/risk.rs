//! Risk: security and regulatory news share, price volatility, and data
//! quality folded into one score.

use async_trait::async_trait;

use super::{settle, RiskReport, Stage, StageContext, StageKind, StageResult};
use crate::ingest::types::{NewsCategory, NewsItem};
use crate::verdict::{RiskAssessment, RiskLevel, Sentiment};

pub fn level_for(score: f64) -> RiskLevel {
    if score >= 0.66 {
        RiskLevel::High
    } else if score >= 0.33 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

pub struct RiskStage;

impl RiskStage {
    fn evaluate(&self, news: &[NewsItem], ctx: &StageContext) -> anyhow::Result<StageResult> {
        anyhow::ensure!(!news.is_empty(), "no news items");

        let n = news.len() as f64;
        let share = |c: NewsCategory| news.iter().filter(|i| i.category == c).count() as f64 / n;
        let security = share(NewsCategory::Security);
        let regulation = share(NewsCategory::Regulation);

        let volatility = if ctx.prices.is_empty() {
            0.0
        } else {
            let avg_abs = ctx.prices.iter().map(|q| q.change_24h.abs()).sum::<f64>()
                / ctx.prices.len() as f64;
            (avg_abs / 10.0).min(1.0)
        };
        let synthetic_share = news.iter().filter(|i| i.is_synthetic).count() as f64 / n;
        let thin = if news.len() < 5 { 1.0 } else { 0.0 };

        let score = (0.35 * (security * 2.0).min(1.0)
            + 0.25 * (regulation * 2.0).min(1.0)
            + 0.25 * volatility
            + 0.10 * synthetic_share
            + 0.05 * thin)
            .clamp(0.0, 1.0);

        let mut factors = Vec::new();
        if security > 0.0 {
            factors.push(format!("security incidents in {:.0}% of news", security * 100.0));
        }
        if regulation > 0.0 {
            factors.push(format!("regulatory news in {:.0}% of coverage", regulation * 100.0));
        }
        if volatility >= 0.3 {
            factors.push("elevated 24h price volatility".to_string());
        }
        if synthetic_share > 0.0 {
            factors.push("analysis partly based on synthetic news".to_string());
        }
        if thin > 0.0 {
            factors.push("thin news coverage".to_string());
        }

        let level = level_for(score);
        let signal = if level == RiskLevel::High {
            Sentiment::Bearish
        } else {
            Sentiment::Neutral
        };

        Ok(StageResult::Risk(RiskReport {
            signal,
            confidence: (0.6 + 0.4 * (n / 10.0).min(1.0)).clamp(0.0, 1.0),
            degraded: false,
            assessment: RiskAssessment {
                level,
                score,
                factors,
            },
        }))
    }
}

#[async_trait]
impl Stage for RiskStage {
    fn kind(&self) -> StageKind {
        StageKind::Risk
    }

    async fn analyze(&self, news: &[NewsItem], ctx: &StageContext) -> StageResult {
        settle(self.kind(), self.evaluate(news, ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invocation::{Depth, TimeRange};
    use crate::prices::types::PriceQuote;
    use chrono::Utc;

    fn item(cat: NewsCategory) -> NewsItem {
        NewsItem {
            title: "t".into(),
            content: String::new(),
            url: String::new(),
            source: "x".into(),
            published_at: Utc::now(),
            mentioned_coins: vec![],
            category: cat,
            importance_score: 0.5,
            is_synthetic: false,
        }
    }

    #[test]
    fn levels() {
        assert_eq!(level_for(0.1), RiskLevel::Low);
        assert_eq!(level_for(0.5), RiskLevel::Medium);
        assert_eq!(level_for(0.9), RiskLevel::High);
    }

    #[tokio::test]
    async fn hacks_and_volatility_are_high_risk() {
        let news = vec![
            item(NewsCategory::Security),
            item(NewsCategory::Security),
            item(NewsCategory::Security),
            item(NewsCategory::Regulation),
            item(NewsCategory::Regulation),
            item(NewsCategory::Market),
        ];
        let prices = vec![PriceQuote {
            symbol: "BTC".into(),
            current: 1.0,
            change_24h: -12.0,
            market_cap: None,
            volume_24h: None,
            last_updated: Utc::now(),
            is_synthetic: false,
        }];
        let ctx = StageContext::new("x", Depth::Deep, TimeRange::OneDay).with_prices(prices);
        let r = RiskStage.analyze(&news, &ctx).await;
        let StageResult::Risk(rep) = r else {
            panic!("wrong variant")
        };
        assert_eq!(rep.assessment.level, RiskLevel::High);
        assert_eq!(rep.signal, Sentiment::Bearish);
        assert!(rep.assessment.factors.len() >= 3);
    }
}
