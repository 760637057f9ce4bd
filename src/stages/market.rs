//! Price momentum from the quotes in the stage context.

use async_trait::async_trait;

use super::{settle, MarketReport, Stage, StageContext, StageKind, StageResult};
use crate::ingest::types::NewsItem;
use crate::verdict::{MarketSignal, Sentiment};

/// 24h moves (percent) below this are noise.
const MOVE_THRESHOLD: f64 = 2.0;
const DEAD_ZONE_PCT: f64 = 1.0;

pub struct MarketStage;

impl MarketStage {
    fn evaluate(&self, ctx: &StageContext) -> anyhow::Result<StageResult> {
        if ctx.prices.is_empty() {
            // Prices not requested: no opinion, but nothing failed either.
            return Ok(StageResult::Market(MarketReport {
                signal: Sentiment::Neutral,
                confidence: 0.1,
                degraded: false,
                avg_change_24h: None,
                signals: Vec::new(),
            }));
        }

        let n = ctx.prices.len() as f64;
        let avg = ctx.prices.iter().map(|q| q.change_24h).sum::<f64>() / n;
        anyhow::ensure!(avg.is_finite(), "non-finite price change");
        let real_share = ctx.prices.iter().filter(|q| !q.is_synthetic).count() as f64 / n;

        let signals = ctx
            .prices
            .iter()
            .filter(|q| q.change_24h.abs() >= MOVE_THRESHOLD)
            .map(|q| MarketSignal {
                kind: "price_momentum".into(),
                sentiment: Sentiment::from_score(q.change_24h, 0.0),
                strength: (q.change_24h.abs() / 10.0).min(1.0),
                description: format!(
                    "{} {:+.2}% in 24h{}",
                    q.symbol,
                    q.change_24h,
                    if q.is_synthetic { " (estimated)" } else { "" }
                ),
                stage: StageKind::Market.as_str().to_string(),
            })
            .collect();

        let magnitude = (avg.abs() / 5.0).min(1.0);
        let confidence = (0.7 * magnitude + 0.3) * (0.5 + 0.5 * real_share);

        Ok(StageResult::Market(MarketReport {
            signal: Sentiment::from_score(avg, DEAD_ZONE_PCT),
            confidence: confidence.clamp(0.0, 1.0),
            degraded: false,
            avg_change_24h: Some(avg),
            signals,
        }))
    }
}

#[async_trait]
impl Stage for MarketStage {
    fn kind(&self) -> StageKind {
        StageKind::Market
    }

    async fn analyze(&self, _news: &[NewsItem], ctx: &StageContext) -> StageResult {
        settle(self.kind(), self.evaluate(ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invocation::{Depth, TimeRange};
    use crate::prices::types::PriceQuote;
    use chrono::Utc;

    fn q(sym: &str, change: f64, synthetic: bool) -> PriceQuote {
        PriceQuote {
            symbol: sym.into(),
            current: 1.0,
            change_24h: change,
            market_cap: None,
            volume_24h: None,
            last_updated: Utc::now(),
            is_synthetic: synthetic,
        }
    }

    #[tokio::test]
    async fn falling_market_is_bearish_with_signals() {
        let ctx = StageContext::new("x", Depth::Standard, TimeRange::OneDay)
            .with_prices(vec![q("BTC", -6.0, false), q("ETH", -1.0, false)]);
        let r = MarketStage.analyze(&[], &ctx).await;
        assert_eq!(r.signal(), Sentiment::Bearish);
        assert_eq!(r.signals().len(), 1);
        assert_eq!(r.signals()[0].sentiment, Sentiment::Bearish);
    }

    #[tokio::test]
    async fn synthetic_quotes_lower_confidence() {
        let real = StageContext::new("x", Depth::Standard, TimeRange::OneDay)
            .with_prices(vec![q("BTC", 4.0, false)]);
        let fake = StageContext::new("x", Depth::Standard, TimeRange::OneDay)
            .with_prices(vec![q("BTC", 4.0, true)]);
        let a = MarketStage.analyze(&[], &real).await.confidence();
        let b = MarketStage.analyze(&[], &fake).await.confidence();
        assert!(b < a);
    }

    #[tokio::test]
    async fn no_prices_is_neutral_not_degraded() {
        let ctx = StageContext::new("x", Depth::Quick, TimeRange::OneHour);
        let r = MarketStage.analyze(&[], &ctx).await;
        assert_eq!(r.signal(), Sentiment::Neutral);
        assert!(!r.is_degraded());
    }
}
