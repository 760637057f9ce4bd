//! # Analysis stages
//! Five independent runners behind one contract:
//! `analyze(news, context) -> StageResult`, which never fails.
//!
//! Stages convert their own errors into a neutral, zero-confidence result
//! flagged `degraded`. [`run_isolated`] additionally turns panics and
//! timeouts into the same shape, so one misbehaving stage cannot take the
//! fan-out down with it.

pub mod ai;
pub mod behavioral;
pub mod market;
pub mod risk;
pub mod sentiment;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::ai_adapter::DynAiClient;
use crate::ingest::types::NewsItem;
use crate::invocation::{Depth, TimeRange};
use crate::prices::types::PriceQuote;
use crate::verdict::{BehavioralInsights, MarketSignal, RiskAssessment, Sentiment};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Sentiment,
    Market,
    Behavioral,
    Risk,
    Ai,
}

impl StageKind {
    pub const ALL: [StageKind; 5] = [
        StageKind::Sentiment,
        StageKind::Market,
        StageKind::Behavioral,
        StageKind::Risk,
        StageKind::Ai,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Sentiment => "sentiment",
            StageKind::Market => "market",
            StageKind::Behavioral => "behavioral",
            StageKind::Risk => "risk",
            StageKind::Ai => "ai",
        }
    }
}

/// Everything a stage may look at besides the news corpus.
#[derive(Debug, Clone)]
pub struct StageContext {
    pub query: String,
    pub depth: Depth,
    pub time_range: TimeRange,
    pub prices: Vec<PriceQuote>,
    pub focus_coins: Vec<String>,
    pub now: DateTime<Utc>,
}

impl StageContext {
    pub fn new(query: impl Into<String>, depth: Depth, time_range: TimeRange) -> Self {
        Self {
            query: query.into(),
            depth,
            time_range,
            prices: Vec::new(),
            focus_coins: Vec::new(),
            now: Utc::now(),
        }
    }

    pub fn with_prices(mut self, prices: Vec<PriceQuote>) -> Self {
        self.prices = prices;
        self
    }

    pub fn with_focus_coins(mut self, coins: Vec<String>) -> Self {
        self.focus_coins = coins;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentReport {
    pub signal: Sentiment,
    pub confidence: f64,
    pub degraded: bool,
    /// Importance-weighted lexicon score in [-1, 1].
    pub score: f64,
    pub positive: usize,
    pub negative: usize,
    pub neutral: usize,
    /// Titles that moved the score the most.
    pub drivers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketReport {
    pub signal: Sentiment,
    pub confidence: f64,
    pub degraded: bool,
    pub avg_change_24h: Option<f64>,
    pub signals: Vec<MarketSignal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehavioralReport {
    pub signal: Sentiment,
    pub confidence: f64,
    pub degraded: bool,
    pub insights: BehavioralInsights,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskReport {
    pub signal: Sentiment,
    pub confidence: f64,
    pub degraded: bool,
    pub assessment: RiskAssessment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiReport {
    pub signal: Sentiment,
    pub confidence: f64,
    pub degraded: bool,
    pub provider: String,
    pub summary: Option<String>,
}

/// One variant per stage, each with its own confidence and degraded flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum StageResult {
    Sentiment(SentimentReport),
    Market(MarketReport),
    Behavioral(BehavioralReport),
    Risk(RiskReport),
    Ai(AiReport),
}

macro_rules! each_report {
    ($self:expr, $r:ident => $e:expr) => {
        match $self {
            StageResult::Sentiment($r) => $e,
            StageResult::Market($r) => $e,
            StageResult::Behavioral($r) => $e,
            StageResult::Risk($r) => $e,
            StageResult::Ai($r) => $e,
        }
    };
}

impl StageResult {
    /// Neutral, zero-confidence, degraded output for `kind`.
    pub fn neutral(kind: StageKind) -> Self {
        let (signal, confidence, degraded) = (Sentiment::Neutral, 0.0, true);
        match kind {
            StageKind::Sentiment => StageResult::Sentiment(SentimentReport {
                signal,
                confidence,
                degraded,
                score: 0.0,
                positive: 0,
                negative: 0,
                neutral: 0,
                drivers: Vec::new(),
            }),
            StageKind::Market => StageResult::Market(MarketReport {
                signal,
                confidence,
                degraded,
                avg_change_24h: None,
                signals: Vec::new(),
            }),
            StageKind::Behavioral => StageResult::Behavioral(BehavioralReport {
                signal,
                confidence,
                degraded,
                insights: BehavioralInsights::default(),
            }),
            StageKind::Risk => StageResult::Risk(RiskReport {
                signal,
                confidence,
                degraded,
                assessment: RiskAssessment::default(),
            }),
            StageKind::Ai => StageResult::Ai(AiReport {
                signal,
                confidence,
                degraded,
                provider: String::new(),
                summary: None,
            }),
        }
    }

    pub fn kind(&self) -> StageKind {
        match self {
            StageResult::Sentiment(_) => StageKind::Sentiment,
            StageResult::Market(_) => StageKind::Market,
            StageResult::Behavioral(_) => StageKind::Behavioral,
            StageResult::Risk(_) => StageKind::Risk,
            StageResult::Ai(_) => StageKind::Ai,
        }
    }

    pub fn signal(&self) -> Sentiment {
        each_report!(self, r => r.signal)
    }

    /// Clamped to [0, 1].
    pub fn confidence(&self) -> f64 {
        each_report!(self, r => r.confidence).clamp(0.0, 1.0)
    }

    pub fn is_degraded(&self) -> bool {
        each_report!(self, r => r.degraded)
    }

    /// Signals this stage contributes to the verdict; none when degraded.
    pub fn signals(&self) -> Vec<MarketSignal> {
        if self.is_degraded() {
            return Vec::new();
        }
        let stage = self.kind().as_str().to_string();
        match self {
            StageResult::Sentiment(r) => vec![MarketSignal {
                kind: "news_sentiment".into(),
                sentiment: r.signal,
                strength: r.score.abs().min(1.0),
                description: format!(
                    "{} positive / {} negative / {} neutral headlines",
                    r.positive, r.negative, r.neutral
                ),
                stage,
            }],
            StageResult::Market(r) => r.signals.clone(),
            StageResult::Behavioral(r) => vec![MarketSignal {
                kind: "crowd_psychology".into(),
                sentiment: r.signal,
                strength: ((r.insights.fear_greed_index as f64 - 50.0).abs() / 50.0).min(1.0),
                description: format!("fear/greed index {}", r.insights.fear_greed_index),
                stage,
            }],
            StageResult::Risk(_) => Vec::new(),
            StageResult::Ai(r) => match &r.summary {
                Some(s) => vec![MarketSignal {
                    kind: "ai_assessment".into(),
                    sentiment: r.signal,
                    strength: r.confidence.clamp(0.0, 1.0),
                    description: s.clone(),
                    stage,
                }],
                None => Vec::new(),
            },
        }
    }
}

/// Uniform contract for analysis stages. Implementations must not fail;
/// see [`settle`] for the usual way to uphold that.
#[async_trait]
pub trait Stage: Send + Sync {
    fn kind(&self) -> StageKind;

    /// Shallowest depth at which the stage runs.
    fn min_depth(&self) -> Depth {
        Depth::Quick
    }

    /// Stages whose collaborator is switched off are skipped, not degraded.
    fn enabled(&self) -> bool {
        true
    }

    async fn analyze(&self, news: &[NewsItem], ctx: &StageContext) -> StageResult;
}

/// Turn a stage's internal `Result` into its never-failing output.
pub fn settle(kind: StageKind, r: anyhow::Result<StageResult>) -> StageResult {
    match r {
        Ok(res) => res,
        Err(e) => {
            warn!(stage = kind.as_str(), error = ?e, "stage degraded");
            StageResult::neutral(kind)
        }
    }
}

/// Run one stage with panic isolation and a time bound. Always returns.
pub async fn run_isolated(
    stage: &dyn Stage,
    news: &[NewsItem],
    ctx: &StageContext,
    timeout: Duration,
) -> StageResult {
    let kind = stage.kind();
    let guarded = AssertUnwindSafe(stage.analyze(news, ctx)).catch_unwind();
    let result = match tokio::time::timeout(timeout, guarded).await {
        Ok(Ok(res)) => res,
        Ok(Err(_panic)) => {
            warn!(stage = kind.as_str(), "stage panicked");
            StageResult::neutral(kind)
        }
        Err(_) => {
            warn!(stage = kind.as_str(), ?timeout, "stage timed out");
            StageResult::neutral(kind)
        }
    };
    if result.is_degraded() {
        counter!("stage_degraded_total", "stage" => kind.as_str()).increment(1);
    }
    result
}

/// The five built-in stages, in reporting order.
pub fn default_stages(ai: DynAiClient) -> Vec<Arc<dyn Stage>> {
    vec![
        Arc::new(sentiment::SentimentStage::new()) as Arc<dyn Stage>,
        Arc::new(market::MarketStage) as Arc<dyn Stage>,
        Arc::new(behavioral::BehavioralStage) as Arc<dyn Stage>,
        Arc::new(risk::RiskStage) as Arc<dyn Stage>,
        Arc::new(ai::AiStage::new(ai)) as Arc<dyn Stage>,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Panicky;

    #[async_trait]
    impl Stage for Panicky {
        fn kind(&self) -> StageKind {
            StageKind::Behavioral
        }
        async fn analyze(&self, _news: &[NewsItem], _ctx: &StageContext) -> StageResult {
            panic!("stage bug")
        }
    }

    struct Sleepy;

    #[async_trait]
    impl Stage for Sleepy {
        fn kind(&self) -> StageKind {
            StageKind::Market
        }
        async fn analyze(&self, _news: &[NewsItem], _ctx: &StageContext) -> StageResult {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            StageResult::neutral(StageKind::Market)
        }
    }

    fn ctx() -> StageContext {
        StageContext::new("btc", Depth::Standard, TimeRange::SixHours)
    }

    #[tokio::test]
    async fn panic_becomes_degraded_neutral() {
        let r = run_isolated(&Panicky, &[], &ctx(), Duration::from_secs(1)).await;
        assert_eq!(r.kind(), StageKind::Behavioral);
        assert!(r.is_degraded());
        assert_eq!(r.signal(), Sentiment::Neutral);
        assert_eq!(r.confidence(), 0.0);
        assert!(r.signals().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_becomes_degraded_neutral() {
        let r = run_isolated(&Sleepy, &[], &ctx(), Duration::from_millis(50)).await;
        assert!(r.is_degraded());
        assert_eq!(r.kind(), StageKind::Market);
    }

    #[test]
    fn tagged_on_the_wire() {
        let j = serde_json::to_value(StageResult::neutral(StageKind::Risk)).unwrap();
        assert_eq!(j["stage"], "risk");
        assert_eq!(j["degraded"], true);
    }
}
