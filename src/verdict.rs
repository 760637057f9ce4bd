//! Verdict: the single, immutable result of one analysis.
//!
//! Built once per cache miss by [`crate::fusion`] and replayed verbatim from
//! the cache afterwards; only `processing_time_ms` is re-stamped on a hit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Sentiment {
    Bullish,
    Bearish,
    Neutral,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Bullish => "BULLISH",
            Sentiment::Bearish => "BEARISH",
            Sentiment::Neutral => "NEUTRAL",
        }
    }

    /// Map a signed score to a direction with a dead zone around zero.
    pub fn from_score(score: f64, dead_zone: f64) -> Self {
        if score > dead_zone {
            Sentiment::Bullish
        } else if score < -dead_zone {
            Sentiment::Bearish
        } else {
            Sentiment::Neutral
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// One observable signal, attributed to the stage that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSignal {
    #[serde(rename = "type")]
    pub kind: String,
    pub sentiment: Sentiment,
    /// In [0, 1].
    pub strength: f64,
    pub description: String,
    pub stage: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehavioralInsights {
    /// 0 = extreme fear, 100 = extreme greed.
    pub fear_greed_index: u8,
    pub crowd_sentiment: Sentiment,
    /// Share of items with hype language, in [0, 1].
    pub hype_level: f64,
    /// Share of items with fear/uncertainty language, in [0, 1].
    pub fud_level: f64,
    #[serde(default)]
    pub notes: Vec<String>,
}

impl Default for BehavioralInsights {
    fn default() -> Self {
        Self {
            fear_greed_index: 50,
            crowd_sentiment: Sentiment::Neutral,
            hype_level: 0.0,
            fud_level: 0.0,
            notes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub level: RiskLevel,
    /// In [0, 1].
    pub score: f64,
    #[serde(default)]
    pub factors: Vec<String>,
}

impl Default for RiskAssessment {
    fn default() -> Self {
        Self {
            level: RiskLevel::Medium,
            score: 0.5,
            factors: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageAccounting {
    pub successful: usize,
    pub total: usize,
    /// Names of stages that fell back to neutral output.
    #[serde(default)]
    pub degraded: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataQuality {
    pub synthetic_news: bool,
    pub synthetic_prices: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub overall_sentiment: Sentiment,
    /// In [0, 1].
    pub confidence_score: f64,
    pub market_signals: Vec<MarketSignal>,
    pub behavioral_insights: BehavioralInsights,
    pub risk_assessment: RiskAssessment,
    pub actionable_recommendations: Vec<String>,
    /// News items that fed the stages.
    pub data_sources_count: usize,
    pub timestamp: DateTime<Utc>,
    pub processing_time_ms: u64,
    pub analysis_stages: StageAccounting,
    pub data_quality: DataQuality,
}

pub const RETRY_RECOMMENDATION: &str =
    "No news could be retrieved for this window; retry shortly or widen the time_range.";

impl Verdict {
    /// Degraded result for an invocation that found no news at all.
    pub fn terminal(total_stages: usize, processing_time_ms: u64) -> Self {
        Self {
            overall_sentiment: Sentiment::Neutral,
            confidence_score: 0.0,
            market_signals: Vec::new(),
            behavioral_insights: BehavioralInsights::default(),
            risk_assessment: RiskAssessment {
                level: RiskLevel::High,
                score: 1.0,
                factors: vec!["no news data available".to_string()],
            },
            actionable_recommendations: vec![RETRY_RECOMMENDATION.to_string()],
            data_sources_count: 0,
            timestamp: Utc::now(),
            processing_time_ms,
            analysis_stages: StageAccounting {
                successful: 0,
                total: total_stages,
                degraded: Vec::new(),
            },
            data_quality: DataQuality::default(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.data_sources_count == 0
            && self.risk_assessment.level == RiskLevel::High
            && self.market_signals.is_empty()
    }

    /// Same verdict, new timing (used on cache hits).
    pub fn with_processing_time(mut self, ms: u64) -> Self {
        self.processing_time_ms = ms;
        self
    }

    /// Compact JSON, the `text` payload of a tool result.
    pub fn to_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_shape_on_the_wire() {
        let v = Verdict::terminal(5, 12);
        let j: serde_json::Value = serde_json::from_str(&v.to_text()).unwrap();
        assert_eq!(j["overall_sentiment"], "NEUTRAL");
        assert_eq!(j["confidence_score"], 0.0);
        assert_eq!(j["risk_assessment"]["level"], "HIGH");
        assert_eq!(j["market_signals"].as_array().unwrap().len(), 0);
        assert!(j["actionable_recommendations"][0]
            .as_str()
            .unwrap()
            .contains("retry"));
        assert!(v.is_terminal());
    }

    #[test]
    fn score_dead_zone() {
        assert_eq!(Sentiment::from_score(0.3, 0.1), Sentiment::Bullish);
        assert_eq!(Sentiment::from_score(-0.3, 0.1), Sentiment::Bearish);
        assert_eq!(Sentiment::from_score(0.05, 0.1), Sentiment::Neutral);
    }
}
