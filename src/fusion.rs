//! # Fusion
//! Pure merge of stage results into one [`Verdict`]. No I/O.
//!
//! Each stage votes for its signal with weight `confidence × importance`.
//! The bucket with the largest share wins (ties go to NEUTRAL), and the
//! verdict confidence is `winning share × successful / total`.

use chrono::Utc;

use crate::config::FusionWeights;
use crate::stages::{StageKind, StageResult};
use crate::verdict::{
    BehavioralInsights, DataQuality, RiskAssessment, RiskLevel, Sentiment, StageAccounting,
    Verdict,
};

const TIE_EPSILON: f64 = 1e-9;

/// Facts about the inputs that the stage results don't carry.
#[derive(Debug, Clone, Copy, Default)]
pub struct FusionInputs {
    pub news_count: usize,
    pub data_quality: DataQuality,
    pub processing_time_ms: u64,
}

pub fn importance(w: &FusionWeights, kind: StageKind) -> f64 {
    match kind {
        StageKind::Sentiment => w.sentiment,
        StageKind::Market => w.market,
        StageKind::Behavioral => w.behavioral,
        StageKind::Risk => w.risk,
        StageKind::Ai => w.ai,
    }
}

/// (bullish, bearish, neutral) weight sums.
pub fn buckets(results: &[StageResult], w: &FusionWeights) -> (f64, f64, f64) {
    let (mut bull, mut bear, mut neu) = (0.0, 0.0, 0.0);
    for r in results {
        let v = r.confidence() * importance(w, r.kind()).max(0.0);
        match r.signal() {
            Sentiment::Bullish => bull += v,
            Sentiment::Bearish => bear += v,
            Sentiment::Neutral => neu += v,
        }
    }
    (bull, bear, neu)
}

/// Winning direction and its share of the total weight.
pub fn decide(bull: f64, bear: f64, neu: f64) -> (Sentiment, f64) {
    let total = bull + bear + neu;
    if total <= 0.0 {
        return (Sentiment::Neutral, 0.0);
    }
    let max = bull.max(bear).max(neu);
    let at_max = [bull, bear, neu]
        .iter()
        .filter(|v| (max - **v).abs() <= TIE_EPSILON)
        .count();
    let winner = if at_max > 1 {
        Sentiment::Neutral
    } else if max == bull {
        Sentiment::Bullish
    } else if max == bear {
        Sentiment::Bearish
    } else {
        Sentiment::Neutral
    };
    (winner, max / total)
}

pub fn fuse(results: &[StageResult], weights: &FusionWeights, inputs: FusionInputs) -> Verdict {
    let (bull, bear, neu) = buckets(results, weights);
    let (overall, share) = decide(bull, bear, neu);

    let total = results.len();
    let degraded: Vec<String> = results
        .iter()
        .filter(|r| r.is_degraded())
        .map(|r| r.kind().as_str().to_string())
        .collect();
    let successful = total - degraded.len();
    let confidence = if total == 0 {
        0.0
    } else {
        (share * successful as f64 / total as f64).clamp(0.0, 1.0)
    };

    let behavioral = results
        .iter()
        .find_map(|r| match r {
            StageResult::Behavioral(b) if !b.degraded => Some(b.insights.clone()),
            _ => None,
        })
        .unwrap_or_else(BehavioralInsights::default);
    let mut risk = results
        .iter()
        .find_map(|r| match r {
            StageResult::Risk(x) if !x.degraded => Some(x.assessment.clone()),
            _ => None,
        })
        .unwrap_or_else(RiskAssessment::default);
    if inputs.data_quality.synthetic_prices {
        risk.factors.push("price data partly estimated".to_string());
    }
    let ai_summary = results.iter().find_map(|r| match r {
        StageResult::Ai(a) if !a.degraded => a.summary.clone(),
        _ => None,
    });

    let market_signals = results.iter().flat_map(|r| r.signals()).collect();
    let actionable_recommendations = recommendations(
        overall,
        confidence,
        &risk,
        &degraded,
        inputs.data_quality,
        ai_summary,
    );

    Verdict {
        overall_sentiment: overall,
        confidence_score: confidence,
        market_signals,
        behavioral_insights: behavioral,
        risk_assessment: risk,
        actionable_recommendations,
        data_sources_count: inputs.news_count,
        timestamp: Utc::now(),
        processing_time_ms: inputs.processing_time_ms,
        analysis_stages: StageAccounting {
            successful,
            total,
            degraded,
        },
        data_quality: inputs.data_quality,
    }
}

fn recommendations(
    overall: Sentiment,
    confidence: f64,
    risk: &RiskAssessment,
    degraded: &[String],
    quality: DataQuality,
    ai_summary: Option<String>,
) -> Vec<String> {
    let mut out = Vec::new();
    let strength = if confidence >= 0.6 {
        "strong"
    } else if confidence >= 0.3 {
        "moderate"
    } else {
        "weak"
    };
    out.push(match overall {
        Sentiment::Bullish => format!("{strength} bullish bias: consider scaling into positions"),
        Sentiment::Bearish => format!("{strength} bearish bias: consider reducing exposure"),
        Sentiment::Neutral => "no clear direction: hold and wait for confirmation".to_string(),
    });
    match risk.level {
        RiskLevel::High => out.push("risk is high: use tight stops and smaller sizes".to_string()),
        RiskLevel::Medium => out.push("risk is moderate: keep position sizing disciplined".to_string()),
        RiskLevel::Low => {}
    }
    if !degraded.is_empty() {
        out.push(format!(
            "partial analysis ({} unavailable): treat confidence as a lower bound",
            degraded.join(", ")
        ));
    }
    if quality.synthetic_news || quality.synthetic_prices {
        out.push("some inputs were estimated: verify with live market data".to_string());
    }
    if let Some(s) = ai_summary {
        out.push(format!("AI view: {s}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::{SentimentReport, StageKind};

    fn sentiment(signal: Sentiment, confidence: f64) -> StageResult {
        StageResult::Sentiment(SentimentReport {
            signal,
            confidence,
            degraded: false,
            score: 0.0,
            positive: 0,
            negative: 0,
            neutral: 0,
            drivers: vec![],
        })
    }

    fn weights() -> FusionWeights {
        FusionWeights::default()
    }

    #[test]
    fn tie_defaults_to_neutral() {
        assert_eq!(decide(1.0, 1.0, 0.0).0, Sentiment::Neutral);
        assert_eq!(decide(0.0, 0.0, 0.0), (Sentiment::Neutral, 0.0));
        let (s, share) = decide(3.0, 1.0, 0.0);
        assert_eq!(s, Sentiment::Bullish);
        assert!((share - 0.75).abs() < 1e-12);
    }

    #[test]
    fn confidence_scales_with_successful_stages() {
        let results = vec![
            sentiment(Sentiment::Bullish, 0.8),
            StageResult::neutral(StageKind::Market),
            StageResult::neutral(StageKind::Behavioral),
            StageResult::neutral(StageKind::Risk),
        ];
        let v = fuse(&results, &weights(), FusionInputs::default());
        assert_eq!(v.overall_sentiment, Sentiment::Bullish);
        // Only one stage voted, so its share is 1.0; 1 of 4 succeeded.
        assert!((v.confidence_score - 0.25).abs() < 1e-12);
        assert_eq!(v.analysis_stages.successful, 1);
        assert_eq!(v.analysis_stages.degraded, vec!["market", "behavioral", "risk"]);
        assert!(v
            .actionable_recommendations
            .iter()
            .any(|r| r.contains("partial analysis")));
    }

    #[test]
    fn everything_degraded_is_neutral_zero() {
        let results: Vec<StageResult> =
            StageKind::ALL.iter().map(|k| StageResult::neutral(*k)).collect();
        let v = fuse(&results, &weights(), FusionInputs::default());
        assert_eq!(v.overall_sentiment, Sentiment::Neutral);
        assert_eq!(v.confidence_score, 0.0);
        assert!(v.market_signals.is_empty());
    }
}
