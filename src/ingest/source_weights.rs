//! # Source Weights
//!
//! Maps news outlets (e.g. "CoinDesk", "The Block") to a credibility weight
//! in `[0.0, 1.0]` that feeds each item's importance score.
//!
//! - Loads from JSON (weights + aliases), falls back to a built-in seed.
//! - Case-insensitive lookup with punctuation normalization.
//! - Fallback order: aliases → exact match → substring match → default.

use serde::Deserialize;
use std::{collections::HashMap, fs, path::Path};

#[derive(Debug, Clone, Deserialize)]
pub struct SourceWeights {
    #[serde(default = "default_default_weight")]
    pub default_weight: f64,
    #[serde(default)]
    pub weights: HashMap<String, f64>,
    #[serde(default)]
    pub aliases: HashMap<String, String>,
}

fn default_default_weight() -> f64 {
    0.55
}

impl Default for SourceWeights {
    fn default() -> Self {
        Self::default_seed()
    }
}

impl SourceWeights {
    /// Load from a JSON file; falls back to `default_seed()` on error.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(path) {
            Ok(s) => match serde_json::from_str::<SourceWeights>(&s) {
                Ok(mut cfg) => {
                    cfg.weights = cfg
                        .weights
                        .into_iter()
                        .map(|(k, v)| (normalize(&k), v))
                        .collect();
                    cfg.aliases = cfg
                        .aliases
                        .into_iter()
                        .map(|(k, v)| (normalize(&k), normalize(&v)))
                        .collect();
                    cfg
                }
                Err(e) => {
                    tracing::warn!(error = %e, "invalid source weights; using seed");
                    Self::default_seed()
                }
            },
            Err(_) => Self::default_seed(),
        }
    }

    pub fn weight_for(&self, source: &str) -> f64 {
        let s = normalize(source);

        if let Some(canon) = self.aliases.get(&s) {
            if let Some(&w) = self.weights.get(canon) {
                return w.clamp(0.0, 1.0);
            }
        }

        if let Some(&w) = self.weights.get(&s) {
            return w.clamp(0.0, 1.0);
        }

        // Longest key first so "bitcoin magazine" beats "bitcoin".
        let mut best: Option<(&str, f64)> = None;
        for (k, &w) in &self.weights {
            if s.contains(k.as_str()) && best.map_or(true, |(bk, _)| k.len() > bk.len()) {
                best = Some((k.as_str(), w));
            }
        }
        if let Some((_, w)) = best {
            return w.clamp(0.0, 1.0);
        }

        self.default_weight.clamp(0.0, 1.0)
    }

    pub(crate) fn default_seed() -> Self {
        let mut weights = HashMap::new();
        let mut aliases = HashMap::new();

        for (k, v) in [
            ("reuters", 0.95),
            ("bloomberg", 0.95),
            ("coindesk", 0.90),
            ("the block", 0.88),
            ("cointelegraph", 0.82),
            ("decrypt", 0.80),
            ("bitcoin magazine", 0.78),
            ("cryptoslate", 0.72),
            ("bitcoinist", 0.65),
            ("newsbtc", 0.62),
            ("u today", 0.60),
            ("cryptocompare", 0.70),
        ] {
            weights.insert(k.to_string(), v);
        }

        for (a, c) in [
            ("theblock", "the block"),
            ("theblockco", "the block"),
            ("coin telegraph", "cointelegraph"),
            ("btc magazine", "bitcoin magazine"),
            ("utoday", "u today"),
        ] {
            aliases.insert(a.to_string(), c.to_string());
        }

        Self {
            default_weight: default_default_weight(),
            weights,
            aliases,
        }
    }
}

fn normalize(s: &str) -> String {
    let lowered = s.trim().to_lowercase();
    let mut out = String::with_capacity(lowered.len());
    let mut prev_space = false;
    for ch in lowered.chars() {
        let c = if ch.is_alphanumeric() { ch } else { ' ' };
        if c == ' ' {
            if !prev_space && !out.is_empty() {
                out.push(' ');
            }
            prev_space = true;
        } else {
            out.push(c);
            prev_space = false;
        }
    }
    out.trim_end().to_string()
}
