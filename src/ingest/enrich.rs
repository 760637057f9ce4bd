//! Derived fields for news items: mentioned coins, category, importance.
//!
//! These are cheap keyword heuristics; downstream stages treat them as hints.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::ingest::source_weights::SourceWeights;
use crate::ingest::types::{NewsCategory, NewsItem};

/// (symbol, names that count as a mention)
const COINS: &[(&str, &[&str])] = &[
    ("BTC", &["bitcoin", "btc"]),
    ("ETH", &["ethereum", "ether", "eth"]),
    ("SOL", &["solana", "sol"]),
    ("XRP", &["ripple", "xrp"]),
    ("ADA", &["cardano", "ada"]),
    ("DOGE", &["dogecoin", "doge"]),
    ("BNB", &["binance coin", "bnb"]),
    ("AVAX", &["avalanche", "avax"]),
    ("DOT", &["polkadot"]),
    ("MATIC", &["polygon", "matic"]),
    ("LINK", &["chainlink"]),
    ("LTC", &["litecoin", "ltc"]),
];

static COIN_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    COINS
        .iter()
        .filter_map(|(sym, names)| {
            let alts = names
                .iter()
                .map(|n| regex::escape(n))
                .collect::<Vec<_>>()
                .join("|");
            Regex::new(&format!(r"(?i)(?:\b|\$)(?:{alts})\b"))
                .ok()
                .map(|re| (*sym, re))
        })
        .collect()
});

pub fn extract_coins(text: &str) -> Vec<String> {
    COIN_PATTERNS
        .iter()
        .filter(|(_, re)| re.is_match(text))
        .map(|(sym, _)| sym.to_string())
        .collect()
}

const CATEGORY_KEYWORDS: &[(NewsCategory, &[&str])] = &[
    (
        NewsCategory::Security,
        &["hack", "exploit", "breach", "stolen", "scam", "phishing", "vulnerability"],
    ),
    (
        NewsCategory::Regulation,
        &["sec", "regulat", "lawsuit", "court", "ban", "compliance", "cftc", "senate", "law"],
    ),
    (
        NewsCategory::Adoption,
        &["etf", "adopt", "partnership", "integrat", "institutional", "treasury", "launch"],
    ),
    (
        NewsCategory::Technology,
        &["upgrade", "fork", "protocol", "layer 2", "mainnet", "testnet", "developer"],
    ),
    (
        NewsCategory::Market,
        &["price", "rally", "surge", "plunge", "crash", "market", "trading", "bull", "bear"],
    ),
];

pub fn classify(text: &str) -> NewsCategory {
    let lower = text.to_lowercase();
    CATEGORY_KEYWORDS
        .iter()
        .find(|(_, kws)| kws.iter().any(|k| lower.contains(k)))
        .map(|(c, _)| *c)
        .unwrap_or(NewsCategory::General)
}

const URGENT: &[&str] = &[
    "breaking", "urgent", "just in", "record", "all-time high", "crash", "hack", "sec", "etf",
    "billion",
];

/// Blend of outlet credibility (60%), urgency keywords (25%) and coin coverage (15%).
pub fn importance(source: &str, text: &str, coins: &[String], weights: &SourceWeights) -> f64 {
    let lower = text.to_lowercase();
    let urgent_hits = URGENT.iter().filter(|k| lower.contains(*k)).count() as f64;
    let urgency = (urgent_hits / 3.0).min(1.0);
    let coverage = (coins.len() as f64 / 3.0).min(1.0);
    (0.60 * weights.weight_for(source) + 0.25 * urgency + 0.15 * coverage).clamp(0.0, 1.0)
}

/// Fill the derived fields of an item coming from a real source.
pub fn annotate(item: &mut NewsItem, weights: &SourceWeights) {
    let text = format!("{} {}", item.title, item.content);
    item.mentioned_coins = extract_coins(&text);
    item.category = classify(&text);
    item.importance_score = importance(&item.source, &text, &item.mentioned_coins, weights);
}

/// Linear decay over the requested window; 1.0 for items from "now".
pub fn recency(published_at: DateTime<Utc>, now: DateTime<Utc>, window_secs: u64) -> f64 {
    if window_secs == 0 {
        return 0.0;
    }
    let age = (now - published_at).num_seconds().max(0) as f64;
    (1.0 - age / window_secs as f64).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coins_by_symbol_and_name() {
        let coins = extract_coins("Bitcoin and $ETH rally while Solana stalls; bnb flat");
        assert_eq!(coins, vec!["BTC", "ETH", "SOL", "BNB"]);
        assert!(extract_coins("nothing here, adamant soldier").is_empty());
    }

    #[test]
    fn categories() {
        assert_eq!(classify("Exchange hack drains wallets"), NewsCategory::Security);
        assert_eq!(classify("SEC delays decision"), NewsCategory::Regulation);
        assert_eq!(classify("BTC price surges"), NewsCategory::Market);
        assert_eq!(classify("Weekly roundup"), NewsCategory::General);
    }

    #[test]
    fn importance_is_bounded_and_rewards_credibility() {
        let w = SourceWeights::default_seed();
        let coins = vec!["BTC".to_string()];
        let hi = importance("Reuters", "Breaking: record ETF inflows", &coins, &w);
        let lo = importance("some blog", "quiet day", &[], &w);
        assert!(hi > lo);
        assert!((0.0..=1.0).contains(&hi));
        assert!((0.0..=1.0).contains(&lo));
    }
}
