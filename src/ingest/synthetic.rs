//! Fixed-template news used when every real source failed and the synthetic
//! fallback is enabled. Items are flagged `is_synthetic` and spread evenly
//! across the requested window so recency ranking stays meaningful.

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use crate::ingest::enrich;
use crate::ingest::types::{NewsCategory, NewsItem};
use crate::invocation::TimeRange;

pub const SYNTHETIC_SOURCE: &str = "synthetic";

const TEMPLATES: &[(&str, &str, NewsCategory)] = &[
    (
        "Bitcoin holds range as traders await macro data",
        "Bitcoin traded sideways with muted volume while desks positioned ahead of inflation figures.",
        NewsCategory::Market,
    ),
    (
        "Ethereum developers confirm next network upgrade timeline",
        "Core developers agreed on a testnet schedule for the upcoming Ethereum protocol upgrade.",
        NewsCategory::Technology,
    ),
    (
        "Spot crypto ETF flows turn mixed",
        "Institutional ETF products saw modest inflows for Bitcoin and small outflows for Ethereum.",
        NewsCategory::Adoption,
    ),
    (
        "Regulators publish updated guidance for digital asset custody",
        "New compliance guidance clarifies custody expectations for exchanges and brokers.",
        NewsCategory::Regulation,
    ),
    (
        "Solana network activity climbs to monthly high",
        "On-chain activity on Solana rose as decentralized exchange volume picked up.",
        NewsCategory::Market,
    ),
    (
        "Security researchers flag phishing campaign targeting wallet users",
        "A phishing campaign impersonating popular wallets was reported; no protocol exploit was involved.",
        NewsCategory::Security,
    ),
];

pub fn generate(time_range: TimeRange, count: usize, now: DateTime<Utc>) -> Vec<NewsItem> {
    let n = count.min(TEMPLATES.len());
    let window = time_range.duration().as_secs() as i64;
    let step = if n == 0 { 0 } else { window / (n as i64 + 1) };

    TEMPLATES
        .iter()
        .take(n)
        .enumerate()
        .map(|(i, (title, content, category))| {
            let text = format!("{title} {content}");
            NewsItem {
                title: title.to_string(),
                content: content.to_string(),
                url: format!("about:synthetic/{i}"),
                source: SYNTHETIC_SOURCE.to_string(),
                published_at: now - ChronoDuration::seconds(step * (i as i64 + 1)),
                mentioned_coins: enrich::extract_coins(&text),
                category: *category,
                importance_score: 0.3,
                is_synthetic: true,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_items_stay_inside_window_and_are_flagged() {
        let now = Utc::now();
        let items = generate(TimeRange::OneHour, 50, now);
        assert_eq!(items.len(), TEMPLATES.len());
        for it in &items {
            assert!(it.is_synthetic);
            assert!(now - it.published_at < ChronoDuration::hours(1));
        }
        assert!(items[0].mentioned_coins.contains(&"BTC".to_string()));
    }
}
