use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::ingest::types::{NewsCategory, NewsItem, NewsQuery, NewsSource};

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "Data", default)]
    data: Vec<Article>,
}

#[derive(Debug, Deserialize)]
struct Article {
    title: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    url: String,
    published_on: i64,
    #[serde(default)]
    source_info: Option<SourceInfo>,
    #[serde(default)]
    source: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SourceInfo {
    name: String,
}

/// CryptoCompare news API (JSON). Reports each article under its outlet name.
pub struct CryptoCompareProvider {
    url: String,
    client: reqwest::Client,
}

impl CryptoCompareProvider {
    pub fn new(url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            url: url.into(),
            client,
        }
    }

    pub(crate) fn parse(body: &str) -> Result<Vec<NewsItem>> {
        let env: Envelope = serde_json::from_str(body).context("parsing cryptocompare json")?;
        let out = env
            .data
            .into_iter()
            .filter_map(|a| {
                let title = crate::ingest::normalize_text(&a.title);
                if title.is_empty() {
                    return None;
                }
                let source = a
                    .source_info
                    .map(|s| s.name)
                    .or(a.source)
                    .unwrap_or_else(|| "CryptoCompare".to_string());
                Some(NewsItem {
                    title,
                    content: crate::ingest::normalize_text(&a.body),
                    url: a.url,
                    source,
                    published_at: DateTime::<Utc>::from_timestamp(a.published_on, 0)
                        .unwrap_or_else(Utc::now),
                    mentioned_coins: Vec::new(),
                    category: NewsCategory::General,
                    importance_score: 0.0,
                    is_synthetic: false,
                })
            })
            .collect();
        Ok(out)
    }
}

#[async_trait]
impl NewsSource for CryptoCompareProvider {
    async fn fetch(&self, query: &NewsQuery) -> Result<Vec<NewsItem>> {
        let body = self
            .client
            .get(self.url.as_str())
            .send()
            .await
            .context("cryptocompare http get()")?
            .error_for_status()
            .context("cryptocompare http status")?
            .text()
            .await
            .context("cryptocompare http .text()")?;
        Ok(query.trim(Self::parse(&body)?, Utc::now()))
    }

    fn name(&self) -> &str {
        "CryptoCompare"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_articles_with_outlet_names() {
        let body = r#"{"Type":100,"Data":[
            {"title":"ETH gas fees drop","body":"Fees fell.","url":"https://a","published_on":1700000000,"source_info":{"name":"Decrypt"}},
            {"title":"  ","body":"","url":"https://b","published_on":1700000000},
            {"title":"SOL update","url":"https://c","published_on":1700000100,"source":"bitcoinist"}
        ]}"#;
        let items = CryptoCompareProvider::parse(body).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].source, "Decrypt");
        assert_eq!(items[1].source, "bitcoinist");
        assert_eq!(items[1].published_at.timestamp(), 1_700_000_100);
    }
}
