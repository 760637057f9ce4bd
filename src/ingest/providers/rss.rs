use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::histogram;
use quick_xml::de::from_str;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

use crate::ingest::types::{NewsCategory, NewsItem, NewsQuery, NewsSource};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}
#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}
#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    OffsetDateTime::parse(ts.trim(), &Rfc2822)
        .ok()
        .and_then(|dt| DateTime::<Utc>::from_timestamp(dt.unix_timestamp(), 0))
}

/// Generic RSS 2.0 feed (CoinDesk, Cointelegraph, ...).
pub struct RssProvider {
    name: String,
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http { url: String, client: reqwest::Client },
}

impl RssProvider {
    pub fn from_url(name: impl Into<String>, url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            name: name.into(),
            mode: Mode::Http {
                url: url.into(),
                client,
            },
        }
    }

    /// Serve a fixed XML document; used by tests and offline demos.
    pub fn from_fixture(name: impl Into<String>, xml: &str) -> Self {
        Self {
            name: name.into(),
            mode: Mode::Fixture(xml.to_string()),
        }
    }

    fn parse_items(&self, s: &str) -> Result<Vec<NewsItem>> {
        let t0 = std::time::Instant::now();
        let xml_clean = scrub_html_entities_for_xml(s);
        let rss: Rss = from_str(&xml_clean).with_context(|| format!("parsing {} rss xml", self.name))?;

        let mut out = Vec::with_capacity(rss.channel.item.len());
        for it in rss.channel.item {
            let title = crate::ingest::normalize_text(it.title.as_deref().unwrap_or_default());
            if title.is_empty() {
                continue;
            }
            let content =
                crate::ingest::normalize_text(it.description.as_deref().unwrap_or_default());
            // Undated items are treated as "now"; the window filter keeps them.
            let published_at = it
                .pub_date
                .as_deref()
                .and_then(parse_rfc2822)
                .unwrap_or_else(Utc::now);

            out.push(NewsItem {
                title,
                content,
                url: it.link.unwrap_or_default(),
                source: self.name.clone(),
                published_at,
                mentioned_coins: Vec::new(),
                category: NewsCategory::General,
                importance_score: 0.0,
                is_synthetic: false,
            });
        }

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("news_parse_ms").record(ms);
        Ok(out)
    }
}

#[async_trait]
impl NewsSource for RssProvider {
    async fn fetch(&self, query: &NewsQuery) -> Result<Vec<NewsItem>> {
        let items = match &self.mode {
            Mode::Fixture(s) => self.parse_items(s)?,
            Mode::Http { url, client } => {
                let resp = client
                    .get(url.as_str())
                    .send()
                    .await
                    .with_context(|| format!("{} http get()", self.name))?
                    .error_for_status()
                    .with_context(|| format!("{} http status", self.name))?;
                let body = resp
                    .text()
                    .await
                    .with_context(|| format!("{} http .text()", self.name))?;
                self.parse_items(&body)?
            }
        };
        Ok(query.trim(items, Utc::now()))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}
