//! CoinGecko (primary) and CoinCap (secondary) clients.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;

use crate::prices::types::{asset_id, symbol_for, PriceQuote, PriceSource};

fn ids_for(symbols: &[String]) -> Vec<&'static str> {
    symbols.iter().filter_map(|s| asset_id(s)).collect()
}

pub struct CoinGecko {
    base: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct GeckoQuote {
    usd: f64,
    #[serde(default)]
    usd_market_cap: Option<f64>,
    #[serde(default)]
    usd_24h_vol: Option<f64>,
    #[serde(default)]
    usd_24h_change: Option<f64>,
    #[serde(default)]
    last_updated_at: Option<i64>,
}

impl CoinGecko {
    pub fn new(base: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base: base.into(),
            client,
        }
    }

    pub(crate) fn parse(body: &str) -> Result<Vec<PriceQuote>> {
        let map: HashMap<String, GeckoQuote> =
            serde_json::from_str(body).context("parsing coingecko json")?;
        let mut out: Vec<PriceQuote> = map
            .into_iter()
            .filter_map(|(id, q)| {
                let symbol = symbol_for(&id)?;
                Some(PriceQuote {
                    symbol: symbol.to_string(),
                    current: q.usd,
                    change_24h: q.usd_24h_change.unwrap_or(0.0),
                    market_cap: q.usd_market_cap,
                    volume_24h: q.usd_24h_vol,
                    last_updated: q
                        .last_updated_at
                        .and_then(|t| DateTime::<Utc>::from_timestamp(t, 0))
                        .unwrap_or_else(Utc::now),
                    is_synthetic: false,
                })
            })
            .collect();
        out.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Ok(out)
    }
}

#[async_trait]
impl PriceSource for CoinGecko {
    async fn fetch(&self, symbols: &[String]) -> Result<Vec<PriceQuote>> {
        let ids = ids_for(symbols);
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!(
            "{}/simple/price?ids={}&vs_currencies=usd&include_market_cap=true&include_24hr_vol=true&include_24hr_change=true&include_last_updated_at=true",
            self.base.trim_end_matches('/'),
            ids.join(",")
        );
        let body = self
            .client
            .get(url)
            .send()
            .await
            .context("coingecko http get()")?
            .error_for_status()
            .context("coingecko http status")?
            .text()
            .await
            .context("coingecko http .text()")?;
        Self::parse(&body)
    }

    fn name(&self) -> &str {
        "coingecko"
    }
}

pub struct CoinCap {
    base: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct CapEnvelope {
    data: Vec<CapAsset>,
    #[serde(default)]
    timestamp: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CapAsset {
    symbol: String,
    price_usd: Option<String>,
    change_percent24_hr: Option<String>,
    market_cap_usd: Option<String>,
    volume_usd24_hr: Option<String>,
}

fn num(s: &Option<String>) -> Option<f64> {
    s.as_deref().and_then(|v| v.parse::<f64>().ok())
}

impl CoinCap {
    pub fn new(base: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base: base.into(),
            client,
        }
    }

    /// CoinCap reports numbers as strings; assets without a price are skipped.
    pub(crate) fn parse(body: &str) -> Result<Vec<PriceQuote>> {
        let env: CapEnvelope = serde_json::from_str(body).context("parsing coincap json")?;
        let ts = env
            .timestamp
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .unwrap_or_else(Utc::now);
        Ok(env
            .data
            .into_iter()
            .filter_map(|a| {
                Some(PriceQuote {
                    current: num(&a.price_usd)?,
                    change_24h: num(&a.change_percent24_hr).unwrap_or(0.0),
                    market_cap: num(&a.market_cap_usd),
                    volume_24h: num(&a.volume_usd24_hr),
                    symbol: a.symbol.to_uppercase(),
                    last_updated: ts,
                    is_synthetic: false,
                })
            })
            .collect())
    }
}

#[async_trait]
impl PriceSource for CoinCap {
    async fn fetch(&self, symbols: &[String]) -> Result<Vec<PriceQuote>> {
        let ids = ids_for(symbols);
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/assets?ids={}", self.base.trim_end_matches('/'), ids.join(","));
        let body = self
            .client
            .get(url)
            .send()
            .await
            .context("coincap http get()")?
            .error_for_status()
            .context("coincap http status")?
            .text()
            .await
            .context("coincap http .text()")?;
        Self::parse(&body)
    }

    fn name(&self) -> &str {
        "coincap"
    }
}
