// src/config/mod.rs
//! Gateway configuration loaded from TOML with environment overrides.
//!
//! Lookup order:
//! 1) $GATEWAY_CONFIG_PATH
//! 2) config/gateway.toml
//! 3) built-in defaults
//!
//! A missing file is not an error; a file that exists but does not parse is.

pub mod ai;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_CONFIG_PATH: &str = "GATEWAY_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/gateway.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub server: ServerConfig,
    pub cache: CacheConfig,
    pub fetch: FetchConfig,
    pub stages: StagesConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub heartbeat_interval_secs: u64,
    /// A WebSocket client silent for longer than this is dropped.
    pub stale_after_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 30,
            stale_after_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Durable tier; `None` runs on the fast tier only.
    pub redis_url: Option<String>,
    pub news_ttl_secs: u64,
    pub prices_ttl_secs: u64,
    pub analysis_ttl_secs: u64,
    pub fast_max_entries: usize,
    /// Sweep expired fast-tier entries every N writes.
    pub cleanup_every_writes: u64,
    pub probe_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            news_ttl_secs: 300,
            prices_ttl_secs: 60,
            analysis_ttl_secs: 600,
            fast_max_entries: 1_000,
            cleanup_every_writes: 100,
            probe_interval_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub news_timeout_ms: u64,
    pub price_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub synthetic_news_fallback: bool,
    /// Outlet credibility JSON; the built-in seed is used if it is missing.
    pub source_weights_path: String,
    pub rss_feeds: Vec<FeedConfig>,
    pub cryptocompare_url: Option<String>,
    pub coingecko_url: String,
    pub coincap_url: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            news_timeout_ms: 8_000,
            price_timeout_ms: 5_000,
            request_timeout_ms: 6_000,
            synthetic_news_fallback: false,
            source_weights_path: "config/source_weights.json".into(),
            rss_feeds: vec![
                FeedConfig {
                    name: "CoinDesk".into(),
                    url: "https://www.coindesk.com/arc/outboundfeeds/rss/".into(),
                },
                FeedConfig {
                    name: "Cointelegraph".into(),
                    url: "https://cointelegraph.com/rss".into(),
                },
            ],
            cryptocompare_url: Some(
                "https://min-api.cryptocompare.com/data/v2/news/?lang=EN".into(),
            ),
            coingecko_url: "https://api.coingecko.com/api/v3".into(),
            coincap_url: "https://api.coincap.io/v2".into(),
        }
    }
}

impl FetchConfig {
    pub fn news_timeout(&self) -> Duration {
        Duration::from_millis(self.news_timeout_ms)
    }

    pub fn price_timeout(&self) -> Duration {
        Duration::from_millis(self.price_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StagesConfig {
    pub timeout_ms: u64,
    pub weights: FusionWeights,
}

impl Default for StagesConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 20_000,
            weights: FusionWeights::default(),
        }
    }
}

/// Per-stage importance used by fusion (`confidence × importance`).
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct FusionWeights {
    pub sentiment: f64,
    pub market: f64,
    pub behavioral: f64,
    pub risk: f64,
    pub ai: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            sentiment: 1.0,
            market: 0.9,
            behavioral: 0.7,
            risk: 0.6,
            ai: 0.8,
        }
    }
}

impl GatewayConfig {
    /// Load from an explicit TOML file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading gateway config from {}", path.display()))?;
        let cfg: GatewayConfig = toml::from_str(&content)
            .with_context(|| format!("parsing gateway config {}", path.display()))?;
        Ok(cfg)
    }

    /// Env path, then default path, then defaults; env overrides applied last.
    pub fn load() -> Result<Self> {
        let mut cfg = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("GATEWAY_CONFIG_PATH points to non-existent path"));
            }
            Self::load_from(&pb)?
        } else {
            let default = PathBuf::from(DEFAULT_CONFIG_PATH);
            if default.exists() {
                Self::load_from(&default)?
            } else {
                Self::default()
            }
        };
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("REDIS_URL") {
            let url = url.trim();
            self.cache.redis_url = if url.is_empty() {
                None
            } else {
                Some(url.to_string())
            };
        }
        if let Some(ms) = env_u64("GATEWAY_NEWS_TIMEOUT_MS") {
            self.fetch.news_timeout_ms = ms;
        }
        if let Some(ms) = env_u64("GATEWAY_PRICE_TIMEOUT_MS") {
            self.fetch.price_timeout_ms = ms;
        }
        if let Ok(v) = std::env::var("GATEWAY_SYNTHETIC_NEWS") {
            self.fetch.synthetic_news_fallback = matches!(v.trim(), "1" | "true" | "yes");
        }
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: GatewayConfig = toml::from_str(
            r#"
            [cache]
            analysis_ttl_secs = 42

            [stages.weights]
            ai = 0.5
            "#,
        )
        .unwrap();
        assert_eq!(cfg.cache.analysis_ttl_secs, 42);
        assert_eq!(cfg.cache.news_ttl_secs, 300);
        assert_eq!(cfg.stages.weights.ai, 0.5);
        assert_eq!(cfg.stages.weights.sentiment, 1.0);
        assert!(cfg.fetch.price_timeout_ms < cfg.fetch.news_timeout_ms);
    }

    #[serial_test::serial]
    #[test]
    fn env_path_and_overrides_win() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("gateway.toml");
        fs::write(&p, "[fetch]\nnews_timeout_ms = 1234\n").unwrap();

        env::set_var(ENV_CONFIG_PATH, p.display().to_string());
        env::set_var("GATEWAY_PRICE_TIMEOUT_MS", "777");
        env::set_var("REDIS_URL", "");
        let cfg = GatewayConfig::load().unwrap();
        env::remove_var(ENV_CONFIG_PATH);
        env::remove_var("GATEWAY_PRICE_TIMEOUT_MS");
        env::remove_var("REDIS_URL");

        assert_eq!(cfg.fetch.news_timeout_ms, 1234);
        assert_eq!(cfg.fetch.price_timeout_ms, 777);
        assert!(cfg.cache.redis_url.is_none());
    }

    #[serial_test::serial]
    #[test]
    fn missing_env_path_is_an_error() {
        env::set_var(ENV_CONFIG_PATH, "/definitely/not/here.toml");
        let res = GatewayConfig::load();
        env::remove_var(ENV_CONFIG_PATH);
        assert!(res.is_err());
    }
}
