//! # Invocation
//! Transport-independent, validated representation of one analysis request.
//!
//! Every adapter turns its raw `arguments` object into an [`Invocation`] via
//! [`Invocation::from_arguments`]. Defaults are applied first, validation
//! second; a failure is always a [`GatewayError::Validation`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::Duration;

use crate::error::GatewayError;

pub const MIN_NEWS_ITEMS: u32 = 5;
pub const MAX_NEWS_ITEMS: u32 = 50;
pub const DEFAULT_NEWS_ITEMS: u32 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Depth {
    Quick,
    Standard,
    Deep,
}

impl Depth {
    pub fn as_str(&self) -> &'static str {
        match self {
            Depth::Quick => "quick",
            Depth::Standard => "standard",
            Depth::Deep => "deep",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quick" => Some(Depth::Quick),
            "standard" => Some(Depth::Standard),
            "deep" => Some(Depth::Deep),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeRange {
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "6h")]
    SixHours,
    #[serde(rename = "12h")]
    TwelveHours,
    #[serde(rename = "24h")]
    OneDay,
}

impl TimeRange {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeRange::OneHour => "1h",
            TimeRange::SixHours => "6h",
            TimeRange::TwelveHours => "12h",
            TimeRange::OneDay => "24h",
        }
    }

    pub fn duration(&self) -> Duration {
        let hours = match self {
            TimeRange::OneHour => 1,
            TimeRange::SixHours => 6,
            TimeRange::TwelveHours => 12,
            TimeRange::OneDay => 24,
        };
        Duration::from_secs(hours * 3600)
    }

    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1h" => Some(TimeRange::OneHour),
            "6h" => Some(TimeRange::SixHours),
            "12h" => Some(TimeRange::TwelveHours),
            "24h" => Some(TimeRange::OneDay),
            _ => None,
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    query: String,
    depth: Depth,
    max_items: u32,
    time_range: TimeRange,
    include_prices: bool,
    focus_coins: Option<Vec<String>>,
    stream_updates: bool,
}

/// Raw wire shape of the tool arguments. Every field optional so that
/// defaults can be applied before validation.
#[derive(Debug, Default, Deserialize)]
struct RawArguments {
    query: Option<Value>,
    analysis_depth: Option<Value>,
    max_news_items: Option<Value>,
    time_range: Option<Value>,
    include_prices: Option<Value>,
    focus_coins: Option<Value>,
    stream_updates: Option<Value>,
}

impl Invocation {
    /// Parse tool `arguments` (missing/null means `{}`).
    pub fn from_arguments(args: &Value) -> Result<Self, GatewayError> {
        let raw: RawArguments = match args {
            Value::Null => RawArguments::default(),
            Value::Object(_) => serde_json::from_value(args.clone())
                .map_err(|e| GatewayError::Validation(e.to_string()))?,
            _ => {
                return Err(GatewayError::Validation(
                    "arguments must be an object".into(),
                ))
            }
        };

        let query = match raw.query {
            Some(Value::String(s)) => s.trim().to_string(),
            Some(Value::Null) | None => String::new(),
            Some(_) => return Err(GatewayError::Validation("query must be a string".into())),
        };
        if query.is_empty() {
            return Err(GatewayError::Validation("query is required".into()));
        }

        let depth = match non_null(raw.analysis_depth) {
            None => Depth::Standard,
            Some(Value::String(s)) => Depth::parse(&s).ok_or_else(|| {
                GatewayError::Validation(format!(
                    "analysis_depth must be one of quick|standard|deep, got '{s}'"
                ))
            })?,
            Some(_) => {
                return Err(GatewayError::Validation(
                    "analysis_depth must be a string".into(),
                ))
            }
        };

        let max_items = match non_null(raw.max_news_items) {
            None => DEFAULT_NEWS_ITEMS,
            Some(v) => {
                let n = v.as_i64().ok_or_else(|| {
                    GatewayError::Validation("max_news_items must be an integer".into())
                })?;
                if n < MIN_NEWS_ITEMS as i64 || n > MAX_NEWS_ITEMS as i64 {
                    return Err(GatewayError::Validation(format!(
                        "max_news_items must be within [{MIN_NEWS_ITEMS}, {MAX_NEWS_ITEMS}], got {n}"
                    )));
                }
                n as u32
            }
        };

        let time_range = match non_null(raw.time_range) {
            None => TimeRange::SixHours,
            Some(Value::String(s)) => TimeRange::parse(&s).ok_or_else(|| {
                GatewayError::Validation(format!(
                    "time_range must be one of 1h|6h|12h|24h, got '{s}'"
                ))
            })?,
            Some(_) => return Err(GatewayError::Validation("time_range must be a string".into())),
        };

        let include_prices = bool_field("include_prices", raw.include_prices, true)?;
        let stream_updates = bool_field("stream_updates", raw.stream_updates, false)?;

        let focus_coins = match non_null(raw.focus_coins) {
            None => None,
            Some(Value::Array(items)) => {
                let mut coins = Vec::with_capacity(items.len());
                for it in items {
                    let s = it.as_str().ok_or_else(|| {
                        GatewayError::Validation("focus_coins must be an array of strings".into())
                    })?;
                    let s = s.trim().to_ascii_uppercase();
                    if !s.is_empty() {
                        coins.push(s);
                    }
                }
                coins.sort();
                coins.dedup();
                if coins.is_empty() {
                    None
                } else {
                    Some(coins)
                }
            }
            Some(_) => {
                return Err(GatewayError::Validation(
                    "focus_coins must be an array of strings".into(),
                ))
            }
        };

        Ok(Self {
            query,
            depth,
            max_items,
            time_range,
            include_prices,
            focus_coins,
            stream_updates,
        })
    }

    pub fn query(&self) -> &str {
        &self.query
    }
    pub fn depth(&self) -> Depth {
        self.depth
    }
    pub fn max_items(&self) -> usize {
        self.max_items as usize
    }
    pub fn time_range(&self) -> TimeRange {
        self.time_range
    }
    pub fn include_prices(&self) -> bool {
        self.include_prices
    }
    /// Upper-cased, sorted, deduplicated.
    pub fn focus_coins(&self) -> Option<&[String]> {
        self.focus_coins.as_deref()
    }
    pub fn stream_updates(&self) -> bool {
        self.stream_updates
    }

    /// Deterministic hash of the normalized fields. `stream_updates` is a
    /// delivery concern and does not take part.
    pub fn fingerprint(&self) -> String {
        let coins = self
            .focus_coins
            .as_ref()
            .map(|c| c.join(","))
            .unwrap_or_default();
        let canonical = format!(
            "q={}|d={}|n={}|t={}|p={}|c={}",
            self.query.to_lowercase(),
            self.depth.as_str(),
            self.max_items,
            self.time_range.as_str(),
            self.include_prices,
            coins
        );
        let digest = Sha256::digest(canonical.as_bytes());
        let mut out = String::with_capacity(32);
        for b in digest.iter().take(16) {
            use std::fmt::Write as _;
            let _ = write!(&mut out, "{:02x}", b);
        }
        out
    }
}

fn non_null(v: Option<Value>) -> Option<Value> {
    v.filter(|v| !v.is_null())
}

fn bool_field(name: &str, v: Option<Value>, default: bool) -> Result<bool, GatewayError> {
    match non_null(v) {
        None => Ok(default),
        Some(Value::Bool(b)) => Ok(b),
        Some(_) => Err(GatewayError::Validation(format!("{name} must be a boolean"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_are_applied() {
        let inv = Invocation::from_arguments(&json!({ "query": "  bitcoin " })).unwrap();
        assert_eq!(inv.query(), "bitcoin");
        assert_eq!(inv.depth(), Depth::Standard);
        assert_eq!(inv.max_items(), 15);
        assert_eq!(inv.time_range(), TimeRange::SixHours);
        assert!(inv.include_prices());
        assert!(inv.focus_coins().is_none());
        assert!(!inv.stream_updates());
    }

    #[test]
    fn rejects_bad_values() {
        for args in [
            json!({}),
            json!({ "query": "" }),
            json!({ "query": 7 }),
            json!({ "query": "x", "analysis_depth": "extreme" }),
            json!({ "query": "x", "max_news_items": 4 }),
            json!({ "query": "x", "max_news_items": 51 }),
            json!({ "query": "x", "max_news_items": "ten" }),
            json!({ "query": "x", "time_range": "2d" }),
            json!({ "query": "x", "include_prices": "yes" }),
            json!({ "query": "x", "focus_coins": [1, 2] }),
            json!("just a string"),
        ] {
            let err = Invocation::from_arguments(&args).unwrap_err();
            assert!(matches!(err, GatewayError::Validation(_)), "{args}");
        }
    }

    #[test]
    fn fingerprint_normalizes_case_and_coin_order() {
        let a = Invocation::from_arguments(
            &json!({ "query": "Bitcoin ETF", "focus_coins": ["eth", "BTC"] }),
        )
        .unwrap();
        let b = Invocation::from_arguments(
            &json!({ "query": "bitcoin etf", "focus_coins": ["BTC", "ETH", "btc"], "stream_updates": true }),
        )
        .unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 32);

        let c = Invocation::from_arguments(&json!({ "query": "bitcoin etf", "time_range": "1h" }))
            .unwrap();
        assert_ne!(a.fingerprint(), c.fingerprint());
    }
}
