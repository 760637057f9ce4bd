//! The single tool this gateway exposes, and its declarative schema.

use serde_json::{json, Value};

use crate::invocation::{DEFAULT_NEWS_ITEMS, MAX_NEWS_ITEMS, MIN_NEWS_ITEMS};

pub const TOOL_NAME: &str = "analyze_crypto_sentiment";

pub const TOOL_DESCRIPTION: &str = "Analyze current crypto market sentiment from recent news \
and prices. Returns overall sentiment, confidence, market signals, behavioral insights, \
risk assessment and recommendations.";

pub fn input_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "query": {
                "type": "string",
                "description": "What to analyze, e.g. \"bitcoin ETF outlook\"."
            },
            "analysis_depth": {
                "type": "string",
                "enum": ["quick", "standard", "deep"],
                "default": "standard"
            },
            "max_news_items": {
                "type": "integer",
                "minimum": MIN_NEWS_ITEMS,
                "maximum": MAX_NEWS_ITEMS,
                "default": DEFAULT_NEWS_ITEMS
            },
            "time_range": {
                "type": "string",
                "enum": ["1h", "6h", "12h", "24h"],
                "default": "6h"
            },
            "include_prices": {
                "type": "boolean",
                "default": true
            },
            "focus_coins": {
                "type": "array",
                "items": { "type": "string" },
                "description": "Ticker symbols to price, e.g. [\"BTC\", \"ETH\"]."
            },
            "stream_updates": {
                "type": "boolean",
                "default": false,
                "description": "WebSocket only: emit progress notifications before the result."
            }
        },
        "required": ["query"]
    })
}

/// Entry for `tools/list` and `GET /tools`.
pub fn definition() -> Value {
    json!({
        "name": TOOL_NAME,
        "description": TOOL_DESCRIPTION,
        "inputSchema": input_schema(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_bounds_match_validation() {
        let s = input_schema();
        assert_eq!(s["properties"]["max_news_items"]["minimum"], 5);
        assert_eq!(s["properties"]["max_news_items"]["maximum"], 50);
        assert_eq!(s["required"], json!(["query"]));
        assert_eq!(definition()["name"], TOOL_NAME);
    }
}
