//! Crypto Sentiment Gateway: HTTP entrypoint.
//! Serves REST, JSON-RPC over HTTP and WebSocket on one Axum router.
//!
//! The stdio transport lives in `src/bin/stdio_gateway.rs`.

use crypto_sentiment_gateway::config::GatewayConfig;
use crypto_sentiment_gateway::telemetry::{self, LogTarget};
use shuttle_axum::ShuttleAxum;

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    telemetry::init(LogTarget::Stdout);

    let cfg = GatewayConfig::load()?;
    tracing::info!(
        durable_cache = cfg.cache.redis_url.is_some(),
        synthetic_news = cfg.fetch.synthetic_news_fallback,
        "gateway starting"
    );
    let router = crypto_sentiment_gateway::app(&cfg);

    Ok(router.into())
}
