// src/lib.rs
// Public library surface for both binaries and the integration tests.

pub mod ai_adapter;
pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod fanout;
pub mod fusion;
pub mod ingest;
pub mod invocation;
pub mod metrics;
pub mod orchestrator;
pub mod prices;
pub mod progress;
pub mod protocol;
pub mod stages;
pub mod telemetry;
pub mod verdict;

pub use crate::api::{router, AppState};
pub use crate::error::GatewayError;
pub use crate::orchestrator::Orchestrator;
pub use crate::protocol::ToolDispatcher;
pub use crate::verdict::Verdict;

use std::sync::Arc;
use std::time::Duration;

use shuttle_axum::axum::Router;
use tracing::info;

use crate::api::connections::ConnectionRegistry;
use crate::cache::CacheTier;
use crate::config::ai::{AiConfig, DEFAULT_AI_CONFIG_PATH};
use crate::config::GatewayConfig;

/// Cache tier (plus its health probe) and orchestrator from config.
/// Must run inside a Tokio runtime.
pub fn build_dispatcher(cfg: &GatewayConfig) -> ToolDispatcher {
    let cache = Arc::new(CacheTier::from_config(&cfg.cache));
    if let Some(_probe) = cache.spawn_probe(Duration::from_secs(cfg.cache.probe_interval_secs)) {
        info!("durable cache probe running");
    }

    let ai_cfg = AiConfig::load_or_default(DEFAULT_AI_CONFIG_PATH);
    let ai = ai_adapter::build_client_from_config(&ai_cfg);
    let orchestrator = Orchestrator::from_config(cfg, cache, ai);
    info!(
        stages = ?orchestrator.stage_names(),
        news = ?orchestrator.news_sources(),
        prices = ?orchestrator.price_sources(),
        "orchestrator ready"
    );
    ToolDispatcher::new(Arc::new(orchestrator))
}

/// Full HTTP application: metrics recorder, dispatcher, WebSocket registry
/// with its heartbeat, and the router.
pub fn app(cfg: &GatewayConfig) -> Router {
    let _ = crate::metrics::Metrics::install();

    let connections = Arc::new(ConnectionRegistry::new());
    let dispatcher =
        build_dispatcher(cfg).with_observer(api::ws::verdict_broadcaster(connections.clone()));
    let _heartbeat = connections.spawn_heartbeat(
        Duration::from_secs(cfg.server.heartbeat_interval_secs.max(1)),
        Duration::from_secs(cfg.server.stale_after_secs),
    );

    router(AppState::new(dispatcher, connections))
}
