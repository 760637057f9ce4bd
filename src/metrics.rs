use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

static HANDLE: OnceCell<Option<PrometheusHandle>> = OnceCell::new();

pub struct Metrics;

impl Metrics {
    /// Install the Prometheus recorder once per process.
    ///
    /// Returns `None` if another recorder was installed first (e.g. in tests).
    pub fn install() -> Option<PrometheusHandle> {
        HANDLE
            .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
                Ok(handle) => {
                    describe_all();
                    Some(handle)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "prometheus recorder not installed");
                    None
                }
            })
            .clone()
    }

    /// Prometheus exposition text, or empty when no recorder is installed.
    pub fn render() -> String {
        HANDLE
            .get()
            .and_then(|h| h.as_ref())
            .map(|h| h.render())
            .unwrap_or_default()
    }
}

fn describe_all() {
    describe_counter!(
        "gateway_requests_total",
        "Tool invocations received, labelled by transport."
    );
    describe_counter!("analysis_cache_hits_total", "Verdicts served from cache.");
    describe_counter!(
        "analysis_cache_misses_total",
        "Invocations that had to run the full pipeline."
    );
    describe_counter!(
        "analysis_terminal_total",
        "Invocations that ended with zero news items."
    );
    describe_histogram!("analysis_duration_ms", "End-to-end pipeline time in milliseconds.");
    describe_histogram!("news_parse_ms", "RSS feed parse time in milliseconds.");
    describe_counter!(
        "cache_durable_errors_total",
        "Durable tier errors that flipped the tier to degraded."
    );
    describe_counter!(
        "cache_fast_evictions_total",
        "Fast tier entries removed by cleanup."
    );
    describe_counter!(
        "fetch_fallback_total",
        "Fetches that used synthetic data, labelled by kind."
    );
    describe_counter!(
        "fetch_source_errors_total",
        "Individual source failures, labelled by kind."
    );
    describe_counter!(
        "stage_degraded_total",
        "Stage runs that produced a degraded result."
    );
    describe_gauge!("ws_connections", "Open WebSocket connections.");
    describe_counter!(
        "ws_stale_disconnects_total",
        "WebSocket connections terminated by the heartbeat."
    );
}
