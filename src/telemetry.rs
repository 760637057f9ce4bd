//! Tracing setup shared by both binaries.
//!
//! The stream adapter owns stdout for protocol frames, so it logs to stderr.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    Stdout,
    Stderr,
}

const DEFAULT_FILTER: &str = "crypto_sentiment_gateway=info,warn";

/// Install the global subscriber. Safe to call twice; the second call is a no-op.
pub fn init(target: LogTarget) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let json = std::env::var("GATEWAY_LOG_JSON")
        .ok()
        .is_some_and(|v| v == "1");

    let registry = tracing_subscriber::registry().with(filter);
    let res = match (target, json) {
        (LogTarget::Stdout, false) => registry.with(fmt::layer().compact()).try_init(),
        (LogTarget::Stdout, true) => registry.with(fmt::layer().json()).try_init(),
        (LogTarget::Stderr, false) => registry
            .with(fmt::layer().compact().with_writer(std::io::stderr).with_ansi(false))
            .try_init(),
        (LogTarget::Stderr, true) => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
