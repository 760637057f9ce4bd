//! Line-oriented JSON-RPC over stdin/stdout. Stdout carries protocol frames
//! only; logs go to stderr.

use crypto_sentiment_gateway::config::GatewayConfig;
use crypto_sentiment_gateway::protocol::stream::run_stream;
use crypto_sentiment_gateway::telemetry::{self, LogTarget};
use tokio::io::{stdin, stdout, BufReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    telemetry::init(LogTarget::Stderr);

    let cfg = GatewayConfig::load()?;
    let dispatcher = crypto_sentiment_gateway::build_dispatcher(&cfg);
    tracing::info!("stdio gateway ready");

    run_stream(&dispatcher, BufReader::new(stdin()), stdout()).await
}
