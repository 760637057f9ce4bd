// tests/metrics.rs
//
// Metric emission checked with a thread-local DebuggingRecorder. Each test
// drives the pipeline on a current-thread runtime so every task records
// into the same local recorder.

mod common;

use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use serde_json::json;
use std::sync::Arc;

use common::*;
use crypto_sentiment_gateway::ingest::types::NewsSource;
use crypto_sentiment_gateway::invocation::Invocation;
use crypto_sentiment_gateway::prices::types::PriceSource;
use crypto_sentiment_gateway::progress::ProgressReporter;
use crypto_sentiment_gateway::protocol::Transport;

fn counter(snap: &Snapshotter, name: &str, label: Option<(&str, &str)>) -> u64 {
    snap.snapshot()
        .into_vec()
        .into_iter()
        .filter(|(k, _, _, _)| k.key().name() == name)
        .filter(|(k, _, _, _)| match label {
            Some((lk, lv)) => k.key().labels().any(|l| l.key() == lk && l.value() == lv),
            None => true,
        })
        .map(|(_, _, _, v)| match v {
            DebugValue::Counter(n) => n,
            _ => 0,
        })
        .sum()
}

fn run<F: std::future::Future<Output = ()>>(recorder: &DebuggingRecorder, fut: F) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    metrics::with_local_recorder(recorder, || rt.block_on(fut));
}

#[test]
fn terminal_path_counts_miss_terminal_and_source_errors() {
    let recorder = DebuggingRecorder::new();
    let snap = recorder.snapshotter();

    run(&recorder, async {
        let orch = orchestrator_with(
            vec![Arc::new(FailingNews) as Arc<dyn NewsSource>],
            vec![Arc::new(HangingPrices) as Arc<dyn PriceSource>],
        );
        let inv = Invocation::from_arguments(&json!({"query": "latest", "include_prices": false}))
            .unwrap();
        orch.execute(&inv, &ProgressReporter::disabled()).await;
    });

    assert_eq!(counter(&snap, "analysis_cache_misses_total", None), 1);
    assert_eq!(counter(&snap, "analysis_terminal_total", None), 1);
    assert!(counter(&snap, "fetch_source_errors_total", Some(("kind", "news"))) >= 1);
}

#[test]
fn requests_are_counted_per_transport_and_hits_recorded() {
    let recorder = DebuggingRecorder::new();
    let snap = recorder.snapshotter();

    run(&recorder, async {
        let (_src, orch) = bullish_orchestrator();
        let d = dispatcher(orch);
        let args = json!({"query": "btc", "include_prices": false});
        for _ in 0..2 {
            d.analyze(&args, &ProgressReporter::disabled(), Transport::Rest)
                .await
                .unwrap();
        }
    });

    assert_eq!(counter(&snap, "gateway_requests_total", Some(("transport", "rest"))), 2);
    assert_eq!(counter(&snap, "analysis_cache_hits_total", None), 1);
    assert_eq!(counter(&snap, "analysis_cache_misses_total", None), 1);
}

#[test]
fn synthetic_price_fill_counts_a_fallback() {
    let recorder = DebuggingRecorder::new();
    let snap = recorder.snapshotter();

    run(&recorder, async {
        let (_src, orch) = bullish_orchestrator();
        let inv = Invocation::from_arguments(&json!({"query": "doge", "focus_coins": ["DOGE"]}))
            .unwrap();
        let v = orch.execute(&inv, &ProgressReporter::disabled()).await;
        assert!(v.data_quality.synthetic_prices);
    });

    assert_eq!(counter(&snap, "fetch_fallback_total", Some(("kind", "prices"))), 1);
}
