//! Concurrent source fan-out under one deadline.
//!
//! Every source runs as its own task in a `JoinSet`. When the deadline
//! passes, the set is aborted: unfinished requests are cancelled, not left
//! running, and whatever already arrived is returned.

use metrics::counter;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::warn;

#[derive(Debug)]
pub struct Gathered<T> {
    /// Indexed like the input; `None` for failed or unfinished sources.
    pub results: Vec<Option<T>>,
    pub failures: usize,
    pub timed_out: bool,
}

impl<T> Gathered<T> {
    pub fn any_success(&self) -> bool {
        self.results.iter().any(Option::is_some)
    }
}

/// `kind` labels metrics and logs (`news`, `prices`).
pub async fn gather<T, Fut>(
    kind: &'static str,
    tasks: Vec<(String, Fut)>,
    deadline: Duration,
) -> Gathered<T>
where
    T: Send + 'static,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
{
    let n = tasks.len();
    let mut results: Vec<Option<T>> = (0..n).map(|_| None).collect();
    let mut failures = 0usize;
    let mut timed_out = false;

    let mut set = JoinSet::new();
    for (idx, (name, fut)) in tasks.into_iter().enumerate() {
        set.spawn(async move { (idx, name, fut.await) });
    }

    let until = tokio::time::Instant::now() + deadline;
    loop {
        match tokio::time::timeout_at(until, set.join_next()).await {
            Ok(None) => break,
            Ok(Some(Ok((idx, _, Ok(v))))) => results[idx] = Some(v),
            Ok(Some(Ok((_, name, Err(e))))) => {
                failures += 1;
                counter!("fetch_source_errors_total", "kind" => kind).increment(1);
                warn!(kind, source = %name, error = ?e, "source failed");
            }
            Ok(Some(Err(join_err))) => {
                failures += 1;
                counter!("fetch_source_errors_total", "kind" => kind).increment(1);
                warn!(kind, error = ?join_err, "source task died");
            }
            Err(_) => {
                timed_out = true;
                let pending = set.len();
                set.abort_all();
                warn!(kind, pending, ?deadline, "fetch deadline passed, cancelling");
                break;
            }
        }
    }

    Gathered {
        results,
        failures,
        timed_out,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn deadline_cancels_slow_sources_and_keeps_fast_ones() {
        let finished = Arc::new(AtomicBool::new(false));
        let f2 = finished.clone();

        type Fut = std::pin::Pin<Box<dyn Future<Output = anyhow::Result<u32>> + Send>>;
        let fast: Fut = Box::pin(async { Ok::<u32, anyhow::Error>(1) });
        let broken: Fut = Box::pin(async { Err::<u32, _>(anyhow::anyhow!("boom")) });
        let slow: Fut = Box::pin(async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            f2.store(true, Ordering::SeqCst);
            Ok::<u32, anyhow::Error>(3)
        });
        let tasks = vec![
            ("fast".to_string(), fast),
            ("broken".to_string(), broken),
            ("slow".to_string(), slow),
        ];

        let out = gather("test", tasks, Duration::from_secs(5)).await;
        assert_eq!(out.results[0], Some(1));
        assert_eq!(out.results[1], None);
        assert_eq!(out.results[2], None);
        assert_eq!(out.failures, 1);
        assert!(out.timed_out);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(!finished.load(Ordering::SeqCst), "slow source kept running");
    }
}
