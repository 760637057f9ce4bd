//! Progress events for one invocation.
//!
//! The orchestrator emits checkpoints into a broadcast channel; any number
//! of observers (the WebSocket adapter, tests) subscribe. Percentages never
//! go backwards, even if a caller emits them out of order.

use serde::Serialize;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::broadcast;

use crate::stages::StageKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Initializing,
    NewsFetched,
    PricesFetched,
    StageCompleted,
    Aggregated,
    Cached,
    Done,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub phase: Phase,
    /// 0..=100, monotonic within one reporter.
    pub percent: u8,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<StageKind>,
}

pub struct ProgressReporter {
    tx: Option<broadcast::Sender<ProgressEvent>>,
    last: AtomicU8,
}

impl ProgressReporter {
    /// A reporter plus its first subscriber.
    pub fn channel(capacity: usize) -> (Self, broadcast::Receiver<ProgressEvent>) {
        let (tx, rx) = broadcast::channel(capacity.max(1));
        (
            Self {
                tx: Some(tx),
                last: AtomicU8::new(0),
            },
            rx,
        )
    }

    /// Emits nowhere; for transports that don't stream.
    pub fn disabled() -> Self {
        Self {
            tx: None,
            last: AtomicU8::new(0),
        }
    }

    pub fn subscribe(&self) -> Option<broadcast::Receiver<ProgressEvent>> {
        self.tx.as_ref().map(|tx| tx.subscribe())
    }

    pub fn emit(&self, phase: Phase, percent: u8, message: impl Into<String>) {
        self.emit_event(phase, percent, message.into(), None);
    }

    pub fn stage_done(&self, stage: StageKind, percent: u8) {
        self.emit_event(
            Phase::StageCompleted,
            percent,
            format!("{} stage finished", stage.as_str()),
            Some(stage),
        );
    }

    fn emit_event(&self, phase: Phase, percent: u8, message: String, stage: Option<StageKind>) {
        let percent = percent.min(100);
        let prev = self.last.fetch_max(percent, Ordering::SeqCst);
        let percent = prev.max(percent);
        tracing::debug!(?phase, percent, %message, "progress");
        if let Some(tx) = &self.tx {
            // No subscribers is fine.
            let _ = tx.send(ProgressEvent {
                phase,
                percent,
                message,
                stage,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn percent_is_clamped_monotonic() {
        let (p, mut rx) = ProgressReporter::channel(16);
        let mut second = p.subscribe().unwrap();
        p.emit(Phase::Initializing, 10, "start");
        p.emit(Phase::NewsFetched, 5, "late");
        p.emit(Phase::Done, 250, "done");

        let got: Vec<u8> = (0..3).map(|_| rx.try_recv().unwrap().percent).collect();
        assert_eq!(got, vec![10, 10, 100]);
        assert_eq!(second.try_recv().unwrap().phase, Phase::Initializing);
    }

    #[test]
    fn disabled_reporter_is_silent() {
        let p = ProgressReporter::disabled();
        assert!(p.subscribe().is_none());
        p.emit(Phase::Done, 100, "nobody listens");
    }
}
