//! Live WebSocket connections, keyed by id.
//!
//! The registry is owned by the WebSocket adapter; the orchestrator never
//! sees it. Each record holds the sending half of the connection's outbound
//! queue, so removing a record also stops delivery to that client.

use metrics::{counter, gauge};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Topics a client may subscribe to. Anything else is ignored.
pub const KNOWN_TOPICS: [&str; 2] = ["sentiment_updates", "market_alerts"];

/// Frames the socket writer understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Ping,
    Close,
}

pub type ConnectionId = Uuid;

#[derive(Debug)]
pub struct ConnectionRecord {
    pub id: ConnectionId,
    pub subscriptions: BTreeSet<String>,
    pub last_pong_at: Instant,
    pub initialized: bool,
    tx: mpsc::UnboundedSender<Outbound>,
}

/// What one heartbeat tick did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HeartbeatReport {
    pub pinged: usize,
    pub removed: Vec<ConnectionId>,
}

#[derive(Default)]
pub struct ConnectionRegistry {
    inner: Mutex<HashMap<ConnectionId, ConnectionRecord>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ConnectionId, ConnectionRecord>> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn publish_gauge(n: usize) {
        gauge!("ws_connections").set(n as f64);
    }

    /// New connection in the CONNECTED state.
    pub fn register(&self, tx: mpsc::UnboundedSender<Outbound>) -> ConnectionId {
        let id = Uuid::new_v4();
        let mut map = self.lock();
        map.insert(
            id,
            ConnectionRecord {
                id,
                subscriptions: BTreeSet::new(),
                last_pong_at: Instant::now(),
                initialized: false,
                tx,
            },
        );
        Self::publish_gauge(map.len());
        debug!(%id, "ws connection registered");
        id
    }

    pub fn remove(&self, id: &ConnectionId) -> bool {
        let mut map = self.lock();
        let removed = map.remove(id).is_some();
        Self::publish_gauge(map.len());
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Any sign of life from the client (pong frame or `ping` call).
    pub fn touch(&self, id: &ConnectionId) {
        if let Some(rec) = self.lock().get_mut(id) {
            rec.last_pong_at = Instant::now();
        }
    }

    pub fn mark_initialized(&self, id: &ConnectionId) {
        if let Some(rec) = self.lock().get_mut(id) {
            rec.initialized = true;
        }
    }

    pub fn is_initialized(&self, id: &ConnectionId) -> bool {
        self.lock().get(id).is_some_and(|r| r.initialized)
    }

    /// Adds the known topics among `topics`; returns the resulting set.
    pub fn subscribe(&self, id: &ConnectionId, topics: &[String]) -> Vec<String> {
        let mut map = self.lock();
        let Some(rec) = map.get_mut(id) else {
            return Vec::new();
        };
        for t in topics {
            if KNOWN_TOPICS.contains(&t.as_str()) {
                rec.subscriptions.insert(t.clone());
            } else {
                debug!(%id, topic = %t, "ignoring unknown topic");
            }
        }
        rec.subscriptions.iter().cloned().collect()
    }

    pub fn unsubscribe(&self, id: &ConnectionId, topics: &[String]) -> Vec<String> {
        let mut map = self.lock();
        let Some(rec) = map.get_mut(id) else {
            return Vec::new();
        };
        for t in topics {
            rec.subscriptions.remove(t);
        }
        rec.subscriptions.iter().cloned().collect()
    }

    /// Queue a frame. `false` if the connection is gone.
    pub fn deliver(&self, id: &ConnectionId, frame: Outbound) -> bool {
        match self.lock().get(id) {
            Some(rec) => rec.tx.send(frame).is_ok(),
            None => false,
        }
    }

    /// Send text to every connection subscribed to `topic`; returns how many.
    pub fn broadcast(&self, topic: &str, text: &str) -> usize {
        self.lock()
            .values()
            .filter(|r| r.subscriptions.contains(topic))
            .filter(|r| r.tx.send(Outbound::Text(text.to_string())).is_ok())
            .count()
    }

    /// Drop connections silent for longer than `stale_after`, ping the rest.
    pub fn heartbeat_tick(&self, stale_after: Duration) -> HeartbeatReport {
        let now = Instant::now();
        let mut map = self.lock();
        let stale: Vec<ConnectionId> = map
            .values()
            .filter(|r| now.duration_since(r.last_pong_at) > stale_after)
            .map(|r| r.id)
            .collect();

        let mut report = HeartbeatReport::default();
        for id in stale {
            if let Some(rec) = map.remove(&id) {
                let _ = rec.tx.send(Outbound::Close);
                counter!("ws_stale_disconnects_total").increment(1);
                warn!(%id, "ws connection stale, terminating");
                report.removed.push(id);
            }
        }
        for rec in map.values() {
            if rec.tx.send(Outbound::Ping).is_ok() {
                report.pinged += 1;
            }
        }
        Self::publish_gauge(map.len());
        report
    }

    /// Periodic heartbeat; stops once the registry is dropped.
    pub fn spawn_heartbeat(self: &Arc<Self>, every: Duration, stale_after: Duration) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        info!(
            every_secs = every.as_secs(),
            stale_after_secs = stale_after.as_secs(),
            "ws heartbeat started"
        );
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // First tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(registry) = weak.upgrade() else {
                    break;
                };
                let report = registry.heartbeat_tick(stale_after);
                debug!(pinged = report.pinged, removed = report.removed.len(), "ws heartbeat");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribe_is_idempotent_and_ignores_unknown_topics() {
        let reg = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let id = reg.register(tx);

        let topics = vec!["market_alerts".to_string(), "bogus".to_string()];
        assert_eq!(reg.subscribe(&id, &topics), vec!["market_alerts"]);
        assert_eq!(reg.subscribe(&id, &topics), vec!["market_alerts"]);
        assert!(reg.unsubscribe(&id, &["nope".to_string()]).len() == 1);
        assert!(reg.unsubscribe(&id, &topics).is_empty());
    }

    #[tokio::test]
    async fn broadcast_reaches_subscribers_only() {
        let reg = ConnectionRegistry::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        let a = reg.register(tx1);
        let _b = reg.register(tx2);
        reg.subscribe(&a, &["sentiment_updates".to_string()]);

        assert_eq!(reg.broadcast("sentiment_updates", "hi"), 1);
        assert_eq!(rx1.try_recv().unwrap(), Outbound::Text("hi".into()));
        assert!(rx2.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_connection_is_closed_and_removed() {
        let reg = ConnectionRegistry::new();
        let (tx_quiet, mut rx_quiet) = mpsc::unbounded_channel();
        let (tx_alive, mut rx_alive) = mpsc::unbounded_channel();
        let quiet = reg.register(tx_quiet);
        let alive = reg.register(tx_alive);

        tokio::time::advance(Duration::from_secs(45)).await;
        reg.touch(&alive);
        tokio::time::advance(Duration::from_secs(20)).await;

        let report = reg.heartbeat_tick(Duration::from_secs(60));
        assert_eq!(report.removed, vec![quiet]);
        assert_eq!(report.pinged, 1);
        assert_eq!(rx_quiet.try_recv().unwrap(), Outbound::Close);
        assert_eq!(rx_alive.try_recv().unwrap(), Outbound::Ping);

        assert!(!reg.deliver(&quiet, Outbound::Text("late".into())));
        assert!(reg.deliver(&alive, Outbound::Text("ok".into())));
        assert_eq!(reg.len(), 1);
    }
}
