//! # Cache tier
//! Two layers behind one API: an optional durable shared store (Redis) and
//! an always-available in-process map.
//!
//! - Reads and writes try the durable store first while it is healthy.
//! - Any durable error flips the health flag and the operation (and every
//!   later one) is served by the fast tier until the probe sees the store
//!   answer again.
//! - Writes always land in the fast tier as well.
//! - Expiry is checked when an entry is read; the fast tier is additionally
//!   swept every `cleanup_every_writes` writes.

pub mod durable;
pub mod fast;

use metrics::counter;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::CacheConfig;
use durable::{DurableStore, RedisStore};
use fast::FastTier;

/// Namespaces owned by this gateway; `flush` clears exactly these.
pub const NAMESPACES: [&str; 3] = ["news:", "prices:", "analysis:"];

pub mod keys {
    use crate::invocation::TimeRange;

    pub fn news(range: TimeRange) -> String {
        format!("news:{}", range.as_str())
    }

    /// Order-independent: `[eth, BTC]` and `[BTC, ETH]` share a key.
    pub fn prices(symbols: &[String]) -> String {
        let mut s: Vec<String> = symbols.iter().map(|c| c.trim().to_uppercase()).collect();
        s.sort();
        s.dedup();
        format!("prices:{}", s.join(","))
    }

    pub fn analysis(fingerprint: &str) -> String {
        format!("analysis:{fingerprint}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub data: T,
    /// Unix millis at write time.
    pub timestamp: i64,
    pub ttl_seconds: u64,
}

impl<T> CacheEntry<T> {
    pub fn new(data: T, now_ms: i64, ttl: Duration) -> Self {
        Self {
            data,
            timestamp: now_ms,
            ttl_seconds: ttl.as_secs(),
        }
    }

    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms - self.timestamp > (self.ttl_seconds as i64) * 1_000
    }

    fn expires_at_ms(&self) -> i64 {
        self.timestamp + (self.ttl_seconds as i64) * 1_000
    }
}

pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

fn system_clock() -> Clock {
    Arc::new(|| chrono::Utc::now().timestamp_millis())
}

/// Snapshot for `/status`.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatus {
    pub durable: Option<&'static str>,
    pub durable_healthy: bool,
    pub fast_entries: usize,
}

pub struct CacheTier {
    fast: FastTier,
    durable: Option<Arc<dyn DurableStore>>,
    durable_healthy: AtomicBool,
    writes: AtomicU64,
    cleanup_every: u64,
    clock: Clock,
}

impl CacheTier {
    /// Fast tier only.
    pub fn in_memory(max_entries: usize) -> Self {
        Self {
            fast: FastTier::new(max_entries),
            durable: None,
            durable_healthy: AtomicBool::new(false),
            writes: AtomicU64::new(0),
            cleanup_every: 100,
            clock: system_clock(),
        }
    }

    /// Build from config; a Redis URL that cannot even be parsed leaves the
    /// tier in-memory only.
    pub fn from_config(cfg: &CacheConfig) -> Self {
        let mut tier =
            Self::in_memory(cfg.fast_max_entries).with_cleanup_every(cfg.cleanup_every_writes);
        if let Some(url) = cfg.redis_url.as_deref().filter(|u| !u.trim().is_empty()) {
            match RedisStore::open(url) {
                Ok(store) => tier = tier.with_durable(Arc::new(store)),
                Err(e) => warn!(error = ?e, "durable cache disabled"),
            }
        }
        tier
    }

    /// Attach a durable store; it starts out as healthy.
    pub fn with_durable(mut self, store: Arc<dyn DurableStore>) -> Self {
        self.durable = Some(store);
        self.durable_healthy.store(true, Ordering::SeqCst);
        self
    }

    pub fn with_cleanup_every(mut self, writes: u64) -> Self {
        self.cleanup_every = writes.max(1);
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    fn now_ms(&self) -> i64 {
        (self.clock)()
    }

    /// The durable store, if configured and currently healthy.
    fn live_durable(&self) -> Option<&Arc<dyn DurableStore>> {
        self.durable
            .as_ref()
            .filter(|_| self.durable_healthy.load(Ordering::SeqCst))
    }

    fn degrade(&self, op: &str, err: &anyhow::Error) {
        counter!("cache_durable_errors_total").increment(1);
        if self.durable_healthy.swap(false, Ordering::SeqCst) {
            warn!(op, error = ?err, "durable cache unavailable, serving from fast tier");
        }
    }

    pub fn has_durable(&self) -> bool {
        self.durable.is_some()
    }

    pub fn durable_healthy(&self) -> bool {
        self.live_durable().is_some()
    }

    pub fn status(&self) -> CacheStatus {
        CacheStatus {
            durable: self.durable.as_ref().map(|d| d.name()),
            durable_healthy: self.durable_healthy(),
            fast_entries: self.fast.len(),
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let now = self.now_ms();

        if let Some(store) = self.live_durable() {
            match store.get(key).await {
                Ok(Some(raw)) => match serde_json::from_str::<CacheEntry<T>>(&raw) {
                    Ok(entry) if !entry.is_expired(now) => return Some(entry.data),
                    Ok(_) => {
                        debug!(key, "durable entry expired");
                        if let Err(e) = store.del(key).await {
                            self.degrade("del", &e);
                        }
                    }
                    Err(e) => warn!(key, error = ?e, "undecodable durable entry"),
                },
                Ok(None) => {}
                Err(e) => self.degrade("get", &e),
            }
        }

        let raw = self.fast.get(key)?;
        match serde_json::from_str::<CacheEntry<T>>(&raw) {
            Ok(entry) if !entry.is_expired(now) => Some(entry.data),
            Ok(_) => {
                self.fast.del(key);
                None
            }
            Err(e) => {
                warn!(key, error = ?e, "undecodable fast entry");
                self.fast.del(key);
                None
            }
        }
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let now = self.now_ms();
        let entry = CacheEntry::new(value, now, ttl);
        let raw = match serde_json::to_string(&entry) {
            Ok(s) => s,
            Err(e) => {
                warn!(key, error = ?e, "cache value not serializable");
                return;
            }
        };

        if let Some(store) = self.live_durable() {
            if let Err(e) = store.set_with_ttl(key, &raw, ttl).await {
                self.degrade("set", &e);
            }
        }
        self.fast.set(key, raw, entry.expires_at_ms());

        let n = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
        if n % self.cleanup_every == 0 {
            let removed = self.fast.sweep_expired(now);
            debug!(removed, "fast tier sweep");
        }
    }

    pub async fn del(&self, key: &str) {
        if let Some(store) = self.live_durable() {
            if let Err(e) = store.del(key).await {
                self.degrade("del", &e);
            }
        }
        self.fast.del(key);
    }

    /// Clear every gateway namespace in both tiers.
    pub async fn flush(&self) {
        if let Some(store) = self.live_durable() {
            'ns: for ns in NAMESPACES {
                let keys = match store.keys(&format!("{ns}*")).await {
                    Ok(k) => k,
                    Err(e) => {
                        self.degrade("keys", &e);
                        break 'ns;
                    }
                };
                for k in keys {
                    if let Err(e) = store.del(&k).await {
                        self.degrade("del", &e);
                        break 'ns;
                    }
                }
            }
        }
        self.fast.flush();
    }

    /// One health check. Returns whether the durable tier is usable now.
    pub async fn probe_once(&self) -> bool {
        let Some(store) = self.durable.as_ref() else {
            return false;
        };
        if self.durable_healthy.load(Ordering::SeqCst) {
            return true;
        }
        match store.ping().await {
            Ok(()) => {
                self.durable_healthy.store(true, Ordering::SeqCst);
                info!(store = store.name(), "durable cache reconnected");
                true
            }
            Err(e) => {
                debug!(error = ?e, "durable cache still down");
                false
            }
        }
    }

    /// Background probe; stops once the tier is dropped. `None` without a
    /// durable store.
    pub fn spawn_probe(self: &Arc<Self>, every: Duration) -> Option<JoinHandle<()>> {
        self.durable.as_ref()?;
        let weak: Weak<Self> = Arc::downgrade(self);
        Some(tokio::spawn(async move {
            let mut tick = tokio::time::interval(every);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                let Some(tier) = weak.upgrade() else { break };
                tier.probe_once().await;
            }
        }))
    }
}
