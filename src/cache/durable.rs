//! Durable shared tier contract and its Redis implementation.
//!
//! Every method may fail; `CacheTier` catches the error, marks the tier
//! unhealthy and serves the operation from the fast tier.

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::time::Duration;
use tokio::sync::Mutex;

#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;
    async fn del(&self, key: &str) -> Result<()>;
    /// Glob pattern, e.g. `analysis:*`.
    async fn keys(&self, pattern: &str) -> Result<Vec<String>>;
    /// Liveness check used by the health probe.
    async fn ping(&self) -> Result<()>;
    fn name(&self) -> &'static str;
}

/// Redis over one lazily-opened multiplexed connection. A failed command
/// drops the connection so the next call reconnects.
pub struct RedisStore {
    client: redis::Client,
    conn: Mutex<Option<MultiplexedConnection>>,
}

impl RedisStore {
    pub fn open(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).context("opening redis client")?;
        Ok(Self {
            client,
            conn: Mutex::new(None),
        })
    }

    async fn connection(&self) -> Result<MultiplexedConnection> {
        let mut guard = self.conn.lock().await;
        if let Some(c) = guard.as_ref() {
            return Ok(c.clone());
        }
        let c = self
            .client
            .get_multiplexed_async_connection()
            .await
            .context("connecting to redis")?;
        *guard = Some(c.clone());
        Ok(c)
    }

    async fn reset(&self) {
        *self.conn.lock().await = None;
    }

    async fn run<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnOnce(MultiplexedConnection) -> Fut,
        Fut: std::future::Future<Output = redis::RedisResult<T>>,
    {
        let con = self.connection().await?;
        match op(con).await {
            Ok(v) => Ok(v),
            Err(e) => {
                self.reset().await;
                Err(e).context("redis command failed")
            }
        }
    }
}

#[async_trait]
impl DurableStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.run(|mut con| async move { con.get::<_, Option<String>>(key).await })
            .await
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let secs = ttl.as_secs().max(1);
        self.run(|mut con| async move { con.set_ex::<_, _, ()>(key, value, secs).await })
            .await
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.run(|mut con| async move { con.del::<_, ()>(key).await })
            .await
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        self.run(|mut con| async move { con.keys::<_, Vec<String>>(pattern).await })
            .await
    }

    async fn ping(&self) -> Result<()> {
        self.run(|mut con| async move {
            redis::cmd("PING")
                .query_async::<String>(&mut con)
                .await
                .map(|_| ())
        })
        .await
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
