//! Redis-backed persistent tier client.
//!
//! One multiplexed connection is established lazily and reused across
//! calls. Every command runs under a bounded timeout; a failed command
//! drops the cached connection and is retried exactly once against a fresh
//! one, after which unavailability is surfaced to the engine. No unbounded
//! retry loops live on the request path.

use super::PersistentTier;
use crate::error::BackendError;
use crate::{Error, ErrorContext};
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, RedisResult};
use std::time::Duration;
use tokio::sync::Mutex;

/// Batch size hint for SCAN-based pattern deletes.
const SCAN_COUNT: usize = 100;

pub struct RedisTier {
    client: redis::Client,
    conn: Mutex<Option<MultiplexedConnection>>,
    op_timeout: Duration,
}

impl std::fmt::Debug for RedisTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisTier")
            .field("op_timeout", &self.op_timeout)
            .finish_non_exhaustive()
    }
}

impl RedisTier {
    /// Validates and stores the connection string; no network I/O happens
    /// until the first command.
    pub fn new(url: &str, op_timeout: Duration) -> crate::Result<Self> {
        let client = redis::Client::open(url).map_err(|e| {
            Error::configuration_with_context(
                format!("invalid persistent tier URL: {}", e),
                ErrorContext::new()
                    .with_field_path("config.persistent_tier_url")
                    .with_source("redis_tier"),
            )
        })?;
        Ok(Self {
            client,
            conn: Mutex::new(None),
            op_timeout,
        })
    }

    async fn connection(&self) -> Result<MultiplexedConnection, BackendError> {
        let mut guard = self.conn.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }
        let connect = self.client.get_multiplexed_async_connection();
        match tokio::time::timeout(self.op_timeout, connect).await {
            Ok(Ok(conn)) => {
                *guard = Some(conn.clone());
                Ok(conn)
            }
            Ok(Err(e)) => Err(BackendError::unavailable(format!("connect failed: {}", e))),
            Err(_) => Err(BackendError::unavailable("connect timed out")),
        }
    }

    async fn drop_connection(&self) {
        *self.conn.lock().await = None;
    }

    /// Run a command with the shared connection: bounded timeout, one
    /// reconnect-and-retry on connection-level failure, command-level
    /// errors surfaced immediately.
    async fn run<T, F>(&self, what: &str, mut cmd: F) -> Result<T, BackendError>
    where
        F: FnMut(MultiplexedConnection) -> BoxFuture<'static, RedisResult<T>> + Send,
        T: Send,
    {
        let mut last = BackendError::unavailable(format!("{} not attempted", what));
        for _attempt in 0..2 {
            let conn = match self.connection().await {
                Ok(conn) => conn,
                Err(e) => {
                    last = e;
                    continue;
                }
            };
            match tokio::time::timeout(self.op_timeout, cmd(conn)).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => {
                    self.drop_connection().await;
                    if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() {
                        last = BackendError::unavailable(format!("{} failed: {}", what, e));
                    } else {
                        // Server answered; retrying the same command will
                        // not change the outcome.
                        return Err(BackendError::command(format!("{} failed: {}", what, e)));
                    }
                }
                Err(_) => {
                    self.drop_connection().await;
                    last = BackendError::unavailable(format!(
                        "{} timed out after {:?}",
                        what, self.op_timeout
                    ));
                }
            }
        }
        Err(last)
    }
}

#[async_trait]
impl PersistentTier for RedisTier {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        let key = key.to_string();
        self.run("GET", move |mut conn| {
            let key = key.clone();
            async move { conn.get::<_, Option<Vec<u8>>>(&key).await }.boxed()
        })
        .await
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), BackendError> {
        let key = key.to_string();
        let value = value.to_vec();
        // SETEX rejects 0; the engine validates TTLs, this is a last-resort clamp.
        let seconds = ttl.as_secs().max(1);
        self.run("SETEX", move |mut conn| {
            let key = key.clone();
            let value = value.clone();
            async move { conn.set_ex::<_, _, ()>(&key, value, seconds).await }.boxed()
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<bool, BackendError> {
        let key = key.to_string();
        let removed = self
            .run("DEL", move |mut conn| {
                let key = key.clone();
                async move { conn.del::<_, i64>(&key).await }.boxed()
            })
            .await?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool, BackendError> {
        let key = key.to_string();
        self.run("EXISTS", move |mut conn| {
            let key = key.clone();
            async move { conn.exists::<_, bool>(&key).await }.boxed()
        })
        .await
    }

    async fn delete_by_pattern(&self, pattern: &str) -> Result<u64, BackendError> {
        let mut cursor: u64 = 0;
        let mut deleted: u64 = 0;
        loop {
            let pattern_owned = pattern.to_string();
            let (next, batch) = self
                .run("SCAN", move |mut conn| {
                    let pattern = pattern_owned.clone();
                    async move {
                        redis::cmd("SCAN")
                            .arg(cursor)
                            .arg("MATCH")
                            .arg(&pattern)
                            .arg("COUNT")
                            .arg(SCAN_COUNT)
                            .query_async::<_, (u64, Vec<String>)>(&mut conn)
                            .await
                    }
                    .boxed()
                })
                .await?;

            if !batch.is_empty() {
                let keys = batch.clone();
                deleted += self
                    .run("DEL", move |mut conn| {
                        let keys = keys.clone();
                        async move { conn.del::<_, u64>(&keys).await }.boxed()
                    })
                    .await?;
            }

            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        Ok(deleted)
    }

    async fn ping(&self) -> bool {
        self.run("PING", move |mut conn| {
            async move {
                redis::cmd("PING")
                    .query_async::<_, String>(&mut conn)
                    .await
            }
            .boxed()
        })
        .await
        .is_ok()
    }

    async fn close(&self) {
        self.drop_connection().await;
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
