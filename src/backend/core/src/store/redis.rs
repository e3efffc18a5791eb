//! Redis-backed [`QueueStore`].
//!
//! Lists map to `RPUSH`/`BLPOP`, the delayed container to a sorted set, and
//! optimistic transactions to `WATCH` + `MULTI`/`EXEC`. Blocking pops and
//! watches each take a dedicated connection: both hold per-connection server
//! state that must not leak onto the shared multiplexed pipe.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

use super::{QueueStore, Transaction, TxOp, WatchGuard};
use crate::config::TaskerConfig;
use crate::error::{Result, TaskerError};

/// Redis queue store.
#[derive(Clone)]
pub struct RedisQueueStore {
    client: ::redis::Client,
    shared: Option<::redis::aio::ConnectionManager>,
    url: String,
}

impl std::fmt::Debug for RedisQueueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisQueueStore")
            .field("url", &self.url)
            .field("persistent", &self.shared.is_some())
            .finish()
    }
}

impl RedisQueueStore {
    /// Connect and verify the server answers `PING`.
    ///
    /// With `persistent` set, commands share one auto-reconnecting
    /// connection; otherwise every command opens its own.
    pub async fn connect(config: &TaskerConfig) -> Result<Self> {
        let url = config.redis_url();
        let client = ::redis::Client::open(url.as_str())
            .map_err(|e| TaskerError::connection_failed(&url, e.to_string()))?;

        let shared = if config.persistent {
            let manager = ::redis::aio::ConnectionManager::new(client.clone())
                .await
                .map_err(|e| TaskerError::connection_failed(&url, e.to_string()))?;
            Some(manager)
        } else {
            None
        };

        let store = Self { client, shared, url };
        store
            .ping()
            .await
            .map_err(|e| TaskerError::connection_failed(&store.url, e.to_string()))?;

        info!(url = %store.url, persistent = store.shared.is_some(), "Redis queue store connected");
        Ok(store)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn dedicated(&self) -> Result<::redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    async fn query<T: ::redis::FromRedisValue>(&self, cmd: &::redis::Cmd) -> Result<T> {
        let value = match &self.shared {
            Some(manager) => {
                let mut conn = manager.clone();
                cmd.query_async::<_, T>(&mut conn).await?
            }
            None => {
                let mut conn = self.dedicated().await?;
                cmd.query_async::<_, T>(&mut conn).await?
            }
        };
        Ok(value)
    }
}

#[async_trait]
impl QueueStore for RedisQueueStore {
    async fn push(&self, key: &str, value: &str) -> Result<()> {
        let _: i64 = self.query(::redis::cmd("RPUSH").arg(key).arg(value)).await?;
        Ok(())
    }

    async fn blocking_pop(&self, key: &str, timeout: Duration) -> Result<Option<String>> {
        let mut conn = self.dedicated().await?;
        let popped: Option<(String, String)> = ::redis::cmd("BLPOP")
            .arg(key)
            .arg(timeout.as_secs_f64())
            .query_async(&mut conn)
            .await?;
        Ok(popped.map(|(_, value)| value))
    }

    async fn sorted_insert(&self, key: &str, score: f64, member: &str) -> Result<bool> {
        let added: i64 = self
            .query(::redis::cmd("ZADD").arg(key).arg(score).arg(member))
            .await?;
        Ok(added == 1)
    }

    async fn sorted_range_by_max_score(&self, key: &str, max: f64) -> Result<Vec<String>> {
        self.query(::redis::cmd("ZRANGEBYSCORE").arg(key).arg("-inf").arg(max))
            .await
    }

    async fn sorted_remove(&self, key: &str, member: &str) -> Result<bool> {
        let removed: i64 = self.query(::redis::cmd("ZREM").arg(key).arg(member)).await?;
        Ok(removed > 0)
    }

    async fn watch(&self, key: &str) -> Result<Box<dyn WatchGuard>> {
        let mut conn = self.dedicated().await?;
        let _: () = ::redis::cmd("WATCH").arg(key).query_async(&mut conn).await?;
        Ok(Box::new(RedisWatch {
            conn,
            key: key.to_string(),
        }))
    }

    async fn ping(&self) -> Result<()> {
        let _: String = self.query(&::redis::cmd("PING")).await?;
        Ok(())
    }

    async fn list_len(&self, key: &str) -> Result<usize> {
        self.query(::redis::cmd("LLEN").arg(key)).await
    }

    async fn sorted_len(&self, key: &str) -> Result<usize> {
        self.query(::redis::cmd("ZCARD").arg(key)).await
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

struct RedisWatch {
    conn: ::redis::aio::MultiplexedConnection,
    key: String,
}

#[async_trait]
impl WatchGuard for RedisWatch {
    async fn sorted_contains(&mut self, key: &str, member: &str) -> Result<bool> {
        let score: Option<f64> = ::redis::cmd("ZSCORE")
            .arg(key)
            .arg(member)
            .query_async(&mut self.conn)
            .await?;
        Ok(score.is_some())
    }

    async fn commit(self: Box<Self>, tx: Transaction) -> Result<bool> {
        let mut this = self;
        let mut pipe = ::redis::pipe();
        pipe.atomic();
        for op in tx.ops() {
            match op {
                TxOp::Push { key, value } => {
                    pipe.cmd("RPUSH").arg(key).arg(value);
                }
                TxOp::SortedRemove { key, member } => {
                    pipe.cmd("ZREM").arg(key).arg(member);
                }
            }
        }

        // EXEC answers nil when the watched key changed
        let replies: Option<Vec<i64>> = pipe.query_async(&mut this.conn).await?;
        if replies.is_none() {
            debug!(key = %this.key, "Transaction aborted by concurrent write");
        }
        Ok(replies.is_some())
    }

    async fn unwatch(self: Box<Self>) -> Result<()> {
        let mut this = self;
        let _: () = ::redis::cmd("UNWATCH").query_async(&mut this.conn).await?;
        Ok(())
    }
}
