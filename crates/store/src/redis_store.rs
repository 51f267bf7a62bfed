//! Redis-backed [`KeyValueStore`].
//!
//! Uses a [`redis::aio::ConnectionManager`] (cheap to clone, reconnects
//! transparently) and maps each trait primitive to a single Redis command.
//! Compare-and-delete has no native command, so it runs as a server-side
//! Lua script to keep the read and the delete in one atomic step.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;

use crate::kv::{KeyValueStore, StoreError};

/// Lua: delete the key only if its current value matches ARGV[1].
const COMPARE_AND_DELETE: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
else
    return 0
end
"#;

/// How many keys one SCAN round-trip asks for.
const SCAN_COUNT: usize = 100;

/// Production key-value store over Redis.
pub struct RedisStore {
    conn: ConnectionManager,
    compare_and_delete: redis::Script,
}

impl RedisStore {
    /// Connect to Redis and verify the connection with a PING.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(to_store_error)?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(to_store_error)?;

        let store = Self {
            conn,
            compare_and_delete: redis::Script::new(COMPARE_AND_DELETE),
        };
        store.ping().await?;

        tracing::info!(url, "Connected to Redis");
        Ok(store)
    }

    /// Connect with retries, waiting `delay` between attempts.
    ///
    /// This is the one-directional "store ready" gate: callers that register
    /// periodic jobs against the store await this before registering, so the
    /// jobs never observe a store that has not come up yet.
    pub async fn connect_with_retry(
        url: &str,
        attempts: u32,
        delay: Duration,
    ) -> Result<Self, StoreError> {
        let mut last_err = StoreError::Unavailable("no connection attempts made".into());
        for attempt in 1..=attempts {
            match Self::connect(url).await {
                Ok(store) => return Ok(store),
                Err(e) => {
                    tracing::warn!(url, attempt, attempts, error = %e, "Redis not ready yet");
                    last_err = e;
                }
            }
            if attempt < attempts {
                tokio::time::sleep(delay).await;
            }
        }
        Err(last_err)
    }

    /// Round-trip a PING.
    pub async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let reply: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(to_store_error)?;
        if reply == "PONG" {
            Ok(())
        } else {
            Err(StoreError::UnexpectedReply(reply))
        }
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        // SET key value NX PX ttl -- nil reply means the key already existed.
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await
            .map_err(to_store_error)?;
        Ok(reply.is_some())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(to_store_error)
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let n: i64 = redis::cmd("EXISTS")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(to_store_error)?;
        Ok(n > 0)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(to_store_error)?;
        Ok(())
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let deleted: i64 = self
            .compare_and_delete
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await
            .map_err(to_store_error)?;
        Ok(deleted > 0)
    }

    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut conn)
                .await
                .map_err(to_store_error)?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(keys)
    }

    async fn sorted_set_add(
        &self,
        key: &str,
        score: f64,
        member: &str,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("ZADD")
            .arg(key)
            .arg(score)
            .arg(member)
            .query_async(&mut conn)
            .await
            .map_err(to_store_error)?;
        Ok(())
    }

    async fn sorted_set_pop_min(
        &self,
        key: &str,
        count: usize,
    ) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        // ZPOPMIN replies with a flat [member, score, member, score, ...].
        let flat: Vec<String> = redis::cmd("ZPOPMIN")
            .arg(key)
            .arg(count)
            .query_async(&mut conn)
            .await
            .map_err(to_store_error)?;
        Ok(flat.into_iter().step_by(2).collect())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("PEXPIRE")
            .arg(key)
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await
            .map_err(to_store_error)?;
        Ok(())
    }
}

fn to_store_error(e: redis::RedisError) -> StoreError {
    StoreError::Unavailable(e.to_string())
}
