//! The atomic key-value primitives the coordination layer relies on.

use std::time::Duration;

use async_trait::async_trait;

/// Errors from a key-value store backend.
///
/// Every operation is network-bound and may fail transiently. A timeout
/// after the command was sent leaves the key in an unknown state; callers
/// must only retry idempotent operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached or the connection dropped mid-command.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store answered with something the client could not interpret.
    #[error("unexpected store reply: {0}")]
    UnexpectedReply(String),
}

/// Atomic primitives over a shared, network-accessible key-value store.
///
/// Everything described as "atomic" by the coordination layer maps to
/// exactly one of these operations -- never to a read-then-write pair from
/// the calling process, since multiple API instances may interleave.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Atomically create `key` with `value` and a TTL.
    ///
    /// Returns `false` when the key already exists (the existing value and
    /// TTL are left untouched).
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    /// Current value of `key`, if present.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Whether `key` currently exists.
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Delete `key`. Idempotent; absent keys are not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Atomically delete `key` only if its value equals `expected`.
    ///
    /// Returns `true` when the key was deleted. This is the primitive that
    /// makes token-based lock release race-free.
    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool, StoreError>;

    /// Keys matching a glob-style pattern.
    ///
    /// May be O(n) over the keyspace; reconciler and cleanup paths only,
    /// never the request hot path.
    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>, StoreError>;

    /// Insert `member` with `score` into the sorted set at `key`.
    async fn sorted_set_add(&self, key: &str, score: f64, member: &str)
        -> Result<(), StoreError>;

    /// Atomically remove and return up to `count` members with the lowest
    /// scores from the sorted set at `key`.
    async fn sorted_set_pop_min(&self, key: &str, count: usize)
        -> Result<Vec<String>, StoreError>;

    /// Set or refresh the TTL of `key`. Absent keys are ignored.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError>;
}
