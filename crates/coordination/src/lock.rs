//! Named, auto-expiring distributed mutexes.
//!
//! A lock is a store key holding a JSON [`LockRecord`] with a unique
//! acquisition token and the acquisition time. The token makes owner
//! release race-free: release is a store-side compare-and-delete, so a lock
//! that expired and was re-acquired by another holder can never be deleted
//! by the stale owner.
//!
//! The TTL bounds how long a crashed holder can keep a lock. Holders of
//! long operations must re-check [`LockService::lock_exists`] before
//! committing side effects, since the TTL can lapse mid-operation.

use std::sync::Arc;
use std::time::Duration;

use meethub_core::types::Timestamp;
use meethub_store::{KeyValueStore, StoreError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Key prefix for "a recording is active in this room" locks. The room id
/// is appended verbatim.
pub const RECORDING_ACTIVE_PREFIX: &str = "lock:recording-active:";

/// Lock key for the active-recording lock of a room.
pub fn recording_active_key(room_id: &str) -> String {
    format!("{RECORDING_ACTIVE_PREFIX}{room_id}")
}

/// Value stored under a lock key.
#[derive(Debug, Serialize, Deserialize)]
struct LockRecord {
    token: Uuid,
    acquired_at: Timestamp,
}

/// Proof of lock ownership, returned by [`LockService::acquire`].
///
/// Holds the exact serialized record so release can compare-and-delete.
#[derive(Debug, Clone)]
pub struct LockToken {
    key: String,
    raw: String,
}

impl LockToken {
    /// The lock key this token was issued for.
    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Errors from the lock service.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Distributed mutexes on top of the key-value store.
#[derive(Clone)]
pub struct LockService {
    store: Arc<dyn KeyValueStore>,
}

impl LockService {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Try to acquire the lock at `key` for at most `ttl`.
    ///
    /// Returns `None` when another holder has the lock. Success does not
    /// imply exclusivity forever -- the TTL can expire mid-operation.
    pub async fn acquire(&self, key: &str, ttl: Duration) -> Result<Option<LockToken>, LockError> {
        let record = LockRecord {
            token: Uuid::new_v4(),
            acquired_at: chrono::Utc::now(),
        };
        let raw = serde_json::to_string(&record).expect("lock record serializes");

        if self.store.set_if_absent(key, &raw, ttl).await? {
            tracing::debug!(lock_key = key, token = %record.token, "Lock acquired");
            Ok(Some(LockToken {
                key: key.to_string(),
                raw,
            }))
        } else {
            Ok(None)
        }
    }

    /// Release a lock we own.
    ///
    /// Returns `false` when the lock had already expired (and possibly been
    /// re-acquired by someone else) -- in that case nothing is deleted.
    pub async fn release(&self, token: &LockToken) -> Result<bool, LockError> {
        let released = self.store.delete_if_equals(&token.key, &token.raw).await?;
        if !released {
            tracing::warn!(
                lock_key = %token.key,
                "Lock was no longer ours at release; leaving it alone"
            );
        }
        Ok(released)
    }

    /// Forcibly release a lock regardless of owner. Reconciler only.
    ///
    /// A final existence check narrows (but cannot eliminate) the window
    /// for racing a concurrent legitimate release.
    pub async fn force_release(&self, key: &str) -> Result<bool, LockError> {
        if !self.store.exists(key).await? {
            return Ok(false);
        }
        self.store.delete(key).await?;
        tracing::info!(lock_key = key, "Lock forcibly released");
        Ok(true)
    }

    /// Whether the lock at `key` is currently held.
    pub async fn lock_exists(&self, key: &str) -> Result<bool, LockError> {
        Ok(self.store.exists(key).await?)
    }

    /// When the lock at `key` was acquired, if it is held.
    ///
    /// A value that does not parse as a lock record yields `None` (logged);
    /// the reconciler treats such locks as too young to touch.
    pub async fn created_at(&self, key: &str) -> Result<Option<Timestamp>, LockError> {
        let Some(raw) = self.store.get(key).await? else {
            return Ok(None);
        };
        match serde_json::from_str::<LockRecord>(&raw) {
            Ok(record) => Ok(Some(record.acquired_at)),
            Err(e) => {
                tracing::warn!(lock_key = key, error = %e, "Malformed lock record");
                Ok(None)
            }
        }
    }

    /// All lock keys starting with `prefix`. Reconciler only -- this walks
    /// the keyspace and must stay off the request hot path.
    pub async fn locks_by_prefix(&self, prefix: &str) -> Result<Vec<String>, LockError> {
        Ok(self.store.keys_matching(&format!("{prefix}*")).await?)
    }
}
