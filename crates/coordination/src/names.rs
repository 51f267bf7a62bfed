//! Room-scoped, case-insensitive unique display names.
//!
//! Reservations live at `name:{room_id}:{normalized}` with a TTL; released
//! numeric suffixes are pooled in a sorted set at
//! `namepool:{room_id}:{base}` so the smallest freed number is reused
//! first. The pool is strictly a hint: every candidate is still validated
//! through the store's atomic conditional set before it is handed out, so a
//! stale pool entry can never produce a duplicate name.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use meethub_core::naming;
use meethub_store::{KeyValueStore, StoreError};

/// Errors from name allocation.
#[derive(Debug, thiserror::Error)]
pub enum NameError {
    /// Every reservation attempt collided. Surfaced to the join flow as a
    /// retryable conflict; the only user-facing error of this subsystem.
    #[error("no free display name for \"{requested}\" in room {room_id} after {attempts} attempts")]
    Exhausted {
        room_id: String,
        requested: String,
        attempts: u32,
    },

    /// The requested name was empty after trimming.
    #[error("display name must not be empty")]
    InvalidName,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Allocates collision-free participant display names within a room.
#[derive(Clone)]
pub struct NameAllocator {
    store: Arc<dyn KeyValueStore>,
    max_attempts: u32,
    reservation_ttl: Duration,
}

fn reservation_key(room_id: &str, normalized: &str) -> String {
    format!("name:{room_id}:{normalized}")
}

fn pool_key(room_id: &str, base_lower: &str) -> String {
    format!("namepool:{room_id}:{base_lower}")
}

impl NameAllocator {
    pub fn new(store: Arc<dyn KeyValueStore>, max_attempts: u32, reservation_ttl: Duration) -> Self {
        Self {
            store,
            max_attempts,
            reservation_ttl,
        }
    }

    /// Reserve a unique display name for a participant joining `room_id`.
    ///
    /// Returns the requested name when it is free, otherwise the base with
    /// the smallest available numeric suffix. Collisions are decided by the
    /// store's atomic conditional set, so two concurrent requests for the
    /// same name cannot both succeed.
    ///
    /// If the store becomes unreachable mid-allocation, a timestamp-suffixed
    /// name is returned without a reservation: a degraded-but-available join
    /// is preferred over failing it outright.
    pub async fn reserve(&self, room_id: &str, requested: &str) -> Result<String, NameError> {
        let requested = requested.trim();
        if requested.is_empty() {
            return Err(NameError::InvalidName);
        }

        match self.try_reserve(room_id, requested).await {
            Err(NameError::Store(e)) => {
                let (base, _) = naming::split_base_suffix(requested);
                let fallback = naming::with_suffix(base, degraded_suffix());
                tracing::warn!(
                    room_id,
                    requested,
                    fallback,
                    error = %e,
                    "Store unreachable during name allocation; issuing unreserved fallback name"
                );
                Ok(fallback)
            }
            other => other,
        }
    }

    async fn try_reserve(&self, room_id: &str, requested: &str) -> Result<String, NameError> {
        // Exact name first, keyed case-insensitively.
        if self.try_claim(room_id, &naming::normalize(requested)).await? {
            return Ok(requested.to_string());
        }

        // Strip one trailing `_<digits>` so "Bob_1" contends as base "Bob"
        // and can never grow into "Bob_1_1".
        let (base, _) = naming::split_base_suffix(requested);
        let base_lower = naming::normalize(base);

        for _ in 0..self.max_attempts {
            let number = match self.pooled_number(room_id, &base_lower).await? {
                Some(n) => n,
                None => self.scanned_number(room_id, &base_lower).await?,
            };
            let candidate = naming::with_suffix(&base_lower, number);
            if self.try_claim(room_id, &candidate).await? {
                return Ok(naming::with_suffix(base, number));
            }
            // Lost the race for this candidate; next attempt recomputes.
        }

        Err(NameError::Exhausted {
            room_id: room_id.to_string(),
            requested: requested.to_string(),
            attempts: self.max_attempts,
        })
    }

    async fn try_claim(&self, room_id: &str, normalized: &str) -> Result<bool, StoreError> {
        let value = chrono::Utc::now().to_rfc3339();
        self.store
            .set_if_absent(
                &reservation_key(room_id, normalized),
                &value,
                self.reservation_ttl,
            )
            .await
    }

    /// Smallest released number for this base, if the pool has one.
    async fn pooled_number(
        &self,
        room_id: &str,
        base_lower: &str,
    ) -> Result<Option<u32>, StoreError> {
        let popped = self
            .store
            .sorted_set_pop_min(&pool_key(room_id, base_lower), 1)
            .await?;
        // Unparseable members are discarded; the scan path takes over.
        Ok(popped.first().and_then(|m| m.parse().ok()))
    }

    /// Smallest positive integer not used by any visible `base_*`
    /// reservation.
    async fn scanned_number(&self, room_id: &str, base_lower: &str) -> Result<u32, StoreError> {
        let pattern = reservation_key(room_id, &format!("{base_lower}_*"));
        let keys = self.store.keys_matching(&pattern).await?;
        let prefix = reservation_key(room_id, &format!("{base_lower}_"));
        let taken: HashSet<u32> = keys
            .iter()
            .filter_map(|k| k.strip_prefix(&prefix))
            .filter_map(|digits| digits.parse().ok())
            .collect();
        Ok(naming::smallest_missing(&taken))
    }

    /// Release a participant's reservation when they leave.
    ///
    /// Idempotent: releasing an absent name is a no-op. A numeric suffix is
    /// returned to the pool (scored by its own value) and the pool TTL is
    /// refreshed so abandoned rooms cannot grow pools forever.
    pub async fn release(&self, room_id: &str, name: &str) -> Result<(), NameError> {
        let normalized = naming::normalize(name);
        self.store
            .delete(&reservation_key(room_id, &normalized))
            .await?;

        let (base, suffix) = naming::split_base_suffix(&normalized);
        if let Some(number) = suffix {
            let pool = pool_key(room_id, base);
            self.store
                .sorted_set_add(&pool, f64::from(number), &number.to_string())
                .await?;
            self.store.expire(&pool, self.reservation_ttl).await?;
        }
        Ok(())
    }

    /// Whether `name` is currently reserved in `room_id`.
    pub async fn is_reserved(&self, room_id: &str, name: &str) -> Result<bool, NameError> {
        Ok(self
            .store
            .exists(&reservation_key(room_id, &naming::normalize(name)))
            .await?)
    }

    /// All normalized names currently reserved in `room_id`.
    pub async fn reserved_names(&self, room_id: &str) -> Result<Vec<String>, NameError> {
        let prefix = reservation_key(room_id, "");
        let keys = self
            .store
            .keys_matching(&format!("{prefix}*"))
            .await?;
        Ok(keys
            .into_iter()
            .filter_map(|k| k.strip_prefix(&prefix).map(str::to_string))
            .collect())
    }

    /// Proactively drop every reservation and pool for a room, e.g. on room
    /// teardown. TTL expiry remains the primary cleanup mechanism; this
    /// just reclaims the keys early. Returns the number of keys deleted.
    pub async fn cleanup_room(&self, room_id: &str) -> Result<usize, NameError> {
        let mut deleted = 0;
        for pattern in [
            format!("name:{room_id}:*"),
            format!("namepool:{room_id}:*"),
        ] {
            for key in self.store.keys_matching(&pattern).await? {
                self.store.delete(&key).await?;
                deleted += 1;
            }
        }
        if deleted > 0 {
            tracing::debug!(room_id, deleted, "Cleaned up name reservations");
        }
        Ok(deleted)
    }
}

fn degraded_suffix() -> u32 {
    // Millisecond clock folded into a u32; uniqueness is best-effort here.
    (chrono::Utc::now().timestamp_millis() % 1_000_000) as u32
}
