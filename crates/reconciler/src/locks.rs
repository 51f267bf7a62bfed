//! Garbage collection of orphaned active-recording locks.
//!
//! A lock is orphaned when its owning operation terminated (crashed, or
//! completed without cleanup) while the lock key stayed behind. The sweep
//! compares every held lock against the media server's authoritative view
//! and forcibly releases the ones whose recording can no longer be running.

use std::sync::Arc;
use std::time::Duration;

use meethub_coordination::lock::{LockService, RECORDING_ACTIVE_PREFIX};
use meethub_coordination::LockError;
use meethub_media::{MediaError, MediaServer};

use crate::BATCH_SIZE;

/// Outcome counts of one sweep cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LockSweepReport {
    /// Lock keys enumerated at the start of the cycle.
    pub examined: usize,
    /// Locks forcibly released.
    pub released: usize,
    /// Locks left in place because their recording looks live.
    pub kept: usize,
    /// Locks skipped: already gone, or younger than the grace period.
    pub skipped: usize,
    /// Locks whose inspection failed; retried next cycle.
    pub failed: usize,
}

#[derive(Debug, thiserror::Error)]
enum InspectError {
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error(transparent)]
    Media(#[from] MediaError),
}

enum Outcome {
    Released,
    Kept,
    Skipped,
}

/// Scheduled job that reclaims orphaned active-recording locks.
pub struct OrphanedLockSweep {
    locks: LockService,
    media: Arc<dyn MediaServer>,
    /// Minimum lock age before it may be touched, so a lock created for a
    /// recording that is still starting up is never raced.
    grace: Duration,
}

impl OrphanedLockSweep {
    pub fn new(locks: LockService, media: Arc<dyn MediaServer>, grace: Duration) -> Self {
        Self {
            locks,
            media,
            grace,
        }
    }

    /// Run one full sweep cycle.
    ///
    /// Only the initial lock enumeration can fail the cycle as a whole;
    /// per-lock failures are counted and deferred to the next run.
    pub async fn run_once(&self) -> Result<LockSweepReport, LockError> {
        let keys = self.locks.locks_by_prefix(RECORDING_ACTIVE_PREFIX).await?;
        let mut report = LockSweepReport {
            examined: keys.len(),
            ..Default::default()
        };

        for batch in keys.chunks(BATCH_SIZE) {
            let results =
                futures::future::join_all(batch.iter().map(|key| self.inspect(key))).await;
            for (key, result) in batch.iter().zip(results) {
                match result {
                    Ok(Outcome::Released) => report.released += 1,
                    Ok(Outcome::Kept) => report.kept += 1,
                    Ok(Outcome::Skipped) => report.skipped += 1,
                    Err(e) => {
                        report.failed += 1;
                        tracing::warn!(
                            lock_key = %key,
                            error = %e,
                            "Failed to inspect recording lock; deferring to next cycle"
                        );
                    }
                }
            }
        }

        tracing::info!(
            examined = report.examined,
            released = report.released,
            kept = report.kept,
            skipped = report.skipped,
            failed = report.failed,
            "Orphaned-lock sweep finished"
        );
        Ok(report)
    }

    async fn inspect(&self, key: &str) -> Result<Outcome, InspectError> {
        let room_id = key.strip_prefix(RECORDING_ACTIVE_PREFIX).unwrap_or(key);

        // Already released between enumeration and now.
        if !self.locks.lock_exists(key).await? {
            return Ok(Outcome::Skipped);
        }

        // Too young to judge: the recording may still be starting up. A
        // malformed record has no readable age and is treated the same way.
        let Some(acquired_at) = self.locks.created_at(key).await? else {
            return Ok(Outcome::Skipped);
        };
        let age = (chrono::Utc::now() - acquired_at)
            .to_std()
            .unwrap_or_default();
        if age < self.grace {
            return Ok(Outcome::Skipped);
        }

        let reason = match self.media.get_room(room_id).await? {
            None => "room no longer exists",
            Some(room) if room.num_publishers == 0 => "room has no publishers",
            Some(_) => {
                if self.media.in_progress_egresses(room_id).await?.is_empty() {
                    "room has no in-progress egress"
                } else {
                    return Ok(Outcome::Kept);
                }
            }
        };

        // force_release re-checks existence just before deleting, narrowing
        // the window against a concurrent legitimate release.
        if self.locks.force_release(key).await? {
            tracing::info!(room_id, lock_key = %key, reason, "Released orphaned recording lock");
            Ok(Outcome::Released)
        } else {
            Ok(Outcome::Skipped)
        }
    }
}
