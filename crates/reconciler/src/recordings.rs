//! Garbage collection of stale recording state.
//!
//! A recording left in `Active`/`Ending` whose backing egress is gone or no
//! longer updating will never terminate on its own, because the stateless
//! API has lost track of it. The sweep marks such recordings `Aborted` and
//! asks the media server to stop the egress when one still exists.

use std::sync::Arc;
use std::time::Duration;

use meethub_core::recording::{
    RecordingInfo, RecordingRepository, RecordingStatus, RepositoryError,
};
use meethub_media::{MediaError, MediaServer};

use crate::BATCH_SIZE;

/// Outcome counts of one sweep cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecordingSweepReport {
    /// Non-terminal recordings fetched from the repository.
    pub examined: usize,
    /// Recordings marked `Aborted`.
    pub aborted: usize,
    /// Recordings left as-is.
    pub kept: usize,
    /// Recordings whose inspection failed; retried next cycle.
    pub failed: usize,
}

#[derive(Debug, thiserror::Error)]
enum InspectError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Media(#[from] MediaError),
}

enum Outcome {
    Aborted,
    Kept,
}

/// Scheduled job that aborts recordings whose egress has died.
pub struct StaleRecordingSweep {
    recordings: Arc<dyn RecordingRepository>,
    media: Arc<dyn MediaServer>,
    /// Egress idle age below which a recording is always kept. Age alone is
    /// never sufficient evidence of staleness -- see [`Self::inspect`].
    grace: Duration,
}

impl StaleRecordingSweep {
    pub fn new(
        recordings: Arc<dyn RecordingRepository>,
        media: Arc<dyn MediaServer>,
        grace: Duration,
    ) -> Self {
        Self {
            recordings,
            media,
            grace,
        }
    }

    /// Run one full sweep cycle.
    pub async fn run_once(&self) -> Result<RecordingSweepReport, RepositoryError> {
        let active = self.recordings.find_active().await?;
        let mut report = RecordingSweepReport {
            examined: active.len(),
            ..Default::default()
        };

        for batch in active.chunks(BATCH_SIZE) {
            let results =
                futures::future::join_all(batch.iter().map(|rec| self.inspect(rec))).await;
            for (rec, result) in batch.iter().zip(results) {
                match result {
                    Ok(Outcome::Aborted) => report.aborted += 1,
                    Ok(Outcome::Kept) => report.kept += 1,
                    Err(e) => {
                        report.failed += 1;
                        tracing::warn!(
                            recording_id = %rec.recording_id,
                            room_id = %rec.room_id,
                            error = %e,
                            "Failed to inspect recording; deferring to next cycle"
                        );
                    }
                }
            }
        }

        tracing::info!(
            examined = report.examined,
            aborted = report.aborted,
            kept = report.kept,
            failed = report.failed,
            "Stale-recording sweep finished"
        );
        Ok(report)
    }

    async fn inspect(&self, rec: &RecordingInfo) -> Result<Outcome, InspectError> {
        let egresses = self.media.in_progress_egresses(&rec.room_id).await?;
        let matching = rec
            .egress_id()
            .and_then(|id| egresses.iter().find(|e| e.egress_id == id));

        let Some(egress) = matching else {
            // No backing egress at all: the recording can never finish.
            self.abort(rec, None).await?;
            return Ok(Outcome::Aborted);
        };

        let idle = (chrono::Utc::now() - egress.updated_at)
            .to_std()
            .unwrap_or_default();
        if idle < self.grace {
            return Ok(Outcome::Kept);
        }

        // Stale by age, but an egress can be legitimately quiet during a
        // live meeting. Only conclude abandonment when the room itself is
        // gone or empty.
        let abandoned = !self.media.room_exists(&rec.room_id).await?
            || !self.media.room_has_participants(&rec.room_id).await?;
        if !abandoned {
            return Ok(Outcome::Kept);
        }

        self.abort(rec, Some(egress.egress_id.as_str())).await?;
        Ok(Outcome::Aborted)
    }

    /// Mark the recording aborted, stopping the egress concurrently when
    /// one still exists. A failed stop is logged only: the next cycle sees
    /// the authoritative state again.
    async fn abort(&self, rec: &RecordingInfo, egress_id: Option<&str>) -> Result<(), InspectError> {
        tracing::info!(
            recording_id = %rec.recording_id,
            room_id = %rec.room_id,
            egress_id = egress_id.unwrap_or("<none>"),
            "Aborting stale recording"
        );

        match egress_id {
            Some(egress_id) => {
                let (updated, stopped) = tokio::join!(
                    self.recordings
                        .update_status(&rec.recording_id, RecordingStatus::Aborted),
                    self.media.stop_egress(egress_id),
                );
                if let Err(e) = stopped {
                    tracing::warn!(
                        recording_id = %rec.recording_id,
                        egress_id,
                        error = %e,
                        "Failed to stop egress for aborted recording"
                    );
                }
                updated?;
            }
            None => {
                self.recordings
                    .update_status(&rec.recording_id, RecordingStatus::Aborted)
                    .await?;
            }
        }
        Ok(())
    }
}
