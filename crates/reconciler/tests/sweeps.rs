//! Integration tests for both reconciliation sweeps, run against the
//! in-memory store and fake media-server / recording-repository backends.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use meethub_coordination::lock::{recording_active_key, LockService};
use meethub_core::recording::{
    RecordingInfo, RecordingRepository, RecordingStatus, RepositoryError,
};
use meethub_media::{EgressSummary, MediaError, MediaServer, RoomSummary};
use meethub_reconciler::{OrphanedLockSweep, StaleRecordingSweep};
use meethub_store::MemoryStore;

const LOCK_TTL: Duration = Duration::from_secs(3600);
const NO_GRACE: Duration = Duration::ZERO;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

#[derive(Default)]
struct FakeMediaServer {
    rooms: Mutex<HashMap<String, RoomSummary>>,
    egresses: Mutex<Vec<EgressSummary>>,
    stopped: Mutex<Vec<String>>,
    failing_rooms: Mutex<HashSet<String>>,
}

impl FakeMediaServer {
    fn add_room(&self, room_id: &str, num_publishers: u32, num_participants: u32) {
        self.rooms.lock().unwrap().insert(
            room_id.to_string(),
            RoomSummary {
                room_id: room_id.to_string(),
                num_publishers,
                num_participants,
            },
        );
    }

    fn add_egress(&self, egress_id: &str, room_id: &str, updated_at: chrono::DateTime<chrono::Utc>) {
        self.egresses.lock().unwrap().push(EgressSummary {
            egress_id: egress_id.to_string(),
            room_id: room_id.to_string(),
            updated_at,
        });
    }

    fn fail_for(&self, room_id: &str) {
        self.failing_rooms
            .lock()
            .unwrap()
            .insert(room_id.to_string());
    }

    fn stopped(&self) -> Vec<String> {
        self.stopped.lock().unwrap().clone()
    }

    fn check(&self, room_id: &str) -> Result<(), MediaError> {
        if self.failing_rooms.lock().unwrap().contains(room_id) {
            return Err(MediaError::Api {
                status: 503,
                body: "injected failure".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl MediaServer for FakeMediaServer {
    async fn room_exists(&self, room_id: &str) -> Result<bool, MediaError> {
        self.check(room_id)?;
        Ok(self.rooms.lock().unwrap().contains_key(room_id))
    }

    async fn get_room(&self, room_id: &str) -> Result<Option<RoomSummary>, MediaError> {
        self.check(room_id)?;
        Ok(self.rooms.lock().unwrap().get(room_id).cloned())
    }

    async fn room_has_participants(&self, room_id: &str) -> Result<bool, MediaError> {
        self.check(room_id)?;
        Ok(self
            .rooms
            .lock()
            .unwrap()
            .get(room_id)
            .is_some_and(|r| r.num_participants > 0))
    }

    async fn in_progress_egresses(
        &self,
        room_id: &str,
    ) -> Result<Vec<EgressSummary>, MediaError> {
        self.check(room_id)?;
        Ok(self
            .egresses
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.room_id == room_id)
            .cloned()
            .collect())
    }

    async fn stop_egress(&self, egress_id: &str) -> Result<(), MediaError> {
        self.stopped.lock().unwrap().push(egress_id.to_string());
        Ok(())
    }
}

#[derive(Default)]
struct FakeRepo {
    recordings: Mutex<Vec<RecordingInfo>>,
}

impl FakeRepo {
    fn add(&self, recording_id: &str, room_id: &str, status: RecordingStatus) {
        self.recordings.lock().unwrap().push(RecordingInfo {
            recording_id: recording_id.to_string(),
            room_id: room_id.to_string(),
            egress_id: None,
            status,
        });
    }

    fn status_of(&self, recording_id: &str) -> RecordingStatus {
        self.recordings
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.recording_id == recording_id)
            .map(|r| r.status)
            .expect("recording exists")
    }
}

#[async_trait]
impl RecordingRepository for FakeRepo {
    async fn find_active(&self) -> Result<Vec<RecordingInfo>, RepositoryError> {
        Ok(self
            .recordings
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.status.is_reconcilable())
            .cloned()
            .collect())
    }

    async fn update_status(
        &self,
        recording_id: &str,
        status: RecordingStatus,
    ) -> Result<(), RepositoryError> {
        let mut recordings = self.recordings.lock().unwrap();
        let rec = recordings
            .iter_mut()
            .find(|r| r.recording_id == recording_id)
            .ok_or_else(|| RepositoryError::NotFound {
                recording_id: recording_id.to_string(),
            })?;
        rec.status = status;
        Ok(())
    }
}

async fn locked_room(locks: &LockService, room_id: &str) -> String {
    let key = recording_active_key(room_id);
    locks
        .acquire(&key, LOCK_TTL)
        .await
        .unwrap()
        .expect("lock acquired");
    key
}

// ---------------------------------------------------------------------------
// Orphaned-lock sweep
// ---------------------------------------------------------------------------

#[tokio::test]
async fn lock_for_vanished_room_is_released() {
    let locks = LockService::new(Arc::new(MemoryStore::new()));
    let media = Arc::new(FakeMediaServer::default());
    let key = locked_room(&locks, "r1").await;

    let sweep = OrphanedLockSweep::new(locks.clone(), media, NO_GRACE);
    let report = sweep.run_once().await.unwrap();

    assert_eq!(report.released, 1);
    assert!(!locks.lock_exists(&key).await.unwrap());
}

#[tokio::test]
async fn lock_with_live_recording_is_kept() {
    let locks = LockService::new(Arc::new(MemoryStore::new()));
    let media = Arc::new(FakeMediaServer::default());
    media.add_room("r1", 2, 3);
    media.add_egress("EG_1", "r1", chrono::Utc::now());
    let key = locked_room(&locks, "r1").await;

    let sweep = OrphanedLockSweep::new(locks.clone(), media, NO_GRACE);
    let report = sweep.run_once().await.unwrap();

    assert_eq!(report.kept, 1);
    assert_eq!(report.released, 0);
    assert!(locks.lock_exists(&key).await.unwrap());
}

#[tokio::test]
async fn lock_for_room_without_publishers_is_released() {
    let locks = LockService::new(Arc::new(MemoryStore::new()));
    let media = Arc::new(FakeMediaServer::default());
    media.add_room("r1", 0, 1);
    let key = locked_room(&locks, "r1").await;

    let sweep = OrphanedLockSweep::new(locks.clone(), media, NO_GRACE);
    let report = sweep.run_once().await.unwrap();

    assert_eq!(report.released, 1);
    assert!(!locks.lock_exists(&key).await.unwrap());
}

#[tokio::test]
async fn lock_for_room_without_egress_is_released() {
    let locks = LockService::new(Arc::new(MemoryStore::new()));
    let media = Arc::new(FakeMediaServer::default());
    media.add_room("r1", 2, 2); // publishers, but nothing recording
    locked_room(&locks, "r1").await;

    let sweep = OrphanedLockSweep::new(locks.clone(), media, NO_GRACE);
    let report = sweep.run_once().await.unwrap();

    assert_eq!(report.released, 1);
}

#[tokio::test]
async fn young_lock_is_left_alone() {
    let locks = LockService::new(Arc::new(MemoryStore::new()));
    let media = Arc::new(FakeMediaServer::default());
    let key = locked_room(&locks, "r1").await; // room doesn't even exist

    let sweep = OrphanedLockSweep::new(locks.clone(), media, Duration::from_secs(300));
    let report = sweep.run_once().await.unwrap();

    assert_eq!(report.skipped, 1);
    assert_eq!(report.released, 0);
    assert!(locks.lock_exists(&key).await.unwrap());
}

#[tokio::test]
async fn one_failing_room_does_not_block_the_batch() {
    let locks = LockService::new(Arc::new(MemoryStore::new()));
    let media = Arc::new(FakeMediaServer::default());
    media.fail_for("r-bad");
    locked_room(&locks, "r-bad").await;
    let good = locked_room(&locks, "r-good").await; // room gone -> released

    let sweep = OrphanedLockSweep::new(locks.clone(), media, NO_GRACE);
    let report = sweep.run_once().await.unwrap();

    assert_eq!(report.examined, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.released, 1);
    assert!(!locks.lock_exists(&good).await.unwrap());
}

// ---------------------------------------------------------------------------
// Stale-recording sweep
// ---------------------------------------------------------------------------

const GRACE: Duration = Duration::from_secs(600);

#[tokio::test]
async fn recording_without_egress_is_aborted_immediately() {
    let media = Arc::new(FakeMediaServer::default());
    let repo = Arc::new(FakeRepo::default());
    repo.add("r1--EG_gone", "r1", RecordingStatus::Active);

    let sweep = StaleRecordingSweep::new(repo.clone(), media.clone(), GRACE);
    let report = sweep.run_once().await.unwrap();

    assert_eq!(report.aborted, 1);
    assert_eq!(repo.status_of("r1--EG_gone"), RecordingStatus::Aborted);
    // Nothing to stop: there was no egress.
    assert!(media.stopped().is_empty());
}

#[tokio::test]
async fn recording_with_fresh_egress_is_kept() {
    let media = Arc::new(FakeMediaServer::default());
    media.add_room("r1", 1, 1);
    media.add_egress("EG_1", "r1", chrono::Utc::now());
    let repo = Arc::new(FakeRepo::default());
    repo.add("r1--EG_1", "r1", RecordingStatus::Active);

    let sweep = StaleRecordingSweep::new(repo.clone(), media, GRACE);
    let report = sweep.run_once().await.unwrap();

    assert_eq!(report.kept, 1);
    assert_eq!(repo.status_of("r1--EG_1"), RecordingStatus::Active);
}

#[tokio::test]
async fn stale_egress_in_abandoned_room_is_aborted_and_stopped() {
    let media = Arc::new(FakeMediaServer::default());
    // Room is gone entirely; egress has been idle for an hour.
    media.add_egress("EG_1", "r1", chrono::Utc::now() - chrono::Duration::hours(1));
    let repo = Arc::new(FakeRepo::default());
    repo.add("r1--EG_1", "r1", RecordingStatus::Ending);

    let sweep = StaleRecordingSweep::new(repo.clone(), media.clone(), GRACE);
    let report = sweep.run_once().await.unwrap();

    assert_eq!(report.aborted, 1);
    assert_eq!(repo.status_of("r1--EG_1"), RecordingStatus::Aborted);
    assert_eq!(media.stopped(), ["EG_1"]);
}

#[tokio::test]
async fn stale_egress_in_a_live_meeting_is_kept() {
    let media = Arc::new(FakeMediaServer::default());
    media.add_room("r1", 1, 2);
    // Idle past the grace period, but the room still has participants: an
    // egress can be legitimately quiet, so age alone is not enough.
    media.add_egress("EG_1", "r1", chrono::Utc::now() - chrono::Duration::hours(1));
    let repo = Arc::new(FakeRepo::default());
    repo.add("r1--EG_1", "r1", RecordingStatus::Active);

    let sweep = StaleRecordingSweep::new(repo.clone(), media.clone(), GRACE);
    let report = sweep.run_once().await.unwrap();

    assert_eq!(report.kept, 1);
    assert_eq!(repo.status_of("r1--EG_1"), RecordingStatus::Active);
    assert!(media.stopped().is_empty());
}

#[tokio::test]
async fn terminal_recordings_are_not_even_examined() {
    let media = Arc::new(FakeMediaServer::default());
    let repo = Arc::new(FakeRepo::default());
    repo.add("r1--EG_1", "r1", RecordingStatus::Complete);
    repo.add("r2--EG_2", "r2", RecordingStatus::Aborted);

    let sweep = StaleRecordingSweep::new(repo.clone(), media, GRACE);
    let report = sweep.run_once().await.unwrap();

    assert_eq!(report.examined, 0);
}
