//! Recording lifecycle types and the repository seam.
//!
//! The recording metadata itself is owned by the persistence layer of the
//! control-plane API; this crate only defines the status state machine and
//! the narrow [`RecordingRepository`] interface the stale-recording sweep
//! consumes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a recording.
///
/// `Active` and `Ending` are the non-terminal statuses the reconciler
/// watches; everything else is terminal from its point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordingStatus {
    Starting,
    Active,
    Ending,
    Complete,
    Failed,
    Aborted,
}

impl RecordingStatus {
    /// Returns the set of statuses reachable from `self`.
    ///
    /// `Aborted` is reachable from every non-terminal status because the
    /// reconciler may abandon a recording at any point of its lifecycle.
    pub fn valid_transitions(self) -> &'static [RecordingStatus] {
        use RecordingStatus::*;
        match self {
            Starting => &[Active, Failed, Aborted],
            Active => &[Ending, Failed, Aborted],
            Ending => &[Complete, Failed, Aborted],
            // Terminal states.
            Complete | Failed | Aborted => &[],
        }
    }

    /// Check whether a transition from `self` to `to` is valid.
    pub fn can_transition(self, to: RecordingStatus) -> bool {
        self.valid_transitions().contains(&to)
    }

    /// True for statuses the stale-recording sweep has to inspect.
    pub fn is_reconcilable(self) -> bool {
        matches!(self, RecordingStatus::Active | RecordingStatus::Ending)
    }
}

impl std::fmt::Display for RecordingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RecordingStatus::Starting => "STARTING",
            RecordingStatus::Active => "ACTIVE",
            RecordingStatus::Ending => "ENDING",
            RecordingStatus::Complete => "COMPLETE",
            RecordingStatus::Failed => "FAILED",
            RecordingStatus::Aborted => "ABORTED",
        };
        f.write_str(name)
    }
}

/// Minimal view of a recording as the reconciler sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingInfo {
    /// Repository identifier, conventionally `"{room_id}--{egress_id}"`.
    pub recording_id: String,
    /// Room the recording belongs to.
    pub room_id: String,
    /// Media-server egress backing this recording, when known explicitly.
    pub egress_id: Option<String>,
    /// Current lifecycle status.
    pub status: RecordingStatus,
}

impl RecordingInfo {
    /// The egress id backing this recording.
    ///
    /// Falls back to the second `--`-separated segment of `recording_id`
    /// when the explicit field is absent.
    pub fn egress_id(&self) -> Option<&str> {
        if let Some(id) = self.egress_id.as_deref() {
            return Some(id);
        }
        let mut segments = self.recording_id.split("--");
        segments.next()?;
        segments.next().filter(|s| !s.is_empty())
    }
}

/// Errors from a recording repository implementation.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// The repository could not be reached or answered abnormally.
    #[error("recording repository unavailable: {0}")]
    Unavailable(String),

    /// No recording exists with the given id.
    #[error("recording not found: {recording_id}")]
    NotFound { recording_id: String },
}

/// Narrow repository interface consumed by the stale-recording sweep.
///
/// The concrete implementation lives with the persistence layer; tests use
/// an in-memory fake.
#[async_trait]
pub trait RecordingRepository: Send + Sync {
    /// All recordings currently in `Active` or `Ending` status.
    async fn find_active(&self) -> Result<Vec<RecordingInfo>, RepositoryError>;

    /// Update the status of a single recording.
    async fn update_status(
        &self,
        recording_id: &str,
        status: RecordingStatus,
    ) -> Result<(), RepositoryError>;
}
