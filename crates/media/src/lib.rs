//! Media-server status interface and its LiveKit implementation.
//!
//! The coordination layer never infers room or egress state from local
//! records: the media server is the remote authority, consumed through the
//! narrow [`MediaServer`] trait. [`LiveKitClient`] implements it over
//! LiveKit's Twirp HTTP API.

mod livekit;

use async_trait::async_trait;
use meethub_core::types::Timestamp;

pub use livekit::LiveKitClient;

/// Snapshot of a live room.
#[derive(Debug, Clone)]
pub struct RoomSummary {
    pub room_id: String,
    /// Participants currently publishing audio/video.
    pub num_publishers: u32,
    /// All connected participants, publishing or not.
    pub num_participants: u32,
}

/// Snapshot of an in-progress recording egress.
#[derive(Debug, Clone)]
pub struct EgressSummary {
    pub egress_id: String,
    pub room_id: String,
    /// Last time the media server updated this egress.
    pub updated_at: Timestamp,
}

/// Errors from the media-server client.
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The media server returned a non-2xx status code.
    #[error("media server API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// Minting the API access token failed.
    #[error("failed to mint access token: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}

/// Remote authority for room and egress state.
#[async_trait]
pub trait MediaServer: Send + Sync {
    /// Whether a room with this id currently exists on the media server.
    async fn room_exists(&self, room_id: &str) -> Result<bool, MediaError>;

    /// Room snapshot, or `None` when the room does not exist.
    async fn get_room(&self, room_id: &str) -> Result<Option<RoomSummary>, MediaError>;

    /// Whether the room exists and has at least one connected participant.
    async fn room_has_participants(&self, room_id: &str) -> Result<bool, MediaError>;

    /// Egresses currently starting or active for this room.
    async fn in_progress_egresses(&self, room_id: &str)
        -> Result<Vec<EgressSummary>, MediaError>;

    /// Ask the media server to stop an egress.
    async fn stop_egress(&self, egress_id: &str) -> Result<(), MediaError>;
}
