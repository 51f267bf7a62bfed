//! HTTP client for the control-plane recordings API.
//!
//! The worker has no database of its own; recording metadata is read and
//! updated through the internal endpoints the API exposes for exactly this
//! purpose.

use async_trait::async_trait;
use meethub_core::recording::{
    RecordingInfo, RecordingRepository, RecordingStatus, RepositoryError,
};
use serde::Serialize;

#[derive(Serialize)]
struct StatusUpdate {
    status: RecordingStatus,
}

/// [`RecordingRepository`] over the control-plane API's internal endpoints.
pub struct HttpRecordingRepository {
    http: reqwest::Client,
    base_url: String,
}

impl HttpRecordingRepository {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

fn unavailable(e: reqwest::Error) -> RepositoryError {
    RepositoryError::Unavailable(e.to_string())
}

#[async_trait]
impl RecordingRepository for HttpRecordingRepository {
    async fn find_active(&self) -> Result<Vec<RecordingInfo>, RepositoryError> {
        let url = format!("{}/internal/recordings/active", self.base_url);
        let response = self.http.get(&url).send().await.map_err(unavailable)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RepositoryError::Unavailable(format!(
                "GET {url} returned {status}: {body}"
            )));
        }
        response.json().await.map_err(unavailable)
    }

    async fn update_status(
        &self,
        recording_id: &str,
        status: RecordingStatus,
    ) -> Result<(), RepositoryError> {
        let url = format!("{}/internal/recordings/{recording_id}/status", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&StatusUpdate { status })
            .send()
            .await
            .map_err(unavailable)?;

        let http_status = response.status();
        if http_status == reqwest::StatusCode::NOT_FOUND {
            return Err(RepositoryError::NotFound {
                recording_id: recording_id.to_string(),
            });
        }
        if !http_status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RepositoryError::Unavailable(format!(
                "POST {url} returned {http_status}: {body}"
            )));
        }
        Ok(())
    }
}
