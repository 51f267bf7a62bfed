//! LiveKit Twirp client.
//!
//! Talks to the `RoomService` and `Egress` Twirp services over plain HTTP
//! with [`reqwest`]. Every request carries a short-lived HS256 access token
//! signed with the API key/secret, with the video grants the status calls
//! need (`roomList`, `roomRecord`).

use async_trait::async_trait;
use jsonwebtoken::{encode, EncodingKey, Header};
use meethub_core::types::Timestamp;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::{EgressSummary, MediaError, MediaServer, RoomSummary};

/// Access token lifetime. Tokens are minted per request, so this only needs
/// to cover clock skew plus the request itself.
const TOKEN_TTL_SECS: i64 = 600;

/// Egress statuses that count as "in progress".
const IN_PROGRESS_STATUSES: [&str; 2] = ["EGRESS_STARTING", "EGRESS_ACTIVE"];

/// HTTP client for one LiveKit deployment.
pub struct LiveKitClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    api_secret: String,
}

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    sub: &'a str,
    nbf: i64,
    exp: i64,
    video: VideoGrant,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VideoGrant {
    room_list: bool,
    room_record: bool,
}

#[derive(Debug, Default, Deserialize)]
struct ListRoomsResponse {
    #[serde(default)]
    rooms: Vec<LkRoom>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LkRoom {
    name: String,
    #[serde(default)]
    num_publishers: u32,
    #[serde(default)]
    num_participants: u32,
}

#[derive(Debug, Default, Deserialize)]
struct ListEgressResponse {
    #[serde(default)]
    items: Vec<LkEgress>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LkEgress {
    egress_id: String,
    #[serde(default)]
    room_name: String,
    #[serde(default)]
    status: String,
    /// Nanoseconds since the epoch; Twirp serializes int64 as a JSON
    /// string, but some gateways emit a number, so accept both.
    #[serde(default)]
    updated_at: Option<serde_json::Value>,
}

impl LkEgress {
    fn updated_at(&self) -> Timestamp {
        let nanos = self
            .updated_at
            .as_ref()
            .and_then(|v| match v {
                serde_json::Value::String(s) => s.parse::<i64>().ok(),
                other => other.as_i64(),
            })
            .unwrap_or_default();
        chrono::DateTime::from_timestamp_nanos(nanos)
    }
}

impl LiveKitClient {
    /// Create a client for a LiveKit deployment.
    ///
    /// * `base_url` - HTTP base URL, e.g. `http://host:7880`.
    pub fn new(base_url: String, api_key: String, api_secret: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            api_secret,
        }
    }

    fn access_token(&self) -> Result<String, MediaError> {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            iss: &self.api_key,
            sub: "meethub-coordination",
            nbf: now,
            exp: now + TOKEN_TTL_SECS,
            video: VideoGrant {
                room_list: true,
                room_record: true,
            },
        };
        Ok(encode(
            &Header::default(), // HS256
            &claims,
            &EncodingKey::from_secret(self.api_secret.as_bytes()),
        )?)
    }

    async fn twirp<Req, Resp>(
        &self,
        service: &str,
        method: &str,
        body: &Req,
    ) -> Result<Resp, MediaError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let token = self.access_token()?;
        let response = self
            .http
            .post(format!("{}/twirp/{service}/{method}", self.base_url))
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(MediaError::Api {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(response.json().await?)
    }

    async fn list_rooms(&self, room_id: &str) -> Result<Vec<LkRoom>, MediaError> {
        let response: ListRoomsResponse = self
            .twirp(
                "livekit.RoomService",
                "ListRooms",
                &serde_json::json!({ "names": [room_id] }),
            )
            .await?;
        Ok(response.rooms)
    }
}

#[async_trait]
impl MediaServer for LiveKitClient {
    async fn room_exists(&self, room_id: &str) -> Result<bool, MediaError> {
        Ok(!self.list_rooms(room_id).await?.is_empty())
    }

    async fn get_room(&self, room_id: &str) -> Result<Option<RoomSummary>, MediaError> {
        Ok(self
            .list_rooms(room_id)
            .await?
            .into_iter()
            .find(|r| r.name == room_id)
            .map(|r| RoomSummary {
                room_id: r.name,
                num_publishers: r.num_publishers,
                num_participants: r.num_participants,
            }))
    }

    async fn room_has_participants(&self, room_id: &str) -> Result<bool, MediaError> {
        Ok(self
            .get_room(room_id)
            .await?
            .is_some_and(|r| r.num_participants > 0))
    }

    async fn in_progress_egresses(
        &self,
        room_id: &str,
    ) -> Result<Vec<EgressSummary>, MediaError> {
        let response: ListEgressResponse = self
            .twirp(
                "livekit.Egress",
                "ListEgress",
                &serde_json::json!({ "roomName": room_id, "active": true }),
            )
            .await?;
        Ok(response
            .items
            .into_iter()
            .filter(|e| IN_PROGRESS_STATUSES.contains(&e.status.as_str()))
            .map(|e| EgressSummary {
                updated_at: e.updated_at(),
                egress_id: e.egress_id,
                room_id: e.room_name,
            })
            .collect())
    }

    async fn stop_egress(&self, egress_id: &str) -> Result<(), MediaError> {
        let _: serde_json::Value = self
            .twirp(
                "livekit.Egress",
                "StopEgress",
                &serde_json::json!({ "egressId": egress_id }),
            )
            .await?;
        tracing::info!(egress_id, "Requested egress stop");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{decode, DecodingKey, Validation};

    // -- access tokens --------------------------------------------------------

    #[derive(Debug, Deserialize)]
    struct DecodedClaims {
        iss: String,
        exp: i64,
        video: DecodedGrant,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct DecodedGrant {
        room_list: bool,
        room_record: bool,
    }

    #[test]
    fn access_token_carries_key_and_grants() {
        let client = LiveKitClient::new(
            "http://localhost:7880".into(),
            "api-key".into(),
            "api-secret".into(),
        );
        let token = client.access_token().unwrap();

        let mut validation = Validation::default();
        validation.set_required_spec_claims(&["exp"]);
        let decoded = decode::<DecodedClaims>(
            &token,
            &DecodingKey::from_secret(b"api-secret"),
            &validation,
        )
        .unwrap();

        assert_eq!(decoded.claims.iss, "api-key");
        assert!(decoded.claims.exp > chrono::Utc::now().timestamp());
        assert!(decoded.claims.video.room_list);
        assert!(decoded.claims.video.room_record);
    }

    // -- response parsing -----------------------------------------------------

    #[test]
    fn list_egress_response_parses_and_filters() {
        let raw = serde_json::json!({
            "items": [
                {
                    "egressId": "EG_aaa",
                    "roomName": "room-1",
                    "status": "EGRESS_ACTIVE",
                    "updatedAt": "1700000000000000000"
                },
                {
                    "egressId": "EG_bbb",
                    "roomName": "room-1",
                    "status": "EGRESS_COMPLETE",
                    "updatedAt": 1700000000000000000_i64
                }
            ]
        });
        let response: ListEgressResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(response.items.len(), 2);

        let in_progress: Vec<_> = response
            .items
            .iter()
            .filter(|e| IN_PROGRESS_STATUSES.contains(&e.status.as_str()))
            .collect();
        assert_eq!(in_progress.len(), 1);
        assert_eq!(in_progress[0].egress_id, "EG_aaa");
        assert_eq!(
            in_progress[0].updated_at().timestamp(),
            1_700_000_000
        );
    }

    #[test]
    fn missing_updated_at_defaults_to_epoch() {
        let raw = serde_json::json!({ "egressId": "EG_x" });
        let egress: LkEgress = serde_json::from_value(raw).unwrap();
        assert_eq!(egress.updated_at().timestamp(), 0);
    }

    #[test]
    fn empty_room_list_parses() {
        let response: ListRoomsResponse = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(response.rooms.is_empty());
    }
}
