//! Room creation over HTTP.

use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use voca_common::{ErrorCode, Result, VocaError};

use crate::endpoint;

const CREATE_FAILED: &str = "Failed to create room";

/// A room the server just allocated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedRoom {
    pub room: String,
    /// Present when the room is password protected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FailureBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// `POST {http_base}/api/room`, sending the API key as `x-api-key`.
///
/// A non-success response becomes an error carrying the server's `error`
/// code and `message` when the body has them.
pub async fn request_room(
    http: &reqwest::Client,
    http_base: &str,
    api_key: Option<&str>,
    password: Option<&str>,
) -> Result<CreatedRoom> {
    let url = endpoint::room_creation_url(http_base, password);
    debug!(server = %http_base, protected = password.is_some(), "Creating room");

    let mut request = http.post(&url).header(CONTENT_TYPE, "application/json");
    if let Some(key) = api_key {
        request = request.header("x-api-key", key);
    }

    let response = request.send().await.map_err(|e| {
        warn!(error = %e, "Room creation request failed");
        VocaError::with_message(ErrorCode::ConnectionFailed, format!("{CREATE_FAILED}: {e}"))
    })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let failure = serde_json::from_str::<FailureBody>(&body).ok();
        let code = failure
            .as_ref()
            .and_then(|f| f.error.as_deref())
            .map_or(ErrorCode::ConnectionFailed, ErrorCode::from);
        let message = failure
            .and_then(|f| f.message)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| CREATE_FAILED.to_string());
        warn!(%status, code = %code, "Room creation rejected");
        return Err(VocaError::with_message(code, message));
    }

    let created: CreatedRoom = response.json().await.map_err(|e| {
        VocaError::with_message(
            ErrorCode::ConnectionFailed,
            format!("invalid room creation response: {e}"),
        )
    })?;
    info!(room_id = %created.room, "Room created");
    Ok(created)
}
