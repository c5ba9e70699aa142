// REST gateway boundary for the chat and interaction cores.
// The engine only ever talks to the server through the ChatGateway
// trait; the reqwest-backed implementation lives in rest.rs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod rest;

pub use rest::RestGateway;

/// Typed errors surfaced by gateway calls.
///
/// At the engine's level a 401 is handled like any other failure
/// (rollback / mark failed); session teardown happens inside the
/// gateway before the error is returned.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("authentication required")]
    Unauthorized,
    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("malformed server response: {0}")]
    Malformed(String),
}

/// Thread summary as returned by `GET /chat/rooms`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub id: String,
    pub other_user_id: String,
    pub other_user_nickname: String,
    #[serde(default)]
    pub last_message: String,
    pub last_message_time: DateTime<Utc>,
    #[serde(default)]
    pub unread_count: u32,
    #[serde(default)]
    pub online: bool,
    #[serde(default)]
    pub profile_image: Option<String>,
}

/// Server-side message representation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
    pub chat_room_id: String,
}

/// One page of a room's message history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagePage {
    #[serde(default)]
    pub content: Vec<WireMessage>,
    #[serde(default)]
    pub last: bool,
}

/// Payload for `POST /chat/messages`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub chat_room_id: String,
    pub timestamp: DateTime<Utc>,
    pub read: bool,
    #[serde(rename = "type")]
    pub message_type: String,
}

/// Response body of the like/bookmark toggle endpoints.
///
/// Both fields are optional on purpose: a partial body must fall back to
/// the locally known state instead of pushing null into the store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToggleResponse {
    #[serde(alias = "liked", alias = "bookmarked")]
    pub flag: Option<bool>,
    pub count: Option<u32>,
}

/// Boundary operations consumed by the chat and interaction cores.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    async fn get_chat_rooms(&self) -> Result<Vec<RoomSummary>, ApiError>;

    async fn get_chat_messages(
        &self,
        room_id: &str,
        page: u32,
        size: u32,
    ) -> Result<MessagePage, ApiError>;

    async fn send_message(&self, message: &OutgoingMessage) -> Result<WireMessage, ApiError>;

    async fn mark_read(&self, room_id: &str) -> Result<(), ApiError>;

    async fn create_or_get_room(&self, user_id: &str) -> Result<RoomSummary, ApiError>;

    async fn unread_count(&self) -> Result<u32, ApiError>;

    async fn toggle_like(&self, post_id: &str) -> Result<ToggleResponse, ApiError>;

    async fn toggle_bookmark(&self, post_id: &str) -> Result<ToggleResponse, ApiError>;
}
