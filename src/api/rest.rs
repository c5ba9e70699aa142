// reqwest-backed implementation of the ChatGateway boundary.

use async_trait::async_trait;
use log::{debug, error, warn};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Mutex;

use super::{
    ApiError, ChatGateway, MessagePage, OutgoingMessage, RoomSummary, ToggleResponse, WireMessage,
};
use crate::session::{self, Session};

pub struct RestGateway {
    base_url: String,
    http: reqwest::Client,
    session: Mutex<Option<Session>>,
}

impl RestGateway {
    pub fn new(base_url: impl Into<String>, session: Option<Session>) -> Self {
        RestGateway {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
            session: Mutex::new(session),
        }
    }

    /// Build a gateway from the persisted session file, if any.
    pub fn from_saved_session(base_url: impl Into<String>) -> anyhow::Result<Self> {
        let session = session::load_session()?;
        Ok(Self::new(base_url, session))
    }

    pub fn sender_id(&self) -> Option<String> {
        self.session
            .lock()
            .ok()
            .and_then(|guard| guard.as_ref().and_then(Session::sender_id))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Attach the bearer token when a session exists.
    ///
    /// No session is not an error here: the request goes out without an
    /// Authorization header and the server answers 401 where auth is
    /// required.
    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        let header = self
            .session
            .lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(Session::bearer_header));
        match header {
            Some(value) => builder.header(reqwest::header::AUTHORIZATION, value),
            None => builder,
        }
    }

    /// Tear down the session after the server rejected our token.
    fn handle_unauthorized(&self) {
        warn!("Received 401 from server, clearing session");
        if let Ok(mut guard) = self.session.lock() {
            *guard = None;
        }
        if let Err(e) = session::clear_session() {
            error!("Failed to clear persisted session: {}", e);
        }
    }

    async fn check(&self, response: Response) -> Result<Response, ApiError> {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            self.handle_unauthorized();
            return Err(ApiError::Unauthorized);
        }
        if !status.is_success() {
            // Pull a human-readable message out of the error body when
            // the server provides one.
            let message = response
                .json::<serde_json::Value>()
                .await
                .ok()
                .and_then(|body| {
                    body.get("message")
                        .and_then(|m| m.as_str())
                        .map(String::from)
                })
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string());
            return Err(ApiError::Status {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        debug!("GET {}", path);
        let response = self.authorized(self.http.get(self.url(path))).send().await?;
        self.check(response)
            .await?
            .json::<T>()
            .await
            .map_err(|e| ApiError::Malformed(e.to_string()))
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, ApiError> {
        debug!("POST {}", path);
        let response = self
            .authorized(self.http.post(self.url(path)).json(body))
            .send()
            .await?;
        self.check(response)
            .await?
            .json::<T>()
            .await
            .map_err(|e| ApiError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl ChatGateway for RestGateway {
    async fn get_chat_rooms(&self) -> Result<Vec<RoomSummary>, ApiError> {
        self.get_json("/chat/rooms").await
    }

    async fn get_chat_messages(
        &self,
        room_id: &str,
        page: u32,
        size: u32,
    ) -> Result<MessagePage, ApiError> {
        self.get_json(&format!(
            "/chat/rooms/{}/messages?page={}&size={}",
            room_id, page, size
        ))
        .await
    }

    async fn send_message(&self, message: &OutgoingMessage) -> Result<WireMessage, ApiError> {
        let body = serde_json::to_value(message)
            .map_err(|e| ApiError::Malformed(e.to_string()))?;
        self.post_json("/chat/messages", &body).await
    }

    async fn mark_read(&self, room_id: &str) -> Result<(), ApiError> {
        let response = self
            .authorized(
                self.http
                    .post(self.url(&format!("/chat/rooms/{}/read", room_id)))
                    .json(&serde_json::json!({})),
            )
            .send()
            .await?;
        self.check(response).await?;
        Ok(())
    }

    async fn create_or_get_room(&self, user_id: &str) -> Result<RoomSummary, ApiError> {
        self.post_json("/chat/rooms", &serde_json::json!({ "userId": user_id }))
            .await
    }

    async fn unread_count(&self) -> Result<u32, ApiError> {
        self.get_json("/chat/unread").await
    }

    async fn toggle_like(&self, post_id: &str) -> Result<ToggleResponse, ApiError> {
        self.post_json(
            &format!("/posts/{}/like", post_id),
            &serde_json::json!({}),
        )
        .await
    }

    async fn toggle_bookmark(&self, post_id: &str) -> Result<ToggleResponse, ApiError> {
        self.post_json(
            &format!("/posts/{}/bookmark", post_id),
            &serde_json::json!({}),
        )
        .await
    }
}
