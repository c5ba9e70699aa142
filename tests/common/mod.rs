// Shared test utilities: a scriptable in-memory gateway plus builders
// for rooms and wire messages.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use chatpulse::api::{
    ApiError, ChatGateway, MessagePage, OutgoingMessage, RoomSummary, ToggleResponse, WireMessage,
};

/// Scripted outcome for a toggle call, with an artificial resolution
/// delay so tests can order racing responses under a paused clock.
pub struct ScriptedToggle {
    pub delay: Duration,
    pub result: Result<ToggleResponse, ()>,
}

#[derive(Default)]
pub struct MockGateway {
    pub rooms: Mutex<Vec<RoomSummary>>,
    /// Newest message per room id, returned for page 0 size 1.
    pub newest: Mutex<HashMap<String, WireMessage>>,
    /// Per-call room fetch outcomes; empty queue means success.
    pub room_failures: Mutex<VecDeque<bool>>,
    /// Per-call message fetch outcomes; empty queue means success.
    pub message_failures: Mutex<VecDeque<bool>>,
    /// Per-call send outcomes; empty queue means success.
    pub send_failures: Mutex<VecDeque<bool>>,
    /// Artificial latency applied to sends.
    pub send_delay: Mutex<Duration>,
    pub toggle_script: Mutex<VecDeque<ScriptedToggle>>,
    pub send_calls: AtomicU64,
    server_ids: AtomicU64,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_rooms(&self, rooms: Vec<RoomSummary>) {
        *self.rooms.lock().unwrap() = rooms;
    }

    pub fn set_newest(&self, room_id: &str, message: WireMessage) {
        self.newest
            .lock()
            .unwrap()
            .insert(room_id.to_string(), message);
    }

    pub fn fail_next_room_fetch(&self) {
        self.room_failures.lock().unwrap().push_back(true);
    }

    pub fn fail_next_message_fetch(&self) {
        self.message_failures.lock().unwrap().push_back(true);
    }

    pub fn fail_next_send(&self) {
        self.send_failures.lock().unwrap().push_back(true);
    }

    pub fn set_send_delay(&self, delay: Duration) {
        *self.send_delay.lock().unwrap() = delay;
    }

    pub fn script_toggle(&self, delay: Duration, result: Result<ToggleResponse, ()>) {
        self.toggle_script
            .lock()
            .unwrap()
            .push_back(ScriptedToggle { delay, result });
    }

    async fn scripted_toggle(&self) -> Result<ToggleResponse, ApiError> {
        let scripted = self.toggle_script.lock().unwrap().pop_front();
        match scripted {
            Some(ScriptedToggle { delay, result }) => {
                tokio::time::sleep(delay).await;
                result.map_err(|_| ApiError::Status {
                    status: 500,
                    message: "scripted failure".to_string(),
                })
            }
            None => Ok(ToggleResponse::default()),
        }
    }
}

#[async_trait]
impl ChatGateway for MockGateway {
    async fn get_chat_rooms(&self) -> Result<Vec<RoomSummary>, ApiError> {
        let fail = self
            .room_failures
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(false);
        if fail {
            return Err(ApiError::Status {
                status: 503,
                message: "scripted room failure".to_string(),
            });
        }
        Ok(self.rooms.lock().unwrap().clone())
    }

    async fn get_chat_messages(
        &self,
        room_id: &str,
        _page: u32,
        _size: u32,
    ) -> Result<MessagePage, ApiError> {
        let fail = self
            .message_failures
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(false);
        if fail {
            return Err(ApiError::Status {
                status: 503,
                message: "scripted message failure".to_string(),
            });
        }
        let content = self
            .newest
            .lock()
            .unwrap()
            .get(room_id)
            .cloned()
            .into_iter()
            .collect();
        Ok(MessagePage {
            content,
            last: true,
        })
    }

    async fn send_message(&self, message: &OutgoingMessage) -> Result<WireMessage, ApiError> {
        self.send_calls.fetch_add(1, Ordering::Relaxed);
        let delay = *self.send_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let fail = self
            .send_failures
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(false);
        if fail {
            return Err(ApiError::Status {
                status: 500,
                message: "scripted send failure".to_string(),
            });
        }

        Ok(WireMessage {
            id: format!("srv-{}", self.server_ids.fetch_add(1, Ordering::Relaxed) + 1),
            sender_id: message.sender_id.clone(),
            receiver_id: message.receiver_id.clone(),
            content: message.content.clone(),
            timestamp: message.timestamp + chrono::Duration::milliseconds(1),
            read: false,
            chat_room_id: message.chat_room_id.clone(),
        })
    }

    async fn mark_read(&self, _room_id: &str) -> Result<(), ApiError> {
        Ok(())
    }

    async fn create_or_get_room(&self, user_id: &str) -> Result<RoomSummary, ApiError> {
        Ok(room(&format!("me_{}", user_id), user_id, Utc::now()))
    }

    async fn unread_count(&self) -> Result<u32, ApiError> {
        Ok(0)
    }

    async fn toggle_like(&self, _post_id: &str) -> Result<ToggleResponse, ApiError> {
        self.scripted_toggle().await
    }

    async fn toggle_bookmark(&self, _post_id: &str) -> Result<ToggleResponse, ApiError> {
        self.scripted_toggle().await
    }
}

pub fn room(id: &str, other_user: &str, last_message_time: DateTime<Utc>) -> RoomSummary {
    RoomSummary {
        id: id.to_string(),
        other_user_id: other_user.to_string(),
        other_user_nickname: other_user.to_string(),
        last_message: String::new(),
        last_message_time,
        unread_count: 0,
        online: false,
        profile_image: None,
    }
}

pub fn wire(
    id: &str,
    sender: &str,
    receiver: &str,
    content: &str,
    timestamp: DateTime<Utc>,
    room_id: &str,
) -> WireMessage {
    WireMessage {
        id: id.to_string(),
        sender_id: sender.to_string(),
        receiver_id: receiver.to_string(),
        content: content.to_string(),
        timestamp,
        read: false,
        chat_room_id: room_id.to_string(),
    }
}
