// Local view of the server-owned chat state: the room list plus one
// message list per room. All mutation goes through &mut self, and every
// caller holds the store behind a single Mutex, so each update is
// atomic from the perspective of one callback turn.

use chrono::{DateTime, Utc};
use log::debug;
use std::collections::HashMap;

use crate::api::{RoomSummary, WireMessage};
use crate::models::{ChatRoom, DeliveryStatus, Message, MessageId};

#[derive(Default)]
pub struct ChatStore {
    rooms: Vec<ChatRoom>,
    messages: HashMap<String, Vec<Message>>,
}

impl ChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rooms, sorted by last message time descending.
    pub fn rooms(&self) -> Vec<ChatRoom> {
        self.rooms.clone()
    }

    /// Messages of one room in display order (timestamp ascending).
    pub fn messages(&self, room_id: &str) -> Vec<Message> {
        self.messages.get(room_id).cloned().unwrap_or_default()
    }

    /// Replace the room list with a fresh server snapshot.
    ///
    /// Returns the (user id, online) pairs whose online flag changed
    /// compared to the previous snapshot, so the caller can dispatch
    /// status events.
    pub fn merge_rooms(&mut self, summaries: Vec<RoomSummary>) -> Vec<(String, bool)> {
        let mut flips = Vec::new();
        let mut rooms: Vec<ChatRoom> = summaries
            .into_iter()
            .map(|summary| {
                if let Some(known) = self.rooms.iter().find(|r| r.id == summary.id) {
                    if known.online != summary.online {
                        flips.push((summary.other_user_id.clone(), summary.online));
                    }
                }
                ChatRoom {
                    id: summary.id,
                    other_user_id: summary.other_user_id,
                    other_user_nickname: summary.other_user_nickname,
                    last_message: summary.last_message,
                    last_message_time: summary.last_message_time,
                    unread_count: summary.unread_count,
                    online: summary.online,
                    profile_image: summary.profile_image,
                }
            })
            .collect();
        rooms.sort_by(|a, b| b.last_message_time.cmp(&a.last_message_time));
        self.rooms = rooms;
        flips
    }

    /// Insert a message at its timestamp position within the room list.
    ///
    /// Duplicate local keys are rejected: exactly one entry per key.
    pub fn insert_message(&mut self, message: Message) {
        let list = self.messages.entry(message.room_id.clone()).or_default();
        if list.iter().any(|m| m.local_key == message.local_key) {
            debug!("Ignoring duplicate message key {}", message.local_key);
            return;
        }
        let position = list
            .iter()
            .position(|m| m.timestamp > message.timestamp)
            .unwrap_or(list.len());
        list.insert(position, message);
    }

    /// Swap a provisional entry for its server-confirmed form.
    ///
    /// The entry is matched by local key and updated in place, so the
    /// list keeps its length and the message keeps its position even
    /// when the canonical timestamp differs from the provisional one.
    pub fn confirm_message(&mut self, room_id: &str, local_key: u64, wire: &WireMessage) -> bool {
        if let Some(entry) = self.find_mut(room_id, local_key) {
            entry.id = MessageId::Confirmed(wire.id.clone());
            entry.timestamp = wire.timestamp;
            entry.read = wire.read;
            entry.status = DeliveryStatus::Sent;
            true
        } else {
            debug!("No provisional message with key {} in {}", local_key, room_id);
            false
        }
    }

    /// Transition a message's delivery status in place.
    pub fn set_status(&mut self, room_id: &str, local_key: u64, status: DeliveryStatus) -> bool {
        if let Some(entry) = self.find_mut(room_id, local_key) {
            debug!(
                "Message {} status {:?} -> {:?}",
                entry.id, entry.status, status
            );
            entry.status = status;
            true
        } else {
            false
        }
    }

    pub fn message(&self, room_id: &str, local_key: u64) -> Option<Message> {
        self.messages
            .get(room_id)?
            .iter()
            .find(|m| m.local_key == local_key)
            .cloned()
    }

    /// Refresh a room's last-message fields after an outbound send,
    /// creating a local room entry on first exchange.
    pub fn record_outbound(
        &mut self,
        room_id: &str,
        other_user_id: &str,
        content: &str,
        timestamp: DateTime<Utc>,
    ) {
        match self.rooms.iter_mut().find(|r| r.id == room_id) {
            Some(room) => {
                room.last_message = content.to_string();
                room.last_message_time = timestamp;
            }
            None => self.rooms.push(ChatRoom {
                id: room_id.to_string(),
                other_user_id: other_user_id.to_string(),
                other_user_nickname: other_user_id.to_string(),
                last_message: content.to_string(),
                last_message_time: timestamp,
                unread_count: 0,
                online: false,
                profile_image: None,
            }),
        }
        self.rooms
            .sort_by(|a, b| b.last_message_time.cmp(&a.last_message_time));
    }

    pub fn zero_unread(&mut self, room_id: &str) {
        if let Some(room) = self.rooms.iter_mut().find(|r| r.id == room_id) {
            room.unread_count = 0;
        }
    }

    fn find_mut(&mut self, room_id: &str, local_key: u64) -> Option<&mut Message> {
        self.messages
            .get_mut(room_id)?
            .iter_mut()
            .find(|m| m.local_key == local_key)
    }
}
