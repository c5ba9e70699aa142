use chrono::{DateTime, Utc};

/// Identity of a message as shown to consumers.
///
/// A freshly sent message only has a client-generated provisional id;
/// once the server confirms the send, the id is replaced with the
/// server-assigned one. The swap is keyed by `Message::local_key`, not
/// by this display id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageId {
    Provisional(u64),
    Confirmed(String),
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageId::Provisional(n) => write!(f, "tmp-{}", n),
            MessageId::Confirmed(s) => write!(f, "{}", s),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum DeliveryStatus {
    Pending, // Created locally, network send not yet resolved
    Sent,    // Confirmed by the server, id replaced with server id
    Failed,  // Send failed; may be resent
}

#[derive(Debug, Clone)]
pub struct Message {
    /// Stable session-local key; never changes across the
    /// provisional-to-confirmed swap.
    pub local_key: u64,
    pub id: MessageId,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub read: bool,
    pub status: DeliveryStatus,
    pub room_id: String,
}

/// A conversation between two identities.
///
/// Rooms are server-owned: the client creates and updates its local view
/// but never deletes one.
#[derive(Debug, Clone)]
pub struct ChatRoom {
    pub id: String,
    pub other_user_id: String,
    pub other_user_nickname: String,
    pub last_message: String,
    pub last_message_time: DateTime<Utc>,
    pub unread_count: u32,
    pub online: bool,
    pub profile_image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingSignal {
    pub room_id: String,
    pub user_id: String,
    pub active: bool,
}

/// Events dispatched to registered subscribers.
#[derive(Debug, Clone)]
pub enum ChatEvent {
    Message(Message),
    Typing(TypingSignal),
    Read { room_id: String },
    Status { user_id: String, online: bool },
}

/// Derive the room id for a pair of participants.
///
/// The id is the sorted pair joined with '_' so both sides compute the
/// same value regardless of who sends first.
pub fn derive_room_id(a: &str, b: &str) -> String {
    let mut pair = [a, b];
    pair.sort_unstable();
    format!("{}_{}", pair[0], pair[1])
}
