// Provisional message send pipeline.
//
// A send inserts a pending entry into the room's message list before
// the network call goes out, then settles that same entry (matched by
// its stable local key) to sent or failed once the call resolves.

use anyhow::{anyhow, Result};
use chrono::Utc;
use log::{error, info};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use super::store::ChatStore;
use super::Subscribers;
use crate::api::{ChatGateway, OutgoingMessage, WireMessage};
use crate::models::{derive_room_id, ChatEvent, DeliveryStatus, Message, MessageId};

pub struct SendPipeline {
    gateway: Arc<dyn ChatGateway>,
    store: Arc<Mutex<ChatStore>>,
    subscribers: Arc<Subscribers>,
    local_keys: Arc<AtomicU64>,
    sender_id: String,
}

impl SendPipeline {
    pub(crate) fn new(
        gateway: Arc<dyn ChatGateway>,
        store: Arc<Mutex<ChatStore>>,
        subscribers: Arc<Subscribers>,
        local_keys: Arc<AtomicU64>,
        sender_id: &str,
    ) -> Self {
        SendPipeline {
            gateway,
            store,
            subscribers,
            local_keys,
            sender_id: sender_id.to_string(),
        }
    }

    /// Send a message. The provisional entry is visible in the store
    /// before the network call resolves; the returned message carries
    /// the settled state.
    ///
    /// Concurrent sends each hold their own local key, so one failing
    /// leaves the others untouched.
    pub async fn send(&self, receiver_id: &str, content: &str) -> Message {
        let local_key = self.local_keys.fetch_add(1, Ordering::Relaxed);
        let room_id = derive_room_id(&self.sender_id, receiver_id);
        let timestamp = Utc::now();

        let provisional = Message {
            local_key,
            id: MessageId::Provisional(local_key),
            sender_id: self.sender_id.clone(),
            receiver_id: receiver_id.to_string(),
            content: content.to_string(),
            timestamp,
            read: false,
            status: DeliveryStatus::Pending,
            room_id: room_id.clone(),
        };

        {
            let mut store = self.store.lock().unwrap();
            store.insert_message(provisional.clone());
            store.record_outbound(&room_id, receiver_id, content, timestamp);
        }
        self.subscribers.emit(&ChatEvent::Message(provisional.clone()));

        info!("Sending message {} to {}", provisional.id, receiver_id);
        self.transmit(&provisional).await
    }

    /// Retry a failed message against the same local key.
    pub async fn resend(&self, room_id: &str, local_key: u64) -> Result<Message> {
        let message = {
            let store = self.store.lock().unwrap();
            store
                .message(room_id, local_key)
                .ok_or_else(|| anyhow!("No message with key {} in {}", local_key, room_id))?
        };
        if message.status != DeliveryStatus::Failed {
            return Err(anyhow!(
                "Message {} is {:?}, only failed messages can be resent",
                message.id,
                message.status
            ));
        }

        self.store
            .lock()
            .unwrap()
            .set_status(room_id, local_key, DeliveryStatus::Pending);
        let mut pending = message;
        pending.status = DeliveryStatus::Pending;
        self.subscribers.emit(&ChatEvent::Message(pending.clone()));

        info!("Resending message {}", pending.id);
        Ok(self.transmit(&pending).await)
    }

    /// Network step shared by send and resend: issue the request, then
    /// settle the provisional entry in place.
    async fn transmit(&self, message: &Message) -> Message {
        let outgoing = OutgoingMessage {
            sender_id: message.sender_id.clone(),
            receiver_id: message.receiver_id.clone(),
            content: message.content.clone(),
            chat_room_id: message.room_id.clone(),
            timestamp: message.timestamp,
            read: false,
            message_type: "TEXT".to_string(),
        };

        match self.gateway.send_message(&outgoing).await {
            Ok(wire) => {
                self.store
                    .lock()
                    .unwrap()
                    .confirm_message(&message.room_id, message.local_key, &wire);
            }
            Err(e) => {
                error!("Failed to send message {}: {}", message.id, e);
                self.store
                    .lock()
                    .unwrap()
                    .set_status(&message.room_id, message.local_key, DeliveryStatus::Failed);
            }
        }

        let settled = self
            .store
            .lock()
            .unwrap()
            .message(&message.room_id, message.local_key)
            .unwrap_or_else(|| message.clone());
        self.subscribers.emit(&ChatEvent::Message(settled.clone()));
        settled
    }
}

/// Build a local message from its wire form, assigning a fresh local key.
pub(crate) fn message_from_wire(wire: &WireMessage, local_keys: &Arc<AtomicU64>) -> Message {
    Message {
        local_key: local_keys.fetch_add(1, Ordering::Relaxed),
        id: MessageId::Confirmed(wire.id.clone()),
        sender_id: wire.sender_id.clone(),
        receiver_id: wire.receiver_id.clone(),
        content: wire.content.clone(),
        timestamp: wire.timestamp,
        read: wire.read,
        status: DeliveryStatus::Sent,
        room_id: wire.chat_room_id.clone(),
    }
}
