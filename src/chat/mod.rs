// Chat client module: polling-based message delivery, the send
// pipeline, typing debounce, and the subscriber registry.
//
// The client is an instantiable service object with constructor-injected
// dependencies; there is no module-level connection state, so several
// independent clients can coexist and tear down cleanly.

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub mod pipeline;
pub mod poller;
pub mod store;
pub mod typing;

use crate::api::{ApiError, ChatGateway, RoomSummary};
use crate::models::{ChatEvent, ChatRoom, Message, MessageId, TypingSignal};
use pipeline::SendPipeline;
use poller::IntervalPoller;
use store::ChatStore;
use typing::TypingTracker;

/// Timer settings for the client. Tests shrink these.
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub poll_interval: Duration,
    pub typing_quiet_period: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        PollConfig {
            poll_interval: Duration::from_millis(5000),
            typing_quiet_period: Duration::from_millis(3000),
        }
    }
}

struct Registry<T: ?Sized> {
    next_id: u64,
    entries: Vec<(u64, Arc<T>)>,
}

impl<T: ?Sized> Default for Registry<T> {
    fn default() -> Self {
        Registry {
            next_id: 0,
            entries: Vec::new(),
        }
    }
}

impl<T: ?Sized> Registry<T> {
    fn subscribe(&mut self, callback: Arc<T>) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push((id, callback));
        id
    }

    fn unsubscribe(&mut self, id: u64) {
        self.entries.retain(|(entry_id, _)| *entry_id != id);
    }

    fn callbacks(&self) -> Vec<Arc<T>> {
        self.entries.iter().map(|(_, cb)| cb.clone()).collect()
    }
}

type MessageCallback = dyn Fn(&Message) + Send + Sync;
type TypingCallback = dyn Fn(&TypingSignal) + Send + Sync;
type ReadCallback = dyn Fn(&str) + Send + Sync;
type StatusCallback = dyn Fn(&str, bool) + Send + Sync;

/// Shared callback registries for the four event kinds.
///
/// Callbacks are snapshotted and invoked outside the lock so a callback
/// may subscribe or unsubscribe without deadlocking.
#[derive(Default)]
pub(crate) struct Subscribers {
    message: Mutex<Registry<MessageCallback>>,
    typing: Mutex<Registry<TypingCallback>>,
    read: Mutex<Registry<ReadCallback>>,
    status: Mutex<Registry<StatusCallback>>,
}

impl Subscribers {
    pub(crate) fn emit(&self, event: &ChatEvent) {
        match event {
            ChatEvent::Message(message) => {
                let callbacks = self.message.lock().unwrap().callbacks();
                for cb in callbacks {
                    cb(message);
                }
            }
            ChatEvent::Typing(signal) => {
                let callbacks = self.typing.lock().unwrap().callbacks();
                for cb in callbacks {
                    cb(signal);
                }
            }
            ChatEvent::Read { room_id } => {
                let callbacks = self.read.lock().unwrap().callbacks();
                for cb in callbacks {
                    cb(room_id);
                }
            }
            ChatEvent::Status { user_id, online } => {
                let callbacks = self.status.lock().unwrap().callbacks();
                for cb in callbacks {
                    cb(user_id, *online);
                }
            }
        }
    }
}

/// Handle returned by the `on_*` registration methods.
///
/// Calling `unsubscribe` removes exactly the callback this handle was
/// created for; other subscribers are unaffected. Dropping the handle
/// without calling it leaves the callback registered.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

pub struct ChatClient {
    gateway: Arc<dyn ChatGateway>,
    config: PollConfig,
    sender_id: String,
    store: Arc<Mutex<ChatStore>>,
    subscribers: Arc<Subscribers>,
    pipeline: SendPipeline,
    typing: TypingTracker,
    local_keys: Arc<AtomicU64>,
    poller: Mutex<Option<IntervalPoller>>,
    last_checked: Arc<Mutex<DateTime<Utc>>>,
}

impl ChatClient {
    pub fn new(gateway: Arc<dyn ChatGateway>, sender_id: &str, config: PollConfig) -> Self {
        let store = Arc::new(Mutex::new(ChatStore::new()));
        let subscribers = Arc::new(Subscribers::default());
        let local_keys = Arc::new(AtomicU64::new(1));
        let pipeline = SendPipeline::new(
            gateway.clone(),
            store.clone(),
            subscribers.clone(),
            local_keys.clone(),
            sender_id,
        );
        let typing = TypingTracker::new(
            subscribers.clone(),
            sender_id,
            config.typing_quiet_period,
        );
        ChatClient {
            gateway,
            config,
            sender_id: sender_id.to_string(),
            store,
            subscribers,
            pipeline,
            typing,
            local_keys,
            poller: Mutex::new(None),
            last_checked: Arc::new(Mutex::new(Utc::now())),
        }
    }

    /// Start polling for new messages. Idempotent: a second call while
    /// connected is a no-op.
    pub fn connect(&self) {
        let mut poller = self.poller.lock().unwrap();
        if poller.is_some() {
            debug!("connect() called while already connected");
            return;
        }

        *self.last_checked.lock().unwrap() = Utc::now();

        let gateway = self.gateway.clone();
        let store = self.store.clone();
        let subscribers = self.subscribers.clone();
        let local_keys = self.local_keys.clone();
        let last_checked = self.last_checked.clone();
        let sender_id = self.sender_id.clone();

        *poller = Some(IntervalPoller::start(self.config.poll_interval, move || {
            let gateway = gateway.clone();
            let store = store.clone();
            let subscribers = subscribers.clone();
            let local_keys = local_keys.clone();
            let last_checked = last_checked.clone();
            let sender_id = sender_id.clone();
            async move {
                poll_tick(
                    gateway,
                    store,
                    subscribers,
                    local_keys,
                    last_checked,
                    &sender_id,
                )
                .await;
            }
        }));
        info!("Chat client connected (polling mode)");
    }

    /// Stop polling. No further ticks run after this returns; idempotent.
    pub fn disconnect(&self) {
        if let Some(poller) = self.poller.lock().unwrap().take() {
            poller.stop();
            info!("Chat client disconnected");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.poller.lock().unwrap().is_some()
    }

    // Subscriber registration. Each returns a handle that removes
    // exactly the registered callback.

    pub fn on_message<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        let id = self
            .subscribers
            .message
            .lock()
            .unwrap()
            .subscribe(Arc::new(callback));
        let subscribers = self.subscribers.clone();
        Subscription {
            cancel: Some(Box::new(move || {
                subscribers.message.lock().unwrap().unsubscribe(id);
            })),
        }
    }

    pub fn on_typing<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&TypingSignal) + Send + Sync + 'static,
    {
        let id = self
            .subscribers
            .typing
            .lock()
            .unwrap()
            .subscribe(Arc::new(callback));
        let subscribers = self.subscribers.clone();
        Subscription {
            cancel: Some(Box::new(move || {
                subscribers.typing.lock().unwrap().unsubscribe(id);
            })),
        }
    }

    pub fn on_read<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let id = self
            .subscribers
            .read
            .lock()
            .unwrap()
            .subscribe(Arc::new(callback));
        let subscribers = self.subscribers.clone();
        Subscription {
            cancel: Some(Box::new(move || {
                subscribers.read.lock().unwrap().unsubscribe(id);
            })),
        }
    }

    pub fn on_status_change<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&str, bool) + Send + Sync + 'static,
    {
        let id = self
            .subscribers
            .status
            .lock()
            .unwrap()
            .subscribe(Arc::new(callback));
        let subscribers = self.subscribers.clone();
        Subscription {
            cancel: Some(Box::new(move || {
                subscribers.status.lock().unwrap().unsubscribe(id);
            })),
        }
    }

    // State access.

    pub fn rooms(&self) -> Vec<ChatRoom> {
        self.store.lock().unwrap().rooms()
    }

    pub fn messages(&self, room_id: &str) -> Vec<Message> {
        self.store.lock().unwrap().messages(room_id)
    }

    // Operations.

    /// Send a message through the provisional pipeline. The returned
    /// message reflects the settled state (`Sent` or `Failed`).
    pub async fn send_message(&self, receiver_id: &str, content: &str) -> Message {
        self.pipeline.send(receiver_id, content).await
    }

    /// Retry a previously failed message by its local key.
    pub async fn resend_message(&self, room_id: &str, local_key: u64) -> anyhow::Result<Message> {
        self.pipeline.resend(room_id, local_key).await
    }

    /// Feed a content-change event into the typing debouncer.
    pub fn typing_input(&self, room_id: &str, content: &str) {
        self.typing.input(room_id, content);
    }

    /// Mark a room as read on the server, zero the local unread count,
    /// and notify read subscribers.
    pub async fn mark_read(&self, room_id: &str) -> Result<(), ApiError> {
        self.gateway.mark_read(room_id).await?;
        self.store.lock().unwrap().zero_unread(room_id);
        self.subscribers.emit(&ChatEvent::Read {
            room_id: room_id.to_string(),
        });
        Ok(())
    }

    /// Create (or fetch) the room shared with another user and record it
    /// locally.
    pub async fn create_or_get_room(&self, user_id: &str) -> Result<ChatRoom, ApiError> {
        let summary = self.gateway.create_or_get_room(user_id).await?;
        let mut rooms = self.rooms_as_summaries();
        if !rooms.iter().any(|r| r.id == summary.id) {
            rooms.push(summary.clone());
        }
        self.store.lock().unwrap().merge_rooms(rooms);
        Ok(self
            .rooms()
            .into_iter()
            .find(|r| r.id == summary.id)
            .unwrap_or_else(|| room_from_summary(&summary)))
    }

    /// Load one page of a room's history into the store and return the
    /// page in display order plus whether more pages remain.
    pub async fn load_history(
        &self,
        room_id: &str,
        page: u32,
        size: u32,
    ) -> Result<(Vec<Message>, bool), ApiError> {
        let response = self.gateway.get_chat_messages(room_id, page, size).await?;
        let has_more = !response.last;
        {
            let mut store = self.store.lock().unwrap();
            for wire in &response.content {
                if store
                    .messages(room_id)
                    .iter()
                    .any(|m| m.id == MessageId::Confirmed(wire.id.clone()))
                {
                    continue;
                }
                let message =
                    pipeline::message_from_wire(wire, &self.local_keys);
                store.insert_message(message);
            }
        }
        Ok((self.messages(room_id), has_more))
    }

    fn rooms_as_summaries(&self) -> Vec<RoomSummary> {
        self.rooms()
            .into_iter()
            .map(|room| RoomSummary {
                id: room.id,
                other_user_id: room.other_user_id,
                other_user_nickname: room.other_user_nickname,
                last_message: room.last_message,
                last_message_time: room.last_message_time,
                unread_count: room.unread_count,
                online: room.online,
                profile_image: room.profile_image,
            })
            .collect()
    }
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn room_from_summary(summary: &RoomSummary) -> ChatRoom {
    ChatRoom {
        id: summary.id.clone(),
        other_user_id: summary.other_user_id.clone(),
        other_user_nickname: summary.other_user_nickname.clone(),
        last_message: summary.last_message.clone(),
        last_message_time: summary.last_message_time,
        unread_count: summary.unread_count,
        online: summary.online,
        profile_image: summary.profile_image.clone(),
    }
}

/// One polling pass: refresh the room list, then fetch the single
/// newest message of every room that has activity after the last check.
///
/// Only the newest message per room is fetched, so older intermediate
/// messages of a fast-moving room are not backfilled here; history
/// loading covers those. Any fetch failure is logged and swallowed so
/// the next tick runs normally.
async fn poll_tick(
    gateway: Arc<dyn ChatGateway>,
    store: Arc<Mutex<ChatStore>>,
    subscribers: Arc<Subscribers>,
    local_keys: Arc<AtomicU64>,
    last_checked: Arc<Mutex<DateTime<Utc>>>,
    sender_id: &str,
) {
    let since = *last_checked.lock().unwrap();

    let rooms = match gateway.get_chat_rooms().await {
        Ok(rooms) => rooms,
        Err(e) => {
            warn!("Polling error while fetching rooms: {}", e);
            return;
        }
    };

    let flips = store.lock().unwrap().merge_rooms(rooms.clone());
    for (user_id, online) in flips {
        subscribers.emit(&ChatEvent::Status { user_id, online });
    }

    let mut window_complete = true;
    for room in &rooms {
        if room.last_message_time <= since {
            continue;
        }
        match gateway.get_chat_messages(&room.id, 0, 1).await {
            Ok(page) => {
                let Some(wire) = page.content.first() else {
                    continue;
                };
                // Our own sends already went through the pipeline.
                if wire.sender_id == sender_id {
                    continue;
                }
                let already_known = {
                    let store = store.lock().unwrap();
                    store
                        .messages(&room.id)
                        .iter()
                        .any(|m| m.id == MessageId::Confirmed(wire.id.clone()))
                };
                if already_known {
                    continue;
                }
                let message = pipeline::message_from_wire(wire, &local_keys);
                store.lock().unwrap().insert_message(message.clone());
                subscribers.emit(&ChatEvent::Message(message));
            }
            Err(e) => {
                error!("Polling error while fetching messages for {}: {}", room.id, e);
                window_complete = false;
            }
        }
    }

    // Advance the watermark only when every room in the window was
    // fetched; a failed room would otherwise fall below it and its
    // message would never be retried.
    if window_complete {
        *last_checked.lock().unwrap() = Utc::now();
    }
}
