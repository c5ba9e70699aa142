// Per-room typing debounce timers.
//
// Each keystroke with non-empty content signals typing=true and arms a
// fresh quiet-period timer; only the timer armed by the last keystroke
// survives to signal typing=false. Rooms hold independent timers.

use log::debug;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

use super::Subscribers;
use crate::models::{ChatEvent, TypingSignal};

#[derive(Clone)]
pub struct TypingTracker {
    subscribers: Arc<Subscribers>,
    user_id: String,
    quiet_period: Duration,
    timers: Arc<Mutex<HashMap<String, JoinHandle<()>>>>,
}

impl TypingTracker {
    pub(crate) fn new(
        subscribers: Arc<Subscribers>,
        user_id: &str,
        quiet_period: Duration,
    ) -> Self {
        TypingTracker {
            subscribers,
            user_id: user_id.to_string(),
            quiet_period,
            timers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Handle a content-change event for a room's compose box.
    pub fn input(&self, room_id: &str, content: &str) {
        if content.is_empty() {
            self.cancel(room_id);
            self.emit(room_id, false);
            return;
        }

        self.emit(room_id, true);
        self.arm(room_id);
    }

    /// (Re)start the quiet-period timer for a room, replacing any timer
    /// from an earlier keystroke.
    fn arm(&self, room_id: &str) {
        let mut timers = self.timers.lock().unwrap();
        if let Some(previous) = timers.remove(room_id) {
            previous.abort();
        }

        let subscribers = self.subscribers.clone();
        let timers_ref = self.timers.clone();
        let user_id = self.user_id.clone();
        let room = room_id.to_string();
        let quiet_period = self.quiet_period;

        let handle = tokio::spawn(async move {
            tokio::time::sleep(quiet_period).await;
            debug!("Typing quiet period elapsed for {}", room);
            timers_ref.lock().unwrap().remove(&room);
            subscribers.emit(&ChatEvent::Typing(TypingSignal {
                room_id: room,
                user_id,
                active: false,
            }));
        });
        timers.insert(room_id.to_string(), handle);
    }

    fn cancel(&self, room_id: &str) {
        if let Some(handle) = self.timers.lock().unwrap().remove(room_id) {
            handle.abort();
        }
    }

    fn emit(&self, room_id: &str, active: bool) {
        self.subscribers.emit(&ChatEvent::Typing(TypingSignal {
            room_id: room_id.to_string(),
            user_id: self.user_id.clone(),
            active,
        }));
    }
}
