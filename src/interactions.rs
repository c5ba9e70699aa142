// Optimistic like/bookmark reconciler.
//
// A toggle flips local state synchronously before the network call,
// then reconciles against the server's authoritative {flag, count} or
// restores the exact pre-toggle snapshot on failure. The snapshot is
// stored, never recomputed from an inverse, so interleaved updates to
// the same post cannot corrupt the rollback arithmetic.

use log::{debug, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::api::{ApiError, ChatGateway, ToggleResponse};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InteractionKind {
    Like,
    Bookmark,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InteractionState {
    pub active: bool,
    pub count: u32,
}

pub struct Interactions {
    gateway: Arc<dyn ChatGateway>,
    states: Mutex<HashMap<(InteractionKind, String), InteractionState>>,
}

impl Interactions {
    pub fn new(gateway: Arc<dyn ChatGateway>) -> Self {
        Interactions {
            gateway,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Initialize a post's state from a server-provided snapshot.
    pub fn seed(&self, kind: InteractionKind, post_id: &str, state: InteractionState) {
        self.states
            .lock()
            .unwrap()
            .insert((kind, post_id.to_string()), state);
    }

    pub fn state(&self, kind: InteractionKind, post_id: &str) -> InteractionState {
        self.states
            .lock()
            .unwrap()
            .get(&(kind, post_id.to_string()))
            .copied()
            .unwrap_or_default()
    }

    /// Toggle a like or bookmark with optimistic local effect.
    ///
    /// The flip and count adjustment happen before the request goes out;
    /// reconciliation overwrites local state with whatever the server
    /// reports, so a second toggle racing the first converges on the
    /// last-resolving response instead of double-counting. On failure
    /// the pre-toggle snapshot is restored and the error is returned so
    /// the caller can decide whether the silent revert is enough.
    pub async fn toggle(
        &self,
        kind: InteractionKind,
        post_id: &str,
    ) -> Result<InteractionState, ApiError> {
        let key = (kind, post_id.to_string());

        // Phase 1: optimistic flip, with the exact prior state saved.
        let (snapshot, assumed) = {
            let mut states = self.states.lock().unwrap();
            let entry = states.entry(key.clone()).or_default();
            let snapshot = *entry;
            entry.active = !entry.active;
            entry.count = if entry.active {
                entry.count.saturating_add(1)
            } else {
                entry.count.saturating_sub(1)
            };
            (snapshot, *entry)
        };
        debug!(
            "Optimistic {:?} toggle on {}: {:?} -> {:?}",
            kind, post_id, snapshot, assumed
        );

        // Phase 2: the only suspension point.
        let result = match kind {
            InteractionKind::Like => self.gateway.toggle_like(post_id).await,
            InteractionKind::Bookmark => self.gateway.toggle_bookmark(post_id).await,
        };

        // Phase 3: reconcile or roll back, synchronously.
        match result {
            Ok(response) => Ok(self.reconcile(&key, assumed, &response)),
            Err(e) => {
                warn!("{:?} toggle on {} failed, rolling back: {}", kind, post_id, e);
                self.states.lock().unwrap().insert(key, snapshot);
                Err(e)
            }
        }
    }

    /// Overwrite local state with server truth, keeping locally assumed
    /// values for any field the server left out.
    fn reconcile(
        &self,
        key: &(InteractionKind, String),
        assumed: InteractionState,
        response: &ToggleResponse,
    ) -> InteractionState {
        let mut states = self.states.lock().unwrap();
        let entry = states.entry(key.clone()).or_default();
        let current = *entry;
        entry.active = response.flag.unwrap_or(assumed.active);
        entry.count = response.count.unwrap_or(current.count);
        if *entry != assumed {
            debug!(
                "Server state for {} differed from assumption: {:?} vs {:?}",
                key.1, entry, assumed
            );
        }
        *entry
    }
}
