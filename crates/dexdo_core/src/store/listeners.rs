//! Listener registry fanning snapshots out to live subscriptions.

use super::{SnapshotSender, StoreError};
use crate::model::task::Task;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

#[derive(Default)]
struct RegistryState {
    next_id: u64,
    listeners: HashMap<u64, Listener>,
}

struct Listener {
    user_id: String,
    sender: SnapshotSender,
}

/// Shared table of active listeners keyed by registration id.
#[derive(Default)]
pub(crate) struct ListenerRegistry {
    state: Arc<Mutex<RegistryState>>,
}

/// Deregisters its listener when dropped.
pub struct ListenerGuard {
    state: Weak<Mutex<RegistryState>>,
    id: u64,
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        if let Some(state) = self.state.upgrade() {
            lock(&state).listeners.remove(&self.id);
        }
    }
}

impl ListenerRegistry {
    pub(crate) fn register(
        &self,
        user_id: &str,
        sender: SnapshotSender,
    ) -> ListenerGuard {
        let mut state = lock(&self.state);
        let id = state.next_id;
        state.next_id += 1;
        state.listeners.insert(
            id,
            Listener {
                user_id: user_id.to_string(),
                sender,
            },
        );
        ListenerGuard {
            state: Arc::downgrade(&self.state),
            id,
        }
    }

    /// Returns whether any live listener watches `user_id`.
    pub(crate) fn has_listeners(&self, user_id: &str) -> bool {
        lock(&self.state)
            .listeners
            .values()
            .any(|listener| listener.user_id == user_id)
    }

    /// Sends `snapshot` to every listener of `user_id`, pruning closed ones.
    pub(crate) fn publish(&self, user_id: &str, snapshot: &Result<Vec<Task>, String>) {
        let mut state = lock(&self.state);
        state.listeners.retain(|_, listener| {
            if listener.user_id != user_id {
                return true;
            }
            let event = snapshot.clone().map_err(StoreError::Listener);
            listener.sender.send(event).is_ok()
        });
    }

    pub(crate) fn len(&self) -> usize {
        lock(&self.state).listeners.len()
    }
}

fn lock(state: &Mutex<RegistryState>) -> MutexGuard<'_, RegistryState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}
