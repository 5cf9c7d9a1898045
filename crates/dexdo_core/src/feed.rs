//! Live task feed for the signed-in user.
//!
//! # Responsibility
//! - Hold at most one store listener, bound to the current user session.
//! - Republish every snapshot as `pending` / `completed` views.
//! - Forward writes to the store without touching the cached views.
//!
//! # Invariants
//! - `pending` and `completed` always partition the latest snapshot.
//! - A snapshot from a torn-down listener is never applied.
//! - Listener errors keep the last good views.

use crate::model::task::{Task, TaskId, UserId};
use crate::store::{StoreError, TaskPatch, TaskStore};
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Derived views over one full snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskViews {
    /// Owner of the snapshot; `None` when signed out.
    pub user_id: Option<UserId>,
    /// Full snapshot in store order (`due_date ASC, id ASC`).
    pub tasks: Vec<Task>,
    pub pending: Vec<Task>,
    pub completed: Vec<Task>,
}

impl TaskViews {
    /// Splits a snapshot into pending and completed views, keeping order.
    pub fn from_snapshot(user_id: impl Into<UserId>, tasks: Vec<Task>) -> Self {
        let (completed, pending): (Vec<Task>, Vec<Task>) =
            tasks.iter().cloned().partition(|task| task.completed);
        Self {
            user_id: Some(user_id.into()),
            tasks,
            pending,
            completed,
        }
    }

    pub fn find(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }
}

#[derive(Debug)]
pub enum FeedError {
    /// Write attempted while no user is bound.
    NoActiveSession,
    Store(StoreError),
}

impl Display for FeedError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoActiveSession => write!(f, "no signed-in user for task feed"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for FeedError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::NoActiveSession => None,
        }
    }
}

impl From<StoreError> for FeedError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

pub type FeedResult<T> = Result<T, FeedError>;

#[derive(Default)]
struct FeedState {
    /// Bumped on every rebind; listeners carry the value they were born with.
    generation: u64,
    user_id: Option<UserId>,
    listener: Option<JoinHandle<()>>,
}

/// Store adapter publishing a user's tasks as watchable views.
pub struct TaskFeed {
    store: Arc<dyn TaskStore>,
    runtime: Handle,
    views: watch::Sender<TaskViews>,
    state: Arc<Mutex<FeedState>>,
}

impl TaskFeed {
    /// Creates an unbound feed; listeners run on `runtime`.
    pub fn new(store: Arc<dyn TaskStore>, runtime: Handle) -> Self {
        let (views, _) = watch::channel(TaskViews::default());
        Self {
            store,
            runtime,
            views,
            state: Arc::new(Mutex::new(FeedState::default())),
        }
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    pub fn runtime(&self) -> &Handle {
        &self.runtime
    }

    /// Returns a receiver that observes every published view.
    pub fn subscribe(&self) -> watch::Receiver<TaskViews> {
        self.views.subscribe()
    }

    /// Returns the latest published views.
    pub fn views(&self) -> TaskViews {
        self.views.borrow().clone()
    }

    pub fn current_user(&self) -> Option<UserId> {
        lock(&self.state).user_id.clone()
    }

    /// Bound user together with the session generation.
    ///
    /// The generation changes on every `bind_user` call, including a rebind
    /// to the same user, so it identifies one continuous session.
    pub fn session(&self) -> (u64, Option<UserId>) {
        let state = lock(&self.state);
        (state.generation, state.user_id.clone())
    }

    /// Rebinds the feed to a user session, or clears it on `None`.
    ///
    /// # Contract
    /// - The previous listener is torn down before a new one is opened.
    /// - Views are reset to empty immediately, so tasks of different users
    ///   are never visible together.
    ///
    /// # Errors
    /// - Returns the store error when the new listener cannot be opened;
    ///   the feed is left unbound in that case.
    pub fn bind_user(&self, user_id: Option<&str>) -> FeedResult<()> {
        let mut state = lock(&self.state);
        state.generation += 1;
        if let Some(previous) = state.listener.take() {
            previous.abort();
        }
        state.user_id = None;

        let Some(user_id) = user_id else {
            self.views.send_replace(TaskViews::default());
            info!("event=feed_bind module=feed status=ok session=none");
            return Ok(());
        };

        self.views.send_replace(TaskViews {
            user_id: Some(user_id.to_string()),
            ..TaskViews::default()
        });

        let mut subscription = match self.store.listen(user_id) {
            Ok(subscription) => subscription,
            Err(err) => {
                warn!("event=feed_bind module=feed status=error error={err}");
                return Err(err.into());
            }
        };

        let generation = state.generation;
        let owner = user_id.to_string();
        let shared_state = Arc::clone(&self.state);
        let views = self.views.clone();
        state.listener = Some(self.runtime.spawn(async move {
            while let Some(event) = subscription.next().await {
                let state = lock(&shared_state);
                if state.generation != generation {
                    break;
                }
                match event {
                    Ok(tasks) => {
                        views.send_replace(TaskViews::from_snapshot(owner.as_str(), tasks));
                    }
                    Err(err) => {
                        warn!("event=feed_snapshot module=feed status=error error={err}");
                    }
                }
            }
        }));
        state.user_id = Some(user_id.to_string());

        info!("event=feed_bind module=feed status=ok session=user");
        Ok(())
    }

    /// Adds a new task for the bound user; the store assigns the id.
    pub fn add(&self, task: &Task) -> FeedResult<TaskId> {
        let user_id = self.require_user()?;
        self.log_write("add", self.store.add(&user_id, task))
    }

    /// Applies a field update to one task.
    pub fn update(&self, id: &str, patch: &TaskPatch) -> FeedResult<()> {
        let user_id = self.require_user()?;
        self.log_write("update", self.store.update_fields(&user_id, id, patch))
    }

    pub fn set_completed(&self, id: &str, completed: bool) -> FeedResult<()> {
        self.update(
            id,
            &TaskPatch {
                completed: Some(completed),
                ..TaskPatch::default()
            },
        )
    }

    /// Writes `task` back in full under its existing id.
    pub fn restore(&self, task: &Task) -> FeedResult<()> {
        let user_id = self.require_user()?;
        self.log_write("restore", self.store.set(&user_id, task))
    }

    pub fn delete(&self, id: &str) -> FeedResult<()> {
        let user_id = self.require_user()?;
        self.log_write("delete", self.store.delete(&user_id, id))
    }

    /// Deletes every cached task of the bound user.
    ///
    /// Deletes are issued in atomic batches of at most `batch_limit()`
    /// tasks; a failing batch stops the remaining ones.
    ///
    /// Returns the number of deleted tasks.
    pub fn clear(&self) -> FeedResult<usize> {
        let user_id = self.require_user()?;
        let ids: Vec<TaskId> = self
            .views
            .borrow()
            .tasks
            .iter()
            .map(|task| task.id.clone())
            .collect();

        let limit = self.store.batch_limit().max(1);
        for chunk in ids.chunks(limit) {
            self.log_write("clear", self.store.batch_delete(&user_id, chunk))?;
        }
        Ok(ids.len())
    }

    fn require_user(&self) -> FeedResult<UserId> {
        self.current_user().ok_or(FeedError::NoActiveSession)
    }

    fn log_write<T>(&self, op: &str, result: Result<T, StoreError>) -> FeedResult<T> {
        match result {
            Ok(value) => {
                info!("event=feed_write module=feed status=ok op={op}");
                Ok(value)
            }
            Err(err) => {
                warn!("event=feed_write module=feed status=error op={op} error={err}");
                Err(err.into())
            }
        }
    }
}

impl Drop for TaskFeed {
    fn drop(&mut self) {
        if let Some(listener) = lock(&self.state).listener.take() {
            listener.abort();
        }
    }
}

fn lock(state: &Mutex<FeedState>) -> MutexGuard<'_, FeedState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}
