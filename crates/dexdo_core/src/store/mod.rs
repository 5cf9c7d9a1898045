//! Task document store contracts and the local SQLite implementation.
//!
//! # Responsibility
//! - Define the per-user document store the feed and services write to.
//! - Deliver live snapshots of a user's collection to subscribers.
//!
//! # Invariants
//! - Every write validates the task before persistence.
//! - A snapshot is always the full collection, ordered by `due_date ASC, id ASC`.
//! - Collections never mix users.

mod listeners;
mod sqlite;

pub use listeners::ListenerGuard;
pub use sqlite::SqliteTaskStore;

use crate::db::DbError;
use crate::model::task::{
    validate_due_date, validate_text, Enrichment, Task, TaskId, TaskValidationError,
};
use std::error::Error;
use std::fmt::{Display, Formatter};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

/// Largest number of writes accepted in one atomic batch.
pub const BATCH_LIMIT: usize = 500;

pub type StoreResult<T> = Result<T, StoreError>;

/// One listener delivery: a full snapshot, or the reason it could not be read.
pub type SnapshotEvent = StoreResult<Vec<Task>>;

/// Store-side end of a subscription channel.
pub type SnapshotSender = UnboundedSender<SnapshotEvent>;

/// Error for task store writes, reads and listeners.
#[derive(Debug)]
pub enum StoreError {
    Validation(TaskValidationError),
    Db(DbError),
    NotFound(TaskId),
    BatchTooLarge { size: usize, limit: usize },
    InvalidData(String),
    /// Listener-side failure delivered through a subscription.
    Listener(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "task not found: {id}"),
            Self::BatchTooLarge { size, limit } => {
                write!(f, "batch of {size} writes exceeds limit {limit}")
            }
            Self::InvalidData(message) => write!(f, "invalid persisted task data: {message}"),
            Self::Listener(message) => write!(f, "task listener failed: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<TaskValidationError> for StoreError {
    fn from(value: TaskValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Partial field update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    pub text: Option<String>,
    pub due_date: Option<String>,
    pub completed: Option<bool>,
    pub enrichment: Option<Enrichment>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.text.is_none()
            && self.due_date.is_none()
            && self.completed.is_none()
            && self.enrichment.is_none()
    }

    /// Validates only the fields this patch touches, so legacy rows with a
    /// malformed due date can still be completed or enriched.
    pub fn validate(&self) -> Result<(), TaskValidationError> {
        if let Some(text) = &self.text {
            validate_text(text)?;
        }
        if let Some(due_date) = &self.due_date {
            validate_due_date(due_date)?;
        }
        Ok(())
    }

    /// Applies the patch onto an existing task.
    pub fn apply_to(&self, task: &mut Task) {
        if let Some(text) = &self.text {
            task.text = text.clone();
        }
        if let Some(due_date) = &self.due_date {
            task.due_date = due_date.clone();
        }
        if let Some(completed) = self.completed {
            task.completed = completed;
        }
        if let Some(enrichment) = &self.enrichment {
            task.enrichment = enrichment.clone();
        }
    }
}

/// Live stream of snapshots for one user's collection.
///
/// Dropping the subscription deregisters its listener from the store.
pub struct Subscription {
    receiver: UnboundedReceiver<SnapshotEvent>,
    _guard: Option<ListenerGuard>,
}

impl Subscription {
    /// Wraps a raw receiver, for store implementations without a registry.
    pub fn from_receiver(receiver: UnboundedReceiver<SnapshotEvent>) -> Self {
        Self {
            receiver,
            _guard: None,
        }
    }

    pub(crate) fn with_guard(
        receiver: UnboundedReceiver<SnapshotEvent>,
        guard: ListenerGuard,
    ) -> Self {
        Self {
            receiver,
            _guard: Some(guard),
        }
    }

    /// Waits for the next snapshot event; `None` once the store side closed.
    pub async fn next(&mut self) -> Option<SnapshotEvent> {
        self.receiver.recv().await
    }
}

/// Per-user task document store with live listeners.
///
/// # Contract
/// - `add` assigns and returns a fresh id; the input id is ignored.
/// - `set` fully overwrites (or recreates) the document with `task.id`.
///   Only the text is validated; the due date is written back verbatim so
///   records read with a legacy malformed date can be restored.
/// - `batch_delete` is atomic and rejects batches above `batch_limit()`.
/// - After every successful write, all listeners of that user receive a
///   fresh full snapshot.
pub trait TaskStore: Send + Sync {
    fn add(&self, user_id: &str, task: &Task) -> StoreResult<TaskId>;
    fn set(&self, user_id: &str, task: &Task) -> StoreResult<()>;
    fn update_fields(&self, user_id: &str, id: &str, patch: &TaskPatch) -> StoreResult<()>;
    fn delete(&self, user_id: &str, id: &str) -> StoreResult<()>;
    fn batch_delete(&self, user_id: &str, ids: &[TaskId]) -> StoreResult<()>;
    fn get(&self, user_id: &str, id: &str) -> StoreResult<Option<Task>>;
    /// Reads the full collection ordered by `due_date ASC, id ASC`.
    fn query_ordered(&self, user_id: &str) -> StoreResult<Vec<Task>>;
    /// Opens a live listener; the current snapshot is delivered first.
    fn listen(&self, user_id: &str) -> StoreResult<Subscription>;

    fn batch_limit(&self) -> usize {
        BATCH_LIMIT
    }
}
