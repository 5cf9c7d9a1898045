//! Task use-case service.
//!
//! # Responsibility
//! - Provide create/edit/complete/delete/undo entry points for callers.
//! - Kick off creature enrichment off the caller's critical path.
//!
//! # Invariants
//! - Creation never waits for, or fails because of, enrichment.
//! - Edits never re-trigger enrichment.
//! - Only the most recent deletion can be undone, and only within the
//!   session that deleted it.

use crate::enrichment::{enrich_task, lookup_key, CreatureLookup};
use crate::feed::{FeedError, TaskFeed};
use crate::model::task::{
    validate_due_date, validate_text, Task, TaskId, TaskValidationError, UserId,
};
use crate::store::TaskPatch;
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;

#[derive(Debug)]
pub enum ServiceError {
    Validation(TaskValidationError),
    /// Target task does not exist for the signed-in user.
    TaskNotFound(TaskId),
    Feed(FeedError),
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::TaskNotFound(id) => write!(f, "task not found: {id}"),
            Self::Feed(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Feed(err) => Some(err),
            Self::TaskNotFound(_) => None,
        }
    }
}

impl From<TaskValidationError> for ServiceError {
    fn from(value: TaskValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<FeedError> for ServiceError {
    fn from(value: FeedError) -> Self {
        Self::Feed(value)
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Result of `create_task`.
#[derive(Debug)]
pub struct CreatedTask {
    pub id: TaskId,
    /// In-flight enrichment; `None` when the text yields no lookup key.
    ///
    /// Dropping the handle does not cancel the lookup.
    pub enrichment: Option<JoinHandle<()>>,
}

/// Deleted task kept for undo, tagged with the session it came from.
struct DeletedTask {
    generation: u64,
    owner: UserId,
    task: Task,
}

/// Use-case facade over the live feed and the creature lookup.
pub struct TaskService {
    feed: Arc<TaskFeed>,
    lookup: Arc<dyn CreatureLookup>,
    last_deleted: Mutex<Option<DeletedTask>>,
}

impl TaskService {
    pub fn new(feed: Arc<TaskFeed>, lookup: Arc<dyn CreatureLookup>) -> Self {
        Self {
            feed,
            lookup,
            last_deleted: Mutex::new(None),
        }
    }

    pub fn feed(&self) -> &Arc<TaskFeed> {
        &self.feed
    }

    /// Creates a pending task and schedules its enrichment.
    ///
    /// # Contract
    /// - Text and due date are trimmed and validated first.
    /// - Returns as soon as the store assigned an id.
    pub fn create_task(&self, text: &str, due_date: &str) -> ServiceResult<CreatedTask> {
        let text = text.trim();
        let due_date = due_date.trim();
        validate_text(text)?;
        validate_due_date(due_date)?;

        let user_id = self.feed.current_user().ok_or(FeedError::NoActiveSession)?;
        let id = self.feed.add(&Task::new(text, due_date))?;
        info!("event=task_create module=service status=ok");

        let enrichment = lookup_key(text).map(|key| {
            self.feed.runtime().spawn(enrich_task(
                Arc::clone(self.feed.store()),
                Arc::clone(&self.lookup),
                user_id,
                id.clone(),
                key,
            ))
        });

        Ok(CreatedTask { id, enrichment })
    }

    /// Replaces text and due date; enrichment is left untouched.
    pub fn edit_task(&self, id: &str, text: &str, due_date: &str) -> ServiceResult<()> {
        let text = text.trim();
        let due_date = due_date.trim();
        validate_text(text)?;
        validate_due_date(due_date)?;

        self.feed.update(
            id,
            &TaskPatch {
                text: Some(text.to_string()),
                due_date: Some(due_date.to_string()),
                ..TaskPatch::default()
            },
        )?;
        Ok(())
    }

    pub fn toggle_completed(&self, id: &str, completed: bool) -> ServiceResult<()> {
        self.feed.set_completed(id, completed)?;
        Ok(())
    }

    /// Deletes a task and remembers it for `undo_delete`.
    pub fn delete_task(&self, id: &str) -> ServiceResult<()> {
        let (generation, user_id) = self.feed.session();
        let user_id = user_id.ok_or(FeedError::NoActiveSession)?;
        let task = self
            .feed
            .store()
            .get(&user_id, id)
            .map_err(FeedError::from)?
            .ok_or_else(|| ServiceError::TaskNotFound(id.to_string()))?;

        self.feed.delete(id)?;
        *self.last_deleted.lock().unwrap_or_else(PoisonError::into_inner) = Some(DeletedTask {
            generation,
            owner: user_id,
            task,
        });
        Ok(())
    }

    /// Restores the most recently deleted task under its original id.
    ///
    /// Returns the restored id, or `None` when there is nothing to undo.
    /// A deletion from an earlier session is discarded, never restored.
    pub fn undo_delete(&self) -> ServiceResult<Option<TaskId>> {
        let mut slot = self.last_deleted.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(deleted) = slot.take() else {
            return Ok(None);
        };

        let (generation, user_id) = self.feed.session();
        if generation != deleted.generation || user_id.as_deref() != Some(deleted.owner.as_str()) {
            warn!("event=task_undo module=service status=skipped reason=session_changed");
            return Ok(None);
        }

        if let Err(err) = self.feed.restore(&deleted.task) {
            *slot = Some(deleted);
            return Err(err.into());
        }
        info!("event=task_undo module=service status=ok");
        Ok(Some(deleted.task.id))
    }

    /// Deletes every task of the signed-in user; returns how many.
    pub fn clear_all(&self) -> ServiceResult<usize> {
        Ok(self.feed.clear()?)
    }
}
