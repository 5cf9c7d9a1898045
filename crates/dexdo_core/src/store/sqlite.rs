//! SQLite-backed task document store.
//!
//! # Responsibility
//! - Persist per-user task collections in the `tasks` table.
//! - Push a fresh ordered snapshot to listeners after every write.
//!
//! # Invariants
//! - `add` calls `Task::validate()` before SQL mutations; `set` and
//!   `update_fields` validate only the fields they are handed.
//! - Reads reject corrupt rows but keep malformed due dates as-is;
//!   classification degrades those to `Unknown`.

use super::listeners::ListenerRegistry;
use super::{StoreError, StoreResult, Subscription, TaskPatch, TaskStore, BATCH_LIMIT};
use crate::db::{open_db, open_db_in_memory};
use crate::model::task::{validate_text, Enrichment, Task, TaskId};
use log::{info, warn};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::unbounded_channel;
use uuid::Uuid;

const TASK_SELECT_SQL: &str = "SELECT
    id,
    text,
    due_date,
    completed,
    creature_name,
    creature_types,
    creature_stats,
    creature_image_url
FROM tasks";

/// Local document store over one SQLite connection.
pub struct SqliteTaskStore {
    conn: Mutex<Connection>,
    listeners: ListenerRegistry,
    batch_limit: usize,
}

impl SqliteTaskStore {
    /// Wraps an already-migrated connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            listeners: ListenerRegistry::default(),
            batch_limit: BATCH_LIMIT,
        }
    }

    /// Opens the database file at `path`, migrating it first.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Ok(Self::new(open_db(path)?))
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Ok(Self::new(open_db_in_memory()?))
    }

    /// Overrides the batch size limit.
    pub fn with_batch_limit(mut self, batch_limit: usize) -> Self {
        self.batch_limit = batch_limit.max(1);
        self
    }

    /// Number of live listeners across all users.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publishes the current collection; callers hold the connection so
    /// snapshots reach listeners in write order.
    fn notify(&self, conn: &Connection, user_id: &str) {
        if !self.listeners.has_listeners(user_id) {
            return;
        }
        let snapshot = query_tasks(conn, user_id).map_err(|err| {
            warn!("event=store_snapshot module=store status=error error={err}");
            err.to_string()
        });
        self.listeners.publish(user_id, &snapshot);
    }
}

impl TaskStore for SqliteTaskStore {
    fn add(&self, user_id: &str, task: &Task) -> StoreResult<TaskId> {
        task.validate()?;
        let id = Uuid::new_v4().simple().to_string();

        let conn = self.conn();
        insert_task(&conn, user_id, &id, task)?;
        self.notify(&conn, user_id);
        Ok(id)
    }

    fn set(&self, user_id: &str, task: &Task) -> StoreResult<()> {
        validate_text(&task.text)?;
        if task.id.trim().is_empty() {
            return Err(StoreError::InvalidData(
                "set requires a store-assigned id".to_string(),
            ));
        }

        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM tasks WHERE user_id = ?1 AND id = ?2;",
            params![user_id, task.id],
        )?;
        insert_task(&tx, user_id, &task.id, task)?;
        tx.commit()?;
        self.notify(&conn, user_id);
        Ok(())
    }

    fn update_fields(&self, user_id: &str, id: &str, patch: &TaskPatch) -> StoreResult<()> {
        patch.validate()?;
        let conn = self.conn();
        let mut task = get_task(&conn, user_id, id)?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if patch.is_empty() {
            return Ok(());
        }
        patch.apply_to(&mut task);

        conn.execute(
            "UPDATE tasks
             SET
                text = ?1,
                due_date = ?2,
                completed = ?3,
                creature_name = ?4,
                creature_types = ?5,
                creature_stats = ?6,
                creature_image_url = ?7,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE user_id = ?8 AND id = ?9;",
            params![
                task.text.trim(),
                task.due_date.trim(),
                task.completed,
                task.enrichment.name,
                task.enrichment.types,
                task.enrichment.stat_summary,
                task.enrichment.image_url,
                user_id,
                id,
            ],
        )?;
        self.notify(&conn, user_id);
        Ok(())
    }

    fn delete(&self, user_id: &str, id: &str) -> StoreResult<()> {
        let conn = self.conn();
        let changed = conn.execute(
            "DELETE FROM tasks WHERE user_id = ?1 AND id = ?2;",
            params![user_id, id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        self.notify(&conn, user_id);
        Ok(())
    }

    fn batch_delete(&self, user_id: &str, ids: &[TaskId]) -> StoreResult<()> {
        if ids.len() > self.batch_limit {
            return Err(StoreError::BatchTooLarge {
                size: ids.len(),
                limit: self.batch_limit,
            });
        }
        if ids.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare("DELETE FROM tasks WHERE user_id = ?1 AND id = ?2;")?;
            for id in ids {
                stmt.execute(params![user_id, id])?;
            }
        }
        tx.commit()?;
        info!(
            "event=store_batch_delete module=store status=ok count={}",
            ids.len()
        );
        self.notify(&conn, user_id);
        Ok(())
    }

    fn get(&self, user_id: &str, id: &str) -> StoreResult<Option<Task>> {
        get_task(&self.conn(), user_id, id)
    }

    fn query_ordered(&self, user_id: &str) -> StoreResult<Vec<Task>> {
        query_tasks(&self.conn(), user_id)
    }

    fn listen(&self, user_id: &str) -> StoreResult<Subscription> {
        // Holding the connection keeps writes from slipping between the
        // initial snapshot and registration.
        let conn = self.conn();
        let initial = query_tasks(&conn, user_id)?;
        let (sender, receiver) = unbounded_channel();
        let _ = sender.send(Ok(initial));
        let guard = self.listeners.register(user_id, sender);
        drop(conn);

        info!("event=store_listen module=store status=ok");
        Ok(Subscription::with_guard(receiver, guard))
    }

    fn batch_limit(&self) -> usize {
        self.batch_limit
    }
}

fn insert_task(conn: &Connection, user_id: &str, id: &str, task: &Task) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO tasks (
            id,
            user_id,
            text,
            due_date,
            completed,
            creature_name,
            creature_types,
            creature_stats,
            creature_image_url
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9);",
        params![
            id,
            user_id,
            task.text.trim(),
            task.due_date.trim(),
            task.completed,
            task.enrichment.name,
            task.enrichment.types,
            task.enrichment.stat_summary,
            task.enrichment.image_url,
        ],
    )?;
    Ok(())
}

fn query_tasks(conn: &Connection, user_id: &str) -> StoreResult<Vec<Task>> {
    let mut stmt = conn.prepare(&format!(
        "{TASK_SELECT_SQL} WHERE user_id = ?1 ORDER BY due_date ASC, id ASC;"
    ))?;
    let mut rows = stmt.query([user_id])?;
    let mut tasks = Vec::new();
    while let Some(row) = rows.next()? {
        tasks.push(parse_task_row(row)?);
    }
    Ok(tasks)
}

fn get_task(conn: &Connection, user_id: &str, id: &str) -> StoreResult<Option<Task>> {
    let mut stmt = conn.prepare(&format!(
        "{TASK_SELECT_SQL} WHERE user_id = ?1 AND id = ?2;"
    ))?;
    let row = stmt
        .query_row(params![user_id, id], |row| Ok(parse_task_row(row)))
        .optional()?;
    row.transpose()
}

fn parse_task_row(row: &Row<'_>) -> StoreResult<Task> {
    let id: String = row.get("id")?;
    let text: String = row.get("text")?;
    if text.trim().is_empty() {
        return Err(StoreError::InvalidData(format!(
            "blank text for task `{id}` in tasks.text"
        )));
    }

    let completed = match row.get::<_, i64>("completed")? {
        0 => false,
        1 => true,
        other => {
            return Err(StoreError::InvalidData(format!(
                "invalid completed value `{other}` in tasks.completed"
            )));
        }
    };

    Ok(Task {
        id,
        text,
        due_date: row.get("due_date")?,
        completed,
        enrichment: Enrichment {
            name: row.get("creature_name")?,
            types: row.get("creature_types")?,
            stat_summary: row.get("creature_stats")?,
            image_url: row.get("creature_image_url")?,
        },
    })
}
