//! FFI use-case API for Flutter-facing calls.
//!
//! # Responsibility
//! - Expose stable, use-case-level functions to Dart via FRB.
//! - Own the process-wide runtime, store, feed and identity provider.
//!
//! # Invariants
//! - Exported functions must not panic across FFI boundary.
//! - Failures are reported through envelopes, never through panics.
//! - Task lists reflect the latest listener snapshot, so a write may take a
//!   moment to show up in `task_list`.

use chrono::{Local, TimeZone};
use dexdo_core::db::open_db;
use dexdo_core::model::priority::{sort_for_display, task_priority};
use dexdo_core::{
    classify_today, core_version as core_version_inner, init_logging as init_logging_inner,
    ping as ping_inner, plan_reminders, should_show_stale_banner, today_local, write_report,
    AuthError, ConfigError, CoreConfig, LocalIdentityProvider, PokeApiClient, Session, SessionController,
    SqliteTaskStore, Task, TaskFeed, TaskService,
};
use log::{error, info};
use std::path::Path;
use std::sync::{Arc, OnceLock};
use tokio::runtime::{Builder, Runtime};

const REMINDER_TIME_FORMAT: &str = "%Y/%m/%d %H:%M";

static APP: OnceLock<Result<AppContext, String>> = OnceLock::new();

/// Process-wide wiring shared by every FFI call.
struct AppContext {
    config: CoreConfig,
    // Keeps listener and enrichment tasks alive for the process lifetime.
    _runtime: Runtime,
    feed: Arc<TaskFeed>,
    tasks: TaskService,
    session: SessionController,
}

impl AppContext {
    fn build() -> Result<Self, String> {
        let config = load_config().map_err(|err| format!("config invalid: {err}"))?;
        let runtime = Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("dexdo-core")
            .enable_all()
            .build()
            .map_err(|err| format!("runtime start failed: {err}"))?;

        let store = SqliteTaskStore::open(&config.db_path)
            .map_err(|err| format!("task store open failed: {err}"))?;
        let users = open_db(&config.db_path)
            .map_err(|err| format!("identity store open failed: {err}"))?;
        let lookup = PokeApiClient::new(&config.lookup)
            .map_err(|err| format!("lookup client init failed: {err}"))?;

        let feed = Arc::new(TaskFeed::new(Arc::new(store), runtime.handle().clone()));
        let tasks = TaskService::new(Arc::clone(&feed), Arc::new(lookup));
        let session = SessionController::new(
            Arc::new(LocalIdentityProvider::new(users)),
            Arc::clone(&feed),
        );
        info!("event=ffi_init module=ffi status=ok");

        Ok(Self {
            config,
            _runtime: runtime,
            feed,
            tasks,
            session,
        })
    }
}

#[cfg(not(test))]
fn load_config() -> Result<CoreConfig, ConfigError> {
    CoreConfig::from_env()
}

// Unit tests share one process-wide context; keep it off the network
// and away from the default database file.
#[cfg(test)]
fn load_config() -> Result<CoreConfig, ConfigError> {
    let mut config = CoreConfig::from_env()?;
    config.db_path = std::env::temp_dir().join("dexdo_ffi_test.sqlite3");
    config.lookup.base_url = TEST_LOOKUP_BASE_URL.to_string();
    config.lookup.timeout = std::time::Duration::from_millis(200);
    Ok(config)
}

#[cfg(test)]
const TEST_LOOKUP_BASE_URL: &str = "http://127.0.0.1:9";

fn app() -> Result<&'static AppContext, String> {
    APP.get_or_init(|| {
        AppContext::build().inspect_err(|err| {
            error!("event=ffi_init module=ffi status=error error={err}");
        })
    })
    .as_ref()
    .map_err(Clone::clone)
}

/// Minimal health-check API for FRB smoke integration.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Expose core crate version through FFI.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// Input semantics:
/// - `level`: one of `trace|debug|info|warn|error` (case-insensitive).
/// - `log_dir`: absolute directory path where rolling logs are written.
///
/// # FFI contract
/// - Safe to call repeatedly with the same `level + log_dir` (idempotent).
/// - Reconfiguration attempts with different level or directory return error.
/// - Never panics; returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err,
    }
}

/// Display attributes of a task priority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorityView {
    /// Stable label (`expired|high|medium|low|unknown|completed`).
    pub label: String,
    /// `#AARRGGBB` display color.
    pub color_hex: String,
    /// Sort rank; lower sorts first.
    pub rank: u8,
}

/// Classifies a task against today's local date.
///
/// Malformed dates yield the `Unknown` priority rather than an error.
#[flutter_rust_bridge::frb(sync)]
pub fn task_priority_of(completed: bool, due_date: String) -> PriorityView {
    let priority = classify_today(completed, &due_date);
    PriorityView {
        label: priority.label().to_string(),
        color_hex: priority.color_hex().to_string(),
        rank: priority.rank(),
    }
}

/// Maps a raw provider error code to the message shown to the user.
#[flutter_rust_bridge::frb(sync)]
pub fn auth_error_message(code: String, message: String) -> String {
    AuthError::from_provider(&code, message).user_message()
}

/// Result envelope for identity calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthResponse {
    pub ok: bool,
    /// Signed-in user ID on success.
    pub user_id: Option<String>,
    /// Canonical `ERROR_*` code on failure.
    pub error_code: Option<String>,
    /// User-facing message.
    pub message: String,
}

impl AuthResponse {
    fn from_result(result: Result<Session, AuthError>) -> Self {
        match result {
            Ok(session) => Self {
                ok: true,
                user_id: Some(session.user_id),
                error_code: None,
                message: "Signed in.".to_string(),
            },
            Err(err) => Self {
                ok: false,
                user_id: None,
                error_code: Some(err.code.as_str().to_string()),
                message: err.user_message(),
            },
        }
    }

    fn failure(message: String) -> Self {
        Self {
            ok: false,
            user_id: None,
            error_code: None,
            message,
        }
    }
}

/// Registers an email/password account and signs it in.
#[flutter_rust_bridge::frb(sync)]
pub fn auth_sign_up(email: String, password: String) -> AuthResponse {
    match app() {
        Ok(app) => AuthResponse::from_result(app.session.sign_up(&email, &password)),
        Err(err) => AuthResponse::failure(err),
    }
}

/// Signs in with email and password; the task list rebinds to the user.
#[flutter_rust_bridge::frb(sync)]
pub fn auth_sign_in(email: String, password: String) -> AuthResponse {
    match app() {
        Ok(app) => AuthResponse::from_result(app.session.sign_in_with_password(&email, &password)),
        Err(err) => AuthResponse::failure(err),
    }
}

/// Signs in with a federated identity (`provider_id`, provider `subject`).
#[flutter_rust_bridge::frb(sync)]
pub fn auth_sign_in_federated(provider_id: String, subject: String) -> AuthResponse {
    match app() {
        Ok(app) => AuthResponse::from_result(app.session.sign_in_federated(&provider_id, &subject)),
        Err(err) => AuthResponse::failure(err),
    }
}

/// Signs out and clears the task list.
#[flutter_rust_bridge::frb(sync)]
pub fn auth_sign_out() -> AuthResponse {
    match app() {
        Ok(app) => match app.session.sign_out() {
            Ok(()) => AuthResponse {
                ok: true,
                user_id: None,
                error_code: None,
                message: "Signed out.".to_string(),
            },
            Err(err) => AuthResponse::from_result(Err(err)),
        },
        Err(err) => AuthResponse::failure(err),
    }
}

/// Returns the signed-in user ID, if any.
#[flutter_rust_bridge::frb(sync)]
pub fn auth_current_user() -> Option<String> {
    app().ok().and_then(|app| app.feed.current_user())
}

/// One task row as rendered by the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskItem {
    pub id: String,
    pub text: String,
    /// `yyyy/MM/dd` or empty.
    pub due_date: String,
    pub completed: bool,
    pub priority: PriorityView,
    pub creature_name: String,
    pub creature_types: String,
    pub creature_stats: String,
    pub creature_image_url: String,
}

impl TaskItem {
    fn from_task(task: Task, today: chrono::NaiveDate) -> Self {
        let priority = task_priority(&task, today);
        Self {
            id: task.id,
            text: task.text,
            due_date: task.due_date,
            completed: task.completed,
            priority: PriorityView {
                label: priority.label().to_string(),
                color_hex: priority.color_hex().to_string(),
                rank: priority.rank(),
            },
            creature_name: task.enrichment.name,
            creature_types: task.enrichment.types,
            creature_stats: task.enrichment.stat_summary,
            creature_image_url: task.enrichment.image_url,
        }
    }
}

/// Pending/completed split of the signed-in user's tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskListResponse {
    /// Pending tasks sorted by priority, then store order.
    pub pending: Vec<TaskItem>,
    /// Completed tasks in store order.
    pub completed: Vec<TaskItem>,
    pub message: String,
}

/// Returns the latest task views for the signed-in user.
///
/// # FFI contract
/// - Never blocks on the store; reads the cached snapshot.
/// - Returns empty lists when signed out.
#[flutter_rust_bridge::frb(sync)]
pub fn task_list() -> TaskListResponse {
    let app = match app() {
        Ok(app) => app,
        Err(err) => {
            return TaskListResponse {
                pending: Vec::new(),
                completed: Vec::new(),
                message: err,
            };
        }
    };

    let views = app.feed.views();
    let today = today_local();
    let mut pending = views.pending;
    sort_for_display(&mut pending, today);
    let message = format!(
        "{} pending, {} completed.",
        pending.len(),
        views.completed.len()
    );
    TaskListResponse {
        pending: pending
            .into_iter()
            .map(|task| TaskItem::from_task(task, today))
            .collect(),
        completed: views
            .completed
            .into_iter()
            .map(|task| TaskItem::from_task(task, today))
            .collect(),
        message,
    }
}

/// Generic action response envelope for task commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskActionResponse {
    /// Whether operation succeeded.
    pub ok: bool,
    /// Affected task ID, when one applies.
    pub task_id: Option<String>,
    /// Human-readable response message for diagnostics/UI.
    pub message: String,
}

impl TaskActionResponse {
    fn success(message: impl Into<String>, task_id: Option<String>) -> Self {
        Self {
            ok: true,
            task_id,
            message: message.into(),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            task_id: None,
            message: message.into(),
        }
    }
}

fn with_tasks<T>(
    op: &str,
    f: impl FnOnce(&AppContext) -> Result<T, String>,
) -> Result<T, String> {
    let app = app()?;
    f(app).map_err(|err| format!("{op} failed: {err}"))
}

/// Creates a pending task; creature enrichment completes in the background.
#[flutter_rust_bridge::frb(sync)]
pub fn task_create(text: String, due_date: String) -> TaskActionResponse {
    let result = with_tasks("task_create", |app| {
        app.tasks
            .create_task(&text, &due_date)
            .map(|created| created.id)
            .map_err(|err| err.to_string())
    });
    match result {
        Ok(id) => TaskActionResponse::success("Task created.", Some(id)),
        Err(err) => TaskActionResponse::failure(err),
    }
}

/// Replaces a task's text and due date.
#[flutter_rust_bridge::frb(sync)]
pub fn task_edit(id: String, text: String, due_date: String) -> TaskActionResponse {
    let result = with_tasks("task_edit", |app| {
        app.tasks
            .edit_task(&id, &text, &due_date)
            .map_err(|err| err.to_string())
    });
    match result {
        Ok(()) => TaskActionResponse::success("Task updated.", Some(id)),
        Err(err) => TaskActionResponse::failure(err),
    }
}

/// Marks a task completed or pending.
#[flutter_rust_bridge::frb(sync)]
pub fn task_set_completed(id: String, completed: bool) -> TaskActionResponse {
    let result = with_tasks("task_set_completed", |app| {
        app.tasks
            .toggle_completed(&id, completed)
            .map_err(|err| err.to_string())
    });
    match result {
        Ok(()) => TaskActionResponse::success("Task updated.", Some(id)),
        Err(err) => TaskActionResponse::failure(err),
    }
}

/// Deletes a task; `task_undo_delete` can bring it back.
#[flutter_rust_bridge::frb(sync)]
pub fn task_delete(id: String) -> TaskActionResponse {
    let result = with_tasks("task_delete", |app| {
        app.tasks.delete_task(&id).map_err(|err| err.to_string())
    });
    match result {
        Ok(()) => TaskActionResponse::success("Task deleted.", Some(id)),
        Err(err) => TaskActionResponse::failure(err),
    }
}

/// Restores the most recently deleted task under its original ID.
#[flutter_rust_bridge::frb(sync)]
pub fn task_undo_delete() -> TaskActionResponse {
    let result = with_tasks("task_undo_delete", |app| {
        app.tasks.undo_delete().map_err(|err| err.to_string())
    });
    match result {
        Ok(Some(id)) => TaskActionResponse::success("Task restored.", Some(id)),
        Ok(None) => TaskActionResponse::success("Nothing to undo.", None),
        Err(err) => TaskActionResponse::failure(err),
    }
}

/// Deletes every task of the signed-in user.
#[flutter_rust_bridge::frb(sync)]
pub fn task_clear_all() -> TaskActionResponse {
    let result = with_tasks("task_clear_all", |app| {
        app.tasks.clear_all().map_err(|err| err.to_string())
    });
    match result {
        Ok(count) => TaskActionResponse::success(format!("Deleted {count} task(s)."), None),
        Err(err) => TaskActionResponse::failure(err),
    }
}

/// Writes the current task list as a text report into `dir`.
///
/// On success `message` carries the written file path.
#[flutter_rust_bridge::frb(sync)]
pub fn task_export(dir: String) -> TaskActionResponse {
    let result = with_tasks("task_export", |app| {
        write_report(Path::new(dir.trim()), &app.feed.views(), today_local())
            .map_err(|err| err.to_string())
    });
    match result {
        Ok(path) => TaskActionResponse::success(path.display().to_string(), None),
        Err(err) => TaskActionResponse::failure(err),
    }
}

/// One due-date reminder for the platform notification scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderItem {
    pub task_id: String,
    /// Local wall-clock time, `yyyy/MM/dd HH:mm`.
    pub fire_at: String,
    pub title: String,
}

/// Plans reminders for the signed-in user's pending tasks.
///
/// Returns an empty list when signed out or when core init failed.
#[flutter_rust_bridge::frb(sync)]
pub fn task_reminders() -> Vec<ReminderItem> {
    let Ok(app) = app() else {
        return Vec::new();
    };
    let views = app.feed.views();
    plan_reminders(
        &views.tasks,
        Local::now().naive_local(),
        app.config.reminder_hour,
    )
    .into_iter()
    .map(|reminder| ReminderItem {
        task_id: reminder.task_id,
        fire_at: reminder.fire_at.format(REMINDER_TIME_FORMAT).to_string(),
        title: reminder.title,
    })
    .collect()
}

/// Whether the "list unchanged" banner should show on app open.
///
/// `last_changed_epoch_ms` is the last time the task list changed.
#[flutter_rust_bridge::frb(sync)]
pub fn stale_banner_visible(last_changed_epoch_ms: i64) -> bool {
    let Ok(app) = app() else {
        return false;
    };
    let Some(last_changed) = Local.timestamp_millis_opt(last_changed_epoch_ms).single() else {
        return false;
    };
    should_show_stale_banner(
        last_changed.naive_local(),
        Local::now().naive_local(),
        app.config.stale_banner_after,
    )
}

#[cfg(test)]
mod tests {
    use super::{
        app, auth_current_user, auth_error_message, auth_sign_in, auth_sign_out, auth_sign_up,
        core_version, init_logging, load_config, ping, stale_banner_visible, task_clear_all,
        task_create, task_delete, task_export, task_list, task_priority_of, task_set_completed,
        task_undo_delete, TaskListResponse, TEST_LOOKUP_BASE_URL,
    };
    use std::thread::sleep;
    use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }

    #[test]
    fn init_logging_rejects_empty_log_dir() {
        let error = init_logging("info".to_string(), String::new());
        assert!(!error.is_empty());
    }

    #[test]
    fn init_logging_rejects_unsupported_level() {
        let error = init_logging("verbose".to_string(), "tmp/logs".to_string());
        assert!(!error.is_empty());
    }

    #[test]
    fn priority_of_malformed_date_is_unknown() {
        let view = task_priority_of(false, "20-10-2026".to_string());
        assert_eq!(view.label, "unknown");

        let done = task_priority_of(true, "1999/01/01".to_string());
        assert_eq!(done.label, "completed");
    }

    #[test]
    fn auth_error_message_maps_known_and_unknown_codes() {
        assert_eq!(
            auth_error_message("ERROR_WRONG_PASSWORD".to_string(), "raw".to_string()),
            "Incorrect password. Please try again."
        );
        assert_eq!(
            auth_error_message("ERROR_SOMETHING_NEW".to_string(), "Provider said no.".to_string()),
            "Provider said no."
        );
    }

    #[test]
    fn fresh_change_does_not_show_stale_banner() {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time went backwards")
            .as_millis() as i64;
        assert!(!stale_banner_visible(now_ms));
    }

    #[test]
    fn test_context_uses_local_lookup_endpoint() {
        let config = load_config().expect("test config should load");
        assert_eq!(config.lookup.base_url, TEST_LOOKUP_BASE_URL);
        let app = app().expect("context should build");
        assert_eq!(app.config.lookup.base_url, TEST_LOOKUP_BASE_URL);
    }

    // Single flow test: the signed-in session is process-wide state.
    #[test]
    fn task_flow_through_signed_in_session() {
        let email = format!("{}@example.com", unique_token("ffi"));
        let signed_up = auth_sign_up(email.clone(), "pikachu".to_string());
        assert!(signed_up.ok, "{}", signed_up.message);
        let user_id = signed_up.user_id.clone();
        assert_eq!(auth_current_user(), user_id);

        let wrong = auth_sign_in(email.clone(), "wrong-pass".to_string());
        assert!(!wrong.ok);
        assert_eq!(wrong.error_code.as_deref(), Some("ERROR_WRONG_PASSWORD"));

        let blank = task_create("   ".to_string(), String::new());
        assert!(!blank.ok);

        let created = task_create("walk the dog".to_string(), "2999/01/01".to_string());
        assert!(created.ok, "{}", created.message);
        let task_id = created.task_id.expect("create should return task_id");

        let listed = wait_for_list(|list| list.pending.iter().any(|item| item.id == task_id));
        let item = listed
            .pending
            .iter()
            .find(|item| item.id == task_id)
            .expect("created task listed");
        assert_eq!(item.priority.label, "low");

        assert!(task_set_completed(task_id.clone(), true).ok);
        wait_for_list(|list| list.completed.iter().any(|item| item.id == task_id));

        let export_dir = tempfile::tempdir().expect("tempdir");
        let exported = task_export(export_dir.path().display().to_string());
        assert!(exported.ok, "{}", exported.message);

        assert!(task_delete(task_id.clone()).ok);
        wait_for_list(|list| list.completed.is_empty() && list.pending.is_empty());
        let restored = task_undo_delete();
        assert_eq!(restored.task_id.as_deref(), Some(task_id.as_str()));
        wait_for_list(|list| list.completed.iter().any(|item| item.id == task_id));

        let cleared = task_clear_all();
        assert!(cleared.ok, "{}", cleared.message);
        wait_for_list(|list| list.completed.is_empty());

        assert!(auth_sign_out().ok);
        assert_eq!(auth_current_user(), None);
        assert!(!task_create("after sign-out".to_string(), String::new()).ok);

        let back = auth_sign_in(email, "pikachu".to_string());
        assert_eq!(back.user_id, user_id);
        assert!(auth_sign_out().ok);
    }

    fn wait_for_list(predicate: impl Fn(&TaskListResponse) -> bool) -> TaskListResponse {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let list = task_list();
            if predicate(&list) {
                return list;
            }
            assert!(Instant::now() < deadline, "task list never matched");
            sleep(Duration::from_millis(20));
        }
    }

    fn unique_token(prefix: &str) -> String {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time went backwards")
            .as_nanos();
        format!("{prefix}-{nanos}")
    }
}
