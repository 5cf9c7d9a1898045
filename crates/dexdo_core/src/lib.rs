//! Core domain logic for DexDo, the creature-enriched to-do list.
//! This crate is the single source of truth for task invariants.

pub mod auth;
pub mod config;
pub mod db;
pub mod enrichment;
pub mod export;
pub mod feed;
pub mod logging;
pub mod model;
pub mod reminder;
pub mod service;
pub mod store;

pub use auth::{
    AuthError, AuthErrorCode, AuthResult, IdentityProvider, LocalIdentityProvider, Session,
    SessionController, LOCKOUT_WINDOW,
};
pub use config::{ConfigError, CoreConfig, LookupConfig};
pub use enrichment::{
    build_enrichment, lookup_key, CreatureLookup, CreatureRecord, LookupError, PokeApiClient,
};
pub use export::{render_report, write_report, ExportError};
pub use feed::{FeedError, FeedResult, TaskFeed, TaskViews};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::priority::{classify, classify_today, today_local, Priority};
pub use model::task::{Enrichment, Task, TaskId, TaskValidationError, UserId, DUE_DATE_FORMAT};
pub use reminder::{plan_reminders, reminder_at, should_show_stale_banner, PlannedReminder};
pub use service::task_service::{CreatedTask, ServiceError, ServiceResult, TaskService};
pub use store::{
    SnapshotEvent, SnapshotSender, SqliteTaskStore, StoreError, StoreResult, Subscription,
    TaskPatch, TaskStore, BATCH_LIMIT,
};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
