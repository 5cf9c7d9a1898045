//! Use-case services.
//!
//! # Responsibility
//! - Orchestrate feed writes and enrichment into caller-level APIs.
//! - Keep FFI callers decoupled from store details.

pub mod task_service;
