//! Domain model for the task list.
//!
//! # Responsibility
//! - Define the canonical task record shared by store, feed and FFI.
//! - Derive display priority from stored fields without persisting it.
//!
//! # Invariants
//! - A persisted task always carries a store-assigned `TaskId`.
//! - Priority is recomputed on every read; it is never stored.

pub mod priority;
pub mod task;
