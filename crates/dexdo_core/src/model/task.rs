//! Task domain model.
//!
//! # Responsibility
//! - Define the canonical to-do record and its enrichment payload.
//! - Validate write-side invariants before anything reaches the store.
//!
//! # Invariants
//! - `text` is never blank for a persisted task.
//! - `due_date` is empty or formatted as `yyyy/MM/dd`.
//! - `id` is empty until the store assigns one.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// `chrono` pattern for the fixed `yyyy/MM/dd` due date format.
pub const DUE_DATE_FORMAT: &str = "%Y/%m/%d";

/// Opaque store-assigned identifier.
///
/// Kept as a type alias so signatures read as domain intent.
pub type TaskId = String;

/// Identifier of the authenticated user owning a task collection.
pub type UserId = String;

/// Creature data attached to a task after a successful name lookup.
///
/// All fields are empty when the lookup was skipped or failed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrichment {
    /// Capitalized display name, e.g. `Pikachu`.
    pub name: String,
    /// Category labels joined with `", "`.
    pub types: String,
    /// Formatted base stats, e.g. `HP: 35, Atk: 55, ...`.
    pub stat_summary: String,
    /// Sprite URL, empty when the service returned none.
    pub image_url: String,
}

impl Enrichment {
    /// Returns whether no enrichment data is attached.
    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
            && self.types.is_empty()
            && self.stat_summary.is_empty()
            && self.image_url.is_empty()
    }
}

/// One to-do item in a user's collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub text: String,
    /// `yyyy/MM/dd` or empty for "no due date".
    pub due_date: String,
    pub completed: bool,
    pub enrichment: Enrichment,
}

/// Validation errors for task write paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskValidationError {
    BlankText,
    InvalidDueDate(String),
}

impl Display for TaskValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankText => write!(f, "task text cannot be blank"),
            Self::InvalidDueDate(value) => {
                write!(f, "due date `{value}` does not match yyyy/MM/dd")
            }
        }
    }
}

impl Error for TaskValidationError {}

impl Task {
    /// Creates an unsaved, pending task with no enrichment.
    pub fn new(text: impl Into<String>, due_date: impl Into<String>) -> Self {
        Self {
            id: TaskId::new(),
            text: text.into(),
            due_date: due_date.into(),
            completed: false,
            enrichment: Enrichment::default(),
        }
    }

    /// Returns whether the store has assigned an id.
    pub fn is_persisted(&self) -> bool {
        !self.id.is_empty()
    }

    /// Parses `due_date`, returning `None` when blank or malformed.
    pub fn parsed_due_date(&self) -> Option<NaiveDate> {
        parse_due_date(&self.due_date)
    }

    /// Checks write-side invariants.
    ///
    /// # Errors
    /// - `BlankText` when `text` is empty after trimming.
    /// - `InvalidDueDate` when `due_date` is set but not `yyyy/MM/dd`.
    pub fn validate(&self) -> Result<(), TaskValidationError> {
        validate_fields(&self.text, &self.due_date)
    }
}

/// Validates raw text/date input before it becomes a task.
pub fn validate_fields(text: &str, due_date: &str) -> Result<(), TaskValidationError> {
    validate_text(text)?;
    validate_due_date(due_date)
}

pub fn validate_text(text: &str) -> Result<(), TaskValidationError> {
    if text.trim().is_empty() {
        return Err(TaskValidationError::BlankText);
    }
    Ok(())
}

/// Accepts an empty value or a `yyyy/MM/dd` date.
pub fn validate_due_date(due_date: &str) -> Result<(), TaskValidationError> {
    let due_date = due_date.trim();
    if !due_date.is_empty() && parse_due_date(due_date).is_none() {
        return Err(TaskValidationError::InvalidDueDate(due_date.to_string()));
    }
    Ok(())
}

/// Parses a due date string under the fixed `yyyy/MM/dd` format.
pub fn parse_due_date(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(trimmed, DUE_DATE_FORMAT).ok()
}

/// Formats a calendar date as a due date string.
pub fn format_due_date(date: NaiveDate) -> String {
    date.format(DUE_DATE_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::{format_due_date, parse_due_date, validate_fields, Task, TaskValidationError};
    use chrono::NaiveDate;

    #[test]
    fn new_task_starts_pending_and_unsaved() {
        let task = Task::new("buy milk", "2026/10/20");
        assert!(!task.completed);
        assert!(!task.is_persisted());
        assert!(task.enrichment.is_empty());
    }

    #[test]
    fn validate_rejects_blank_text() {
        assert_eq!(
            validate_fields("   ", ""),
            Err(TaskValidationError::BlankText)
        );
    }

    #[test]
    fn validate_rejects_wrong_date_format() {
        let err = validate_fields("walk", "2026-10-20").expect_err("dash format must fail");
        assert!(matches!(err, TaskValidationError::InvalidDueDate(_)));
    }

    #[test]
    fn parse_and_format_use_slash_format() {
        let date = NaiveDate::from_ymd_opt(2026, 1, 5).expect("valid date");
        assert_eq!(format_due_date(date), "2026/01/05");
        assert_eq!(parse_due_date(" 2026/01/05 "), Some(date));
        assert_eq!(parse_due_date(""), None);
        assert_eq!(parse_due_date("2026/13/40"), None);
    }
}
