//! Priority classification for tasks.
//!
//! # Responsibility
//! - Map completion state and due date to a display category.
//! - Provide stable ordering, labels and colors for every category.
//!
//! # Invariants
//! - `classify` is pure and total: malformed input never panics or errors.
//! - Priority is never cached; "today" advances between calls.

use crate::model::task::{parse_due_date, Task};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};

const HIGH_MAX_DAYS: i64 = 7;
const MEDIUM_MAX_DAYS: i64 = 14;

/// Derived display category of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Completed,
    /// Due date is in the past.
    Expired,
    /// Due within the next 7 days, today included.
    High,
    /// Due in 8 to 14 days.
    Medium,
    /// Due in more than 14 days.
    Low,
    /// No due date, or one that does not parse.
    Unknown,
}

impl Priority {
    /// Sort rank used for display order; lower sorts first.
    pub fn rank(self) -> u8 {
        match self {
            Self::Expired => 0,
            Self::High => 1,
            Self::Medium => 2,
            Self::Low => 3,
            Self::Unknown => 4,
            Self::Completed => 5,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Expired => "expired",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Unknown => "unknown",
        }
    }

    /// ARGB hex color used by every UI surface for this category.
    pub fn color_hex(self) -> &'static str {
        match self {
            Self::Completed => "#FF9E9E9E",
            Self::Expired => "#FF616161",
            Self::High => "#FFE53935",
            Self::Medium => "#FFFFB300",
            Self::Low => "#FF43A047",
            Self::Unknown => "#FF1E88E5",
        }
    }
}

/// Classifies a task relative to `today`.
///
/// # Contract
/// - `completed == true` always yields `Completed`, whatever `due_date` holds.
/// - Blank or unparseable dates yield `Unknown`.
/// - Otherwise the calendar-day distance from `today` picks the bucket.
pub fn classify(completed: bool, due_date: &str, today: NaiveDate) -> Priority {
    if completed {
        return Priority::Completed;
    }
    let Some(due) = parse_due_date(due_date) else {
        return Priority::Unknown;
    };

    let days_until = due.signed_duration_since(today).num_days();
    if days_until < 0 {
        Priority::Expired
    } else if days_until <= HIGH_MAX_DAYS {
        Priority::High
    } else if days_until <= MEDIUM_MAX_DAYS {
        Priority::Medium
    } else {
        Priority::Low
    }
}

/// Classifies against the current local calendar date.
pub fn classify_today(completed: bool, due_date: &str) -> Priority {
    classify(completed, due_date, today_local())
}

/// Classifies one task relative to `today`.
pub fn task_priority(task: &Task, today: NaiveDate) -> Priority {
    classify(task.completed, &task.due_date, today)
}

/// Returns the local calendar date with no time-of-day component.
pub fn today_local() -> NaiveDate {
    Local::now().date_naive()
}

/// Sorts tasks for display: by priority rank, then due date, then id.
pub fn sort_for_display(tasks: &mut [Task], today: NaiveDate) {
    tasks.sort_by(|a, b| {
        task_priority(a, today)
            .rank()
            .cmp(&task_priority(b, today).rank())
            .then_with(|| a.due_date.cmp(&b.due_date))
            .then_with(|| a.id.cmp(&b.id))
    });
}
