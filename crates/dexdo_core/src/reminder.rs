//! Reminder scheduling rules.
//!
//! # Responsibility
//! - Compute one-shot due-date reminders for pending tasks.
//! - Decide when the "list unchanged" banner should show on app open.
//!
//! Delivery is left to the platform notification layer.

use crate::model::task::{parse_due_date, Task, TaskId};
use chrono::{NaiveDateTime, NaiveTime};
use std::time::Duration;

/// One reminder to hand to the platform scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedReminder {
    pub task_id: TaskId,
    /// Local wall-clock instant at which to fire.
    pub fire_at: NaiveDateTime,
    pub title: String,
}

/// Returns the local instant on `due_date` at `hour:00`.
///
/// `None` for blank or malformed dates, or an hour outside `0..=23`.
pub fn reminder_at(due_date: &str, hour: u32) -> Option<NaiveDateTime> {
    let date = parse_due_date(due_date)?;
    let time = NaiveTime::from_hms_opt(hour, 0, 0)?;
    Some(date.and_time(time))
}

/// Plans reminders for pending tasks whose fire time is after `now`.
///
/// Output is ordered by fire time, then task id.
pub fn plan_reminders(tasks: &[Task], now: NaiveDateTime, hour: u32) -> Vec<PlannedReminder> {
    let mut planned: Vec<PlannedReminder> = tasks
        .iter()
        .filter(|task| !task.completed)
        .filter_map(|task| {
            let fire_at = reminder_at(&task.due_date, hour)?;
            (fire_at > now).then(|| PlannedReminder {
                task_id: task.id.clone(),
                fire_at,
                title: task.text.clone(),
            })
        })
        .collect();
    planned.sort_by(|a, b| {
        a.fire_at
            .cmp(&b.fire_at)
            .then_with(|| a.task_id.cmp(&b.task_id))
    });
    planned
}

/// Returns whether the list has been unchanged for at least `timeout`.
///
/// A clock that moved backwards never shows the banner.
pub fn should_show_stale_banner(
    last_changed: NaiveDateTime,
    now: NaiveDateTime,
    timeout: Duration,
) -> bool {
    match (now - last_changed).to_std() {
        Ok(elapsed) => elapsed >= timeout,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::{plan_reminders, reminder_at, should_show_stale_banner};
    use crate::model::task::Task;
    use chrono::{NaiveDate, NaiveDateTime};
    use std::time::Duration;

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|date| date.and_hms_opt(h, 0, 0))
            .expect("valid datetime")
    }

    fn task(id: &str, due: &str, completed: bool) -> Task {
        let mut task = Task::new(format!("task {id}"), due);
        task.id = id.to_string();
        task.completed = completed;
        task
    }

    #[test]
    fn reminder_at_uses_fixed_hour() {
        assert_eq!(reminder_at("2026/10/20", 9), Some(at(2026, 10, 20, 9)));
        assert_eq!(reminder_at("", 9), None);
        assert_eq!(reminder_at("2026/10/20", 24), None);
    }

    #[test]
    fn plan_skips_completed_past_and_undated_tasks() {
        let now = at(2026, 10, 16, 12);
        let tasks = vec![
            task("later", "2026/10/20", false),
            task("today", "2026/10/16", false),
            task("done", "2026/10/21", true),
            task("nodate", "", false),
            task("soon", "2026/10/17", false),
        ];
        let planned = plan_reminders(&tasks, now, 9);
        let ids: Vec<_> = planned.iter().map(|r| r.task_id.as_str()).collect();
        assert_eq!(ids, vec!["soon", "later"]);
    }

    #[test]
    fn stale_banner_respects_timeout_and_clock_skew() {
        let timeout = Duration::from_secs(24 * 3600);
        assert!(should_show_stale_banner(at(2026, 10, 15, 8), at(2026, 10, 16, 9), timeout));
        assert!(!should_show_stale_banner(at(2026, 10, 16, 8), at(2026, 10, 16, 9), timeout));
        assert!(!should_show_stale_banner(at(2026, 10, 17, 8), at(2026, 10, 16, 9), timeout));
    }
}
