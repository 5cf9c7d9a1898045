//! Plain-text export of the task list.
//!
//! # Responsibility
//! - Render pending and completed tasks into a readable report.
//! - Write the report to a user-visible directory, replacing older exports.

use crate::feed::TaskViews;
use crate::model::priority::task_priority;
use crate::model::task::Task;
use chrono::NaiveDate;
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter, Write as _};
use std::path::{Path, PathBuf};

pub const EXPORT_FILE_NAME: &str = "dexdo_tasks.txt";

#[derive(Debug)]
pub enum ExportError {
    Io { path: PathBuf, source: std::io::Error },
}

impl Display for ExportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to write export `{}`: {source}", path.display())
            }
        }
    }
}

impl Error for ExportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
        }
    }
}

/// Renders the report text for `views` as seen on `today`.
pub fn render_report(views: &TaskViews, today: NaiveDate) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "To-do list export ({})", today.format("%Y/%m/%d"));
    write_section(&mut out, "Pending", &views.pending, today);
    write_section(&mut out, "Completed", &views.completed, today);
    out
}

fn write_section(out: &mut String, title: &str, tasks: &[Task], today: NaiveDate) {
    let _ = writeln!(out);
    let _ = writeln!(out, "{title} ({})", tasks.len());
    if tasks.is_empty() {
        let _ = writeln!(out, "  (none)");
        return;
    }
    for task in tasks {
        let due = if task.due_date.trim().is_empty() {
            "no due date"
        } else {
            task.due_date.as_str()
        };
        let _ = write!(
            out,
            "  - [{}] {} (due: {due})",
            task_priority(task, today).label(),
            task.text
        );
        if !task.enrichment.name.is_empty() {
            let _ = write!(out, " - {}", task.enrichment.name);
        }
        let _ = writeln!(out);
    }
}

/// Writes the report into `dir`, overwriting a previous export.
///
/// Returns the path of the written file.
pub fn write_report(dir: &Path, views: &TaskViews, today: NaiveDate) -> Result<PathBuf, ExportError> {
    let path = dir.join(EXPORT_FILE_NAME);
    std::fs::create_dir_all(dir)
        .and_then(|()| std::fs::write(&path, render_report(views, today)))
        .map_err(|source| ExportError::Io {
            path: path.clone(),
            source,
        })?;
    info!(
        "event=export_write module=export status=ok pending={} completed={}",
        views.pending.len(),
        views.completed.len()
    );
    Ok(path)
}
