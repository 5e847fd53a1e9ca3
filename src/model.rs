use std::fmt;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Review,
    Completed,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 4] = [
        Self::Pending,
        Self::InProgress,
        Self::Review,
        Self::Completed,
    ];

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "review" => Ok(Self::Review),
            "completed" => Ok(Self::Completed),
            _ => anyhow::bail!(
                "invalid status '{s}': must be pending, in_progress, review, or completed"
            ),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Review => "review",
            Self::Completed => "completed",
        }
    }

    /// Display icon: .=pending, *=in progress, ?=review, x=completed
    pub fn icon(self) -> &'static str {
        match self {
            Self::Pending => ".",
            Self::InProgress => "*",
            Self::Review => "?",
            Self::Completed => "x",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromSql for TaskStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        Self::parse(s).map_err(|e| FromSqlError::Other(e.into()))
    }
}

impl ToSql for TaskStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub id: i64,
    pub name: String,
    pub title: String,
    pub status: TaskStatus,
    /// Stored progress, 0..=100.
    pub progress: u8,
    pub created_at: String,
    pub updated_at: String,
}

/// Subtasks and checklist items share a shape; they differ only in which
/// derivation branch they feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Subtask,
    Checklist,
}

impl ItemKind {
    pub(crate) fn table(self) -> &'static str {
        match self {
            Self::Subtask => "subtasks",
            Self::Checklist => "checklist_items",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Subtask => "subtask",
            Self::Checklist => "checklist item",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Item {
    pub id: i64,
    pub task: String,
    pub title: String,
    pub done: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerState {
    Running,
    Paused,
    Stopped,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimeEntry {
    pub id: i64,
    pub task: String,
    pub user: String,
    /// Seconds accumulated up to the last pause (or stop).
    pub elapsed_secs: i64,
    /// Unix time the current running stretch began; None while paused or stopped.
    pub running_since: Option<i64>,
    pub started_at: String,
    pub stopped_at: Option<String>,
}

impl TimeEntry {
    pub fn state(&self) -> TimerState {
        match (&self.stopped_at, self.running_since) {
            (Some(_), _) => TimerState::Stopped,
            (None, Some(_)) => TimerState::Running,
            (None, None) => TimerState::Paused,
        }
    }

    /// Total tracked seconds as of unix time `now`.
    pub fn elapsed_at(&self, now: i64) -> i64 {
        match self.running_since {
            Some(since) => self.elapsed_secs + (now - since).max(0),
            None => self.elapsed_secs,
        }
    }
}
