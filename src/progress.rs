//! Progress derivation.
//!
//! A task's expected progress comes from, in order of precedence: its subtasks
//! alone, its checklist alone, the average of both, or a fixed baseline for its
//! status when it has neither. A stored value that strays more than
//! [`MANUAL_THRESHOLD`] points from the derived one is treated as a manual
//! override.

use std::fmt;

use serde::Serialize;

use crate::model::TaskStatus;

/// Largest drift between stored and derived progress still read as automatic.
pub const MANUAL_THRESHOLD: u8 = 5;

/// Completion counts for one task's subtasks and checklist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub subtasks_total: u32,
    pub subtasks_done: u32,
    pub checklist_total: u32,
    pub checklist_done: u32,
}

impl Counts {
    pub fn subtasks(total: u32, done: u32) -> Self {
        Self {
            subtasks_total: total,
            subtasks_done: done,
            ..Self::default()
        }
    }

    pub fn checklist(total: u32, done: u32) -> Self {
        Self {
            checklist_total: total,
            checklist_done: done,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressSource {
    Subtasks,
    Checklist,
    Hybrid,
    Status,
    Manual,
}

impl ProgressSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Subtasks => "subtasks",
            Self::Checklist => "checklist",
            Self::Hybrid => "hybrid",
            Self::Status => "status",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for ProgressSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Freshly computed progress and the branch that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Derived {
    pub percentage: u8,
    pub source: ProgressSource,
}

/// Baseline progress for a task with no subtasks and no checklist.
pub fn status_baseline(status: TaskStatus) -> u8 {
    match status {
        TaskStatus::Pending => 10,
        TaskStatus::InProgress => 50,
        TaskStatus::Review => 80,
        TaskStatus::Completed => 100,
    }
}

/// `num / den`, rounded half-up. `den` must be non-zero.
fn round_half_up(num: u64, den: u64) -> u8 {
    // (2n + d) / 2d == floor(n/d + 1/2)
    ((num * 2 + den) / (den * 2)) as u8
}

/// `done / total * 100`, rounded half-up. `total` must be non-zero.
fn percent(done: u32, total: u32) -> u8 {
    round_half_up(u64::from(done.min(total)) * 100, u64::from(total))
}

/// Mean of two completion ratios as a percentage, rounded once at the end.
fn mean_percent((a_done, a_total): (u32, u32), (b_done, b_total): (u32, u32)) -> u8 {
    let (a_done, a_total) = (u64::from(a_done.min(a_total)), u64::from(a_total));
    let (b_done, b_total) = (u64::from(b_done.min(b_total)), u64::from(b_total));
    // (a/at + b/bt) / 2 * 100 == 100(a*bt + b*at) / 2(at*bt)
    round_half_up(
        100 * (a_done * b_total + b_done * a_total),
        2 * a_total * b_total,
    )
}

pub fn derive(counts: Counts, status: TaskStatus) -> Derived {
    let Counts {
        subtasks_total,
        subtasks_done,
        checklist_total,
        checklist_done,
    } = counts;

    match (subtasks_total > 0, checklist_total > 0) {
        (true, false) => Derived {
            percentage: percent(subtasks_done, subtasks_total),
            source: ProgressSource::Subtasks,
        },
        (false, true) => Derived {
            percentage: percent(checklist_done, checklist_total),
            source: ProgressSource::Checklist,
        },
        (true, true) => Derived {
            percentage: mean_percent(
                (subtasks_done, subtasks_total),
                (checklist_done, checklist_total),
            ),
            source: ProgressSource::Hybrid,
        },
        (false, false) => Derived {
            percentage: status_baseline(status),
            source: ProgressSource::Status,
        },
    }
}

pub fn is_manual(stored: u8, derived: u8) -> bool {
    stored.abs_diff(derived) > MANUAL_THRESHOLD
}

/// What a task shows: its stored value next to what derivation says it should be.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressReport {
    pub task: String,
    pub stored: u8,
    pub derived: u8,
    /// Branch that produced `derived`.
    pub derived_source: ProgressSource,
    /// `Manual` when the stored value is an override, otherwise `derived_source`.
    pub source: ProgressSource,
    pub manual: bool,
}

impl ProgressReport {
    pub fn new(task: &str, stored: u8, counts: Counts, status: TaskStatus) -> Self {
        let derived = derive(counts, status);
        let manual = is_manual(stored, derived.percentage);
        Self {
            task: task.to_string(),
            stored,
            derived: derived.percentage,
            derived_source: derived.source,
            source: if manual {
                ProgressSource::Manual
            } else {
                derived.source
            },
            manual,
        }
    }
}
