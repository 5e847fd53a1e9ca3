use serde::Serialize;

use crate::model::{Item, Task, TimeEntry, TimerState};
use crate::progress::ProgressReport;

#[derive(Serialize)]
pub struct TaskDetail<'a> {
    #[serde(flatten)]
    pub task: &'a Task,
    pub report: &'a ProgressReport,
    pub subtasks: &'a [Item],
    pub checklist: &'a [Item],
    pub tracked_secs: i64,
}

const BAR_WIDTH: usize = 10;

/// `[###-------]` for 30%.
pub fn progress_bar(pct: u8) -> String {
    let filled = (usize::from(pct.min(100)) * BAR_WIDTH + 50) / 100;
    format!("[{}{}]", "#".repeat(filled), "-".repeat(BAR_WIDTH - filled))
}

/// `1h 02m 05s`, `3m 10s`, `42s`
pub fn format_duration(secs: i64) -> String {
    let secs = secs.max(0);
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}h {m:02}m {s:02}s")
    } else if m > 0 {
        format!("{m}m {s:02}s")
    } else {
        format!("{s}s")
    }
}

pub fn format_report(report: &ProgressReport) -> String {
    if report.manual {
        format!(
            "{}: {:>3}% {} (manual; calculated {}% from {})\n",
            report.task,
            report.stored,
            progress_bar(report.stored),
            report.derived,
            report.derived_source
        )
    } else {
        format!(
            "{}: {:>3}% {} ({})\n",
            report.task,
            report.stored,
            progress_bar(report.stored),
            report.source
        )
    }
}

fn format_items(out: &mut String, heading: &str, items: &[Item]) {
    if items.is_empty() {
        return;
    }
    let done = items.iter().filter(|i| i.done).count();
    out.push('\n');
    out.push_str(&format!("{heading} ({done}/{}):\n", items.len()));
    for item in items {
        let mark = if item.done { "x" } else { " " };
        out.push_str(&format!("  [{mark}] #{} {}\n", item.id, item.title));
    }
}

pub fn format_task_detail(
    task: &Task,
    report: &ProgressReport,
    subtasks: &[Item],
    checklist: &[Item],
    tracked_secs: i64,
) -> String {
    let mut out = String::new();
    out.push_str(&format!("Name:        {}\n", task.name));
    if !task.title.is_empty() {
        out.push_str(&format!("Title:       {}\n", task.title));
    }
    out.push_str(&format!("Status:      {}\n", task.status));
    out.push_str(&format!(
        "Progress:    {}% {}\n",
        report.stored,
        progress_bar(report.stored)
    ));
    if report.manual {
        out.push_str(&format!(
            "Source:      manual (calculated {}% from {})\n",
            report.derived, report.derived_source
        ));
    } else {
        out.push_str(&format!("Source:      {}\n", report.source));
    }
    if tracked_secs > 0 {
        out.push_str(&format!("Tracked:     {}\n", format_duration(tracked_secs)));
    }
    out.push_str(&format!("Created:     {}\n", task.created_at));
    out.push_str(&format!("Updated:     {}\n", task.updated_at));

    format_items(&mut out, "Subtasks", subtasks);
    format_items(&mut out, "Checklist", checklist);
    out
}

pub fn format_task_list(tasks: &[Task]) -> String {
    let width = tasks.iter().map(|t| t.name.len()).max().unwrap_or(0);
    let mut out = String::new();
    for task in tasks {
        let title = if task.title.is_empty() {
            String::new()
        } else {
            format!("  {}", task.title)
        };
        out.push_str(&format!(
            "{} {:<width$} {:>3}% {}{}\n",
            task.status.icon(),
            task.name,
            task.progress,
            progress_bar(task.progress),
            title
        ));
    }
    out
}

pub fn format_time_entry(entry: &TimeEntry, now: i64) -> String {
    let state = match entry.state() {
        TimerState::Running => "running",
        TimerState::Paused => "paused",
        TimerState::Stopped => "stopped",
    };
    format!(
        "{} on '{}': {} ({state})\n",
        entry.user,
        entry.task,
        format_duration(entry.elapsed_at(now))
    )
}
