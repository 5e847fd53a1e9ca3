//! Keeps stored progress and displayed progress in step.
//!
//! Stored progress only changes on explicit user action: a manual set or a
//! reset back to the derived value. Every other mutation just recomputes the
//! report that gets displayed.

use std::collections::HashMap;
use std::sync::mpsc::Receiver;

use anyhow::Context;
use log::{debug, info};
use rusqlite::{Connection, OptionalExtension};

use crate::changes::{self, Change, ChangeBus, ChangeKind};
use crate::error::{SyncError, SyncResult};
use crate::model::TaskStatus;
use crate::ops;
use crate::progress::{derive, Counts, ProgressReport};
use crate::validate::validate_percentage;

/// Everything derivation needs to know about one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskSnapshot {
    pub status: TaskStatus,
    pub stored: u8,
    pub counts: Counts,
}

pub trait ProgressStore {
    /// Current status, stored progress, and item counts; `None` if the task
    /// does not exist.
    fn snapshot(&self, task: &str) -> anyhow::Result<Option<TaskSnapshot>>;

    fn write_progress(&self, task: &str, progress: u8) -> anyhow::Result<()>;
}

const SNAPSHOT: &str = "
SELECT t.status, t.progress,
    (SELECT COUNT(*) FROM subtasks WHERE task = t.name),
    (SELECT COUNT(*) FROM subtasks WHERE task = t.name AND done = 1),
    (SELECT COUNT(*) FROM checklist_items WHERE task = t.name),
    (SELECT COUNT(*) FROM checklist_items WHERE task = t.name AND done = 1)
FROM tasks t
WHERE t.name = ?1
";

impl ProgressStore for Connection {
    fn snapshot(&self, task: &str) -> anyhow::Result<Option<TaskSnapshot>> {
        let snap = self
            .query_row(SNAPSHOT, [task], |row| {
                Ok(TaskSnapshot {
                    status: row.get(0)?,
                    stored: row.get(1)?,
                    counts: Counts {
                        subtasks_total: row.get(2)?,
                        subtasks_done: row.get(3)?,
                        checklist_total: row.get(4)?,
                        checklist_done: row.get(5)?,
                    },
                })
            })
            .optional()
            .with_context(|| format!("failed to read progress for '{task}'"))?;
        Ok(snap)
    }

    fn write_progress(&self, task: &str, progress: u8) -> anyhow::Result<()> {
        ops::write_progress(self, task, progress)
            .with_context(|| format!("failed to store progress for '{task}'"))
    }
}

pub struct ProgressSync<'a, S: ProgressStore + ?Sized> {
    store: &'a S,
    bus: ChangeBus,
    displayed: HashMap<String, ProgressReport>,
}

impl<'a, S: ProgressStore + ?Sized> ProgressSync<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            bus: ChangeBus::new(),
            displayed: HashMap::new(),
        }
    }

    pub fn subscribe(&self, task: &str) -> Receiver<Change> {
        self.bus.subscribe(task)
    }

    /// Announce a mutation to `change.task`'s subscribers.
    pub fn publish(&self, change: Change) -> usize {
        self.bus.publish(change)
    }

    /// The report last computed for `task`, if any.
    pub fn displayed(&self, task: &str) -> Option<&ProgressReport> {
        self.displayed.get(task)
    }

    fn snapshot(&self, task: &str) -> SyncResult<TaskSnapshot> {
        self.store
            .snapshot(task)?
            .ok_or_else(|| SyncError::NotFound(task.to_string()))
    }

    fn show(&mut self, report: ProgressReport) -> ProgressReport {
        self.displayed.insert(report.task.clone(), report.clone());
        report
    }

    /// Override stored progress with a user-chosen value.
    pub fn set_manual(&mut self, task: &str, percentage: i64) -> SyncResult<ProgressReport> {
        let pct = validate_percentage(percentage)
            .map_err(|_| SyncError::Validation { value: percentage })?;
        let snap = self.snapshot(task)?;
        self.store.write_progress(task, pct)?;
        info!("{task}: progress set to {pct}% by hand");

        let report = self.show(ProgressReport::new(task, pct, snap.counts, snap.status));
        self.bus.publish(Change::new(task, ChangeKind::Progress));
        Ok(report)
    }

    /// Replace stored progress with the value derived from live counts.
    pub fn reset_to_auto(&mut self, task: &str) -> SyncResult<ProgressReport> {
        let snap = self.snapshot(task)?;
        let derived = derive(snap.counts, snap.status);
        self.store.write_progress(task, derived.percentage)?;
        info!(
            "{task}: progress reset to {}% ({})",
            derived.percentage, derived.source
        );

        let report = self.show(ProgressReport::new(
            task,
            derived.percentage,
            snap.counts,
            snap.status,
        ));
        self.bus.publish(Change::new(task, ChangeKind::Progress));
        Ok(report)
    }

    /// Recompute what `task` displays. Never writes.
    pub fn on_related_change(&mut self, task: &str) -> SyncResult<ProgressReport> {
        let snap = self.snapshot(task)?;
        let report = ProgressReport::new(task, snap.stored, snap.counts, snap.status);
        debug!(
            "{task}: stored {}%, derived {}% ({}){}",
            report.stored,
            report.derived,
            report.derived_source,
            if report.manual { ", manual" } else { "" }
        );
        Ok(self.show(report))
    }

    /// Drain the changes queued on a [`subscribe`](Self::subscribe) receiver
    /// and, if any arrived, recompute their task once. A task deleted in the
    /// meantime is dropped from the display.
    pub fn process_pending(
        &mut self,
        rx: &Receiver<Change>,
    ) -> SyncResult<Option<ProgressReport>> {
        let Some(last) = changes::drain(rx).pop() else {
            return Ok(None);
        };
        let task = last.task;
        match self.on_related_change(&task) {
            Ok(report) => Ok(Some(report)),
            Err(SyncError::NotFound(_)) => {
                debug!("{task}: gone, dropping from display");
                self.displayed.remove(&task);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::db;
    use crate::model::ItemKind;
    use crate::progress::ProgressSource;

    fn task_with_checklist(conn: &Connection, name: &str, total: usize, done: usize) {
        ops::add_task(conn, name, "").unwrap();
        for i in 0..total {
            let id = ops::add_item(conn, ItemKind::Checklist, name, &format!("item {i}")).unwrap();
            if i < done {
                ops::set_item_done(conn, ItemKind::Checklist, id, true).unwrap();
            }
        }
    }

    #[test]
    fn snapshot_reads_counts_and_status() {
        let conn = db::open_memory().unwrap();
        task_with_checklist(&conn, "t", 3, 2);
        ops::set_status(&conn, "t", TaskStatus::Review).unwrap();
        let snap = ProgressStore::snapshot(&conn, "t").unwrap().unwrap();
        assert_eq!(snap.status, TaskStatus::Review);
        assert_eq!(snap.stored, 10);
        assert_eq!(snap.counts, Counts::checklist(3, 2));
        assert!(ProgressStore::snapshot(&conn, "missing").unwrap().is_none());
    }

    #[test]
    fn set_manual_persists() {
        let conn = db::open_memory().unwrap();
        ops::add_task(&conn, "t", "").unwrap();
        let mut sync = ProgressSync::new(&conn);

        let report = sync.set_manual("t", 70).unwrap();
        assert_eq!(report.stored, 70);
        assert_eq!(report.derived, 10);
        assert!(report.manual);
        assert_eq!(report.source, ProgressSource::Manual);
        assert_eq!(ops::get_task(&conn, "t").unwrap().progress, 70);
    }

    #[test]
    fn set_manual_rejects_out_of_range_before_writing() {
        let conn = db::open_memory().unwrap();
        ops::add_task(&conn, "t", "").unwrap();
        let mut sync = ProgressSync::new(&conn);

        for bad in [-1, 101, 1000] {
            let err = sync.set_manual("t", bad).unwrap_err();
            assert!(matches!(err, SyncError::Validation { value } if value == bad));
        }
        assert_eq!(ops::get_task(&conn, "t").unwrap().progress, 10);
        assert!(sync.displayed("t").is_none());
    }

    #[test]
    fn set_manual_on_missing_task() {
        let conn = db::open_memory().unwrap();
        let mut sync = ProgressSync::new(&conn);
        assert!(matches!(
            sync.set_manual("ghost", 50),
            Err(SyncError::NotFound(_))
        ));
    }

    #[test]
    fn reset_to_auto_is_idempotent() {
        let conn = db::open_memory().unwrap();
        task_with_checklist(&conn, "t", 3, 1);
        let mut sync = ProgressSync::new(&conn);
        sync.set_manual("t", 90).unwrap();

        let first = sync.reset_to_auto("t").unwrap();
        let second = sync.reset_to_auto("t").unwrap();
        assert_eq!(first.stored, 33);
        assert_eq!(first, second);
        assert!(!second.manual);
    }

    #[test]
    fn related_change_never_writes() {
        let conn = db::open_memory().unwrap();
        task_with_checklist(&conn, "t", 2, 2);
        let mut sync = ProgressSync::new(&conn);

        let report = sync.on_related_change("t").unwrap();
        assert_eq!(report.stored, 10);
        assert_eq!(report.derived, 100);
        assert!(report.manual);
        assert_eq!(ops::get_task(&conn, "t").unwrap().progress, 10);
        assert_eq!(sync.displayed("t"), Some(&report));
    }

    #[test]
    fn status_change_without_items_moves_derived() {
        let conn = db::open_memory().unwrap();
        ops::add_task(&conn, "t", "").unwrap();
        let mut sync = ProgressSync::new(&conn);

        assert!(!sync.on_related_change("t").unwrap().manual);
        ops::set_status(&conn, "t", TaskStatus::InProgress).unwrap();
        let report = sync.on_related_change("t").unwrap();
        assert_eq!(report.derived, 50);
        assert_eq!(report.derived_source, ProgressSource::Status);
        assert!(report.manual);

        let report = sync.reset_to_auto("t").unwrap();
        assert_eq!(report.stored, 50);
        assert_eq!(report.source, ProgressSource::Status);
    }

    #[test]
    fn writes_are_published() {
        let conn = db::open_memory().unwrap();
        ops::add_task(&conn, "t", "").unwrap();
        let mut sync = ProgressSync::new(&conn);
        let rx = sync.subscribe("t");

        sync.set_manual("t", 40).unwrap();
        sync.reset_to_auto("t").unwrap();
        let kinds: Vec<ChangeKind> = changes::drain(&rx).into_iter().map(|c| c.kind).collect();
        assert_eq!(kinds, vec![ChangeKind::Progress, ChangeKind::Progress]);
    }

    #[test]
    fn pending_changes_coalesce() {
        let conn = db::open_memory().unwrap();
        task_with_checklist(&conn, "a", 4, 0);
        ops::add_task(&conn, "b", "").unwrap();
        let mut sync = ProgressSync::new(&conn);
        let rx_a = sync.subscribe("a");

        for id in 1..=3 {
            ops::set_item_done(&conn, ItemKind::Checklist, id, true).unwrap();
            sync.publish(Change::new("a", ChangeKind::Checklist));
        }
        // No subscriber on "b": nothing queued.
        sync.publish(Change::new("b", ChangeKind::Status));

        let report = sync.process_pending(&rx_a).unwrap().unwrap();
        assert_eq!(report.task, "a");
        assert_eq!(report.derived, 75);
        assert!(sync.displayed("b").is_none());

        assert!(sync.process_pending(&rx_a).unwrap().is_none());
    }

    #[test]
    fn deleted_task_drops_out_of_display() {
        let conn = db::open_memory().unwrap();
        ops::add_task(&conn, "t", "").unwrap();
        let mut sync = ProgressSync::new(&conn);
        let rx = sync.subscribe("t");
        sync.on_related_change("t").unwrap();

        ops::remove_task(&conn, "t").unwrap();
        sync.publish(Change::new("t", ChangeKind::External));
        assert!(sync.process_pending(&rx).unwrap().is_none());
        assert!(sync.displayed("t").is_none());
    }

    /// Delegates to a real database but can be told to fail writes.
    struct FlakyStore {
        conn: Connection,
        fail_writes: Cell<bool>,
    }

    impl ProgressStore for FlakyStore {
        fn snapshot(&self, task: &str) -> anyhow::Result<Option<TaskSnapshot>> {
            ProgressStore::snapshot(&self.conn, task)
        }

        fn write_progress(&self, task: &str, progress: u8) -> anyhow::Result<()> {
            if self.fail_writes.get() {
                anyhow::bail!("connection reset");
            }
            ProgressStore::write_progress(&self.conn, task, progress)
        }
    }

    #[test]
    fn failed_write_leaves_display_unchanged() {
        let store = FlakyStore {
            conn: db::open_memory().unwrap(),
            fail_writes: Cell::new(false),
        };
        ops::add_task(&store.conn, "t", "").unwrap();
        let mut sync = ProgressSync::new(&store);
        let before = sync.set_manual("t", 30).unwrap();

        store.fail_writes.set(true);
        let err = sync.set_manual("t", 60).unwrap_err();
        assert!(matches!(err, SyncError::Store(_)));
        assert!(err.to_string().contains("connection reset"));
        assert!(sync.reset_to_auto("t").is_err());

        assert_eq!(sync.displayed("t"), Some(&before));
        assert_eq!(ops::get_task(&store.conn, "t").unwrap().progress, 30);
    }
}
