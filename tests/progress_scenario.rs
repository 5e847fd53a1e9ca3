use taskprog::changes::{Change, ChangeKind};
use taskprog::model::{ItemKind, TaskStatus};
use taskprog::progress::{derive, is_manual, Counts, ProgressSource};
use taskprog::sync::ProgressSync;
use taskprog::{db, ops};

#[test]
fn checklist_drift_until_reset() {
    let conn = db::open_memory().unwrap();
    ops::add_task(&conn, "brand-refresh", "Refresh brand guide").unwrap();
    ops::set_status(&conn, "brand-refresh", TaskStatus::InProgress).unwrap();
    let mut ids = Vec::new();
    for title in ["Logo", "Palette", "Type", "Voice"] {
        ids.push(ops::add_item(&conn, ItemKind::Checklist, "brand-refresh", title).unwrap());
    }
    ops::set_item_done(&conn, ItemKind::Checklist, ids[0], true).unwrap();

    // Stored progress is still the creation-time baseline.
    assert_eq!(ops::get_task(&conn, "brand-refresh").unwrap().progress, 10);

    let mut sync = ProgressSync::new(&conn);
    let report = sync.on_related_change("brand-refresh").unwrap();
    assert_eq!(report.stored, 10);
    assert_eq!(report.derived, 25);
    assert_eq!(report.derived_source, ProgressSource::Checklist);
    assert!(report.manual, "|10 - 25| = 15 > 5");
    assert_eq!(report.source, ProgressSource::Manual);

    let report = sync.reset_to_auto("brand-refresh").unwrap();
    assert_eq!(report.stored, 25);
    assert!(!report.manual);
    assert_eq!(report.source, ProgressSource::Checklist);
    assert_eq!(ops::get_task(&conn, "brand-refresh").unwrap().progress, 25);

    // Completing another item makes the stored value lag again.
    ops::set_item_done(&conn, ItemKind::Checklist, ids[1], true).unwrap();
    let report = sync.on_related_change("brand-refresh").unwrap();
    assert_eq!(report.derived, 50);
    assert!(report.manual);
    assert_eq!(report.stored, 25);
}

#[test]
fn manual_override_survives_item_changes() {
    let conn = db::open_memory().unwrap();
    ops::add_task(&conn, "pitch", "").unwrap();
    let s1 = ops::add_item(&conn, ItemKind::Subtask, "pitch", "Research").unwrap();
    ops::add_item(&conn, ItemKind::Subtask, "pitch", "Deck").unwrap();

    let mut sync = ProgressSync::new(&conn);
    sync.set_manual("pitch", 80).unwrap();

    ops::set_item_done(&conn, ItemKind::Subtask, s1, true).unwrap();
    let report = sync.on_related_change("pitch").unwrap();
    assert_eq!(report.stored, 80);
    assert_eq!(report.derived, 50);
    assert!(report.manual);

    // A manual value that happens to sit near the derived one reads as automatic.
    let report = sync.set_manual("pitch", 53).unwrap();
    assert!(!report.manual);
    assert_eq!(report.source, ProgressSource::Subtasks);
}

#[test]
fn hybrid_task_end_to_end() {
    let conn = db::open_memory().unwrap();
    ops::add_task(&conn, "launch", "").unwrap();
    let s1 = ops::add_item(&conn, ItemKind::Subtask, "launch", "Build").unwrap();
    ops::add_item(&conn, ItemKind::Subtask, "launch", "QA").unwrap();
    for title in ["a", "b", "c", "d"] {
        let id = ops::add_item(&conn, ItemKind::Checklist, "launch", title).unwrap();
        ops::set_item_done(&conn, ItemKind::Checklist, id, true).unwrap();
    }
    ops::set_item_done(&conn, ItemKind::Subtask, s1, true).unwrap();

    let counts = ops::item_counts(&conn, "launch").unwrap();
    let derived = derive(counts, TaskStatus::Pending);
    assert_eq!(derived.percentage, 75);
    assert_eq!(derived.source, ProgressSource::Hybrid);

    let mut sync = ProgressSync::new(&conn);
    assert_eq!(sync.reset_to_auto("launch").unwrap().stored, 75);
}

#[test]
fn notifications_drive_recompute() {
    let conn = db::open_memory().unwrap();
    ops::add_task(&conn, "copy", "").unwrap();
    ops::add_task(&conn, "photos", "").unwrap();

    let mut sync = ProgressSync::new(&conn);
    let copy_rx = sync.subscribe("copy");
    let photos_rx = sync.subscribe("photos");

    ops::set_status(&conn, "copy", TaskStatus::Review).unwrap();
    sync.publish(Change::new("copy", ChangeKind::Status));
    let id = ops::add_item(&conn, ItemKind::Subtask, "copy", "Proofread").unwrap();
    sync.publish(Change::new("copy", ChangeKind::Subtask));
    ops::set_item_done(&conn, ItemKind::Subtask, id, true).unwrap();
    sync.publish(Change::new("copy", ChangeKind::Subtask));

    let report = sync.process_pending(&copy_rx).unwrap().unwrap();
    assert_eq!(report.derived, 100);
    assert_eq!(report.derived_source, ProgressSource::Subtasks);
    assert_eq!(sync.displayed("copy"), Some(&report));
    assert!(sync.process_pending(&copy_rx).unwrap().is_none(), "burst already drained");

    assert!(sync.process_pending(&photos_rx).unwrap().is_none());
    assert!(sync.displayed("photos").is_none());

    // Stored progress was never touched by the recomputes.
    assert_eq!(ops::get_task(&conn, "copy").unwrap().progress, 10);
}

#[test]
fn detector_boundary() {
    assert!(!is_manual(55, 50));
    assert!(is_manual(56, 50));
    let d = derive(Counts::default(), TaskStatus::Completed);
    assert_eq!((d.percentage, d.source), (100, ProgressSource::Status));
}
