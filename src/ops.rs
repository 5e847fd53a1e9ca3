use anyhow::{bail, Result};
use rusqlite::{Connection, OptionalExtension};

use crate::model::{Item, ItemKind, Task, TaskStatus};
use crate::progress::{status_baseline, Counts};
use crate::validate::{validate_name, validate_title};

fn task_exists(conn: &Connection, name: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM tasks WHERE name = ?1",
        [name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn require_task(conn: &Connection, name: &str) -> Result<()> {
    if !task_exists(conn, name)? {
        bail!("task '{name}' not found");
    }
    Ok(())
}

fn read_task_row(row: &rusqlite::Row) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        name: row.get(1)?,
        title: row.get(2)?,
        status: row.get(3)?,
        progress: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn read_item_row(row: &rusqlite::Row) -> rusqlite::Result<Item> {
    Ok(Item {
        id: row.get(0)?,
        task: row.get(1)?,
        title: row.get(2)?,
        done: row.get::<_, i64>(3)? != 0,
        created_at: row.get(4)?,
    })
}

const TASK_COLUMNS: &str = "id, name, title, status, progress, created_at, updated_at";

const ITEM_COLUMNS: &str = "id, task, title, done, created_at";

const SET_STATUS: &str = "
UPDATE tasks
SET status = ?1,
    updated_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')
WHERE name = ?2
";

const SET_TITLE: &str = "
UPDATE tasks
SET title = ?1,
    updated_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')
WHERE name = ?2
";

const SET_PROGRESS: &str = "
UPDATE tasks
SET progress = ?1,
    updated_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')
WHERE name = ?2
";

const TOUCH_TASK: &str = "
UPDATE tasks
SET updated_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')
WHERE name = ?1
";

const ITEM_COUNTS: &str = "
SELECT
    (SELECT COUNT(*) FROM subtasks WHERE task = ?1),
    (SELECT COUNT(*) FROM subtasks WHERE task = ?1 AND done = 1),
    (SELECT COUNT(*) FROM checklist_items WHERE task = ?1),
    (SELECT COUNT(*) FROM checklist_items WHERE task = ?1 AND done = 1)
";

pub fn add_task(conn: &Connection, name: &str, title: &str) -> Result<()> {
    validate_name(name)?;
    if task_exists(conn, name)? {
        bail!("task '{name}' already exists");
    }
    let status = TaskStatus::Pending;
    conn.execute(
        "INSERT INTO tasks (name, title, status, progress) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![name, title, status, status_baseline(status)],
    )?;
    Ok(())
}

pub fn get_task(conn: &Connection, name: &str) -> Result<Task> {
    require_task(conn, name)?;
    let query = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE name = ?1");
    let task = conn.query_row(&query, [name], read_task_row)?;
    Ok(task)
}

pub fn list_tasks(conn: &Connection, status: Option<TaskStatus>) -> Result<Vec<Task>> {
    let query = format!("SELECT {TASK_COLUMNS} FROM tasks ORDER BY id");
    let mut stmt = conn.prepare(&query)?;
    let mut tasks = stmt
        .query_map([], read_task_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    if let Some(s) = status {
        tasks.retain(|t| t.status == s);
    }
    Ok(tasks)
}

pub fn remove_task(conn: &Connection, name: &str) -> Result<()> {
    require_task(conn, name)?;
    conn.execute("DELETE FROM tasks WHERE name = ?1", [name])?;
    Ok(())
}

pub fn retitle_task(conn: &Connection, name: &str, title: &str) -> Result<()> {
    require_task(conn, name)?;
    conn.execute(SET_TITLE, rusqlite::params![title, name])?;
    Ok(())
}

/// Change a task's status. Stored progress is left alone; callers recompute
/// what to display from the new status.
pub fn set_status(conn: &Connection, name: &str, status: TaskStatus) -> Result<()> {
    require_task(conn, name)?;
    conn.execute(SET_STATUS, rusqlite::params![status, name])?;
    Ok(())
}

/// Overwrite a task's stored progress. Range is enforced by the schema; callers
/// validate user input first.
pub fn write_progress(conn: &Connection, name: &str, progress: u8) -> Result<()> {
    require_task(conn, name)?;
    conn.execute(SET_PROGRESS, rusqlite::params![progress, name])?;
    Ok(())
}

pub fn add_item(conn: &Connection, kind: ItemKind, task: &str, title: &str) -> Result<i64> {
    validate_title(title)?;
    require_task(conn, task)?;
    let sql = format!("INSERT INTO {} (task, title) VALUES (?1, ?2)", kind.table());
    conn.execute(&sql, rusqlite::params![task, title])?;
    let id = conn.last_insert_rowid();
    conn.execute(TOUCH_TASK, [task])?;
    Ok(id)
}

fn item_task(conn: &Connection, kind: ItemKind, id: i64) -> Result<String> {
    let sql = format!("SELECT task FROM {} WHERE id = ?1", kind.table());
    let task: Option<String> = conn.query_row(&sql, [id], |row| row.get(0)).optional()?;
    match task {
        Some(t) => Ok(t),
        None => bail!("{} {id} not found", kind.label()),
    }
}

/// Set an item's completion flag. Returns the owning task's name.
pub fn set_item_done(conn: &Connection, kind: ItemKind, id: i64, done: bool) -> Result<String> {
    let task = item_task(conn, kind, id)?;
    let sql = format!("UPDATE {} SET done = ?1 WHERE id = ?2", kind.table());
    conn.execute(&sql, rusqlite::params![done, id])?;
    conn.execute(TOUCH_TASK, [&task])?;
    Ok(task)
}

/// Delete an item. Returns the owning task's name.
pub fn remove_item(conn: &Connection, kind: ItemKind, id: i64) -> Result<String> {
    let task = item_task(conn, kind, id)?;
    let sql = format!("DELETE FROM {} WHERE id = ?1", kind.table());
    conn.execute(&sql, [id])?;
    conn.execute(TOUCH_TASK, [&task])?;
    Ok(task)
}

pub fn list_items(conn: &Connection, kind: ItemKind, task: &str) -> Result<Vec<Item>> {
    require_task(conn, task)?;
    let sql = format!(
        "SELECT {ITEM_COLUMNS} FROM {} WHERE task = ?1 ORDER BY id",
        kind.table()
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let rows = stmt.query_map([task], read_item_row)?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(Into::into)
}

pub fn item_counts(conn: &Connection, task: &str) -> Result<Counts> {
    require_task(conn, task)?;
    let counts = conn.query_row(ITEM_COUNTS, [task], |row| {
        Ok(Counts {
            subtasks_total: row.get(0)?,
            subtasks_done: row.get(1)?,
            checklist_total: row.get(2)?,
            checklist_done: row.get(3)?,
        })
    })?;
    Ok(counts)
}
