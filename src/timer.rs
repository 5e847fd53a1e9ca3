//! Time tracking. Each user has at most one unfinished timer; it is either
//! running or paused until stopped.

use anyhow::{bail, Result};
use log::info;
use rusqlite::{Connection, OptionalExtension};

use crate::model::{TimeEntry, TimerState};
use crate::validate::validate_user;

const NOW_UNIX: &str = "CAST(strftime('%s', 'now') AS INTEGER)";

const ENTRY_COLUMNS: &str = "id, task, user, elapsed_secs, running_since, started_at, stopped_at";

fn read_entry_row(row: &rusqlite::Row) -> rusqlite::Result<TimeEntry> {
    Ok(TimeEntry {
        id: row.get(0)?,
        task: row.get(1)?,
        user: row.get(2)?,
        elapsed_secs: row.get(3)?,
        running_since: row.get(4)?,
        started_at: row.get(5)?,
        stopped_at: row.get(6)?,
    })
}

fn get_entry(conn: &Connection, id: i64) -> Result<TimeEntry> {
    let query = format!("SELECT {ENTRY_COLUMNS} FROM time_entries WHERE id = ?1");
    Ok(conn.query_row(&query, [id], read_entry_row)?)
}

pub fn now_unix(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row(&format!("SELECT {NOW_UNIX}"), [], |row| row.get(0))?)
}

/// The user's unfinished timer, running or paused.
pub fn active_timer(conn: &Connection, user: &str) -> Result<Option<TimeEntry>> {
    let query = format!(
        "SELECT {ENTRY_COLUMNS} FROM time_entries WHERE user = ?1 AND stopped_at IS NULL"
    );
    Ok(conn.query_row(&query, [user], read_entry_row).optional()?)
}

/// Start timing `task` for `user`. A paused timer on the same task resumes.
pub fn start_timer(conn: &Connection, task: &str, user: &str) -> Result<TimeEntry> {
    validate_user(user)?;
    crate::ops::get_task(conn, task)?;

    if let Some(active) = active_timer(conn, user)? {
        if active.task != task {
            bail!(
                "'{user}' already has a timer on '{}'; stop it first",
                active.task
            );
        }
        return match active.state() {
            TimerState::Paused => resume_timer(conn, user),
            _ => bail!("'{user}' is already timing '{task}'"),
        };
    }

    conn.execute(
        &format!("INSERT INTO time_entries (task, user, running_since) VALUES (?1, ?2, {NOW_UNIX})"),
        rusqlite::params![task, user],
    )?;
    info!("{user}: timer started on {task}");
    get_entry(conn, conn.last_insert_rowid())
}

fn require_active(conn: &Connection, user: &str) -> Result<TimeEntry> {
    match active_timer(conn, user)? {
        Some(entry) => Ok(entry),
        None => bail!("'{user}' has no active timer"),
    }
}

pub fn pause_timer(conn: &Connection, user: &str) -> Result<TimeEntry> {
    let entry = require_active(conn, user)?;
    if entry.state() != TimerState::Running {
        bail!("timer for '{user}' on '{}' is already paused", entry.task);
    }
    conn.execute(
        &format!(
            "UPDATE time_entries
             SET elapsed_secs = elapsed_secs + MAX({NOW_UNIX} - running_since, 0),
                 running_since = NULL
             WHERE id = ?1"
        ),
        [entry.id],
    )?;
    info!("{user}: timer paused on {}", entry.task);
    get_entry(conn, entry.id)
}

pub fn resume_timer(conn: &Connection, user: &str) -> Result<TimeEntry> {
    let entry = require_active(conn, user)?;
    if entry.state() != TimerState::Paused {
        bail!("timer for '{user}' on '{}' is not paused", entry.task);
    }
    conn.execute(
        &format!("UPDATE time_entries SET running_since = {NOW_UNIX} WHERE id = ?1"),
        [entry.id],
    )?;
    info!("{user}: timer resumed on {}", entry.task);
    get_entry(conn, entry.id)
}

/// Finish the user's timer, running or paused, and return the final entry.
pub fn stop_timer(conn: &Connection, user: &str) -> Result<TimeEntry> {
    let entry = require_active(conn, user)?;
    conn.execute(
        &format!(
            "UPDATE time_entries
             SET elapsed_secs = elapsed_secs
                     + COALESCE(MAX({NOW_UNIX} - running_since, 0), 0),
                 running_since = NULL,
                 stopped_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')
             WHERE id = ?1"
        ),
        [entry.id],
    )?;
    let entry = get_entry(conn, entry.id)?;
    info!(
        "{user}: timer stopped on {} after {}s",
        entry.task, entry.elapsed_secs
    );
    Ok(entry)
}

pub fn list_time_entries(conn: &Connection, task: &str) -> Result<Vec<TimeEntry>> {
    crate::ops::get_task(conn, task)?;
    let query = format!("SELECT {ENTRY_COLUMNS} FROM time_entries WHERE task = ?1 ORDER BY id");
    let mut stmt = conn.prepare(&query)?;
    let rows = stmt.query_map([task], read_entry_row)?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(Into::into)
}

/// Seconds tracked on `task` across all users, counting running timers up to now.
pub fn total_tracked(conn: &Connection, task: &str) -> Result<i64> {
    let now = now_unix(conn)?;
    Ok(list_time_entries(conn, task)?
        .iter()
        .map(|e| e.elapsed_at(now))
        .sum())
}
