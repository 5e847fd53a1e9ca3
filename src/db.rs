use anyhow::Result;
use rusqlite::Connection;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS tasks (
    id          INTEGER PRIMARY KEY,
    name        TEXT NOT NULL UNIQUE CHECK(name GLOB '[a-zA-Z0-9_-]*' AND length(name) > 0),
    title       TEXT NOT NULL DEFAULT '',
    status      TEXT NOT NULL DEFAULT 'pending'
                CHECK(status IN ('pending', 'in_progress', 'review', 'completed')),
    progress    INTEGER NOT NULL DEFAULT 10 CHECK(progress BETWEEN 0 AND 100),
    created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
    updated_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
);

CREATE TABLE IF NOT EXISTS subtasks (
    id         INTEGER PRIMARY KEY,
    task       TEXT NOT NULL REFERENCES tasks(name) ON UPDATE CASCADE ON DELETE CASCADE,
    title      TEXT NOT NULL,
    done       INTEGER NOT NULL DEFAULT 0 CHECK(done IN (0, 1)),
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
);

CREATE TABLE IF NOT EXISTS checklist_items (
    id         INTEGER PRIMARY KEY,
    task       TEXT NOT NULL REFERENCES tasks(name) ON UPDATE CASCADE ON DELETE CASCADE,
    title      TEXT NOT NULL,
    done       INTEGER NOT NULL DEFAULT 0 CHECK(done IN (0, 1)),
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
);

CREATE TABLE IF NOT EXISTS time_entries (
    id            INTEGER PRIMARY KEY,
    task          TEXT NOT NULL REFERENCES tasks(name) ON UPDATE CASCADE ON DELETE CASCADE,
    user          TEXT NOT NULL CHECK(length(user) > 0),
    elapsed_secs  INTEGER NOT NULL DEFAULT 0 CHECK(elapsed_secs >= 0),
    running_since INTEGER,
    started_at    TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
    stopped_at    TEXT
);

CREATE INDEX IF NOT EXISTS subtasks_task ON subtasks(task);
CREATE INDEX IF NOT EXISTS checklist_items_task ON checklist_items(task);
CREATE INDEX IF NOT EXISTS time_entries_task ON time_entries(task);

-- At most one unfinished timer per user.
CREATE UNIQUE INDEX IF NOT EXISTS time_entries_one_active
    ON time_entries(user) WHERE stopped_at IS NULL;
";

fn set_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;",
    )?;
    Ok(())
}

pub fn open(path: &str) -> Result<Connection> {
    let conn = Connection::open(path)?;
    set_pragmas(&conn)?;
    Ok(conn)
}

pub fn init(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

/// In-memory database with the schema applied, for tests.
pub fn open_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    set_pragmas(&conn)?;
    init(&conn)?;
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        let conn = open_memory().unwrap();
        init(&conn).unwrap();
        init(&conn).unwrap();
    }

    #[test]
    fn progress_range_is_enforced() {
        let conn = open_memory().unwrap();
        conn.execute("INSERT INTO tasks (name) VALUES ('t')", [])
            .unwrap();
        assert!(conn
            .execute("UPDATE tasks SET progress = 101 WHERE name = 't'", [])
            .is_err());
        assert!(conn
            .execute("UPDATE tasks SET progress = -1 WHERE name = 't'", [])
            .is_err());
    }

    #[test]
    fn items_cascade_on_delete() {
        let conn = open_memory().unwrap();
        conn.execute("INSERT INTO tasks (name) VALUES ('t')", [])
            .unwrap();
        conn.execute(
            "INSERT INTO subtasks (task, title) VALUES ('t', 'a')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO checklist_items (task, title) VALUES ('t', 'b')",
            [],
        )
        .unwrap();
        conn.execute("DELETE FROM tasks WHERE name = 't'", []).unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT (SELECT COUNT(*) FROM subtasks) + (SELECT COUNT(*) FROM checklist_items)",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 0);
    }
}
