//! Path resolution for the progress database.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// `$HOME/.taskprog/taskprog.db`
pub fn default_db_path() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".taskprog").join("taskprog.db"))
}

/// Use the explicit path if given (`--db` or `TASKPROG_DB`, via clap), else the default.
pub fn resolve_db_path(explicit: Option<String>) -> Result<String> {
    match explicit {
        Some(p) => Ok(p),
        None => {
            let path = default_db_path()?;
            Ok(path
                .to_str()
                .context("default DB path is not valid UTF-8")?
                .to_string())
        }
    }
}

pub fn ensure_db_dir(db_path: &str) -> Result<()> {
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
    }
    Ok(())
}
