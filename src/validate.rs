use anyhow::{bail, Result};

/// Validate a task name: must be non-empty and match [a-zA-Z0-9_-]+
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        bail!("task name must not be empty");
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        bail!("task name '{name}' contains invalid characters: only a-z, A-Z, 0-9, _, - allowed");
    }
    Ok(())
}

/// Validate a progress percentage supplied by a user, returning it narrowed.
pub fn validate_percentage(pct: i64) -> Result<u8> {
    if !(0..=100).contains(&pct) {
        bail!("progress {pct} is out of range: must be between 0 and 100");
    }
    Ok(pct as u8)
}

pub fn validate_user(user: &str) -> Result<()> {
    if user.trim().is_empty() {
        bail!("user must not be empty");
    }
    Ok(())
}

pub fn validate_title(title: &str) -> Result<()> {
    if title.trim().is_empty() {
        bail!("title must not be empty");
    }
    Ok(())
}
