use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

/// `~/.kvitto`, or `$KVITTO_HOME` when set.
pub fn kvitto_home() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("KVITTO_HOME") {
        return Ok(PathBuf::from(dir));
    }
    let home = std::env::var("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home).join(".kvitto"))
}

pub fn ensure_kvitto_home() -> Result<PathBuf> {
    let dir = kvitto_home()?;
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    Ok(dir)
}
