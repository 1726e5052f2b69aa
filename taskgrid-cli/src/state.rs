use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

pub fn taskgrid_home() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home).join(".taskgrid"))
}

pub fn ensure_taskgrid_home() -> Result<PathBuf> {
    let dir = taskgrid_home()?;
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    Ok(dir)
}

/// Where the local backend keeps its books unless the config says otherwise.
pub fn default_store_path() -> Result<PathBuf> {
    Ok(taskgrid_home()?.join("store.json"))
}
