use crate::model::{ShowCollection, ShowDump};
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

pub fn load_collection(path: &Path) -> Result<ShowCollection> {
    if !path.exists() {
        return Ok(ShowCollection::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read collection file {}", path.display()))?;
    let collection = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse collection file {}", path.display()))?;
    Ok(collection)
}

pub fn save_collection(path: &Path, collection: &ShowCollection) -> Result<()> {
    write_json(path, collection, "collection")
}

pub fn write_dump(path: &Path, dump: &ShowDump) -> Result<()> {
    write_json(path, dump, "dump")
}

pub fn read_dump(path: &Path) -> Result<ShowDump> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read dump file {}", path.display()))?;
    let dump = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse dump file {}", path.display()))?;
    Ok(dump)
}

/// One URL per line; blank lines and `#` comments are skipped.
pub fn read_url_list(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read url list {}", path.display()))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(ToString::to_string)
        .collect())
}

pub fn write_url_list(path: &Path, urls: &[String]) -> Result<()> {
    ensure_parent(path)?;
    let mut content = urls.join("\n");
    content.push('\n');
    std::fs::write(path, content)
        .with_context(|| format!("failed to write url list {}", path.display()))?;
    Ok(())
}

fn write_json<T: Serialize>(path: &Path, value: &T, what: &str) -> Result<()> {
    ensure_parent(path)?;
    let serialized = serde_json::to_string_pretty(value)?;
    std::fs::write(path, serialized)
        .with_context(|| format!("failed to write {what} file {}", path.display()))?;
    Ok(())
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    Ok(())
}
