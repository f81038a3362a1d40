use anyhow::{Context, Result};
use std::fs;
use std::io;
use std::path::PathBuf;

use crate::fs_utils::remove_file_if_exists;
use crate::{HostLayout, PreviousVersionsRecord};

pub fn write_previous_versions(
    layout: &HostLayout,
    record: &PreviousVersionsRecord,
) -> Result<PathBuf> {
    let path = layout.previous_versions_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let payload =
        serde_json::to_string_pretty(record).context("failed to serialize previous versions")?;
    remove_file_if_exists(&path)
        .with_context(|| format!("failed to replace {}", path.display()))?;
    fs::write(&path, format!("{payload}\n"))
        .with_context(|| format!("failed to write previous versions: {}", path.display()))?;
    tracing::info!(java = %record.java, tomcat = %record.tomcat, "recorded last known-good versions");
    Ok(path)
}

pub fn read_previous_versions(layout: &HostLayout) -> Result<Option<PreviousVersionsRecord>> {
    let path = layout.previous_versions_path();
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read previous versions: {}", path.display()));
        }
    };
    let record = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse previous versions: {}", path.display()))?;
    Ok(Some(record))
}

pub fn clear_previous_versions(layout: &HostLayout) -> Result<bool> {
    let path = layout.previous_versions_path();
    if !path.exists() {
        return Ok(false);
    }
    fs::remove_file(&path)
        .with_context(|| format!("failed to remove previous versions: {}", path.display()))?;
    Ok(true)
}
