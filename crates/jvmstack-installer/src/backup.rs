use anyhow::{anyhow, Context, Result};
use jvmstack_core::{compare_versions, Component, Version};
use std::fs;
use std::path::Path;

use crate::fs_utils::{copy_dir_recursive, list_dir_names, remove_dir_if_exists};
use crate::{Backup, HostLayout};

/// Single-slot backup area: at most one retained copy per component.
#[derive(Debug, Clone, Copy)]
pub struct BackupStore<'a> {
    layout: &'a HostLayout,
}

impl<'a> BackupStore<'a> {
    pub fn new(layout: &'a HostLayout) -> Self {
        Self { layout }
    }

    /// Copies `source` into the slot for `component`, replacing whatever the
    /// slot held. The copy lands under a hidden staging name first so a
    /// failed copy never replaces a usable backup.
    pub fn retain(&self, component: Component, source: &Path) -> Result<Backup> {
        let name = source
            .file_name()
            .and_then(|v| v.to_str())
            .ok_or_else(|| anyhow!("backup source has no file name: {}", source.display()))?;
        let version = component
            .version_from_dir_name(name)
            .ok_or_else(|| {
                anyhow!(
                    "backup source does not follow the {}<version> convention: {}",
                    component.dir_prefix(),
                    source.display()
                )
            })
            .and_then(Version::parse)?;

        let dir = self.layout.backup_dir(component);
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create backup dir: {}", dir.display()))?;

        let staging = dir.join(format!(".incoming-{name}"));
        remove_dir_if_exists(&staging)?;
        if let Err(err) = copy_dir_recursive(source, &staging) {
            let _ = remove_dir_if_exists(&staging);
            return Err(err).with_context(|| {
                format!(
                    "failed to copy {} into backup area {}",
                    source.display(),
                    dir.display()
                )
            });
        }

        for existing in self.entries(component)? {
            remove_dir_if_exists(&existing.backup_path)?;
            tracing::debug!(%component, version = %existing.version, "discarded previous backup");
        }

        let backup_path = self.layout.backup_path(component, version.as_str());
        fs::rename(&staging, &backup_path).with_context(|| {
            format!(
                "failed to move backup into place: {}",
                backup_path.display()
            )
        })?;
        tracing::info!(%component, %version, path = %backup_path.display(), "backup retained");

        Ok(Backup {
            component,
            version,
            backup_path,
        })
    }

    pub fn latest(&self, component: Component) -> Result<Option<Backup>> {
        let mut entries = self.entries(component)?;
        entries.sort_by(|a, b| compare_versions(a.version.as_str(), b.version.as_str()));
        Ok(entries.pop())
    }

    /// Copies the backup to `destination`; the backup itself is untouched.
    pub fn restore(&self, backup: &Backup, destination: &Path) -> Result<()> {
        if destination.exists() {
            return Err(anyhow!(
                "restore destination already exists: {}",
                destination.display()
            ));
        }
        if let Err(err) = copy_dir_recursive(&backup.backup_path, destination) {
            let _ = remove_dir_if_exists(destination);
            return Err(err).with_context(|| {
                format!(
                    "failed to restore {} {} from {}",
                    backup.component,
                    backup.version,
                    backup.backup_path.display()
                )
            });
        }
        tracing::info!(
            component = %backup.component,
            version = %backup.version,
            destination = %destination.display(),
            "backup restored"
        );
        Ok(())
    }

    /// Removes every backup of `component`; returns how many were removed.
    pub fn discard(&self, component: Component) -> Result<usize> {
        let entries = self.entries(component)?;
        for entry in &entries {
            remove_dir_if_exists(&entry.backup_path)?;
        }
        Ok(entries.len())
    }

    fn entries(&self, component: Component) -> Result<Vec<Backup>> {
        let dir = self.layout.backup_dir(component);
        let names = list_dir_names(&dir)?;
        Ok(names
            .iter()
            .filter_map(|name| {
                let version = Version::parse(component.version_from_dir_name(name)?).ok()?;
                Some(Backup {
                    component,
                    backup_path: dir.join(name),
                    version,
                })
            })
            .collect())
    }
}
