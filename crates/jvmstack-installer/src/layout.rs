use anyhow::{Context, Result};
use jvmstack_core::{Component, HostConfig};
use std::fs;
use std::path::{Path, PathBuf};

use crate::{DeclarationStyle, EnvironmentTarget};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostLayout {
    config: HostConfig,
}

impl HostLayout {
    pub fn new(config: HostConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn install_root(&self, component: Component) -> &Path {
        match component {
            Component::Java => &self.config.java_root,
            Component::AppServer => &self.config.tomcat_root,
        }
    }

    pub fn canonical_path(&self, component: Component, version: &str) -> PathBuf {
        self.install_root(component).join(component.dir_name(version))
    }

    pub fn backup_dir(&self, component: Component) -> PathBuf {
        self.config.backup_root.join(component.slot_name())
    }

    pub fn backup_path(&self, component: Component, version: &str) -> PathBuf {
        self.backup_dir(component).join(component.dir_name(version))
    }

    pub fn unit_dir(&self) -> &Path {
        &self.config.unit_dir
    }

    pub fn unit_file_name(&self, component: Component, version: &str) -> String {
        format!("{}-{}.service", component.slot_name(), version)
    }

    pub fn unit_path(&self, component: Component, version: &str) -> PathBuf {
        self.config
            .unit_dir
            .join(self.unit_file_name(component, version))
    }

    pub fn state_dir(&self) -> &Path {
        &self.config.state_dir
    }

    pub fn tmp_state_dir(&self) -> PathBuf {
        self.state_dir().join("tmp")
    }

    pub fn previous_versions_path(&self) -> PathBuf {
        self.state_dir().join("previous_versions.json")
    }

    pub fn transactions_dir(&self) -> PathBuf {
        self.state_dir().join("transactions")
    }

    pub fn transaction_active_path(&self) -> PathBuf {
        self.transactions_dir().join("active")
    }

    pub fn transaction_metadata_path(&self, txid: &str) -> PathBuf {
        self.transactions_dir().join(format!("{txid}.json"))
    }

    pub fn transaction_journal_path(&self, txid: &str) -> PathBuf {
        self.transactions_dir().join(format!("{txid}.journal"))
    }

    /// Files carrying environment bindings: the system file first, then the
    /// optional shell files.
    pub fn environment_targets(&self) -> Vec<EnvironmentTarget> {
        let mut targets = vec![EnvironmentTarget {
            path: self.config.environment_file.clone(),
            style: DeclarationStyle::Plain,
            required: true,
        }];
        targets.extend(self.config.shell_files.iter().map(|path| EnvironmentTarget {
            path: path.clone(),
            style: DeclarationStyle::Export,
            required: false,
        }));
        targets
    }

    pub fn ensure_base_dirs(&self) -> Result<()> {
        for dir in [
            self.config.java_root.clone(),
            self.config.tomcat_root.clone(),
            self.backup_dir(Component::Java),
            self.backup_dir(Component::AppServer),
            self.state_dir().to_path_buf(),
            self.tmp_state_dir(),
            self.transactions_dir(),
        ] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        Ok(())
    }
}

impl From<HostConfig> for HostLayout {
    fn from(config: HostConfig) -> Self {
        Self::new(config)
    }
}
