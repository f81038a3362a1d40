use std::fmt;
use std::path::PathBuf;

use jvmstack_core::{Component, Version};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledComponent {
    pub component: Component,
    pub version: Version,
    pub install_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backup {
    pub component: Component,
    pub version: Version,
    pub backup_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceUnit {
    pub component: Component,
    pub version: Version,
    pub unit_path: PathBuf,
    pub content: String,
}

/// Paths the service unit binds the server process to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDependencies {
    pub runtime_home: PathBuf,
    pub service_user: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentState {
    Absent,
    Installed(Version),
    BackingUp,
    Upgrading,
    RolledBack(Version),
    Removed,
}

impl ComponentState {
    pub fn from_installed(installed: Option<&InstalledComponent>) -> Self {
        match installed {
            Some(installed) => Self::Installed(installed.version.clone()),
            None => Self::Absent,
        }
    }

    /// Version that is live in this state, if any. `RolledBack` counts as
    /// installed.
    pub fn active_version(&self) -> Option<&Version> {
        match self {
            Self::Installed(version) | Self::RolledBack(version) => Some(version),
            _ => None,
        }
    }
}

impl fmt::Display for ComponentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => f.write_str("absent"),
            Self::Installed(version) => write!(f, "installed({version})"),
            Self::BackingUp => f.write_str("backing-up"),
            Self::Upgrading => f.write_str("upgrading"),
            Self::RolledBack(version) => write!(f, "rolled-back({version})"),
            Self::Removed => f.write_str("removed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclarationStyle {
    /// `NAME="value"`, as read by pam_env from the system environment file.
    Plain,
    /// `export NAME="value"`, for shell profiles and rc files.
    Export,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentTarget {
    pub path: PathBuf,
    pub style: DeclarationStyle,
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UninstallStatus {
    NotInstalled,
    Uninstalled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UninstallResult {
    pub component: Component,
    pub version: Option<Version>,
    pub status: UninstallStatus,
}

/// Last known-good pair, persisted as a rollback hint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviousVersionsRecord {
    pub java: Version,
    pub tomcat: Version,
}

impl PreviousVersionsRecord {
    pub fn version(&self, component: Component) -> &Version {
        match component {
            Component::Java => &self.java,
            Component::AppServer => &self.tomcat,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionMetadata {
    pub version: u32,
    pub txid: String,
    pub operation: String,
    pub status: String,
    pub started_at_unix: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionJournalEntry {
    pub seq: u64,
    pub step: String,
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Unchanged(Version),
    Upgraded { from: Version, to: Version },
    Rebound(Version),
    Installed(Version),
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unchanged(version) => write!(f, "{version} (unchanged)"),
            Self::Upgraded { from, to } => write!(f, "{from} -> {to}"),
            Self::Rebound(version) => write!(f, "{version} (rebound to new runtime)"),
            Self::Installed(version) => write!(f, "{version} (installed)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationReport {
    pub java: Transition,
    pub tomcat: Transition,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentStatus {
    pub component: Component,
    pub installed: Option<Version>,
    pub backup: Option<Version>,
    pub desired: Option<Version>,
    pub last_known_good: Option<Version>,
}
