use jvmstack_core::{Component, Version};
use thiserror::Error;

pub type LifecycleResult<T> = std::result::Result<T, LifecycleError>;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("invalid desired state: {0:#}")]
    Config(anyhow::Error),

    #[error("failed to fetch {component} artifact from {url}: {source:#}")]
    Fetch {
        component: Component,
        url: String,
        source: anyhow::Error,
    },

    #[error("failed to back up {component} {version}: {source:#}")]
    Backup {
        component: Component,
        version: Version,
        source: anyhow::Error,
    },

    #[error("failed to activate service unit {unit}: {source:#}")]
    ServiceActivation { unit: String, source: anyhow::Error },

    #[error("no backup available to roll back {component}{}", hint_suffix(.hint))]
    NoBackup {
        component: Component,
        hint: Option<Version>,
    },

    #[error("desired state already active (java {java}, app-server {tomcat})")]
    NoOp { java: Version, tomcat: Version },

    #[error("inconsistent {component} install state: multiple candidates {candidates:?}")]
    InconsistentState {
        component: Component,
        candidates: Vec<String>,
    },

    #[error("failed to install {component} {version}: {source:#}")]
    Install {
        component: Component,
        version: Version,
        source: anyhow::Error,
    },

    #[error("{component} is not installed; run install first")]
    NotInstalled { component: Component },

    #[error("{component} {installed} is already installed; use upgrade to move to {desired}")]
    AlreadyInstalled {
        component: Component,
        installed: Version,
        desired: Version,
    },

    #[error("{component} self-heal failed after error ({cause}): {heal:#}")]
    SelfHealFailed {
        component: Component,
        cause: Box<LifecycleError>,
        heal: anyhow::Error,
    },

    #[error("upgrade failed and was compensated (java restored to {restored_java}): {cause}")]
    Compensated {
        restored_java: Version,
        cause: Box<LifecycleError>,
    },

    #[error("upgrade failed ({cause}) and compensation failed: {compensation}")]
    CompensationFailed {
        cause: Box<LifecycleError>,
        compensation: Box<LifecycleError>,
    },

    #[error("another operation is in progress: {0:#}")]
    OperationInProgress(anyhow::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LifecycleError {
    /// `NoOp` is reported but counts as success for exit status purposes.
    pub fn is_no_op(&self) -> bool {
        matches!(self, Self::NoOp { .. })
    }
}

fn hint_suffix(hint: &Option<Version>) -> String {
    match hint {
        Some(version) => format!(" (last known-good version was {version}; reinstall it)"),
        None => String::new(),
    }
}
