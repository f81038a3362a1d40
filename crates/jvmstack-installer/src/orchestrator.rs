use anyhow::anyhow;
use jvmstack_core::{Component, DesiredState, DesiredStateSource};

use crate::lifecycle::{no_backup, Capabilities, ComponentLifecycleManager};
use crate::record::{clear_previous_versions, read_previous_versions, write_previous_versions};
use crate::transactions::OperationJournal;
use crate::{
    BackupStore, ComponentStatus, HostLayout, InstalledComponent, InstalledStateInspector,
    LifecycleError, LifecycleResult, OperationReport, PreviousVersionsRecord, Transition,
    UninstallResult,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentScope {
    Java,
    AppServer,
    All,
}

impl ComponentScope {
    pub fn from_component(component: Option<Component>) -> Self {
        match component {
            Some(Component::Java) => Self::Java,
            Some(Component::AppServer) => Self::AppServer,
            None => Self::All,
        }
    }

    pub fn includes(self, component: Component) -> bool {
        match self {
            Self::All => true,
            Self::Java => component == Component::Java,
            Self::AppServer => component == Component::AppServer,
        }
    }
}

/// Drives both components toward the desired state as one host-wide
/// operation. The JDK always moves first; a failed server step after a JDK
/// change rolls the JDK back once.
pub struct UpgradeOrchestrator<'a> {
    layout: &'a HostLayout,
    caps: Capabilities<'a>,
    source: &'a dyn DesiredStateSource,
}

impl<'a> UpgradeOrchestrator<'a> {
    pub fn new(
        layout: &'a HostLayout,
        caps: Capabilities<'a>,
        source: &'a dyn DesiredStateSource,
    ) -> Self {
        Self {
            layout,
            caps,
            source,
        }
    }

    /// Transitions `run` would perform. Fails with the same `NoOp` and
    /// `NotInstalled` errors `run` would, without touching the host.
    pub fn plan(&self) -> LifecycleResult<OperationReport> {
        let desired = self.load_desired()?;
        self.plan_against(&desired).map(|(report, _)| report)
    }

    pub fn run(&self) -> LifecycleResult<OperationReport> {
        let desired = self.load_desired()?;
        let (report, previous) = self.plan_against(&desired)?;
        tracing::info!(
            java = %report.java,
            tomcat = %report.tomcat,
            source = %self.source.describe(),
            "upgrade planned"
        );

        let mut journal = self.begin("upgrade")?;
        let outcome = self.apply_upgrade(&desired, &report, &previous, &mut journal);
        let status = match &outcome {
            Ok(_) => "committed",
            Err(LifecycleError::Compensated { .. }) => "compensated",
            Err(_) => "failed",
        };
        close(journal, status, outcome)
    }

    /// Installs whichever components are absent. A component present at a
    /// different version is refused; upgrade moves it.
    pub fn install(&self) -> LifecycleResult<OperationReport> {
        let desired = self.load_desired()?;
        let inspector = InstalledStateInspector::new(self.layout);
        let java = inspector.current(Component::Java)?;
        let tomcat = inspector.current(Component::AppServer)?;

        for (component, installed) in [(Component::Java, &java), (Component::AppServer, &tomcat)] {
            if let Some(installed) = installed {
                let wanted = desired.version(component);
                if installed.version != *wanted {
                    return Err(LifecycleError::AlreadyInstalled {
                        component,
                        installed: installed.version.clone(),
                        desired: wanted.clone(),
                    });
                }
            }
        }
        if java.is_some() && tomcat.is_some() {
            return Err(LifecycleError::NoOp {
                java: desired.java_version.clone(),
                tomcat: desired.tomcat_version.clone(),
            });
        }

        let mut journal = self.begin("install")?;
        let outcome = self.apply_install(&desired, java.is_some(), tomcat.is_some(), &mut journal);
        let status = if outcome.is_ok() { "committed" } else { "failed" };
        close(journal, status, outcome)
    }

    /// Restores the retained backup of every component in `scope`, JDK first.
    /// After a JDK-only rollback the server unit is rebound to the restored
    /// runtime.
    pub fn rollback(&self, scope: ComponentScope) -> LifecycleResult<Vec<InstalledComponent>> {
        let backups = BackupStore::new(self.layout);
        for component in Component::ALL {
            if scope.includes(component) && backups.latest(component)?.is_none() {
                return Err(no_backup(self.layout, component));
            }
        }

        let mut journal = self.begin("rollback")?;
        let outcome = self.apply_rollback(scope, &mut journal);
        let status = if outcome.is_ok() { "committed" } else { "failed" };
        close(journal, status, outcome)
    }

    /// Removes every component in `scope`, server first. A full uninstall
    /// also forgets the last known-good record.
    pub fn uninstall(&self, scope: ComponentScope) -> LifecycleResult<Vec<UninstallResult>> {
        let mut journal = self.begin("uninstall")?;
        let outcome = (|| -> LifecycleResult<Vec<UninstallResult>> {
            let mut results = Vec::new();
            for component in [Component::AppServer, Component::Java] {
                if !scope.includes(component) {
                    continue;
                }
                let result = self.manager(component).uninstall()?;
                journal.note(
                    &format!("uninstall:{}", component.slot_name()),
                    "done",
                    None,
                );
                results.push(result);
            }
            if scope == ComponentScope::All && clear_previous_versions(self.layout)? {
                journal.note("record", "cleared", None);
            }
            if scope == ComponentScope::Java
                && InstalledStateInspector::new(self.layout)
                    .current(Component::AppServer)?
                    .is_some()
            {
                tracing::warn!("app-server remains installed without a java runtime");
            }
            Ok(results)
        })();
        let status = if outcome.is_ok() { "committed" } else { "failed" };
        close(journal, status, outcome)
    }

    /// Read-only view of both components. Desired versions are included when
    /// the descriptor loads.
    pub fn status(&self) -> LifecycleResult<Vec<ComponentStatus>> {
        let desired = match self.source.load() {
            Ok(desired) => Some(desired),
            Err(err) => {
                tracing::warn!(source = %self.source.describe(), error = %format!("{err:#}"), "desired state unavailable");
                None
            }
        };
        let record = read_previous_versions(self.layout)?;
        let inspector = InstalledStateInspector::new(self.layout);
        let backups = BackupStore::new(self.layout);

        Component::ALL
            .into_iter()
            .map(|component| -> LifecycleResult<ComponentStatus> {
                Ok(ComponentStatus {
                    component,
                    installed: inspector.current_version(component)?,
                    backup: backups.latest(component)?.map(|backup| backup.version),
                    desired: desired
                        .as_ref()
                        .map(|desired| desired.version(component).clone()),
                    last_known_good: record
                        .as_ref()
                        .map(|record| record.version(component).clone()),
                })
            })
            .collect()
    }

    fn load_desired(&self) -> LifecycleResult<DesiredState> {
        let desired = self.source.load().map_err(LifecycleError::Config)?;
        tracing::debug!(
            source = %self.source.describe(),
            java = %desired.java_version,
            tomcat = %desired.tomcat_version,
            "desired state loaded"
        );
        Ok(desired)
    }

    fn plan_against(
        &self,
        desired: &DesiredState,
    ) -> LifecycleResult<(OperationReport, PreviousVersionsRecord)> {
        let inspector = InstalledStateInspector::new(self.layout);
        let java = inspector.current(Component::Java)?;
        let tomcat = inspector.current(Component::AppServer)?;

        if let (Some(java), Some(tomcat)) = (&java, &tomcat) {
            if java.version == desired.java_version && tomcat.version == desired.tomcat_version {
                return Err(LifecycleError::NoOp {
                    java: java.version.clone(),
                    tomcat: tomcat.version.clone(),
                });
            }
        }
        let java = java.ok_or(LifecycleError::NotInstalled {
            component: Component::Java,
        })?;
        let tomcat = tomcat.ok_or(LifecycleError::NotInstalled {
            component: Component::AppServer,
        })?;

        let java_transition = if java.version == desired.java_version {
            Transition::Unchanged(java.version.clone())
        } else {
            Transition::Upgraded {
                from: java.version.clone(),
                to: desired.java_version.clone(),
            }
        };
        let tomcat_transition = if tomcat.version != desired.tomcat_version {
            Transition::Upgraded {
                from: tomcat.version.clone(),
                to: desired.tomcat_version.clone(),
            }
        } else if matches!(java_transition, Transition::Upgraded { .. }) {
            Transition::Rebound(tomcat.version.clone())
        } else {
            Transition::Unchanged(tomcat.version.clone())
        };

        Ok((
            OperationReport {
                java: java_transition,
                tomcat: tomcat_transition,
            },
            PreviousVersionsRecord {
                java: java.version,
                tomcat: tomcat.version,
            },
        ))
    }

    fn apply_upgrade(
        &self,
        desired: &DesiredState,
        report: &OperationReport,
        previous: &PreviousVersionsRecord,
        journal: &mut OperationJournal<'_>,
    ) -> LifecycleResult<OperationReport> {
        let java_changed = matches!(report.java, Transition::Upgraded { .. });
        if java_changed {
            let installed = self
                .manager(Component::Java)
                .upgrade(&desired.java_version, &desired.java_artifact_url)?;
            journal.note(
                "upgrade:java",
                "done",
                Some(installed.install_path.display().to_string()),
            );
        }

        let runtime_home = self
            .layout
            .canonical_path(Component::Java, desired.java_version.as_str());
        let mut server = self
            .manager(Component::AppServer)
            .with_runtime_home(runtime_home);
        let server_step = match &report.tomcat {
            Transition::Upgraded { to, .. } => server
                .upgrade(to, &desired.tomcat_artifact_url)
                .map(|installed| Some(installed.install_path)),
            Transition::Rebound(_) => server
                .rebind_runtime()
                .map(|installed| Some(installed.install_path)),
            Transition::Unchanged(_) | Transition::Installed(_) => Ok(None),
        };

        match server_step {
            Ok(path) => {
                if let Some(path) = path {
                    journal.note(
                        "upgrade:tomcat",
                        "done",
                        Some(path.display().to_string()),
                    );
                }
            }
            Err(cause) if java_changed => {
                tracing::error!(error = %cause, "app-server step failed; rolling java back");
                journal.note("compensate:java", "started", None);
                return Err(self.compensate(cause));
            }
            Err(cause) => return Err(cause),
        }

        match write_previous_versions(self.layout, previous) {
            Ok(path) => journal.note("record", "written", Some(path.display().to_string())),
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "failed to record last known-good versions")
            }
        }
        Ok(report.clone())
    }

    /// Rolls the JDK back to its backup and re-renders the server unit against
    /// it. Attempted exactly once.
    fn compensate(&self, cause: LifecycleError) -> LifecycleError {
        let attempt = (|| -> LifecycleResult<InstalledComponent> {
            let restored = self.manager(Component::Java).rollback()?;
            self.manager(Component::AppServer)
                .with_runtime_home(restored.install_path.clone())
                .rebind_runtime()?;
            Ok(restored)
        })();

        match attempt {
            Ok(restored) => {
                tracing::warn!(java = %restored.version, "compensation complete");
                LifecycleError::Compensated {
                    restored_java: restored.version,
                    cause: Box::new(cause),
                }
            }
            Err(compensation) => {
                tracing::error!(error = %compensation, "compensation failed");
                LifecycleError::CompensationFailed {
                    cause: Box::new(cause),
                    compensation: Box::new(compensation),
                }
            }
        }
    }

    fn apply_install(
        &self,
        desired: &DesiredState,
        java_present: bool,
        tomcat_present: bool,
        journal: &mut OperationJournal<'_>,
    ) -> LifecycleResult<OperationReport> {
        let java = if java_present {
            Transition::Unchanged(desired.java_version.clone())
        } else {
            let installed = self
                .manager(Component::Java)
                .install(&desired.java_version, &desired.java_artifact_url)?;
            journal.note(
                "install:java",
                "done",
                Some(installed.install_path.display().to_string()),
            );
            Transition::Installed(installed.version)
        };

        let tomcat = if tomcat_present {
            Transition::Unchanged(desired.tomcat_version.clone())
        } else {
            let runtime_home = self
                .layout
                .canonical_path(Component::Java, desired.java_version.as_str());
            let installed = self
                .manager(Component::AppServer)
                .with_runtime_home(runtime_home)
                .install(&desired.tomcat_version, &desired.tomcat_artifact_url)?;
            journal.note(
                "install:tomcat",
                "done",
                Some(installed.install_path.display().to_string()),
            );
            Transition::Installed(installed.version)
        };

        let record = PreviousVersionsRecord {
            java: desired.java_version.clone(),
            tomcat: desired.tomcat_version.clone(),
        };
        match write_previous_versions(self.layout, &record) {
            Ok(path) => journal.note("record", "written", Some(path.display().to_string())),
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "failed to record last known-good versions")
            }
        }
        Ok(OperationReport { java, tomcat })
    }

    fn apply_rollback(
        &self,
        scope: ComponentScope,
        journal: &mut OperationJournal<'_>,
    ) -> LifecycleResult<Vec<InstalledComponent>> {
        let mut restored = Vec::new();

        if scope.includes(Component::Java) {
            let java = self.manager(Component::Java).rollback()?;
            journal.note(
                "rollback:java",
                "done",
                Some(java.install_path.display().to_string()),
            );
            restored.push(java);
        }

        let inspector = InstalledStateInspector::new(self.layout);
        let runtime_home = inspector
            .current(Component::Java)?
            .map(|java| java.install_path);
        let server = || {
            let manager = self.manager(Component::AppServer);
            match &runtime_home {
                Some(runtime_home) => manager.with_runtime_home(runtime_home.clone()),
                None => manager,
            }
        };

        if scope.includes(Component::AppServer) {
            let tomcat = server().rollback()?;
            journal.note(
                "rollback:tomcat",
                "done",
                Some(tomcat.install_path.display().to_string()),
            );
            restored.push(tomcat);
        } else if inspector.current(Component::AppServer)?.is_some() {
            server().rebind_runtime()?;
            journal.note("rebind:tomcat", "done", None);
        }

        Ok(restored)
    }

    fn begin(&self, operation: &str) -> LifecycleResult<OperationJournal<'a>> {
        if let Some(txid) = OperationJournal::active_txid(self.layout)? {
            return Err(LifecycleError::OperationInProgress(anyhow!(
                "transaction {txid} holds {}; remove it if no other run is active",
                self.layout.transaction_active_path().display()
            )));
        }
        self.layout.ensure_base_dirs()?;
        OperationJournal::begin(self.layout, operation).map_err(LifecycleError::OperationInProgress)
    }

    fn manager(&self, component: Component) -> ComponentLifecycleManager<'a> {
        ComponentLifecycleManager::new(component, self.layout, self.caps)
    }
}

/// Releases the journal with `status`. A failure to release only surfaces
/// when the operation itself succeeded.
fn close<T>(
    journal: OperationJournal<'_>,
    status: &str,
    outcome: LifecycleResult<T>,
) -> LifecycleResult<T> {
    let txid = journal.txid().to_string();
    match (journal.finish(status), outcome) {
        (Ok(()), outcome) => outcome,
        (Err(err), Ok(_)) => Err(LifecycleError::Other(
            err.context(format!("failed to close transaction {txid}")),
        )),
        (Err(err), Err(outcome)) => {
            tracing::warn!(%txid, error = %format!("{err:#}"), "failed to close transaction");
            Err(outcome)
        }
    }
}
