use anyhow::{anyhow, Context};
use jvmstack_core::{Component, Version};
use std::fs;
use std::path::{Path, PathBuf};

use crate::artifact::ArtifactFetcher;
use crate::environment::EnvironmentVariableManager;
use crate::fs_utils::{make_tmp_dir, move_dir_or_copy, remove_dir_if_exists};
use crate::record::read_previous_versions;
use crate::service::{Ownership, ServiceControl, ServiceUnitManager};
use crate::{
    Backup, BackupStore, ComponentState, HostLayout, InstalledComponent, InstalledStateInspector,
    LifecycleError, LifecycleResult, ServiceDependencies, UninstallResult, UninstallStatus,
};

/// Host capabilities the lifecycle layer drives but does not implement.
#[derive(Clone, Copy)]
pub struct Capabilities<'a> {
    pub fetcher: &'a dyn ArtifactFetcher,
    pub services: &'a dyn ServiceControl,
    pub ownership: &'a dyn Ownership,
}

/// Install, upgrade, rollback and uninstall for one component. Each
/// operation either ends with the component in a consistent installed (or
/// removed) state or returns an error after attempting to put the previous
/// version back.
pub struct ComponentLifecycleManager<'a> {
    component: Component,
    layout: &'a HostLayout,
    caps: Capabilities<'a>,
    env: EnvironmentVariableManager,
    runtime_home: Option<PathBuf>,
    state: ComponentState,
}

impl<'a> ComponentLifecycleManager<'a> {
    pub fn new(component: Component, layout: &'a HostLayout, caps: Capabilities<'a>) -> Self {
        let state = InstalledStateInspector::new(layout)
            .current(component)
            .map(|installed| ComponentState::from_installed(installed.as_ref()))
            .unwrap_or(ComponentState::Absent);
        Self {
            component,
            layout,
            caps,
            env: EnvironmentVariableManager,
            runtime_home: None,
            state,
        }
    }

    /// Binds the server unit to this runtime instead of the installed JDK.
    pub fn with_runtime_home(mut self, runtime_home: impl Into<PathBuf>) -> Self {
        self.runtime_home = Some(runtime_home.into());
        self
    }

    pub fn component(&self) -> Component {
        self.component
    }

    pub fn state(&self) -> &ComponentState {
        &self.state
    }

    pub fn install(&mut self, version: &Version, url: &str) -> LifecycleResult<InstalledComponent> {
        let component = self.component;
        tracing::info!(%component, %version, url, "installing");

        let dependencies = self.service_dependencies(version)?;
        let staging = self.make_staging(version)?;
        let result = (|| -> LifecycleResult<InstalledComponent> {
            let payload = self.fetch_into(&staging, url)?;
            let installed = self.place(version, &payload)?;
            self.bind_environment(&installed)
                .map_err(|source| self.install_failure(version, source))?;
            if let Some(dependencies) = &dependencies {
                self.activate_unit(version, dependencies)?;
                self.prune_units(version)?;
            }
            Ok(installed)
        })();
        let _ = fs::remove_dir_all(&staging);

        let installed = result?;
        self.transition(ComponentState::Installed(version.clone()));
        self.verify_installed(version)?;
        Ok(installed)
    }

    pub fn upgrade(&mut self, version: &Version, url: &str) -> LifecycleResult<InstalledComponent> {
        let component = self.component;
        let current = InstalledStateInspector::new(self.layout)
            .current(component)?
            .ok_or(LifecycleError::NotInstalled { component })?;
        self.state = ComponentState::Installed(current.version.clone());
        if current.version == *version {
            tracing::info!(%component, %version, "already at requested version");
            return Ok(current);
        }
        tracing::info!(%component, from = %current.version, to = %version, url, "upgrading");

        let dependencies = self.service_dependencies(version)?;
        let staging = self.make_staging(version)?;

        self.transition(ComponentState::BackingUp);
        let backup = match self.backups().retain(component, &current.install_path) {
            Ok(backup) => backup,
            Err(source) => {
                let _ = fs::remove_dir_all(&staging);
                self.transition(ComponentState::Installed(current.version.clone()));
                return Err(LifecycleError::Backup {
                    component,
                    version: current.version.clone(),
                    source,
                });
            }
        };

        self.transition(ComponentState::Upgrading);
        let result = self.upgrade_steps(&current, version, url, &staging, dependencies.as_ref());
        let _ = fs::remove_dir_all(&staging);

        match result {
            Ok(installed) => {
                self.transition(ComponentState::Installed(version.clone()));
                self.verify_installed(version)?;
                Ok(installed)
            }
            Err(cause) => {
                tracing::warn!(%component, error = %cause, "upgrade failed; restoring previous version from backup");
                match self.self_heal(&current, &backup, version) {
                    Ok(()) => {
                        self.transition(ComponentState::Installed(current.version.clone()));
                        Err(cause)
                    }
                    Err(heal) => Err(LifecycleError::SelfHealFailed {
                        component,
                        cause: Box::new(cause),
                        heal,
                    }),
                }
            }
        }
    }

    pub fn rollback(&mut self) -> LifecycleResult<InstalledComponent> {
        let component = self.component;
        let current = InstalledStateInspector::new(self.layout).current(component)?;
        let Some(backup) = self.backups().latest(component)? else {
            return Err(no_backup(self.layout, component));
        };
        tracing::info!(
            %component,
            from = %current.as_ref().map(|c| c.version.to_string()).unwrap_or_else(|| "none".to_string()),
            to = %backup.version,
            "rolling back"
        );

        let dependencies = self.service_dependencies(&backup.version)?;
        if dependencies.is_some() {
            self.units()
                .deactivate_all()
                .map_err(|err| rollback_failure(component, err))?;
        }

        if let Some(current) = &current {
            remove_dir_if_exists(&current.install_path)
                .map_err(|err| rollback_failure(component, err))?;
        }
        let destination = self
            .layout
            .canonical_path(component, backup.version.as_str());
        remove_dir_if_exists(&destination).map_err(|err| rollback_failure(component, err))?;
        self.backups()
            .restore(&backup, &destination)
            .map_err(|err| rollback_failure(component, err))?;

        let restored = InstalledComponent {
            component,
            version: backup.version.clone(),
            install_path: destination,
        };
        self.hand_over(&restored)
            .map_err(|err| rollback_failure(component, err))?;
        self.bind_environment(&restored)
            .map_err(|err| rollback_failure(component, err))?;
        if let Some(dependencies) = &dependencies {
            self.activate_unit(&restored.version, dependencies)?;
            self.prune_units(&restored.version)?;
        }

        self.transition(ComponentState::RolledBack(restored.version.clone()));
        self.verify_installed(&restored.version)?;
        Ok(restored)
    }

    pub fn uninstall(&mut self) -> LifecycleResult<UninstallResult> {
        let component = self.component;
        let candidates = InstalledStateInspector::new(self.layout).candidates(component);
        let version = candidates.last().map(|installed| installed.version.clone());
        let mut removed_any = !candidates.is_empty();

        if component.is_service_bearing() {
            let units = self.units();
            if let Err(err) = units.deactivate_all() {
                tracing::warn!(%component, error = %format!("{err:#}"), "failed to stop units during uninstall");
            }
            removed_any |= !units.remove_all()?.is_empty();
        }

        for installed in &candidates {
            remove_dir_if_exists(&installed.install_path)?;
        }
        removed_any |= self.backups().discard(component)? > 0;
        self.env
            .remove_everywhere(&self.layout.environment_targets(), component.home_variable())?;

        self.transition(ComponentState::Removed);
        let status = if removed_any {
            tracing::info!(%component, "uninstalled");
            UninstallStatus::Uninstalled
        } else {
            tracing::info!(%component, "nothing to uninstall");
            UninstallStatus::NotInstalled
        };
        Ok(UninstallResult {
            component,
            version,
            status,
        })
    }

    /// Rewrites and re-activates the server unit for the installed version
    /// against the current runtime binding. No-op for components without a
    /// service.
    pub fn rebind_runtime(&mut self) -> LifecycleResult<InstalledComponent> {
        let component = self.component;
        let current = InstalledStateInspector::new(self.layout)
            .current(component)?
            .ok_or(LifecycleError::NotInstalled { component })?;
        if let Some(dependencies) = self.service_dependencies(&current.version)? {
            tracing::info!(%component, version = %current.version, runtime = %dependencies.runtime_home.display(), "rebinding service to runtime");
            self.activate_unit(&current.version, &dependencies)?;
            self.prune_units(&current.version)?;
        }
        self.transition(ComponentState::Installed(current.version.clone()));
        Ok(current)
    }

    fn upgrade_steps(
        &self,
        current: &InstalledComponent,
        version: &Version,
        url: &str,
        staging: &Path,
        dependencies: Option<&ServiceDependencies>,
    ) -> LifecycleResult<InstalledComponent> {
        remove_dir_if_exists(&current.install_path)
            .map_err(|source| self.install_failure(version, source))?;
        let payload = self.fetch_into(staging, url)?;
        let installed = self.place(version, &payload)?;
        self.bind_environment(&installed)
            .map_err(|source| self.install_failure(version, source))?;
        if let Some(dependencies) = dependencies {
            self.activate_unit(version, dependencies)?;
            self.prune_units(version)?;
        }
        Ok(installed)
    }

    /// Puts `previous` back from `backup` after a failed upgrade to
    /// `attempted`.
    fn self_heal(
        &self,
        previous: &InstalledComponent,
        backup: &Backup,
        attempted: &Version,
    ) -> anyhow::Result<()> {
        let component = self.component;
        let attempted_path = self.layout.canonical_path(component, attempted.as_str());
        if attempted_path != previous.install_path {
            remove_dir_if_exists(&attempted_path)?;
        }
        remove_dir_if_exists(&previous.install_path)?;
        self.backups()
            .restore(backup, &previous.install_path)
            .context("failed to restore backup")?;
        self.hand_over(previous)?;
        self.bind_environment(previous)?;

        if component.is_service_bearing() {
            let units = self.units();
            if attempted != &previous.version
                && self
                    .layout
                    .unit_path(component, attempted.as_str())
                    .exists()
            {
                units.retire(attempted)?;
            }
            if !self
                .layout
                .unit_path(component, previous.version.as_str())
                .exists()
            {
                if let Ok(Some(dependencies)) = self.service_dependencies(&previous.version) {
                    units.write(&previous.version, &dependencies)?;
                }
            }
            // The runtime may still be mid-transition; the orchestrator
            // re-renders the unit once the JDK is settled.
            if let Err(err) = units.activate(&previous.version) {
                tracing::warn!(%component, version = %previous.version, error = %format!("{err:#}"), "previous unit did not restart after restore");
            }
        }

        tracing::info!(%component, version = %previous.version, "previous version restored");
        Ok(())
    }

    fn service_dependencies(
        &self,
        version: &Version,
    ) -> LifecycleResult<Option<ServiceDependencies>> {
        if !self.component.is_service_bearing() {
            return Ok(None);
        }
        let runtime_home = match &self.runtime_home {
            Some(runtime_home) => runtime_home.clone(),
            None => InstalledStateInspector::new(self.layout)
                .current(Component::Java)?
                .map(|java| java.install_path)
                .ok_or_else(|| {
                    self.install_failure(
                        version,
                        anyhow!("no java runtime is installed for the service to run on"),
                    )
                })?,
        };
        Ok(Some(ServiceDependencies {
            runtime_home,
            service_user: self.layout.config().service_user.clone(),
        }))
    }

    fn make_staging(&self, version: &Version) -> LifecycleResult<PathBuf> {
        make_tmp_dir(self.layout, &format!("fetch-{}", self.component.slot_name()))
            .map_err(|source| self.install_failure(version, source))
    }

    fn fetch_into(&self, staging: &Path, url: &str) -> LifecycleResult<PathBuf> {
        self.caps
            .fetcher
            .fetch(url, staging)
            .map_err(|source| LifecycleError::Fetch {
                component: self.component,
                url: url.to_string(),
                source,
            })
    }

    fn place(&self, version: &Version, payload: &Path) -> LifecycleResult<InstalledComponent> {
        let component = self.component;
        let destination = self.layout.canonical_path(component, version.as_str());
        let result = (|| -> anyhow::Result<()> {
            remove_dir_if_exists(&destination)?;
            move_dir_or_copy(payload, &destination)?;
            Ok(())
        })();
        result.map_err(|source| self.install_failure(version, source))?;

        let installed = InstalledComponent {
            component,
            version: version.clone(),
            install_path: destination,
        };
        self.hand_over(&installed)
            .map_err(|source| self.install_failure(version, source))?;
        tracing::info!(%component, %version, path = %installed.install_path.display(), "placed at canonical path");
        Ok(installed)
    }

    fn hand_over(&self, installed: &InstalledComponent) -> anyhow::Result<()> {
        if !self.component.is_service_bearing() {
            return Ok(());
        }
        let Some(user) = &self.layout.config().service_user else {
            return Ok(());
        };
        self.caps.ownership.hand_over(&installed.install_path, user)
    }

    fn bind_environment(&self, installed: &InstalledComponent) -> anyhow::Result<()> {
        self.env.set_everywhere(
            &self.layout.environment_targets(),
            self.component.home_variable(),
            &installed.install_path.display().to_string(),
        )
    }

    fn activate_unit(
        &self,
        version: &Version,
        dependencies: &ServiceDependencies,
    ) -> LifecycleResult<()> {
        let units = self.units();
        units
            .write(version, dependencies)
            .map_err(|source| self.install_failure(version, source))?;
        units
            .activate(version)
            .map_err(|source| LifecycleError::ServiceActivation {
                unit: units.unit_name(version.as_str()),
                source,
            })
    }

    fn prune_units(&self, keep: &Version) -> LifecycleResult<()> {
        let pruned = self.units().prune_others(keep)?;
        if !pruned.is_empty() {
            tracing::info!(component = %self.component, ?pruned, "pruned stale service units");
        }
        Ok(())
    }

    fn verify_installed(&self, expected: &Version) -> LifecycleResult<()> {
        let component = self.component;
        match InstalledStateInspector::new(self.layout).current(component)? {
            Some(installed) if installed.version == *expected => Ok(()),
            other => Err(LifecycleError::InconsistentState {
                component,
                candidates: other
                    .map(|installed| installed.install_path.display().to_string())
                    .into_iter()
                    .collect(),
            }),
        }
    }

    fn transition(&mut self, next: ComponentState) {
        tracing::debug!(component = %self.component, from = %self.state, to = %next, "state transition");
        self.state = next;
    }

    fn backups(&self) -> BackupStore<'a> {
        BackupStore::new(self.layout)
    }

    fn units(&self) -> ServiceUnitManager<'a> {
        ServiceUnitManager::new(self.layout, self.caps.services)
    }

    fn install_failure(&self, version: &Version, source: anyhow::Error) -> LifecycleError {
        LifecycleError::Install {
            component: self.component,
            version: version.clone(),
            source,
        }
    }
}

/// `NoBackup` for `component`, hinting at the last known-good version when
/// one was recorded.
pub(crate) fn no_backup(layout: &HostLayout, component: Component) -> LifecycleError {
    let hint = read_previous_versions(layout)
        .ok()
        .flatten()
        .map(|record| record.version(component).clone());
    LifecycleError::NoBackup { component, hint }
}

fn rollback_failure(component: Component, err: anyhow::Error) -> LifecycleError {
    LifecycleError::Other(err.context(format!("rollback of {component} failed")))
}
