use anyhow::{anyhow, Context, Result};
use jvmstack_core::{Component, Version};
use std::fs;
use std::path::Path;
use std::process::Command;

use crate::fs_utils::{remove_file_if_exists, run_command};
use crate::{HostLayout, ServiceDependencies, ServiceUnit};

/// Service manager operations on named units.
pub trait ServiceControl {
    fn daemon_reload(&self) -> Result<()>;
    fn enable(&self, unit: &str) -> Result<()>;
    fn disable(&self, unit: &str) -> Result<()>;
    fn restart(&self, unit: &str) -> Result<()>;
    fn stop(&self, unit: &str) -> Result<()>;
}

/// Hands a directory tree to the account the service runs as.
pub trait Ownership {
    fn hand_over(&self, path: &Path, user: &str) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Systemctl;

impl Systemctl {
    fn run(&self, args: &[&str], context_message: &str) -> Result<()> {
        run_command(Command::new("systemctl").args(args), context_message)
    }
}

impl ServiceControl for Systemctl {
    fn daemon_reload(&self) -> Result<()> {
        self.run(&["daemon-reload"], "systemctl daemon-reload failed")
    }

    fn enable(&self, unit: &str) -> Result<()> {
        self.run(&["enable", unit], "systemctl enable failed")
    }

    fn disable(&self, unit: &str) -> Result<()> {
        self.run(&["disable", unit], "systemctl disable failed")
    }

    fn restart(&self, unit: &str) -> Result<()> {
        self.run(&["restart", unit], "systemctl restart failed")
    }

    fn stop(&self, unit: &str) -> Result<()> {
        self.run(&["stop", unit], "systemctl stop failed")
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Chown;

impl Ownership for Chown {
    fn hand_over(&self, path: &Path, user: &str) -> Result<()> {
        let owner = format!("{user}:{user}");
        run_command(
            Command::new("chown").arg("-R").arg(&owner).arg(path),
            "chown failed",
        )
    }
}

/// Unit definitions supervising the application server, one file per
/// installed version.
#[derive(Clone, Copy)]
pub struct ServiceUnitManager<'a> {
    layout: &'a HostLayout,
    control: &'a dyn ServiceControl,
    component: Component,
}

impl<'a> ServiceUnitManager<'a> {
    pub fn new(layout: &'a HostLayout, control: &'a dyn ServiceControl) -> Self {
        Self {
            layout,
            control,
            component: Component::AppServer,
        }
    }

    pub fn unit_name(&self, version: &str) -> String {
        self.layout.unit_file_name(self.component, version)
    }

    pub fn render(&self, version: &Version, dependencies: &ServiceDependencies) -> ServiceUnit {
        let install = self.layout.canonical_path(self.component, version.as_str());
        let install = install.display();
        let runtime = dependencies.runtime_home.display();

        let mut content = String::new();
        content.push_str("[Unit]\n");
        content.push_str(&format!("Description=Apache Tomcat {version}\n"));
        content.push_str("After=network.target\n\n");
        content.push_str("[Service]\n");
        content.push_str("Type=forking\n");
        if let Some(user) = &dependencies.service_user {
            content.push_str(&format!("User={user}\n"));
            content.push_str(&format!("Group={user}\n"));
        }
        content.push_str(&format!("Environment=\"JAVA_HOME={runtime}\"\n"));
        content.push_str(&format!("Environment=\"CATALINA_HOME={install}\"\n"));
        content.push_str(&format!("Environment=\"CATALINA_BASE={install}\"\n"));
        content.push_str(&format!(
            "Environment=\"CATALINA_PID={install}/temp/tomcat.pid\"\n"
        ));
        content.push_str(&format!("WorkingDirectory={install}\n"));
        content.push_str(&format!("ExecStart={install}/bin/startup.sh\n"));
        content.push_str(&format!("ExecStop={install}/bin/shutdown.sh\n"));
        content.push_str("Restart=on-failure\n");
        content.push_str("RestartSec=10\n\n");
        content.push_str("[Install]\n");
        content.push_str("WantedBy=multi-user.target\n");

        ServiceUnit {
            component: self.component,
            version: version.clone(),
            unit_path: self.layout.unit_path(self.component, version.as_str()),
            content,
        }
    }

    pub fn write(
        &self,
        version: &Version,
        dependencies: &ServiceDependencies,
    ) -> Result<ServiceUnit> {
        let unit = self.render(version, dependencies);
        if let Some(parent) = unit.unit_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create unit dir: {}", parent.display()))?;
        }
        fs::write(&unit.unit_path, unit.content.as_bytes())
            .with_context(|| format!("failed to write unit file: {}", unit.unit_path.display()))?;
        set_unit_permissions(&unit.unit_path)?;
        tracing::info!(unit = %unit.unit_path.display(), "service unit written");
        Ok(unit)
    }

    /// Reloads the service manager, stops every other installed unit of the
    /// component, then enables and restarts the unit for `version`.
    pub fn activate(&self, version: &Version) -> Result<()> {
        let unit = self.unit_name(version.as_str());
        if !self.layout.unit_dir().join(&unit).exists() {
            return Err(anyhow!("unit file is not installed: {unit}"));
        }
        self.control.daemon_reload()?;
        for other in self.installed_versions()? {
            if other != version.as_str() {
                let other_unit = self.unit_name(&other);
                if let Err(err) = self.control.stop(&other_unit) {
                    tracing::warn!(unit = %other_unit, error = %format!("{err:#}"), "failed to stop superseded unit");
                }
            }
        }
        self.control.enable(&unit)?;
        self.control.restart(&unit)?;
        tracing::info!(%unit, "service unit activated");
        Ok(())
    }

    /// Removes every unit file except the one for `keep`. Only call after
    /// `activate(keep)` succeeded.
    pub fn prune_others(&self, keep: &Version) -> Result<Vec<String>> {
        let mut pruned = Vec::new();
        for other in self.installed_versions()? {
            if other == keep.as_str() {
                continue;
            }
            let unit = self.unit_name(&other);
            if let Err(err) = self.control.disable(&unit) {
                tracing::warn!(%unit, error = %format!("{err:#}"), "failed to disable stale unit");
            }
            self.remove_unit_file(&other)?;
            pruned.push(unit);
        }
        if !pruned.is_empty() {
            self.control.daemon_reload()?;
        }
        Ok(pruned)
    }

    /// Stops and disables every installed unit of the component.
    pub fn deactivate_all(&self) -> Result<()> {
        for version in self.installed_versions()? {
            let unit = self.unit_name(&version);
            self.control
                .stop(&unit)
                .with_context(|| format!("failed to stop {unit}"))?;
            if let Err(err) = self.control.disable(&unit) {
                tracing::warn!(%unit, error = %format!("{err:#}"), "failed to disable unit");
            }
        }
        Ok(())
    }

    pub fn remove_all(&self) -> Result<Vec<String>> {
        let versions = self.installed_versions()?;
        for version in &versions {
            self.remove_unit_file(version)?;
        }
        if !versions.is_empty() {
            self.control.daemon_reload()?;
        }
        Ok(versions.iter().map(|version| self.unit_name(version)).collect())
    }

    /// Stops and disables the unit for `version`, then removes its file.
    /// Used to back out a unit that was enabled but never became the active
    /// one.
    pub fn retire(&self, version: &Version) -> Result<()> {
        let unit = self.unit_name(version.as_str());
        if let Err(err) = self.control.stop(&unit) {
            tracing::warn!(%unit, error = %format!("{err:#}"), "failed to stop unit");
        }
        if let Err(err) = self.control.disable(&unit) {
            tracing::warn!(%unit, error = %format!("{err:#}"), "failed to disable unit");
        }
        self.remove_unit_file(version.as_str())?;
        self.control.daemon_reload()
    }

    /// Versions that currently have a unit file, in lexical order.
    pub fn installed_versions(&self) -> Result<Vec<String>> {
        let dir = self.layout.unit_dir();
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read {}", dir.display()));
            }
        };

        let prefix = format!("{}-", self.component.slot_name());
        let mut versions = Vec::new();
        for entry in entries {
            let entry = entry?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let Some(version) = name
                .strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix(".service"))
            else {
                continue;
            };
            if !version.is_empty() {
                versions.push(version.to_string());
            }
        }
        versions.sort();
        Ok(versions)
    }

    fn remove_unit_file(&self, version: &str) -> Result<()> {
        let path = self.layout.unit_path(self.component, version);
        remove_file_if_exists(&path)
            .with_context(|| format!("failed to remove unit file: {}", path.display()))?;
        tracing::debug!(unit = %path.display(), "unit file removed");
        Ok(())
    }
}

#[cfg(unix)]
fn set_unit_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o644))
        .with_context(|| format!("failed to set permissions on {}", path.display()))
}

#[cfg(not(unix))]
fn set_unit_permissions(_path: &Path) -> Result<()> {
    Ok(())
}
