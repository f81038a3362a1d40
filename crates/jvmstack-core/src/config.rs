use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

pub const CONFIG_ENV_VAR: &str = "JVMSTACK_CONFIG";
pub const SYSTEM_CONFIG_PATH: &str = "/etc/jvmstack/config.toml";

/// Host paths and knobs. Every field has a default so an empty file (or no
/// file at all) describes a conventional Linux host.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HostConfig {
    pub java_root: PathBuf,
    pub tomcat_root: PathBuf,
    pub backup_root: PathBuf,
    pub state_dir: PathBuf,
    pub unit_dir: PathBuf,
    pub environment_file: PathBuf,
    pub shell_files: Vec<PathBuf>,
    pub service_user: Option<String>,
    pub desired_state: String,
    pub download_timeout_secs: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            java_root: PathBuf::from("/opt/java"),
            tomcat_root: PathBuf::from("/opt/tomcat"),
            backup_root: PathBuf::from("/opt/backup"),
            state_dir: PathBuf::from("/var/lib/jvmstack"),
            unit_dir: PathBuf::from("/etc/systemd/system"),
            environment_file: PathBuf::from("/etc/environment"),
            shell_files: default_shell_files(),
            service_user: None,
            desired_state: "/etc/jvmstack/desired.json".to_string(),
            download_timeout_secs: 300,
        }
    }
}

impl HostConfig {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        toml::from_str(input).context("failed to parse host config")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read host config: {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("invalid host config: {}", path.display()))
    }

    /// Explicit path first, then `JVMSTACK_CONFIG`, then the system file if it
    /// exists; defaults otherwise.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV_VAR) {
            return Self::load(Path::new(&path));
        }
        let system = Path::new(SYSTEM_CONFIG_PATH);
        if system.exists() {
            return Self::load(system);
        }
        Ok(Self::default())
    }
}

fn default_shell_files() -> Vec<PathBuf> {
    let Some(home) = std::env::var_os("HOME") else {
        return Vec::new();
    };
    let home = PathBuf::from(home);
    vec![
        home.join(".bash_profile"),
        home.join(".bashrc"),
        home.join(".zshrc"),
    ]
}
