use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::{Component, Version};

/// Target versions and artifact locations for both components.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredState {
    #[serde(rename = "javaVersion", alias = "java_version")]
    pub java_version: Version,
    #[serde(
        rename = "javaArtifactURL",
        alias = "javaURL",
        alias = "javaArtifactUrl",
        alias = "java_artifact_url"
    )]
    pub java_artifact_url: String,
    #[serde(rename = "tomcatVersion", alias = "tomcat_version")]
    pub tomcat_version: Version,
    #[serde(
        rename = "tomcatArtifactURL",
        alias = "tomcatURL",
        alias = "tomcatArtifactUrl",
        alias = "tomcat_artifact_url"
    )]
    pub tomcat_artifact_url: String,
}

impl DesiredState {
    pub fn from_json_str(input: &str) -> Result<Self> {
        let state: Self =
            serde_json::from_str(input).context("failed to parse desired state descriptor")?;
        state.validate()?;
        Ok(state)
    }

    pub fn from_toml_str(input: &str) -> Result<Self> {
        let state: Self =
            toml::from_str(input).context("failed to parse desired state descriptor")?;
        state.validate()?;
        Ok(state)
    }

    pub fn version(&self, component: Component) -> &Version {
        match component {
            Component::Java => &self.java_version,
            Component::AppServer => &self.tomcat_version,
        }
    }

    pub fn artifact_url(&self, component: Component) -> &str {
        match component {
            Component::Java => &self.java_artifact_url,
            Component::AppServer => &self.tomcat_artifact_url,
        }
    }

    fn validate(&self) -> Result<()> {
        for component in Component::ALL {
            validate_artifact_url(self.artifact_url(component)).with_context(|| {
                format!("invalid artifact location for component '{component}'")
            })?;
        }
        Ok(())
    }
}

fn validate_artifact_url(url: &str) -> Result<()> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("artifact URL must not be empty"));
    }
    let supported = trimmed.starts_with("https://")
        || trimmed.starts_with("http://")
        || trimmed.starts_with("file://")
        || Path::new(trimmed).is_absolute();
    if !supported {
        return Err(anyhow!(
            "artifact URL must be http(s)://, file:// or an absolute path: {trimmed}"
        ));
    }
    Ok(())
}

/// Where the desired state of an operation comes from.
pub trait DesiredStateSource {
    fn load(&self) -> Result<DesiredState>;

    fn describe(&self) -> String;
}

/// Descriptor stored on the local filesystem. `.toml` files are parsed as
/// TOML, anything else as JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDesiredState {
    path: PathBuf,
}

impl FileDesiredState {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DesiredStateSource for FileDesiredState {
    fn load(&self) -> Result<DesiredState> {
        let raw = fs::read_to_string(&self.path).with_context(|| {
            format!(
                "failed to read desired state descriptor: {}",
                self.path.display()
            )
        })?;
        let is_toml = self.path.extension().and_then(|v| v.to_str()) == Some("toml");
        let parsed = if is_toml {
            DesiredState::from_toml_str(&raw)
        } else {
            DesiredState::from_json_str(&raw)
        };
        parsed.with_context(|| format!("invalid descriptor: {}", self.path.display()))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
