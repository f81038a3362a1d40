mod archive;
mod component;
mod config;
mod desired;
mod version;

pub use archive::ArchiveType;
pub use component::Component;
pub use config::{HostConfig, CONFIG_ENV_VAR, SYSTEM_CONFIG_PATH};
pub use desired::{DesiredState, DesiredStateSource, FileDesiredState};
pub use version::{compare_versions, Version};
