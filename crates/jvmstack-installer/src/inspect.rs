use jvmstack_core::{Component, Version};

use crate::fs_utils::list_dir_names;
use crate::{HostLayout, InstalledComponent, LifecycleError, LifecycleResult};

/// Reads the installed version of a component from its install root.
#[derive(Debug, Clone, Copy)]
pub struct InstalledStateInspector<'a> {
    layout: &'a HostLayout,
}

impl<'a> InstalledStateInspector<'a> {
    pub fn new(layout: &'a HostLayout) -> Self {
        Self { layout }
    }

    /// `None` when nothing matching the naming convention exists or the root
    /// cannot be read; `InconsistentState` when more than one version does.
    pub fn current(&self, component: Component) -> LifecycleResult<Option<InstalledComponent>> {
        let mut candidates = self.candidates(component);
        match candidates.len() {
            0 => Ok(None),
            1 => Ok(candidates.pop()),
            _ => Err(LifecycleError::InconsistentState {
                component,
                candidates: candidates
                    .iter()
                    .map(|candidate| candidate.install_path.display().to_string())
                    .collect(),
            }),
        }
    }

    pub fn current_version(&self, component: Component) -> LifecycleResult<Option<Version>> {
        Ok(self.current(component)?.map(|installed| installed.version))
    }

    /// Every directory under the install root that follows the naming
    /// convention, in lexical order.
    pub fn candidates(&self, component: Component) -> Vec<InstalledComponent> {
        let root = self.layout.install_root(component);
        let names = match list_dir_names(root) {
            Ok(names) => names,
            Err(err) => {
                tracing::warn!(%component, error = %format!("{err:#}"), "install root unreadable; treating as absent");
                return Vec::new();
            }
        };

        names
            .iter()
            .filter_map(|name| {
                let version = component.version_from_dir_name(name)?;
                let version = Version::parse(version).ok()?;
                Some(InstalledComponent {
                    component,
                    install_path: root.join(name),
                    version,
                })
            })
            .collect()
    }
}
