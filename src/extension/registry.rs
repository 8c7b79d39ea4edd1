//! Installed extension registry
//!
//! Tracks which extensions are installed in a profile and which of those
//! are enabled. Disabled extensions still get their permissions recomputed
//! so settings UIs stay accurate.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use super::extension::Extension;
use crate::core::{ExtensionId, PermissionError, PermissionResult};

#[derive(Debug, Default)]
struct RegistryInner {
    enabled: BTreeMap<ExtensionId, Arc<Extension>>,
    disabled: BTreeMap<ExtensionId, Arc<Extension>>,
}

/// Installed and enabled extensions of one profile
#[derive(Debug, Default)]
pub struct ExtensionRegistry {
    inner: RwLock<RegistryInner>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an enabled extension, replacing any previous install
    pub fn add_enabled(&self, extension: Arc<Extension>) {
        let mut inner = self.inner.write().unwrap();
        inner.disabled.remove(extension.id());
        inner.enabled.insert(extension.id().clone(), extension);
    }

    /// Add a disabled extension, replacing any previous install
    pub fn add_disabled(&self, extension: Arc<Extension>) {
        let mut inner = self.inner.write().unwrap();
        inner.enabled.remove(extension.id());
        inner.disabled.insert(extension.id().clone(), extension);
    }

    pub fn enable(&self, id: &ExtensionId) -> PermissionResult<()> {
        let mut inner = self.inner.write().unwrap();
        if inner.enabled.contains_key(id) {
            return Ok(());
        }
        let extension = inner
            .disabled
            .remove(id)
            .ok_or_else(|| PermissionError::ExtensionNotFound(id.to_string()))?;
        inner.enabled.insert(id.clone(), extension);
        Ok(())
    }

    pub fn disable(&self, id: &ExtensionId) -> PermissionResult<()> {
        let mut inner = self.inner.write().unwrap();
        if inner.disabled.contains_key(id) {
            return Ok(());
        }
        let extension = inner
            .enabled
            .remove(id)
            .ok_or_else(|| PermissionError::ExtensionNotFound(id.to_string()))?;
        inner.disabled.insert(id.clone(), extension);
        Ok(())
    }

    /// Uninstall
    pub fn remove(&self, id: &ExtensionId) -> Option<Arc<Extension>> {
        let mut inner = self.inner.write().unwrap();
        inner.enabled.remove(id).or_else(|| inner.disabled.remove(id))
    }

    pub fn get_installed(&self, id: &ExtensionId) -> Option<Arc<Extension>> {
        let inner = self.inner.read().unwrap();
        inner.enabled.get(id).or_else(|| inner.disabled.get(id)).cloned()
    }

    pub fn get_enabled(&self, id: &ExtensionId) -> Option<Arc<Extension>> {
        self.inner.read().unwrap().enabled.get(id).cloned()
    }

    pub fn is_enabled(&self, id: &ExtensionId) -> bool {
        self.inner.read().unwrap().enabled.contains_key(id)
    }

    /// Snapshot of the enabled extensions
    pub fn enabled_extensions(&self) -> Vec<Arc<Extension>> {
        self.inner.read().unwrap().enabled.values().cloned().collect()
    }

    /// Snapshot of every installed extension, enabled first
    pub fn installed_extensions(&self) -> Vec<Arc<Extension>> {
        let inner = self.inner.read().unwrap();
        inner
            .enabled
            .values()
            .chain(inner.disabled.values())
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.read().unwrap();
        inner.enabled.len() + inner.disabled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
