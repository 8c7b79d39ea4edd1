//! Extension manifests as JSON
//!
//! A reduced manifest: only the fields that feed permission computation.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::extension::{CreationFlags, Extension, ExtensionBuilder, ManifestLocation};
use crate::core::{EngineConfig, PermissionResult};

/// Content script entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentScript {
    #[serde(default)]
    pub matches: Vec<String>,
}

/// Permission-relevant manifest fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtensionManifest {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub location: ManifestLocation,
    /// Withhold host permissions at install
    #[serde(default)]
    pub withhold_permissions: bool,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub host_permissions: Vec<String>,
    #[serde(default)]
    pub optional_permissions: Vec<String>,
    #[serde(default)]
    pub optional_host_permissions: Vec<String>,
    #[serde(default)]
    pub content_scripts: Vec<ContentScript>,
}

impl ExtensionManifest {
    /// Load a JSON array of manifests
    pub fn load_all(path: impl AsRef<Path>) -> PermissionResult<Vec<ExtensionManifest>> {
        let file = File::open(path.as_ref())?;
        let manifests = serde_json::from_reader(BufReader::new(file))?;
        Ok(manifests)
    }

    pub fn to_builder(&self) -> ExtensionBuilder {
        let mut builder = ExtensionBuilder::new(self.id.as_str())
            .with_location(self.location)
            .add_permissions(self.permissions.iter().chain(&self.host_permissions).cloned());
        if let Some(name) = &self.name {
            builder = builder.with_name(name.as_str());
        }
        if self.withhold_permissions {
            builder = builder.with_creation_flags(CreationFlags::WITHHOLD_PERMISSIONS);
        }
        for permission in self.optional_permissions.iter().chain(&self.optional_host_permissions) {
            builder = builder.add_optional_permission(permission.as_str());
        }
        for script in &self.content_scripts {
            for pattern in &script.matches {
                builder = builder.add_content_script_match(pattern.as_str());
            }
        }
        builder
    }

    pub fn build(&self, config: &EngineConfig) -> PermissionResult<Arc<Extension>> {
        self.to_builder().build(config)
    }
}
