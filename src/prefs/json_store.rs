//! JSON-file preference store
//!
//! Keeps every record in memory and rewrites the whole file on each
//! mutation, so a write is durable before the mutating call returns.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::store::{PreferenceStore, SiteList};
use crate::core::{ExtensionId, PermissionResult};
use crate::patterns::SiteOrigin;
use crate::permissions::{PermissionSet, PolicyHostRestrictions};

/// Default file name inside a preference directory
pub const PREFERENCES_FILE: &str = "Preferences.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ExtensionPrefs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    desired_active_permissions: Option<PermissionSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    granted_permissions: Option<PermissionSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    runtime_granted_permissions: Option<PermissionSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    withholding_permissions: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    policy_host_restrictions: Option<PolicyHostRestrictions>,
    #[serde(default)]
    allow_file_access: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PrefsFile {
    #[serde(default)]
    extensions: BTreeMap<ExtensionId, ExtensionPrefs>,
    #[serde(default)]
    restricted_sites: BTreeSet<String>,
    #[serde(default)]
    permitted_sites: BTreeSet<String>,
    #[serde(default)]
    default_policy_host_restrictions: PolicyHostRestrictions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    updated_at: Option<DateTime<Utc>>,
}

impl PrefsFile {
    fn sites_mut(&mut self, list: SiteList) -> &mut BTreeSet<String> {
        match list {
            SiteList::Restricted => &mut self.restricted_sites,
            SiteList::Permitted => &mut self.permitted_sites,
        }
    }

    fn sites(&self, list: SiteList) -> &BTreeSet<String> {
        match list {
            SiteList::Restricted => &self.restricted_sites,
            SiteList::Permitted => &self.permitted_sites,
        }
    }
}

/// Preference store backed by a JSON file, or purely in memory
#[derive(Debug)]
pub struct JsonPreferenceStore {
    path: Option<PathBuf>,
    state: RwLock<PrefsFile>,
}

impl JsonPreferenceStore {
    /// Open the store at `path`, starting empty if the file does not exist
    pub fn open(path: impl Into<PathBuf>) -> PermissionResult<Self> {
        let path = path.into();
        let state = if path.exists() {
            let file = File::open(&path)?;
            serde_json::from_reader(BufReader::new(file))?
        } else {
            PrefsFile::default()
        };
        tracing::debug!(
            "[JsonPreferenceStore] Opened {} ({} extensions)",
            path.display(),
            state.extensions.len()
        );
        Ok(Self {
            path: Some(path),
            state: RwLock::new(state),
        })
    }

    /// Open `Preferences.json` inside `dir`
    pub fn open_in_dir(dir: impl AsRef<Path>) -> PermissionResult<Self> {
        Self::open(dir.as_ref().join(PREFERENCES_FILE))
    }

    /// A store that never touches disk
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: RwLock::new(PrefsFile::default()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn persist(&self, state: &PrefsFile) -> PermissionResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, state)?;
        writer.flush()?;
        Ok(())
    }

    fn read_extension<T>(&self, id: &ExtensionId, f: impl FnOnce(&ExtensionPrefs) -> T) -> Option<T> {
        self.state.read().unwrap().extensions.get(id).map(f)
    }

    /// Apply `f` to the extension's record and persist
    fn update_extension(&self, id: &ExtensionId, f: impl FnOnce(&mut ExtensionPrefs)) -> PermissionResult<()> {
        let mut state = self.state.write().unwrap();
        let now = Utc::now();
        let record = state.extensions.entry(id.clone()).or_default();
        f(record);
        record.updated_at = Some(now);
        state.updated_at = Some(now);
        self.persist(&state)
    }

    fn update_profile(&self, f: impl FnOnce(&mut PrefsFile) -> bool) -> PermissionResult<()> {
        let mut state = self.state.write().unwrap();
        if !f(&mut state) {
            return Ok(());
        }
        state.updated_at = Some(Utc::now());
        self.persist(&state)
    }
}

fn add_to(existing: &mut Option<PermissionSet>, added: &PermissionSet) {
    let merged = match existing.take() {
        Some(current) => current.union(added),
        None => added.clone(),
    };
    *existing = Some(merged);
}

fn remove_from(existing: &mut Option<PermissionSet>, removed: &PermissionSet) {
    if let Some(current) = existing.take() {
        *existing = Some(current.difference(removed));
    }
}

impl PreferenceStore for JsonPreferenceStore {
    fn get_desired_active_permissions(&self, id: &ExtensionId) -> Option<PermissionSet> {
        self.read_extension(id, |r| r.desired_active_permissions.clone()).flatten()
    }

    fn set_desired_active_permissions(&self, id: &ExtensionId, permissions: &PermissionSet) -> PermissionResult<()> {
        self.update_extension(id, |r| r.desired_active_permissions = Some(permissions.clone()))
    }

    fn get_granted_permissions(&self, id: &ExtensionId) -> Option<PermissionSet> {
        self.read_extension(id, |r| r.granted_permissions.clone()).flatten()
    }

    fn add_granted_permissions(&self, id: &ExtensionId, permissions: &PermissionSet) -> PermissionResult<()> {
        self.update_extension(id, |r| add_to(&mut r.granted_permissions, permissions))
    }

    fn remove_granted_permissions(&self, id: &ExtensionId, permissions: &PermissionSet) -> PermissionResult<()> {
        self.update_extension(id, |r| remove_from(&mut r.granted_permissions, permissions))
    }

    fn get_runtime_granted_permissions(&self, id: &ExtensionId) -> Option<PermissionSet> {
        self.read_extension(id, |r| r.runtime_granted_permissions.clone()).flatten()
    }

    fn add_runtime_granted_permissions(&self, id: &ExtensionId, permissions: &PermissionSet) -> PermissionResult<()> {
        self.update_extension(id, |r| add_to(&mut r.runtime_granted_permissions, permissions))
    }

    fn remove_runtime_granted_permissions(
        &self,
        id: &ExtensionId,
        permissions: &PermissionSet,
    ) -> PermissionResult<()> {
        self.update_extension(id, |r| remove_from(&mut r.runtime_granted_permissions, permissions))
    }

    fn get_withholding_permissions(&self, id: &ExtensionId) -> bool {
        self.read_extension(id, |r| r.withholding_permissions.unwrap_or(false))
            .unwrap_or(false)
    }

    fn set_withholding_permissions(&self, id: &ExtensionId, withhold: bool) -> PermissionResult<()> {
        self.update_extension(id, |r| r.withholding_permissions = Some(withhold))
    }

    fn get_policy_host_restrictions(&self, id: &ExtensionId) -> Option<PolicyHostRestrictions> {
        self.read_extension(id, |r| r.policy_host_restrictions.clone()).flatten()
    }

    fn set_policy_host_restrictions(
        &self,
        id: &ExtensionId,
        restrictions: Option<PolicyHostRestrictions>,
    ) -> PermissionResult<()> {
        self.update_extension(id, |r| r.policy_host_restrictions = restrictions)
    }

    fn get_default_policy_host_restrictions(&self) -> PolicyHostRestrictions {
        self.state.read().unwrap().default_policy_host_restrictions.clone()
    }

    fn set_default_policy_host_restrictions(&self, restrictions: &PolicyHostRestrictions) -> PermissionResult<()> {
        self.update_profile(|state| {
            state.default_policy_host_restrictions = restrictions.clone();
            true
        })
    }

    fn allow_file_access(&self, id: &ExtensionId) -> bool {
        self.read_extension(id, |r| r.allow_file_access).unwrap_or(false)
    }

    fn set_allow_file_access(&self, id: &ExtensionId, allow: bool) -> PermissionResult<()> {
        self.update_extension(id, |r| r.allow_file_access = allow)
    }

    fn get_sites(&self, list: SiteList) -> BTreeSet<SiteOrigin> {
        let state = self.state.read().unwrap();
        state
            .sites(list)
            .iter()
            .filter_map(|site| match SiteOrigin::parse(site) {
                Ok(origin) => Some(origin),
                Err(e) => {
                    tracing::warn!("[JsonPreferenceStore] Skipping stored {} entry: {}", list, e);
                    None
                }
            })
            .collect()
    }

    fn add_site(&self, list: SiteList, origin: &SiteOrigin) -> PermissionResult<()> {
        self.update_profile(|state| state.sites_mut(list).insert(origin.to_string()))
    }

    fn remove_site(&self, list: SiteList, origin: &SiteOrigin) -> PermissionResult<()> {
        self.update_profile(|state| state.sites_mut(list).remove(&origin.to_string()))
    }
}
