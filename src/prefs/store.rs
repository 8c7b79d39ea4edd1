//! Preference store contract
//!
//! The engine only reads and writes through this trait. Missing records are
//! `None` (or `false`), never errors.

use std::collections::BTreeSet;

use crate::core::{ExtensionId, PermissionResult};
use crate::patterns::SiteOrigin;
use crate::permissions::{PermissionSet, PolicyHostRestrictions};

/// Profile-wide site lists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SiteList {
    /// Sites no extension may run on
    Restricted,
    /// Sites every extension may run on when it asked for them
    Permitted,
}

impl std::fmt::Display for SiteList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SiteList::Restricted => write!(f, "restricted_sites"),
            SiteList::Permitted => write!(f, "permitted_sites"),
        }
    }
}

/// Durable permission records
pub trait PreferenceStore: Send + Sync {
    /// What the extension last asked to have active
    fn get_desired_active_permissions(&self, id: &ExtensionId) -> Option<PermissionSet>;
    fn set_desired_active_permissions(&self, id: &ExtensionId, permissions: &PermissionSet) -> PermissionResult<()>;

    /// Everything ever approved for the extension
    fn get_granted_permissions(&self, id: &ExtensionId) -> Option<PermissionSet>;
    fn add_granted_permissions(&self, id: &ExtensionId, permissions: &PermissionSet) -> PermissionResult<()>;
    fn remove_granted_permissions(&self, id: &ExtensionId, permissions: &PermissionSet) -> PermissionResult<()>;

    /// Host permissions approved while withholding
    fn get_runtime_granted_permissions(&self, id: &ExtensionId) -> Option<PermissionSet>;
    fn add_runtime_granted_permissions(&self, id: &ExtensionId, permissions: &PermissionSet) -> PermissionResult<()>;
    fn remove_runtime_granted_permissions(&self, id: &ExtensionId, permissions: &PermissionSet)
        -> PermissionResult<()>;

    /// Whether host permissions are withheld; `false` when never set
    fn get_withholding_permissions(&self, id: &ExtensionId) -> bool;
    fn set_withholding_permissions(&self, id: &ExtensionId, withhold: bool) -> PermissionResult<()>;

    /// Extension-specific policy restrictions; `None` means the profile default applies
    fn get_policy_host_restrictions(&self, id: &ExtensionId) -> Option<PolicyHostRestrictions>;
    fn set_policy_host_restrictions(
        &self,
        id: &ExtensionId,
        restrictions: Option<PolicyHostRestrictions>,
    ) -> PermissionResult<()>;

    fn get_default_policy_host_restrictions(&self) -> PolicyHostRestrictions;
    fn set_default_policy_host_restrictions(&self, restrictions: &PolicyHostRestrictions) -> PermissionResult<()>;

    /// Whether the user allowed the extension on `file://` URLs
    fn allow_file_access(&self, id: &ExtensionId) -> bool;
    fn set_allow_file_access(&self, id: &ExtensionId, allow: bool) -> PermissionResult<()>;

    /// Profile site list; unparsable stored entries are skipped
    fn get_sites(&self, list: SiteList) -> BTreeSet<SiteOrigin>;
    fn add_site(&self, list: SiteList, origin: &SiteOrigin) -> PermissionResult<()>;
    fn remove_site(&self, list: SiteList, origin: &SiteOrigin) -> PermissionResult<()>;
}
