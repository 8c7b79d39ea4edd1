//! User site settings and site access reports

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::patterns::{SchemeMask, SiteOrigin, UrlPatternSet};
use crate::prefs::SiteList;

/// The profile's global site lists
///
/// An origin is never in both lists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPermissionsSettings {
    /// Sites no extension may run on
    pub restricted_sites: BTreeSet<SiteOrigin>,
    /// Sites every extension may run on when it asked for them
    pub permitted_sites: BTreeSet<SiteOrigin>,
}

impl UserPermissionsSettings {
    pub fn restricted_patterns(&self) -> UrlPatternSet {
        origins_to_patterns(&self.restricted_sites)
    }

    pub fn permitted_patterns(&self) -> UrlPatternSet {
        origins_to_patterns(&self.permitted_sites)
    }

    pub fn clear(&mut self) {
        self.restricted_sites.clear();
        self.permitted_sites.clear();
    }

    pub(crate) fn sites(&self, list: SiteList) -> &BTreeSet<SiteOrigin> {
        match list {
            SiteList::Restricted => &self.restricted_sites,
            SiteList::Permitted => &self.permitted_sites,
        }
    }

    pub(crate) fn sites_mut(&mut self, list: SiteList) -> &mut BTreeSet<SiteOrigin> {
        match list {
            SiteList::Restricted => &mut self.restricted_sites,
            SiteList::Permitted => &mut self.permitted_sites,
        }
    }
}

/// `scheme://host/*` patterns for a list of origins
pub(crate) fn origins_to_patterns(origins: &BTreeSet<SiteOrigin>) -> UrlPatternSet {
    let mut patterns = UrlPatternSet::new();
    for origin in origins {
        if let Err(e) = patterns.add_origin(SchemeMask::HOST_PERMISSION, origin) {
            tracing::warn!("[PermissionAuthority] Skipping site {}: {}", origin, e);
        }
    }
    patterns
}

/// What the user chose for one site across all extensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserSiteSetting {
    GrantAllExtensions,
    BlockAllExtensions,
    CustomizeByExtension,
}

/// How one extension may run on a site, as shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserSiteAccess {
    /// Only when the user invokes the extension
    OnClick,
    /// Automatically on this site
    OnSite,
    /// Automatically on every site
    OnAllSites,
}

/// Access of one extension to one URL
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExtensionSiteAccess {
    pub has_site_access: bool,
    pub withheld_site_access: bool,
    pub has_all_sites_access: bool,
    pub withheld_all_sites_access: bool,
}
