//! Permission set algebra
//!
//! A `PermissionSet` is an immutable value holding API permissions, manifest
//! permissions, explicit host patterns and content-script host patterns.
//! Every operation returns a new set and works field by field.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use url::Url;

use crate::patterns::{IntersectionBehavior, SchemeMask, SiteOrigin, UrlPattern, UrlPatternSet};

/// A named API capability such as `storage` or `activeTab`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApiPermission(String);

impl ApiPermission {
    pub const ACTIVE_TAB: &'static str = "activeTab";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

/// A manifest key that behaves like a permission
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ManifestPermission(String);

impl ManifestPermission {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

/// An immutable set of permissions
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoredPermissionSet", into = "StoredPermissionSet")]
pub struct PermissionSet {
    apis: BTreeSet<ApiPermission>,
    manifest: BTreeSet<ManifestPermission>,
    explicit_hosts: UrlPatternSet,
    scriptable_hosts: UrlPatternSet,
    effective_hosts: UrlPatternSet,
}

impl PermissionSet {
    pub fn new(
        apis: BTreeSet<ApiPermission>,
        manifest: BTreeSet<ManifestPermission>,
        explicit_hosts: UrlPatternSet,
        scriptable_hosts: UrlPatternSet,
    ) -> Self {
        let effective_hosts = explicit_hosts.union(&scriptable_hosts);
        Self {
            apis,
            manifest,
            explicit_hosts,
            scriptable_hosts,
            effective_hosts,
        }
    }

    /// The empty set
    pub fn empty() -> Self {
        Self::default()
    }

    /// A set with only host patterns
    pub fn from_hosts(explicit_hosts: UrlPatternSet, scriptable_hosts: UrlPatternSet) -> Self {
        Self::new(BTreeSet::new(), BTreeSet::new(), explicit_hosts, scriptable_hosts)
    }

    /// A set with the same patterns as both explicit and scriptable hosts
    pub fn from_sites(sites: UrlPatternSet) -> Self {
        Self::from_hosts(sites.clone(), sites)
    }

    /// A set with only API permissions
    pub fn from_apis<I, S>(apis: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            apis.into_iter().map(|a| ApiPermission::new(a)).collect(),
            BTreeSet::new(),
            UrlPatternSet::new(),
            UrlPatternSet::new(),
        )
    }

    pub fn apis(&self) -> &BTreeSet<ApiPermission> {
        &self.apis
    }

    pub fn manifest_permissions(&self) -> &BTreeSet<ManifestPermission> {
        &self.manifest
    }

    pub fn explicit_hosts(&self) -> &UrlPatternSet {
        &self.explicit_hosts
    }

    pub fn scriptable_hosts(&self) -> &UrlPatternSet {
        &self.scriptable_hosts
    }

    /// Explicit and scriptable hosts combined
    pub fn effective_hosts(&self) -> &UrlPatternSet {
        &self.effective_hosts
    }

    pub fn is_empty(&self) -> bool {
        self.apis.is_empty()
            && self.manifest.is_empty()
            && self.explicit_hosts.is_empty()
            && self.scriptable_hosts.is_empty()
    }

    pub fn has_api_permission(&self, name: &str) -> bool {
        self.apis.iter().any(|a| a.name() == name)
    }

    /// Whether every permission of `other` is present or covered here
    pub fn contains(&self, other: &PermissionSet) -> bool {
        self.apis.is_superset(&other.apis)
            && self.manifest.is_superset(&other.manifest)
            && self.explicit_hosts.contains(&other.explicit_hosts)
            && self.scriptable_hosts.contains(&other.scriptable_hosts)
    }

    /// Field-wise union; host patterns present on both sides keep `self`'s copy
    pub fn union(&self, other: &PermissionSet) -> PermissionSet {
        PermissionSet::new(
            self.apis.union(&other.apis).cloned().collect(),
            self.manifest.union(&other.manifest).cloned().collect(),
            self.explicit_hosts.union(&other.explicit_hosts),
            self.scriptable_hosts.union(&other.scriptable_hosts),
        )
    }

    /// Field-wise intersection with the given host behavior
    pub fn intersection(&self, other: &PermissionSet, behavior: IntersectionBehavior) -> PermissionSet {
        PermissionSet::new(
            self.apis.intersection(&other.apis).cloned().collect(),
            self.manifest.intersection(&other.manifest).cloned().collect(),
            self.explicit_hosts.intersection(&other.explicit_hosts, behavior),
            self.scriptable_hosts.intersection(&other.scriptable_hosts, behavior),
        )
    }

    /// Field-wise difference
    pub fn difference(&self, other: &PermissionSet) -> PermissionSet {
        PermissionSet::new(
            self.apis.difference(&other.apis).cloned().collect(),
            self.manifest.difference(&other.manifest).cloned().collect(),
            self.explicit_hosts.difference(&other.explicit_hosts),
            self.scriptable_hosts.difference(&other.scriptable_hosts),
        )
    }

    /// Only the host patterns of this set
    pub fn hosts_only(&self) -> PermissionSet {
        PermissionSet::from_hosts(self.explicit_hosts.clone(), self.scriptable_hosts.clone())
    }

    /// This set's hosts with `other`'s API and manifest permissions
    pub fn with_apis_of(&self, other: &PermissionSet) -> PermissionSet {
        PermissionSet::new(
            other.apis.clone(),
            other.manifest.clone(),
            self.explicit_hosts.clone(),
            self.scriptable_hosts.clone(),
        )
    }

    /// Same set with new explicit hosts
    pub fn with_explicit_hosts(&self, explicit_hosts: UrlPatternSet) -> PermissionSet {
        PermissionSet::new(
            self.apis.clone(),
            self.manifest.clone(),
            explicit_hosts,
            self.scriptable_hosts.clone(),
        )
    }

    /// Whether any host pattern is broad enough to mean "all sites"
    pub fn should_warn_all_hosts(&self) -> bool {
        self.effective_hosts.should_warn_all_hosts()
    }

    /// Whether some host pattern matches every host
    pub fn has_effective_access_to_all_hosts(&self) -> bool {
        self.effective_hosts.matches_all_hosts()
    }

    pub fn matches_url(&self, url: &Url) -> bool {
        self.effective_hosts.matches_url(url)
    }

    pub fn matches_security_origin(&self, origin: &SiteOrigin) -> bool {
        self.effective_hosts.matches_security_origin(origin)
    }

    /// The delta as delivered to the extension's permission events
    pub fn to_event_value(&self) -> Value {
        let permissions: Vec<&str> = self
            .apis
            .iter()
            .map(|a| a.name())
            .chain(self.manifest.iter().map(|m| m.name()))
            .collect();
        let origins: Vec<&str> = self.effective_hosts.iter().map(|p| p.as_str()).collect();
        json!({ "permissions": permissions, "origins": origins })
    }
}

impl fmt::Debug for PermissionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PermissionSet")
            .field("apis", &self.apis)
            .field("manifest", &self.manifest)
            .field("explicit_hosts", &self.explicit_hosts)
            .field("scriptable_hosts", &self.scriptable_hosts)
            .finish()
    }
}

/// Persisted shape of a permission set
///
/// Host patterns are stored as text; explicit hosts are re-parsed with the
/// host permission schemes and scriptable hosts with the content script
/// schemes. Unparsable entries are dropped with a warning.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredPermissionSet {
    #[serde(default)]
    api: Vec<String>,
    #[serde(default)]
    manifest_permissions: Vec<String>,
    #[serde(default)]
    explicit_host: Vec<String>,
    #[serde(default)]
    scriptable_host: Vec<String>,
}

fn parse_stored_hosts(mask: SchemeMask, hosts: &[String]) -> UrlPatternSet {
    let mut set = UrlPatternSet::new();
    for host in hosts {
        match UrlPattern::parse(mask, host) {
            Ok(pattern) => {
                set.add_pattern(pattern);
            }
            Err(e) => tracing::warn!("[PermissionSet] Dropping stored host pattern: {}", e),
        }
    }
    set
}

impl From<StoredPermissionSet> for PermissionSet {
    fn from(stored: StoredPermissionSet) -> Self {
        PermissionSet::new(
            stored.api.into_iter().map(ApiPermission).collect(),
            stored.manifest_permissions.into_iter().map(ManifestPermission).collect(),
            parse_stored_hosts(SchemeMask::HOST_PERMISSION, &stored.explicit_host),
            parse_stored_hosts(SchemeMask::USER_SCRIPT, &stored.scriptable_host),
        )
    }
}

impl From<PermissionSet> for StoredPermissionSet {
    fn from(set: PermissionSet) -> Self {
        StoredPermissionSet {
            api: set.apis.into_iter().map(|a| a.0).collect(),
            manifest_permissions: set.manifest.into_iter().map(|m| m.0).collect(),
            explicit_host: set.explicit_hosts.to_strings(),
            scriptable_host: set.scriptable_hosts.to_strings(),
        }
    }
}
