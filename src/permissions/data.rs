//! Live permission state
//!
//! Each extension owns one `PermissionsData`: the active and withheld sets
//! plus the policy restrictions that enforcement call sites consult. The
//! mutation orchestrator and the permission authority are the only writers;
//! readers get cheap `Arc` snapshots.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use url::Url;

use super::set::PermissionSet;
use crate::core::{ContextId, EngineConfig, ExtensionId};
use crate::patterns::{SchemeMask, UrlPattern, UrlPatternSet};
use crate::patterns::scheme::EXTENSION_SCHEME;

/// Result of asking whether an extension may act on a page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageAccess {
    /// Never allowed
    Denied,
    /// Requested but currently withheld from the extension
    Withheld,
    /// Allowed
    Allowed,
}

/// Administrator host restrictions: blocked hosts minus allowed exceptions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoredHostRestrictions", into = "StoredHostRestrictions")]
pub struct PolicyHostRestrictions {
    pub blocked_hosts: UrlPatternSet,
    pub allowed_hosts: UrlPatternSet,
}

impl PolicyHostRestrictions {
    pub fn new(blocked_hosts: UrlPatternSet, allowed_hosts: UrlPatternSet) -> Self {
        Self {
            blocked_hosts,
            allowed_hosts,
        }
    }

    /// Whether `url` is blocked and not re-allowed
    pub fn blocks(&self, url: &Url) -> bool {
        self.blocked_hosts.matches_url(url) && !self.allowed_hosts.matches_url(url)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredHostRestrictions {
    #[serde(default)]
    blocked: Vec<String>,
    #[serde(default)]
    allowed: Vec<String>,
}

fn parse_hosts(hosts: &[String]) -> UrlPatternSet {
    hosts
        .iter()
        .filter_map(|h| match UrlPattern::parse(SchemeMask::ALL, h) {
            Ok(p) => Some(p),
            Err(e) => {
                tracing::warn!("[PermissionsData] Dropping policy host: {}", e);
                None
            }
        })
        .collect()
}

impl From<StoredHostRestrictions> for PolicyHostRestrictions {
    fn from(stored: StoredHostRestrictions) -> Self {
        Self::new(parse_hosts(&stored.blocked), parse_hosts(&stored.allowed))
    }
}

impl From<PolicyHostRestrictions> for StoredHostRestrictions {
    fn from(r: PolicyHostRestrictions) -> Self {
        Self {
            blocked: r.blocked_hosts.to_strings(),
            allowed: r.allowed_hosts.to_strings(),
        }
    }
}

/// Per-profile host restrictions shared by every extension of a context
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextHostRestrictions {
    /// Policy defaults for extensions without their own restrictions
    pub default_policy: PolicyHostRestrictions,
    /// Sites the user blocked for all extensions
    pub user_blocked_hosts: UrlPatternSet,
    /// Sites the user allowed for all extensions
    pub user_allowed_hosts: UrlPatternSet,
}

#[derive(Debug, Clone)]
struct LiveState {
    active: Arc<PermissionSet>,
    withheld: Arc<PermissionSet>,
    policy: PolicyHostRestrictions,
    uses_default_policy_restrictions: bool,
    context_id: Option<ContextId>,
}

/// Snapshot of the live state, as pushed to renderers
#[derive(Debug, Clone, PartialEq)]
pub struct PermissionsSnapshot {
    pub active: Arc<PermissionSet>,
    pub withheld: Arc<PermissionSet>,
    pub policy_blocked_hosts: UrlPatternSet,
    pub policy_allowed_hosts: UrlPatternSet,
    pub uses_default_policy_restrictions: bool,
}

/// Live permission state of one extension
#[derive(Debug)]
pub struct PermissionsData {
    extension_id: ExtensionId,
    executes_everywhere: bool,
    state: RwLock<LiveState>,
}

impl PermissionsData {
    /// Create state with `active` granted and nothing withheld
    pub fn new(extension_id: ExtensionId, executes_everywhere: bool, active: PermissionSet) -> Self {
        Self {
            extension_id,
            executes_everywhere,
            state: RwLock::new(LiveState {
                active: Arc::new(active),
                withheld: Arc::new(PermissionSet::empty()),
                policy: PolicyHostRestrictions::default(),
                uses_default_policy_restrictions: true,
                context_id: None,
            }),
        }
    }

    pub fn extension_id(&self) -> &ExtensionId {
        &self.extension_id
    }

    pub fn active_permissions(&self) -> Arc<PermissionSet> {
        self.state.read().unwrap().active.clone()
    }

    pub fn withheld_permissions(&self) -> Arc<PermissionSet> {
        self.state.read().unwrap().withheld.clone()
    }

    /// Replace both sets at once
    pub(crate) fn set_permissions(&self, active: PermissionSet, withheld: PermissionSet) {
        let mut state = self.state.write().unwrap();
        state.active = Arc::new(active);
        state.withheld = Arc::new(withheld);
    }

    pub fn has_api_permission(&self, name: &str) -> bool {
        self.active_permissions().has_api_permission(name)
    }

    pub fn context_id(&self) -> Option<ContextId> {
        self.state.read().unwrap().context_id
    }

    pub(crate) fn set_context_id(&self, context_id: ContextId) {
        self.state.write().unwrap().context_id = Some(context_id);
    }

    pub fn uses_default_policy_host_restrictions(&self) -> bool {
        self.state.read().unwrap().uses_default_policy_restrictions
    }

    pub(crate) fn set_policy_host_restrictions(&self, policy: PolicyHostRestrictions) {
        let mut state = self.state.write().unwrap();
        state.policy = policy;
        state.uses_default_policy_restrictions = false;
    }

    pub(crate) fn set_uses_default_host_restrictions(&self) {
        let mut state = self.state.write().unwrap();
        state.policy = PolicyHostRestrictions::default();
        state.uses_default_policy_restrictions = true;
    }

    /// Effective policy restrictions, falling back to the context default
    pub fn policy_host_restrictions(&self, context: &ContextHostRestrictions) -> PolicyHostRestrictions {
        let state = self.state.read().unwrap();
        if state.uses_default_policy_restrictions {
            context.default_policy.clone()
        } else {
            state.policy.clone()
        }
    }

    /// Current state; policy fields are the extension's own, empty under the default
    pub fn snapshot(&self) -> PermissionsSnapshot {
        let state = self.state.read().unwrap();
        PermissionsSnapshot {
            active: state.active.clone(),
            withheld: state.withheld.clone(),
            policy_blocked_hosts: state.policy.blocked_hosts.clone(),
            policy_allowed_hosts: state.policy.allowed_hosts.clone(),
            uses_default_policy_restrictions: state.uses_default_policy_restrictions,
        }
    }

    pub fn is_policy_blocked_host(&self, url: &Url, context: &ContextHostRestrictions) -> bool {
        self.policy_host_restrictions(context).blocks(url)
    }

    /// Whether `url` is off limits to this extension regardless of grants
    pub fn is_restricted_url(&self, url: &Url, config: &EngineConfig) -> bool {
        if self.executes_everywhere {
            return false;
        }
        if url.as_str() == "about:blank" {
            return false;
        }

        let scheme = url.scheme();
        if config.restricted_schemes.iter().any(|s| s == scheme) {
            return true;
        }
        if scheme == EXTENSION_SCHEME {
            return url.host_str() != Some(self.extension_id.as_str());
        }
        if SchemeMask::from_scheme(scheme).is_none() {
            return true;
        }

        let host = url.host_str().unwrap_or("");
        config
            .webstore_hosts
            .iter()
            .any(|h| host == h || host.ends_with(&format!(".{}", h)))
    }

    /// Access to the page through explicit host permissions
    pub fn get_page_access(&self, url: &Url, context: &ContextHostRestrictions, config: &EngineConfig) -> PageAccess {
        let state = self.state.read().unwrap().clone();
        self.can_run_on_page(
            url,
            state.active.explicit_hosts(),
            state.withheld.explicit_hosts(),
            context,
            config,
        )
    }

    /// Access to the page through content script patterns
    pub fn get_content_script_access(
        &self,
        url: &Url,
        context: &ContextHostRestrictions,
        config: &EngineConfig,
    ) -> PageAccess {
        let state = self.state.read().unwrap().clone();
        self.can_run_on_page(
            url,
            state.active.scriptable_hosts(),
            state.withheld.scriptable_hosts(),
            context,
            config,
        )
    }

    fn can_run_on_page(
        &self,
        url: &Url,
        permitted: &UrlPatternSet,
        withheld: &UrlPatternSet,
        context: &ContextHostRestrictions,
        config: &EngineConfig,
    ) -> PageAccess {
        if self.is_restricted_url(url, config) {
            return PageAccess::Denied;
        }
        if self.is_policy_blocked_host(url, context) {
            return PageAccess::Denied;
        }
        if !self.executes_everywhere && context.user_blocked_hosts.matches_url(url) {
            return PageAccess::Denied;
        }
        if permitted.matches_url(url) {
            return PageAccess::Allowed;
        }
        if withheld.matches_url(url) {
            return PageAccess::Withheld;
        }
        PageAccess::Denied
    }
}
