//! Scoped host grants
//!
//! `ScriptingPermissionsModifier` wraps the updater for the host-withholding
//! workflows of one extension: toggling withholding, granting or removing a
//! single site, and clearing runtime grants.

use std::sync::Arc;

use url::Url;

use crate::authority::PermissionAuthority;
use crate::core::PermissionResult;
use crate::extension::Extension;
use crate::patterns::{SchemeMask, SiteOrigin, UrlPatternSet};
use crate::permissions::PermissionSet;
use crate::propagation::{PropagationCoordinator, PropagationHandle, UpdateReason};
use crate::updater::PermissionsUpdater;

/// Host-withholding operations for one extension
#[derive(Debug, Clone)]
pub struct ScriptingPermissionsModifier {
    extension: Arc<Extension>,
    updater: PermissionsUpdater,
}

impl ScriptingPermissionsModifier {
    pub fn new(authority: Arc<PermissionAuthority>, extension: Arc<Extension>) -> Self {
        Self {
            extension,
            updater: PermissionsUpdater::new(authority),
        }
    }

    fn authority(&self) -> &PermissionAuthority {
        self.updater.authority()
    }

    pub fn extension(&self) -> &Arc<Extension> {
        &self.extension
    }

    pub fn can_affect_extension(&self) -> bool {
        self.authority().can_affect_extension(&self.extension)
    }

    pub fn has_withheld_host_permissions(&self) -> bool {
        self.authority().has_withheld_host_permissions(&self.extension)
    }

    /// Turn host withholding on or off
    ///
    /// The flag is persisted before any permission moves, so queries made
    /// while the change propagates see the new value. Returns `None` when the
    /// extension is already in the requested state.
    ///
    /// # Panics
    ///
    /// Panics if withholding cannot apply to the extension.
    pub fn set_withhold_host_permissions(&self, withhold: bool) -> PermissionResult<Option<PropagationHandle>> {
        assert!(
            self.can_affect_extension(),
            "host withholding does not apply to {}",
            self.extension.id()
        );
        if self.has_withheld_host_permissions() == withhold {
            return Ok(None);
        }

        let (reason, delta) = if withhold {
            let revokable = self
                .authority()
                .get_revokable_permissions(&self.extension)
                .unwrap_or_default();
            (UpdateReason::Removed, revokable)
        } else {
            let withheld = self.extension.permissions_data().withheld_permissions();
            (UpdateReason::Added, withheld.as_ref().clone())
        };
        let context = self.authority().context();
        PropagationCoordinator::check_runtime(context, reason, &delta)?;

        context.prefs().set_withholding_permissions(self.extension.id(), withhold)?;
        tracing::info!(
            "[ScriptingPermissionsModifier] {} host permissions for {}",
            if withhold { "Withholding" } else { "Granting" },
            self.extension.id()
        );

        let handle = if withhold {
            self.updater.revoke_runtime_permissions(&self.extension, &delta)?
        } else {
            self.updater.grant_runtime_permissions(&self.extension, &delta)?
        };
        Ok(Some(handle))
    }

    /// Grant the withheld hosts that match `url`, scoped to its origin
    pub fn grant_host_permission(&self, url: &Url) -> PermissionResult<PropagationHandle> {
        debug_assert!(self.can_affect_extension());
        let origin = SiteOrigin::from_url(url)?;
        let withheld = self.extension.permissions_data().withheld_permissions();

        let mut explicit = UrlPatternSet::new();
        if withheld.explicit_hosts().matches_url(url) {
            explicit.add_origin(SchemeMask::USER_SCRIPT, &origin)?;
        }
        let mut scriptable = UrlPatternSet::new();
        if withheld.scriptable_hosts().matches_url(url) {
            scriptable.add_origin(SchemeMask::USER_SCRIPT, &origin)?;
        }

        self.updater
            .grant_runtime_permissions(&self.extension, &PermissionSet::from_hosts(explicit, scriptable))
    }

    pub fn has_granted_host_permission(&self, url: &Url) -> bool {
        self.authority().has_granted_host_permission(&self.extension, url)
    }

    /// Revoke every runtime grant that covers `url`'s origin
    ///
    /// # Panics
    ///
    /// Panics if nothing was granted for `url`.
    pub fn remove_granted_host_permission(&self, url: &Url) -> PermissionResult<PropagationHandle> {
        assert!(
            self.has_granted_host_permission(url),
            "{} was never granted {}",
            self.extension.id(),
            url
        );
        let origin = SiteOrigin::from_url(url)?;
        let runtime = self
            .authority()
            .get_runtime_permissions_from_prefs(&self.extension)
            .unwrap_or_default();

        let covering = |hosts: &UrlPatternSet| -> UrlPatternSet {
            hosts
                .iter()
                .filter(|p| p.matches_security_origin(&origin))
                .cloned()
                .collect()
        };
        let to_remove = PermissionSet::from_hosts(covering(runtime.explicit_hosts()), covering(runtime.scriptable_hosts()));
        self.updater.revoke_runtime_permissions(&self.extension, &to_remove)
    }

    /// Revoke every revokable host grant
    pub fn remove_all_granted_host_permissions(&self) -> PermissionResult<PropagationHandle> {
        debug_assert!(self.can_affect_extension());
        let revokable = self
            .authority()
            .get_revokable_permissions(&self.extension)
            .unwrap_or_default();
        self.updater.revoke_runtime_permissions(&self.extension, &revokable)
    }

    pub fn has_broad_granted_host_permissions(&self) -> bool {
        self.authority().has_broad_granted_host_permissions(&self.extension)
    }

    /// Revoke runtime grants that amount to all sites, keeping single-site ones
    pub fn remove_broad_granted_host_permissions(&self) -> PermissionResult<PropagationHandle> {
        let runtime = self
            .authority()
            .get_runtime_permissions_from_prefs(&self.extension)
            .unwrap_or_default();

        let broad = |hosts: &UrlPatternSet| -> UrlPatternSet {
            hosts.iter().filter(|p| p.matches_effective_tld()).cloned().collect()
        };
        let to_remove = PermissionSet::from_hosts(broad(runtime.explicit_hosts()), broad(runtime.scriptable_hosts()));
        tracing::debug!(
            "[ScriptingPermissionsModifier] Removing {} broad grants from {}",
            to_remove.effective_hosts().len(),
            self.extension.id()
        );
        self.updater.revoke_runtime_permissions(&self.extension, &to_remove)
    }
}
