//! Permission mutations
//!
//! Every mutation follows the same sequence:
//!
//! 1. compute the new active set with the permission algebra
//! 2. fail with `NoRuntime` if the delta needs propagation and no runtime is running
//! 3. write the selected preference stores (skipped for transient updaters)
//! 4. replace the extension's live active and withheld sets
//! 5. hand the changed delta to the propagation coordinator
//!
//! Requests outside what an extension declared are caller bugs and panic.

use std::ops::BitOr;
use std::sync::Arc;

use serde_json::json;

use crate::authority::{add_always_allowed_hosts, PermissionAuthority};
use crate::core::PermissionResult;
use crate::extension::{CreationFlags, Extension};
use crate::hooks::{HookContext, HookEvent};
use crate::patterns::IntersectionBehavior;
use crate::permissions::{PermissionSet, PolicyHostRestrictions};
use crate::profile::BrowserContext;
use crate::propagation::{
    ExtensionEvent, PropagationCoordinator, PropagationHandle, PropagationOutcome, RendererMessage, UpdateReason,
    ON_ADDED_EVENT, ON_REMOVED_EVENT,
};

/// Which stored records a mutation writes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct StoreMask(u8);

impl StoreMask {
    pub const NONE: StoreMask = StoreMask(0);
    /// The desired-active record
    pub const ACTIVE: StoreMask = StoreMask(1 << 0);
    /// The granted record
    pub const GRANTED: StoreMask = StoreMask(1 << 1);
    /// The runtime-granted record
    pub const RUNTIME: StoreMask = StoreMask(1 << 2);
    pub const ALL: StoreMask = StoreMask(0b111);

    pub fn contains(&self, other: StoreMask) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for StoreMask {
    type Output = StoreMask;

    fn bitor(self, rhs: StoreMask) -> StoreMask {
        StoreMask(self.0 | rhs.0)
    }
}

/// How far an optional revoke reaches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveType {
    /// Only the desired-active record; a later request is re-approved silently
    Soft,
    /// Also forget the grant
    Hard,
}

/// Updater mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InitFlag {
    #[default]
    None,
    /// Live state only, preferences are never touched
    Transient,
}

/// Applies permission mutations for one profile
#[derive(Debug, Clone)]
pub struct PermissionsUpdater {
    authority: Arc<PermissionAuthority>,
    init_flag: InitFlag,
}

impl PermissionsUpdater {
    pub fn new(authority: Arc<PermissionAuthority>) -> Self {
        Self::with_init_flag(authority, InitFlag::None)
    }

    pub fn with_init_flag(authority: Arc<PermissionAuthority>, init_flag: InitFlag) -> Self {
        Self { authority, init_flag }
    }

    pub fn authority(&self) -> &Arc<PermissionAuthority> {
        &self.authority
    }

    fn context(&self) -> &Arc<BrowserContext> {
        self.authority.context()
    }

    fn is_transient(&self) -> bool {
        self.init_flag == InitFlag::Transient
    }

    /// Compute and apply the extension's initial live permissions
    ///
    /// Runs the `InitializePermissions` hooks on the computed grant. A hook
    /// may narrow the grant or deny it entirely, never widen it past the
    /// desired set.
    pub fn initialize_permissions(&self, extension: &Arc<Extension>) -> PermissionResult<()> {
        let prefs = self.context().prefs();
        let desired = if self.is_transient() {
            extension.permissions_data().active_permissions().as_ref().clone()
        } else {
            self.authority.get_bounded_extension_desired_permissions(extension)
        };

        let mut granted = self.authority.get_effective_permissions_to_grant(extension, &desired);

        let hooks = self.context().hooks();
        if hooks.has_hooks(HookEvent::InitializePermissions) {
            let mut ctx = HookContext::initialize(extension, &desired, granted);
            let result = hooks.run(&mut ctx);
            granted = if result.is_denied() {
                tracing::warn!(
                    "[PermissionsUpdater] Initial grant for {} denied by hook: {}",
                    extension.id(),
                    result.reason.as_deref().unwrap_or("no reason given")
                );
                PermissionSet::empty()
            } else {
                ctx.granted.intersection(&desired, IntersectionBehavior::Detailed)
            };
        }

        if !self.is_transient() {
            prefs.set_desired_active_permissions(extension.id(), &desired)?;
            if extension.creation_flags().contains(CreationFlags::WITHHOLD_PERMISSIONS)
                && extension.can_withhold_permissions()
                && !prefs.get_withholding_permissions(extension.id())
            {
                prefs.set_withholding_permissions(extension.id(), true)?;
            }
            self.load_policy_host_restrictions(extension);
        }
        extension.permissions_data().set_context_id(self.context().id());

        tracing::info!(
            "[PermissionsUpdater] Initialized {}: {} of {} desired hosts granted",
            extension.id(),
            granted.effective_hosts().len(),
            desired.effective_hosts().len()
        );
        self.set_permissions(extension, granted);
        Ok(())
    }

    /// Grant optional permissions the extension asked for
    ///
    /// # Panics
    ///
    /// Panics if `permissions` is not within the extension's optional set.
    pub fn grant_optional_permissions(
        &self,
        extension: &Arc<Extension>,
        permissions: &PermissionSet,
    ) -> PermissionResult<PropagationHandle> {
        assert!(
            extension.optional_permissions().contains(permissions),
            "{} may only grant optional permissions it declared",
            extension.id()
        );
        self.add_permissions_impl(extension, permissions, StoreMask::ALL, permissions)
    }

    /// Grant withheld permissions back at runtime
    pub fn grant_runtime_permissions(
        &self,
        extension: &Arc<Extension>,
        permissions: &PermissionSet,
    ) -> PermissionResult<PropagationHandle> {
        let withheld = extension.permissions_data().withheld_permissions();
        let to_add = withheld.intersection(permissions, IntersectionBehavior::Detailed);
        assert!(
            withheld.contains(&to_add),
            "{} may only be granted permissions that are withheld",
            extension.id()
        );
        self.add_permissions_impl(extension, &to_add, StoreMask::RUNTIME, permissions)
    }

    /// Revoke optional permissions
    ///
    /// # Panics
    ///
    /// Panics if `permissions` is not within the extension's optional set.
    pub fn revoke_optional_permissions(
        &self,
        extension: &Arc<Extension>,
        permissions: &PermissionSet,
        remove_type: RemoveType,
    ) -> PermissionResult<PropagationHandle> {
        assert!(
            extension.optional_permissions().contains(permissions),
            "{} may only revoke optional permissions it declared",
            extension.id()
        );

        let stores = match remove_type {
            RemoveType::Soft => StoreMask::ACTIVE,
            RemoveType::Hard => {
                debug_assert!(
                    {
                        let permitted = self.authority.user_permissions_settings().permitted_patterns();
                        permissions
                            .intersection(&PermissionSet::from_sites(permitted), IntersectionBehavior::Detailed)
                            .effective_hosts()
                            .is_empty()
                    },
                    "user-permitted sites are removed through the site list, not a hard revoke"
                );
                StoreMask::ACTIVE | StoreMask::GRANTED | StoreMask::RUNTIME
            }
        };

        let active = extension.permissions_data().active_permissions();
        let new_active = active.difference(permissions);
        self.remove_permissions_impl(extension, new_active, permissions, stores)
    }

    /// Revoke host permissions granted at runtime
    ///
    /// Always-allowed hosts and user-permitted sites covered by `permissions`
    /// stay active.
    ///
    /// # Panics
    ///
    /// Panics if the part of `permissions` that is active is not revokable.
    pub fn revoke_runtime_permissions(
        &self,
        extension: &Arc<Extension>,
        permissions: &PermissionSet,
    ) -> PermissionResult<PropagationHandle> {
        let active = extension.permissions_data().active_permissions();
        let to_remove = active.intersection(permissions, IntersectionBehavior::PatternsContainedByBoth);
        assert!(active.contains(&to_remove), "{} cannot revoke inactive permissions", extension.id());
        assert!(
            self.get_revokable_permissions(extension).contains(&to_remove),
            "{} cannot revoke unrevokable permissions",
            extension.id()
        );

        let mut keep = add_always_allowed_hosts(self.context(), &to_remove, &PermissionSet::empty());
        if self.context().config().user_permitted_sites_affect_grants() {
            let permitted = self.authority.user_permissions_settings().permitted_patterns();
            keep = keep.union(&PermissionSet::from_sites(permitted));
        }
        let keep = to_remove.intersection(&keep, IntersectionBehavior::Detailed);
        if !keep.is_empty() {
            tracing::debug!(
                "[PermissionsUpdater] Keeping {} always-allowed or permitted hosts for {}",
                keep.effective_hosts().len(),
                extension.id()
            );
        }

        let new_active = active.difference(&to_remove).union(&keep);
        self.remove_permissions_impl(extension, new_active, permissions, StoreMask::RUNTIME)
    }

    /// Permissions that `revoke_runtime_permissions` accepts
    pub fn get_revokable_permissions(&self, extension: &Extension) -> PermissionSet {
        let active = extension.permissions_data().active_permissions();
        let beyond_required = active.difference(extension.required_permissions());
        match self.authority.get_revokable_permissions(extension) {
            Some(revokable) => beyond_required.union(&revokable),
            None => beyond_required,
        }
    }

    /// Record the current active set as granted
    pub fn grant_active_permissions(&self, extension: &Extension) -> PermissionResult<()> {
        assert!(!self.is_transient(), "transient updaters never write granted permissions");
        let active = extension.permissions_data().active_permissions();
        self.context().prefs().add_granted_permissions(extension.id(), &active)
    }

    /// Remove permissions without any declared-set checks
    ///
    /// For policy-driven removals.
    pub fn remove_permissions_unsafe(
        &self,
        extension: &Arc<Extension>,
        to_remove: &PermissionSet,
    ) -> PermissionResult<PropagationHandle> {
        let active = extension.permissions_data().active_permissions();
        let total = active.difference(to_remove);
        let removed = active.difference(&total);
        PropagationCoordinator::check_runtime(self.context(), UpdateReason::Removed, &removed)?;

        if !self.is_transient() {
            self.context().prefs().set_desired_active_permissions(extension.id(), &total)?;
        }
        self.set_permissions(extension, total);
        self.notify_permissions_updated(UpdateReason::Removed, extension, removed)
    }

    // === Policy restrictions ===

    /// Load the extension's policy restrictions from prefs and propagate them
    pub fn apply_policy_host_restrictions(&self, extension: &Arc<Extension>) -> PermissionResult<PropagationHandle> {
        self.check_policy_runtime()?;
        self.load_policy_host_restrictions(extension);
        self.notify_permissions_updated(UpdateReason::Policy, extension, PermissionSet::empty())
    }

    fn load_policy_host_restrictions(&self, extension: &Extension) {
        let data = extension.permissions_data();
        match self.context().prefs().get_policy_host_restrictions(extension.id()) {
            Some(restrictions) => data.set_policy_host_restrictions(restrictions),
            None => data.set_uses_default_host_restrictions(),
        }
    }

    /// Give the extension its own policy restrictions
    pub fn set_policy_host_restrictions(
        &self,
        extension: &Arc<Extension>,
        restrictions: PolicyHostRestrictions,
    ) -> PermissionResult<PropagationHandle> {
        self.check_policy_runtime()?;
        if !self.is_transient() {
            self.context()
                .prefs()
                .set_policy_host_restrictions(extension.id(), Some(restrictions.clone()))?;
        }
        extension.permissions_data().set_policy_host_restrictions(restrictions);
        self.notify_permissions_updated(UpdateReason::Policy, extension, PermissionSet::empty())
    }

    /// Put the extension back on the profile default restrictions
    pub fn set_uses_default_host_restrictions(&self, extension: &Arc<Extension>) -> PermissionResult<PropagationHandle> {
        self.check_policy_runtime()?;
        if !self.is_transient() {
            self.context().prefs().set_policy_host_restrictions(extension.id(), None)?;
        }
        extension.permissions_data().set_uses_default_host_restrictions();
        self.notify_permissions_updated(UpdateReason::Policy, extension, PermissionSet::empty())
    }

    /// Replace the profile default restrictions
    ///
    /// Renderers receive the new default once the network layer has every
    /// enabled extension's access list.
    pub fn set_default_policy_host_restrictions(
        &self,
        restrictions: PolicyHostRestrictions,
    ) -> PermissionResult<PropagationHandle> {
        assert!(!self.is_transient(), "transient updaters never change profile defaults");
        PropagationCoordinator::ensure_runtime()?;
        let context = self.context().clone();
        context.prefs().set_default_policy_host_restrictions(&restrictions)?;
        context.set_default_policy_host_restrictions(restrictions.clone());

        let enabled = context.extensions().enabled_extensions();
        tracing::info!(
            "[PermissionsUpdater] Default policy restrictions changed for {} enabled extensions",
            enabled.len()
        );

        let target = context.clone();
        PropagationCoordinator::update_all_extensions(
            &context,
            &enabled,
            Box::new(move || {
                target.renderers().broadcast(
                    &target.related_context_ids(),
                    &RendererMessage::UpdateDefaultPolicyHostRestrictions {
                        blocked_hosts: restrictions.blocked_hosts,
                        allowed_hosts: restrictions.allowed_hosts,
                    },
                );
            }),
            None,
        )
    }

    // === Internals ===

    fn check_policy_runtime(&self) -> PermissionResult<()> {
        PropagationCoordinator::check_runtime(self.context(), UpdateReason::Policy, &PermissionSet::empty())
    }

    /// Replace the live sets; withheld is whatever required host is not active
    fn set_permissions(&self, extension: &Extension, active: PermissionSet) {
        let required = extension.required_permissions();
        let withheld = PermissionSet::from_hosts(required.explicit_hosts().clone(), required.scriptable_hosts().clone())
            .difference(&active);
        extension.set_permissions(active, withheld);
    }

    fn add_permissions_impl(
        &self,
        extension: &Arc<Extension>,
        active_to_add: &PermissionSet,
        stores: StoreMask,
        to_store: &PermissionSet,
    ) -> PermissionResult<PropagationHandle> {
        PropagationCoordinator::check_runtime(self.context(), UpdateReason::Added, active_to_add)?;
        if !self.is_transient() {
            let prefs = self.context().prefs();
            let id = extension.id();
            if stores.contains(StoreMask::ACTIVE) {
                let desired = prefs.get_desired_active_permissions(id).unwrap_or_default();
                prefs.set_desired_active_permissions(id, &desired.union(to_store))?;
            }
            if stores.contains(StoreMask::GRANTED) {
                prefs.add_granted_permissions(id, to_store)?;
            }
            if stores.contains(StoreMask::RUNTIME) {
                prefs.add_runtime_granted_permissions(id, to_store)?;
            }
        }

        let active = extension.permissions_data().active_permissions();
        self.set_permissions(extension, active_to_add.union(&active));
        self.notify_permissions_updated(UpdateReason::Added, extension, active_to_add.clone())
    }

    fn remove_permissions_impl(
        &self,
        extension: &Arc<Extension>,
        new_active: PermissionSet,
        to_unstore: &PermissionSet,
        stores: StoreMask,
    ) -> PermissionResult<PropagationHandle> {
        let active = extension.permissions_data().active_permissions();
        let removed = active.difference(&new_active);
        PropagationCoordinator::check_runtime(self.context(), UpdateReason::Removed, &removed)?;

        if !self.is_transient() {
            let prefs = self.context().prefs();
            let id = extension.id();
            if stores.contains(StoreMask::ACTIVE) {
                if let Some(desired) = prefs.get_desired_active_permissions(id) {
                    prefs.set_desired_active_permissions(id, &desired.difference(to_unstore))?;
                }
            }
            if stores.contains(StoreMask::GRANTED) {
                prefs.remove_granted_permissions(id, to_unstore)?;
            }
            if stores.contains(StoreMask::RUNTIME) {
                prefs.remove_runtime_granted_permissions(id, to_unstore)?;
            }
        }

        self.set_permissions(extension, new_active);
        self.notify_permissions_updated(UpdateReason::Removed, extension, removed)
    }

    /// Push a delta to the network layer, renderers, observers and the extension
    fn notify_permissions_updated(
        &self,
        reason: UpdateReason,
        extension: &Arc<Extension>,
        changed: PermissionSet,
    ) -> PermissionResult<PropagationHandle> {
        let context = self.context();
        if context.is_shutting_down() {
            return Ok(PropagationHandle::Ready(PropagationOutcome::Aborted));
        }
        if changed.is_empty() && reason != UpdateReason::Policy {
            return Ok(PropagationHandle::Ready(PropagationOutcome::Completed));
        }

        tracing::debug!(
            "[PermissionsUpdater] {} permissions {} ({} hosts)",
            extension.id(),
            reason,
            changed.effective_hosts().len()
        );

        let authority = Arc::downgrade(&self.authority);
        let target = context.clone();
        let dispatched_extension = extension.clone();
        let delta = changed.clone();
        let dispatch = Box::new(move || {
            let extension = dispatched_extension;
            if let Some(authority) = authority.upgrade() {
                authority.notify_extension_permissions_updated(&extension, &delta, reason);
            }

            target.renderers().broadcast(
                &target.related_context_ids(),
                &RendererMessage::UpdatePermissions {
                    extension_id: extension.id().clone(),
                    permissions: extension.permissions_data().snapshot(),
                },
            );

            let event_name = match reason {
                UpdateReason::Added => Some(ON_ADDED_EVENT),
                UpdateReason::Removed => Some(ON_REMOVED_EVENT),
                UpdateReason::Policy => None,
            };
            if let Some(name) = event_name {
                target.events().dispatch_event_to_extension(
                    extension.id(),
                    ExtensionEvent {
                        name: name.to_string(),
                        args: json!([delta.to_event_value()]),
                    },
                );
            }

            let hooks = target.hooks();
            if hooks.has_hooks(HookEvent::PermissionsUpdated) {
                let active = extension.permissions_data().active_permissions();
                let mut ctx = HookContext::updated(&extension, &active, &delta, reason);
                hooks.run(&mut ctx);
            }
        });

        PropagationCoordinator::update_extension(context, extension, &changed, reason, dispatch, None)
    }
}
