//! Permission authority
//!
//! One `PermissionAuthority` per profile. It owns the user's global site
//! lists, computes what an extension should be granted from its manifest,
//! its stored records and those lists, and re-derives every extension when
//! the lists change.
//!
//! Obtain one through `AuthorityRegistry::get_or_create`.

use std::sync::{Arc, RwLock, Weak};

use url::Url;

use super::observer::PermissionsObserver;
use super::settings::{ExtensionSiteAccess, UserPermissionsSettings, UserSiteAccess, UserSiteSetting};
use crate::core::{ExtensionId, PermissionError, PermissionResult};
use crate::extension::{CreationFlags, Extension};
use crate::patterns::scheme::FILE_SCHEME;
use crate::patterns::{IntersectionBehavior, SchemeMask, SiteOrigin, UrlPatternSet};
use crate::permissions::{ApiPermission, PermissionSet};
use crate::prefs::SiteList;
use crate::profile::BrowserContext;
use crate::propagation::{PropagationCoordinator, PropagationHandle, RendererMessage, UpdateReason};

/// Grant everything `desired` asks for that the user allowed
///
/// Allowed hosts are the user-permitted sites, the runtime grants and any
/// always-allowed host the extension requested. API and manifest
/// permissions are never withheld.
pub(crate) fn allowed_permissions_after_withholding(
    context: &BrowserContext,
    desired: &PermissionSet,
    runtime_granted: &PermissionSet,
    user_granted: &PermissionSet,
) -> PermissionSet {
    let allowed = user_granted.union(runtime_granted);
    let allowed = add_always_allowed_hosts(context, desired, &allowed);
    allowed
        .with_apis_of(desired)
        .intersection(desired, IntersectionBehavior::Detailed)
}

/// `target` plus every always-allowed host that `requested` asks for
pub(crate) fn add_always_allowed_hosts(
    context: &BrowserContext,
    requested: &PermissionSet,
    target: &PermissionSet,
) -> PermissionSet {
    let mut explicit = target.explicit_hosts().clone();
    for pattern in context.config().always_allowed_pattern_set().iter() {
        if requested.explicit_hosts().contains_pattern(pattern) {
            explicit.add_pattern(pattern.clone());
        }
    }
    target.with_explicit_hosts(explicit)
}

/// Per-profile permission authority
pub struct PermissionAuthority {
    context: Arc<BrowserContext>,
    weak_self: Weak<PermissionAuthority>,
    settings: RwLock<UserPermissionsSettings>,
    observers: RwLock<Vec<Arc<dyn PermissionsObserver>>>,
}

impl PermissionAuthority {
    /// Create the authority for `context`, loading the site lists from prefs
    pub(crate) fn create(context: Arc<BrowserContext>) -> Arc<Self> {
        let prefs = context.prefs();
        let mut settings = UserPermissionsSettings {
            restricted_sites: prefs.get_sites(SiteList::Restricted),
            permitted_sites: Default::default(),
        };
        if context.config().permitted_sites_enabled {
            settings.permitted_sites = prefs.get_sites(SiteList::Permitted);
        }
        context.set_user_host_restrictions(settings.restricted_patterns(), settings.permitted_patterns());

        tracing::debug!(
            "[PermissionAuthority] Loaded {} restricted and {} permitted sites",
            settings.restricted_sites.len(),
            settings.permitted_sites.len()
        );

        Arc::new_cyclic(|weak| Self {
            context,
            weak_self: weak.clone(),
            settings: RwLock::new(settings),
            observers: RwLock::new(Vec::new()),
        })
    }

    pub fn context(&self) -> &Arc<BrowserContext> {
        &self.context
    }

    /// Snapshot of the site lists
    pub fn user_permissions_settings(&self) -> UserPermissionsSettings {
        self.settings.read().unwrap().clone()
    }

    // === Observers ===

    pub fn add_observer(&self, observer: Arc<dyn PermissionsObserver>) {
        self.observers.write().unwrap().push(observer);
    }

    pub fn remove_observer(&self, observer: &Arc<dyn PermissionsObserver>) -> bool {
        let target = Arc::as_ptr(observer) as *const ();
        let mut observers = self.observers.write().unwrap();
        let before = observers.len();
        observers.retain(|o| Arc::as_ptr(o) as *const () != target);
        observers.len() != before
    }

    fn observers(&self) -> Vec<Arc<dyn PermissionsObserver>> {
        self.observers.read().unwrap().clone()
    }

    pub(crate) fn notify_extension_permissions_updated(
        &self,
        extension: &Extension,
        changed: &PermissionSet,
        reason: UpdateReason,
    ) {
        for observer in self.observers() {
            observer.on_extension_permissions_updated(extension, changed, reason);
        }
    }

    /// Tell observers the user dismissed `extension_id`'s request on `origin`
    pub fn notify_extension_dismissed_requests(&self, extension_id: &ExtensionId, origin: &SiteOrigin) {
        for observer in self.observers() {
            observer.on_extension_dismissed_requests(extension_id, origin);
        }
    }

    fn notify_user_permissions_settings_changed(&self) {
        let settings = self.user_permissions_settings();
        for observer in self.observers() {
            observer.on_user_permissions_settings_changed(&settings);
        }
    }

    // === Global site lists ===

    /// Block all extensions from `origin`
    ///
    /// Returns `None` when the site was already restricted.
    pub fn add_restricted_site(&self, origin: &SiteOrigin) -> PermissionResult<Option<PropagationHandle>> {
        self.add_site(SiteList::Restricted, origin)
    }

    pub fn remove_restricted_site(&self, origin: &SiteOrigin) -> PermissionResult<Option<PropagationHandle>> {
        self.remove_site(SiteList::Restricted, origin)
    }

    /// Allow all extensions that asked for `origin` to run there
    ///
    /// # Panics
    ///
    /// Panics if the permitted-sites list is disabled.
    pub fn add_permitted_site(&self, origin: &SiteOrigin) -> PermissionResult<Option<PropagationHandle>> {
        assert!(
            self.context.config().permitted_sites_enabled,
            "permitted sites are disabled for this profile"
        );
        self.add_site(SiteList::Permitted, origin)
    }

    pub fn remove_permitted_site(&self, origin: &SiteOrigin) -> PermissionResult<Option<PropagationHandle>> {
        self.remove_site(SiteList::Permitted, origin)
    }

    /// Apply a user choice for `origin`
    pub fn update_user_site_setting(
        &self,
        origin: &SiteOrigin,
        setting: UserSiteSetting,
    ) -> PermissionResult<Option<PropagationHandle>> {
        match setting {
            UserSiteSetting::GrantAllExtensions => self.add_permitted_site(origin),
            UserSiteSetting::BlockAllExtensions => self.add_restricted_site(origin),
            UserSiteSetting::CustomizeByExtension => {
                let listed = {
                    let settings = self.settings.read().unwrap();
                    [SiteList::Restricted, SiteList::Permitted]
                        .into_iter()
                        .find(|list| settings.sites(*list).contains(origin))
                };
                match listed {
                    Some(list) => self.remove_site(list, origin),
                    None => Ok(None),
                }
            }
        }
    }

    pub fn get_user_site_setting(&self, origin: &SiteOrigin) -> UserSiteSetting {
        let settings = self.settings.read().unwrap();
        if settings.restricted_sites.contains(origin) {
            UserSiteSetting::BlockAllExtensions
        } else if settings.permitted_sites.contains(origin) {
            UserSiteSetting::GrantAllExtensions
        } else {
            UserSiteSetting::CustomizeByExtension
        }
    }

    /// Put `origin` on `list`, taking it off the other list
    ///
    /// Both prefs writes land before memory changes. If the second write
    /// fails the first is rolled back and the lists are left as they were.
    fn add_site(&self, list: SiteList, origin: &SiteOrigin) -> PermissionResult<Option<PropagationHandle>> {
        let other = match list {
            SiteList::Restricted => SiteList::Permitted,
            SiteList::Permitted => SiteList::Restricted,
        };
        {
            let mut settings = self.settings.write().unwrap();
            if settings.sites(list).contains(origin) {
                return Ok(None);
            }
            PropagationCoordinator::ensure_runtime()?;

            let prefs = self.context.prefs();
            self.persist(prefs.add_site(list, origin))?;
            if settings.sites(other).contains(origin) {
                if let Err(e) = self.persist(prefs.remove_site(other, origin)) {
                    if let Err(rollback) = prefs.remove_site(list, origin) {
                        tracing::error!(
                            "[PermissionAuthority] Failed to roll back {} on {}: {}",
                            origin,
                            list,
                            rollback
                        );
                    }
                    return Err(e);
                }
                settings.sites_mut(other).remove(origin);
            }
            settings.sites_mut(list).insert(origin.clone());
        }
        tracing::info!("[PermissionAuthority] Added {} to {}", origin, list);
        self.on_user_permissions_settings_changed().map(Some)
    }

    fn remove_site(&self, list: SiteList, origin: &SiteOrigin) -> PermissionResult<Option<PropagationHandle>> {
        {
            let mut settings = self.settings.write().unwrap();
            if !settings.sites(list).contains(origin) {
                return Ok(None);
            }
            PropagationCoordinator::ensure_runtime()?;
            self.persist(self.context.prefs().remove_site(list, origin))?;
            settings.sites_mut(list).remove(origin);
        }
        tracing::info!("[PermissionAuthority] Removed {} from {}", origin, list);
        self.on_user_permissions_settings_changed().map(Some)
    }

    fn persist(&self, result: PermissionResult<()>) -> PermissionResult<()> {
        if let Err(e) = &result {
            tracing::error!("[PermissionAuthority] Failed to persist site lists: {}", e);
        }
        result
    }

    fn is_user_restricted(&self, url: &Url) -> bool {
        match SiteOrigin::from_url(url) {
            Ok(origin) => self.settings.read().unwrap().restricted_sites.contains(&origin),
            Err(_) => false,
        }
    }

    /// Re-derive every installed extension and propagate to enabled ones
    fn on_user_permissions_settings_changed(&self) -> PermissionResult<PropagationHandle> {
        let settings = self.user_permissions_settings();
        let blocked = settings.restricted_patterns();
        let allowed = settings.permitted_patterns();

        for extension in self.context.extensions().installed_extensions() {
            self.update_permissions_with_user_settings(&extension, &allowed);
        }

        self.context.set_user_host_restrictions(blocked.clone(), allowed.clone());

        let enabled = self.context.extensions().enabled_extensions();
        let contexts = self.context.related_context_ids();
        let renderers = self.context.renderers();
        renderers.broadcast(
            &contexts,
            &RendererMessage::UpdateUserHostRestrictions {
                blocked_hosts: blocked,
                allowed_hosts: allowed,
            },
        );
        for extension in &enabled {
            renderers.broadcast(
                &contexts,
                &RendererMessage::UpdatePermissions {
                    extension_id: extension.id().clone(),
                    permissions: extension.permissions_data().snapshot(),
                },
            );
        }

        tracing::info!(
            "[PermissionAuthority] Site lists changed, propagating to {} enabled extensions",
            enabled.len()
        );

        let weak = self.weak_self.clone();
        PropagationCoordinator::update_all_extensions(
            &self.context,
            &enabled,
            Box::new(move || {
                if let Some(authority) = weak.upgrade() {
                    authority.notify_user_permissions_settings_changed();
                }
            }),
            None,
        )
    }

    /// Recompute one extension's live state from the site lists
    ///
    /// Only extensions that currently withhold host permissions are touched.
    pub fn update_permissions_with_user_settings(&self, extension: &Extension, user_permitted: &UrlPatternSet) {
        if !self.can_affect_extension(extension) || !self.has_withheld_host_permissions(extension) {
            return;
        }

        let user_granted = PermissionSet::from_sites(user_permitted.clone());
        let runtime = self.get_runtime_permissions_from_prefs(extension).unwrap_or_default();
        let bounded = self.get_bounded_extension_desired_permissions(extension);
        let new_active = allowed_permissions_after_withholding(&self.context, &bounded, &runtime, &user_granted);
        let new_withheld = extension.required_permissions().difference(&new_active);

        tracing::debug!(
            "[PermissionAuthority] {} now has {} active and {} withheld hosts",
            extension.id(),
            new_active.effective_hosts().len(),
            new_withheld.effective_hosts().len()
        );
        extension.set_permissions(new_active, new_withheld);
    }

    // === Grant computation ===

    /// Desired permissions limited to what the manifest still requests
    ///
    /// `required` is always the left operand of the final union so its scheme
    /// metadata wins over stored copies of the same pattern.
    pub fn get_bounded_extension_desired_permissions(&self, extension: &Extension) -> PermissionSet {
        let required = extension.required_permissions();
        let Some(desired) = self.context.prefs().get_desired_active_permissions(extension.id()) else {
            return required.clone();
        };

        let requested = extension.requested_permissions();
        let bounded = desired.intersection(&requested, IntersectionBehavior::PatternsContainedByBoth);
        required.union(&bounded)
    }

    /// What to actually grant from `desired`, honoring host withholding
    pub fn get_effective_permissions_to_grant(&self, extension: &Extension, desired: &PermissionSet) -> PermissionSet {
        if !extension.can_withhold_permissions() {
            debug_assert!(
                !extension.creation_flags().contains(CreationFlags::WITHHOLD_PERMISSIONS),
                "withhold flag set on an extension that cannot be withheld from"
            );
            return desired.clone();
        }
        if desired.effective_hosts().is_empty() {
            return desired.clone();
        }

        let should_withhold = extension.creation_flags().contains(CreationFlags::WITHHOLD_PERMISSIONS)
            || self.has_withheld_host_permissions(extension);
        if !should_withhold {
            return desired.clone();
        }

        let runtime = self.get_runtime_permissions_from_prefs(extension).unwrap_or_default();
        let user_granted = if self.context.config().user_permitted_sites_affect_grants() {
            PermissionSet::from_sites(self.user_permissions_settings().permitted_patterns())
        } else {
            PermissionSet::empty()
        };
        allowed_permissions_after_withholding(&self.context, desired, &runtime, &user_granted)
    }

    /// Runtime grants from prefs, with `<all_urls>` losing the chrome scheme
    /// unless the extension may access chrome URLs
    pub fn get_runtime_permissions_from_prefs(&self, extension: &Extension) -> Option<PermissionSet> {
        let permissions = self.context.prefs().get_runtime_granted_permissions(extension.id())?;
        if self.context.config().can_access_chrome_urls(extension.id()) {
            return Some(permissions);
        }

        let adjusted: UrlPatternSet = permissions
            .explicit_hosts()
            .iter()
            .filter_map(|pattern| {
                if pattern.match_all_urls() && pattern.valid_schemes().contains(SchemeMask::CHROME_UI) {
                    pattern.with_valid_schemes(pattern.valid_schemes().without(SchemeMask::CHROME_UI))
                } else {
                    Some(pattern.clone())
                }
            })
            .collect();
        Some(permissions.with_explicit_hosts(adjusted))
    }

    /// Granted permissions that could be taken away
    ///
    /// `None` when the extension can never have permissions withheld.
    pub fn get_revokable_permissions(&self, extension: &Extension) -> Option<PermissionSet> {
        if !extension.can_withhold_permissions() {
            return None;
        }

        let active = extension.permissions_data().active_permissions();
        let current = match self.get_runtime_permissions_from_prefs(extension) {
            Some(runtime) => runtime.union(&active),
            None => active.as_ref().clone(),
        };

        let apis_only = PermissionSet::new(
            current.apis().clone(),
            current.manifest_permissions().clone(),
            UrlPatternSet::new(),
            UrlPatternSet::new(),
        );
        let unrevokable = add_always_allowed_hosts(&self.context, &extension.requested_permissions(), &apis_only);
        Some(current.difference(&unrevokable))
    }

    /// Granted permissions as the user sees them
    pub fn get_extension_granted_permissions(&self, extension: &Extension) -> PermissionSet {
        if !self.can_affect_extension(extension) {
            return extension.permissions_data().active_permissions().as_ref().clone();
        }
        let prefs = self.context.prefs();
        let stored = if self.has_withheld_host_permissions(extension) {
            prefs.get_runtime_granted_permissions(extension.id())
        } else {
            prefs.get_granted_permissions(extension.id())
        };
        stored.unwrap_or_default()
    }

    // === Queries ===

    /// Whether host withholding applies to the extension at all
    pub fn can_affect_extension(&self, extension: &Extension) -> bool {
        extension.can_withhold_permissions() && self.extension_requests_host_permissions_or_active_tab(extension)
    }

    pub fn extension_requests_host_permissions_or_active_tab(&self, extension: &Extension) -> bool {
        let required = extension.required_permissions();
        let optional = extension.optional_permissions();
        !required.effective_hosts().is_empty()
            || !optional.effective_hosts().is_empty()
            || required.has_api_permission(ApiPermission::ACTIVE_TAB)
            || optional.has_api_permission(ApiPermission::ACTIVE_TAB)
    }

    /// Whether the user turned on host withholding for the extension
    pub fn has_withheld_host_permissions(&self, extension: &Extension) -> bool {
        self.context.prefs().get_withholding_permissions(extension.id())
    }

    /// Whether the user granted the extension `url`'s origin at runtime
    pub fn has_granted_host_permission(&self, extension: &Extension, url: &Url) -> bool {
        debug_assert!(self.can_affect_extension(extension));
        let Ok(origin) = SiteOrigin::from_url(url) else {
            return false;
        };
        self.get_runtime_permissions_from_prefs(extension)
            .map(|p| p.effective_hosts().matches_security_origin(&origin))
            .unwrap_or(false)
    }

    /// Whether a runtime grant covers effectively all sites
    pub fn has_broad_granted_host_permissions(&self, extension: &Extension) -> bool {
        self.get_runtime_permissions_from_prefs(extension)
            .map(|p| p.should_warn_all_hosts())
            .unwrap_or(false)
    }

    pub fn has_active_tab_and_can_access(&self, extension: &Extension, url: &Url) -> bool {
        if !extension.permissions_data().has_api_permission(ApiPermission::ACTIVE_TAB) {
            return false;
        }
        if self.is_restricted_for(extension, url) {
            return false;
        }
        if url.scheme() == FILE_SCHEME && !self.context.prefs().allow_file_access(extension.id()) {
            return false;
        }
        true
    }

    /// Engine-restricted URLs and sites on the user's restricted list
    fn is_restricted_for(&self, extension: &Extension, url: &Url) -> bool {
        extension
            .permissions_data()
            .is_restricted_url(url, self.context.config())
            || self.is_user_restricted(url)
    }

    /// Access of the extension to `url`
    pub fn get_site_access(&self, extension: &Extension, url: &Url) -> ExtensionSiteAccess {
        let mut access = ExtensionSiteAccess::default();
        if !self.extension_requests_host_permissions_or_active_tab(extension) {
            return access;
        }

        let data = extension.permissions_data();
        let granted = if self.has_withheld_host_permissions(extension) {
            self.get_runtime_permissions_from_prefs(extension).unwrap_or_default()
        } else {
            data.active_permissions().as_ref().clone()
        };
        let withheld = data.withheld_permissions();

        access.has_all_sites_access = granted.should_warn_all_hosts();
        access.withheld_all_sites_access = !access.has_all_sites_access && withheld.should_warn_all_hosts();

        if self.is_restricted_for(extension, url) {
            return access;
        }
        let Ok(origin) = SiteOrigin::from_url(url) else {
            return access;
        };

        access.has_site_access = granted.effective_hosts().matches_security_origin(&origin);
        access.withheld_site_access =
            !access.has_site_access && withheld.effective_hosts().matches_security_origin(&origin);
        access
    }

    /// Site access as a user-facing choice
    pub fn get_user_site_access(&self, extension: &Extension, url: &Url) -> UserSiteAccess {
        let access = self.get_site_access(extension, url);
        if access.has_all_sites_access {
            UserSiteAccess::OnAllSites
        } else if access.has_site_access {
            UserSiteAccess::OnSite
        } else {
            UserSiteAccess::OnClick
        }
    }

    /// Whether the user may pick `site_access` for the extension on `url`
    pub fn can_user_select_site_access(&self, extension: &Extension, url: &Url, site_access: UserSiteAccess) -> bool {
        if self.is_restricted_for(extension, url) {
            return false;
        }
        if site_access == UserSiteAccess::OnClick && self.has_active_tab_and_can_access(extension, url) {
            return true;
        }
        if !self.can_affect_extension(extension) {
            return false;
        }

        let access = self.get_site_access(extension, url);
        match site_access {
            UserSiteAccess::OnClick | UserSiteAccess::OnSite => access.has_site_access || access.withheld_site_access,
            UserSiteAccess::OnAllSites => access.has_all_sites_access || access.withheld_all_sites_access,
        }
    }

    /// Look up an installed extension by id
    pub fn installed_extension(&self, id: &ExtensionId) -> PermissionResult<Arc<Extension>> {
        self.context
            .extensions()
            .get_installed(id)
            .ok_or_else(|| PermissionError::ExtensionNotFound(id.to_string()))
    }
}

impl Drop for PermissionAuthority {
    fn drop(&mut self) {
        if let Ok(mut settings) = self.settings.write() {
            settings.clear();
        }
        tracing::debug!("[PermissionAuthority] Dropped authority for {}", self.context.id());
    }
}

impl std::fmt::Debug for PermissionAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionAuthority")
            .field("context", &self.context.id())
            .field("settings", &*self.settings.read().unwrap())
            .field("observers", &self.observers.read().unwrap().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicBool, Ordering};

    use crate::core::EngineConfig;
    use crate::extension::{ExtensionBuilder, ManifestLocation};
    use crate::permissions::PolicyHostRestrictions;
    use crate::prefs::{JsonPreferenceStore, PreferenceStore};
    use crate::profile::AuthorityRegistry;
    use crate::propagation::PropagationOutcome;
    use crate::testing::{RecordingObserver, TestProfile};

    fn url(spec: &str) -> Url {
        Url::parse(spec).unwrap()
    }

    fn origin(spec: &str) -> SiteOrigin {
        SiteOrigin::parse(spec).unwrap()
    }

    fn explicit(patterns: &[&str]) -> PermissionSet {
        PermissionSet::from_hosts(
            UrlPatternSet::parse_all(SchemeMask::HOST_PERMISSION, patterns).unwrap(),
            UrlPatternSet::new(),
        )
    }

    fn withheld(id: &str, patterns: &[&str]) -> ExtensionBuilder {
        ExtensionBuilder::new(id)
            .add_permissions(patterns.iter().copied())
            .with_creation_flags(CreationFlags::WITHHOLD_PERMISSIONS)
    }

    #[tokio::test]
    async fn test_bounded_desired_drops_unrequested() {
        let profile = TestProfile::new();
        let extension = ExtensionBuilder::new("ext")
            .add_permission("https://a.com/*")
            .add_optional_permission("https://b.com/*")
            .build(profile.config())
            .unwrap();

        assert_eq!(
            &profile.authority.get_bounded_extension_desired_permissions(&extension),
            extension.required_permissions()
        );

        let stored = explicit(&["https://b.com/*", "https://stale.com/*"]);
        profile.prefs.set_desired_active_permissions(extension.id(), &stored).unwrap();
        let bounded = profile.authority.get_bounded_extension_desired_permissions(&extension);
        assert_eq!(
            bounded.explicit_hosts().to_strings(),
            vec!["https://a.com/*", "https://b.com/*"]
        );
    }

    #[tokio::test]
    async fn test_effective_grant_without_withholding() {
        let profile = TestProfile::new();
        let extension = ExtensionBuilder::new("ext")
            .add_permission("https://a.com/*")
            .build(profile.config())
            .unwrap();
        let desired = extension.required_permissions().clone();
        assert_eq!(profile.authority.get_effective_permissions_to_grant(&extension, &desired), desired);
    }

    #[tokio::test]
    async fn test_effective_grant_never_exceeds_desired() {
        let profile = TestProfile::new();
        let extension = withheld("ext", &["storage", "https://*.example.com/*"])
            .build(profile.config())
            .unwrap();
        profile
            .prefs
            .add_runtime_granted_permissions(extension.id(), &explicit(&["<all_urls>"]))
            .unwrap();

        let desired = extension.required_permissions().clone();
        let granted = profile.authority.get_effective_permissions_to_grant(&extension, &desired);
        assert!(granted.has_api_permission("storage"));
        assert!(desired.contains(&granted));
        assert!(granted.matches_url(&url("https://www.example.com/")));
        assert!(!granted.matches_url(&url("https://other.com/")));
    }

    #[tokio::test]
    async fn test_effective_grant_includes_permitted_sites() {
        let profile = TestProfile::new();
        profile.authority.add_permitted_site(&origin("https://a.com")).unwrap();
        let extension = withheld("ext", &["https://*.com/*"]).build(profile.config()).unwrap();

        let desired = extension.required_permissions().clone();
        let granted = profile.authority.get_effective_permissions_to_grant(&extension, &desired);
        assert!(granted.matches_url(&url("https://a.com/")));
        assert!(!granted.matches_url(&url("https://b.com/")));
    }

    #[tokio::test]
    async fn test_policy_extension_is_never_withheld() {
        let profile = TestProfile::new();
        let extension = ExtensionBuilder::new("ext")
            .add_permission("<all_urls>")
            .with_location(ManifestLocation::ExternalPolicy)
            .build(profile.config())
            .unwrap();

        let desired = extension.required_permissions().clone();
        assert_eq!(profile.authority.get_effective_permissions_to_grant(&extension, &desired), desired);
        assert!(!profile.authority.can_affect_extension(&extension));
        assert!(profile.authority.get_revokable_permissions(&extension).is_none());
    }

    #[tokio::test]
    async fn test_runtime_all_urls_loses_chrome_scheme() {
        let config = EngineConfig::default().with_chrome_urls_allowed("allowlisted");
        let profile = TestProfile::with_config(config);
        let plain = ExtensionBuilder::new("plain").build(profile.config()).unwrap();
        let allowlisted = ExtensionBuilder::new("allowlisted").build(profile.config()).unwrap();
        for extension in [&plain, &allowlisted] {
            profile
                .prefs
                .add_runtime_granted_permissions(extension.id(), &explicit(&["<all_urls>"]))
                .unwrap();
        }

        let favicon = url("chrome://favicon/x");
        let plain_runtime = profile.authority.get_runtime_permissions_from_prefs(&plain).unwrap();
        assert!(!plain_runtime.matches_url(&favicon));
        assert!(plain_runtime.matches_url(&url("https://a.com/")));
        let allowlisted_runtime = profile.authority.get_runtime_permissions_from_prefs(&allowlisted).unwrap();
        assert!(allowlisted_runtime.matches_url(&favicon));
    }

    #[tokio::test]
    async fn test_site_access_withheld_and_granted() {
        let profile = TestProfile::new();
        let extension = profile.install(withheld("ext", &["https://*.com/*"])).unwrap();
        let authority = &profile.authority;

        let access = authority.get_site_access(&extension, &url("https://example.com/"));
        assert!(!access.has_site_access);
        assert!(access.withheld_site_access);
        assert!(!access.has_all_sites_access);
        assert!(access.withheld_all_sites_access);
        assert_eq!(authority.get_user_site_access(&extension, &url("https://example.com/")), UserSiteAccess::OnClick);

        profile
            .prefs
            .add_runtime_granted_permissions(extension.id(), &explicit(&["https://example.com/*"]))
            .unwrap();
        let access = authority.get_site_access(&extension, &url("https://example.com/"));
        assert!(access.has_site_access);
        assert!(!access.withheld_site_access);
        assert_eq!(authority.get_user_site_access(&extension, &url("https://example.com/")), UserSiteAccess::OnSite);
    }

    #[tokio::test]
    async fn test_site_access_on_restricted_url() {
        let profile = TestProfile::new();
        let extension = profile.install(ExtensionBuilder::new("ext").add_permission("<all_urls>")).unwrap();

        let access = profile.authority.get_site_access(&extension, &url("chrome://settings/"));
        assert!(!access.has_site_access);
        assert!(!access.withheld_site_access);
        assert!(access.has_all_sites_access);
        assert_eq!(
            profile.authority.get_user_site_access(&extension, &url("https://a.com/")),
            UserSiteAccess::OnAllSites
        );
        assert!(!profile
            .authority
            .can_user_select_site_access(&extension, &url("chrome://settings/"), UserSiteAccess::OnSite));
    }

    #[tokio::test]
    async fn test_site_access_without_host_requests() {
        let profile = TestProfile::new();
        let extension = profile.install(ExtensionBuilder::new("ext").add_permission("storage")).unwrap();
        assert_eq!(
            profile.authority.get_site_access(&extension, &url("https://a.com/")),
            ExtensionSiteAccess::default()
        );
        assert!(!profile.authority.extension_requests_host_permissions_or_active_tab(&extension));
    }

    #[tokio::test]
    async fn test_can_user_select_site_access() {
        let profile = TestProfile::new();
        let authority = &profile.authority;
        let extension = profile.install(withheld("ext", &["https://a.com/*"])).unwrap();
        let a = url("https://a.com/");
        let b = url("https://b.com/");

        assert!(authority.can_user_select_site_access(&extension, &a, UserSiteAccess::OnClick));
        assert!(authority.can_user_select_site_access(&extension, &a, UserSiteAccess::OnSite));
        assert!(!authority.can_user_select_site_access(&extension, &a, UserSiteAccess::OnAllSites));
        assert!(!authority.can_user_select_site_access(&extension, &b, UserSiteAccess::OnSite));

        let active_tab = profile.install(ExtensionBuilder::new("tab").add_permission("activeTab")).unwrap();
        assert!(authority.has_active_tab_and_can_access(&active_tab, &b));
        assert!(authority.can_user_select_site_access(&active_tab, &b, UserSiteAccess::OnClick));
        assert!(!authority.has_active_tab_and_can_access(&active_tab, &url("file:///tmp/x")));
        profile.prefs.set_allow_file_access(active_tab.id(), true).unwrap();
        assert!(authority.has_active_tab_and_can_access(&active_tab, &url("file:///tmp/x")));
    }

    #[tokio::test]
    async fn test_site_lists_are_exclusive() {
        let profile = TestProfile::new();
        let authority = &profile.authority;
        let site = origin("https://a.com");

        let handle = authority.add_restricted_site(&site).unwrap().unwrap();
        assert_eq!(handle.wait().await, PropagationOutcome::Completed);
        assert_eq!(authority.get_user_site_setting(&site), UserSiteSetting::BlockAllExtensions);
        assert!(authority.add_restricted_site(&site).unwrap().is_none());

        authority.add_permitted_site(&site).unwrap().unwrap().wait().await;
        let settings = authority.user_permissions_settings();
        assert!(settings.permitted_sites.contains(&site));
        assert!(!settings.restricted_sites.contains(&site));
        assert!(profile.prefs.get_sites(SiteList::Restricted).is_empty());
        assert!(profile.prefs.get_sites(SiteList::Permitted).contains(&site));

        authority
            .update_user_site_setting(&site, UserSiteSetting::CustomizeByExtension)
            .unwrap()
            .unwrap()
            .wait()
            .await;
        assert_eq!(authority.get_user_site_setting(&site), UserSiteSetting::CustomizeByExtension);
        assert!(authority.remove_permitted_site(&site).unwrap().is_none());
        assert!(authority.remove_restricted_site(&site).unwrap().is_none());
        assert_eq!(profile.observer.settings_changes().len(), 3);
    }

    #[tokio::test]
    async fn test_permitted_site_recomputes_withheld_extensions() {
        let profile = TestProfile::new();
        let extension = profile.install(withheld("ext", &["https://*.com/*"])).unwrap();
        let disabled = withheld("off", &["https://*.com/*"]).build(profile.config()).unwrap();
        profile.context.extensions().add_disabled(disabled.clone());
        profile.updater().initialize_permissions(&disabled).unwrap();

        profile.network.hold();
        let handle = profile
            .authority
            .update_user_site_setting(&origin("https://a.com"), UserSiteSetting::GrantAllExtensions)
            .unwrap()
            .unwrap();

        let a = url("https://a.com/");
        assert!(extension.permissions_data().active_permissions().matches_url(&a));
        assert!(disabled.permissions_data().active_permissions().matches_url(&a));
        assert_eq!(profile.renderer.permission_updates(extension.id()), 1);
        assert_eq!(profile.renderer.permission_updates(disabled.id()), 0);
        assert_eq!(profile.context.host_restrictions().user_allowed_hosts.len(), 1);
        assert!(profile.observer.settings_changes().is_empty());

        profile.network.release();
        assert_eq!(handle.wait().await, PropagationOutcome::Completed);
        assert_eq!(profile.observer.settings_changes().len(), 1);
        let call = &profile.network.calls()[0];
        assert_eq!(call.lists.len(), 1);
    }

    #[tokio::test]
    async fn test_restricted_site_blocks_access() {
        let profile = TestProfile::new();
        let extension = profile.install(ExtensionBuilder::new("ext").add_permission("<all_urls>")).unwrap();
        let site = url("https://bank.com/");
        assert!(profile.authority.get_site_access(&extension, &site).has_site_access);

        profile
            .authority
            .add_restricted_site(&origin("https://bank.com"))
            .unwrap()
            .unwrap()
            .wait()
            .await;
        let access = profile.authority.get_site_access(&extension, &site);
        assert!(!access.has_site_access);
        assert!(!access.withheld_site_access);
        assert!(access.has_all_sites_access);
    }

    #[tokio::test]
    #[should_panic(expected = "permitted sites are disabled")]
    async fn test_permitted_sites_disabled_panics() {
        let profile = TestProfile::with_config(EngineConfig::default().with_permitted_sites(false));
        let _ = profile.authority.add_permitted_site(&origin("https://a.com"));
    }

    #[tokio::test]
    async fn test_revokable_keeps_apis_and_always_allowed() {
        let profile = TestProfile::new();
        let extension = profile
            .install(ExtensionBuilder::new("ext").add_permissions(["tabs", "https://a.com/*", "chrome://favicon/*"]))
            .unwrap();

        let revokable = profile.authority.get_revokable_permissions(&extension).unwrap();
        assert!(!revokable.has_api_permission("tabs"));
        assert_eq!(revokable.explicit_hosts().to_strings(), vec!["https://a.com/*"]);
    }

    #[tokio::test]
    async fn test_granted_permissions_follow_withholding() {
        let profile = TestProfile::new();
        let extension = profile.install(withheld("ext", &["https://a.com/*"])).unwrap();
        assert!(profile.authority.get_extension_granted_permissions(&extension).is_empty());

        let runtime = explicit(&["https://a.com/*"]);
        profile.prefs.add_runtime_granted_permissions(extension.id(), &runtime).unwrap();
        assert_eq!(profile.authority.get_extension_granted_permissions(&extension), runtime);
        assert!(profile.authority.has_granted_host_permission(&extension, &url("https://a.com/x")));
        assert!(!profile.authority.has_broad_granted_host_permissions(&extension));
    }

    #[tokio::test]
    async fn test_observers_snapshot_and_removal() {
        let profile = TestProfile::new();
        let extra = Arc::new(RecordingObserver::new());
        let extra_dyn: Arc<dyn PermissionsObserver> = extra.clone();
        profile.authority.add_observer(extra_dyn.clone());

        let id = ExtensionId::new("ext");
        let site = origin("https://a.com");
        profile.authority.notify_extension_dismissed_requests(&id, &site);
        assert!(profile.authority.remove_observer(&extra_dyn));
        assert!(!profile.authority.remove_observer(&extra_dyn));
        profile.authority.notify_extension_dismissed_requests(&id, &site);

        assert_eq!(extra.dismissed(), vec![(id.clone(), site.clone())]);
        assert_eq!(profile.observer.dismissed().len(), 2);
    }

    #[tokio::test]
    async fn test_site_lists_loaded_from_prefs() {
        let profile = TestProfile::new();
        profile.authority.add_restricted_site(&origin("https://a.com")).unwrap();

        let reloaded = TestProfile::build(profile.config().clone(), profile.prefs.clone(), Default::default());
        assert_eq!(
            reloaded.authority.get_user_site_setting(&origin("https://a.com")),
            UserSiteSetting::BlockAllExtensions
        );
        assert_eq!(reloaded.context.host_restrictions().user_blocked_hosts.len(), 1);
    }

    #[test]
    fn test_site_change_without_runtime_leaves_lists_untouched() {
        let profile = TestProfile::new();
        let site = origin("https://a.com");

        let result = profile.authority.add_restricted_site(&site);
        assert!(matches!(result, Err(PermissionError::NoRuntime)));
        assert_eq!(profile.authority.get_user_site_setting(&site), UserSiteSetting::CustomizeByExtension);
        assert!(profile.prefs.get_sites(SiteList::Restricted).is_empty());
        assert!(profile.context.host_restrictions().user_blocked_hosts.is_empty());
        assert!(profile.observer.settings_changes().is_empty());
    }

    /// Store whose site removals can be made to fail
    struct FailingSiteRemovals {
        inner: JsonPreferenceStore,
        fail: AtomicBool,
    }

    impl PreferenceStore for FailingSiteRemovals {
        fn get_desired_active_permissions(&self, id: &ExtensionId) -> Option<PermissionSet> {
            self.inner.get_desired_active_permissions(id)
        }
        fn set_desired_active_permissions(&self, id: &ExtensionId, permissions: &PermissionSet) -> PermissionResult<()> {
            self.inner.set_desired_active_permissions(id, permissions)
        }
        fn get_granted_permissions(&self, id: &ExtensionId) -> Option<PermissionSet> {
            self.inner.get_granted_permissions(id)
        }
        fn add_granted_permissions(&self, id: &ExtensionId, permissions: &PermissionSet) -> PermissionResult<()> {
            self.inner.add_granted_permissions(id, permissions)
        }
        fn remove_granted_permissions(&self, id: &ExtensionId, permissions: &PermissionSet) -> PermissionResult<()> {
            self.inner.remove_granted_permissions(id, permissions)
        }
        fn get_runtime_granted_permissions(&self, id: &ExtensionId) -> Option<PermissionSet> {
            self.inner.get_runtime_granted_permissions(id)
        }
        fn add_runtime_granted_permissions(&self, id: &ExtensionId, permissions: &PermissionSet) -> PermissionResult<()> {
            self.inner.add_runtime_granted_permissions(id, permissions)
        }
        fn remove_runtime_granted_permissions(
            &self,
            id: &ExtensionId,
            permissions: &PermissionSet,
        ) -> PermissionResult<()> {
            self.inner.remove_runtime_granted_permissions(id, permissions)
        }
        fn get_withholding_permissions(&self, id: &ExtensionId) -> bool {
            self.inner.get_withholding_permissions(id)
        }
        fn set_withholding_permissions(&self, id: &ExtensionId, withhold: bool) -> PermissionResult<()> {
            self.inner.set_withholding_permissions(id, withhold)
        }
        fn get_policy_host_restrictions(&self, id: &ExtensionId) -> Option<PolicyHostRestrictions> {
            self.inner.get_policy_host_restrictions(id)
        }
        fn set_policy_host_restrictions(
            &self,
            id: &ExtensionId,
            restrictions: Option<PolicyHostRestrictions>,
        ) -> PermissionResult<()> {
            self.inner.set_policy_host_restrictions(id, restrictions)
        }
        fn get_default_policy_host_restrictions(&self) -> PolicyHostRestrictions {
            self.inner.get_default_policy_host_restrictions()
        }
        fn set_default_policy_host_restrictions(&self, restrictions: &PolicyHostRestrictions) -> PermissionResult<()> {
            self.inner.set_default_policy_host_restrictions(restrictions)
        }
        fn allow_file_access(&self, id: &ExtensionId) -> bool {
            self.inner.allow_file_access(id)
        }
        fn set_allow_file_access(&self, id: &ExtensionId, allow: bool) -> PermissionResult<()> {
            self.inner.set_allow_file_access(id, allow)
        }
        fn get_sites(&self, list: SiteList) -> BTreeSet<SiteOrigin> {
            self.inner.get_sites(list)
        }
        fn add_site(&self, list: SiteList, origin: &SiteOrigin) -> PermissionResult<()> {
            self.inner.add_site(list, origin)
        }
        fn remove_site(&self, list: SiteList, origin: &SiteOrigin) -> PermissionResult<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(PermissionError::store("disk full"));
            }
            self.inner.remove_site(list, origin)
        }
    }

    #[tokio::test]
    async fn test_failed_move_between_lists_rolls_back() {
        let store = Arc::new(FailingSiteRemovals {
            inner: JsonPreferenceStore::in_memory(),
            fail: AtomicBool::new(false),
        });
        let prefs: Arc<dyn PreferenceStore> = store.clone();
        let context = BrowserContext::builder().with_prefs(prefs).build();
        let authority = AuthorityRegistry::new().get_or_create(&context);
        let site = origin("https://a.com");
        authority.add_restricted_site(&site).unwrap().unwrap().wait().await;

        store.fail.store(true, Ordering::SeqCst);
        assert!(matches!(authority.add_permitted_site(&site), Err(PermissionError::Store(_))));
        assert_eq!(authority.get_user_site_setting(&site), UserSiteSetting::BlockAllExtensions);
        assert!(store.get_sites(SiteList::Restricted).contains(&site));
        assert!(store.get_sites(SiteList::Permitted).is_empty());

        assert!(matches!(authority.remove_restricted_site(&site), Err(PermissionError::Store(_))));
        assert_eq!(authority.get_user_site_setting(&site), UserSiteSetting::BlockAllExtensions);
    }
}
