//! Authority observers

use crate::core::ExtensionId;
use crate::extension::Extension;
use crate::patterns::SiteOrigin;
use crate::permissions::PermissionSet;
use crate::propagation::UpdateReason;

use super::settings::UserPermissionsSettings;

/// Receives permission notifications for a profile
///
/// Observers are snapshotted before each notification, so an observer may
/// add or remove observers (or query permission state) from a callback.
pub trait PermissionsObserver: Send + Sync {
    /// The global site lists changed and every extension was recomputed
    fn on_user_permissions_settings_changed(&self, _settings: &UserPermissionsSettings) {}

    /// An extension's permissions changed by `changed`
    fn on_extension_permissions_updated(&self, _extension: &Extension, _changed: &PermissionSet, _reason: UpdateReason) {}

    /// The user dismissed an extension's access request for `origin`
    fn on_extension_dismissed_requests(&self, _extension_id: &ExtensionId, _origin: &SiteOrigin) {}
}
