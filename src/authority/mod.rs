//! Permission authority
//!
//! - `PermissionAuthority` - Per-profile grant computation and global site lists
//! - `PermissionsObserver` - Listener for site list and permission changes
//! - `UserPermissionsSettings` - The restricted and permitted site lists
//! - `ExtensionSiteAccess`, `UserSiteAccess`, `UserSiteSetting` - Site access reports and choices

mod authority;
mod observer;
mod settings;

pub use authority::PermissionAuthority;
pub(crate) use authority::{add_always_allowed_hosts, allowed_permissions_after_withholding};
pub use observer::PermissionsObserver;
pub use settings::{ExtensionSiteAccess, UserPermissionsSettings, UserSiteAccess, UserSiteSetting};
