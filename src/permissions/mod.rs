//! Permission sets and live permission state
//!
//! This module provides:
//! - `PermissionSet` - Immutable capability set with union/intersection/difference
//! - `PermissionsData` - The active and withheld sets one extension currently holds
//! - `PolicyHostRestrictions` / `ContextHostRestrictions` - Host lists that override grants
//!
//! ## Example
//!
//! ```rust,ignore
//! use extension_permissions::permissions::PermissionSet;
//! use extension_permissions::patterns::IntersectionBehavior;
//!
//! let granted = requested.intersection(&approved, IntersectionBehavior::Detailed);
//! assert!(requested.contains(&granted));
//! ```

mod data;
mod set;

pub use data::{
    ContextHostRestrictions, PageAccess, PermissionsData, PermissionsSnapshot, PolicyHostRestrictions,
};
pub use set::{ApiPermission, ManifestPermission, PermissionSet};
