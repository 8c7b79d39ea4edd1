//! Hook Types
//!
//! Core types for the hooks system:
//! - `HookEvent` - The point at which a hook runs
//! - `HookContext` - Context passed to hooks; `granted` is mutable
//! - `HookResult` - Result returned from hooks
//! - `HookDecision` - Veto or accept the initial grant

use crate::extension::Extension;
use crate::permissions::PermissionSet;
use crate::propagation::UpdateReason;

/// Hook event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookEvent {
    /// Initial grant computed, not yet applied - can veto or adjust
    InitializePermissions,
    /// A change was applied and propagated
    PermissionsUpdated,
}

impl std::fmt::Display for HookEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HookEvent::InitializePermissions => write!(f, "InitializePermissions"),
            HookEvent::PermissionsUpdated => write!(f, "PermissionsUpdated"),
        }
    }
}

/// Context passed to hooks
///
/// For `InitializePermissions`, hooks may replace `granted`. The engine
/// clamps the final value to `desired`, so a hook can narrow a grant but
/// never widen it.
pub struct HookContext<'a> {
    /// The hook event type
    pub event: HookEvent,

    /// The extension being initialized or updated
    pub extension: &'a Extension,

    /// Bounded desired permissions (initialization) or the new active set (update)
    pub desired: &'a PermissionSet,

    /// Initially granted set - can be modified by hook
    pub granted: PermissionSet,

    /// The delta that was applied (updates only)
    pub changed: Option<&'a PermissionSet>,

    /// Why the update happened (updates only)
    pub reason: Option<UpdateReason>,
}

impl<'a> HookContext<'a> {
    /// Create context for an InitializePermissions hook
    pub fn initialize(extension: &'a Extension, desired: &'a PermissionSet, granted: PermissionSet) -> Self {
        Self {
            event: HookEvent::InitializePermissions,
            extension,
            desired,
            granted,
            changed: None,
            reason: None,
        }
    }

    /// Create context for a PermissionsUpdated hook
    pub fn updated(
        extension: &'a Extension,
        active: &'a PermissionSet,
        changed: &'a PermissionSet,
        reason: UpdateReason,
    ) -> Self {
        Self {
            event: HookEvent::PermissionsUpdated,
            extension,
            desired: active,
            granted: active.clone(),
            changed: Some(changed),
            reason: Some(reason),
        }
    }

    pub fn extension_id(&self) -> &str {
        self.extension.id().as_str()
    }
}

/// Decision for InitializePermissions hooks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookDecision {
    /// Use `granted` as left by the hooks
    Accept,
    /// Grant nothing
    Deny,
}

/// Result returned from a hook
#[derive(Debug, Clone, Default)]
pub struct HookResult {
    pub decision: Option<HookDecision>,

    /// Reason for the decision (logged when denied)
    pub reason: Option<String>,
}

impl HookResult {
    pub fn accept() -> Self {
        Self {
            decision: Some(HookDecision::Accept),
            reason: None,
        }
    }

    /// Veto the initial grant with a reason
    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            decision: Some(HookDecision::Deny),
            reason: Some(reason.into()),
        }
    }

    /// No decision - continue with default behavior
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn is_denied(&self) -> bool {
        self.decision == Some(HookDecision::Deny)
    }
}
