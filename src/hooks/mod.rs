//! Hooks Module
//!
//! Delegate hooks that see permission computation at key points.
//!
//! # Overview
//!
//! Hooks let you:
//! - Veto the initial grant for an extension
//! - Narrow the initially granted set before it is applied
//! - Audit every applied change
//!
//! # Example
//!
//! ```ignore
//! use extension_permissions::hooks::{HookEvent, HookRegistry, HookResult};
//!
//! let mut hooks = HookRegistry::new();
//!
//! // Refuse everything for a known-bad id
//! hooks.add_with_pattern(HookEvent::InitializePermissions, "^badbadbadbad", |_ctx| {
//!     HookResult::deny("blocklisted")
//! })?;
//!
//! // Audit
//! hooks.add(HookEvent::PermissionsUpdated, |ctx| {
//!     tracing::info!("{} changed: {:?}", ctx.extension_id(), ctx.changed);
//!     HookResult::none()
//! });
//!
//! let context = BrowserContext::builder().with_hooks(hooks).build();
//! ```
//!
//! # Hook Events
//!
//! | Event | When | Can modify |
//! |-------|------|------------|
//! | `InitializePermissions` | Initial grant computed | `granted` (clamped to `desired`) |
//! | `PermissionsUpdated` | After a change is dispatched | nothing |

mod registry;
mod types;

pub use registry::{Hook, HookRegistry};
pub use types::{HookContext, HookDecision, HookEvent, HookResult};
