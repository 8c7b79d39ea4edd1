//! Scoped grant helper
//!
//! - `ScriptingPermissionsModifier` - Per-site and all-sites host grants for host-withholding UIs

mod modifier;

pub use modifier::ScriptingPermissionsModifier;
