//! Installed extensions
//!
//! - `Extension` - Install data plus live permission state
//! - `ExtensionBuilder` / `ExtensionManifest` - Construction from permission strings or JSON
//! - `ExtensionRegistry` - Installed and enabled extensions of a profile

mod extension;
mod manifest;
mod registry;

pub use extension::{CreationFlags, Extension, ExtensionBuilder, ManifestLocation};
pub use manifest::{ContentScript, ExtensionManifest};
pub use registry::ExtensionRegistry;
