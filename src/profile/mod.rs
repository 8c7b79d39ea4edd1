//! Profiles
//!
//! - `BrowserContext` - A profile with its collaborators and shutdown token
//! - `AuthorityRegistry` - One `PermissionAuthority` per profile, created on first use

mod context;
mod registry;

pub use context::{BrowserContext, BrowserContextBuilder};
pub use registry::AuthorityRegistry;
