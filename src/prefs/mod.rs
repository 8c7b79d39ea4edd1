//! Preference storage
//!
//! - `PreferenceStore` - Read/write contract for per-extension and per-profile records
//! - `JsonPreferenceStore` - File-backed (or in-memory) implementation

mod json_store;
mod store;

pub use json_store::{JsonPreferenceStore, PREFERENCES_FILE};
pub use store::{PreferenceStore, SiteList};
