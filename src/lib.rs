pub mod core;
pub mod patterns;
pub mod permissions;
pub mod extension;
pub mod prefs;
pub mod profile;

// Grant computation and global site lists
pub mod authority;

// Mutations and their propagation
pub mod updater;
pub mod modifier;
pub mod propagation;

// Hooks for adjusting initial grants
pub mod hooks;

pub mod logging;

// Recording test doubles
#[cfg(any(test, feature = "testing"))]
pub mod testing;
