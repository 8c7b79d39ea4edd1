//! Mutation orchestrator
//!
//! - `PermissionsUpdater` - Grant, revoke and policy mutations with propagation
//! - `StoreMask` - Which stored records a mutation writes
//! - `RemoveType` / `InitFlag` - Revoke depth and updater mode

mod updater;

pub use updater::{InitFlag, PermissionsUpdater, RemoveType, StoreMask};
