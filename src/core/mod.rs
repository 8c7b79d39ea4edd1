//! Core types for the permission engine
//!
//! This module provides the fundamental types used throughout the engine:
//! - `ExtensionId` / `ContextId` - Identifiers
//! - `EngineConfig` - Feature switches and host lists
//! - `PermissionError` - Error types

pub mod config;
pub mod error;
pub mod ids;

pub use config::EngineConfig;
pub use error::{PermissionError, PermissionResult};
pub use ids::{ContextId, ExtensionId};
