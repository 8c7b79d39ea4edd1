//! Per-profile authority registry
//!
//! Replaces a process-wide singleton: each profile's `PermissionAuthority`
//! is created on first use and looked up by context id afterwards.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::context::BrowserContext;
use crate::authority::PermissionAuthority;
use crate::core::ContextId;

/// Owns one `PermissionAuthority` per profile
#[derive(Debug, Default)]
pub struct AuthorityRegistry {
    authorities: RwLock<HashMap<ContextId, Arc<PermissionAuthority>>>,
}

impl AuthorityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The profile's authority, created and loaded from prefs on first use
    pub fn get_or_create(&self, context: &Arc<BrowserContext>) -> Arc<PermissionAuthority> {
        if let Some(authority) = self.authorities.read().unwrap().get(&context.id()) {
            return authority.clone();
        }
        let mut authorities = self.authorities.write().unwrap();
        authorities
            .entry(context.id())
            .or_insert_with(|| {
                tracing::debug!("[AuthorityRegistry] Creating authority for {}", context.id());
                PermissionAuthority::create(context.clone())
            })
            .clone()
    }

    pub fn get(&self, context_id: ContextId) -> Option<Arc<PermissionAuthority>> {
        self.authorities.read().unwrap().get(&context_id).cloned()
    }

    /// Shut the profile down and drop its authority
    pub fn shutdown(&self, context: &BrowserContext) -> Option<Arc<PermissionAuthority>> {
        context.shutdown();
        self.authorities.write().unwrap().remove(&context.id())
    }

    pub fn len(&self) -> usize {
        self.authorities.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
