//! Network-side enforcement
//!
//! The network layer holds per-extension origin access lists. Updates are
//! asynchronous; the coordinator awaits them before notifying anyone.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use futures::future::join_all;

use crate::core::{ContextId, ExtensionId};
use crate::extension::Extension;
use crate::patterns::UrlPatternSet;
use crate::permissions::ContextHostRestrictions;

/// Origins an extension may reach from its own pages, minus policy blocks
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OriginAccessList {
    pub allow_patterns: UrlPatternSet,
    pub block_patterns: UrlPatternSet,
}

impl OriginAccessList {
    /// Build the list from the extension's current live state
    pub fn for_extension(extension: &Extension, context: &ContextHostRestrictions) -> Self {
        let data = extension.permissions_data();
        let policy = data.policy_host_restrictions(context);
        Self {
            allow_patterns: data.active_permissions().effective_hosts().clone(),
            block_patterns: policy.blocked_hosts.difference(&policy.allowed_hosts),
        }
    }
}

/// Enforcement layer for network requests
#[async_trait]
pub trait NetworkLayer: Send + Sync {
    /// Replace one extension's access list in every listed context
    async fn set_origin_access_list(&self, contexts: &[ContextId], extension_id: &ExtensionId, list: OriginAccessList);

    /// Replace the access lists of many extensions at once
    async fn update_all_extensions(&self, contexts: &[ContextId], lists: Vec<(ExtensionId, OriginAccessList)>) {
        join_all(
            lists
                .into_iter()
                .map(|(id, list)| async move { self.set_origin_access_list(contexts, &id, list).await }),
        )
        .await;
    }
}

/// Network layer that keeps the lists in memory
#[derive(Debug, Default)]
pub struct InMemoryNetworkLayer {
    lists: RwLock<HashMap<(ContextId, ExtensionId), OriginAccessList>>,
}

impl InMemoryNetworkLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn access_list(&self, context: ContextId, extension_id: &ExtensionId) -> Option<OriginAccessList> {
        self.lists
            .read()
            .unwrap()
            .get(&(context, extension_id.clone()))
            .cloned()
    }
}

#[async_trait]
impl NetworkLayer for InMemoryNetworkLayer {
    async fn set_origin_access_list(&self, contexts: &[ContextId], extension_id: &ExtensionId, list: OriginAccessList) {
        let mut lists = self.lists.write().unwrap();
        for context in contexts {
            lists.insert((*context, extension_id.clone()), list.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::EngineConfig;
    use crate::extension::ExtensionBuilder;
    use crate::patterns::SchemeMask;
    use crate::permissions::{PermissionSet, PolicyHostRestrictions};

    #[tokio::test]
    async fn test_in_memory_network_layer() {
        let network = InMemoryNetworkLayer::new();
        let main = ContextId::new();
        let incognito = ContextId::new();
        let id = ExtensionId::new("ext");
        let list = OriginAccessList {
            allow_patterns: UrlPatternSet::parse_all(SchemeMask::HOST_PERMISSION, ["https://a.com/*"]).unwrap(),
            block_patterns: UrlPatternSet::new(),
        };

        network.update_all_extensions(&[main, incognito], vec![(id.clone(), list.clone())]).await;
        assert_eq!(network.access_list(main, &id), Some(list.clone()));
        assert_eq!(network.access_list(incognito, &id), Some(list));
        assert!(network.access_list(ContextId::new(), &id).is_none());
    }

    #[test]
    fn test_access_list_for_extension() {
        let extension = ExtensionBuilder::new("ext")
            .add_permission("<all_urls>")
            .build(&EngineConfig::default())
            .unwrap();
        extension.set_permissions(extension.required_permissions().clone(), PermissionSet::empty());

        let blocked = UrlPatternSet::parse_all(SchemeMask::ALL, ["https://*.corp.com/*"]).unwrap();
        let context = ContextHostRestrictions {
            default_policy: PolicyHostRestrictions::new(blocked.clone(), UrlPatternSet::new()),
            ..Default::default()
        };

        let list = OriginAccessList::for_extension(&extension, &context);
        assert_eq!(list.allow_patterns.len(), 1);
        assert_eq!(list.block_patterns, blocked);
    }
}
