//! Renderer fan-out
//!
//! Every renderer process belonging to a profile (or one of its related
//! incognito contexts) mirrors permission state for fast local checks.

use std::sync::{Arc, RwLock};

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::core::{ContextId, ExtensionId};
use crate::patterns::UrlPatternSet;
use crate::permissions::PermissionsSnapshot;

/// Message pushed to a renderer
#[derive(Debug, Clone, PartialEq)]
pub enum RendererMessage {
    /// New live state of one extension
    UpdatePermissions {
        extension_id: ExtensionId,
        permissions: PermissionsSnapshot,
    },
    /// New user site lists
    UpdateUserHostRestrictions {
        blocked_hosts: UrlPatternSet,
        allowed_hosts: UrlPatternSet,
    },
    /// New profile default policy restrictions
    UpdateDefaultPolicyHostRestrictions {
        blocked_hosts: UrlPatternSet,
        allowed_hosts: UrlPatternSet,
    },
}

/// A connected renderer process
pub trait RendererHost: Send + Sync {
    fn id(&self) -> Uuid;

    /// The context the renderer belongs to
    fn context_id(&self) -> ContextId;

    /// Dead renderers are pruned during fan-out
    fn is_alive(&self) -> bool;

    fn send(&self, message: RendererMessage);
}

/// Renderer backed by an unbounded tokio channel
#[derive(Debug)]
pub struct ChannelRenderer {
    id: Uuid,
    context_id: ContextId,
    sender: mpsc::UnboundedSender<RendererMessage>,
}

impl ChannelRenderer {
    /// Create a renderer and the receiving end of its message stream
    pub fn new(context_id: ContextId) -> (Self, mpsc::UnboundedReceiver<RendererMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                id: Uuid::new_v4(),
                context_id,
                sender,
            },
            receiver,
        )
    }
}

impl RendererHost for ChannelRenderer {
    fn id(&self) -> Uuid {
        self.id
    }

    fn context_id(&self) -> ContextId {
        self.context_id
    }

    fn is_alive(&self) -> bool {
        !self.sender.is_closed()
    }

    fn send(&self, message: RendererMessage) {
        if self.sender.send(message).is_err() {
            tracing::warn!("[Propagation] Renderer {} went away during send", self.id);
        }
    }
}

/// Connected renderers of a profile tree
#[derive(Default)]
pub struct RendererRegistry {
    hosts: RwLock<Vec<Arc<dyn RendererHost>>>,
}

impl RendererRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, host: Arc<dyn RendererHost>) {
        self.hosts.write().unwrap().push(host);
    }

    pub fn remove(&self, id: Uuid) -> bool {
        let mut hosts = self.hosts.write().unwrap();
        let before = hosts.len();
        hosts.retain(|h| h.id() != id);
        hosts.len() != before
    }

    pub fn len(&self) -> usize {
        self.hosts.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live renderers in any of `contexts`, snapshotted
    ///
    /// Dead renderers found along the way are dropped from the registry.
    pub fn hosts_for(&self, contexts: &[ContextId]) -> Vec<Arc<dyn RendererHost>> {
        let mut hosts = self.hosts.write().unwrap();
        let mut result = Vec::new();
        hosts.retain(|host| {
            if !host.is_alive() {
                tracing::warn!("[Propagation] Pruning dead renderer {}", host.id());
                return false;
            }
            if contexts.contains(&host.context_id()) {
                result.push(host.clone());
            }
            true
        });
        result
    }

    /// Send `message` to every live renderer in `contexts`
    pub fn broadcast(&self, contexts: &[ContextId], message: &RendererMessage) -> usize {
        let hosts = self.hosts_for(contexts);
        for host in &hosts {
            host.send(message.clone());
        }
        hosts.len()
    }
}

impl std::fmt::Debug for RendererRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RendererRegistry").field("hosts", &self.len()).finish()
    }
}
