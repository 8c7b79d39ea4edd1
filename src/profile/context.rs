//! Browser contexts (profiles)
//!
//! A `BrowserContext` bundles everything the engine needs for one profile:
//! configuration, preference store, installed extensions, enforcement
//! collaborators and a shutdown token. Related incognito contexts share the
//! profile's state and receive the same renderer pushes.

use std::sync::{Arc, RwLock};

use tokio_util::sync::CancellationToken;

use crate::core::{ContextId, EngineConfig};
use crate::extension::ExtensionRegistry;
use crate::hooks::HookRegistry;
use crate::patterns::UrlPatternSet;
use crate::permissions::{ContextHostRestrictions, PolicyHostRestrictions};
use crate::prefs::{JsonPreferenceStore, PreferenceStore};
use crate::propagation::{DiscardingEventRouter, EventRouter, InMemoryNetworkLayer, NetworkLayer, RendererRegistry};

/// One profile and its collaborators
pub struct BrowserContext {
    id: ContextId,
    incognito_ids: RwLock<Vec<ContextId>>,
    shutdown: CancellationToken,
    config: EngineConfig,
    prefs: Arc<dyn PreferenceStore>,
    extensions: Arc<ExtensionRegistry>,
    network: Arc<dyn NetworkLayer>,
    renderers: Arc<RendererRegistry>,
    events: Arc<dyn EventRouter>,
    hooks: HookRegistry,
    host_restrictions: RwLock<ContextHostRestrictions>,
}

impl BrowserContext {
    pub fn builder() -> BrowserContextBuilder {
        BrowserContextBuilder::default()
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn prefs(&self) -> &dyn PreferenceStore {
        self.prefs.as_ref()
    }

    pub fn extensions(&self) -> &ExtensionRegistry {
        &self.extensions
    }

    pub fn network(&self) -> Arc<dyn NetworkLayer> {
        self.network.clone()
    }

    pub fn renderers(&self) -> &RendererRegistry {
        &self.renderers
    }

    pub fn events(&self) -> &dyn EventRouter {
        self.events.as_ref()
    }

    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    /// Register an incognito context that shares this profile
    pub fn add_incognito_context(&self) -> ContextId {
        let id = ContextId::new();
        self.incognito_ids.write().unwrap().push(id);
        tracing::debug!("[BrowserContext] Added incognito context {} to {}", id, self.id);
        id
    }

    /// This context followed by its incognito contexts
    pub fn related_context_ids(&self) -> Vec<ContextId> {
        let mut ids = vec![self.id];
        ids.extend(self.incognito_ids.read().unwrap().iter().copied());
        ids
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Signal teardown; in-flight propagation aborts its dispatch step
    pub fn shutdown(&self) {
        tracing::info!("[BrowserContext] Shutting down {}", self.id);
        self.shutdown.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub fn host_restrictions(&self) -> ContextHostRestrictions {
        self.host_restrictions.read().unwrap().clone()
    }

    pub(crate) fn set_user_host_restrictions(&self, blocked_hosts: UrlPatternSet, allowed_hosts: UrlPatternSet) {
        let mut restrictions = self.host_restrictions.write().unwrap();
        restrictions.user_blocked_hosts = blocked_hosts;
        restrictions.user_allowed_hosts = allowed_hosts;
    }

    pub(crate) fn set_default_policy_host_restrictions(&self, policy: PolicyHostRestrictions) {
        self.host_restrictions.write().unwrap().default_policy = policy;
    }
}

impl std::fmt::Debug for BrowserContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserContext")
            .field("id", &self.id)
            .field("extensions", &self.extensions.len())
            .field("shutting_down", &self.is_shutting_down())
            .finish()
    }
}

/// Builder for `BrowserContext`
///
/// Unset collaborators default to in-memory implementations; extension
/// events are dropped unless a router is set.
#[derive(Default)]
pub struct BrowserContextBuilder {
    config: Option<EngineConfig>,
    prefs: Option<Arc<dyn PreferenceStore>>,
    extensions: Option<Arc<ExtensionRegistry>>,
    network: Option<Arc<dyn NetworkLayer>>,
    renderers: Option<Arc<RendererRegistry>>,
    events: Option<Arc<dyn EventRouter>>,
    hooks: Option<HookRegistry>,
}

impl BrowserContextBuilder {
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_prefs(mut self, prefs: Arc<dyn PreferenceStore>) -> Self {
        self.prefs = Some(prefs);
        self
    }

    pub fn with_extensions(mut self, extensions: Arc<ExtensionRegistry>) -> Self {
        self.extensions = Some(extensions);
        self
    }

    pub fn with_network(mut self, network: Arc<dyn NetworkLayer>) -> Self {
        self.network = Some(network);
        self
    }

    pub fn with_renderers(mut self, renderers: Arc<RendererRegistry>) -> Self {
        self.renderers = Some(renderers);
        self
    }

    pub fn with_event_router(mut self, events: Arc<dyn EventRouter>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_hooks(mut self, hooks: HookRegistry) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub fn build(self) -> Arc<BrowserContext> {
        let prefs = self
            .prefs
            .unwrap_or_else(|| Arc::new(JsonPreferenceStore::in_memory()));
        let restrictions = ContextHostRestrictions {
            default_policy: prefs.get_default_policy_host_restrictions(),
            ..Default::default()
        };

        let context = BrowserContext {
            id: ContextId::new(),
            incognito_ids: RwLock::new(Vec::new()),
            shutdown: CancellationToken::new(),
            config: self.config.unwrap_or_default(),
            prefs,
            extensions: self.extensions.unwrap_or_default(),
            network: self
                .network
                .unwrap_or_else(|| Arc::new(InMemoryNetworkLayer::new())),
            renderers: self.renderers.unwrap_or_default(),
            events: self.events.unwrap_or_else(|| Arc::new(DiscardingEventRouter)),
            hooks: self.hooks.unwrap_or_default(),
            host_restrictions: RwLock::new(restrictions),
        };
        tracing::debug!("[BrowserContext] Created {}", context.id);
        Arc::new(context)
    }
}
