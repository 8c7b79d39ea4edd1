//! Test doubles
//!
//! Recording implementations of the engine's outbound interfaces and a
//! `TestProfile` that wires them into one profile.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::authority::{PermissionAuthority, PermissionsObserver, UserPermissionsSettings};
use crate::core::{ContextId, EngineConfig, ExtensionId, PermissionResult};
use crate::extension::{Extension, ExtensionBuilder};
use crate::hooks::HookRegistry;
use crate::modifier::ScriptingPermissionsModifier;
use crate::patterns::SiteOrigin;
use crate::permissions::PermissionSet;
use crate::prefs::{JsonPreferenceStore, PreferenceStore};
use crate::profile::{AuthorityRegistry, BrowserContext};
use crate::propagation::{
    EventQueue, NetworkLayer, OriginAccessList, RendererHost, RendererMessage, UpdateReason,
};
use crate::updater::PermissionsUpdater;

/// One call into the network layer
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkCall {
    pub contexts: Vec<ContextId>,
    pub lists: Vec<(ExtensionId, OriginAccessList)>,
}

/// Network layer that records calls and can be held open
#[derive(Debug, Default)]
pub struct RecordingNetworkLayer {
    calls: Mutex<Vec<NetworkCall>>,
    held: AtomicBool,
    released: Notify,
}

impl RecordingNetworkLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later call wait until `release`
    pub fn hold(&self) {
        self.held.store(true, Ordering::SeqCst);
    }

    pub fn release(&self) {
        self.held.store(false, Ordering::SeqCst);
        self.released.notify_waiters();
    }

    pub fn calls(&self) -> Vec<NetworkCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, contexts: &[ContextId], lists: Vec<(ExtensionId, OriginAccessList)>) {
        self.calls.lock().unwrap().push(NetworkCall {
            contexts: contexts.to_vec(),
            lists,
        });
    }

    async fn wait_while_held(&self) {
        loop {
            let released = self.released.notified();
            if !self.held.load(Ordering::SeqCst) {
                return;
            }
            released.await;
        }
    }
}

#[async_trait]
impl NetworkLayer for RecordingNetworkLayer {
    async fn set_origin_access_list(&self, contexts: &[ContextId], extension_id: &ExtensionId, list: OriginAccessList) {
        self.record(contexts, vec![(extension_id.clone(), list)]);
        self.wait_while_held().await;
    }

    async fn update_all_extensions(&self, contexts: &[ContextId], lists: Vec<(ExtensionId, OriginAccessList)>) {
        self.record(contexts, lists);
        self.wait_while_held().await;
    }
}

/// Renderer that keeps every message it receives
#[derive(Debug)]
pub struct RecordingRenderer {
    id: Uuid,
    context_id: ContextId,
    alive: AtomicBool,
    messages: Mutex<Vec<RendererMessage>>,
}

impl RecordingRenderer {
    pub fn new(context_id: ContextId) -> Self {
        Self {
            id: Uuid::new_v4(),
            context_id,
            alive: AtomicBool::new(true),
            messages: Mutex::new(Vec::new()),
        }
    }

    /// Simulate the renderer process dying
    pub fn kill(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<RendererMessage> {
        self.messages.lock().unwrap().clone()
    }

    /// `UpdatePermissions` messages for one extension
    pub fn permission_updates(&self, extension_id: &ExtensionId) -> usize {
        self.messages()
            .iter()
            .filter(|m| matches!(m, RendererMessage::UpdatePermissions { extension_id: id, .. } if id == extension_id))
            .count()
    }
}

impl RendererHost for RecordingRenderer {
    fn id(&self) -> Uuid {
        self.id
    }

    fn context_id(&self) -> ContextId {
        self.context_id
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn send(&self, message: RendererMessage) {
        self.messages.lock().unwrap().push(message);
    }
}

/// Observer that records every notification
#[derive(Debug, Default)]
pub struct RecordingObserver {
    settings_changes: Mutex<Vec<UserPermissionsSettings>>,
    updates: Mutex<Vec<(ExtensionId, PermissionSet, UpdateReason)>>,
    dismissed: Mutex<Vec<(ExtensionId, SiteOrigin)>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn settings_changes(&self) -> Vec<UserPermissionsSettings> {
        self.settings_changes.lock().unwrap().clone()
    }

    pub fn updates(&self) -> Vec<(ExtensionId, PermissionSet, UpdateReason)> {
        self.updates.lock().unwrap().clone()
    }

    pub fn dismissed(&self) -> Vec<(ExtensionId, SiteOrigin)> {
        self.dismissed.lock().unwrap().clone()
    }
}

impl PermissionsObserver for RecordingObserver {
    fn on_user_permissions_settings_changed(&self, settings: &UserPermissionsSettings) {
        self.settings_changes.lock().unwrap().push(settings.clone());
    }

    fn on_extension_permissions_updated(&self, extension: &Extension, changed: &PermissionSet, reason: UpdateReason) {
        self.updates
            .lock()
            .unwrap()
            .push((extension.id().clone(), changed.clone(), reason));
    }

    fn on_extension_dismissed_requests(&self, extension_id: &ExtensionId, origin: &SiteOrigin) {
        self.dismissed.lock().unwrap().push((extension_id.clone(), origin.clone()));
    }
}

/// A profile wired to recording collaborators
pub struct TestProfile {
    pub context: Arc<BrowserContext>,
    pub authority: Arc<PermissionAuthority>,
    pub prefs: Arc<JsonPreferenceStore>,
    pub network: Arc<RecordingNetworkLayer>,
    pub renderer: Arc<RecordingRenderer>,
    pub events: Arc<EventQueue>,
    pub observer: Arc<RecordingObserver>,
    pub registry: AuthorityRegistry,
}

impl TestProfile {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self::build(config, Arc::new(JsonPreferenceStore::in_memory()), HookRegistry::new())
    }

    pub fn build(config: EngineConfig, prefs: Arc<JsonPreferenceStore>, hooks: HookRegistry) -> Self {
        let network = Arc::new(RecordingNetworkLayer::new());
        let events = Arc::new(EventQueue::new());
        let store: Arc<dyn PreferenceStore> = prefs.clone();
        let context = BrowserContext::builder()
            .with_config(config)
            .with_prefs(store)
            .with_network(network.clone())
            .with_event_router(events.clone())
            .with_hooks(hooks)
            .build();

        let renderer = Arc::new(RecordingRenderer::new(context.id()));
        context.renderers().add(renderer.clone());

        let registry = AuthorityRegistry::new();
        let authority = registry.get_or_create(&context);
        let observer = Arc::new(RecordingObserver::new());
        authority.add_observer(observer.clone());

        Self {
            context,
            authority,
            prefs,
            network,
            renderer,
            events,
            observer,
            registry,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        self.context.config()
    }

    pub fn updater(&self) -> PermissionsUpdater {
        PermissionsUpdater::new(self.authority.clone())
    }

    pub fn modifier(&self, extension: &Arc<Extension>) -> ScriptingPermissionsModifier {
        ScriptingPermissionsModifier::new(self.authority.clone(), extension.clone())
    }

    /// Build, enable and initialize an extension
    pub fn install(&self, builder: ExtensionBuilder) -> PermissionResult<Arc<Extension>> {
        let extension = builder.build(self.config())?;
        self.context.extensions().add_enabled(extension.clone());
        self.updater().initialize_permissions(&extension)?;
        Ok(extension)
    }
}

impl Default for TestProfile {
    fn default() -> Self {
        Self::new()
    }
}
