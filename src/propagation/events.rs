//! Extension-facing permission events

use std::collections::VecDeque;
use std::sync::Mutex;

use serde_json::Value;

use crate::core::ExtensionId;

pub const ON_ADDED_EVENT: &str = "permissions.onAdded";
pub const ON_REMOVED_EVENT: &str = "permissions.onRemoved";

/// An event delivered to an extension's own execution context
#[derive(Debug, Clone, PartialEq)]
pub struct ExtensionEvent {
    pub name: String,
    pub args: Value,
}

/// Delivers events to extensions
pub trait EventRouter: Send + Sync {
    fn dispatch_event_to_extension(&self, extension_id: &ExtensionId, event: ExtensionEvent);
}

/// Router for profiles with no extension processes attached; events are logged and dropped
#[derive(Debug, Default)]
pub struct DiscardingEventRouter;

impl EventRouter for DiscardingEventRouter {
    fn dispatch_event_to_extension(&self, extension_id: &ExtensionId, event: ExtensionEvent) {
        tracing::debug!("[EventRouter] Dropping {} for {}", event.name, extension_id);
    }
}

/// Event router that queues events until drained
///
/// Holds at most `capacity` events; the oldest is dropped on overflow.
#[derive(Debug)]
pub struct EventQueue {
    capacity: usize,
    events: Mutex<VecDeque<(ExtensionId, ExtensionEvent)>>,
}

impl EventQueue {
    pub const DEFAULT_CAPACITY: usize = 1024;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            events: Mutex::new(VecDeque::new()),
        }
    }

    /// Take every queued event
    pub fn drain(&self) -> Vec<(ExtensionId, ExtensionEvent)> {
        self.events.lock().unwrap().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl EventRouter for EventQueue {
    fn dispatch_event_to_extension(&self, extension_id: &ExtensionId, event: ExtensionEvent) {
        tracing::debug!("[EventQueue] {} -> {}", event.name, extension_id);
        let mut events = self.events.lock().unwrap();
        if events.len() >= self.capacity {
            if let Some((dropped_id, dropped)) = events.pop_front() {
                tracing::warn!("[EventQueue] Full, dropping {} for {}", dropped.name, dropped_id);
            }
        }
        events.push_back((extension_id.clone(), event));
    }
}
