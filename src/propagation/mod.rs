//! Propagation of permission changes
//!
//! After a mutation is durable, the change is pushed to:
//! - the network layer (`NetworkLayer`), asynchronously
//! - every live renderer of the profile and its incognito contexts (`RendererRegistry`)
//! - the extension itself, as a `permissions.onAdded` / `permissions.onRemoved` event (`EventRouter`)
//!
//! `PropagationCoordinator` sequences these steps for one batch and hands the
//! caller a `PropagationHandle` to await.

mod coordinator;
mod events;
mod network;
mod renderer;

pub use coordinator::{
    CompletionCallback, Dispatch, PropagationCoordinator, PropagationHandle, PropagationOutcome, PropagationState,
    UpdateReason,
};
pub use events::{DiscardingEventRouter, EventQueue, EventRouter, ExtensionEvent, ON_ADDED_EVENT, ON_REMOVED_EVENT};
pub use network::{InMemoryNetworkLayer, NetworkLayer, OriginAccessList};
pub use renderer::{ChannelRenderer, RendererHost, RendererMessage, RendererRegistry};
