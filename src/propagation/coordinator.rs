//! Propagation coordinator
//!
//! One coordinator per batch pushes a permission change to the network
//! layer, then runs the dispatch step (observers, renderers, extension
//! events) and finally the completion callback.
//!
//! ## Lifecycle
//!
//! ```text
//! Created -> Updating -> Completed
//!                    \-> Aborted (profile shutdown)
//! ```
//!
//! The batch runs as a tokio task owned by the returned `PropagationHandle`.
//! Profile shutdown is a `CancellationToken`: it is raced against the network
//! update and checked again before dispatch, so a batch ends exactly once.
//! The completion callback runs on both paths; dispatch only on completion.

use std::fmt;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::network::{NetworkLayer, OriginAccessList};
use crate::core::{ContextId, ExtensionId, PermissionError, PermissionResult};
use crate::extension::Extension;
use crate::permissions::PermissionSet;
use crate::profile::BrowserContext;

/// Why an extension's permissions changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateReason {
    Added,
    Removed,
    Policy,
}

impl fmt::Display for UpdateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateReason::Added => write!(f, "added"),
            UpdateReason::Removed => write!(f, "removed"),
            UpdateReason::Policy => write!(f, "policy"),
        }
    }
}

/// State of one propagation batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropagationState {
    Created,
    Updating,
    Completed,
    Aborted,
}

/// How a batch ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropagationOutcome {
    /// Network updated and notifications dispatched
    Completed,
    /// Profile shut down first; nothing was dispatched
    Aborted,
}

/// Work run after the network update succeeds
pub type Dispatch = Box<dyn FnOnce() + Send + 'static>;

/// Caller continuation, run exactly once with the outcome
pub type CompletionCallback = Box<dyn FnOnce(PropagationOutcome) + Send + 'static>;

/// Awaitable result of a propagation batch
#[derive(Debug)]
pub enum PropagationHandle {
    /// Finished synchronously
    Ready(PropagationOutcome),
    /// Running on the tokio runtime
    Pending(JoinHandle<PropagationOutcome>),
}

impl PropagationHandle {
    /// Wait for the batch to end
    pub async fn wait(self) -> PropagationOutcome {
        match self {
            PropagationHandle::Ready(outcome) => outcome,
            PropagationHandle::Pending(task) => match task.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!("[Propagation] Batch task failed: {}", e);
                    PropagationOutcome::Aborted
                }
            },
        }
    }

    pub fn is_finished(&self) -> bool {
        match self {
            PropagationHandle::Ready(_) => true,
            PropagationHandle::Pending(task) => task.is_finished(),
        }
    }
}

enum NetworkWork {
    One {
        extension_id: ExtensionId,
        list: OriginAccessList,
    },
    All(Vec<(ExtensionId, OriginAccessList)>),
}

/// Pushes one batch of permission changes
pub struct PropagationCoordinator {
    batch_id: Uuid,
    state: PropagationState,
    contexts: Vec<ContextId>,
    network: Arc<dyn NetworkLayer>,
    shutdown: CancellationToken,
}

impl PropagationCoordinator {
    fn new(context: &BrowserContext) -> Self {
        Self {
            batch_id: Uuid::new_v4(),
            state: PropagationState::Created,
            contexts: context.related_context_ids(),
            network: context.network(),
            shutdown: context.shutdown_token(),
        }
    }

    /// Fail with `NoRuntime` unless called from inside a tokio runtime
    pub fn ensure_runtime() -> PermissionResult<()> {
        Handle::try_current()
            .map(|_| ())
            .map_err(|_| PermissionError::NoRuntime)
    }

    /// Whether a change of `changed` for `reason` goes through the network layer
    pub(crate) fn needs_network(reason: UpdateReason, changed: &PermissionSet) -> bool {
        reason == UpdateReason::Policy || !changed.effective_hosts().is_empty()
    }

    /// Check up front that `update_extension` will be able to run
    ///
    /// Mutations call this before touching prefs or live state.
    pub(crate) fn check_runtime(
        context: &BrowserContext,
        reason: UpdateReason,
        changed: &PermissionSet,
    ) -> PermissionResult<()> {
        if context.is_shutting_down() || !Self::needs_network(reason, changed) {
            return Ok(());
        }
        Self::ensure_runtime()
    }

    /// Propagate one extension's change
    ///
    /// A non-policy change without host patterns skips the network layer and
    /// dispatches before returning.
    pub fn update_extension(
        context: &BrowserContext,
        extension: &Extension,
        changed: &PermissionSet,
        reason: UpdateReason,
        dispatch: Dispatch,
        callback: Option<CompletionCallback>,
    ) -> PermissionResult<PropagationHandle> {
        let mut coordinator = Self::new(context);

        if !Self::needs_network(reason, changed) {
            tracing::debug!(
                "[Propagation] Batch {} for {} has no host changes, dispatching inline",
                coordinator.batch_id,
                extension.id()
            );
            return Ok(PropagationHandle::Ready(coordinator.finish_inline(dispatch, callback)));
        }

        let work = NetworkWork::One {
            extension_id: extension.id().clone(),
            list: OriginAccessList::for_extension(extension, &context.host_restrictions()),
        };
        coordinator.spawn(work, dispatch, callback)
    }

    /// Propagate a change affecting every enabled extension
    pub fn update_all_extensions(
        context: &BrowserContext,
        extensions: &[Arc<Extension>],
        dispatch: Dispatch,
        callback: Option<CompletionCallback>,
    ) -> PermissionResult<PropagationHandle> {
        let restrictions = context.host_restrictions();
        let lists = extensions
            .iter()
            .map(|e| (e.id().clone(), OriginAccessList::for_extension(e, &restrictions)))
            .collect();
        Self::new(context).spawn(NetworkWork::All(lists), dispatch, callback)
    }

    fn transition(&mut self, next: PropagationState) {
        debug_assert!(
            matches!(
                (self.state, next),
                (PropagationState::Created, PropagationState::Updating)
                    | (PropagationState::Created, PropagationState::Completed)
                    | (PropagationState::Created, PropagationState::Aborted)
                    | (PropagationState::Updating, PropagationState::Completed)
                    | (PropagationState::Updating, PropagationState::Aborted)
            ),
            "invalid propagation transition {:?} -> {:?}",
            self.state,
            next
        );
        tracing::debug!("[Propagation] Batch {}: {:?} -> {:?}", self.batch_id, self.state, next);
        self.state = next;
    }

    fn finish_inline(mut self, dispatch: Dispatch, callback: Option<CompletionCallback>) -> PropagationOutcome {
        let outcome = if self.shutdown.is_cancelled() {
            self.transition(PropagationState::Aborted);
            PropagationOutcome::Aborted
        } else {
            self.transition(PropagationState::Completed);
            dispatch();
            PropagationOutcome::Completed
        };
        if let Some(callback) = callback {
            callback(outcome);
        }
        outcome
    }

    fn spawn(
        mut self,
        work: NetworkWork,
        dispatch: Dispatch,
        callback: Option<CompletionCallback>,
    ) -> PermissionResult<PropagationHandle> {
        Self::ensure_runtime()?;
        let runtime = Handle::current();

        let task = runtime.spawn(async move {
            self.transition(PropagationState::Updating);
            let network = self.network.clone();
            let contexts = self.contexts.clone();
            let update = async move {
                match work {
                    NetworkWork::One { extension_id, list } => {
                        network.set_origin_access_list(&contexts, &extension_id, list).await
                    }
                    NetworkWork::All(lists) => network.update_all_extensions(&contexts, lists).await,
                }
            };

            let outcome = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => PropagationOutcome::Aborted,
                _ = update => {
                    if self.shutdown.is_cancelled() {
                        PropagationOutcome::Aborted
                    } else {
                        PropagationOutcome::Completed
                    }
                }
            };

            match outcome {
                PropagationOutcome::Completed => {
                    self.transition(PropagationState::Completed);
                    dispatch();
                }
                PropagationOutcome::Aborted => {
                    tracing::info!(
                        "[Propagation] Batch {} aborted by profile shutdown",
                        self.batch_id
                    );
                    self.transition(PropagationState::Aborted);
                }
            }
            if let Some(callback) = callback {
                callback(outcome);
            }
            outcome
        });

        Ok(PropagationHandle::Pending(task))
    }
}

impl fmt::Debug for PropagationCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropagationCoordinator")
            .field("batch_id", &self.batch_id)
            .field("state", &self.state)
            .field("contexts", &self.contexts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use crate::core::EngineConfig;
    use crate::extension::ExtensionBuilder;
    use crate::patterns::{SchemeMask, UrlPatternSet};
    use crate::testing::RecordingNetworkLayer;

    fn context(network: Arc<RecordingNetworkLayer>) -> Arc<BrowserContext> {
        BrowserContext::builder().with_network(network).build()
    }

    fn extension() -> Arc<Extension> {
        ExtensionBuilder::new("ext")
            .add_permission("https://a.com/*")
            .build(&EngineConfig::default())
            .unwrap()
    }

    fn host_delta() -> PermissionSet {
        PermissionSet::from_sites(UrlPatternSet::parse_all(SchemeMask::HOST_PERMISSION, ["https://a.com/*"]).unwrap())
    }

    fn counting() -> (Arc<AtomicUsize>, Dispatch) {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        (count, Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
    }

    fn recording_callback() -> (Arc<Mutex<Vec<PropagationOutcome>>>, CompletionCallback) {
        let outcomes = Arc::new(Mutex::new(Vec::new()));
        let sink = outcomes.clone();
        (outcomes, Box::new(move |o| sink.lock().unwrap().push(o)))
    }

    #[tokio::test]
    async fn test_fast_path_without_host_changes() {
        let network = Arc::new(RecordingNetworkLayer::new());
        let context = context(network.clone());
        let (dispatched, dispatch) = counting();
        let (outcomes, callback) = recording_callback();

        let handle = PropagationCoordinator::update_extension(
            &context,
            &extension(),
            &PermissionSet::from_apis(["storage"]),
            UpdateReason::Added,
            dispatch,
            Some(callback),
        )
        .unwrap();

        assert!(handle.is_finished());
        assert_eq!(handle.wait().await, PropagationOutcome::Completed);
        assert_eq!(dispatched.load(Ordering::SeqCst), 1);
        assert_eq!(*outcomes.lock().unwrap(), vec![PropagationOutcome::Completed]);
        assert!(network.calls().is_empty());
    }

    #[tokio::test]
    async fn test_network_then_dispatch() {
        let network = Arc::new(RecordingNetworkLayer::new());
        let context = context(network.clone());
        let (dispatched, dispatch) = counting();

        let handle = PropagationCoordinator::update_extension(
            &context,
            &extension(),
            &host_delta(),
            UpdateReason::Added,
            dispatch,
            None,
        )
        .unwrap();

        assert_eq!(handle.wait().await, PropagationOutcome::Completed);
        assert_eq!(dispatched.load(Ordering::SeqCst), 1);
        assert_eq!(network.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_policy_always_hits_network() {
        let network = Arc::new(RecordingNetworkLayer::new());
        let context = context(network.clone());
        let (_, dispatch) = counting();

        let handle = PropagationCoordinator::update_extension(
            &context,
            &extension(),
            &PermissionSet::empty(),
            UpdateReason::Policy,
            dispatch,
            None,
        )
        .unwrap();

        assert_eq!(handle.wait().await, PropagationOutcome::Completed);
        assert_eq!(network.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_aborts_dispatch_but_runs_callback() {
        let network = Arc::new(RecordingNetworkLayer::new());
        network.hold();
        let context = context(network.clone());
        let (dispatched, dispatch) = counting();
        let (outcomes, callback) = recording_callback();

        let handle = PropagationCoordinator::update_all_extensions(
            &context,
            &[extension()],
            dispatch,
            Some(callback),
        )
        .unwrap();

        context.shutdown();
        assert_eq!(handle.wait().await, PropagationOutcome::Aborted);
        assert_eq!(dispatched.load(Ordering::SeqCst), 0);
        assert_eq!(*outcomes.lock().unwrap(), vec![PropagationOutcome::Aborted]);
    }

    #[tokio::test]
    async fn test_fast_path_after_shutdown() {
        let network = Arc::new(RecordingNetworkLayer::new());
        let context = context(network);
        context.shutdown();
        let (dispatched, dispatch) = counting();

        let handle = PropagationCoordinator::update_extension(
            &context,
            &extension(),
            &PermissionSet::empty(),
            UpdateReason::Removed,
            dispatch,
            None,
        )
        .unwrap();

        assert_eq!(handle.wait().await, PropagationOutcome::Aborted);
        assert_eq!(dispatched.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_no_runtime() {
        let context = context(Arc::new(RecordingNetworkLayer::new()));
        let (_, dispatch) = counting();
        let result = PropagationCoordinator::update_all_extensions(&context, &[], dispatch, None);
        assert!(matches!(result, Err(PermissionError::NoRuntime)));
    }

    #[test]
    fn test_check_runtime_before_mutating() {
        let context = context(Arc::new(RecordingNetworkLayer::new()));
        let empty = PermissionSet::empty();

        assert!(PropagationCoordinator::check_runtime(&context, UpdateReason::Added, &empty).is_ok());
        assert!(matches!(
            PropagationCoordinator::check_runtime(&context, UpdateReason::Added, &host_delta()),
            Err(PermissionError::NoRuntime)
        ));
        assert!(matches!(
            PropagationCoordinator::check_runtime(&context, UpdateReason::Policy, &empty),
            Err(PermissionError::NoRuntime)
        ));

        context.shutdown();
        assert!(PropagationCoordinator::check_runtime(&context, UpdateReason::Policy, &empty).is_ok());
    }

    #[tokio::test]
    async fn test_check_runtime_inside_runtime() {
        let context = context(Arc::new(RecordingNetworkLayer::new()));
        assert!(PropagationCoordinator::ensure_runtime().is_ok());
        assert!(PropagationCoordinator::check_runtime(&context, UpdateReason::Removed, &host_delta()).is_ok());
    }
}
