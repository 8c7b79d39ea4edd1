//! Hook Registry
//!
//! Contains:
//! - `Hook` trait - for implementing hooks
//! - `HookMatcher` - matches extensions by id pattern
//! - `HookRegistry` - stores and runs hooks

use std::collections::HashMap;
use std::sync::Arc;

use regex::Regex;

use super::types::{HookContext, HookDecision, HookEvent, HookResult};

/// Trait for hook implementations
///
/// Hooks run synchronously on the mutating call stack and must not block.
pub trait Hook: Send + Sync {
    fn call(&self, ctx: &mut HookContext<'_>) -> HookResult;
}

/// Implement Hook for closures
///
/// Higher-ranked bound so the closure accepts any `HookContext` lifetime.
impl<F> Hook for F
where
    F: for<'a> Fn(&mut HookContext<'a>) -> HookResult + Send + Sync,
{
    fn call(&self, ctx: &mut HookContext<'_>) -> HookResult {
        (self)(ctx)
    }
}

/// Type alias for stored hooks
pub(crate) type ArcHook = Arc<dyn Hook>;

/// Matches extensions by id pattern and executes a hook
pub(crate) struct HookMatcher {
    /// Regex over extension ids (None = match all)
    pattern: Option<Regex>,
    hook: ArcHook,
}

impl HookMatcher {
    /// Create a matcher for every extension
    pub(crate) fn new<H: Hook + 'static>(hook: H) -> Self {
        Self {
            pattern: None,
            hook: Arc::new(hook),
        }
    }

    /// Create a matcher with an extension id regex
    ///
    /// Pattern examples:
    /// - `"^abcdefghijklmnop$"` - one extension
    /// - `"^(aaa|bbb)"` - a family of ids
    pub(crate) fn with_pattern<H: Hook + 'static>(pattern: &str, hook: H) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Some(Regex::new(pattern)?),
            hook: Arc::new(hook),
        })
    }

    pub(crate) fn matches(&self, extension_id: &str) -> bool {
        match &self.pattern {
            Some(regex) => regex.is_match(extension_id),
            None => true,
        }
    }

    pub(crate) fn run(&self, ctx: &mut HookContext<'_>) -> HookResult {
        self.hook.call(ctx)
    }
}

impl std::fmt::Debug for HookMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookMatcher")
            .field("pattern", &self.pattern.as_ref().map(|r| r.as_str()))
            .finish()
    }
}

/// Central registry for all hooks
///
/// # Example
///
/// ```ignore
/// let mut hooks = HookRegistry::new();
///
/// // Never grant hosts at install to unpacked test builds
/// hooks.add_with_pattern(HookEvent::InitializePermissions, "^test_", |ctx| {
///     ctx.granted = ctx.granted.difference(&ctx.granted.hosts_only());
///     HookResult::accept()
/// })?;
/// ```
#[derive(Default)]
pub struct HookRegistry {
    hooks: HashMap<HookEvent, Vec<HookMatcher>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a hook for every extension
    pub fn add<H: Hook + 'static>(&mut self, event: HookEvent, hook: H) -> &mut Self {
        self.hooks
            .entry(event)
            .or_default()
            .push(HookMatcher::new(hook));
        self
    }

    /// Add a hook with an extension id pattern
    pub fn add_with_pattern<H: Hook + 'static>(
        &mut self,
        event: HookEvent,
        pattern: &str,
        hook: H,
    ) -> Result<&mut Self, regex::Error> {
        self.hooks
            .entry(event)
            .or_default()
            .push(HookMatcher::with_pattern(pattern, hook)?);
        Ok(self)
    }

    pub fn has_hooks(&self, event: HookEvent) -> bool {
        self.hooks
            .get(&event)
            .map(|v| !v.is_empty())
            .unwrap_or(false)
    }

    pub(crate) fn hook_count(&self, event: HookEvent) -> usize {
        self.hooks.get(&event).map(|v| v.len()).unwrap_or(0)
    }

    /// Run every matching hook for the context's event
    ///
    /// All matching hooks run so audit hooks always fire; Deny beats Accept
    /// beats no decision.
    pub fn run(&self, ctx: &mut HookContext<'_>) -> HookResult {
        let matchers = match self.hooks.get(&ctx.event) {
            Some(matchers) => matchers,
            None => return HookResult::none(),
        };
        let extension_id = ctx.extension_id().to_string();

        let mut combined = HookResult::none();
        for matcher in matchers {
            if !matcher.matches(&extension_id) {
                continue;
            }
            let result = matcher.run(ctx);
            combined = combine_results(combined, result);
        }
        combined
    }
}

/// Combine two hook results
///
/// Priority: Deny > Accept > None
fn combine_results(a: HookResult, b: HookResult) -> HookResult {
    match (a.decision, b.decision) {
        (Some(HookDecision::Deny), _) => a,
        (_, Some(HookDecision::Deny)) => b,
        (Some(HookDecision::Accept), _) => a,
        (_, Some(HookDecision::Accept)) => b,
        _ => HookResult::none(),
    }
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (event, matchers) in &self.hooks {
            map.entry(event, &matchers.len());
        }
        map.finish()
    }
}
