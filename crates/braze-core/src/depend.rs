//! Dependency descriptors.
//!
//! A [`Depend`] describes one resolvable input to a handler: an invocable
//! target, an optional memoization policy, the scoped resources to enter
//! around its invocation, and the nested descriptors it requires first.
//! Descriptors form an acyclic graph resolved recursively by the executor;
//! a cycle is a programmer error detected at resolution time.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::context::ExecutionContext;
use crate::error::{BoxError, ExecError, ExecResult};
use crate::scoped::Scoped;

/// A type-erased dependency result, shared with every consumer.
pub type DependValue = Arc<dyn Any + Send + Sync>;

/// What a dependency target produces.
pub type DependResult = Result<DependValue, BoxError>;

/// A boxed dependency target: an async function of the execution context.
pub type DependFn =
    Arc<dyn Fn(Arc<ExecutionContext>) -> BoxFuture<'static, DependResult> + Send + Sync>;

/// An object that can expose a call target.
///
/// This is the closed-set replacement for "a class with a call operator":
/// a provider either yields its target or declines, in which case the
/// resolution chain fails with [`ExecError::NotCallable`].
pub trait Callable: Send + Sync {
    /// Returns the invocable target, if this provider has one.
    fn call_target(&self) -> Option<DependFn>;
}

/// The invocable behind a descriptor: a plain function or a provider.
#[derive(Clone)]
pub enum DependTarget {
    /// A plain async function.
    Func(DependFn),
    /// An object exposing a call capability.
    Provider(Arc<dyn Callable>),
}

/// Stable identity of a dependency's underlying callable.
///
/// Derived from the `Arc` pointer, so cloned descriptors sharing one target
/// share one identity (and therefore one memoization slot).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DependId(usize);

/// A resolvable input to a handler.
#[derive(Clone)]
pub struct Depend {
    target: DependTarget,
    cache: bool,
    key_fn: Option<Arc<dyn Fn(&ExecutionContext) -> String + Send + Sync>>,
    middlewares: Vec<Scoped>,
    requires: Vec<Depend>,
}

impl Depend {
    /// Wraps an async function producing a typed value.
    ///
    /// The produced value is erased to a [`DependValue`] and later recovered
    /// by type through [`Dep<T>`](crate::extract::Dep).
    pub fn new<F, Fut, T>(func: F) -> Self
    where
        F: Fn(Arc<ExecutionContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
        T: Send + Sync + 'static,
    {
        let target: DependFn = Arc::new(move |ctx| {
            let fut = func(ctx);
            Box::pin(async move { fut.await.map(|value| Arc::new(value) as DependValue) })
        });
        Self::from_target(DependTarget::Func(target))
    }

    /// Wraps a call-capable provider object.
    pub fn provider<C: Callable + 'static>(provider: C) -> Self {
        Self::from_target(DependTarget::Provider(Arc::new(provider)))
    }

    fn from_target(target: DependTarget) -> Self {
        Self {
            target,
            cache: false,
            key_fn: None,
            middlewares: Vec::new(),
            requires: Vec::new(),
        }
    }

    /// Memoizes the target's result for the lifetime of the memo store.
    pub fn cached(mut self) -> Self {
        self.cache = true;
        self
    }

    /// Memoizes per cache key derived from the execution context.
    ///
    /// Invocations whose keys compare equal share one memoized result.
    pub fn cached_with_key<K>(mut self, key_fn: K) -> Self
    where
        K: Fn(&ExecutionContext) -> String + Send + Sync + 'static,
    {
        self.cache = true;
        self.key_fn = Some(Arc::new(key_fn));
        self
    }

    /// Adds a scoped resource entered around each invocation.
    pub fn middleware(mut self, scope: Scoped) -> Self {
        self.middlewares.push(scope);
        self
    }

    /// Adds a nested descriptor resolved before this one's target runs.
    pub fn requires(mut self, depend: Depend) -> Self {
        self.requires.push(depend);
        self
    }

    /// Whether results are memoized.
    pub fn is_cached(&self) -> bool {
        self.cache
    }

    /// The scoped resources wrapped around each invocation.
    pub fn middlewares(&self) -> &[Scoped] {
        &self.middlewares
    }

    /// The nested descriptors resolved first.
    pub fn dependencies(&self) -> &[Depend] {
        &self.requires
    }

    /// The identity of the underlying callable.
    pub fn id(&self) -> DependId {
        match &self.target {
            DependTarget::Func(f) => DependId(Arc::as_ptr(f) as *const () as usize),
            DependTarget::Provider(p) => DependId(Arc::as_ptr(p) as *const () as usize),
        }
    }

    /// Unwraps the invocable target.
    pub(crate) fn resolve_target(&self) -> ExecResult<DependFn> {
        match &self.target {
            DependTarget::Func(f) => Ok(Arc::clone(f)),
            DependTarget::Provider(p) => p.call_target().ok_or(ExecError::NotCallable),
        }
    }

    /// The memoization key for this invocation.
    pub(crate) fn cache_key(&self, ctx: &ExecutionContext) -> String {
        match &self.key_fn {
            Some(key_fn) => key_fn(ctx),
            None => String::new(),
        }
    }
}

impl fmt::Debug for Depend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Depend")
            .field("id", &self.id())
            .field("cache", &self.cache)
            .field("middlewares", &self.middlewares.len())
            .field("requires", &self.requires.len())
            .finish()
    }
}
