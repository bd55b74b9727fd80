//! Scoped resources ("middlewares") bracketing an execution.
//!
//! A scoped resource is an acquire/release pair entered around a dependency
//! or handler invocation. The capability set is closed: a resource is either
//! an [`AsyncScope`] or a [`SyncScope`], determined by which trait it
//! implements. The executor enters all asynchronous scopes first, then all
//! synchronous ones, and releases everything in reverse order on every exit
//! path.

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::ExecutionContext;

/// A scoped resource whose acquisition and release suspend.
#[async_trait]
pub trait AsyncScope: Send + Sync {
    /// Acquires the resource before the wrapped execution.
    async fn enter(&self, ctx: &ExecutionContext);

    /// Releases the resource after the wrapped execution.
    async fn exit(&self, ctx: &ExecutionContext);
}

/// A scoped resource with synchronous acquisition and release.
pub trait SyncScope: Send + Sync {
    /// Acquires the resource before the wrapped execution.
    fn enter(&self, ctx: &ExecutionContext);

    /// Releases the resource after the wrapped execution.
    fn exit(&self, ctx: &ExecutionContext);
}

/// A scoped resource of either capability.
#[derive(Clone)]
pub enum Scoped {
    /// Asynchronous acquire/release.
    Async(Arc<dyn AsyncScope>),
    /// Synchronous acquire/release.
    Sync(Arc<dyn SyncScope>),
}

impl Scoped {
    /// Wraps an asynchronous scoped resource.
    pub fn asynchronous<S: AsyncScope + 'static>(scope: S) -> Self {
        Scoped::Async(Arc::new(scope))
    }

    /// Wraps a synchronous scoped resource.
    pub fn synchronous<S: SyncScope + 'static>(scope: S) -> Self {
        Scoped::Sync(Arc::new(scope))
    }

    /// Whether this resource has the asynchronous capability.
    pub fn is_async(&self) -> bool {
        matches!(self, Scoped::Async(_))
    }
}

/// Yields scopes in bracket order: all asynchronous ones, then all
/// synchronous ones, preserving relative order within each group.
pub fn bracket_order(scopes: &[Scoped]) -> impl Iterator<Item = &Scoped> {
    scopes
        .iter()
        .filter(|s| s.is_async())
        .chain(scopes.iter().filter(|s| !s.is_async()))
}

/// Tracks entered scopes and releases them in strict reverse order.
#[derive(Default)]
pub struct ExitStack {
    entered: Vec<Scoped>,
}

impl ExitStack {
    /// Creates an empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enters a scope and records it for release.
    pub async fn enter(&mut self, scope: &Scoped, ctx: &ExecutionContext) {
        match scope {
            Scoped::Async(s) => s.enter(ctx).await,
            Scoped::Sync(s) => s.enter(ctx),
        }
        self.entered.push(scope.clone());
    }

    /// Releases all entered scopes, last-entered first.
    pub async fn release(mut self, ctx: &ExecutionContext) {
        while let Some(scope) = self.entered.pop() {
            match scope {
                Scoped::Async(s) => s.exit(ctx).await,
                Scoped::Sync(s) => s.exit(ctx),
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use parking_lot::Mutex;

    /// Records enter/exit events into a shared log.
    pub struct Recorder {
        pub label: &'static str,
        pub log: Arc<Mutex<Vec<String>>>,
    }

    impl SyncScope for Recorder {
        fn enter(&self, _ctx: &ExecutionContext) {
            self.log.lock().push(format!("enter-{}", self.label));
        }

        fn exit(&self, _ctx: &ExecutionContext) {
            self.log.lock().push(format!("exit-{}", self.label));
        }
    }

    #[async_trait]
    impl AsyncScope for Recorder {
        async fn enter(&self, _ctx: &ExecutionContext) {
            self.log.lock().push(format!("enter-{}", self.label));
        }

        async fn exit(&self, _ctx: &ExecutionContext) {
            self.log.lock().push(format!("exit-{}", self.label));
        }
    }
}
