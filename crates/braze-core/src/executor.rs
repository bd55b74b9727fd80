//! The execution engine.
//!
//! [`Executor::execute`] drives one scheduled handler execution: it resolves
//! the entry's dependency chain in order (recursively, with cycle
//! detection), memoizes cacheable targets through the [`MemoStore`], stashes
//! resolved values for parameter extraction, brackets the handler body in
//! its scoped resources, and contains every failure so nothing escapes to
//! the dispatcher.
//!
//! # Failure containment
//!
//! Three failure classes end an execution, all collapsing to
//! [`Outcome::Aborted`]:
//!
//! - a dependency target failing at runtime (logged where it happens, then
//!   short-circuits the rest of the chain and the handler body),
//! - a wiring error ([`ExecError`]): unresolvable target, unbound
//!   parameter, or a cyclic descriptor graph,
//! - a panic in the handler body (caught and logged).

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::{debug, error};

use crate::context::ExecutionContext;
use crate::depend::{Depend, DependId};
use crate::error::{ExecError, ExecResult};
use crate::memo::{DependOutcome, MemoStore};
use crate::registry::HandlerEntry;
use crate::scoped::{ExitStack, bracket_order};

/// The result of one scheduled handler execution.
///
/// `Aborted` is the failure sentinel: the execution produced no effect. The
/// dispatcher treats it as unremarkable, never as a crash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The handler body ran to completion.
    Completed,
    /// The chain or the handler failed; the execution had no effect.
    Aborted,
}

/// Resolves dependency graphs and invokes handlers.
pub struct Executor {
    memo: MemoStore,
}

impl Executor {
    /// Creates an executor with an unbounded memo store.
    pub fn new() -> Self {
        Self::with_memo(MemoStore::new())
    }

    /// Creates an executor over an explicitly configured memo store.
    pub fn with_memo(memo: MemoStore) -> Self {
        Self { memo }
    }

    /// The memoization store.
    pub fn memo(&self) -> &MemoStore {
        &self.memo
    }

    /// Runs one handler entry against one event context.
    pub async fn execute(&self, entry: &HandlerEntry, ctx: Arc<ExecutionContext>) -> Outcome {
        let mut visiting = Vec::new();
        for depend in entry.dependencies() {
            match self.resolve(depend, &ctx, &mut visiting).await {
                Ok(DependOutcome::Resolved(value)) => ctx.stash_dependency(value),
                Ok(DependOutcome::Aborted) => {
                    debug!(event = %ctx.envelope().name(), "dependency chain aborted");
                    return Outcome::Aborted;
                }
                Err(e) => {
                    error!(event = %ctx.envelope().name(), error = %e, "dependency chain mis-wired");
                    return Outcome::Aborted;
                }
            }
        }

        let mut scopes = ExitStack::new();
        for scope in bracket_order(entry.middlewares()) {
            scopes.enter(scope, &ctx).await;
        }

        let call = (entry.handler())(Arc::clone(&ctx));
        let result = AssertUnwindSafe(call).catch_unwind().await;

        // Scopes come down in reverse order on every exit path.
        scopes.release(&ctx).await;

        match result {
            Ok(Ok(())) => Outcome::Completed,
            Ok(Err(e)) => {
                error!(event = %ctx.envelope().name(), error = %e, "handler parameters could not be bound");
                Outcome::Aborted
            }
            Err(_) => {
                error!(event = %ctx.envelope().name(), "handler panicked");
                Outcome::Aborted
            }
        }
    }

    /// Resolves one descriptor, guarding against cycles in the graph.
    fn resolve<'a>(
        &'a self,
        depend: &'a Depend,
        ctx: &'a Arc<ExecutionContext>,
        visiting: &'a mut Vec<DependId>,
    ) -> BoxFuture<'a, ExecResult<DependOutcome>> {
        Box::pin(async move {
            let id = depend.id();
            if visiting.contains(&id) {
                return Err(ExecError::DependencyCycle);
            }
            visiting.push(id);
            let result = self.resolve_guarded(depend, ctx, visiting).await;
            visiting.pop();
            result
        })
    }

    fn resolve_guarded<'a>(
        &'a self,
        depend: &'a Depend,
        ctx: &'a Arc<ExecutionContext>,
        visiting: &'a mut Vec<DependId>,
    ) -> BoxFuture<'a, ExecResult<DependOutcome>> {
        Box::pin(async move {
            // Nested descriptors resolve first, through the same machinery.
            for nested in depend.dependencies() {
                match self.resolve(nested, ctx, visiting).await? {
                    DependOutcome::Resolved(value) => ctx.stash_dependency(value),
                    DependOutcome::Aborted => return Ok(DependOutcome::Aborted),
                }
            }

            let target = depend.resolve_target()?;

            // The descriptor's own scopes wrap every invocation, cache hit
            // or not; only the target call itself is memoized.
            let mut scopes = ExitStack::new();
            for scope in bracket_order(depend.middlewares()) {
                scopes.enter(scope, ctx).await;
            }

            let outcome = if depend.is_cached() {
                let id = depend.id();
                let key = depend.cache_key(ctx);
                let shared = self.memo.get_or_insert_with(id, key.clone(), || {
                    let ctx = Arc::clone(ctx);
                    Box::pin(async move {
                        match target(ctx).await {
                            Ok(value) => DependOutcome::Resolved(value),
                            Err(e) => {
                                error!(error = %e, "dependency failed, aborting chain");
                                DependOutcome::Aborted
                            }
                        }
                    })
                });
                let outcome = shared.await;
                if outcome.is_aborted() {
                    self.memo.evict(id, &key);
                }
                outcome
            } else {
                match target(Arc::clone(ctx)).await {
                    Ok(value) => DependOutcome::Resolved(value),
                    Err(e) => {
                        error!(error = %e, "dependency failed, aborting chain");
                        DependOutcome::Aborted
                    }
                }
            };

            scopes.release(ctx).await;
            Ok(outcome)
        })
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_support::mock_bot;
    use crate::depend::{Callable, DependFn};
    use crate::envelope::Envelope;
    use crate::error::BoxError;
    use crate::extract::Dep;
    use crate::model::Message;
    use crate::scoped::Scoped;
    use crate::scoped::test_support::Recorder;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn ctx() -> Arc<ExecutionContext> {
        Arc::new(ExecutionContext::new(
            Envelope::new(Message::text(1, 2, "hi")),
            mock_bot(),
        ))
    }

    fn counting_depend(counter: Arc<AtomicUsize>) -> Depend {
        Depend::new(move |_ctx| {
            let counter = Arc::clone(&counter);
            async move { Ok::<_, BoxError>(counter.fetch_add(1, Ordering::SeqCst)) }
        })
    }

    fn failing_depend() -> Depend {
        Depend::new(|_ctx| async { Err::<usize, BoxError>("boom".into()) })
    }

    async fn noop() {}

    #[tokio::test]
    async fn resolved_value_reaches_the_handler() {
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);

        let entry = HandlerEntry::new(move |value: Dep<usize>| {
            let seen = Arc::clone(&seen_clone);
            async move {
                seen.lock().push(*value.0);
            }
        })
        .depend(counting_depend(counter));

        let executor = Executor::new();
        assert_eq!(executor.execute(&entry, ctx()).await, Outcome::Completed);
        assert_eq!(*seen.lock(), vec![0]);
    }

    #[tokio::test]
    async fn cached_dependency_body_runs_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let entry = HandlerEntry::new(noop).depend(counting_depend(Arc::clone(&counter)).cached());

        let executor = Executor::new();
        assert_eq!(executor.execute(&entry, ctx()).await, Outcome::Completed);
        assert_eq!(executor.execute(&entry, ctx()).await, Outcome::Completed);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_executions_coalesce_on_the_cache() {
        let counter = Arc::new(AtomicUsize::new(0));
        let slow = Depend::new(move |_ctx| {
            let counter = Arc::clone(&counter);
            async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok::<_, BoxError>(counter.fetch_add(1, Ordering::SeqCst))
            }
        })
        .cached();

        let entry = HandlerEntry::new(noop).depend(slow);
        let executor = Executor::new();
        let (a, b) = tokio::join!(executor.execute(&entry, ctx()), executor.execute(&entry, ctx()));
        assert_eq!((a, b), (Outcome::Completed, Outcome::Completed));
        assert_eq!(executor.memo().len(), 1);
    }

    #[tokio::test]
    async fn sentinel_short_circuits_the_chain() {
        let later = Arc::new(AtomicUsize::new(0));
        let handler_runs = Arc::new(AtomicUsize::new(0));
        let handler_runs_clone = Arc::clone(&handler_runs);

        let entry = HandlerEntry::new(move || {
            let runs = Arc::clone(&handler_runs_clone);
            async move {
                runs.fetch_add(1, Ordering::SeqCst);
            }
        })
        .depend(failing_depend())
        .depend(counting_depend(Arc::clone(&later)));

        let executor = Executor::new();
        assert_eq!(executor.execute(&entry, ctx()).await, Outcome::Aborted);
        assert_eq!(later.load(Ordering::SeqCst), 0);
        assert_eq!(handler_runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_cached_dependency_is_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = Arc::clone(&attempts);
        let flaky = Depend::new(move |_ctx| {
            let attempts = Arc::clone(&attempts_clone);
            async move {
                if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err::<usize, BoxError>("first try fails".into())
                } else {
                    Ok(7)
                }
            }
        })
        .cached();

        let entry = HandlerEntry::new(noop).depend(flaky);
        let executor = Executor::new();
        assert_eq!(executor.execute(&entry, ctx()).await, Outcome::Aborted);
        assert_eq!(executor.execute(&entry, ctx()).await, Outcome::Completed);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cycle_in_descriptor_graph_aborts() {
        let ran = Arc::new(AtomicUsize::new(0));
        let mut depend = counting_depend(Arc::clone(&ran));
        depend = depend.clone().requires(depend);

        let entry = HandlerEntry::new(noop).depend(depend);
        let executor = Executor::new();
        assert_eq!(executor.execute(&entry, ctx()).await, Outcome::Aborted);
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn declining_provider_aborts() {
        struct Declines;
        impl Callable for Declines {
            fn call_target(&self) -> Option<DependFn> {
                None
            }
        }

        let entry = HandlerEntry::new(noop).depend(Depend::provider(Declines));
        let executor = Executor::new();
        assert_eq!(executor.execute(&entry, ctx()).await, Outcome::Aborted);
    }

    #[tokio::test]
    async fn scopes_release_in_reverse_even_on_binding_failure() {
        let log = Arc::new(Mutex::new(Vec::new()));

        // The handler wants a dependency value nothing provides, so the
        // body never runs, but the scopes must still come down in reverse.
        let entry = HandlerEntry::new(|_missing: Dep<String>| async {})
            .middleware(Scoped::synchronous(Recorder {
                label: "sync",
                log: Arc::clone(&log),
            }))
            .middleware(Scoped::asynchronous(Recorder {
                label: "async",
                log: Arc::clone(&log),
            }));

        let executor = Executor::new();
        assert_eq!(executor.execute(&entry, ctx()).await, Outcome::Aborted);
        assert_eq!(
            *log.lock(),
            vec!["enter-async", "enter-sync", "exit-sync", "exit-async"]
        );
    }

    #[tokio::test]
    async fn depend_scopes_wrap_every_invocation_including_cache_hits() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let counter = Arc::new(AtomicUsize::new(0));
        let depend = counting_depend(counter.clone())
            .cached()
            .middleware(Scoped::synchronous(Recorder {
                label: "dep",
                log: Arc::clone(&log),
            }));

        let entry = HandlerEntry::new(noop).depend(depend);
        let executor = Executor::new();
        executor.execute(&entry, ctx()).await;
        executor.execute(&entry, ctx()).await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(log.lock().len(), 4); // two enter/exit pairs
    }

    #[tokio::test]
    async fn handler_panic_is_contained() {
        let entry = HandlerEntry::new(|| async {
            panic!("unhappy handler");
            #[allow(unreachable_code)]
            ()
        });
        let executor = Executor::new();
        assert_eq!(executor.execute(&entry, ctx()).await, Outcome::Aborted);
    }

    #[tokio::test]
    async fn nested_requirements_resolve_before_the_target() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let order_inner = Arc::clone(&order);
        let inner = Depend::new(move |_ctx| {
            let order = Arc::clone(&order_inner);
            async move {
                order.lock().push("inner");
                Ok::<_, BoxError>(5u64)
            }
        });

        let order_outer = Arc::clone(&order);
        let outer = Depend::new(move |ctx: Arc<ExecutionContext>| {
            let order = Arc::clone(&order_outer);
            async move {
                order.lock().push("outer");
                let inner = ctx.dependency::<u64>().ok_or("inner missing")?;
                Ok::<_, BoxError>(*inner * 2)
            }
        })
        .requires(inner);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let entry = HandlerEntry::new(move |value: Dep<u64>| {
            let seen = Arc::clone(&seen_clone);
            async move {
                seen.lock().push(*value.0);
            }
        })
        .depend(outer);

        let executor = Executor::new();
        assert_eq!(executor.execute(&entry, ctx()).await, Outcome::Completed);
        assert_eq!(*order.lock(), vec!["inner", "outer"]);
        assert_eq!(*seen.lock(), vec![10]);
    }
}
