//! Bot instance, registration surface, and run orchestration.
//!
//! [`BrazeRuntime`] owns everything with instance scope: the handler
//! registry, the executor and its memo store, the lifecycle tables, the
//! queue endpoints, the profile caches, and the optional event source.
//! Nothing lives in globals; two runtimes in one process do not share
//! state.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use braze_runtime::BrazeRuntime;
//!
//! // Auto-loads braze.toml / BRAZE_* env from the current directory
//! let runtime = BrazeRuntime::new();
//!
//! runtime.on("Message").handler(my_handler);
//! runtime.run().await?;
//! ```

use std::any::Any;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::signal;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use braze_core::context::{Bot, BoxedBot, TypeMap};
use braze_core::depend::Depend;
use braze_core::envelope::{Envelope, EventName};
use braze_core::executor::Executor;
use braze_core::handler::Handler;
use braze_core::memo::MemoStore;
use braze_core::model::{GroupProfile, ProfileCache, UserProfile};
use braze_core::registry::{HandlerEntry, Registry};
use braze_core::scoped::Scoped;

use crate::config::{self, BrazeConfig};
use crate::dispatch::DispatchLoop;
use crate::error::{RuntimeError, RuntimeResult};
use crate::ingest::{EventSource, Ingestor};
use crate::lifecycle::{Lifecycle, Phase, run_hooks};
use crate::logging;

/// The bot instance handed to handlers, hooks, and the ingestion loop.
///
/// Handlers receive it as a [`BoxedBot`] or downcast to `Arc<RuntimeBot>`.
pub struct RuntimeBot {
    users: ProfileCache<UserProfile>,
    groups: ProfileCache<GroupProfile>,
    tx: mpsc::UnboundedSender<Envelope>,
}

impl Bot for RuntimeBot {
    fn users(&self) -> &ProfileCache<UserProfile> {
        &self.users
    }

    fn groups(&self) -> &ProfileCache<GroupProfile> {
        &self.groups
    }

    fn publish(&self, envelope: Envelope) {
        // The receiving half may already be gone during shutdown.
        let _ = self.tx.send(envelope);
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// The runtime that orchestrates ingestion, dispatch, and lifecycle.
pub struct BrazeRuntime {
    bot: Arc<RuntimeBot>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<Envelope>>>,
    registry: Arc<RwLock<Registry>>,
    executor: Arc<Executor>,
    extras: TypeMap,
    lifecycle: Mutex<Lifecycle>,
    source: Option<Arc<dyn EventSource>>,
    config: BrazeConfig,
    global_dependencies: Vec<Depend>,
    global_middlewares: Vec<Scoped>,
}

impl BrazeRuntime {
    /// Creates a runtime with automatic configuration loading.
    ///
    /// Searches `braze.toml` in the current directory and `BRAZE_*`
    /// environment variables; falls back to defaults when loading fails.
    pub fn new() -> Self {
        let config = config::load().unwrap_or_else(|e| {
            eprintln!("Warning: Failed to load config ({e}), using defaults");
            BrazeConfig::default()
        });
        RuntimeBuilder::new().config(config).finish()
    }

    /// Creates a runtime builder for custom configuration.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Returns a reference to the configuration.
    pub fn config(&self) -> &BrazeConfig {
        &self.config
    }

    /// A shared handle to the bot instance.
    pub fn bot_handle(&self) -> BoxedBot {
        Arc::clone(&self.bot) as BoxedBot
    }

    /// Injects an envelope into the event queue.
    pub fn publish(&self, envelope: Envelope) {
        self.bot.publish(envelope);
    }

    /// Begins registering a handler under a canonical event name.
    ///
    /// ```rust,ignore
    /// runtime
    ///     .on(EventKind::Message)
    ///     .depend(auth_token())
    ///     .handler(reply);
    /// ```
    pub fn on(&self, name: impl Into<EventName>) -> On<'_> {
        On {
            runtime: self,
            name: name.into(),
            dependencies: Vec::new(),
            middlewares: Vec::new(),
        }
    }

    /// Registers a hook that runs before the loops start.
    pub fn on_start<F, Fut>(&self, hook: F) -> &Self
    where
        F: Fn(BoxedBot) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.lifecycle.lock().add(Phase::Start, hook);
        self
    }

    /// Registers a hook that runs after the loops stop.
    pub fn on_end<F, Fut>(&self, hook: F) -> &Self
    where
        F: Fn(BoxedBot) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.lifecycle.lock().add(Phase::End, hook);
        self
    }

    /// Registers a hook that runs on both edges of the run.
    pub fn on_around<F, Fut>(&self, hook: F) -> &Self
    where
        F: Fn(BoxedBot) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.lifecycle.lock().add(Phase::Around, hook);
        self
    }

    /// Runs until a shutdown signal is received (Ctrl+C or SIGTERM).
    pub async fn run(&self) -> RuntimeResult<()> {
        info!("Braze runtime is now running. Press Ctrl+C to stop.");
        self.run_until(wait_for_shutdown()).await
    }

    /// Runs until the given future resolves.
    ///
    /// Order: start hooks, around hooks, loops up, `shutdown` awaited,
    /// loops stopped and drained, around hooks, end hooks. The teardown
    /// hooks run even when a loop task failed.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        let rx = self
            .rx
            .lock()
            .take()
            .ok_or(RuntimeError::AlreadyRunning)?;
        let bot = self.bot_handle();

        let (start, around, end) = {
            let lifecycle = self.lifecycle.lock();
            (
                lifecycle.hooks(Phase::Start),
                lifecycle.hooks(Phase::Around),
                lifecycle.hooks(Phase::End),
            )
        };
        run_hooks(&start, Phase::Start, &bot).await;
        run_hooks(&around, Phase::Around, &bot).await;

        let cancel = CancellationToken::new();
        let ingest_handle = self.source.as_ref().map(|source| {
            let ingestor = Ingestor::new(
                Arc::clone(source),
                Arc::clone(&bot),
                self.config.poll_interval(),
            );
            tokio::spawn(ingestor.run(cancel.clone()))
        });
        let dispatch = DispatchLoop::new(
            rx,
            Arc::clone(&bot),
            Arc::clone(&self.registry),
            Arc::clone(&self.executor),
            self.extras.clone(),
            self.config.recv_timeout(),
        );
        let dispatch_handle = tokio::spawn(dispatch.run(cancel.clone()));

        shutdown.await;
        info!("Shutting down");
        cancel.cancel();

        if let Some(handle) = ingest_handle {
            if let Err(e) = handle.await {
                error!(error = %e, "Ingestion task failed");
            }
        }
        match dispatch_handle.await {
            Ok(tracker) => {
                // Scheduled executions are not cancelled; they get a
                // bounded grace period to finish.
                if timeout(self.config.drain_grace(), tracker.wait())
                    .await
                    .is_err()
                {
                    warn!("Drain grace expired with executions still in flight");
                }
            }
            Err(e) => error!(error = %e, "Dispatcher task failed"),
        }

        run_hooks(&around, Phase::Around, &bot).await;
        run_hooks(&end, Phase::End, &bot).await;

        Ok(())
    }
}

impl Default for BrazeRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Waits for shutdown signals (Ctrl+C or SIGTERM).
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to register SIGTERM handler");

        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
        info!("Received Ctrl+C, shutting down");
    }
}

/// In-progress handler registration.
///
/// Entry-specific dependencies and middlewares come first; the runtime's
/// globals are appended after them.
pub struct On<'a> {
    runtime: &'a BrazeRuntime,
    name: EventName,
    dependencies: Vec<Depend>,
    middlewares: Vec<Scoped>,
}

impl<'a> On<'a> {
    /// Adds an entry-specific dependency.
    pub fn depend(mut self, depend: Depend) -> Self {
        self.dependencies.push(depend);
        self
    }

    /// Adds an entry-specific scoped resource.
    pub fn middleware(mut self, scope: Scoped) -> Self {
        self.middlewares.push(scope);
        self
    }

    /// Registers the handler and completes the registration.
    pub fn handler<F, T>(self, handler: F) -> &'a BrazeRuntime
    where
        F: Handler<T> + Send + Sync + 'static,
        T: 'static,
    {
        let mut entry = HandlerEntry::new(handler);
        for depend in self.dependencies {
            entry = entry.depend(depend);
        }
        for scope in self.middlewares {
            entry = entry.middleware(scope);
        }
        entry.append_defaults(
            &self.runtime.global_dependencies,
            &self.runtime.global_middlewares,
        );
        self.runtime.registry.write().register(self.name, entry);
        self.runtime
    }
}

/// Builder for a [`BrazeRuntime`] with custom configuration.
///
/// ```rust,ignore
/// let runtime = BrazeRuntime::builder()
///     .source(BiliSource::new(credentials))
///     .global_dependency(auth_token())
///     .extra(AppState::new())
///     .build()?;
/// ```
pub struct RuntimeBuilder {
    config: Option<BrazeConfig>,
    source: Option<Arc<dyn EventSource>>,
    extras: TypeMap,
    global_dependencies: Vec<Depend>,
    global_middlewares: Vec<Scoped>,
}

impl RuntimeBuilder {
    /// Creates a new runtime builder.
    pub fn new() -> Self {
        Self {
            config: None,
            source: None,
            extras: TypeMap::new(),
            global_dependencies: Vec::new(),
            global_middlewares: Vec::new(),
        }
    }

    /// Uses a pre-loaded configuration instead of loading from disk/env.
    pub fn config(mut self, config: BrazeConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets the event source the ingestion loop polls.
    ///
    /// Without a source the runtime is publish-only, which is what tests
    /// and manual injection need.
    pub fn source<S: EventSource + 'static>(mut self, source: S) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Adds a value to the process-wide extra-parameters map.
    pub fn extra<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        self.extras.insert(value);
        self
    }

    /// Adds a dependency appended to every registered handler entry.
    pub fn global_dependency(mut self, depend: Depend) -> Self {
        self.global_dependencies.push(depend);
        self
    }

    /// Adds a scoped resource appended to every registered handler entry.
    pub fn global_middleware(mut self, scope: Scoped) -> Self {
        self.global_middlewares.push(scope);
        self
    }

    /// Builds the runtime, loading configuration when none was supplied.
    pub fn build(mut self) -> RuntimeResult<BrazeRuntime> {
        if self.config.is_none() {
            self.config = Some(config::load()?);
        }
        Ok(self.finish())
    }

    fn finish(self) -> BrazeRuntime {
        let config = self.config.unwrap_or_default();
        logging::init_from_config(&config.logging);

        let (tx, rx) = mpsc::unbounded_channel();
        let memo = MemoStore::with_capacity(config.memo_capacity);

        BrazeRuntime {
            bot: Arc::new(RuntimeBot {
                users: ProfileCache::new(),
                groups: ProfileCache::new(),
                tx,
            }),
            rx: Mutex::new(Some(rx)),
            registry: Arc::new(RwLock::new(Registry::new())),
            executor: Arc::new(Executor::with_memo(memo)),
            extras: self.extras,
            lifecycle: Mutex::new(Lifecycle::new()),
            source: self.source,
            config,
            global_dependencies: self.global_dependencies,
            global_middlewares: self.global_middlewares,
        }
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Bot that records published envelopes, for loop tests.
    #[derive(Default)]
    pub struct QueueBot {
        pub users: ProfileCache<UserProfile>,
        pub groups: ProfileCache<GroupProfile>,
        pub published: Mutex<Vec<Envelope>>,
    }

    impl Bot for QueueBot {
        fn users(&self) -> &ProfileCache<UserProfile> {
            &self.users
        }

        fn groups(&self) -> &ProfileCache<GroupProfile> {
            &self.groups
        }

        fn publish(&self, envelope: Envelope) {
            self.published.lock().push(envelope);
        }

        fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
            self
        }
    }

    pub fn queue_bot() -> Arc<QueueBot> {
        Arc::new(QueueBot::default())
    }
}
