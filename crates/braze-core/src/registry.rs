//! Handler registry.
//!
//! Maps canonical event names to the ordered list of handler entries
//! registered under them. Registration canonicalizes the name through
//! [`EventName`], the same rule the dispatcher applies at lookup time.

use std::collections::HashMap;
use std::fmt;

use crate::depend::Depend;
use crate::envelope::EventName;
use crate::handler::{BoxedHandler, Handler, into_handler};
use crate::scoped::Scoped;

/// One registered handler with its resolution chain.
#[derive(Clone)]
pub struct HandlerEntry {
    handler: BoxedHandler,
    dependencies: Vec<Depend>,
    middlewares: Vec<Scoped>,
}

impl HandlerEntry {
    /// Wraps an async handler function with no dependencies or middlewares.
    pub fn new<F, T>(handler: F) -> Self
    where
        F: Handler<T> + Send + Sync + 'static,
        T: 'static,
    {
        Self {
            handler: into_handler(handler),
            dependencies: Vec::new(),
            middlewares: Vec::new(),
        }
    }

    /// Appends a dependency to the resolution chain.
    pub fn depend(mut self, depend: Depend) -> Self {
        self.dependencies.push(depend);
        self
    }

    /// Appends a scoped resource around the handler invocation.
    pub fn middleware(mut self, scope: Scoped) -> Self {
        self.middlewares.push(scope);
        self
    }

    /// Appends process-wide defaults after the entry-specific lists.
    pub fn append_defaults(&mut self, dependencies: &[Depend], middlewares: &[Scoped]) {
        self.dependencies.extend_from_slice(dependencies);
        self.middlewares.extend_from_slice(middlewares);
    }

    /// The handler body.
    pub fn handler(&self) -> &BoxedHandler {
        &self.handler
    }

    /// The ordered dependency chain.
    pub fn dependencies(&self) -> &[Depend] {
        &self.dependencies
    }

    /// The scoped resources around the handler.
    pub fn middlewares(&self) -> &[Scoped] {
        &self.middlewares
    }
}

impl fmt::Debug for HandlerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerEntry")
            .field("dependencies", &self.dependencies.len())
            .field("middlewares", &self.middlewares.len())
            .finish()
    }
}

/// Insertion-ordered mapping from event name to handler entries.
#[derive(Default)]
pub struct Registry {
    entries: HashMap<EventName, Vec<HandlerEntry>>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry under the canonicalized name.
    pub fn register(&mut self, name: impl Into<EventName>, entry: HandlerEntry) {
        self.entries.entry(name.into()).or_default().push(entry);
    }

    /// The ordered entries for a name; empty when none are registered.
    pub fn handlers_for(&self, name: &EventName) -> &[HandlerEntry] {
        self.entries.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All names with at least one registered handler.
    pub fn registered_names(&self) -> impl Iterator<Item = &EventName> {
        self.entries.keys()
    }

    /// Total number of registered entries across all names.
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    /// Whether anything is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("names", &self.entries.len())
            .field("entries", &self.len())
            .finish()
    }
}
