//! Execution context shared by extractors, dependencies, and handlers.
//!
//! One [`ExecutionContext`] is created per scheduled handler execution. It
//! carries the envelope, a handle to the owning bot, the values produced by
//! resolved dependencies, and the process-wide extra-parameters map.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::depend::DependValue;
use crate::envelope::Envelope;
use crate::model::{GroupProfile, ProfileCache, UserProfile};

/// The runtime-facing surface of a bot instance.
///
/// Handlers receive the bot as a [`BoxedBot`] trait object (or downcast to
/// the concrete type via [`downcast_bot`]). The core only requires the
/// pieces its own pipeline touches: the metadata caches the ingestion loop
/// fills in, and the queue hand-off for publishing follow-up events.
pub trait Bot: Send + Sync {
    /// Cached user metadata, keyed by uid.
    fn users(&self) -> &ProfileCache<UserProfile>;

    /// Cached group metadata, keyed by group id.
    fn groups(&self) -> &ProfileCache<GroupProfile>;

    /// Publishes an envelope onto the bot's event queue.
    fn publish(&self, envelope: Envelope);

    /// Returns self as `Any` for downcasting to the concrete bot type.
    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// A shared, type-erased bot handle.
pub type BoxedBot = Arc<dyn Bot>;

/// Attempts to downcast a [`BoxedBot`] to its concrete type.
pub fn downcast_bot<T: Bot + 'static>(bot: BoxedBot) -> Option<Arc<T>> {
    bot.as_any().downcast().ok()
}

/// A small heterogeneous map keyed by value type.
#[derive(Clone, Default)]
pub struct TypeMap {
    entries: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl TypeMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value, replacing any previous value of the same type.
    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) {
        self.entries.insert(TypeId::of::<T>(), Arc::new(value));
    }

    /// Inserts an already-erased value keyed by its concrete type.
    pub fn insert_value(&mut self, value: Arc<dyn Any + Send + Sync>) {
        self.entries.insert((*value).type_id(), value);
    }

    /// Looks up a value by type.
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.entries
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|value| value.downcast().ok())
    }

    /// Number of stored values.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Per-execution state handed to every extractor and dependency target.
pub struct ExecutionContext {
    envelope: Envelope,
    bot: BoxedBot,
    resolved: Mutex<TypeMap>,
    extras: TypeMap,
}

impl ExecutionContext {
    /// Creates a context for one handler execution.
    pub fn new(envelope: Envelope, bot: BoxedBot) -> Self {
        Self::with_extras(envelope, bot, TypeMap::new())
    }

    /// Creates a context carrying a copy of the process-wide extras map.
    pub fn with_extras(envelope: Envelope, bot: BoxedBot, extras: TypeMap) -> Self {
        Self {
            envelope,
            bot,
            resolved: Mutex::new(TypeMap::new()),
            extras,
        }
    }

    /// The envelope being processed.
    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    /// The owning bot.
    pub fn bot(&self) -> &BoxedBot {
        &self.bot
    }

    /// A clone of the bot handle.
    pub fn bot_arc(&self) -> BoxedBot {
        Arc::clone(&self.bot)
    }

    /// Looks up a resolved dependency value by type.
    pub fn dependency<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.resolved.lock().get::<T>()
    }

    /// Looks up an extra parameter by type.
    pub fn extra<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.extras.get::<T>()
    }

    /// Stashes a dependency result for later extraction.
    pub(crate) fn stash_dependency(&self, value: DependValue) {
        self.resolved.lock().insert_value(value);
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("envelope", &self.envelope)
            .field("resolved", &self.resolved.lock().len())
            .field("extras", &self.extras.len())
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::mock_bot;
    use super::*;
    use crate::model::Message;

    #[test]
    fn type_map_stores_by_concrete_type() {
        let mut map = TypeMap::new();
        map.insert(7usize);
        map.insert("hello".to_string());
        assert_eq!(*map.get::<usize>().unwrap(), 7);
        assert_eq!(*map.get::<String>().unwrap(), "hello");
        assert!(map.get::<i64>().is_none());
    }

    #[test]
    fn erased_insert_keys_by_inner_type() {
        let mut map = TypeMap::new();
        let value: Arc<dyn Any + Send + Sync> = Arc::new(3u32);
        map.insert_value(value);
        assert_eq!(*map.get::<u32>().unwrap(), 3);
    }

    #[test]
    fn bot_downcast_round_trip() {
        let bot = mock_bot();
        let boxed: BoxedBot = bot;
        assert!(downcast_bot::<test_support::MockBot>(boxed).is_some());
    }

    #[test]
    fn context_exposes_extras_and_dependencies() {
        let mut extras = TypeMap::new();
        extras.insert(99u8);
        let ctx = ExecutionContext::with_extras(
            Envelope::new(Message::text(1, 2, "hi")),
            mock_bot(),
            extras,
        );
        assert_eq!(*ctx.extra::<u8>().unwrap(), 99);
        assert!(ctx.dependency::<u8>().is_none());
        ctx.stash_dependency(Arc::new(5i32));
        assert_eq!(*ctx.dependency::<i32>().unwrap(), 5);
    }
}
