//! Event envelopes and canonical event names.
//!
//! Every occurrence delivered through the queue is an [`Envelope`]: an
//! immutable pair of a canonical [`EventName`] and an opaque typed body.
//! The envelope is produced once by ingestion and shared read-only by all
//! handlers matched to it.
//!
//! # Canonicalization
//!
//! Handlers may be registered under an [`EventKind`] variant or a plain
//! string. Both collapse to the same [`EventName`], and the dispatcher
//! derives the lookup name through the same rule, so a handler registered
//! under `EventKind::Message` matches an envelope whose body reports the
//! name `"Message"`.

use std::any::Any;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use crate::model::ReceiverKind;

/// The built-in event kinds produced by the ingestion pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// An incoming chat message.
    Message,
    /// A message sent by the bot itself.
    BotMessage,
    /// A message recall notice.
    MessageRecall,
}

impl EventKind {
    /// Returns the canonical textual identity of this kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            EventKind::Message => "Message",
            EventKind::BotMessage => "BotMessage",
            EventKind::MessageRecall => "MessageRecall",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The canonical, comparable name of an event.
///
/// This is the single currency used for registration and dispatch lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventName(Cow<'static, str>);

impl EventName {
    /// Returns the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<EventKind> for EventName {
    fn from(kind: EventKind) -> Self {
        EventName(Cow::Borrowed(kind.as_str()))
    }
}

impl From<&'static str> for EventName {
    fn from(name: &'static str) -> Self {
        EventName(Cow::Borrowed(name))
    }
}

impl From<String> for EventName {
    fn from(name: String) -> Self {
        EventName(Cow::Owned(name))
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An opaque typed event body.
///
/// Payloads are produced by the ingestion collaborator and carried through
/// the queue without the core inspecting their domain fields. The trait
/// exposes only what the pipeline itself needs: the canonical name, and the
/// sender/receiver identities used for metadata enrichment.
pub trait Payload: Any + Send + Sync {
    /// The canonical name this payload dispatches under.
    fn event_name(&self) -> EventName;

    /// The numeric id of the sending user, when the event has one.
    fn sender_id(&self) -> Option<i64> {
        None
    }

    /// The receiver of the event, when the event has one.
    fn receiver(&self) -> Option<(ReceiverKind, i64)> {
        None
    }

    /// Returns a reference to self as `Any` for downcasting.
    fn as_any(&self) -> &dyn Any;
}

/// A payload with a statically known canonical name.
///
/// This is what typed extraction ([`Body<T>`](crate::extract::Body)) keys on:
/// the envelope's resolved name must equal `T::NAME` before the downcast is
/// attempted.
pub trait TypedPayload: Payload + Sized {
    /// The canonical name shared by all values of this payload type.
    const NAME: &'static str;
}

/// One normalized occurrence delivered through the queue.
///
/// Cheap to clone; the body is shared behind an `Arc` and no handler may
/// mutate it for others.
#[derive(Clone)]
pub struct Envelope {
    name: EventName,
    body: Arc<dyn Payload>,
}

impl Envelope {
    /// Wraps a payload, deriving the canonical name from the body itself.
    pub fn new<P: Payload>(body: P) -> Self {
        Self::from_arc(Arc::new(body))
    }

    /// Wraps an already-shared payload.
    pub fn from_arc(body: Arc<dyn Payload>) -> Self {
        Self {
            name: body.event_name(),
            body,
        }
    }

    /// The canonical name of this event.
    pub fn name(&self) -> &EventName {
        &self.name
    }

    /// The opaque body.
    pub fn body(&self) -> &Arc<dyn Payload> {
        &self.body
    }

    /// Attempts to downcast the body to a concrete payload type.
    pub fn downcast_ref<P: Payload>(&self) -> Option<&P> {
        self.body.as_any().downcast_ref()
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("name", &self.name)
            .finish()
    }
}
