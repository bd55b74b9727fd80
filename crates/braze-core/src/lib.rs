//! # Braze Core
//!
//! The execution engine of the Braze bot framework.
//!
//! This crate provides the building blocks for event-driven handler
//! execution: the event envelope, dependency descriptors, parameter
//! extraction, the handler registry, and the executor that ties them
//! together.
//!
//! ## Execution Model
//!
//! Every published event becomes an [`Envelope`] carrying a canonical
//! [`EventName`] and a type-erased payload. The [`Registry`] maps names to
//! [`HandlerEntry`] values; for each entry the [`Executor`]:
//!
//! 1. resolves the entry's [`Depend`] chain in order, recursively, with
//!    memoization through the [`MemoStore`],
//! 2. enters the entry's [`Scoped`] resources (asynchronous first),
//! 3. binds handler parameters via [`FromContext`] and invokes the body,
//! 4. releases the scopes in reverse order, on every exit path.
//!
//! Failures never escape an execution: a failed dependency, a binding
//! error, or a panicking handler all collapse to [`Outcome::Aborted`],
//! which callers treat as "no effect".
//!
//! ```text
//! ┌──────────┐     ┌──────────┐     ┌───────────────────────────────┐
//! │ Envelope │────▶│ Registry │────▶│ Executor: deps → scopes → fn  │
//! └──────────┘     └──────────┘────▶│ Executor: deps → scopes → fn  │
//!                                   └───────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use braze_core::{Body, Depend, HandlerEntry, Registry, Sender};
//! use braze_core::model::Message;
//!
//! async fn greet(msg: Body<Message>, sender: Sender) {
//!     println!("{} said {:?}", sender.uname, msg.plain_text());
//! }
//!
//! let mut registry = Registry::new();
//! registry.register("Message", HandlerEntry::new(greet));
//! ```

pub mod context;
pub mod depend;
pub mod envelope;
pub mod error;
pub mod executor;
pub mod extract;
pub mod handler;
pub mod memo;
pub mod model;
pub mod registry;
pub mod scoped;

pub use context::{Bot, BoxedBot, ExecutionContext, TypeMap, downcast_bot};
pub use depend::{Callable, Depend, DependFn, DependId, DependResult, DependTarget, DependValue};
pub use envelope::{Envelope, EventKind, EventName, Payload, TypedPayload};
pub use error::{BoxError, ExecError, ExecResult};
pub use executor::{Executor, Outcome};
pub use extract::{Body, Dep, Extra, FromContext, Sender};
pub use handler::{BoxedHandler, HandleResponse, Handler, into_handler};
pub use memo::{DependOutcome, MemoStore};
pub use registry::{HandlerEntry, Registry};
pub use scoped::{AsyncScope, ExitStack, Scoped, SyncScope, bracket_order};

/// Prelude for common imports.
pub mod prelude {
    pub use super::context::{Bot, BoxedBot, ExecutionContext};
    pub use super::depend::Depend;
    pub use super::envelope::{Envelope, EventKind, EventName};
    pub use super::extract::{Body, Dep, Extra, FromContext, Sender};
    pub use super::registry::{HandlerEntry, Registry};
    pub use super::scoped::Scoped;
}
