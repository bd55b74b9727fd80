//! # Braze
//!
//! An event-driven chat-bot runtime with dependency injection for Rust.
//!
//! ## Overview
//!
//! Braze turns a polled chat service into a stream of typed events and
//! dispatches each one to async handler functions. Handlers declare what
//! they need through their parameters (the typed body, the sender's
//! profile, resolved dependencies) and through per-handler dependency
//! descriptors, which the executor resolves recursively with memoization
//! and scoped setup/teardown.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐     ┌───────┐     ┌────────────┐     ┌──────────────────┐
//! │ Ingestor │────▶│ queue │────▶│ Dispatcher │────▶│ Executor per     │
//! │ (source  │     │(FIFO) │     │   loop     │────▶│ (handler, event) │
//! │  polling)│     └───────┘     └────────────┘────▶│ deps → scopes →  │
//! └──────────┘                                      │ handler body     │
//!                                                   └──────────────────┘
//! ```
//!
//! - **Ingestor**: polls the [`EventSource`](braze_runtime::EventSource),
//!   deduplicates by per-conversation offset, enriches sender/group
//!   metadata, publishes envelopes
//! - **Dispatcher**: fans each envelope out to its registered handlers,
//!   one spawned task per entry
//! - **Executor**: resolves dependency graphs, memoizes cacheable results,
//!   brackets the body in scoped resources, contains every failure
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use braze::prelude::*;
//!
//! async fn echo(msg: Body<Message>, sender: Sender, bot: BoxedBot) {
//!     if let Some(text) = msg.plain_text() {
//!         println!("{}: {}", sender.uname, text);
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> braze::runtime::RuntimeResult<()> {
//!     let runtime = BrazeRuntime::builder()
//!         .source(my_source())
//!         .build()?;
//!
//!     runtime.on(EventKind::Message).handler(echo);
//!     runtime.run().await
//! }
//! ```

pub use braze_core as core;
pub use braze_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use braze::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use braze_runtime::{BrazeConfig, BrazeRuntime, RuntimeBuilder};

    // Event system - envelopes and canonical names
    pub use braze_core::envelope::{Envelope, EventKind, EventName};
    pub use braze_core::model::{BotMessage, Message, MessageRecall};

    // Extractors - for handler parameters
    pub use braze_core::extract::{Body, Dep, Extra, FromContext, Sender};

    // Dependency descriptors and scoped resources
    pub use braze_core::depend::Depend;
    pub use braze_core::scoped::{AsyncScope, Scoped, SyncScope};

    // Bot handle types
    pub use braze_core::context::{Bot, BoxedBot};

    // Source collaborator seam
    pub use braze_runtime::{ConversationUpdate, Delivery, EventSource};
}
