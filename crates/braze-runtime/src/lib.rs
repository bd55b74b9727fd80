//! # Braze Runtime
//!
//! Orchestration for the Braze bot framework: the ingestion loop that
//! polls an [`EventSource`], the FIFO event queue and its dispatcher
//! loop, the lifecycle hook tables, configuration, and logging setup.
//!
//! ```text
//! ┌─────────────┐  publish  ┌────────┐  recv   ┌────────────┐
//! │  Ingestor   │──────────▶│ queue  │────────▶│ Dispatcher │──▶ spawned
//! │ (EventSource│           │ (mpsc) │         │   loop     │    executions
//! │   polling)  │           └────────┘         └────────────┘
//! └─────────────┘
//! ```
//!
//! The entry point is [`BrazeRuntime`]: build it, register handlers with
//! `runtime.on(name)`, and call `run()`.

pub mod bot;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod ingest;
pub mod lifecycle;
pub mod logging;

pub use bot::{BrazeRuntime, On, RuntimeBot, RuntimeBuilder};
pub use config::{BrazeConfig, LogFormat, LoggingConfig};
pub use dispatch::DispatchLoop;
pub use error::{RuntimeError, RuntimeResult};
pub use ingest::{
    ConversationKey, ConversationUpdate, Delivery, EventSource, Ingestor, OffsetTracker,
    SourceError, SourceResult,
};
pub use lifecycle::{Hook, Lifecycle, Phase};
pub use logging::LoggingBuilder;
