//! Error types for the Braze execution engine.

use thiserror::Error;

/// Errors raised while wiring a handler invocation together.
///
/// These are distinct from a dependency *failing at runtime*: a failing
/// dependency is represented by the [`Outcome::Aborted`](crate::executor::Outcome)
/// sentinel and never surfaces as an error. `ExecError` covers the
/// mis-wiring cases that are fatal to a single invocation.
#[derive(Debug, Clone, Error)]
pub enum ExecError {
    /// A dependency provider declined to expose its call target.
    #[error("dependency provider did not expose a call target")]
    NotCallable,

    /// A handler parameter could not be bound from the event context.
    #[error("cannot bind argument '{name}' for this event")]
    UnboundArgument {
        /// Name of the parameter binding that failed.
        name: &'static str,
    },

    /// A handler parameter type has no binding and no extra-parameter entry.
    #[error("no binding available for parameter type '{name}'")]
    UnboundAnnotation {
        /// Type name of the unbound parameter.
        name: &'static str,
    },

    /// The dependency descriptor graph contains a cycle.
    #[error("dependency cycle detected while resolving descriptor graph")]
    DependencyCycle,
}

/// Result type for execution wiring operations.
pub type ExecResult<T> = Result<T, ExecError>;

/// A type-erased error produced by a dependency or handler body.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
