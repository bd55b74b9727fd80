//! Parameter extraction from the execution context.
//!
//! [`FromContext`] is the binding table for handler parameters: every type a
//! handler may declare resolves to a function of the execution context.
//! Bindings that depend on the event's resolved name fail with
//! [`ExecError::UnboundArgument`]; types with no binding at all fall back to
//! the extra-parameters map and fail with [`ExecError::UnboundAnnotation`]
//! when absent there too.

use std::any::type_name;
use std::ops::Deref;
use std::sync::Arc;

use crate::context::{Bot, BoxedBot, ExecutionContext, downcast_bot};
use crate::envelope::{Envelope, EventName, TypedPayload};
use crate::error::{ExecError, ExecResult};
use crate::model::UserProfile;

/// A trait for types that can be extracted from an [`ExecutionContext`].
pub trait FromContext: Sized {
    /// Attempts to extract this type from the given context.
    fn from_context(ctx: &ExecutionContext) -> ExecResult<Self>;
}

/// The whole envelope, for handlers that inspect events generically.
impl FromContext for Envelope {
    fn from_context(ctx: &ExecutionContext) -> ExecResult<Self> {
        Ok(ctx.envelope().clone())
    }
}

/// The canonicalized event type name.
impl FromContext for EventName {
    fn from_context(ctx: &ExecutionContext) -> ExecResult<Self> {
        Ok(ctx.envelope().name().clone())
    }
}

/// The whole bot instance as a trait object.
impl FromContext for BoxedBot {
    fn from_context(ctx: &ExecutionContext) -> ExecResult<Self> {
        Ok(ctx.bot_arc())
    }
}

/// The whole bot instance downcast to its concrete type.
impl<T: Bot + 'static> FromContext for Arc<T> {
    fn from_context(ctx: &ExecutionContext) -> ExecResult<Self> {
        downcast_bot(ctx.bot_arc()).ok_or(ExecError::UnboundAnnotation {
            name: type_name::<T>(),
        })
    }
}

/// An optional binding that never fails extraction.
impl<T: FromContext> FromContext for Option<T> {
    fn from_context(ctx: &ExecutionContext) -> ExecResult<Self> {
        Ok(T::from_context(ctx).ok())
    }
}

/// The typed event body.
///
/// Binds only when the envelope's resolved name equals the payload type's
/// canonical name; anything else is an unbound argument.
pub struct Body<T>(pub T);

impl<T> Deref for Body<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T: TypedPayload + Clone> FromContext for Body<T> {
    fn from_context(ctx: &ExecutionContext) -> ExecResult<Self> {
        let envelope = ctx.envelope();
        if envelope.name().as_str() != T::NAME {
            return Err(ExecError::UnboundArgument { name: T::NAME });
        }
        envelope
            .downcast_ref::<T>()
            .cloned()
            .map(Body)
            .ok_or(ExecError::UnboundArgument { name: T::NAME })
    }
}

/// The cached profile of the sending user.
pub struct Sender(pub Arc<UserProfile>);

impl Deref for Sender {
    type Target = UserProfile;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromContext for Sender {
    fn from_context(ctx: &ExecutionContext) -> ExecResult<Self> {
        let uid = ctx
            .envelope()
            .body()
            .sender_id()
            .ok_or(ExecError::UnboundArgument { name: "Sender" })?;
        ctx.bot()
            .users()
            .get(uid)
            .map(Sender)
            .ok_or(ExecError::UnboundArgument { name: "Sender" })
    }
}

/// A resolved dependency value, recovered by type.
pub struct Dep<T>(pub Arc<T>);

impl<T> Deref for Dep<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T: Send + Sync + 'static> FromContext for Dep<T> {
    fn from_context(ctx: &ExecutionContext) -> ExecResult<Self> {
        ctx.dependency::<T>()
            .map(Dep)
            .ok_or(ExecError::UnboundArgument {
                name: type_name::<T>(),
            })
    }
}

/// A value from the process-wide extra-parameters map.
pub struct Extra<T>(pub Arc<T>);

impl<T> Deref for Extra<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T: Send + Sync + 'static> FromContext for Extra<T> {
    fn from_context(ctx: &ExecutionContext) -> ExecResult<Self> {
        ctx.extra::<T>().map(Extra).ok_or(ExecError::UnboundAnnotation {
            name: type_name::<T>(),
        })
    }
}
