//! Handler abstraction.
//!
//! Handlers are async functions whose parameters implement
//! [`FromContext`](crate::extract::FromContext). The [`Handler`] trait is
//! blanket-implemented for functions of 0 to 8 such parameters, so the
//! trait bound itself enforces that a registered handler is an
//! asynchronous callable.
//!
//! ```rust,ignore
//! use braze_core::{Body, Dep, Sender};
//! use braze_core::model::Message;
//!
//! async fn greet(msg: Body<Message>, sender: Sender) {
//!     println!("{} said {:?}", sender.uname, msg.plain_text());
//! }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tracing::error;

use crate::context::ExecutionContext;
use crate::error::ExecResult;
use crate::extract::FromContext;

/// A trait for types that can be returned from a handler body.
#[async_trait]
pub trait HandleResponse: Send {
    /// Consumes the return value after the handler completes.
    async fn into_response(self, ctx: Arc<ExecutionContext>);
}

/// No response needed.
#[async_trait]
impl HandleResponse for () {
    async fn into_response(self, _ctx: Arc<ExecutionContext>) {}
}

/// On `Some`, the inner response is handled; on `None`, nothing happens.
#[async_trait]
impl<T: HandleResponse> HandleResponse for Option<T> {
    async fn into_response(self, ctx: Arc<ExecutionContext>) {
        if let Some(inner) = self {
            inner.into_response(ctx).await;
        }
    }
}

/// On `Ok`, the inner response is handled; on `Err`, the error is logged.
#[async_trait]
impl<T: HandleResponse, E: std::fmt::Display + Send> HandleResponse for Result<T, E> {
    async fn into_response(self, ctx: Arc<ExecutionContext>) {
        match self {
            Ok(inner) => inner.into_response(ctx).await,
            Err(e) => error!(error = %e, "handler returned an error"),
        }
    }
}

/// The core trait for event handlers.
///
/// `call` fails only on a binding error (a parameter that cannot be
/// extracted from the context); the handler body's own failures are
/// consumed by [`HandleResponse`].
#[async_trait]
pub trait Handler<T>: Clone + Send + Sync + 'static {
    /// Extracts the parameters and invokes the handler.
    async fn call(self, ctx: Arc<ExecutionContext>) -> ExecResult<()>;
}

/// A type-erased handler stored in the registry.
pub type BoxedHandler =
    Arc<dyn Fn(Arc<ExecutionContext>) -> BoxFuture<'static, ExecResult<()>> + Send + Sync>;

/// Converts a handler function into a boxed handler.
pub fn into_handler<F, T>(f: F) -> BoxedHandler
where
    F: Handler<T> + Send + Sync + 'static,
    T: 'static,
{
    Arc::new(move |ctx| f.clone().call(ctx))
}

macro_rules! impl_handler {
    (
        $($ty:ident),*
    ) => {
        #[allow(non_snake_case)]
        #[async_trait]
        impl<F, Fut, Res, $($ty,)*> Handler<($($ty,)*)> for F
        where
            F: FnOnce($($ty,)*) -> Fut + Clone + Send + Sync + 'static,
            Fut: Future<Output = Res> + Send + 'static,
            Res: HandleResponse + 'static,
            $( $ty: FromContext + Send + 'static, )*
        {
            async fn call(self, ctx: Arc<ExecutionContext>) -> ExecResult<()> {
                $(
                    let $ty = $ty::from_context(&ctx)?;
                )*

                let res = (self)($($ty,)*).await;
                res.into_response(ctx).await;
                Ok(())
            }
        }
    };
}

impl_handler!();
impl_handler!(T1);
impl_handler!(T1, T2);
impl_handler!(T1, T2, T3);
impl_handler!(T1, T2, T3, T4);
impl_handler!(T1, T2, T3, T4, T5);
impl_handler!(T1, T2, T3, T4, T5, T6);
impl_handler!(T1, T2, T3, T4, T5, T6, T7);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8);
