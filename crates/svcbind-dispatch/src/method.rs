//! The two callable contracts a route can bind.

use std::marker::PhantomData;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde::Serialize;
use svcbind_binding::MethodArgument;
use svcbind_protocol::{MethodContext, MethodReply};

/// A method with a data result: `Ok(value)` is serialized into the response.
///
/// Object-bound methods implement this directly; plain functions go through
/// [`method_fn`].
#[async_trait]
pub trait ServiceMethod: Send + Sync + 'static {
    type Argument: MethodArgument;
    type Output: Serialize + Send + 'static;

    async fn call(
        &self,
        ctx: &mut MethodContext,
        argument: &mut Self::Argument,
    ) -> MethodReply<Self::Output>;
}

/// A method that writes its own response through the context. `Ok(())`
/// means the context already holds the response to send.
#[async_trait]
pub trait PassthroughMethod: Send + Sync + 'static {
    type Argument: MethodArgument;

    async fn call(
        &self,
        ctx: &mut MethodContext,
        argument: &mut Self::Argument,
    ) -> MethodReply<()>;
}

/// [`ServiceMethod`] over a plain function.
pub struct MethodFn<F, A, O> {
    f: F,
    _marker: PhantomData<fn(A) -> O>,
}

/// Adapts a function such as
///
/// ```ignore
/// fn greet<'a>(
///     ctx: &'a mut MethodContext,
///     args: &'a mut Greeting,
/// ) -> BoxFuture<'a, MethodReply<String>> {
///     async move { MethodReply::Ok(format!("hello {}", args.name)) }.boxed()
/// }
/// ```
pub fn method_fn<F, A, O>(f: F) -> MethodFn<F, A, O>
where
    F: for<'a> Fn(&'a mut MethodContext, &'a mut A) -> BoxFuture<'a, MethodReply<O>>
        + Send
        + Sync
        + 'static,
    A: MethodArgument,
    O: Serialize + Send + 'static,
{
    MethodFn {
        f,
        _marker: PhantomData,
    }
}

#[async_trait]
impl<F, A, O> ServiceMethod for MethodFn<F, A, O>
where
    F: for<'a> Fn(&'a mut MethodContext, &'a mut A) -> BoxFuture<'a, MethodReply<O>>
        + Send
        + Sync
        + 'static,
    A: MethodArgument,
    O: Serialize + Send + 'static,
{
    type Argument = A;
    type Output = O;

    async fn call(&self, ctx: &mut MethodContext, argument: &mut A) -> MethodReply<O> {
        (self.f)(ctx, argument).await
    }
}

/// [`PassthroughMethod`] over a plain function.
pub struct PassthroughFn<F, A> {
    f: F,
    _marker: PhantomData<fn(A)>,
}

pub fn passthrough_fn<F, A>(f: F) -> PassthroughFn<F, A>
where
    F: for<'a> Fn(&'a mut MethodContext, &'a mut A) -> BoxFuture<'a, MethodReply<()>>
        + Send
        + Sync
        + 'static,
    A: MethodArgument,
{
    PassthroughFn {
        f,
        _marker: PhantomData,
    }
}

#[async_trait]
impl<F, A> PassthroughMethod for PassthroughFn<F, A>
where
    F: for<'a> Fn(&'a mut MethodContext, &'a mut A) -> BoxFuture<'a, MethodReply<()>>
        + Send
        + Sync
        + 'static,
    A: MethodArgument,
{
    type Argument = A;

    async fn call(&self, ctx: &mut MethodContext, argument: &mut A) -> MethodReply<()> {
        (self.f)(ctx, argument).await
    }
}
