//! Per-route request handling: bind, invoke, shape, record.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request};
use axum::response::Response;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde::Serialize;
use svcbind_binding::{ArgumentResolver, MethodArgument, ResolveOptions, Resolved, SchemaRules};
use svcbind_protocol::{MethodCallRecorder, MethodContext, MethodReply, RequestDeadline};
use tracing::{Instrument, debug, error, info_span, warn};

use crate::descriptor::{DispatchConfig, MethodDescriptor, ResultArity};
use crate::method::{PassthroughMethod, ServiceMethod};
use crate::{shaper, telemetry};

/// State shared by every route of one router.
pub(crate) struct DispatchRuntime {
    pub config: DispatchConfig,
    pub resolver: ArgumentResolver,
    pub recorder: Arc<dyn MethodCallRecorder>,
}

/// Both method traits seen through one interface.
pub(crate) trait Contract: Send + Sync + 'static {
    type Argument: MethodArgument;
    type Output: Serialize + Send + 'static;

    const ARITY: ResultArity;

    fn invoke<'a>(
        &'a self,
        ctx: &'a mut MethodContext,
        argument: &'a mut Self::Argument,
    ) -> BoxFuture<'a, MethodReply<Self::Output>>;
}

pub(crate) struct DataContract<M>(pub M);

impl<M: ServiceMethod> Contract for DataContract<M> {
    type Argument = M::Argument;
    type Output = M::Output;

    const ARITY: ResultArity = ResultArity::Two;

    fn invoke<'a>(
        &'a self,
        ctx: &'a mut MethodContext,
        argument: &'a mut Self::Argument,
    ) -> BoxFuture<'a, MethodReply<Self::Output>> {
        self.0.call(ctx, argument)
    }
}

pub(crate) struct PassthroughContract<M>(pub M);

impl<M: PassthroughMethod> Contract for PassthroughContract<M> {
    type Argument = M::Argument;
    type Output = ();

    const ARITY: ResultArity = ResultArity::One;

    fn invoke<'a>(
        &'a self,
        ctx: &'a mut MethodContext,
        argument: &'a mut Self::Argument,
    ) -> BoxFuture<'a, MethodReply<()>> {
        self.0.call(ctx, argument)
    }
}

/// Type-erased route entry stored by the router.
pub(crate) trait RouteHandler: Send + Sync {
    fn descriptor(&self) -> &MethodDescriptor;

    fn serve(
        self: Arc<Self>,
        runtime: Arc<DispatchRuntime>,
        request: Request,
        path_params: Vec<(String, String)>,
    ) -> BoxFuture<'static, Response>;
}

pub(crate) struct Endpoint<C> {
    contract: C,
    descriptor: MethodDescriptor,
    rules: Option<SchemaRules>,
}

impl<C: Contract> Endpoint<C> {
    pub fn new(contract: C, descriptor: MethodDescriptor, rules: Option<SchemaRules>) -> Self {
        Self {
            contract,
            descriptor,
            rules,
        }
    }

    async fn handle(
        &self,
        runtime: &DispatchRuntime,
        request: Request,
        path_params: &[(String, String)],
    ) -> Response {
        let options = &self.descriptor.options;
        let request_headers = request.headers().clone();
        let remote_addr = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        let deadline = request.extensions().get::<RequestDeadline>().copied();
        let extensions = request.extensions().clone();

        let resolved = runtime
            .resolver
            .resolve::<C::Argument>(
                request,
                path_params,
                ResolveOptions {
                    bypass_request_body: options.bypass_request_body,
                    file_upload: options.file_upload,
                    max_body_bytes: runtime.config.max_body_bytes,
                    rules: self.rules.as_ref(),
                },
            )
            .await;
        let Resolved {
            mut argument,
            unread_body,
        } = match resolved {
            Ok(resolved) => resolved,
            Err(failure) => {
                warn!(error = %failure, "argument binding failed");
                return shaper::binding_failure(&failure);
            }
        };

        let mut ctx = MethodContext::new(request_headers)
            .with_remote_addr(remote_addr)
            .with_deadline(deadline)
            .with_request_body(unread_body);
        shaper::apply_default_headers(ctx.response_headers_mut());

        let (outcome, timing) =
            svcbind_sandbox::invoke(self.contract.invoke(&mut ctx, &mut argument)).await;
        let shaped = shaper::shape(outcome, C::ARITY, options.bypass_response_body, ctx);
        debug!(payload = %shaped.payload, "call shaped");

        let response = match telemetry::record_call(
            runtime.recorder.as_ref(),
            &extensions,
            &argument,
            &shaped.payload,
            &timing,
        ) {
            Ok(()) => shaped.response,
            Err(fault) => {
                error!(error = %fault, "call telemetry failed");
                shaper::serialization_fault(&fault)
            }
        };

        let status = response.status().as_u16();
        let duration_secs = timing.duration.as_secs_f64();
        if response.status().is_server_error() {
            error!(status, duration_secs, "method call failed");
        } else if response.status().is_client_error() {
            warn!(status, duration_secs, "method call rejected");
        } else {
            debug!(status, duration_secs, "method call completed");
        }
        response
    }
}

impl<C: Contract> RouteHandler for Endpoint<C> {
    fn descriptor(&self) -> &MethodDescriptor {
        &self.descriptor
    }

    fn serve(
        self: Arc<Self>,
        runtime: Arc<DispatchRuntime>,
        request: Request,
        path_params: Vec<(String, String)>,
    ) -> BoxFuture<'static, Response> {
        let span = info_span!(
            "service.call",
            route = %self.descriptor.route,
            argument = self.descriptor.argument_type,
        );
        async move { self.handle(&runtime, request, &path_params).await }
            .instrument(span)
            .boxed()
    }
}
