//! Registration entry points and the axum router they produce.

use std::fmt;
use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::extract::rejection::RawPathParamsRejection;
use axum::extract::{RawPathParams, Request};
use axum::http::Method;
use axum::response::Response;
use axum::routing::{MethodFilter, MethodRouter};
use futures_util::future::BoxFuture;
use indexmap::IndexMap;
use svcbind_binding::{ArgumentResolver, BodyDecoder};
use svcbind_protocol::{MethodCallRecorder, NoopRecorder, RegistrationError};
use tracing::info;

use crate::descriptor::{DispatchConfig, MethodDescriptor, RouteKey, RouteOptions};
use crate::endpoint::{
    Contract, DataContract, DispatchRuntime, Endpoint, PassthroughContract, RouteHandler,
};
use crate::method::{PassthroughMethod, ServiceMethod};
use crate::prototype;

struct Route {
    filter: MethodFilter,
    handler: Arc<dyn RouteHandler>,
}

/// Collects bound methods and turns them into an [`axum::Router`].
///
/// Every registration is checked on the spot; a failing registration returns
/// a [`RegistrationError`] and nothing is installed.
pub struct ServiceRouter {
    config: DispatchConfig,
    resolver: ArgumentResolver,
    recorder: Arc<dyn MethodCallRecorder>,
    routes: IndexMap<RouteKey, Route>,
}

impl Default for ServiceRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ServiceRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRouter")
            .field("config", &self.config)
            .field("resolver", &self.resolver)
            .field("routes", &self.routes.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl ServiceRouter {
    pub fn new() -> Self {
        Self::with_config(DispatchConfig::default())
    }

    pub fn with_config(config: DispatchConfig) -> Self {
        Self {
            config,
            resolver: ArgumentResolver::default(),
            recorder: Arc::new(NoopRecorder),
            routes: IndexMap::new(),
        }
    }

    /// Replaces the no-op telemetry recorder.
    pub fn recorder(mut self, recorder: Arc<dyn MethodCallRecorder>) -> Self {
        self.recorder = recorder;
        self
    }

    /// Adds a body decoder next to the JSON and form decoders.
    pub fn decoder(mut self, decoder: impl BodyDecoder + 'static) -> Self {
        self.resolver = self.resolver.with_decoder(decoder);
        self
    }

    /// Binds a data-returning method.
    pub fn method<M: ServiceMethod>(
        self,
        verb: Method,
        path: &str,
        options: RouteOptions,
        method: M,
    ) -> Result<Self, RegistrationError> {
        self.register(verb, path, options, DataContract(method))
    }

    /// Binds a method that writes its own response.
    pub fn passthrough<M: PassthroughMethod>(
        self,
        verb: Method,
        path: &str,
        options: RouteOptions,
        method: M,
    ) -> Result<Self, RegistrationError> {
        self.register(verb, path, options, PassthroughContract(method))
    }

    fn register<C: Contract>(
        mut self,
        verb: Method,
        path: &str,
        options: RouteOptions,
        contract: C,
    ) -> Result<Self, RegistrationError> {
        let route = RouteKey::new(verb, path);
        if self.routes.contains_key(&route) {
            return Err(RegistrationError::DuplicateRoute {
                route: route.to_string(),
            });
        }
        let shape = prototype::path_shape(path);
        let conflicting = self
            .routes
            .keys()
            .any(|existing| existing.path != path && prototype::path_shape(&existing.path) == shape);
        if conflicting {
            return Err(RegistrationError::InvalidPath {
                path: path.to_owned(),
                reason: "captures conflict with a registered route",
            });
        }

        let prototype = prototype::check::<C::Argument, C::Output>(route.clone(), options, C::ARITY)?;
        info!(
            route = %route,
            argument = prototype.descriptor.argument_type,
            arity = prototype.descriptor.result_arity.count(),
            "method registered"
        );
        let handler = Endpoint::new(contract, prototype.descriptor, prototype.rules);
        self.routes.insert(
            route,
            Route {
                filter: prototype.filter,
                handler: Arc::new(handler),
            },
        );
        Ok(self)
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &MethodDescriptor> {
        self.routes.values().map(|route| route.handler.descriptor())
    }

    fn runtime(&self) -> Arc<DispatchRuntime> {
        Arc::new(DispatchRuntime {
            config: self.config,
            resolver: self.resolver.clone(),
            recorder: self.recorder.clone(),
        })
    }

    /// Installs every registered method. Routes sharing a path share one
    /// method router. Body size is governed by [`DispatchConfig`] alone, so
    /// axum's own default limit is lifted.
    pub fn into_router(self) -> Router {
        let runtime = self.runtime();
        let mut by_path: IndexMap<String, MethodRouter> = IndexMap::new();
        for (key, route) in self.routes {
            let methods = by_path
                .shift_remove(&key.path)
                .unwrap_or_else(MethodRouter::new);
            let handler = bind_handler(route.handler, runtime.clone());
            by_path.insert(key.path, methods.on(route.filter, handler));
        }
        by_path
            .into_iter()
            .fold(Router::new(), |router, (path, methods)| router.route(&path, methods))
            .layer(DefaultBodyLimit::disable())
    }
}

fn bind_handler(
    handler: Arc<dyn RouteHandler>,
    runtime: Arc<DispatchRuntime>,
) -> impl Fn(Result<RawPathParams, RawPathParamsRejection>, Request) -> BoxFuture<'static, Response>
+ Clone
+ Send
+ Sync
+ 'static {
    move |params: Result<RawPathParams, RawPathParamsRejection>, request: Request| {
        // A route without captures has no params to extract.
        let path_params: Vec<(String, String)> = params
            .map(|params| {
                params
                    .iter()
                    .map(|(name, value)| (name.to_owned(), value.to_owned()))
                    .collect()
            })
            .unwrap_or_default();
        handler.clone().serve(runtime.clone(), request, path_params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::header::{CONTENT_TYPE, X_CONTENT_TYPE_OPTIONS};
    use axum::http::{HeaderMap, HeaderValue, StatusCode};
    use futures_util::FutureExt;
    use serde::{Deserialize, Serialize};
    use serde_json::{Value, json};
    use svcbind_binding::{ArgumentSource, MethodArgument};
    use svcbind_protocol::telemetry::{METHOD_CALL_ARGUMENT, METHOD_CALL_RESPONSE_DATA};
    use svcbind_protocol::{
        BindingError, MethodContext, MethodReply, RequestDeadline, UploadedFiles,
    };
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    use crate::method::{method_fn, passthrough_fn};
    use crate::telemetry::tests::CollectingRecorder;

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Empty {}

    impl MethodArgument for Empty {
        fn bind(source: ArgumentSource) -> Result<Self, BindingError> {
            source.into_record()
        }
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Pick {
        #[serde(default)]
        value: String,
    }

    impl MethodArgument for Pick {
        fn bind(source: ArgumentSource) -> Result<Self, BindingError> {
            source.into_record()
        }
    }

    #[derive(Debug, Serialize, Deserialize)]
    #[allow(non_snake_case)]
    struct Required {
        A: i64,
    }

    impl MethodArgument for Required {
        fn bind(source: ArgumentSource) -> Result<Self, BindingError> {
            source.into_record()
        }
    }

    /// Returns the picked value; panics on `boom`.
    struct Echo {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ServiceMethod for Echo {
        type Argument = Pick;
        type Output = String;

        async fn call(&self, _ctx: &mut MethodContext, argument: &mut Pick) -> MethodReply<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if argument.value == "boom" {
                panic!("expected panic");
            }
            MethodReply::Ok(argument.value.clone())
        }
    }

    fn echo() -> (Echo, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Echo {
                calls: calls.clone(),
            },
            calls,
        )
    }

    fn forbidden<'a>(
        _ctx: &'a mut MethodContext,
        _argument: &'a mut Empty,
    ) -> BoxFuture<'a, MethodReply<Value>> {
        async { MethodReply::envelope(403, "forbidden", Value::Null) }.boxed()
    }

    fn failing<'a>(
        _ctx: &'a mut MethodContext,
        _argument: &'a mut Empty,
    ) -> BoxFuture<'a, MethodReply<Value>> {
        async { MethodReply::error(anyhow::anyhow!("expected error")) }.boxed()
    }

    fn increment<'a>(
        _ctx: &'a mut MethodContext,
        argument: &'a mut Required,
    ) -> BoxFuture<'a, MethodReply<Value>> {
        async move { MethodReply::Ok(json!({ "A": argument.A + 1 })) }.boxed()
    }

    fn total<'a>(
        _ctx: &'a mut MethodContext,
        argument: &'a mut Vec<i64>,
    ) -> BoxFuture<'a, MethodReply<i64>> {
        async move { MethodReply::Ok(argument.iter().sum()) }.boxed()
    }

    fn upload<'a>(
        ctx: &'a mut MethodContext,
        files: &'a mut UploadedFiles,
    ) -> BoxFuture<'a, MethodReply<()>> {
        async move {
            if files.is_empty() {
                return MethodReply::error(anyhow::anyhow!("no files"));
            }
            let names: Vec<_> = files.iter().map(|file| file.file_name.as_str()).collect();
            ctx.write(names.join(","));
            MethodReply::Ok(())
        }
        .boxed()
    }

    fn stream<'a>(
        ctx: &'a mut MethodContext,
        _argument: &'a mut Empty,
    ) -> BoxFuture<'a, MethodReply<()>> {
        async move {
            ctx.response_headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
            ctx.stream(Body::from("streamed"));
            MethodReply::Ok(())
        }
        .boxed()
    }

    fn raw_echo<'a>(
        ctx: &'a mut MethodContext,
        _argument: &'a mut Empty,
    ) -> BoxFuture<'a, MethodReply<()>> {
        async move {
            let Some(body) = ctx.take_request_body() else {
                return MethodReply::error(anyhow::anyhow!("body already consumed"));
            };
            match axum::body::to_bytes(body, 1024).await {
                Ok(bytes) => {
                    ctx.write(bytes);
                    MethodReply::Ok(())
                }
                Err(error) => MethodReply::error(error),
            }
        }
        .boxed()
    }

    fn context_snapshot<'a>(
        ctx: &'a mut MethodContext,
        _argument: &'a mut Empty,
    ) -> BoxFuture<'a, MethodReply<Value>> {
        async move {
            MethodReply::Ok(json!({
                "deadline": ctx.deadline().is_some(),
                "remote": ctx.remote_addr().map(|addr| addr.ip().to_string()),
                "agent": ctx.request_headers().get("user-agent").and_then(|v| v.to_str().ok()),
            }))
        }
        .boxed()
    }

    fn relabel_then_fail<'a>(
        ctx: &'a mut MethodContext,
        _argument: &'a mut Empty,
    ) -> BoxFuture<'a, MethodReply<()>> {
        async move {
            ctx.response_headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
            MethodReply::error(anyhow::anyhow!("expected error"))
        }
        .boxed()
    }

    /// Binds normally but refuses to serialize.
    #[derive(Debug, Deserialize)]
    struct Unserializable {
        #[serde(default)]
        value: String,
    }

    impl Serialize for Unserializable {
        fn serialize<S: serde::Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("refuses to serialize"))
        }
    }

    impl MethodArgument for Unserializable {
        fn bind(source: ArgumentSource) -> Result<Self, BindingError> {
            source.into_record()
        }
    }

    fn repeat<'a>(
        _ctx: &'a mut MethodContext,
        argument: &'a mut Unserializable,
    ) -> BoxFuture<'a, MethodReply<String>> {
        async move { MethodReply::Ok(argument.value.clone()) }.boxed()
    }

    fn upload_body(boundary: &str, file: &str) -> String {
        format!(
            "--{boundary}\r\n\
Content-Disposition: form-data; name=\"file\"; filename=\"big\"\r\n\
\r\n\
{file}\r\n\
--{boundary}--\r\n"
        )
    }

    struct Answer {
        status: StatusCode,
        headers: HeaderMap,
        body: Vec<u8>,
    }

    impl Answer {
        fn json(&self) -> Value {
            serde_json::from_slice(&self.body).unwrap()
        }
    }

    async fn dispatch(
        router: &ServiceRouter,
        verb: Method,
        path: &str,
        params: &[(&str, &str)],
        request: Request,
    ) -> Answer {
        let route = &router.routes[&RouteKey::new(verb, path)];
        let params = params
            .iter()
            .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
            .collect();
        let response = route
            .handler
            .clone()
            .serve(router.runtime(), request, params)
            .await;
        let (parts, body) = response.into_parts();
        let body = axum::body::to_bytes(body, usize::MAX).await.unwrap();
        Answer {
            status: parts.status,
            headers: parts.headers,
            body: body.to_vec(),
        }
    }

    fn json_request(uri: &str, body: &str) -> Request {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_owned()))
            .unwrap()
    }

    #[tokio::test]
    async fn invalid_json_never_invokes_the_method() {
        let (method, calls) = echo();
        let router = ServiceRouter::new()
            .method(Method::POST, "/echo", RouteOptions::new(), method)
            .unwrap();

        let answer = dispatch(&router, Method::POST, "/echo", &[], json_request("/echo", "{oops")).await;
        assert_eq!(answer.status, StatusCode::BAD_REQUEST);
        assert_eq!(answer.json()["msg"], "parse argument failed");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn malformed_query_is_a_bad_request() {
        let (method, calls) = echo();
        let router = ServiceRouter::new()
            .method(Method::POST, "/echo", RouteOptions::new(), method)
            .unwrap();

        let answer = dispatch(&router, Method::POST, "/echo", &[], json_request("/echo?value=%zz", "{}")).await;
        assert_eq!(answer.status, StatusCode::BAD_REQUEST);
        assert_eq!(answer.json()["msg"], "parse argument failed");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn path_beats_body_and_body_beats_query() {
        let (method, _) = echo();
        let router = ServiceRouter::new()
            .method(Method::POST, "/echo/{value}", RouteOptions::new(), method)
            .unwrap();

        let answer = dispatch(
            &router,
            Method::POST,
            "/echo/{value}",
            &[("value", "path")],
            json_request("/echo/path?value=query", r#"{"value": "body"}"#),
        )
        .await;
        assert_eq!(answer.json()["data"], "path");

        let answer = dispatch(
            &router,
            Method::POST,
            "/echo/{value}",
            &[],
            json_request("/echo/x?value=query", r#"{"value": "body"}"#),
        )
        .await;
        assert_eq!(answer.json()["data"], "body");
    }

    #[tokio::test]
    async fn identical_requests_yield_identical_bytes() {
        let (method, calls) = echo();
        let router = ServiceRouter::new()
            .method(Method::POST, "/echo", RouteOptions::new(), method)
            .unwrap();

        let first = dispatch(&router, Method::POST, "/echo", &[], json_request("/echo", r#"{"value":"same"}"#)).await;
        let second = dispatch(&router, Method::POST, "/echo", &[], json_request("/echo", r#"{"value":"same"}"#)).await;
        assert_eq!(first.status, StatusCode::OK);
        assert_eq!(first.body, second.body);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn envelope_sets_the_status_code() {
        let router = ServiceRouter::new()
            .method(Method::GET, "/admin", RouteOptions::new(), method_fn(forbidden))
            .unwrap();
        let request = Request::builder().uri("/admin").body(Body::empty()).unwrap();

        let answer = dispatch(&router, Method::GET, "/admin", &[], request).await;
        assert_eq!(answer.status, StatusCode::FORBIDDEN);
        assert_eq!(answer.json()["code"], 403);
        assert_eq!(answer.headers[X_CONTENT_TYPE_OPTIONS], "nosniff");
    }

    #[tokio::test]
    async fn declared_error_is_answered_with_500() {
        let router = ServiceRouter::new()
            .method(Method::GET, "/fail", RouteOptions::new(), method_fn(failing))
            .unwrap();
        let request = Request::builder().uri("/fail").body(Body::empty()).unwrap();

        let answer = dispatch(&router, Method::GET, "/fail", &[], request).await;
        assert_eq!(answer.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(answer.json()["data"], "expected error");
    }

    #[tokio::test]
    async fn panic_is_contained_and_the_next_request_succeeds() {
        let (method, calls) = echo();
        let router = ServiceRouter::new()
            .method(Method::POST, "/echo", RouteOptions::new(), method)
            .unwrap();

        let answer = dispatch(&router, Method::POST, "/echo", &[], json_request("/echo", r#"{"value":"boom"}"#)).await;
        assert_eq!(answer.status, StatusCode::INTERNAL_SERVER_ERROR);
        let body = answer.json();
        assert_eq!(body["msg"], "method faulted");
        assert_eq!(body["data"]["message"], "expected panic");
        assert!(!body["data"]["trace"].as_str().unwrap().is_empty());

        let answer = dispatch(&router, Method::POST, "/echo", &[], json_request("/echo", r#"{"value":"fine"}"#)).await;
        assert_eq!(answer.status, StatusCode::OK);
        assert_eq!(answer.json()["data"], "fine");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn multipart_binds_only_file_parts() {
        let router = ServiceRouter::new()
            .passthrough(
                Method::POST,
                "/upload",
                RouteOptions::new().file_upload(),
                passthrough_fn(upload),
            )
            .unwrap();
        let body = "--XyZ\r\n\
Content-Disposition: form-data; name=\"file\"; filename=\"hosts\"\r\n\
\r\n\
127.0.0.1 localhost\r\n\
--XyZ\r\n\
Content-Disposition: form-data; name=\"note\"\r\n\
\r\n\
plain\r\n\
--XyZ--\r\n";
        let request = Request::builder()
            .method("POST")
            .uri("/upload")
            .header(CONTENT_TYPE, "multipart/form-data; boundary=XyZ")
            .body(Body::from(body))
            .unwrap();

        let answer = dispatch(&router, Method::POST, "/upload", &[], request).await;
        assert_eq!(answer.status, StatusCode::OK);
        assert_eq!(answer.body, b"hosts");
    }

    #[tokio::test]
    async fn upload_over_the_configured_cap_is_rejected() {
        let router = ServiceRouter::with_config(DispatchConfig { max_body_bytes: 16 })
            .passthrough(
                Method::POST,
                "/upload",
                RouteOptions::new().file_upload(),
                passthrough_fn(upload),
            )
            .unwrap();
        let request = Request::builder()
            .method("POST")
            .uri("/upload")
            .header(CONTENT_TYPE, "multipart/form-data; boundary=XyZ")
            .body(Body::from(upload_body("XyZ", &"x".repeat(4096))))
            .unwrap();

        let answer = dispatch(&router, Method::POST, "/upload", &[], request).await;
        assert_eq!(answer.status, StatusCode::BAD_REQUEST);
        assert_eq!(answer.json()["msg"], "parse argument failed");
    }

    #[tokio::test]
    async fn failure_after_relabelling_is_still_json() {
        let router = ServiceRouter::new()
            .passthrough(Method::GET, "/relabel", RouteOptions::new(), passthrough_fn(relabel_then_fail))
            .unwrap();
        let request = Request::builder().uri("/relabel").body(Body::empty()).unwrap();

        let answer = dispatch(&router, Method::GET, "/relabel", &[], request).await;
        assert_eq!(answer.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(answer.headers.get_all(CONTENT_TYPE).iter().count(), 1);
        assert_eq!(answer.headers[CONTENT_TYPE], "application/json");
        assert_eq!(answer.headers[X_CONTENT_TYPE_OPTIONS], "nosniff");
        assert_eq!(answer.json()["msg"], "method reported error");
    }

    #[tokio::test]
    async fn unserializable_argument_replaces_the_response() {
        let recorder = Arc::new(CollectingRecorder::default());
        let router = ServiceRouter::new()
            .recorder(recorder.clone())
            .method(Method::POST, "/repeat", RouteOptions::new(), method_fn(repeat))
            .unwrap();

        let answer = dispatch(
            &router,
            Method::POST,
            "/repeat",
            &[],
            json_request("/repeat", r#"{"value":"hi"}"#),
        )
        .await;
        assert_eq!(answer.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(answer.json()["msg"], "argument serialization failed");
        assert!(recorder.fields.lock().is_empty());
    }

    #[tokio::test]
    async fn required_field_is_enforced() {
        let router = ServiceRouter::new()
            .method(Method::POST, "/inc", RouteOptions::new(), method_fn(increment))
            .unwrap();

        let answer = dispatch(&router, Method::POST, "/inc", &[], json_request("/inc", "{}")).await;
        assert_eq!(answer.status, StatusCode::BAD_REQUEST);
        assert!(answer.json()["data"].as_str().unwrap().contains('A'));

        let answer = dispatch(&router, Method::POST, "/inc", &[], json_request("/inc", r#"{"A":1}"#)).await;
        assert_eq!(answer.status, StatusCode::OK);
        assert_eq!(answer.json()["data"], json!({ "A": 2 }));
    }

    #[tokio::test]
    async fn schema_violations_are_binding_failures() {
        let schema = json!({
            "type": "object",
            "properties": { "A": { "type": "integer", "maximum": 10 } }
        });
        let router = ServiceRouter::new()
            .method(Method::POST, "/inc", RouteOptions::new().schema(schema), method_fn(increment))
            .unwrap();

        let answer = dispatch(&router, Method::POST, "/inc", &[], json_request("/inc", r#"{"A":11}"#)).await;
        assert_eq!(answer.status, StatusCode::BAD_REQUEST);
        assert!(answer.json()["data"].as_str().unwrap().contains("10"));
    }

    #[tokio::test]
    async fn list_arguments_take_array_bodies() {
        let router = ServiceRouter::new()
            .method(Method::POST, "/total", RouteOptions::new(), method_fn(total))
            .unwrap();

        let answer = dispatch(&router, Method::POST, "/total", &[], json_request("/total", "[1, 2, 3]")).await;
        assert_eq!(answer.json()["data"], 6);
    }

    #[tokio::test]
    async fn passthrough_methods_own_their_response() {
        let router = ServiceRouter::new()
            .passthrough(Method::GET, "/stream", RouteOptions::new(), passthrough_fn(stream))
            .unwrap()
            .passthrough(
                Method::POST,
                "/raw",
                RouteOptions::new().bypass_request_body(),
                passthrough_fn(raw_echo),
            )
            .unwrap();

        let request = Request::builder().uri("/stream").body(Body::empty()).unwrap();
        let answer = dispatch(&router, Method::GET, "/stream", &[], request).await;
        assert_eq!(answer.status, StatusCode::OK);
        assert_eq!(answer.headers[CONTENT_TYPE], "text/plain");
        assert_eq!(answer.headers[X_CONTENT_TYPE_OPTIONS], "nosniff");
        assert_eq!(answer.body, b"streamed");

        let answer = dispatch(&router, Method::POST, "/raw", &[], json_request("/raw", "{not json")).await;
        assert_eq!(answer.status, StatusCode::OK);
        assert_eq!(answer.body, b"{not json");
    }

    #[tokio::test]
    async fn deadline_and_headers_reach_the_context() {
        let router = ServiceRouter::new()
            .method(Method::GET, "/context", RouteOptions::new(), method_fn(context_snapshot))
            .unwrap();
        let mut request = Request::builder()
            .uri("/context")
            .header("user-agent", "tester/1.0")
            .body(Body::empty())
            .unwrap();
        request
            .extensions_mut()
            .insert(RequestDeadline(tokio::time::Instant::now()));

        let answer = dispatch(&router, Method::GET, "/context", &[], request).await;
        let data = &answer.json()["data"];
        assert_eq!(data["deadline"], true);
        assert_eq!(data["agent"], "tester/1.0");
        assert_eq!(data["remote"], Value::Null);
    }

    #[tokio::test]
    async fn recorder_sees_argument_and_payload_but_not_binding_failures() {
        let recorder = Arc::new(CollectingRecorder::default());
        let router = ServiceRouter::new()
            .recorder(recorder.clone())
            .method(Method::POST, "/inc", RouteOptions::new(), method_fn(increment))
            .unwrap();

        dispatch(&router, Method::POST, "/inc", &[], json_request("/inc", "{}")).await;
        assert!(recorder.fields.lock().is_empty());

        dispatch(&router, Method::POST, "/inc", &[], json_request("/inc", r#"{"A":4}"#)).await;
        let fields = recorder.fields.lock();
        assert_eq!(fields[METHOD_CALL_ARGUMENT], r#"{"A":4}"#);
        assert_eq!(fields[METHOD_CALL_RESPONSE_DATA], r#"{"A":5}"#);
        assert_eq!(fields.len(), 4);
    }

    #[test]
    fn registration_failures_install_nothing() {
        let (method, _) = echo();
        let router = ServiceRouter::new()
            .method(Method::POST, "/echo/{value}", RouteOptions::new(), method)
            .unwrap();

        let (method, _) = echo();
        let duplicate = ServiceRouter::new()
            .method(Method::POST, "/echo", RouteOptions::new(), method_fn(forbidden))
            .unwrap()
            .method(Method::POST, "/echo", RouteOptions::new(), method);
        assert!(matches!(duplicate, Err(RegistrationError::DuplicateRoute { .. })));

        let (method, _) = echo();
        let conflicting = router.method(Method::GET, "/echo/{other}", RouteOptions::new(), method);
        assert!(matches!(conflicting, Err(RegistrationError::InvalidPath { .. })));

        let upload_mismatch = ServiceRouter::new().passthrough(
            Method::POST,
            "/upload",
            RouteOptions::new(),
            passthrough_fn(upload),
        );
        assert!(matches!(
            upload_mismatch,
            Err(RegistrationError::FileListWithoutUpload { .. })
        ));

        let missing_slash =
            ServiceRouter::new().method(Method::GET, "admin", RouteOptions::new(), method_fn(forbidden));
        assert!(matches!(missing_slash, Err(RegistrationError::InvalidPath { .. })));
    }

    #[test]
    fn descriptors_report_shape_and_arity() {
        let router = ServiceRouter::new()
            .method(Method::POST, "/total", RouteOptions::new(), method_fn(total))
            .unwrap()
            .passthrough(Method::GET, "/stream", RouteOptions::new(), passthrough_fn(stream))
            .unwrap();

        let descriptors: Vec<_> = router.descriptors().collect();
        assert_eq!(descriptors.len(), 2);
        assert_eq!(descriptors[0].route.to_string(), "POST /total");
        assert_eq!(descriptors[0].argument_shape, svcbind_binding::ArgumentShape::List);
        assert_eq!(descriptors[0].result_arity.count(), 2);
        assert_eq!(descriptors[1].result_arity.count(), 1);
    }

    async fn exchange_raw(addr: SocketAddr, request: String) -> (u16, String) {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut raw = Vec::new();
        stream.read_to_end(&mut raw).await.unwrap();
        let raw = String::from_utf8(raw).unwrap();
        let (head, body) = raw.split_once("\r\n\r\n").unwrap();
        let status = head.split(' ').nth(1).unwrap().parse().unwrap();
        (status, body.to_owned())
    }

    async fn exchange(addr: SocketAddr, request: String) -> (u16, Value) {
        let (status, body) = exchange_raw(addr, request).await;
        (status, serde_json::from_str(&body).unwrap())
    }

    #[tokio::test]
    async fn axum_router_supplies_path_params_and_remote_address() {
        let (method, _) = echo();
        let app = ServiceRouter::new()
            .method(Method::POST, "/echo/{value}", RouteOptions::new(), method)
            .unwrap()
            .method(Method::GET, "/context", RouteOptions::new(), method_fn(context_snapshot))
            .unwrap()
            .into_router()
            .into_make_service_with_connect_info::<SocketAddr>();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });

        let body = r#"{"value":"body"}"#;
        let (status, json) = exchange(
            addr,
            format!(
                "POST /echo/from%20path?value=query HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
                body.len()
            ),
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(json["data"], "from path");

        let (status, json) = exchange(
            addr,
            "GET /context HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n".to_owned(),
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(json["data"]["remote"], "127.0.0.1");
        assert_eq!(json["data"]["deadline"], false);
    }

    #[tokio::test]
    async fn configured_cap_replaces_the_default_body_limit() {
        let app = ServiceRouter::with_config(DispatchConfig {
            max_body_bytes: 4 * 1024 * 1024,
        })
        .passthrough(
            Method::POST,
            "/upload",
            RouteOptions::new().file_upload(),
            passthrough_fn(upload),
        )
        .unwrap()
        .into_router()
        .into_make_service_with_connect_info::<SocketAddr>();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });

        let body = upload_body("XyZ", &"x".repeat(3 * 1024 * 1024));
        let (status, names) = exchange_raw(
            addr,
            format!(
                "POST /upload HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\nContent-Type: multipart/form-data; boundary=XyZ\r\nContent-Length: {}\r\n\r\n{body}",
                body.len()
            ),
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(names, "big");
    }
}
