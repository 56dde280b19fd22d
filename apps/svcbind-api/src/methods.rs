//! Sample methods, one per supported shape.

use std::convert::Infallible;

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, Method, StatusCode};
use futures_util::future::BoxFuture;
use futures_util::{FutureExt, stream};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use svcbind_binding::{ArgumentSource, MethodArgument, Violation};
use svcbind_dispatch::{
    PassthroughMethod, RouteOptions, ServiceMethod, ServiceRouter, method_fn, passthrough_fn,
};
use svcbind_protocol::{
    BindingError, MethodContext, MethodReply, RegistrationError, UploadedFiles,
};
use tokio::io::AsyncReadExt;

pub fn register(router: ServiceRouter) -> Result<ServiceRouter, RegistrationError> {
    router
        .method(
            Method::GET,
            "/greet/{name}",
            RouteOptions::new(),
            Greeter {
                salutation: "hello".to_owned(),
            },
        )?
        .method(Method::POST, "/sum", RouteOptions::new(), method_fn(sum))?
        .method(
            Method::GET,
            "/divide",
            RouteOptions::new().schema(json!({
                "type": "object",
                "properties": {
                    "dividend": { "type": "integer", "minimum": -1000000, "maximum": 1000000 },
                    "divisor": { "type": "integer" }
                }
            })),
            method_fn(divide),
        )?
        .method(Method::GET, "/admin", RouteOptions::new(), method_fn(admin))?
        .method(Method::GET, "/crash", RouteOptions::new(), method_fn(crash))?
        .passthrough(
            Method::GET,
            "/countdown/{from}",
            RouteOptions::new(),
            passthrough_fn(countdown),
        )?
        .passthrough(
            Method::POST,
            "/upload",
            RouteOptions::new().file_upload(),
            UploadSummary,
        )?
        .passthrough(
            Method::POST,
            "/echo",
            RouteOptions::new().bypass_request_body(),
            passthrough_fn(echo),
        )
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct NoArgs {}

impl MethodArgument for NoArgs {
    fn bind(source: ArgumentSource) -> Result<Self, BindingError> {
        source.into_record()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Greeting {
    name: String,
    #[serde(default)]
    excited: bool,
}

impl MethodArgument for Greeting {
    fn bind(source: ArgumentSource) -> Result<Self, BindingError> {
        source.into_record()
    }

    fn validate(&self) -> Result<(), Vec<Violation>> {
        if self.name.trim().is_empty() {
            return Err(vec![Violation::field("name", "must not be blank")]);
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct GreetingReply {
    message: String,
}

pub struct Greeter {
    salutation: String,
}

#[async_trait]
impl ServiceMethod for Greeter {
    type Argument = Greeting;
    type Output = GreetingReply;

    async fn call(
        &self,
        _ctx: &mut MethodContext,
        argument: &mut Greeting,
    ) -> MethodReply<GreetingReply> {
        let mark = if argument.excited { "!" } else { "" };
        MethodReply::Ok(GreetingReply {
            message: format!("{} {}{mark}", self.salutation, argument.name),
        })
    }
}

fn sum<'a>(_ctx: &'a mut MethodContext, numbers: &'a mut Vec<i64>) -> BoxFuture<'a, MethodReply<i64>> {
    async move {
        match numbers.iter().try_fold(0_i64, |total, n| total.checked_add(*n)) {
            Some(total) => MethodReply::Ok(total),
            None => MethodReply::envelope(422, "sum overflows", Value::Null),
        }
    }
    .boxed()
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Division {
    dividend: i64,
    divisor: i64,
}

impl MethodArgument for Division {
    fn bind(source: ArgumentSource) -> Result<Self, BindingError> {
        source.into_record()
    }
}

fn divide<'a>(
    _ctx: &'a mut MethodContext,
    division: &'a mut Division,
) -> BoxFuture<'a, MethodReply<Value>> {
    async move {
        match division.dividend.checked_div(division.divisor) {
            Some(quotient) => MethodReply::Ok(json!({
                "quotient": quotient,
                "remainder": division.dividend % division.divisor,
            })),
            None => MethodReply::error(anyhow::anyhow!("cannot divide by {}", division.divisor)),
        }
    }
    .boxed()
}

fn admin<'a>(ctx: &'a mut MethodContext, _args: &'a mut NoArgs) -> BoxFuture<'a, MethodReply<Value>> {
    async move {
        let caller = ctx
            .remote_addr()
            .map(|addr| addr.ip().to_string())
            .unwrap_or_default();
        MethodReply::envelope(403, "forbidden", json!({ "caller": caller }))
    }
    .boxed()
}

fn crash<'a>(_ctx: &'a mut MethodContext, _args: &'a mut NoArgs) -> BoxFuture<'a, MethodReply<Value>> {
    async move {
        let items: Vec<u32> = Vec::new();
        MethodReply::Ok(json!(items[0]))
    }
    .boxed()
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Countdown {
    from: u32,
}

impl MethodArgument for Countdown {
    fn bind(source: ArgumentSource) -> Result<Self, BindingError> {
        source.into_record()
    }

    fn validate(&self) -> Result<(), Vec<Violation>> {
        if self.from > 1000 {
            return Err(vec![Violation::field("from", "at most 1000")]);
        }
        Ok(())
    }
}

fn countdown<'a>(ctx: &'a mut MethodContext, args: &'a mut Countdown) -> BoxFuture<'a, MethodReply<()>> {
    async move {
        if ctx.is_expired() {
            return MethodReply::envelope(504, "deadline exceeded", Value::Null);
        }
        ctx.response_headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
        let lines = (0..=args.from)
            .rev()
            .map(|n| Ok::<_, Infallible>(Bytes::from(format!("{n}\n"))));
        ctx.stream(Body::from_stream(stream::iter(lines)));
        MethodReply::Ok(())
    }
    .boxed()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StoredFile {
    form_field_name: String,
    file_name: String,
    bytes: usize,
}

/// Drains every uploaded file and reports its size.
pub struct UploadSummary;

#[async_trait]
impl PassthroughMethod for UploadSummary {
    type Argument = UploadedFiles;

    async fn call(&self, ctx: &mut MethodContext, files: &mut UploadedFiles) -> MethodReply<()> {
        let mut stored = Vec::with_capacity(files.len());
        for file in files.iter_mut() {
            let mut content = Vec::new();
            if let Err(error) = file.content.read_to_end(&mut content).await {
                return MethodReply::error(error);
            }
            stored.push(StoredFile {
                form_field_name: file.form_field_name.clone(),
                file_name: file.file_name.clone(),
                bytes: content.len(),
            });
        }
        match serde_json::to_vec(&stored) {
            Ok(body) => {
                ctx.set_status(StatusCode::CREATED);
                ctx.write(body);
                MethodReply::Ok(())
            }
            Err(error) => MethodReply::error(error),
        }
    }
}

fn echo<'a>(ctx: &'a mut MethodContext, _args: &'a mut NoArgs) -> BoxFuture<'a, MethodReply<()>> {
    async move {
        if let Some(content_type) = ctx.request_headers().get(CONTENT_TYPE).cloned() {
            ctx.response_headers_mut().insert(CONTENT_TYPE, content_type);
        }
        if let Some(body) = ctx.take_request_body() {
            ctx.stream(body);
        }
        MethodReply::Ok(())
    }
    .boxed()
}
