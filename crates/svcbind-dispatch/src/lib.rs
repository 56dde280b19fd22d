//! # svcbind-dispatch — bound methods as HTTP routes
//!
//! A [`ServiceRouter`] takes methods implementing [`ServiceMethod`] or
//! [`PassthroughMethod`], checks each one when it is registered, and serves
//! it through an `axum` router. Every request runs the same pipeline:
//!
//! 1. bind the argument (query, body, path, then validation)
//! 2. invoke the method inside the panic sandbox
//! 3. shape exactly one response from the outcome
//! 4. hand the argument and payload to the telemetry recorder
//!
//! ## Module Overview
//!
//! - [`method`] — the two method traits and their function adapters
//! - [`descriptor`] — `MethodDescriptor`, `RouteOptions`, `DispatchConfig`
//! - [`router`] — `ServiceRouter`

pub mod descriptor;
mod endpoint;
pub mod method;
mod prototype;
pub mod router;
mod shaper;
mod telemetry;

pub use descriptor::{
    DEFAULT_MAX_BODY_BYTES, DispatchConfig, MethodDescriptor, ResultArity, RouteKey, RouteOptions,
};
pub use method::{
    MethodFn, PassthroughFn, PassthroughMethod, ServiceMethod, method_fn, passthrough_fn,
};
pub use router::ServiceRouter;
