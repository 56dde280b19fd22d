//! # svcbind-protocol — shared contract for method binding
//!
//! Types every other svcbind crate agrees on. Nothing here performs I/O; the
//! crate only describes what a bound method sees and what it may return.
//!
//! ## Module Overview
//!
//! - [`envelope`] — `ResponseEnvelope`, the `{code, msg, data}` wire shape
//! - [`reply`] — `MethodReply`, the tagged result every method returns
//! - [`context`] — `MethodContext`, the per-call execution carrier
//! - [`upload`] — `UploadedFile`, `UploadedFiles`, `FileContent`
//! - [`telemetry`] — `MethodCallRecorder` port and field names
//! - [`error`] — `RegistrationError`, `BindingError`, `SandboxFault`, `SerializationFault`

pub mod context;
pub mod envelope;
pub mod error;
pub mod reply;
pub mod telemetry;
pub mod upload;

pub use context::{MethodContext, RequestDeadline};
pub use envelope::ResponseEnvelope;
pub use error::{BindingError, RegistrationError, SandboxFault, SerializationFault};
pub use reply::MethodReply;
pub use telemetry::{MethodCallRecorder, NoopRecorder};
pub use upload::{FileContent, UploadedFile, UploadedFiles};
