//! Invocation sandbox.
//!
//! [`invoke`] polls a method's future inside `catch_unwind` and turns a panic
//! into a [`SandboxFault`] carrying the panic message and the backtrace taken
//! at the panic site. Panics outside a sandbox still reach the previously
//! installed hook.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Once;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use svcbind_protocol::SandboxFault;
use tracing::{debug, error};

const BEGIN_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

thread_local! {
    static SANDBOX_DEPTH: Cell<usize> = const { Cell::new(0) };
    static CAPTURED_TRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if SANDBOX_DEPTH.with(Cell::get) > 0 {
                let trace = Backtrace::force_capture().to_string();
                CAPTURED_TRACE.with(|slot| *slot.borrow_mut() = Some(trace));
            } else {
                previous(info);
            }
        }));
    });
}

struct DepthGuard;

impl DepthGuard {
    fn enter() -> Self {
        SANDBOX_DEPTH.with(|depth| depth.set(depth.get() + 1));
        Self
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        SANDBOX_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

struct Sandboxed<'a, T> {
    inner: BoxFuture<'a, T>,
}

impl<T> Future for Sandboxed<'_, T> {
    type Output = Result<T, SandboxFault>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let inner = &mut self.inner;
        let polled = {
            let _guard = DepthGuard::enter();
            panic::catch_unwind(AssertUnwindSafe(|| inner.as_mut().poll(cx)))
        };
        match polled {
            Ok(poll) => poll.map(Ok),
            Err(payload) => Poll::Ready(Err(fault_from_payload(payload))),
        }
    }
}

fn fault_from_payload(payload: Box<dyn Any + Send>) -> SandboxFault {
    let message = if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    };
    let trace = CAPTURED_TRACE
        .with(|slot| slot.borrow_mut().take())
        .unwrap_or_else(|| "backtrace unavailable".to_owned());
    SandboxFault { message, trace }
}

/// When a call started and how long it ran.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CallTiming {
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
}

impl CallTiming {
    pub fn begin_time_label(&self) -> String {
        self.started_at.format(BEGIN_TIME_FORMAT).to_string()
    }

    /// Duration in seconds as a plain decimal.
    pub fn duration_label(&self) -> String {
        self.duration.as_secs_f64().to_string()
    }
}

/// Runs `call` to completion, converting a panic raised while polling it into
/// a [`SandboxFault`]. The fault never propagates past this boundary.
pub async fn invoke<T>(call: BoxFuture<'_, T>) -> (Result<T, SandboxFault>, CallTiming) {
    install_panic_hook();

    let started_at = Utc::now();
    let clock = Instant::now();
    let outcome = Sandboxed { inner: call }.await;
    let timing = CallTiming {
        started_at,
        duration: clock.elapsed(),
    };

    match &outcome {
        Ok(_) => debug!(duration_secs = timing.duration.as_secs_f64(), "method returned"),
        Err(fault) => error!(panic = %fault.message, "method panicked inside sandbox"),
    }

    (outcome, timing)
}
