use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::{Request, State};
use axum::http::{HeaderName, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use clap::{Parser, ValueEnum};
use serde_json::{Value, json};
use svcbind_accesslog::{AccessLog, AccessLogRecorder, access_log};
use svcbind_dispatch::{DEFAULT_MAX_BODY_BYTES, DispatchConfig, ServiceRouter};
use svcbind_protocol::{RequestDeadline, ResponseEnvelope};
use tokio::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod methods;

#[derive(Debug, Parser)]
#[command(name = "svcbind-api")]
#[command(about = "Sample service exposing bound methods over HTTP")]
struct Cli {
    #[arg(long, default_value = "127.0.0.1:8787")]
    listen: SocketAddr,
    #[arg(long, default_value_t = DEFAULT_MAX_BODY_BYTES)]
    max_body_bytes: usize,
    /// Per-request deadline handed to methods; unset means no deadline.
    #[arg(long)]
    request_timeout_secs: Option<u64>,
    #[arg(long, value_enum, default_value_t = LogFormat::Json)]
    log_format: LogFormat,
    /// Request header copied into access-log rows. Repeatable.
    #[arg(long = "log-header")]
    log_headers: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Json,
    Compact,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init(),
        LogFormat::Compact => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let logged_headers = cli
        .log_headers
        .iter()
        .map(|name| {
            name.parse::<HeaderName>()
                .with_context(|| format!("invalid --log-header {name:?}"))
        })
        .collect::<Result<Vec<_>>>()?;

    let service = methods::register(
        ServiceRouter::with_config(DispatchConfig {
            max_body_bytes: cli.max_body_bytes,
        })
        .recorder(Arc::new(AccessLogRecorder)),
    )
    .context("registering service methods")?;
    let routes = service.descriptors().count();

    let mut app = Router::new()
        .route("/healthz", get(healthz))
        .merge(service.into_router());
    if let Some(secs) = cli.request_timeout_secs {
        app = app.layer(middleware::from_fn_with_state(
            Duration::from_secs(secs),
            enforce_deadline,
        ));
    }
    let app = app
        .layer(middleware::from_fn_with_state(
            AccessLog::tracing().log_headers(logged_headers),
            access_log,
        ))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(cli.listen).await?;
    info!(listen = %cli.listen, routes, "svcbind-api listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn healthz() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "svcbind-api"
    }))
}

/// Stamps a [`RequestDeadline`] on the request and answers 504 once it
/// passes. Methods see the same deadline through their context.
async fn enforce_deadline(
    State(timeout): State<Duration>,
    mut request: Request,
    next: Next,
) -> Response {
    let deadline = Instant::now() + timeout;
    request.extensions_mut().insert(RequestDeadline(deadline));
    match tokio::time::timeout_at(deadline, next.run(request)).await {
        Ok(response) => response,
        Err(_) => {
            warn!(timeout_secs = timeout.as_secs(), "request deadline exceeded");
            let envelope = ResponseEnvelope::from_status(
                StatusCode::GATEWAY_TIMEOUT,
                "request deadline exceeded",
                Value::Null,
            );
            (envelope.status(), Json(envelope)).into_response()
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::error!(%error, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    {
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(error) => {
                    tracing::error!(%error, "failed to install SIGTERM handler");
                }
            }
        };

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await;
    }
}
