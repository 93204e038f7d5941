//! Fetch Gateway
//!
//! Single-binary service that:
//! 1. Loads relay keys and endpoints at startup (refusing to start without keys)
//! 2. Serves upstream API payloads via `/fetch`, probing directly and falling
//!    back to the rotating-credential relay
//! 3. Verifies captcha tokens and resolves short links
//! 4. Exposes `/health` (credential pool state) and `/metrics`

mod config;
mod metrics;

use anyhow::{Context, Result};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use common::Secret;
use metrics_exporter_prometheus::PrometheusHandle;
use relay_pool::CredentialPool;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use upstream_fetch::{CaptchaVerifier, Clients, Fetcher, RedirectResolver, UpstreamResponse};

use crate::config::Config;

/// Maximum time to wait for in-flight requests after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared application state accessible from all handlers
#[derive(Clone)]
struct AppState {
    fetcher: Fetcher,
    captcha: CaptchaVerifier,
    captcha_secret: Option<Secret<String>>,
    resolver: RedirectResolver,
    prometheus: PrometheusHandle,
    started_at: Instant,
}

#[derive(Debug, Deserialize)]
struct UrlQuery {
    url: String,
}

#[derive(Debug, Deserialize)]
struct VerifyRequest {
    token: String,
}

/// JSON error body: {"error":{"type":"...","message":"...","request_id":"req_..."}}
fn error_response(status: StatusCode, kind: &str, message: &str, request_id: &str) -> Response {
    let body = serde_json::json!({
        "error": {
            "type": kind,
            "message": message,
            "request_id": request_id,
        }
    });
    (status, Json(body)).into_response()
}

fn request_id() -> String {
    format!("req_{}", uuid::Uuid::new_v4().as_simple())
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Build the axum router with all routes and shared state.
fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/fetch", get(fetch_handler))
        .route("/captcha/verify", post(verify_handler))
        .route("/resolve", get(resolve_handler))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting fetch-gateway");

    let prometheus = metrics::install_recorder()?;

    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.server.listen_addr,
        relay = %config.relay.base_url,
        relay_keys = config.relay.keys.len(),
        captcha_secret = config.captcha.secret.is_some(),
        "configuration loaded"
    );

    let pool = Arc::new(
        CredentialPool::new(config.relay.keys.clone()).context("failed to build credential pool")?,
    );
    let clients = Clients::new(&config.timeouts()).context("failed to build HTTP clients")?;
    let fetcher = Fetcher::from_clients(&clients, pool, &config.relay_settings())
        .context("failed to configure relay")?;

    let state = AppState {
        fetcher,
        captcha: CaptchaVerifier::new(clients.captcha.clone(), config.captcha.endpoint.clone()),
        captcha_secret: config.captcha.secret.clone(),
        resolver: RedirectResolver::new(clients.redirect.clone()),
        prometheus,
        started_at: Instant::now(),
    };

    let app = build_router(state, config.server.max_connections);
    let listen_addr = config.server.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    info!(addr = %listen_addr, "accepting requests");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => info!("all in-flight requests drained"),
        Ok(Ok(Err(e))) => error!(error = %e, "server error during shutdown"),
        Ok(Err(e)) => error!(error = %e, "server task panicked"),
        Err(_) => warn!(
            drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
            "drain timeout exceeded, forcing shutdown"
        ),
    }

    info!("shutdown complete");
    Ok(())
}

/// Health endpoint: credential pool state plus uptime. 503 once every relay
/// key is exhausted.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let pool = state.fetcher.pool().health().await;
    let status_code = if pool["exhausted"] == true {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    let body = serde_json::json!({
        "status": pool["status"],
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "credentials": pool,
    });
    (status_code, Json(body))
}

/// Prometheus metrics endpoint in text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// Fetch an upstream URL and return its decoded payload.
async fn fetch_handler(State(state): State<AppState>, Query(query): Query<UrlQuery>) -> Response {
    let started = Instant::now();
    let request_id = request_id();

    let response = if !is_http_url(&query.url) {
        error_response(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            "url must start with http:// or https://",
            &request_id,
        )
    } else {
        match state
            .fetcher
            .fetch::<Option<serde_json::Value>>(&query.url)
            .await
        {
            Ok(payload) => (StatusCode::OK, Json::<UpstreamResponse<_>>(payload)).into_response(),
            Err(e) if e.is_credentials_exhausted() => {
                error!(request_id = %request_id, url = %query.url, error = %e, "relay credentials exhausted");
                error_response(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "credentials_exhausted",
                    &e.to_string(),
                    &request_id,
                )
            }
            Err(e) => {
                error!(request_id = %request_id, url = %query.url, error = %e, "fetch failed");
                error_response(
                    StatusCode::BAD_GATEWAY,
                    "fetch_failure",
                    &e.to_string(),
                    &request_id,
                )
            }
        }
    };

    metrics::record_request(
        "fetch",
        response.status().as_u16(),
        started.elapsed().as_secs_f64(),
    );
    response
}

/// Verify a captcha token against the configured validation endpoint.
/// Always answers 200 with `{"success": bool}`; verification fails closed.
async fn verify_handler(
    State(state): State<AppState>,
    Json(request): Json<VerifyRequest>,
) -> Response {
    let started = Instant::now();
    let success = match &state.captcha_secret {
        Some(secret) => state.captcha.verify(&request.token, secret.expose()).await,
        None => {
            warn!("CAPTCHA_SECRET not configured, rejecting token");
            false
        }
    };
    let response = (
        StatusCode::OK,
        Json(serde_json::json!({ "success": success })),
    )
        .into_response();
    metrics::record_request("captcha_verify", 200, started.elapsed().as_secs_f64());
    response
}

/// Resolve a short link to its redirect target.
async fn resolve_handler(
    State(state): State<AppState>,
    Query(query): Query<UrlQuery>,
) -> Response {
    let started = Instant::now();
    let request_id = request_id();

    let response = if !is_http_url(&query.url) {
        error_response(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            "url must start with http:// or https://",
            &request_id,
        )
    } else {
        match state.resolver.resolve(&query.url).await {
            Ok(location) => (
                StatusCode::OK,
                Json(serde_json::json!({ "location": location })),
            )
                .into_response(),
            Err(e) => error_response(
                StatusCode::BAD_GATEWAY,
                "resolve_failure",
                &e.to_string(),
                &request_id,
            ),
        }
    };

    metrics::record_request(
        "resolve",
        response.status().as_u16(),
        started.elapsed().as_secs_f64(),
    );
    response
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
