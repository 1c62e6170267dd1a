//! # Authorization HTTP Server
//!
//! REST front-end for the authorization engine.
//!
//! ## Endpoints
//!
//! - `POST /v1/authorize` - Route authorization decision
//! - `POST /v1/permissions/check` - Direct permission check
//! - `GET /v1/permissions/:principal` - Effective permission set
//! - `POST /v1/invalidate/:principal` - Drop cached permissions
//! - `GET /health` - Health check
//! - `GET /metrics` - Prometheus metrics (separate listener)
//!
//! ## Configuration
//!
//! Environment variables:
//! - `PORT` - HTTP server port (default: 8080)
//! - `METRICS_PORT` - Metrics server port (default: 9090)
//! - `RUST_LOG` - Log filter (default: info)
//! - `CACHE_TTL_SECS` - Permission cache TTL (default: 900)
//! - `FETCH_TIMEOUT_MS` - Grant fetch budget (default: 2000)

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    serve, Router,
};
use sentinel_authz::{
    AuthorizationEngine, AuthzError, CacheConfig, ClaimSet, EngineConfig, InMemoryDirectory,
    InMemoryPolicyStore, RouteRequest, Verdict,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{error, info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Shared application state
#[derive(Clone)]
struct AppState {
    engine: Arc<AuthorizationEngine>,
    start_time: std::time::Instant,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    Upstream(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            AppError::Upstream(msg) => (StatusCode::SERVICE_UNAVAILABLE, "upstream_unavailable", msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
        };
        let body = Json(ErrorResponse {
            error: error.to_string(),
            message,
        });
        (status, body).into_response()
    }
}

impl From<AuthzError> for AppError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::ValidationFailed(msg) => AppError::BadRequest(msg),
            AuthzError::UpstreamUnavailable(msg) => AppError::Upstream(msg),
            other => AppError::Internal(other.to_string()),
        }
    }
}

/// POST /v1/authorize request body
#[derive(Debug, Deserialize)]
struct AuthorizeRequest {
    path: String,
    method: String,
    #[serde(default)]
    claims: Option<ClaimSet>,
    #[serde(default)]
    device_id: Option<String>,
    #[serde(default)]
    network_origin: Option<String>,
    #[serde(default)]
    correlation_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct AuthorizeResponse {
    allowed: bool,
    verdict: Verdict,
    reason: sentinel_authz::DecisionReason,
    decision_id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    required_permissions: Vec<String>,
}

/// POST /v1/permissions/check request body
#[derive(Debug, Deserialize)]
struct CheckRequest {
    claims: ClaimSet,
    /// Required permissions; `any` controls whether one or all must hold
    permissions: Vec<String>,
    #[serde(default)]
    any: bool,
}

#[derive(Debug, Serialize)]
struct CheckResponse {
    granted: bool,
}

#[derive(Debug, Serialize)]
struct PermissionsResponse {
    principal_id: String,
    permissions: Vec<String>,
}

#[derive(Debug, Serialize)]
struct InvalidateResponse {
    invalidated: bool,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    uptime_seconds: u64,
    version: String,
}

struct MetricsResponse {
    metrics: String,
}

impl IntoResponse for MetricsResponse {
    fn into_response(self) -> Response {
        (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            self.metrics,
        )
            .into_response()
    }
}

/// POST /v1/authorize
async fn authorize(
    State(state): State<AppState>,
    Json(req): Json<AuthorizeRequest>,
) -> Result<Json<AuthorizeResponse>, AppError> {
    if req.path.is_empty() || req.method.is_empty() {
        return Err(AppError::BadRequest(
            "path and method are required".to_string(),
        ));
    }

    let mut request = RouteRequest::new(&req.path, &req.method);
    request.claims = req.claims;
    request.device_id = req.device_id;
    request.network_origin = req.network_origin;
    request.correlation_id = req.correlation_id;

    let decision = state.engine.authorize_route(&request).await;
    info!(
        path = %req.path,
        method = %req.method,
        verdict = decision.verdict.as_str(),
        "authorization decision"
    );

    Ok(Json(AuthorizeResponse {
        allowed: decision.is_allowed(),
        verdict: decision.verdict,
        reason: decision.reason,
        decision_id: decision.id.to_string(),
        required_permissions: decision.required_permissions,
    }))
}

/// POST /v1/permissions/check
async fn check_permissions(
    State(state): State<AppState>,
    Json(req): Json<CheckRequest>,
) -> Result<Json<CheckResponse>, AppError> {
    req.claims.validate()?;
    if req.permissions.is_empty() {
        return Err(AppError::BadRequest(
            "at least one permission is required".to_string(),
        ));
    }

    let granted = if req.any {
        state
            .engine
            .has_any_permission(&req.claims, &req.permissions)
            .await?
    } else {
        let mut all = true;
        for permission in &req.permissions {
            if !state.engine.has_permission(&req.claims, permission).await? {
                all = false;
                break;
            }
        }
        all
    };

    Ok(Json(CheckResponse { granted }))
}

/// GET /v1/permissions/:principal
async fn effective_permissions(
    State(state): State<AppState>,
    Path(principal): Path<String>,
) -> Result<Json<PermissionsResponse>, AppError> {
    let claims = ClaimSet::new(principal.clone());
    claims.validate()?;
    let permissions = state.engine.get_effective_permissions(&claims).await?;
    Ok(Json(PermissionsResponse {
        principal_id: principal,
        permissions,
    }))
}

/// POST /v1/invalidate/:principal
async fn invalidate(
    State(state): State<AppState>,
    Path(principal): Path<String>,
) -> Json<InvalidateResponse> {
    let invalidated = state.engine.invalidate_permissions(&principal).await;
    Json(InvalidateResponse { invalidated })
}

/// GET /health
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        version: sentinel_authz::VERSION.to_string(),
    })
}

/// GET /metrics
async fn metrics(State(state): State<AppState>) -> MetricsResponse {
    let mut text = state.engine.metrics().export_prometheus().await;
    let cache = state.engine.cache().stats();
    text.push_str(&format!(
        "\n# HELP authz_cache_entries Cached permission sets\n\
         # TYPE authz_cache_entries gauge\n\
         authz_cache_entries {}\n\
         \n\
         # HELP authz_cache_hit_rate Permission cache hit rate\n\
         # TYPE authz_cache_hit_rate gauge\n\
         authz_cache_hit_rate {}\n",
        cache.entries, cache.hit_rate
    ));
    MetricsResponse { metrics: text }
}

fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let trace = TraceLayer::new_for_http().on_response(DefaultOnResponse::new().level(Level::INFO));

    Router::new()
        .route("/v1/authorize", post(authorize))
        .route("/v1/permissions/check", post(check_permissions))
        .route("/v1/permissions/:principal", get(effective_permissions))
        .route("/v1/invalidate/:principal", post(invalidate))
        .route("/health", get(health_check))
        .layer(ServiceBuilder::new().layer(trace).layer(cors))
        .with_state(state)
}

fn create_metrics_router(state: AppState) -> Router {
    Router::new().route("/metrics", get(metrics)).with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C"),
        _ = terminate => info!("received SIGTERM"),
    }

    info!("starting graceful shutdown");
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("starting authorization server v{}", sentinel_authz::VERSION);

    let port: u16 = env_parse("PORT", 8080);
    let metrics_port: u16 = env_parse("METRICS_PORT", 9090);
    let cache_ttl_secs: u64 = env_parse("CACHE_TTL_SECS", 900);
    let fetch_timeout_ms: u64 = env_parse("FETCH_TIMEOUT_MS", 2000);

    info!(port, metrics_port, cache_ttl_secs, fetch_timeout_ms, "configuration loaded");

    let config = EngineConfig {
        cache: CacheConfig {
            ttl: Duration::from_secs(cache_ttl_secs),
            ..Default::default()
        },
        fetch_timeout: Duration::from_millis(fetch_timeout_ms),
        ..Default::default()
    };

    let engine = AuthorizationEngine::new(
        config,
        Arc::new(InMemoryDirectory::new()),
        Arc::new(InMemoryPolicyStore::new()),
    );

    let state = AppState {
        engine: Arc::new(engine),
        start_time: std::time::Instant::now(),
    };

    let app = create_router(state.clone());
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let metrics_app = create_metrics_router(state);
    let metrics_addr = SocketAddr::from(([0, 0, 0, 0], metrics_port));

    info!("listening on {}", addr);
    info!("metrics on {}", metrics_addr);

    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!("failed to bind HTTP listener: {}", e);
        e
    })?;
    let metrics_listener = tokio::net::TcpListener::bind(metrics_addr).await.map_err(|e| {
        error!("failed to bind metrics listener: {}", e);
        e
    })?;

    let server = serve(listener, app.into_make_service()).with_graceful_shutdown(shutdown_signal());
    let metrics_server =
        serve(metrics_listener, metrics_app.into_make_service()).with_graceful_shutdown(shutdown_signal());

    let result = tokio::try_join!(
        async {
            server.await.map_err(|e| {
                error!("HTTP server error: {}", e);
                e
            })
        },
        async {
            metrics_server.await.map_err(|e| {
                error!("metrics server error: {}", e);
                e
            })
        }
    );

    match result {
        Ok(_) => {
            info!("servers shut down gracefully");
            Ok(())
        }
        Err(e) => Err(e),
    }
}
