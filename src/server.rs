//! HTTP server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Service name, version, and endpoint map |
//! | `GET`  | `/health` | Liveness plus collaborator availability |
//! | `POST` | `/analyze` | Run an analysis for one store owner |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "user_id must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), and for analysis failures (500)
//! `collaborator_unavailable`, `data_store_error`, `completion_failed`,
//! `recovery_exhausted`, `shape_mismatch`.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so storefront widgets
//! and dashboards can call the API from the browser.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use crate::analyze::{run_analysis, AnalyzeError, AnalyzeRequest, AnalyzeResponse};
use crate::config::Config;
use crate::context::AppContext;

const SERVICE_NAME: &str = "upsell-advisor";

/// Starts the server with collaborators built from `config`.
///
/// Binds to `[server].bind` (or `PORT`) and runs until the process is
/// terminated.
pub async fn run_server(config: Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let ctx = AppContext::from_config(config)?.into_shared();
    run_server_with_context(&bind_addr, ctx).await
}

/// Starts the server with a caller-supplied [`AppContext`].
///
/// Used by tests to inject in-memory collaborators.
pub async fn run_server_with_context(bind_addr: &str, ctx: Arc<AppContext>) -> anyhow::Result<()> {
    info!(
        store = %ctx.store.status(),
        completion = %ctx.completion.status(),
        "collaborators initialized"
    );

    let app = router(ctx);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

pub fn router(ctx: Arc<AppContext>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/analyze", post(handle_analyze))
        .layer(cors)
        .with_state(ctx)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

impl From<AnalyzeError> for AppError {
    fn from(err: AnalyzeError) -> Self {
        match err {
            AnalyzeError::Invalid(message) => bad_request(message),
            AnalyzeError::Analysis(err) => AppError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                code: err.code().to_string(),
                message: err.to_string(),
            },
        }
    }
}

// ============ GET / ============

async fn handle_root() -> Json<Value> {
    Json(json!({
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": "GET /health",
            "analyze": "POST /analyze",
        }
    }))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    store: String,
    completion: String,
}

/// Always `"healthy"` while the process serves requests; collaborator
/// fields report whether analyses can actually run.
async fn handle_health(State(ctx): State<Arc<AppContext>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        store: ctx.store.status(),
        completion: ctx.completion.status(),
    })
}

// ============ POST /analyze ============

async fn handle_analyze(
    State(ctx): State<Arc<AppContext>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<AnalyzeResponse>, AppError> {
    let Json(body) = payload.map_err(|rejection| {
        warn!(error = %rejection.body_text(), "unreadable analyze body");
        bad_request(format!("invalid analyze request: {}", rejection.body_text()))
    })?;
    let request: AnalyzeRequest = serde_json::from_value(body)
        .map_err(|e| bad_request(format!("invalid analyze request: {}", e)))?;
    let user_id = request.user_id.clone();
    info!(user_id = %user_id, analysis_type = ?request.analysis_type, "analyze request");

    match run_analysis(&ctx, request).await {
        Ok(response) => Ok(Json(response)),
        Err(AnalyzeError::Invalid(message)) => {
            warn!(user_id = %user_id, %message, "rejected analyze request");
            Err(bad_request(message))
        }
        Err(err) => {
            error!(user_id = %user_id, error = %err, "analysis failed");
            Err(err.into())
        }
    }
}
