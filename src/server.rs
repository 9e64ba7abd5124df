//! HTTP server for tutorial generation.
//!
//! A single-shot, synchronous API: one request acquires the source, runs
//! the full pipeline and answers with the packaged tutorial as a zip.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/generate` | Generate a tutorial; `200 application/zip` |
//! | `GET`  | `/health` | Health check (returns version and provider) |
//!
//! # Request
//!
//! ```json
//! {
//!   "repo_url": "https://github.com/owner/repo",
//!   "project_name": "repo",
//!   "include": ["**/*.py"],
//!   "exclude": ["**/tests/**"],
//!   "max_file_size": 100000,
//!   "language": "english"
//! }
//! ```
//!
//! Instead of `repo_url`, a zip may be uploaded inline as
//! `archive_base64` (with an optional `archive_name`). Exactly one of the
//! two is required.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "pipeline_failed", "message": "chapter ordering failed: ..." } }
//! ```
//!
//! Error codes: `bad_request` (400), `empty_source` (400), `not_found` (404),
//! `timeout` (408), `payload_too_large` (413), `rate_limited` (429),
//! `internal` (500), `acquisition_failed` (502), `pipeline_failed` (502).

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::acquire::AcquisitionFilter;
use crate::config::Config;
use crate::connector_archive::ArchiveConnector;
use crate::connector_github::GitHubConnector;
use crate::error::{AcquisitionError, PipelineError};
use crate::llm::CompletionGateway;
use crate::package::{project_dir_name, to_zip_bytes};
use crate::pipeline::{Pipeline, PipelineContext};
use crate::traits::Connector;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    gateway: CompletionGateway,
}

/// Starts the HTTP server with the provider and cache from the config.
///
/// Binds to `[server].bind` and runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let gateway = CompletionGateway::from_config(&config.llm, &config.cache)?;
    run_server_with_gateway(config, gateway).await
}

/// Like [`run_server`], with a caller-supplied gateway.
pub async fn run_server_with_gateway(
    config: &Config,
    gateway: CompletionGateway,
) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let provider = gateway.provider_name().to_string();
    let app = build_router(Arc::new(config.clone()), gateway);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(bind = %bind_addr, provider = %provider, "tutorial server listening");
    eprintln!("Tutorial server listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}

/// The application router, without a listener.
pub fn build_router(config: Arc<Config>, gateway: CompletionGateway) -> Router {
    // Base64 inflates uploads by 4/3; leave room for the JSON envelope.
    let body_limit = config.server.max_archive_bytes / 3 * 4 + 64 * 1024;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/generate", post(handle_generate))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .with_state(AppState { config, gateway })
}

// ============ Error response ============

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`, `"pipeline_failed"`).
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::BAD_REQUEST, "bad_request", message)
}

fn timeout_error(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::REQUEST_TIMEOUT, "timeout", message)
}

fn internal(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
}

/// Map a connector failure onto the HTTP contract.
fn classify_acquisition_error(err: anyhow::Error) -> AppError {
    match err.downcast_ref::<AcquisitionError>() {
        Some(AcquisitionError::NotFound(_)) => {
            AppError::new(StatusCode::NOT_FOUND, "not_found", err.to_string())
        }
        Some(AcquisitionError::RateLimited(_)) => {
            AppError::new(StatusCode::TOO_MANY_REQUESTS, "rate_limited", err.to_string())
        }
        Some(AcquisitionError::Empty) => {
            AppError::new(StatusCode::BAD_REQUEST, "empty_source", err.to_string())
        }
        Some(AcquisitionError::InvalidLocator(_)) => bad_request(err.to_string()),
        None => AppError::new(
            StatusCode::BAD_GATEWAY,
            "acquisition_failed",
            format!("{:#}", err),
        ),
    }
}

fn classify_pipeline_error(err: PipelineError) -> AppError {
    match err {
        PipelineError::NoSourceFiles => {
            AppError::new(StatusCode::BAD_REQUEST, "empty_source", err.to_string())
        }
        PipelineError::Stage { .. } => {
            AppError::new(StatusCode::BAD_GATEWAY, "pipeline_failed", err.to_string())
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    provider: String,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        provider: state.gateway.provider_name().to_string(),
    })
}

// ============ POST /generate ============

/// JSON body of `POST /generate`.
#[derive(Debug, Default, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub repo_url: Option<String>,
    #[serde(default)]
    pub archive_base64: Option<String>,
    #[serde(default)]
    pub archive_name: Option<String>,
    #[serde(default)]
    pub project_name: Option<String>,
    /// GitHub token; falls back to the `[acquisition].github_token_env` variable.
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub include: Option<Vec<String>>,
    #[serde(default)]
    pub exclude: Option<Vec<String>>,
    #[serde(default)]
    pub max_file_size: Option<u64>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub max_abstractions: Option<usize>,
}

async fn handle_generate(
    State(state): State<AppState>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(req) = payload.map_err(|e| bad_request(e.body_text()))?;
    let request_id = Uuid::new_v4();
    let limit = Duration::from_secs(state.config.server.request_timeout_secs);
    let span = info_span!("generate", request_id = %request_id);

    match tokio::time::timeout(limit, generate(&state, req).instrument(span)).await {
        Ok(result) => result,
        Err(_) => {
            warn!(request_id = %request_id, "generation timed out");
            Err(timeout_error(format!(
                "generation did not finish within {} seconds",
                limit.as_secs()
            )))
        }
    }
}

async fn generate(state: &AppState, req: GenerateRequest) -> Result<Response, AppError> {
    let config = &state.config;
    let connector = connector_for(config, &req)?;

    let acq_config = &config.acquisition;
    let filter = AcquisitionFilter::new(
        req.include.as_deref().unwrap_or(&acq_config.include_globs),
        req.exclude.as_deref().unwrap_or(&acq_config.exclude_globs),
        req.max_file_size.unwrap_or(acq_config.max_file_size),
    )
    .map_err(|e| bad_request(format!("invalid glob pattern: {}", e)))?;

    let acquisition = connector
        .acquire(&filter)
        .await
        .map_err(classify_acquisition_error)?;
    info!(
        files = acquisition.files.len(),
        skipped = acquisition.skipped.len(),
        "acquired source"
    );

    let project_name = req
        .project_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(&acquisition.project_name)
        .to_string();

    let mut ctx = PipelineContext::from_config(config, state.gateway.clone());
    if let Some(language) = req.language.as_deref().filter(|l| !l.trim().is_empty()) {
        ctx = ctx.with_language(language.trim());
    }
    if let Some(max) = req.max_abstractions {
        ctx = ctx.with_max_abstractions(max);
    }

    let source_url = connector.source_url();
    let docs = Pipeline::new(ctx)
        .generate(acquisition.files, &project_name, source_url.as_deref())
        .await
        .map_err(classify_pipeline_error)?;

    let bytes = to_zip_bytes(&docs).map_err(|e| internal(format!("{:#}", e)))?;
    let disposition = attachment_disposition(&project_name);

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

/// `Content-Disposition` for the zip. Only printable ASCII reaches the
/// header; anything else becomes `_`.
fn attachment_disposition(project_name: &str) -> String {
    let stem: String = project_dir_name(project_name)
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() || c == ' ') && c != '"' && c != '\\' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("attachment; filename=\"{}.zip\"", stem)
}

fn connector_for(config: &Config, req: &GenerateRequest) -> Result<Box<dyn Connector>, AppError> {
    match (&req.repo_url, &req.archive_base64) {
        (Some(url), None) => {
            let token = req
                .token
                .clone()
                .or_else(|| std::env::var(&config.acquisition.github_token_env).ok());
            let connector = GitHubConnector::new(url, &config.acquisition.github_api_url, token)
                .map_err(classify_acquisition_error)?;
            Ok(Box::new(connector))
        }
        (None, Some(encoded)) => {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(encoded.trim())
                .map_err(|e| bad_request(format!("archive_base64 is not valid base64: {}", e)))?;
            if bytes.len() > config.server.max_archive_bytes {
                return Err(AppError::new(
                    StatusCode::PAYLOAD_TOO_LARGE,
                    "payload_too_large",
                    format!(
                        "archive is {} bytes, limit is {}",
                        bytes.len(),
                        config.server.max_archive_bytes
                    ),
                ));
            }
            let name = req.archive_name.as_deref().unwrap_or("upload.zip");
            Ok(Box::new(ArchiveConnector::from_bytes(name, bytes)))
        }
        (Some(_), Some(_)) => Err(bad_request(
            "provide either repo_url or archive_base64, not both",
        )),
        (None, None) => Err(bad_request("one of repo_url or archive_base64 is required")),
    }
}
