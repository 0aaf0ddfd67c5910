//! HTTP server for bundle analysis.
//!
//! Exposes [`BundleService`] as a JSON API. The case comes from the path and
//! the organization from the `x-org-id` header; together they scope every
//! call, and a bundle owned by another case or organization answers 404.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/cases/{case_id}/bundles/phase-a` | One-pass summary |
//! | `POST` | `/cases/{case_id}/bundles/full` | Create a chunked bundle |
//! | `POST` | `/cases/{case_id}/bundles/{bundle_id}/continue?maxChunks=N` | Advance processing |
//! | `GET`  | `/cases/{case_id}/bundle` | Latest bundle of the case |
//! | `GET`  | `/cases/{case_id}/bundles/{bundle_id}/{view}` | toc, timeline, issues, contradictions, overview |
//! | `GET`  | `/cases/{case_id}/bundles/{bundle_id}/search?q=` | Page search |
//! | `DELETE` | `/cases/{case_id}` | Delete every bundle of the case |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "gate_error", "message": "…", "reason": "REQUIRES_COMPLETION" } }
//! ```
//!
//! Error codes: `validation` (400), `not_found` (404), `gate_error` (400),
//! `extraction_failed` (502), `internal` (500).

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use bundle_harness_core::error::BundleError;
use bundle_harness_core::gate::View;
use bundle_harness_core::models::Scope;

use crate::config::Config;
use crate::processor::ContinueOutcome;
use crate::progress::NoProgress;
use crate::service::{
    BundleService, PhaseAOutcome, SearchResponse, StartFull, StartPhaseA, StatusResponse, ViewPayload,
};

pub const ORG_HEADER: &str = "x-org-id";

#[derive(Clone)]
struct AppState {
    service: Arc<BundleService>,
}

pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let service = BundleService::open(config).await?;
    run_server_with_service(config, Arc::new(service)).await
}

/// Serve an already-built service on `[server].bind`.
pub async fn run_server_with_service(config: &Config, service: Arc<BundleService>) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let app = router(service);

    info!(bind = %bind_addr, "bundle server listening");
    println!("Bundle server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

pub fn router(service: Arc<BundleService>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/cases/{case_id}", delete(handle_delete_case))
        .route("/cases/{case_id}/bundle", get(handle_status))
        .route("/cases/{case_id}/bundles/phase-a", post(handle_phase_a))
        .route("/cases/{case_id}/bundles/full", post(handle_full))
        .route("/cases/{case_id}/bundles/{bundle_id}/continue", post(handle_continue))
        .route("/cases/{case_id}/bundles/{bundle_id}/search", get(handle_search))
        .route("/cases/{case_id}/bundles/{bundle_id}/{view}", get(handle_view))
        .layer(cors)
        .with_state(AppState { service })
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
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
    reason: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
                reason: self.reason,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<BundleError> for AppError {
    fn from(err: BundleError) -> Self {
        let status = match &err {
            BundleError::Validation(_) | BundleError::Gate(_) => StatusCode::BAD_REQUEST,
            BundleError::NotFound(_) => StatusCode::NOT_FOUND,
            BundleError::FatalProcessing { .. } | BundleError::Extraction(_) => StatusCode::BAD_GATEWAY,
            BundleError::Store(e) => {
                error!(error = %e, "store failure");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let (message, reason) = match &err {
            BundleError::Gate(rejection) => (rejection.message().to_string(), Some(rejection.code().to_string())),
            other => (other.to_string(), None),
        };
        AppError {
            status,
            code: err.code().to_string(),
            message,
            reason,
        }
    }
}

fn validation(message: impl Into<String>) -> AppError {
    AppError::from(BundleError::validation(message))
}

fn scope(case_id: String, headers: &HeaderMap) -> Result<Scope, AppError> {
    let org_id = headers
        .get(ORG_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| validation(format!("missing {} header", ORG_HEADER)))?;
    Ok(Scope::new(case_id, org_id))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ Bundle creation ============

async fn handle_phase_a(
    State(state): State<AppState>,
    Path(case_id): Path<String>,
    headers: HeaderMap,
    body: Result<Json<StartPhaseA>, JsonRejection>,
) -> Result<Json<PhaseAOutcome>, AppError> {
    let scope = scope(case_id, &headers)?;
    let Json(req) = body.map_err(|e| validation(e.body_text()))?;
    Ok(Json(state.service.start_phase_a(&scope, req).await?))
}

async fn handle_full(
    State(state): State<AppState>,
    Path(case_id): Path<String>,
    headers: HeaderMap,
    body: Result<Json<StartFull>, JsonRejection>,
) -> Result<Json<ContinueOutcome>, AppError> {
    let scope = scope(case_id, &headers)?;
    let Json(req) = body.map_err(|e| validation(e.body_text()))?;
    Ok(Json(state.service.start_full(&scope, req, &NoProgress).await?))
}

// ============ POST /continue ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContinueParams {
    max_chunks: Option<u32>,
}

async fn handle_continue(
    State(state): State<AppState>,
    Path((case_id, bundle_id)): Path<(String, String)>,
    headers: HeaderMap,
    params: Result<Query<ContinueParams>, QueryRejection>,
) -> Result<Json<ContinueOutcome>, AppError> {
    let scope = scope(case_id, &headers)?;
    let Query(params) = params.map_err(|e| validation(e.body_text()))?;
    let outcome = state
        .service
        .continue_processing(&scope, &bundle_id, params.max_chunks, &NoProgress)
        .await?;
    Ok(Json(outcome))
}

// ============ Reads ============

async fn handle_status(
    State(state): State<AppState>,
    Path(case_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<StatusResponse>, AppError> {
    let scope = scope(case_id, &headers)?;
    Ok(Json(state.service.status(&scope).await?))
}

async fn handle_view(
    State(state): State<AppState>,
    Path((case_id, bundle_id, view)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Result<Json<ViewPayload>, AppError> {
    let scope = scope(case_id, &headers)?;
    let view: View = view
        .parse()
        .map_err(|e: anyhow::Error| AppError {
            status: StatusCode::NOT_FOUND,
            code: "not_found".to_string(),
            message: e.to_string(),
            reason: None,
        })?;
    Ok(Json(state.service.view(&scope, &bundle_id, view).await?))
}

#[derive(Deserialize)]
struct SearchQuery {
    #[serde(default)]
    q: String,
}

async fn handle_search(
    State(state): State<AppState>,
    Path((case_id, bundle_id)): Path<(String, String)>,
    headers: HeaderMap,
    query: Result<Query<SearchQuery>, QueryRejection>,
) -> Result<Json<SearchResponse>, AppError> {
    let scope = scope(case_id, &headers)?;
    let Query(query) = query.map_err(|e| validation(e.body_text()))?;
    Ok(Json(state.service.search(&scope, &bundle_id, &query.q).await?))
}

// ============ DELETE /cases/{case_id} ============

#[derive(Serialize)]
struct DeleteResponse {
    deleted: u64,
}

async fn handle_delete_case(
    State(state): State<AppState>,
    Path(case_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<DeleteResponse>, AppError> {
    let scope = scope(case_id, &headers)?;
    let deleted = state.service.delete_case(&scope).await?;
    Ok(Json(DeleteResponse { deleted }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bundle_harness_core::error::GateRejection;

    #[test]
    fn gate_errors_carry_reason() {
        let err = AppError::from(BundleError::Gate(GateRejection::RequiresCompletion));
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.code, "gate_error");
        assert_eq!(err.reason.as_deref(), Some("REQUIRES_COMPLETION"));
    }

    #[test]
    fn status_codes_follow_error_kind() {
        assert_eq!(AppError::from(BundleError::bundle_not_found("x")).status, StatusCode::NOT_FOUND);
        assert_eq!(AppError::from(BundleError::validation("bad")).status, StatusCode::BAD_REQUEST);
        let fatal = BundleError::FatalProcessing {
            chunk_index: 2,
            attempts: 3,
            message: "timeout".to_string(),
        };
        assert_eq!(AppError::from(fatal).status, StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn org_header_is_required() {
        let headers = HeaderMap::new();
        assert!(scope("case-1".to_string(), &headers).is_err());

        let mut headers = HeaderMap::new();
        headers.insert(ORG_HEADER, "org-1".parse().unwrap());
        let s = scope("case-1".to_string(), &headers).unwrap();
        assert_eq!(s.org_id, "org-1");
    }
}
