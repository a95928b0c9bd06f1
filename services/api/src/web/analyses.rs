//! services/api/src/web/analyses.rs
//!
//! Handlers for saving corporate tax analyses and reading them back.

use crate::web::{
    middleware::AuthenticatedUser,
    rest::{port_error, HandlerError},
    sessions::context_for,
    state::AppState,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tax_analysis_core::{SessionId, DEFAULT_HISTORY_LIMIT};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

const MAX_HISTORY_LIMIT: u32 = 100;

#[derive(Deserialize, ToSchema)]
pub struct SaveAnalysisRequest {
    /// The raw analysis result, normalized into a report before it is stored.
    #[schema(value_type = Object)]
    pub analysis: Value,
    #[serde(default)]
    pub processing_time_seconds: f64,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct HistoryQuery {
    /// Maximum number of analyses to return.
    pub limit: Option<u32>,
}

impl HistoryQuery {
    fn effective_limit(&self) -> u32 {
        self.limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT)
    }
}

/// Save the analysis for a session and mark the session completed.
#[utoipa::path(
    post,
    path = "/sessions/{session_id}/analysis",
    request_body = SaveAnalysisRequest,
    responses(
        (status = 201, description = "The stored analysis"),
        (status = 404, description = "Session not found"),
        (status = 410, description = "Session expired")
    ),
    params(
        ("session_id" = String, Path, description = "Session identifier."),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn save_analysis_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(session_id): Path<String>,
    Json(req): Json<SaveAnalysisRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let ctx = context_for(&app_state, user, session_id).await?;
    let analysis = app_state
        .manager
        .save_corporate_tax_analysis(&ctx, req.analysis, req.processing_time_seconds)
        .await
        .map_err(|e| port_error("save analysis", e))?;
    Ok((StatusCode::CREATED, Json(analysis)))
}

/// Fetch the analysis already stored for a session.
#[utoipa::path(
    get,
    path = "/sessions/{session_id}/analysis",
    responses(
        (status = 200, description = "The stored analysis"),
        (status = 404, description = "No analysis saved for this session")
    ),
    params(
        ("session_id" = String, Path, description = "Session identifier."),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn get_session_analysis_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, HandlerError> {
    // Analyses outlive their sessions, so no session lookup here.
    let existing = app_state
        .manager
        .get_existing_analysis(user.0, &SessionId::new(session_id))
        .await
        .map_err(|e| port_error("load analysis", e))?;
    existing
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, "No analysis for this session".to_string()))
}

/// The caller's most recent analyses.
#[utoipa::path(
    get,
    path = "/analyses",
    params(
        HistoryQuery,
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    ),
    responses(
        (status = 200, description = "Analysis summaries, newest first")
    )
)]
pub async fn history_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, HandlerError> {
    let history = app_state
        .manager
        .get_user_analysis_history(user.0, query.effective_limit())
        .await
        .map_err(|e| port_error("load analysis history", e))?;
    Ok(Json(history))
}

/// Aggregate figures over the caller's completed analyses.
#[utoipa::path(
    get,
    path = "/analyses/statistics",
    params(
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    ),
    responses(
        (status = 200, description = "Statistics, or null with a warning if they could not be computed")
    )
)]
pub async fn statistics_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
) -> impl IntoResponse {
    Json(app_state.manager.get_analysis_statistics(user.0).await)
}

/// Delete one of the caller's analyses.
#[utoipa::path(
    delete,
    path = "/analyses/{analysis_id}",
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "No such analysis for this user")
    ),
    params(
        ("analysis_id" = Uuid, Path, description = "Analysis identifier."),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn delete_analysis_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(analysis_id): Path<Uuid>,
) -> Result<impl IntoResponse, HandlerError> {
    let deleted = app_state
        .manager
        .delete_analysis(user.0, analysis_id)
        .await
        .map_err(|e| port_error("delete analysis", e))?;
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err((StatusCode::NOT_FOUND, "Analysis not found".to_string()))
    }
}
