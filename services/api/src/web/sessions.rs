//! services/api/src/web/sessions.rs
//!
//! Handlers for creating and advancing analysis sessions.

use crate::web::{
    middleware::AuthenticatedUser,
    rest::{port_error, HandlerError},
    state::AppState,
};
use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json},
    Extension,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tax_analysis_core::{BrowserInfo, SessionContext, SessionId, SessionStep};
use utoipa::ToSchema;
use uuid::Uuid;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// Client-side details the server cannot read from request headers.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CreateSessionRequest {
    pub platform: Option<String>,
    pub language: Option<String>,
    pub cookies_enabled: Option<bool>,
    pub viewport_width: Option<u32>,
    pub viewport_height: Option<u32>,
}

#[derive(Serialize, ToSchema)]
pub struct CreateSessionResponse {
    session_id: String,
    user_id: Uuid,
    current_step: i32,
    total_steps: i32,
}

#[derive(Deserialize, ToSchema)]
pub struct ProgressRequest {
    pub step: i32,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub data: Value,
}

#[derive(Deserialize, ToSchema)]
pub struct SessionErrorRequest {
    pub message: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub data: Value,
}

//=========================================================================================
// Helpers
//=========================================================================================

/// Builds the environment snapshot from request headers, preferring whatever the
/// client reported itself.
pub fn browser_info_from(headers: &HeaderMap, reported: CreateSessionRequest) -> BrowserInfo {
    let header_str = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    let platform = reported.platform.or_else(|| {
        header_str("sec-ch-ua-platform").map(|p| p.trim_matches('"').to_string())
    });
    let language = reported.language.or_else(|| {
        header_str(header::ACCEPT_LANGUAGE.as_str()).and_then(|l| {
            l.split([',', ';'])
                .next()
                .map(|tag| tag.trim().to_string())
                .filter(|tag| !tag.is_empty())
        })
    });

    BrowserInfo {
        user_agent: header_str(header::USER_AGENT.as_str()).unwrap_or_default(),
        platform: platform.unwrap_or_default(),
        language: language.unwrap_or_default(),
        cookies_enabled: reported
            .cookies_enabled
            .unwrap_or_else(|| headers.contains_key(header::COOKIE)),
        viewport_width: reported.viewport_width.unwrap_or(0),
        viewport_height: reported.viewport_height.unwrap_or(0),
    }
}

/// Loads the session and checks the caller owns it.
pub async fn context_for(
    app_state: &AppState,
    user: AuthenticatedUser,
    session_id: String,
) -> Result<SessionContext, HandlerError> {
    app_state
        .manager
        .resolve_context(user.0, SessionId::new(session_id))
        .await
        .map_err(|e| port_error("resolve session", e))
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Start a new analysis session.
#[utoipa::path(
    post,
    path = "/sessions",
    request_body(content = CreateSessionRequest, description = "Optional client environment details."),
    responses(
        (status = 201, description = "Session created", body = CreateSessionResponse),
        (status = 401, description = "Missing or invalid x-user-id header"),
        (status = 500, description = "Internal server error")
    ),
    params(
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn create_session_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    headers: HeaderMap,
    body: Option<Json<CreateSessionRequest>>,
) -> Result<impl IntoResponse, HandlerError> {
    let reported = body.map(|Json(b)| b).unwrap_or_default();
    let browser_info = browser_info_from(&headers, reported);

    let (ctx, session) = app_state
        .manager
        .initialize_session(user.0, browser_info)
        .await
        .map_err(|e| port_error("create session", e))?;

    let response = CreateSessionResponse {
        session_id: ctx.session_id.to_string(),
        user_id: ctx.user_id,
        current_step: session.current_step.index(),
        total_steps: session.total_steps,
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// Fetch the caller's session.
#[utoipa::path(
    get,
    path = "/sessions/{session_id}",
    responses(
        (status = 200, description = "The stored session"),
        (status = 404, description = "No such session for this user")
    ),
    params(
        ("session_id" = String, Path, description = "Session identifier."),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn get_session_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, HandlerError> {
    let ctx = SessionContext::new(SessionId::new(session_id), user.0);
    match app_state.manager.get_session_data(&ctx).await {
        Ok(Some(session)) => Ok(Json(session)),
        Ok(None) => Err((StatusCode::NOT_FOUND, "Session not found".to_string())),
        Err(e) => Err(port_error("load session", e)),
    }
}

/// Record the data for a step and move the session to it.
#[utoipa::path(
    post,
    path = "/sessions/{session_id}/progress",
    request_body = ProgressRequest,
    responses(
        (status = 204, description = "Progress saved"),
        (status = 400, description = "Step outside 0..=4"),
        (status = 409, description = "Illegal step transition"),
        (status = 410, description = "Session expired")
    ),
    params(
        ("session_id" = String, Path, description = "Session identifier."),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn update_progress_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(session_id): Path<String>,
    Json(req): Json<ProgressRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let ctx = context_for(&app_state, user, session_id).await?;
    app_state
        .manager
        .update_session_progress(&ctx, req.step, req.data)
        .await
        .map_err(|e| port_error("update progress", e))?;

    if req.step == SessionStep::Completed.index() {
        tracing::info!(session_id = %ctx.session_id, "Session reached its final step");
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Record a client-side error against the session.
#[utoipa::path(
    post,
    path = "/sessions/{session_id}/errors",
    request_body = SessionErrorRequest,
    responses(
        (status = 202, description = "Accepted; body lists any logging failures")
    ),
    params(
        ("session_id" = String, Path, description = "Session identifier."),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn log_error_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(session_id): Path<String>,
    Json(req): Json<SessionErrorRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let ctx = context_for(&app_state, user, session_id).await?;
    let outcome = app_state
        .manager
        .log_session_error(&ctx, &req.message, req.data)
        .await;
    Ok((StatusCode::ACCEPTED, Json(outcome)))
}

/// Recount the session's documents.
#[utoipa::path(
    post,
    path = "/sessions/{session_id}/file-count",
    responses(
        (status = 200, description = "The new count, or null with a warning")
    ),
    params(
        ("session_id" = String, Path, description = "Session identifier."),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn refresh_file_count_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, HandlerError> {
    let ctx = context_for(&app_state, user, session_id).await?;
    Ok(Json(app_state.manager.update_session_file_count(&ctx).await))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn browser_info_comes_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, HeaderValue::from_static("Mozilla/5.0 (X11)"));
        headers.insert("sec-ch-ua-platform", HeaderValue::from_static("\"Linux\""));
        headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("de-DE,de;q=0.9,en;q=0.8"),
        );
        headers.insert(header::COOKIE, HeaderValue::from_static("a=b"));

        let info = browser_info_from(&headers, CreateSessionRequest::default());

        assert_eq!(info.user_agent, "Mozilla/5.0 (X11)");
        assert_eq!(info.platform, "Linux");
        assert_eq!(info.language, "de-DE");
        assert!(info.cookies_enabled);
        assert_eq!(info.viewport_width, 0);
    }

    #[test]
    fn reported_values_win_over_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static("fr"));

        let info = browser_info_from(
            &headers,
            CreateSessionRequest {
                platform: Some("MacIntel".to_string()),
                language: Some("en-GB".to_string()),
                cookies_enabled: Some(false),
                viewport_width: Some(1440),
                viewport_height: Some(900),
            },
        );

        assert_eq!(info.platform, "MacIntel");
        assert_eq!(info.language, "en-GB");
        assert!(!info.cookies_enabled);
        assert_eq!((info.viewport_width, info.viewport_height), (1440, 900));
        assert_eq!(info.user_agent, "");
    }
}
