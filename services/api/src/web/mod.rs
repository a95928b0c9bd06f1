pub mod analyses;
pub mod documents;
pub mod middleware;
pub mod rest;
pub mod sessions;
pub mod state;

use crate::error::ApiError;
use axum::{
    extract::DefaultBodyLimit,
    http::{header::{ACCEPT, CONTENT_TYPE}, HeaderName, HeaderValue, Method},
    middleware as axum_middleware,
    routing::{delete, get, patch, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

pub use middleware::require_user;
pub use state::AppState;

/// Builds the REST router. Every route requires the `x-user-id` header.
pub fn router(app_state: Arc<AppState>) -> Result<Router, ApiError> {
    let origin = app_state.config.cors_origin.parse::<HeaderValue>()?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            CONTENT_TYPE,
            ACCEPT,
            HeaderName::from_static(middleware::USER_ID_HEADER),
        ]);

    let routes = Router::new()
        .route("/sessions", post(sessions::create_session_handler))
        .route("/sessions/{session_id}", get(sessions::get_session_handler))
        .route(
            "/sessions/{session_id}/progress",
            post(sessions::update_progress_handler),
        )
        .route(
            "/sessions/{session_id}/errors",
            post(sessions::log_error_handler),
        )
        .route(
            "/sessions/{session_id}/file-count",
            post(sessions::refresh_file_count_handler),
        )
        .route(
            "/sessions/{session_id}/documents",
            post(documents::upload_document_handler).get(documents::list_documents_handler),
        )
        .route(
            "/sessions/{session_id}/data-room-documents",
            post(documents::attach_data_room_handler),
        )
        .route(
            "/documents/{document_id}/processing",
            patch(documents::update_processing_handler),
        )
        .route(
            "/sessions/{session_id}/analysis",
            post(analyses::save_analysis_handler).get(analyses::get_session_analysis_handler),
        )
        .route("/analyses", get(analyses::history_handler))
        .route("/analyses/statistics", get(analyses::statistics_handler))
        .route(
            "/analyses/{analysis_id}",
            delete(analyses::delete_analysis_handler),
        )
        .layer(axum_middleware::from_fn(require_user));

    let body_limit = app_state.config.max_upload_bytes;
    Ok(routes
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .with_state(app_state))
}
