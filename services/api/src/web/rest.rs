//! services/api/src/web/rest.rs
//!
//! The master definition for the OpenAPI document and the helpers shared by
//! every REST handler.

use axum::http::StatusCode;
use tax_analysis_core::PortError;
use tracing::{error, warn};
use utoipa::OpenApi;

use crate::web::{analyses, documents, sessions};

/// The error half of every handler's result.
pub type HandlerError = (StatusCode, String);

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        sessions::create_session_handler,
        sessions::get_session_handler,
        sessions::update_progress_handler,
        sessions::log_error_handler,
        sessions::refresh_file_count_handler,
        documents::upload_document_handler,
        documents::attach_data_room_handler,
        documents::list_documents_handler,
        documents::update_processing_handler,
        analyses::save_analysis_handler,
        analyses::get_session_analysis_handler,
        analyses::history_handler,
        analyses::statistics_handler,
        analyses::delete_analysis_handler,
    ),
    components(
        schemas(
            sessions::CreateSessionRequest,
            sessions::CreateSessionResponse,
            sessions::ProgressRequest,
            sessions::SessionErrorRequest,
            documents::DataRoomRequest,
            documents::ProcessingUpdateRequest,
            analyses::SaveAnalysisRequest,
        )
    ),
    tags(
        (name = "Tax Analysis API", description = "Session-scoped corporate tax analysis workflow.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Error Mapping
//=========================================================================================

pub fn status_for(e: &PortError) -> StatusCode {
    match e {
        PortError::NotFound(_) => StatusCode::NOT_FOUND,
        PortError::Unauthorized => StatusCode::FORBIDDEN,
        PortError::Expired(_) => StatusCode::GONE,
        PortError::InvalidStep(_) | PortError::Validation(_) => StatusCode::BAD_REQUEST,
        PortError::InvalidTransition { .. } => StatusCode::CONFLICT,
        PortError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Logs `e` and turns it into a response. Internal details are not sent to clients.
pub fn port_error(action: &str, e: PortError) -> HandlerError {
    let status = status_for(&e);
    if status.is_server_error() {
        error!("Failed to {}: {:?}", action, e);
        (status, format!("Failed to {}", action))
    } else {
        warn!("Rejected request to {}: {}", action, e);
        (status, e.to_string())
    }
}
