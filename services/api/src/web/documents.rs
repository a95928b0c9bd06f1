//! services/api/src/web/documents.rs
//!
//! Handlers for attaching documents to a session and tracking their processing.

use crate::{
    adapters::blob::upload_path,
    web::{
        middleware::AuthenticatedUser,
        rest::{port_error, HandlerError},
        sessions::context_for,
        state::AppState,
    },
};
use axum::{
    extract::{multipart::Field, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use bytes::Bytes;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tax_analysis_core::{DataRoomDocument, FileUpload, ProcessingStatus};
use tracing::warn;
use utoipa::ToSchema;
use uuid::Uuid;

const DEFAULT_DOCUMENT_TYPE: &str = "other";
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Deserialize, ToSchema)]
pub struct DataRoomRequest {
    #[schema(value_type = Vec<Object>)]
    pub documents: Vec<DataRoomDocument>,
}

#[derive(Deserialize, ToSchema)]
pub struct ProcessingUpdateRequest {
    #[schema(value_type = String, example = "completed")]
    pub status: ProcessingStatus,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub extracted_data: Value,
}

fn bad_multipart(e: impl std::fmt::Display) -> HandlerError {
    warn!("Malformed multipart upload: {}", e);
    (StatusCode::BAD_REQUEST, format!("Malformed upload: {}", e))
}

async fn read_file_field(field: Field<'_>) -> Result<FileUpload, HandlerError> {
    let file_name = field
        .file_name()
        .map(str::to_string)
        .filter(|n| !n.is_empty())
        .ok_or((StatusCode::BAD_REQUEST, "The file part has no file name".to_string()))?;
    let content_type = field
        .content_type()
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string();
    let bytes: Bytes = field.bytes().await.map_err(bad_multipart)?;
    Ok(FileUpload {
        file_name,
        content_type,
        bytes,
    })
}

/// Upload a file to storage and record it against the session.
#[utoipa::path(
    post,
    path = "/sessions/{session_id}/documents",
    request_body(content_type = "multipart/form-data", description = "A `file` part and an optional `document_type` text part."),
    responses(
        (status = 201, description = "Document stored; body lists any non-fatal warnings"),
        (status = 400, description = "Missing file part or malformed form"),
        (status = 404, description = "Session not found")
    ),
    params(
        ("session_id" = String, Path, description = "Session identifier."),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn upload_document_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(session_id): Path<String>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, HandlerError> {
    let ctx = context_for(&app_state, user, session_id).await?;

    let mut upload = None;
    let mut document_type = DEFAULT_DOCUMENT_TYPE.to_string();
    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => upload = Some(read_file_field(field).await?),
            Some("document_type") => {
                let text = field.text().await.map_err(bad_multipart)?;
                if !text.trim().is_empty() {
                    document_type = text.trim().to_string();
                }
            }
            _ => {}
        }
    }
    let upload =
        upload.ok_or((StatusCode::BAD_REQUEST, "Missing 'file' part".to_string()))?;

    let path = upload_path(
        &ctx.user_id,
        ctx.session_id.as_str(),
        &upload.file_name,
        Utc::now().timestamp_millis(),
    );
    let storage_url = app_state
        .blob
        .put_object(&path, upload.bytes.clone())
        .await
        .map_err(|e| port_error("store upload", e))?;

    let saved = app_state
        .manager
        .save_uploaded_document(&ctx, &upload, &document_type, &path, Some(storage_url))
        .await;
    let outcome = match saved {
        Ok(outcome) => outcome,
        Err(e) => {
            // The row never landed, so nothing references the stored bytes.
            if let Err(cleanup) = app_state.blob.delete_object(&path).await {
                warn!(path = %path, "Failed to remove orphaned upload: {}", cleanup);
            }
            return Err(port_error("save document", e));
        }
    };

    Ok((StatusCode::CREATED, Json(outcome)))
}

/// Attach documents that already live in the data room.
#[utoipa::path(
    post,
    path = "/sessions/{session_id}/data-room-documents",
    request_body = DataRoomRequest,
    responses(
        (status = 200, description = "The stored documents; skipped ones appear as warnings")
    ),
    params(
        ("session_id" = String, Path, description = "Session identifier."),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn attach_data_room_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(session_id): Path<String>,
    Json(req): Json<DataRoomRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let ctx = context_for(&app_state, user, session_id).await?;
    let outcome = app_state
        .manager
        .save_data_room_documents(&ctx, &req.documents)
        .await;
    Ok(Json(outcome))
}

/// List the session's documents in upload order.
#[utoipa::path(
    get,
    path = "/sessions/{session_id}/documents",
    responses(
        (status = 200, description = "Documents attached to the session")
    ),
    params(
        ("session_id" = String, Path, description = "Session identifier."),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn list_documents_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, HandlerError> {
    let ctx = context_for(&app_state, user, session_id).await?;
    let documents = app_state
        .manager
        .get_session_documents(&ctx)
        .await
        .map_err(|e| port_error("list documents", e))?;
    Ok(Json(documents))
}

/// Record the processing result for one document.
#[utoipa::path(
    patch,
    path = "/documents/{document_id}/processing",
    request_body = ProcessingUpdateRequest,
    responses(
        (status = 200, description = "The updated document"),
        (status = 404, description = "No such document for this user")
    ),
    params(
        ("document_id" = Uuid, Path, description = "Document identifier."),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn update_processing_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(document_id): Path<Uuid>,
    Json(req): Json<ProcessingUpdateRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let document = app_state
        .manager
        .update_document_processing_status(user.0, document_id, req.status, req.extracted_data)
        .await
        .map_err(|e| port_error("update document processing", e))?;
    Ok(Json(document))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn processing_update_accepts_snake_case_status() {
        let req: ProcessingUpdateRequest = serde_json::from_value(json!({
            "status": "completed",
            "extracted_data": {"revenue": 1200000}
        }))
        .unwrap();
        assert_eq!(req.status, ProcessingStatus::Completed);
        assert_eq!(req.extracted_data["revenue"], 1200000);

        let bare: ProcessingUpdateRequest =
            serde_json::from_value(json!({"status": "failed"})).unwrap();
        assert!(bare.extracted_data.is_null());
    }

    #[test]
    fn data_room_request_parses_documents() {
        let req: DataRoomRequest = serde_json::from_value(json!({
            "documents": [{
                "file_name": "ledger.xlsx",
                "file_size": 2048,
                "content_type": "application/vnd.ms-excel",
                "file_path": "room/ledger.xlsx",
                "storage_url": null,
                "category": "financial_statement"
            }]
        }))
        .unwrap();
        assert_eq!(req.documents.len(), 1);
        assert_eq!(req.documents[0].category, "financial_statement");
    }
}
