//! crates/tax_analysis_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, keeping the
//! analysis workflow independent of the concrete database and blob store.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::{
    Analysis, AnalysisStatus, AnalysisSummary, NewAnalysis, NewDocument, NewSession,
    ProcessingStatus, Session, SessionId, SessionStep, UploadedDocument,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, storage).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Session expired: {0}")]
    Expired(String),
    #[error("Step {0} is outside the workflow range 0..=4")]
    InvalidStep(i32),
    #[error("Illegal step transition from {from} to {to}")]
    InvalidTransition { from: i32, to: i32 },
    #[error("Invalid input: {0}")]
    Validation(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- Sessions ---
    /// Calls the server-side unique id procedure.
    async fn generate_session_id(&self) -> PortResult<SessionId>;

    async fn create_session(&self, session: NewSession) -> PortResult<Session>;

    async fn get_session_by_id(&self, session_id: &SessionId) -> PortResult<Session>;

    /// Calls the server-side procedure that merges `step_data` into the session's
    /// inputs and moves `current_step` from `from` to `to`, atomically.
    ///
    /// Fails with `InvalidTransition` if the session has left `from` in the meantime.
    async fn update_session_progress(
        &self,
        session_id: &SessionId,
        from: SessionStep,
        to: SessionStep,
        step_data: Value,
    ) -> PortResult<()>;

    /// Calls the server-side error logging procedure.
    async fn log_session_error(
        &self,
        session_id: &SessionId,
        message: &str,
        data: Value,
    ) -> PortResult<()>;

    async fn count_session_documents(&self, session_id: &SessionId) -> PortResult<i64>;

    async fn set_session_file_count(
        &self,
        session_id: &SessionId,
        count: i64,
        updated_at: DateTime<Utc>,
    ) -> PortResult<()>;

    /// Deletes every session whose expiry is at or before `now`, returning how many went.
    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> PortResult<u64>;

    // --- Documents ---
    async fn create_document(&self, document: NewDocument) -> PortResult<UploadedDocument>;

    async fn update_document_processing(
        &self,
        document_id: Uuid,
        user_id: Uuid,
        status: ProcessingStatus,
        extracted_data: Value,
        processed_at: DateTime<Utc>,
    ) -> PortResult<UploadedDocument>;

    /// Documents for a session, oldest upload first.
    async fn get_documents_for_session(
        &self,
        session_id: &SessionId,
        user_id: Uuid,
    ) -> PortResult<Vec<UploadedDocument>>;

    // --- Analyses ---
    async fn create_analysis(&self, analysis: NewAnalysis) -> PortResult<Analysis>;

    /// Removes the user's existing analyses for the session and inserts `analysis`
    /// as a single unit of work.
    async fn replace_session_analysis(&self, analysis: NewAnalysis) -> PortResult<Analysis>;

    async fn get_analysis_for_session(
        &self,
        session_id: &SessionId,
        user_id: Uuid,
    ) -> PortResult<Analysis>;

    /// Summaries for a user, newest first.
    async fn list_analysis_summaries(
        &self,
        user_id: Uuid,
        status: Option<AnalysisStatus>,
        limit: Option<u32>,
    ) -> PortResult<Vec<AnalysisSummary>>;

    /// Returns `false` if nothing matched.
    async fn delete_analysis(&self, analysis_id: Uuid, user_id: Uuid) -> PortResult<bool>;
}

#[async_trait]
pub trait BlobStorageService: Send + Sync {
    /// Stores `bytes` under `path` and returns a URL for the stored object.
    async fn put_object(&self, path: &str, bytes: Bytes) -> PortResult<String>;

    /// Removes the object at `path`. Removing a missing object is not an error.
    async fn delete_object(&self, path: &str) -> PortResult<()>;
}
