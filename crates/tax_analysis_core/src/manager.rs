//! crates/tax_analysis_core/src/manager.rs
//!
//! The analysis session manager: coordinates the upload, analyze, persist and
//! report workflow of one user's tax analysis against the `DatabaseService` port.
//!
//! The manager keeps no per-workflow state. Session-scoped calls take a
//! `SessionContext`; user-scoped calls take the user id.

use chrono::{Duration, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::domain::{
    Analysis, AnalysisPolicy, AnalysisStatus, AnalysisSummary, BrowserInfo, DataRoomDocument,
    DocumentMetadata, FileUpload, NewAnalysis, NewDocument, NewSession, ProcessingStatus,
    ProgressPolicy, Provenance, Session, SessionContext, SessionId, SessionStep, UploadStatus,
    UploadedDocument,
};
use crate::hashing::generate_file_hash;
use crate::outcome::Outcome;
use crate::ports::{DatabaseService, PortError, PortResult};
use crate::report::format_report_data;
use crate::stats::{compute_statistics, AnalysisStatistics};

pub const DEFAULT_HISTORY_LIMIT: u32 = 10;

/// Tunables for the manager.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// How long a session lives before the sweep may delete it.
    pub session_ttl: Duration,
    pub progress: ProgressPolicy,
    pub analysis: AnalysisPolicy,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            session_ttl: Duration::hours(24),
            progress: ProgressPolicy::default(),
            analysis: AnalysisPolicy::default(),
        }
    }
}

#[derive(Clone)]
pub struct AnalysisSessionManager {
    db: Arc<dyn DatabaseService>,
    config: ManagerConfig,
}

impl AnalysisSessionManager {
    pub fn new(db: Arc<dyn DatabaseService>, config: ManagerConfig) -> Self {
        Self { db, config }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    //=====================================================================================
    // Sessions
    //=====================================================================================

    /// Starts a new workflow for `user_id` at step 0.
    pub async fn initialize_session(
        &self,
        user_id: Uuid,
        browser_info: BrowserInfo,
    ) -> PortResult<(SessionContext, Session)> {
        let now = Utc::now();
        let expires_at = now
            .checked_add_signed(self.config.session_ttl)
            .ok_or_else(|| {
                PortError::Validation(format!(
                    "session lifetime of {} hours is out of range",
                    self.config.session_ttl.num_hours()
                ))
            })?;
        let session_id = self.db.generate_session_id().await?;

        let session = self
            .db
            .create_session(NewSession {
                id: session_id,
                user_id,
                browser_info,
                user_inputs: json!({ "initialized_at": now.to_rfc3339() }),
                expires_at,
            })
            .await?;

        info!(session_id = %session.id, %user_id, "Analysis session initialized");
        Ok((SessionContext::new(session.id.clone(), user_id), session))
    }

    /// Builds a context for an existing session, checking ownership and expiry.
    pub async fn resolve_context(
        &self,
        user_id: Uuid,
        session_id: SessionId,
    ) -> PortResult<SessionContext> {
        let session = self.db.get_session_by_id(&session_id).await?;
        if session.user_id != user_id {
            return Err(PortError::Unauthorized);
        }
        if session.is_expired(Utc::now()) {
            return Err(PortError::Expired(session_id.to_string()));
        }
        Ok(SessionContext::new(session_id, user_id))
    }

    /// Merges `step_data` into the session and moves it to `step`.
    ///
    /// The step change is checked against the transition table before anything is
    /// sent to the database, and the write only lands if the session is still at
    /// the step the check was made against.
    pub async fn update_session_progress(
        &self,
        ctx: &SessionContext,
        step: i32,
        step_data: Value,
    ) -> PortResult<()> {
        let target = SessionStep::from_index(step)?;
        let session = self.owned_session(ctx).await?;
        SessionStep::check_transition(session.current_step, target, &self.config.progress)?;

        self.db
            .update_session_progress(&ctx.session_id, session.current_step, target, step_data)
            .await?;
        debug!(session_id = %ctx.session_id, step, "Session progress updated");
        Ok(())
    }

    /// Records an error against the session. Never fails.
    pub async fn log_session_error(
        &self,
        ctx: &SessionContext,
        message: &str,
        data: Value,
    ) -> Outcome<()> {
        let mut outcome = Outcome::ok(());
        if let Err(e) = self
            .db
            .log_session_error(&ctx.session_id, message, data)
            .await
        {
            outcome.warn(
                "log_session_error",
                format!("Failed to log session error '{}': {}", message, e),
            );
        }
        outcome
    }

    /// The stored session, or `None` if it does not exist or is not the caller's.
    pub async fn get_session_data(&self, ctx: &SessionContext) -> PortResult<Option<Session>> {
        match self.db.get_session_by_id(&ctx.session_id).await {
            Ok(session) if session.user_id == ctx.user_id => Ok(Some(session)),
            Ok(_) => {
                debug!(session_id = %ctx.session_id, "Session belongs to another user");
                Ok(None)
            }
            Err(PortError::NotFound(msg)) => {
                debug!("Session lookup came back empty: {}", msg);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Recounts the session's documents and writes the count onto the session.
    pub async fn update_session_file_count(&self, ctx: &SessionContext) -> Outcome<Option<i64>> {
        let result = async {
            let count = self.db.count_session_documents(&ctx.session_id).await?;
            self.db
                .set_session_file_count(&ctx.session_id, count, Utc::now())
                .await?;
            Ok::<_, PortError>(count)
        }
        .await;

        match result {
            Ok(count) => Outcome::ok(Some(count)),
            Err(e) => {
                let mut outcome = Outcome::ok(None);
                outcome.warn(
                    "update_session_file_count",
                    format!(
                        "Failed to refresh file count for session {}: {}",
                        ctx.session_id, e
                    ),
                );
                outcome
            }
        }
    }

    /// Deletes every session past its expiry. Never fails.
    pub async fn cleanup_expired_sessions(&self) -> Outcome<u64> {
        match self.db.delete_expired_sessions(Utc::now()).await {
            Ok(deleted) => {
                if deleted > 0 {
                    info!(deleted, "Expired analysis sessions removed");
                }
                Outcome::ok(deleted)
            }
            Err(e) => {
                let mut outcome = Outcome::ok(0);
                outcome.warn(
                    "cleanup_expired_sessions",
                    format!("Failed to delete expired sessions: {}", e),
                );
                outcome
            }
        }
    }

    //=====================================================================================
    // Documents
    //=====================================================================================

    /// Saves the metadata of a file the user uploaded, then refreshes the session's
    /// file count.
    pub async fn save_uploaded_document(
        &self,
        ctx: &SessionContext,
        file: &FileUpload,
        document_type: &str,
        file_path: &str,
        storage_url: Option<String>,
    ) -> PortResult<Outcome<UploadedDocument>> {
        let hash = generate_file_hash(&file.bytes[..]).await;
        let hash_fell_back = !hash.is_fingerprint();

        let document = self
            .db
            .create_document(NewDocument {
                session_id: ctx.session_id.clone(),
                user_id: ctx.user_id,
                file_name: file.file_name.clone(),
                file_size: file.bytes.len() as i64,
                content_type: file.content_type.clone(),
                file_path: file_path.to_string(),
                storage_url,
                document_type: document_type.to_string(),
                upload_status: UploadStatus::Uploaded,
                processing_status: ProcessingStatus::Pending,
                metadata: DocumentMetadata {
                    uploaded_at: Utc::now(),
                    content_hash: Some(hash),
                    source: Provenance::UserUpload,
                    original_category: None,
                },
            })
            .await?;

        let mut outcome = Outcome::ok(document);
        if hash_fell_back {
            outcome.warn(
                "generate_file_hash",
                format!(
                    "Stored a placeholder hash for '{}'; it is not a content fingerprint",
                    file.file_name
                ),
            );
        }
        let refreshed = self.update_session_file_count(ctx).await;
        outcome.absorb(refreshed);

        info!(
            session_id = %ctx.session_id,
            document_id = %outcome.value.id,
            "Uploaded document saved"
        );
        Ok(outcome)
    }

    /// Attaches data-room documents to the session one at a time.
    ///
    /// A failed insert is reported as a warning and skipped; the returned list holds
    /// only the rows that were stored.
    pub async fn save_data_room_documents(
        &self,
        ctx: &SessionContext,
        documents: &[DataRoomDocument],
    ) -> Outcome<Vec<UploadedDocument>> {
        let mut outcome = Outcome::ok(Vec::with_capacity(documents.len()));

        for doc in documents {
            let result = self
                .db
                .create_document(NewDocument {
                    session_id: ctx.session_id.clone(),
                    user_id: ctx.user_id,
                    file_name: doc.file_name.clone(),
                    file_size: doc.file_size,
                    content_type: doc.content_type.clone(),
                    file_path: doc.file_path.clone(),
                    storage_url: doc.storage_url.clone(),
                    document_type: doc.category.clone(),
                    upload_status: UploadStatus::Uploaded,
                    processing_status: ProcessingStatus::Pending,
                    metadata: DocumentMetadata {
                        uploaded_at: Utc::now(),
                        content_hash: None,
                        source: Provenance::DataRoom,
                        original_category: Some(doc.category.clone()),
                    },
                })
                .await;

            match result {
                Ok(saved) => outcome.value.push(saved),
                Err(e) => outcome.warn(
                    "save_data_room_documents",
                    format!("Skipped data room document '{}': {}", doc.file_name, e),
                ),
            }
        }

        let refreshed = self.update_session_file_count(ctx).await;
        outcome.absorb(refreshed);

        info!(
            session_id = %ctx.session_id,
            saved = outcome.value.len(),
            requested = documents.len(),
            "Data room documents attached"
        );
        outcome
    }

    /// Records the result of processing one of the user's documents.
    pub async fn update_document_processing_status(
        &self,
        user_id: Uuid,
        document_id: Uuid,
        status: ProcessingStatus,
        extracted_data: Value,
    ) -> PortResult<UploadedDocument> {
        self.db
            .update_document_processing(document_id, user_id, status, extracted_data, Utc::now())
            .await
    }

    pub async fn get_session_documents(
        &self,
        ctx: &SessionContext,
    ) -> PortResult<Vec<UploadedDocument>> {
        self.db
            .get_documents_for_session(&ctx.session_id, ctx.user_id)
            .await
    }

    //=====================================================================================
    // Analyses
    //=====================================================================================

    /// Normalizes and stores a finished analysis, then completes the session.
    ///
    /// Any failure is logged against the session before being returned.
    pub async fn save_corporate_tax_analysis(
        &self,
        ctx: &SessionContext,
        analysis_data: Value,
        processing_time_seconds: f64,
    ) -> PortResult<Analysis> {
        match self
            .persist_analysis(ctx, analysis_data, processing_time_seconds)
            .await
        {
            Ok(analysis) => {
                info!(
                    session_id = %ctx.session_id,
                    analysis_id = %analysis.id,
                    "Corporate tax analysis saved"
                );
                Ok(analysis)
            }
            Err(e) => {
                error!(session_id = %ctx.session_id, "Failed to save analysis: {}", e);
                self.log_session_error(
                    ctx,
                    "Failed to save corporate tax analysis",
                    json!({
                        "error": e.to_string(),
                        "processing_time_seconds": processing_time_seconds,
                    }),
                )
                .await;
                Err(e)
            }
        }
    }

    /// Saving an analysis completes the session from whatever step it is on.
    async fn persist_analysis(
        &self,
        ctx: &SessionContext,
        analysis_data: Value,
        processing_time_seconds: f64,
    ) -> PortResult<Analysis> {
        let session = self.owned_session(ctx).await?;

        let report = format_report_data(&analysis_data);
        let completed_at = Utc::now();
        let new = NewAnalysis {
            session_id: ctx.session_id.clone(),
            user_id: ctx.user_id,
            report,
            raw_analysis: analysis_data,
            status: AnalysisStatus::Completed,
            processing_time_seconds,
            completed_at,
        };

        let saved = match self.config.analysis {
            AnalysisPolicy::ReplaceExisting => self.db.replace_session_analysis(new).await?,
            AnalysisPolicy::AllowDuplicates => self.db.create_analysis(new).await?,
        };

        self.db
            .update_session_progress(
                &ctx.session_id,
                session.current_step,
                SessionStep::Completed,
                json!({
                    "analysis_id": saved.id,
                    "status": AnalysisStatus::Completed.as_str(),
                    "completed_at": completed_at.to_rfc3339(),
                }),
            )
            .await?;

        Ok(saved)
    }

    /// The user's analyses, newest first.
    pub async fn get_user_analysis_history(
        &self,
        user_id: Uuid,
        limit: u32,
    ) -> PortResult<Vec<AnalysisSummary>> {
        self.db
            .list_analysis_summaries(user_id, None, Some(limit))
            .await
    }

    /// The analysis stored for `session_id`, or `None` if there is none yet.
    pub async fn get_existing_analysis(
        &self,
        user_id: Uuid,
        session_id: &SessionId,
    ) -> PortResult<Option<Analysis>> {
        match self.db.get_analysis_for_session(session_id, user_id).await {
            Ok(analysis) => Ok(Some(analysis)),
            Err(PortError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn delete_analysis(&self, user_id: Uuid, analysis_id: Uuid) -> PortResult<bool> {
        let deleted = self.db.delete_analysis(analysis_id, user_id).await?;
        if deleted {
            info!(%analysis_id, "Analysis deleted");
        }
        Ok(deleted)
    }

    /// Statistics over the user's completed analyses; `None` if they could not be
    /// loaded.
    pub async fn get_analysis_statistics(
        &self,
        user_id: Uuid,
    ) -> Outcome<Option<AnalysisStatistics>> {
        match self
            .db
            .list_analysis_summaries(user_id, Some(AnalysisStatus::Completed), None)
            .await
        {
            Ok(analyses) => Outcome::ok(Some(compute_statistics(&analyses))),
            Err(e) => {
                let mut outcome = Outcome::ok(None);
                outcome.warn(
                    "get_analysis_statistics",
                    format!("Failed to load analyses for user {}: {}", user_id, e),
                );
                outcome
            }
        }
    }

    async fn owned_session(&self, ctx: &SessionContext) -> PortResult<Session> {
        let session = self.db.get_session_by_id(&ctx.session_id).await?;
        if session.user_id != ctx.user_id {
            return Err(PortError::Unauthorized);
        }
        Ok(session)
    }
}
