//! crates/tax_analysis_testing/src/db.rs
//!
//! In-memory `DatabaseService` with switches to make individual operations fail.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use uuid::Uuid;

use tax_analysis_core::{
    Analysis, AnalysisStatus, AnalysisSummary, DatabaseService, NewAnalysis, NewDocument,
    NewSession, PortError, PortResult, ProcessingStatus, Session, SessionId, SessionStep,
    UploadedDocument,
};

#[derive(Default)]
pub struct Failures {
    pub document_names: HashSet<String>,
    pub count_documents: bool,
    pub progress: bool,
    pub log_error: bool,
    pub list_analyses: bool,
    pub delete_expired: bool,
}

/// Simulates another client writing the session between a read and a write.
#[derive(Default)]
pub struct Interference {
    /// Moves the stored session to this step right after it has been read.
    pub step_after_read: Option<SessionStep>,
}

#[derive(Default)]
pub struct State {
    pub next_session: u64,
    pub sessions: HashMap<SessionId, Session>,
    pub documents: Vec<UploadedDocument>,
    pub analyses: Vec<Analysis>,
    pub logged_errors: Vec<(SessionId, String, Value)>,
    pub progress_calls: usize,
    pub fail: Failures,
    pub interfere: Interference,
}

#[derive(Default)]
pub struct InMemoryDatabase {
    pub state: Mutex<State>,
}

impl InMemoryDatabase {
    pub fn with<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub fn session(&self, id: &SessionId) -> Session {
        self.with(|s| s.sessions[id].clone())
    }
}

fn unexpected(what: &str) -> PortError {
    PortError::Unexpected(format!("injected failure: {}", what))
}

fn analysis_from(new: NewAnalysis) -> Analysis {
    Analysis {
        id: Uuid::new_v4(),
        session_id: new.session_id,
        user_id: new.user_id,
        company_name: new.report.company_name,
        fiscal_year: new.report.fiscal_year,
        breakdown: new.report.breakdown,
        documents: new.report.documents,
        observations: new.report.observations,
        recommendations: new.report.recommendations,
        raw_analysis: new.raw_analysis,
        status: new.status,
        processing_time_seconds: new.processing_time_seconds,
        created_at: Utc::now(),
        completed_at: new.completed_at,
    }
}

#[async_trait]
impl DatabaseService for InMemoryDatabase {
    async fn generate_session_id(&self) -> PortResult<SessionId> {
        Ok(self.with(|s| {
            s.next_session += 1;
            SessionId::new(format!("sess_{}", s.next_session))
        }))
    }

    async fn create_session(&self, new: NewSession) -> PortResult<Session> {
        let now = Utc::now();
        let session = Session {
            id: new.id.clone(),
            user_id: new.user_id,
            current_step: SessionStep::Initialized,
            total_steps: SessionStep::TOTAL,
            browser_info: new.browser_info,
            user_inputs: new.user_inputs,
            uploaded_files_count: 0,
            created_at: now,
            updated_at: now,
            expires_at: new.expires_at,
        };
        self.with(|s| s.sessions.insert(new.id, session.clone()));
        Ok(session)
    }

    async fn get_session_by_id(&self, session_id: &SessionId) -> PortResult<Session> {
        self.with(|s| {
            let snapshot = s.sessions.get(session_id).cloned();
            if let (Some(step), Some(stored)) =
                (s.interfere.step_after_read.take(), s.sessions.get_mut(session_id))
            {
                stored.current_step = step;
            }
            snapshot
        })
        .ok_or_else(|| PortError::NotFound(format!("Session {} not found", session_id)))
    }

    async fn update_session_progress(
        &self,
        session_id: &SessionId,
        from: SessionStep,
        to: SessionStep,
        step_data: Value,
    ) -> PortResult<()> {
        self.with(|s| {
            s.progress_calls += 1;
            if s.fail.progress {
                return Err(unexpected("update_session_progress"));
            }
            let session = s
                .sessions
                .get_mut(session_id)
                .ok_or_else(|| PortError::NotFound(session_id.to_string()))?;
            if session.current_step != from {
                return Err(PortError::InvalidTransition {
                    from: from.index(),
                    to: to.index(),
                });
            }
            if let Value::Object(map) = &mut session.user_inputs {
                map.insert(format!("step_{}", to.index()), step_data);
            }
            session.current_step = to;
            session.updated_at = Utc::now();
            Ok(())
        })
    }

    async fn log_session_error(
        &self,
        session_id: &SessionId,
        message: &str,
        data: Value,
    ) -> PortResult<()> {
        self.with(|s| {
            if s.fail.log_error {
                return Err(unexpected("log_session_error"));
            }
            s.logged_errors
                .push((session_id.clone(), message.to_string(), data));
            Ok(())
        })
    }

    async fn count_session_documents(&self, session_id: &SessionId) -> PortResult<i64> {
        self.with(|s| {
            if s.fail.count_documents {
                return Err(unexpected("count_session_documents"));
            }
            Ok(s.documents
                .iter()
                .filter(|d| &d.session_id == session_id)
                .count() as i64)
        })
    }

    async fn set_session_file_count(
        &self,
        session_id: &SessionId,
        count: i64,
        updated_at: DateTime<Utc>,
    ) -> PortResult<()> {
        self.with(|s| {
            let session = s
                .sessions
                .get_mut(session_id)
                .ok_or_else(|| PortError::NotFound(session_id.to_string()))?;
            session.uploaded_files_count = count;
            session.updated_at = updated_at;
            Ok(())
        })
    }

    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> PortResult<u64> {
        self.with(|s| {
            if s.fail.delete_expired {
                return Err(unexpected("delete_expired_sessions"));
            }
            let before = s.sessions.len();
            s.sessions.retain(|_, session| session.expires_at > now);
            Ok((before - s.sessions.len()) as u64)
        })
    }

    async fn create_document(&self, new: NewDocument) -> PortResult<UploadedDocument> {
        self.with(|s| {
            if s.fail.document_names.contains(&new.file_name) {
                return Err(unexpected("create_document"));
            }
            let document = UploadedDocument {
                id: Uuid::new_v4(),
                session_id: new.session_id,
                user_id: new.user_id,
                file_name: new.file_name,
                file_size: new.file_size,
                content_type: new.content_type,
                file_path: new.file_path,
                storage_url: new.storage_url,
                document_type: new.document_type,
                upload_status: new.upload_status,
                processing_status: new.processing_status,
                extracted_data: None,
                uploaded_at: new.metadata.uploaded_at,
                metadata: new.metadata,
                processed_at: None,
            };
            s.documents.push(document.clone());
            Ok(document)
        })
    }

    async fn update_document_processing(
        &self,
        document_id: Uuid,
        user_id: Uuid,
        status: ProcessingStatus,
        extracted_data: Value,
        processed_at: DateTime<Utc>,
    ) -> PortResult<UploadedDocument> {
        self.with(|s| {
            let document = s
                .documents
                .iter_mut()
                .find(|d| d.id == document_id && d.user_id == user_id)
                .ok_or_else(|| PortError::NotFound(format!("Document {} not found", document_id)))?;
            document.processing_status = status;
            document.extracted_data = Some(extracted_data);
            document.processed_at = Some(processed_at);
            Ok(document.clone())
        })
    }

    async fn get_documents_for_session(
        &self,
        session_id: &SessionId,
        user_id: Uuid,
    ) -> PortResult<Vec<UploadedDocument>> {
        let mut docs: Vec<_> = self.with(|s| {
            s.documents
                .iter()
                .filter(|d| &d.session_id == session_id && d.user_id == user_id)
                .cloned()
                .collect()
        });
        docs.sort_by_key(|d| d.uploaded_at);
        Ok(docs)
    }

    async fn create_analysis(&self, new: NewAnalysis) -> PortResult<Analysis> {
        let analysis = analysis_from(new);
        self.with(|s| s.analyses.push(analysis.clone()));
        Ok(analysis)
    }

    async fn replace_session_analysis(&self, new: NewAnalysis) -> PortResult<Analysis> {
        let analysis = analysis_from(new);
        self.with(|s| {
            s.analyses.retain(|a| {
                !(a.session_id == analysis.session_id && a.user_id == analysis.user_id)
            });
            s.analyses.push(analysis.clone());
        });
        Ok(analysis)
    }

    async fn get_analysis_for_session(
        &self,
        session_id: &SessionId,
        user_id: Uuid,
    ) -> PortResult<Analysis> {
        self.with(|s| {
            s.analyses
                .iter()
                .rev()
                .find(|a| &a.session_id == session_id && a.user_id == user_id)
                .cloned()
        })
        .ok_or_else(|| PortError::NotFound(format!("No analysis for session {}", session_id)))
    }

    async fn list_analysis_summaries(
        &self,
        user_id: Uuid,
        status: Option<AnalysisStatus>,
        limit: Option<u32>,
    ) -> PortResult<Vec<AnalysisSummary>> {
        self.with(|s| {
            if s.fail.list_analyses {
                return Err(unexpected("list_analysis_summaries"));
            }
            // Insertion order stands in for created_at; newest first.
            Ok(s.analyses
                .iter()
                .rev()
                .filter(|a| a.user_id == user_id)
                .filter(|a| status.map_or(true, |st| a.status == st))
                .take(limit.map_or(usize::MAX, |l| l as usize))
                .map(AnalysisSummary::from)
                .collect())
        })
    }

    async fn delete_analysis(&self, analysis_id: Uuid, user_id: Uuid) -> PortResult<bool> {
        self.with(|s| {
            let before = s.analyses.len();
            s.analyses
                .retain(|a| !(a.id == analysis_id && a.user_id == user_id));
            Ok(s.analyses.len() < before)
        })
    }
}

