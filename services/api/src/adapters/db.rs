//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`, including the three server-side
//! procedures defined in the migrations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::{PgArguments, Postgres};
use sqlx::query::QueryAs;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use tax_analysis_core::domain::{
    Analysis, AnalysisStatus, AnalysisSummary, Breakdown, BrowserInfo, DocumentDescriptor,
    DocumentMetadata, NewAnalysis, NewDocument, NewSession, ProcessingStatus, Session, SessionId,
    SessionStep, UploadedDocument,
};
use tax_analysis_core::ports::{DatabaseService, PortError, PortResult};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn not_found(what: String) -> impl FnOnce(sqlx::Error) -> PortError {
    move |e| match e {
        sqlx::Error::RowNotFound => PortError::NotFound(what),
        _ => PortError::Unexpected(e.to_string()),
    }
}

//=========================================================================================
// Column Lists
//=========================================================================================

macro_rules! session_columns {
    () => {
        "id, user_id, current_step, total_steps, browser_info, user_inputs, \
         uploaded_files_count, created_at, updated_at, expires_at"
    };
}

macro_rules! document_columns {
    () => {
        "id, session_id, user_id, file_name, file_size, content_type, file_path, storage_url, \
         document_type, upload_status, processing_status, extracted_data, metadata, \
         uploaded_at, processed_at"
    };
}

macro_rules! analysis_columns {
    () => {
        "id, session_id, user_id, company_name, fiscal_year, revenue, expenses, depreciation, \
         deductions, taxable_income, final_tax_owed, tax_rate, documents, observations, \
         recommendations, raw_analysis, status, processing_time_seconds, created_at, \
         completed_at"
    };
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct SessionRecord {
    id: String,
    user_id: Uuid,
    current_step: i32,
    total_steps: i32,
    browser_info: Json<BrowserInfo>,
    user_inputs: Value,
    uploaded_files_count: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}
impl SessionRecord {
    fn to_domain(self) -> PortResult<Session> {
        Ok(Session {
            id: SessionId::new(self.id),
            user_id: self.user_id,
            current_step: SessionStep::from_index(self.current_step)?,
            total_steps: self.total_steps,
            browser_info: self.browser_info.0,
            user_inputs: self.user_inputs,
            uploaded_files_count: self.uploaded_files_count,
            created_at: self.created_at,
            updated_at: self.updated_at,
            expires_at: self.expires_at,
        })
    }
}

#[derive(FromRow)]
struct DocumentRecord {
    id: Uuid,
    session_id: String,
    user_id: Uuid,
    file_name: String,
    file_size: i64,
    content_type: String,
    file_path: String,
    storage_url: Option<String>,
    document_type: String,
    upload_status: String,
    processing_status: String,
    extracted_data: Option<Value>,
    metadata: Json<DocumentMetadata>,
    uploaded_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
}
impl DocumentRecord {
    fn to_domain(self) -> PortResult<UploadedDocument> {
        Ok(UploadedDocument {
            id: self.id,
            session_id: SessionId::new(self.session_id),
            user_id: self.user_id,
            file_name: self.file_name,
            file_size: self.file_size,
            content_type: self.content_type,
            file_path: self.file_path,
            storage_url: self.storage_url,
            document_type: self.document_type,
            upload_status: self.upload_status.parse()?,
            processing_status: self.processing_status.parse()?,
            extracted_data: self.extracted_data,
            metadata: self.metadata.0,
            uploaded_at: self.uploaded_at,
            processed_at: self.processed_at,
        })
    }
}

#[derive(FromRow)]
struct AnalysisRecord {
    id: Uuid,
    session_id: String,
    user_id: Uuid,
    company_name: String,
    fiscal_year: i32,
    revenue: f64,
    expenses: f64,
    depreciation: f64,
    deductions: f64,
    taxable_income: f64,
    final_tax_owed: f64,
    tax_rate: f64,
    documents: Json<Vec<DocumentDescriptor>>,
    observations: Json<Vec<String>>,
    recommendations: Json<Vec<String>>,
    raw_analysis: Value,
    status: String,
    processing_time_seconds: f64,
    created_at: DateTime<Utc>,
    completed_at: DateTime<Utc>,
}
impl AnalysisRecord {
    fn to_domain(self) -> PortResult<Analysis> {
        Ok(Analysis {
            id: self.id,
            session_id: SessionId::new(self.session_id),
            user_id: self.user_id,
            company_name: self.company_name,
            fiscal_year: self.fiscal_year,
            breakdown: Breakdown {
                revenue: self.revenue,
                expenses: self.expenses,
                depreciation: self.depreciation,
                deductions: self.deductions,
                taxable_income: self.taxable_income,
                final_tax_owed: self.final_tax_owed,
                tax_rate: self.tax_rate,
            },
            documents: self.documents.0,
            observations: self.observations.0,
            recommendations: self.recommendations.0,
            raw_analysis: self.raw_analysis,
            status: self.status.parse()?,
            processing_time_seconds: self.processing_time_seconds,
            created_at: self.created_at,
            completed_at: self.completed_at,
        })
    }
}

#[derive(FromRow)]
struct AnalysisSummaryRecord {
    id: Uuid,
    session_id: String,
    company_name: String,
    fiscal_year: i32,
    revenue: f64,
    final_tax_owed: f64,
    tax_rate: f64,
    status: String,
    created_at: DateTime<Utc>,
    completed_at: DateTime<Utc>,
}
impl AnalysisSummaryRecord {
    fn to_domain(self) -> PortResult<AnalysisSummary> {
        Ok(AnalysisSummary {
            id: self.id,
            session_id: SessionId::new(self.session_id),
            company_name: self.company_name,
            fiscal_year: self.fiscal_year,
            revenue: self.revenue,
            final_tax_owed: self.final_tax_owed,
            tax_rate: self.tax_rate,
            status: self.status.parse()?,
            created_at: self.created_at,
            completed_at: self.completed_at,
        })
    }
}

/// Builds the analysis INSERT so it can run on the pool or inside a transaction.
fn insert_analysis(
    new: NewAnalysis,
) -> QueryAs<'static, Postgres, AnalysisRecord, PgArguments> {
    let b = new.report.breakdown;
    sqlx::query_as(concat!(
        "INSERT INTO corporate_tax_analyses (session_id, user_id, company_name, fiscal_year, \
         revenue, expenses, depreciation, deductions, taxable_income, final_tax_owed, tax_rate, \
         documents, observations, recommendations, raw_analysis, status, \
         processing_time_seconds, completed_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18) \
         RETURNING ",
        analysis_columns!()
    ))
    .bind(new.session_id.as_str().to_string())
    .bind(new.user_id)
    .bind(new.report.company_name)
    .bind(new.report.fiscal_year)
    .bind(b.revenue)
    .bind(b.expenses)
    .bind(b.depreciation)
    .bind(b.deductions)
    .bind(b.taxable_income)
    .bind(b.final_tax_owed)
    .bind(b.tax_rate)
    .bind(Json(new.report.documents))
    .bind(Json(new.report.observations))
    .bind(Json(new.report.recommendations))
    .bind(new.raw_analysis)
    .bind(new.status.as_str())
    .bind(new.processing_time_seconds)
    .bind(new.completed_at)
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn generate_session_id(&self) -> PortResult<SessionId> {
        let id: String = sqlx::query_scalar("SELECT generate_session_id()")
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(SessionId::new(id))
    }

    async fn create_session(&self, session: NewSession) -> PortResult<Session> {
        let record: SessionRecord = sqlx::query_as(concat!(
            "INSERT INTO analysis_sessions \
             (id, user_id, current_step, total_steps, browser_info, user_inputs, expires_at) \
             VALUES ($1, $2, 0, $3, $4, $5, $6) RETURNING ",
            session_columns!()
        ))
        .bind(session.id.as_str())
        .bind(session.user_id)
        .bind(SessionStep::TOTAL)
        .bind(Json(session.browser_info))
        .bind(session.user_inputs)
        .bind(session.expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        record.to_domain()
    }

    async fn get_session_by_id(&self, session_id: &SessionId) -> PortResult<Session> {
        let record: SessionRecord = sqlx::query_as(concat!(
            "SELECT ",
            session_columns!(),
            " FROM analysis_sessions WHERE id = $1"
        ))
        .bind(session_id.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(not_found(format!("Session {} not found", session_id)))?;
        record.to_domain()
    }

    async fn update_session_progress(
        &self,
        session_id: &SessionId,
        from: SessionStep,
        to: SessionStep,
        step_data: Value,
    ) -> PortResult<()> {
        let moved: bool = sqlx::query_scalar("SELECT update_session_progress($1, $2, $3, $4)")
            .bind(session_id.as_str())
            .bind(from.index())
            .bind(to.index())
            .bind(step_data)
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)?;

        if !moved {
            return Err(PortError::InvalidTransition {
                from: from.index(),
                to: to.index(),
            });
        }
        Ok(())
    }

    async fn log_session_error(
        &self,
        session_id: &SessionId,
        message: &str,
        data: Value,
    ) -> PortResult<()> {
        sqlx::query("SELECT log_session_error($1, $2, $3)")
            .bind(session_id.as_str())
            .bind(message)
            .bind(data)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn count_session_documents(&self, session_id: &SessionId) -> PortResult<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM uploaded_documents WHERE session_id = $1")
            .bind(session_id.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)
    }

    async fn set_session_file_count(
        &self,
        session_id: &SessionId,
        count: i64,
        updated_at: DateTime<Utc>,
    ) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE analysis_sessions SET uploaded_files_count = $2, updated_at = $3 WHERE id = $1",
        )
        .bind(session_id.as_str())
        .bind(count)
        .bind(updated_at)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;

        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Session {} not found", session_id)));
        }
        Ok(())
    }

    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> PortResult<u64> {
        let result = sqlx::query("DELETE FROM analysis_sessions WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(result.rows_affected())
    }

    async fn create_document(&self, document: NewDocument) -> PortResult<UploadedDocument> {
        let record: DocumentRecord = sqlx::query_as(concat!(
            "INSERT INTO uploaded_documents (session_id, user_id, file_name, file_size, \
             content_type, file_path, storage_url, document_type, upload_status, \
             processing_status, metadata, uploaded_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) RETURNING ",
            document_columns!()
        ))
        .bind(document.session_id.as_str())
        .bind(document.user_id)
        .bind(&document.file_name)
        .bind(document.file_size)
        .bind(&document.content_type)
        .bind(&document.file_path)
        .bind(&document.storage_url)
        .bind(&document.document_type)
        .bind(document.upload_status.as_str())
        .bind(document.processing_status.as_str())
        .bind(Json(&document.metadata))
        .bind(document.metadata.uploaded_at)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        record.to_domain()
    }

    async fn update_document_processing(
        &self,
        document_id: Uuid,
        user_id: Uuid,
        status: ProcessingStatus,
        extracted_data: Value,
        processed_at: DateTime<Utc>,
    ) -> PortResult<UploadedDocument> {
        let record: DocumentRecord = sqlx::query_as(concat!(
            "UPDATE uploaded_documents \
             SET processing_status = $3, extracted_data = $4, processed_at = $5 \
             WHERE id = $1 AND user_id = $2 RETURNING ",
            document_columns!()
        ))
        .bind(document_id)
        .bind(user_id)
        .bind(status.as_str())
        .bind(extracted_data)
        .bind(processed_at)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found(format!("Document {} not found", document_id)))?;
        record.to_domain()
    }

    async fn get_documents_for_session(
        &self,
        session_id: &SessionId,
        user_id: Uuid,
    ) -> PortResult<Vec<UploadedDocument>> {
        let records: Vec<DocumentRecord> = sqlx::query_as(concat!(
            "SELECT ",
            document_columns!(),
            " FROM uploaded_documents WHERE session_id = $1 AND user_id = $2 \
             ORDER BY uploaded_at ASC"
        ))
        .bind(session_id.as_str())
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn create_analysis(&self, analysis: NewAnalysis) -> PortResult<Analysis> {
        let record = insert_analysis(analysis)
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)?;
        record.to_domain()
    }

    async fn replace_session_analysis(&self, analysis: NewAnalysis) -> PortResult<Analysis> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        sqlx::query("DELETE FROM corporate_tax_analyses WHERE session_id = $1 AND user_id = $2")
            .bind(analysis.session_id.as_str())
            .bind(analysis.user_id)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;

        let record = insert_analysis(analysis)
            .fetch_one(&mut *tx)
            .await
            .map_err(unexpected)?;

        tx.commit().await.map_err(unexpected)?;
        record.to_domain()
    }

    async fn get_analysis_for_session(
        &self,
        session_id: &SessionId,
        user_id: Uuid,
    ) -> PortResult<Analysis> {
        let record: AnalysisRecord = sqlx::query_as(concat!(
            "SELECT ",
            analysis_columns!(),
            " FROM corporate_tax_analyses WHERE session_id = $1 AND user_id = $2 \
             ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(session_id.as_str())
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found(format!("No analysis for session {}", session_id)))?;
        record.to_domain()
    }

    async fn list_analysis_summaries(
        &self,
        user_id: Uuid,
        status: Option<AnalysisStatus>,
        limit: Option<u32>,
    ) -> PortResult<Vec<AnalysisSummary>> {
        let records: Vec<AnalysisSummaryRecord> = sqlx::query_as(
            "SELECT id, session_id, company_name, fiscal_year, revenue, final_tax_owed, tax_rate, \
             status, created_at, completed_at \
             FROM corporate_tax_analyses \
             WHERE user_id = $1 AND ($2::text IS NULL OR status = $2) \
             ORDER BY created_at DESC LIMIT $3",
        )
        .bind(user_id)
        .bind(status.map(AnalysisStatus::as_str))
        .bind(limit.map(i64::from))
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn delete_analysis(&self, analysis_id: Uuid, user_id: Uuid) -> PortResult<bool> {
        let result =
            sqlx::query("DELETE FROM corporate_tax_analyses WHERE id = $1 AND user_id = $2")
                .bind(analysis_id)
                .bind(user_id)
                .execute(&self.pool)
                .await
                .map_err(unexpected)?;
        Ok(result.rows_affected() > 0)
    }
}
