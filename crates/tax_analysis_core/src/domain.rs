//! crates/tax_analysis_core/src/domain.rs
//!
//! Defines the core data structures of the analysis workflow: sessions, uploaded
//! documents and persisted analyses, plus the step table that governs how a
//! session moves through the workflow.

use crate::ports::{PortError, PortResult};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

//=========================================================================================
// Sessions
//=========================================================================================

/// Opaque, server-generated session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The identity a session-scoped operation runs under.
///
/// Produced by `initialize_session` or `resolve_context` and passed explicitly to
/// every call, so one manager can serve any number of concurrent workflows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub session_id: SessionId,
    pub user_id: Uuid,
}

impl SessionContext {
    pub fn new(session_id: SessionId, user_id: Uuid) -> Self {
        Self {
            session_id,
            user_id,
        }
    }
}

/// Snapshot of the client environment, captured once when a session starts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserInfo {
    pub user_agent: String,
    pub platform: String,
    pub language: String,
    pub cookies_enabled: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

/// The fixed stages of an analysis workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum SessionStep {
    Initialized = 0,
    DocumentsUploaded = 1,
    Analyzing = 2,
    Reviewing = 3,
    Completed = 4,
}

/// Controls which step changes `check_transition` accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressPolicy {
    /// Allow moving back to an earlier step (a user returning to a previous screen).
    pub allow_regression: bool,
}

impl SessionStep {
    /// Number of steps after initialization.
    pub const TOTAL: i32 = 4;

    pub fn index(self) -> i32 {
        self as i32
    }

    pub fn from_index(index: i32) -> PortResult<Self> {
        match index {
            0 => Ok(Self::Initialized),
            1 => Ok(Self::DocumentsUploaded),
            2 => Ok(Self::Analyzing),
            3 => Ok(Self::Reviewing),
            4 => Ok(Self::Completed),
            other => Err(PortError::InvalidStep(other)),
        }
    }

    /// Validates a caller-driven step change.
    ///
    /// Legal moves are one step forward, staying on the current step (re-submitting
    /// its data), and, when the policy allows it, any move backwards.
    pub fn check_transition(from: Self, to: Self, policy: &ProgressPolicy) -> PortResult<()> {
        let (f, t) = (from.index(), to.index());
        let legal = t == f + 1 || t == f || (t < f && policy.allow_regression);
        if legal {
            Ok(())
        } else {
            Err(PortError::InvalidTransition { from: f, to: t })
        }
    }
}

impl From<SessionStep> for i32 {
    fn from(step: SessionStep) -> Self {
        step.index()
    }
}

impl TryFrom<i32> for SessionStep {
    type Error = PortError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Self::from_index(value)
    }
}

/// A stored analysis session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub user_id: Uuid,
    pub current_step: SessionStep,
    pub total_steps: i32,
    pub browser_info: BrowserInfo,
    /// Accumulated per-step data, keyed by step.
    pub user_inputs: Value,
    pub uploaded_files_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Expired once `now` reaches `expires_at`; the sweep uses the same bound.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// The fields a caller supplies when creating a session row.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub id: SessionId,
    pub user_id: Uuid,
    pub browser_info: BrowserInfo,
    pub user_inputs: Value,
    pub expires_at: DateTime<Utc>,
}

//=========================================================================================
// Uploaded documents
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Uploaded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Where a document came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    UserUpload,
    DataRoom,
}

impl UploadStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            UploadStatus::Uploaded => "uploaded",
            UploadStatus::Failed => "failed",
        }
    }
}

impl FromStr for UploadStatus {
    type Err = PortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uploaded" => Ok(UploadStatus::Uploaded),
            "failed" => Ok(UploadStatus::Failed),
            other => Err(PortError::Validation(format!(
                "unknown upload status '{}'",
                other
            ))),
        }
    }
}

impl ProcessingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Failed => "failed",
        }
    }
}

impl FromStr for ProcessingStatus {
    type Err = PortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ProcessingStatus::Pending),
            "processing" => Ok(ProcessingStatus::Processing),
            "completed" => Ok(ProcessingStatus::Completed),
            "failed" => Ok(ProcessingStatus::Failed),
            other => Err(PortError::Validation(format!(
                "unknown processing status '{}'",
                other
            ))),
        }
    }
}

/// Result of hashing a file's content.
///
/// Only `Sha256` is a content fingerprint. `Fallback` is a time-and-random
/// placeholder used when the content could not be read and must never be
/// compared across documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "algorithm", content = "value", rename_all = "snake_case")]
pub enum FileHash {
    Sha256(String),
    Fallback(String),
}

impl FileHash {
    pub fn is_fingerprint(&self) -> bool {
        matches!(self, FileHash::Sha256(_))
    }

    pub fn value(&self) -> &str {
        match self {
            FileHash::Sha256(v) | FileHash::Fallback(v) => v,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub uploaded_at: DateTime<Utc>,
    pub content_hash: Option<FileHash>,
    pub source: Provenance,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_category: Option<String>,
}

/// A document attached to an analysis session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadedDocument {
    pub id: Uuid,
    pub session_id: SessionId,
    pub user_id: Uuid,
    pub file_name: String,
    pub file_size: i64,
    pub content_type: String,
    pub file_path: String,
    pub storage_url: Option<String>,
    pub document_type: String,
    pub upload_status: UploadStatus,
    pub processing_status: ProcessingStatus,
    pub extracted_data: Option<Value>,
    pub metadata: DocumentMetadata,
    pub uploaded_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewDocument {
    pub session_id: SessionId,
    pub user_id: Uuid,
    pub file_name: String,
    pub file_size: i64,
    pub content_type: String,
    pub file_path: String,
    pub storage_url: Option<String>,
    pub document_type: String,
    pub upload_status: UploadStatus,
    pub processing_status: ProcessingStatus,
    pub metadata: DocumentMetadata,
}

/// A file received from the user, with its bytes already in memory.
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

/// A pre-existing document picked from the data room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataRoomDocument {
    pub file_name: String,
    pub file_size: i64,
    pub content_type: String,
    pub file_path: String,
    #[serde(default)]
    pub storage_url: Option<String>,
    /// The category the document was filed under in the data room.
    pub category: String,
}

//=========================================================================================
// Analyses
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Completed,
}

impl AnalysisStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AnalysisStatus::Completed => "completed",
        }
    }
}

impl FromStr for AnalysisStatus {
    type Err = PortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(AnalysisStatus::Completed),
            other => Err(PortError::Validation(format!(
                "unknown analysis status '{}'",
                other
            ))),
        }
    }
}

/// How repeated analysis saves for one session are stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AnalysisPolicy {
    /// Keep a single analysis per session and user; a new save replaces the old one.
    #[default]
    ReplaceExisting,
    /// Insert every save as its own row.
    AllowDuplicates,
}

/// The normalized financial figures of an analysis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Breakdown {
    pub revenue: f64,
    pub expenses: f64,
    pub depreciation: f64,
    pub deductions: f64,
    pub taxable_income: f64,
    pub final_tax_owed: f64,
    /// A fraction, e.g. 0.21 for 21%.
    pub tax_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentDescriptor {
    pub filename: String,
    pub document_type: String,
    pub company_name: Option<String>,
    pub fiscal_year: Option<String>,
}

/// An analysis payload reduced to the shape that gets persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportData {
    pub company_name: String,
    pub fiscal_year: i32,
    pub breakdown: Breakdown,
    pub documents: Vec<DocumentDescriptor>,
    pub observations: Vec<String>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub id: Uuid,
    pub session_id: SessionId,
    pub user_id: Uuid,
    pub company_name: String,
    pub fiscal_year: i32,
    #[serde(flatten)]
    pub breakdown: Breakdown,
    pub documents: Vec<DocumentDescriptor>,
    pub observations: Vec<String>,
    pub recommendations: Vec<String>,
    pub raw_analysis: Value,
    pub status: AnalysisStatus,
    pub processing_time_seconds: f64,
    pub created_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAnalysis {
    pub session_id: SessionId,
    pub user_id: Uuid,
    pub report: ReportData,
    pub raw_analysis: Value,
    pub status: AnalysisStatus,
    pub processing_time_seconds: f64,
    pub completed_at: DateTime<Utc>,
}

/// The lightweight projection of an analysis used for history and statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub id: Uuid,
    pub session_id: SessionId,
    pub company_name: String,
    pub fiscal_year: i32,
    pub revenue: f64,
    pub final_tax_owed: f64,
    pub tax_rate: f64,
    pub status: AnalysisStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl From<&Analysis> for AnalysisSummary {
    fn from(a: &Analysis) -> Self {
        Self {
            id: a.id,
            session_id: a.session_id.clone(),
            company_name: a.company_name.clone(),
            fiscal_year: a.fiscal_year,
            revenue: a.breakdown.revenue,
            final_tax_owed: a.breakdown.final_tax_owed,
            tax_rate: a.breakdown.tax_rate,
            status: a.status,
            created_at: a.created_at,
            completed_at: a.completed_at,
        }
    }
}
