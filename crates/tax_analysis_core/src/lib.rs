pub mod domain;
pub mod hashing;
pub mod manager;
pub mod outcome;
pub mod ports;
pub mod report;
pub mod stats;

pub use domain::{
    Analysis, AnalysisPolicy, AnalysisStatus, AnalysisSummary, Breakdown, BrowserInfo,
    DataRoomDocument, DocumentDescriptor, DocumentMetadata, FileHash, FileUpload, NewAnalysis,
    NewDocument, NewSession, ProcessingStatus, ProgressPolicy, Provenance, ReportData, Session,
    SessionContext, SessionId, SessionStep, UploadStatus, UploadedDocument,
};
pub use hashing::generate_file_hash;
pub use manager::{AnalysisSessionManager, ManagerConfig, DEFAULT_HISTORY_LIMIT};
pub use outcome::{Outcome, Warning};
pub use ports::{BlobStorageService, DatabaseService, PortError, PortResult};
pub use report::format_report_data;
pub use stats::{AnalysisStatistics, YearBreakdown};
