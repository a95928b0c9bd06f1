//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use std::sync::Arc;
use tax_analysis_core::{AnalysisSessionManager, BlobStorageService};

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub manager: AnalysisSessionManager,
    pub blob: Arc<dyn BlobStorageService>,
    pub config: Arc<Config>,
}
