//! crates/tax_analysis_core/src/stats.rs
//!
//! Aggregate statistics over a user's completed analyses.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::domain::AnalysisSummary;

/// How many of the newest analyses `AnalysisStatistics::recent` keeps.
pub const RECENT_ANALYSES: usize = 5;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct YearBreakdown {
    pub count: u64,
    pub revenue: f64,
    pub tax_owed: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisStatistics {
    pub total_analyses: u64,
    pub total_revenue: f64,
    pub total_tax_owed: f64,
    /// Effective rate in percent; 0 when there is no revenue.
    pub average_tax_rate: f64,
    pub recent: Vec<AnalysisSummary>,
    pub by_year: BTreeMap<i32, YearBreakdown>,
}

/// Computes statistics over `analyses`, which must be ordered newest first.
pub fn compute_statistics(analyses: &[AnalysisSummary]) -> AnalysisStatistics {
    let mut total_revenue = 0.0;
    let mut total_tax_owed = 0.0;
    let mut by_year: BTreeMap<i32, YearBreakdown> = BTreeMap::new();

    for a in analyses {
        total_revenue += a.revenue;
        total_tax_owed += a.final_tax_owed;

        let year = by_year.entry(a.fiscal_year).or_default();
        year.count += 1;
        year.revenue += a.revenue;
        year.tax_owed += a.final_tax_owed;
    }

    let average_tax_rate = if total_revenue == 0.0 {
        0.0
    } else {
        total_tax_owed * 100.0 / total_revenue
    };

    AnalysisStatistics {
        total_analyses: analyses.len() as u64,
        total_revenue,
        total_tax_owed,
        average_tax_rate,
        recent: analyses.iter().take(RECENT_ANALYSES).cloned().collect(),
        by_year,
    }
}
