//! crates/tax_analysis_core/src/report.rs
//!
//! Turns the loosely-shaped payload returned by the analysis endpoint into the
//! normalized `ReportData` that gets persisted. Pure, no I/O.

use chrono::{Datelike, Utc};
use serde_json::Value;

use crate::domain::{Breakdown, DocumentDescriptor, ReportData};

pub const DEFAULT_COMPANY_NAME: &str = "Unknown Company";

pub const MISSING_REVENUE_RECOMMENDATION: &str =
    "Revenue is reported as zero while expenses are present. Verify that all revenue has been reported.";
pub const DEPRECIATION_RECOMMENDATION: &str =
    "No depreciation was claimed. Review the fixed-asset depreciation schedule.";
pub const DOCUMENT_VALIDATION_RECOMMENDATION: &str =
    "Validate the supporting documents against the figures in the tax return.";

/// Formats `data`, defaulting the fiscal year to the current year.
pub fn format_report_data(data: &Value) -> ReportData {
    format_report_data_with_year(data, Utc::now().year())
}

pub fn format_report_data_with_year(data: &Value, default_year: i32) -> ReportData {
    let general = data.get("general_information");
    let company_name = general
        .and_then(|g| g.get("Company Name"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_COMPANY_NAME)
        .to_string();
    let fiscal_year = general
        .and_then(|g| g.get("Fiscal Year"))
        .and_then(coerce_year)
        .unwrap_or(default_year);

    let raw = data
        .get("tax_return_summary")
        .and_then(|s| s.get("breakdown"));
    let field = |key: &str| coerce_number(raw.and_then(|b| b.get(key)));
    let breakdown = Breakdown {
        revenue: field("Revenue"),
        expenses: field("Expenses"),
        depreciation: field("Depreciation"),
        deductions: field("Deductions"),
        taxable_income: field("Taxable Income"),
        final_tax_owed: field("Final Tax Owed"),
        tax_rate: parse_tax_rate(raw.and_then(|b| b.get("Applied Tax Rate"))),
    };

    let documents: Vec<DocumentDescriptor> = data
        .get("file_metadata")
        .and_then(Value::as_array)
        .map(|files| files.iter().map(describe_document).collect())
        .unwrap_or_default();

    let observations: Vec<String> = data
        .get("audit_flags")
        .and_then(Value::as_array)
        .map(|flags| {
            flags
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let recommendations = recommend(&breakdown, documents.len());

    ReportData {
        company_name,
        fiscal_year,
        breakdown,
        documents,
        observations,
        recommendations,
    }
}

/// The three checks are independent and always appended in this order.
fn recommend(breakdown: &Breakdown, document_count: usize) -> Vec<String> {
    let mut out = Vec::new();
    if breakdown.revenue == 0.0 && breakdown.expenses > 0.0 {
        out.push(MISSING_REVENUE_RECOMMENDATION.to_string());
    }
    if breakdown.depreciation == 0.0 {
        out.push(DEPRECIATION_RECOMMENDATION.to_string());
    }
    if document_count > 0 {
        out.push(DOCUMENT_VALIDATION_RECOMMENDATION.to_string());
    }
    out
}

fn describe_document(entry: &Value) -> DocumentDescriptor {
    let text = |key: &str| entry.get(key).and_then(scalar_to_string);
    DocumentDescriptor {
        filename: text("filename").unwrap_or_default(),
        document_type: text("type").unwrap_or_else(|| "unknown".to_string()),
        company_name: text("company_name"),
        fiscal_year: text("fiscal_year"),
    }
}

fn scalar_to_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Missing, non-numeric, NaN and infinite values all become 0.
pub fn coerce_number(v: Option<&Value>) -> f64 {
    let n = match v {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => parse_numeric_str(s),
        _ => None,
    };
    n.filter(|x| x.is_finite()).unwrap_or(0.0)
}

/// Parses "21%" (or "21", or 21) into 0.21.
pub fn parse_tax_rate(v: Option<&Value>) -> f64 {
    let percent = match v {
        Some(Value::String(s)) => parse_numeric_str(s.trim().trim_end_matches('%')),
        Some(Value::Number(n)) => n.as_f64(),
        _ => None,
    };
    percent
        .filter(|x| x.is_finite())
        .map(|p| p / 100.0)
        .unwrap_or(0.0)
}

fn parse_numeric_str(s: &str) -> Option<f64> {
    let cleaned: String = s
        .trim()
        .trim_start_matches('$')
        .chars()
        .filter(|c| *c != ',')
        .collect();
    cleaned.trim().parse::<f64>().ok()
}

fn coerce_year(v: &Value) -> Option<i32> {
    match v {
        Value::Number(n) => n.as_i64().and_then(|y| i32::try_from(y).ok()),
        Value::String(s) => s.trim().parse::<i32>().ok(),
        _ => None,
    }
}
