//! crates/tax_analysis_testing/src/fixtures.rs
//!
//! Request payloads shared by the test suites.

use serde_json::{json, Value};

/// An analysis payload in the shape the analysis endpoint returns.
pub fn analysis_payload(company: &str, year: i32, revenue: f64, tax_owed: f64) -> Value {
    json!({
        "general_information": {"Company Name": company, "Fiscal Year": year},
        "tax_return_summary": {"breakdown": {
            "Revenue": revenue,
            "Expenses": revenue / 2.0,
            "Depreciation": 0,
            "Deductions": 0,
            "Taxable Income": revenue / 2.0,
            "Final Tax Owed": tax_owed,
            "Applied Tax Rate": "21%"
        }},
        "file_metadata": [{"filename": "statement.pdf", "type": "financial_statement"}],
        "audit_flags": ["Revenue dropped 40% year over year"]
    })
}
