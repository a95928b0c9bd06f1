//! crates/tax_analysis_core/src/outcome.rs
//!
//! A result type for best-effort operations: the value is always produced, and
//! every failure that was swallowed on the way is reported as a `Warning`.

use serde::Serialize;
use tracing::warn;

/// A failure that did not stop the surrounding operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    pub operation: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Outcome<T> {
    pub value: T,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<Warning>,
}

impl<T> Outcome<T> {
    pub fn ok(value: T) -> Self {
        Self {
            value,
            warnings: Vec::new(),
        }
    }

    /// Records a swallowed failure and logs it.
    pub fn warn(&mut self, operation: &'static str, message: impl Into<String>) {
        let message = message.into();
        warn!(operation = operation, "{}", message);
        self.warnings.push(Warning { operation, message });
    }

    /// Moves the warnings of `other` into `self` and returns its value.
    pub fn absorb<U>(&mut self, other: Outcome<U>) -> U {
        self.warnings.extend(other.warnings);
        other.value
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}
