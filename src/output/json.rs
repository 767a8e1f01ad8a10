//! JSON output for solve results.

use super::SolveReport;
use crate::protocol::{Capacity, Value};
use serde_json::json;

/// Render a solve report as pretty JSON.
pub fn format_json(report: &SolveReport) -> String {
    serde_json::to_string_pretty(report).unwrap_or_else(|_| "{}".to_string())
}

/// Print a solve report as JSON.
pub fn print_json(report: &SolveReport) {
    println!("{}", format_json(report));
}

/// Print a reference answer as JSON.
pub fn print_reference(capacity: Capacity, value: Value) {
    let doc = json!({ "capacity": capacity, "value": value, "reference": true });
    println!("{}", serde_json::to_string_pretty(&doc).unwrap_or_else(|_| "{}".to_string()));
}
