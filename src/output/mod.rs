//! Output formatting for solve results.

pub mod json;
pub mod plain;

use crate::config::{Launcher, QueryMode};
use crate::coordinator::{CoordinatorStats, Solution};
use crate::protocol::{Capacity, Value};
use serde::Serialize;

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// The bare value (default).
    #[default]
    Plain,
    /// JSON object with run details.
    Json,
}

/// Everything printed about a finished solve.
#[derive(Debug, Clone, Serialize)]
pub struct SolveReport {
    pub capacity: Capacity,
    pub value: Value,
    pub world_size: usize,
    pub launcher: Launcher,
    pub query_mode: QueryMode,
    /// Whether the whole table was checked against the reference.
    pub verified: bool,
    pub stats: CoordinatorStats,
}

impl SolveReport {
    pub fn new(solution: Solution, world_size: usize, launcher: Launcher, query_mode: QueryMode) -> Self {
        Self {
            capacity: solution.target,
            value: solution.value,
            world_size,
            launcher,
            query_mode,
            verified: false,
            stats: solution.stats,
        }
    }

    pub fn verified(mut self, verified: bool) -> Self {
        self.verified = verified;
        self
    }
}

/// Print a solve result.
pub fn print_solution(report: &SolveReport, format: OutputFormat) {
    match format {
        OutputFormat::Plain => plain::print_plain(report.value),
        OutputFormat::Json => json::print_json(report),
    }
}

/// Print a reference answer.
pub fn print_reference(capacity: Capacity, value: Value, format: OutputFormat) {
    match format {
        OutputFormat::Plain => plain::print_plain(value),
        OutputFormat::Json => json::print_reference(capacity, value),
    }
}
