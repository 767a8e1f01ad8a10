//! Run configuration for a solve.

use crate::error::{DknapError, Result};
use serde::Serialize;
use std::fmt;

/// Smallest usable world: one coordinator plus one worker.
pub const MIN_WORLD_SIZE: usize = 2;

/// How the coordinator answers a query for a capacity it has not resolved yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    /// Reply `Pending`; the worker asks again.
    #[default]
    Retry,
    /// Park the worker and reply with the value once it is known.
    Deferred,
}

impl fmt::Display for QueryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Retry => write!(f, "retry"),
            Self::Deferred => write!(f, "deferred"),
        }
    }
}

/// Where participants run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Launcher {
    /// One thread per participant, channel transport.
    #[default]
    Threads,
    /// One subprocess per worker, pipe transport.
    Processes,
}

impl fmt::Display for Launcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Threads => write!(f, "threads"),
            Self::Processes => write!(f, "processes"),
        }
    }
}

/// Configuration for one distributed solve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolveConfig {
    /// Participants including the coordinator.
    pub world_size: usize,
    pub launcher: Launcher,
    pub query_mode: QueryMode,
}

impl Default for SolveConfig {
    fn default() -> Self {
        Self {
            world_size: 4,
            launcher: Launcher::Threads,
            query_mode: QueryMode::Retry,
        }
    }
}

impl SolveConfig {
    pub fn new(world_size: usize) -> Self {
        Self {
            world_size,
            ..Self::default()
        }
    }

    pub fn with_launcher(mut self, launcher: Launcher) -> Self {
        self.launcher = launcher;
        self
    }

    pub fn with_query_mode(mut self, query_mode: QueryMode) -> Self {
        self.query_mode = query_mode;
        self
    }

    /// Number of worker participants.
    pub fn worker_count(&self) -> usize {
        self.world_size.saturating_sub(1)
    }

    /// Reject configurations the protocol cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.world_size < MIN_WORLD_SIZE {
            return Err(DknapError::InvalidWorldSize(self.world_size));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SolveConfig::default();
        assert_eq!(config.world_size, 4);
        assert_eq!(config.worker_count(), 3);
        assert_eq!(config.launcher, Launcher::Threads);
        assert_eq!(config.query_mode, QueryMode::Retry);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = SolveConfig::new(6)
            .with_launcher(Launcher::Processes)
            .with_query_mode(QueryMode::Deferred);
        assert_eq!(config.world_size, 6);
        assert_eq!(config.launcher, Launcher::Processes);
        assert_eq!(config.query_mode, QueryMode::Deferred);
    }

    #[test]
    fn test_world_size_below_two_is_rejected() {
        for size in [0, 1] {
            let err = SolveConfig::new(size).validate().unwrap_err();
            assert!(matches!(err, DknapError::InvalidWorldSize(s) if s == size));
        }
        assert!(SolveConfig::new(2).validate().is_ok());
    }

    #[test]
    fn test_display() {
        assert_eq!(QueryMode::Deferred.to_string(), "deferred");
        assert_eq!(Launcher::Processes.to_string(), "processes");
    }
}
