//! Error types for dknap.

use crate::catalog::CatalogError;
use crate::protocol::{Capacity, Rank};
use thiserror::Error;

/// Main error type for dknap.
#[derive(Error, Debug)]
pub enum DknapError {
    #[error("Failed to allocate {what} for {cells} cells")]
    FatalAllocation { what: &'static str, cells: usize },

    #[error("Protocol violation at rank {rank}: {detail}")]
    ProtocolViolation { rank: Rank, detail: String },

    #[error("World size must be no less than 2, given {0}")]
    InvalidWorldSize(usize),

    #[error("Participant {0} disconnected before it was told to stop")]
    PeerLost(Rank),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Value overflow while computing capacity {capacity}")]
    ValueOverflow { capacity: Capacity },

    #[error("Verification failed at capacity {capacity}: expected {expected}, got {actual}")]
    VerificationFailed {
        capacity: Capacity,
        expected: u64,
        actual: u64,
    },

    #[error("Failed to spawn worker: {0}")]
    Spawn(String),

    #[error("Item catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DknapError {
    /// Build a protocol violation for `rank`.
    pub fn protocol(rank: Rank, detail: impl Into<String>) -> Self {
        Self::ProtocolViolation {
            rank,
            detail: detail.into(),
        }
    }
}

/// Result type alias for dknap operations.
pub type Result<T> = std::result::Result<T, DknapError>;
