//! Messages exchanged between the coordinator and its workers.
//!
//! On the process transport messages are JSON-serialized and newline-delimited;
//! the in-process transport moves them through channels unchanged.

use serde::{Deserialize, Serialize};

/// A participant's number. Rank 0 is always the coordinator.
pub type Rank = usize;

/// Remaining weight budget of a subproblem; also its index in the cache.
pub type Capacity = usize;

/// Optimal value of a subproblem.
pub type Value = u64;

/// Rank of the coordinator.
pub const COORDINATOR: Rank = 0;

/// A protocol message. The sender is carried by the transport envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    /// Worker asks for the optimal value of a smaller capacity.
    #[serde(rename = "query")]
    Query { capacity: Capacity },

    /// Coordinator answers a query with a resolved value.
    #[serde(rename = "value")]
    Value { capacity: Capacity, value: Value },

    /// Coordinator has not resolved the capacity yet; the worker should ask again.
    #[serde(rename = "pending")]
    Pending { capacity: Capacity },

    /// Coordinator assigns a capacity to a worker.
    #[serde(rename = "task")]
    Task { capacity: Capacity },

    /// Worker reports the value of its assigned capacity.
    #[serde(rename = "completion")]
    Completion { value: Value },

    /// No more work; the receiver terminates.
    #[serde(rename = "shutdown")]
    Shutdown,
}

/// Discriminant of a [`Message`], used for receive filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Query,
    Value,
    Pending,
    Task,
    Completion,
    Shutdown,
}

impl Message {
    pub fn query(capacity: Capacity) -> Self {
        Self::Query { capacity }
    }

    pub fn value(capacity: Capacity, value: Value) -> Self {
        Self::Value { capacity, value }
    }

    pub fn pending(capacity: Capacity) -> Self {
        Self::Pending { capacity }
    }

    pub fn task(capacity: Capacity) -> Self {
        Self::Task { capacity }
    }

    pub fn completion(value: Value) -> Self {
        Self::Completion { value }
    }

    /// The kind of this message.
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Query { .. } => MessageKind::Query,
            Self::Value { .. } => MessageKind::Value,
            Self::Pending { .. } => MessageKind::Pending,
            Self::Task { .. } => MessageKind::Task,
            Self::Completion { .. } => MessageKind::Completion,
            Self::Shutdown => MessageKind::Shutdown,
        }
    }

    /// Serialize to JSON line (with newline).
    pub fn to_line(&self) -> String {
        // Every variant holds only integers, so serialization cannot fail.
        let mut json = serde_json::to_string(self).unwrap_or_default();
        json.push('\n');
        json
    }

    /// Deserialize from JSON line.
    pub fn from_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line.trim())
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Query => "query",
            Self::Value => "value",
            Self::Pending => "pending",
            Self::Task => "task",
            Self::Completion => "completion",
            Self::Shutdown => "shutdown",
        };
        f.write_str(name)
    }
}
