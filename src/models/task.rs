//! Task sink wire types.

use serde::{Deserialize, Serialize};

/// Completion status reported by the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskStatus {
    NeedsAction,
    Completed,
}

/// A task as returned by the sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteTask {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub status: TaskStatus,
    /// Set when the task sits in the sink's trash
    #[serde(default)]
    pub deleted: bool,
}

/// Payload for creating a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    pub notes: String,
    /// RFC 3339 timestamp at UTC midnight of the due date
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due: Option<String>,
}

/// A task list in the sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskList {
    pub id: String,
    pub title: String,
}
