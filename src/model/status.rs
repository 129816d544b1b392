//! Status labels and priorities shared by tasks and agents.
//!
//! Labels travel as plain strings on the wire. Unknown labels are kept
//! verbatim in an `Other` variant so a newer server never breaks decoding.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Task workflow state, in board order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Done,
    Archive,
    Other(String),
}

impl TaskStatus {
    pub fn as_str(&self) -> &str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in-progress",
            TaskStatus::Done => "done",
            TaskStatus::Archive => "archive",
            TaskStatus::Other(s) => s,
        }
    }

    /// Finished states (`done` or `archive`).
    pub fn is_finished(&self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Archive)
    }
}

impl Default for TaskStatus {
    fn default() -> Self {
        TaskStatus::Todo
    }
}

impl From<String> for TaskStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "todo" => TaskStatus::Todo,
            "in-progress" => TaskStatus::InProgress,
            "done" => TaskStatus::Done,
            "archive" => TaskStatus::Archive,
            _ => TaskStatus::Other(s),
        }
    }
}

impl From<TaskStatus> for String {
    fn from(status: TaskStatus) -> Self {
        match status {
            TaskStatus::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task priority levels.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
    Other(String),
}

impl Priority {
    pub fn as_str(&self) -> &str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
            Priority::Other(s) => s,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

impl From<String> for Priority {
    fn from(s: String) -> Self {
        match s.as_str() {
            "low" => Priority::Low,
            "medium" => Priority::Medium,
            "high" => Priority::High,
            "urgent" => Priority::Urgent,
            _ => Priority::Other(s),
        }
    }
}

impl From<Priority> for String {
    fn from(priority: Priority) -> Self {
        match priority {
            Priority::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

/// Agent status label as reported by the agent runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AgentStatus {
    Working,
    Thinking,
    Checking,
    Typing,
    Delegating,
    Heartbeat,
    Managing,
    Idle,
    Standby,
    Other(String),
}

impl AgentStatus {
    pub fn as_str(&self) -> &str {
        match self {
            AgentStatus::Working => "Working",
            AgentStatus::Thinking => "Thinking",
            AgentStatus::Checking => "Checking",
            AgentStatus::Typing => "Typing",
            AgentStatus::Delegating => "Delegating",
            AgentStatus::Heartbeat => "Heartbeat",
            AgentStatus::Managing => "Managing",
            AgentStatus::Idle => "Idle",
            AgentStatus::Standby => "Standby",
            AgentStatus::Other(s) => s,
        }
    }

    /// Whether this label belongs to the active (working) set.
    pub fn is_working(&self) -> bool {
        matches!(
            self,
            AgentStatus::Working
                | AgentStatus::Thinking
                | AgentStatus::Checking
                | AgentStatus::Typing
                | AgentStatus::Delegating
                | AgentStatus::Heartbeat
                | AgentStatus::Managing
        )
    }
}

impl Default for AgentStatus {
    fn default() -> Self {
        AgentStatus::Idle
    }
}

impl From<String> for AgentStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "Working" => AgentStatus::Working,
            "Thinking" => AgentStatus::Thinking,
            "Checking" => AgentStatus::Checking,
            "Typing" => AgentStatus::Typing,
            "Delegating" => AgentStatus::Delegating,
            "Heartbeat" => AgentStatus::Heartbeat,
            "Managing" => AgentStatus::Managing,
            "Idle" => AgentStatus::Idle,
            "Standby" => AgentStatus::Standby,
            _ => AgentStatus::Other(s),
        }
    }
}

impl From<AgentStatus> for String {
    fn from(status: AgentStatus) -> Self {
        match status {
            AgentStatus::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
