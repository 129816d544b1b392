//! REST surface of the dashboard server.

pub mod http;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::Result;
use crate::model::{
    ActivityEntry, Agent, FeedEntry, Metrics, Mood, Note, Priority, ScheduledItem, Task,
    TaskStatus,
};

pub use http::HttpApi;

/// Body of a task creation request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDraft {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
}

impl TaskDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            status: None,
            priority: None,
            assigned_to: None,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn assigned_to(mut self, assignee: impl Into<String>) -> Self {
        self.assigned_to = Some(assignee.into());
        self
    }
}

/// Read and write operations the sync layer needs from the server.
#[async_trait]
pub trait DashboardApi: Send + Sync {
    async fn list_tasks(&self) -> Result<Vec<Task>>;

    async fn list_agents(&self) -> Result<Vec<Agent>>;

    async fn list_activity(&self) -> Result<Vec<ActivityEntry>>;

    async fn list_notes(&self) -> Result<Vec<Note>>;

    async fn list_scheduled(&self) -> Result<Vec<ScheduledItem>>;

    async fn get_metrics(&self) -> Result<Metrics>;

    async fn get_mood(&self) -> Result<Mood>;

    /// Most recent `limit` feed entries, oldest first.
    async fn list_feed(&self, limit: usize) -> Result<Vec<FeedEntry>>;

    /// Create a task; the server answers with the stored record.
    async fn create_task(&self, draft: &TaskDraft) -> Result<Task>;

    async fn update_task(&self, id: &str, fields: &Map<String, Value>) -> Result<()>;

    async fn delete_task(&self, id: &str) -> Result<()>;

    async fn create_note(&self, content: &str) -> Result<Note>;

    async fn mark_note_read(&self, id: &str) -> Result<()>;

    async fn delete_note(&self, id: &str) -> Result<()>;

    async fn delete_scheduled(&self, id: &str) -> Result<()>;
}
