//! Entity records as they appear on the wire.
//!
//! Keyed records carry a flattened `extra` map so fields this client does not
//! model are preserved through merges and re-serialization.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::status::{AgentStatus, Priority, TaskStatus};

/// Timestamp as carried on the wire. Absent sorts as earliest.
pub type Timestamp = Option<DateTime<Utc>>;

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Read a wire timestamp without failing the surrounding record.
///
/// RFC 3339 first, then an offset-less date-time taken as UTC, then epoch
/// milliseconds. Anything else becomes `None`.
pub fn parse_timestamp(value: &Value) -> Timestamp {
    match value {
        Value::String(text) => {
            let text = text.trim();
            if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
                return Some(parsed.with_timezone(&Utc));
            }
            NAIVE_FORMATS
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
                .map(|naive| naive.and_utc())
        }
        Value::Number(n) => n.as_i64().and_then(DateTime::<Utc>::from_timestamp_millis),
        _ => None,
    }
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Timestamp, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let parsed = value.as_ref().and_then(parse_timestamp);
    if parsed.is_none() {
        if let Some(raw) = value.filter(|v| !v.is_null()) {
            tracing::debug!("Unreadable timestamp {}, treating as absent", raw);
        }
    }
    Ok(parsed)
}

/// Records identified by an opaque string id.
pub trait Keyed {
    fn id(&self) -> &str;
}

/// A board task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub completed_by: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Timestamp,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub started_at: Timestamp,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub completed_at: Timestamp,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Keyed for Task {
    fn id(&self) -> &str {
        &self.id
    }
}

/// An agent known to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: AgentStatus,
    #[serde(default)]
    pub current_task: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub started_working_at: Timestamp,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Agent {
    /// Working status and a non-empty current task.
    pub fn is_active(&self) -> bool {
        self.status.is_working()
            && self
                .current_task
                .as_deref()
                .map_or(false, |task| !task.trim().is_empty())
    }

    /// Name for display, falling back to the id.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

impl Keyed for Agent {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub read: bool,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Timestamp,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub read_at: Timestamp,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Keyed for Note {
    fn id(&self) -> &str {
        &self.id
    }
}

/// A scheduled deliverable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledItem {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub schedule: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub last_run: Timestamp,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Timestamp,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_enabled() -> bool {
    true
}

impl Keyed for ScheduledItem {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Free-form activity log line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    #[serde(default)]
    pub message: String,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub timestamp: Timestamp,
}

/// Volatile status ping from an agent or external process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    #[serde(default)]
    pub agent: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub detail: String,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub timestamp: Timestamp,
}

/// Live feed line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedEntry {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub timestamp: Timestamp,
}

impl FeedEntry {
    /// Same entry: equal ids when both carry one, otherwise equal content.
    pub fn same_entry(&self, other: &FeedEntry) -> bool {
        match (&self.id, &other.id) {
            (Some(a), Some(b)) => a == b,
            _ => self == other,
        }
    }
}

/// A remaining-quota figure. Producers send a number or a label like `"85%"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Quota {
    Amount(f64),
    Label(String),
    Other(Value),
}

impl Quota {
    pub fn amount(&self) -> Option<f64> {
        match self {
            Quota::Amount(n) => Some(*n),
            Quota::Label(text) => text.trim().trim_end_matches('%').trim().parse().ok(),
            Quota::Other(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub premium_remaining: Option<Quota>,
    #[serde(default)]
    pub chat_remaining: Option<Quota>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub last_updated: Timestamp,
}

/// Provider/usage metrics singleton.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Metrics {
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub token_usage: TokenUsage,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mood {
    #[serde(default)]
    pub mood: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub last_updated: Timestamp,
}

/// Payload of the `init` event.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub agents: Vec<Agent>,
    #[serde(default)]
    pub activity: Vec<ActivityEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_task_from_server_shape() {
        let task: Task = serde_json::from_value(json!({
            "id": "a1b2c3d4",
            "title": "Ship it",
            "status": "in-progress",
            "priority": "high",
            "assignedTo": "Agent:coder",
            "createdAt": "2026-02-03T10:00:00.123456Z",
            "startedAt": "2026-02-03T10:00:00.123456Z",
            "completedAt": null,
            "tags": ["release"]
        }))
        .unwrap();

        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(task.priority, Priority::High);
        assert!(task.completed_at.is_none());
        assert_eq!(task.extra.get("tags"), Some(&json!(["release"])));

        let back = serde_json::to_value(&task).unwrap();
        assert_eq!(back["tags"], json!(["release"]));
        assert_eq!(back["assignedTo"], json!("Agent:coder"));
    }

    #[test]
    fn test_agent_activity_requires_task() {
        let mut agent: Agent = serde_json::from_value(json!({
            "id": "a1",
            "status": "Working",
            "currentTask": "   "
        }))
        .unwrap();
        assert!(!agent.is_active());
        assert_eq!(agent.display_name(), "a1");

        agent.current_task = Some("Refactor parser".to_string());
        assert!(agent.is_active());

        agent.status = AgentStatus::Idle;
        assert!(!agent.is_active());
    }

    #[test]
    fn test_feed_identity() {
        let a = FeedEntry {
            id: Some("f1".to_string()),
            kind: "working".to_string(),
            message: "one".to_string(),
            timestamp: None,
        };
        let mut b = a.clone();
        b.message = "edited".to_string();
        assert!(a.same_entry(&b));

        b.id = None;
        assert!(!a.same_entry(&b));
    }

    #[test]
    fn test_offsetless_timestamp_is_read_as_utc() {
        let entry: FeedEntry = serde_json::from_value(json!({
            "type": "info",
            "message": "deploy",
            "timestamp": "2026-02-03T10:00:00"
        }))
        .unwrap();
        assert_eq!(
            entry.timestamp.unwrap().to_rfc3339(),
            "2026-02-03T10:00:00+00:00"
        );

        let page: Vec<FeedEntry> = serde_json::from_value(json!([
            {"message": "a", "timestamp": "yesterday-ish"},
            {"message": "b", "timestamp": "2026-02-03T10:00:00.5+02:00"},
            {"message": "c", "timestamp": 1770112800000i64}
        ]))
        .unwrap();
        assert!(page[0].timestamp.is_none());
        assert_eq!(page[1].timestamp.unwrap().to_rfc3339(), "2026-02-03T08:00:00.500+00:00");
        assert!(page[2].timestamp.is_some());
    }

    #[test]
    fn test_metrics_accept_quota_labels() {
        let metrics: Metrics = serde_json::from_value(json!({
            "provider": "copilot",
            "token_usage": {
                "premium_remaining": "85%",
                "chat_remaining": 120,
                "last_updated": "soon"
            }
        }))
        .unwrap();
        let usage = &metrics.token_usage;
        assert_eq!(usage.premium_remaining, Some(Quota::Label("85%".to_string())));
        assert_eq!(usage.premium_remaining.as_ref().and_then(Quota::amount), Some(85.0));
        assert_eq!(usage.chat_remaining.as_ref().and_then(Quota::amount), Some(120.0));
        assert!(usage.last_updated.is_none());
    }

    #[test]
    fn test_snapshot_tolerates_missing_collections() {
        let snapshot: Snapshot = serde_json::from_value(json!({"agents": []})).unwrap();
        assert!(snapshot.tasks.is_empty());
        assert!(snapshot.activity.is_empty());
    }
}
