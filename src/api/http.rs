//! reqwest-backed implementation of [`DashboardApi`].

use async_trait::async_trait;
use reqwest::{Client, Method, Response};
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use url::Url;

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::model::{
    ActivityEntry, Agent, FeedEntry, Metrics, Mood, Note, ScheduledItem, Task,
};

use super::{DashboardApi, TaskDraft};

pub struct HttpApi {
    client: Client,
    base_url: Url,
}

impl HttpApi {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.timing.request_timeout())
            .connect_timeout(settings.timing.connect_timeout())
            .build()?;

        Ok(Self {
            client,
            base_url: settings.server.base_url()?,
        })
    }

    /// Absolute endpoint from path segments. Each segment is percent-encoded,
    /// so an id can never step outside its resource. Empty and dot segments
    /// are refused since the URL parser would drop them.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        if let Some(bad) = segments
            .iter()
            .find(|segment| matches!(**segment, "" | "." | ".."))
        {
            return Err(Error::InvalidId(bad.to_string()));
        }
        let mut url = self.base_url.clone();
        url.set_query(None);
        url.set_fragment(None);
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("'{}' cannot be a base URL", self.base_url)))?
            .clear()
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, method: Method, url: Url, body: Option<Value>) -> Result<Response> {
        let endpoint = url.path().to_string();
        let mut request = self.client.request(method, url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            tracing::debug!("{} returned {}", endpoint, status);
            return Err(Error::Api {
                status: status.as_u16(),
                endpoint,
            });
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let response = self.send(Method::GET, url, None).await?;
        Ok(response.json().await?)
    }

    async fn write(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<Value>,
    ) -> Result<Response> {
        let url = self.endpoint(segments)?;
        self.send(method, url, body).await
    }
}

#[async_trait]
impl DashboardApi for HttpApi {
    async fn list_tasks(&self) -> Result<Vec<Task>> {
        self.get_json(self.endpoint(&["api", "tasks"])?).await
    }

    async fn list_agents(&self) -> Result<Vec<Agent>> {
        self.get_json(self.endpoint(&["api", "agents"])?).await
    }

    async fn list_activity(&self) -> Result<Vec<ActivityEntry>> {
        self.get_json(self.endpoint(&["api", "activity"])?).await
    }

    async fn list_notes(&self) -> Result<Vec<Note>> {
        self.get_json(self.endpoint(&["api", "notes"])?).await
    }

    async fn list_scheduled(&self) -> Result<Vec<ScheduledItem>> {
        self.get_json(self.endpoint(&["api", "scheduled"])?).await
    }

    async fn get_metrics(&self) -> Result<Metrics> {
        self.get_json(self.endpoint(&["api", "metrics"])?).await
    }

    async fn get_mood(&self) -> Result<Mood> {
        self.get_json(self.endpoint(&["api", "mood"])?).await
    }

    async fn list_feed(&self, limit: usize) -> Result<Vec<FeedEntry>> {
        let mut url = self.endpoint(&["api", "feed"])?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string());
        self.get_json(url).await
    }

    async fn create_task(&self, draft: &TaskDraft) -> Result<Task> {
        let body = serde_json::to_value(draft)?;
        let response = self
            .write(Method::POST, &["api", "tasks"], Some(body))
            .await?;
        Ok(response.json().await?)
    }

    async fn update_task(&self, id: &str, fields: &Map<String, Value>) -> Result<()> {
        let body = Value::Object(fields.clone());
        self.write(Method::PATCH, &["api", "tasks", id], Some(body))
            .await?;
        Ok(())
    }

    async fn delete_task(&self, id: &str) -> Result<()> {
        self.write(Method::DELETE, &["api", "tasks", id], None).await?;
        Ok(())
    }

    async fn create_note(&self, content: &str) -> Result<Note> {
        let body = json!({ "content": content });
        let response = self
            .write(Method::POST, &["api", "notes"], Some(body))
            .await?;
        Ok(response.json().await?)
    }

    async fn mark_note_read(&self, id: &str) -> Result<()> {
        self.write(Method::PATCH, &["api", "notes", id, "read"], None)
            .await?;
        Ok(())
    }

    async fn delete_note(&self, id: &str) -> Result<()> {
        self.write(Method::DELETE, &["api", "notes", id], None).await?;
        Ok(())
    }

    async fn delete_scheduled(&self, id: &str) -> Result<()> {
        self.write(Method::DELETE, &["api", "scheduled", id], None)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api() -> HttpApi {
        HttpApi::new(&Settings::for_server("http://10.0.0.5:8080")).unwrap()
    }

    #[test]
    fn test_endpoints_resolve_against_base() {
        let api = api();
        assert_eq!(
            api.endpoint(&["api", "tasks", "abc123"]).unwrap().as_str(),
            "http://10.0.0.5:8080/api/tasks/abc123"
        );
        assert_eq!(
            api.endpoint(&["api", "notes", "n1", "read"]).unwrap().as_str(),
            "http://10.0.0.5:8080/api/notes/n1/read"
        );
    }

    #[test]
    fn test_ids_stay_inside_their_segment() {
        let api = api();
        let cases = [
            ("../agents/a1", "http://10.0.0.5:8080/api/tasks/..%2Fagents%2Fa1"),
            ("a?b", "http://10.0.0.5:8080/api/tasks/a%3Fb"),
            ("x#y", "http://10.0.0.5:8080/api/tasks/x%23y"),
            ("50%", "http://10.0.0.5:8080/api/tasks/50%25"),
        ];
        for (id, expected) in cases {
            let url = api.endpoint(&["api", "tasks", id]).unwrap();
            assert_eq!(url.as_str(), expected, "id {:?}", id);
            assert_eq!(url.path_segments().unwrap().count(), 3);
        }

        for id in ["", ".", ".."] {
            let err = api.endpoint(&["api", "tasks", id]).unwrap_err();
            assert!(matches!(err, Error::InvalidId(_)), "id {:?}", id);
        }
    }

    #[test]
    fn test_draft_body_omits_unset_fields() {
        let draft = TaskDraft::new("Write release notes").assigned_to("Agent:writer");
        let body = serde_json::to_value(&draft).unwrap();
        assert_eq!(body, json!({"title": "Write release notes", "assignedTo": "Agent:writer"}));
    }
}
