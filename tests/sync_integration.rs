//! End-to-end tests: the real client against an in-process mock dashboard.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use dashsync::config::Settings;
use dashsync::{
    ConnectionState, Dispatcher, Notice, RenderFrame, RenderReason, RenderTrigger, SyncClient,
    SyncHandle, TaskDraft,
};

#[derive(Debug, Clone)]
enum Push {
    Text(String),
    Close,
}

struct MockState {
    tasks: Mutex<Vec<Value>>,
    agents: Mutex<Vec<Value>>,
    connections: AtomicUsize,
    push: broadcast::Sender<Push>,
}

struct MockServer {
    addr: SocketAddr,
    state: Arc<MockState>,
}

impl MockServer {
    async fn start(agents: Vec<Value>) -> Self {
        let (push, _) = broadcast::channel(64);
        let state = Arc::new(MockState {
            tasks: Mutex::new(Vec::new()),
            agents: Mutex::new(agents),
            connections: AtomicUsize::new(0),
            push,
        });

        let app = Router::new()
            .route("/ws", get(ws_handler))
            .route("/api/tasks", get(list_tasks).post(create_task))
            .route("/api/tasks/:id", delete(delete_task))
            .route("/api/agents", get(list_agents))
            .route("/api/activity", get(empty_list))
            .route("/api/notes", get(empty_list))
            .route("/api/scheduled", get(empty_list))
            .route("/api/feed", get(empty_list))
            .route("/api/metrics", get(metrics))
            .route("/api/mood", get(mood))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    fn push(&self, kind: &str, data: Value) {
        let text = json!({"type": kind, "data": data}).to_string();
        let _ = self.state.push.send(Push::Text(text));
    }

    fn close_sockets(&self) {
        let _ = self.state.push.send(Push::Close);
    }

    /// Change an agent server-side and announce it.
    fn update_agent(&self, id: &str, fields: Value) {
        {
            let mut agents = self.state.agents.lock().unwrap();
            let agent = agents.iter_mut().find(|a| a["id"] == id).unwrap();
            for (key, value) in fields.as_object().unwrap() {
                agent[key] = value.clone();
            }
        }
        let mut data = fields;
        data["id"] = json!(id);
        self.push("agent_updated", data);
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<MockState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_socket(socket, state))
}

async fn serve_socket(mut socket: WebSocket, state: Arc<MockState>) {
    state.connections.fetch_add(1, Ordering::SeqCst);
    let mut pushes = state.push.subscribe();

    let init = {
        let tasks = state.tasks.lock().unwrap().clone();
        let agents = state.agents.lock().unwrap().clone();
        json!({"type": "init", "data": {"tasks": tasks, "agents": agents, "activity": []}})
            .to_string()
    };
    if socket.send(Message::Text(init)).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            push = pushes.recv() => match push {
                Ok(Push::Text(text)) => {
                    if socket.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Ok(Push::Close) => {
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                }
                Err(_) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) if text.contains("ping") => {
                    let _ = socket.send(Message::Text(json!({"type": "pong"}).to_string())).await;
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                _ => {}
            },
        }
    }
}

async fn list_tasks(State(state): State<Arc<MockState>>) -> Json<Vec<Value>> {
    Json(state.tasks.lock().unwrap().clone())
}

async fn list_agents(State(state): State<Arc<MockState>>) -> Json<Vec<Value>> {
    Json(state.agents.lock().unwrap().clone())
}

async fn empty_list() -> Json<Vec<Value>> {
    Json(Vec::new())
}

async fn metrics() -> Json<Value> {
    Json(json!({"provider": "mock", "model": "m1", "token_usage": {"premium_remaining": 42.0}}))
}

async fn mood() -> Json<Value> {
    Json(json!({"mood": "focused", "lastUpdated": null}))
}

async fn create_task(
    State(state): State<Arc<MockState>>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let task = json!({
        "id": "t-new",
        "title": body["title"],
        "status": "todo",
        "priority": "medium"
    });
    state.tasks.lock().unwrap().push(task.clone());
    let echo = json!({"type": "task_created", "data": task}).to_string();
    let _ = state.push.send(Push::Text(echo));
    (StatusCode::CREATED, Json(task))
}

async fn delete_task(State(state): State<Arc<MockState>>, Path(id): Path<String>) -> StatusCode {
    let removed = {
        let mut tasks = state.tasks.lock().unwrap();
        let before = tasks.len();
        tasks.retain(|t| t["id"] != id.as_str());
        before != tasks.len()
    };
    if !removed {
        return StatusCode::NOT_FOUND;
    }
    let echo = json!({"type": "task_deleted", "data": {"id": id}}).to_string();
    let _ = state.push.send(Push::Text(echo));
    StatusCode::NO_CONTENT
}

#[derive(Debug, Clone, Default)]
struct Observation {
    connection: Option<ConnectionState>,
    opens: usize,
    task_ids: Vec<String>,
    agent_status: Vec<(String, String)>,
    active: Vec<String>,
    recent: Vec<(String, i64)>,
    mood: Option<String>,
    notices: Vec<String>,
}

struct WatchRender {
    tx: watch::Sender<Observation>,
}

impl RenderTrigger for WatchRender {
    fn render(&mut self, frame: &RenderFrame<'_>) {
        self.tx.send_modify(|obs| {
            obs.connection = Some(frame.connection);
            if frame.reason == RenderReason::Connection
                && frame.connection == ConnectionState::Connected
            {
                obs.opens += 1;
            }
            obs.task_ids = frame.store.tasks().iter().map(|t| t.id.clone()).collect();
            obs.agent_status = frame
                .store
                .agents()
                .iter()
                .map(|a| (a.id.clone(), a.status.to_string()))
                .collect();
            obs.active = frame.presence.active.iter().map(|a| a.agent_id.clone()).collect();
            obs.recent = frame
                .presence
                .recent
                .iter()
                .map(|r| (r.record.agent_id.clone(), r.record.elapsed_seconds))
                .collect();
            obs.mood = frame.store.mood().and_then(|m| m.mood.clone());
        });
    }

    fn notice(&mut self, notice: &Notice) {
        self.tx.send_modify(|obs| obs.notices.push(notice.to_string()));
    }
}

struct Harness {
    server: MockServer,
    handle: SyncHandle,
    observations: watch::Receiver<Observation>,
    runner: JoinHandle<Dispatcher<WatchRender>>,
}

impl Harness {
    async fn start(agents: Vec<Value>) -> Self {
        dashsync::logging::init_test();
        let server = MockServer::start(agents).await;

        let mut settings = Settings::for_server(server.url());
        settings.timing.reconnect_delay_ms = 100;
        settings.timing.agent_poll_ms = 200;
        settings.timing.tick_ms = 100;
        settings.timing.slow_poll_ms = 500;

        let (tx, observations) = watch::channel(Observation::default());
        let (client, handle) = SyncClient::over_http(settings, WatchRender { tx }).unwrap();
        let runner = tokio::spawn(client.run());

        Self {
            server,
            handle,
            observations,
            runner,
        }
    }

    async fn wait_until(
        &mut self,
        what: &str,
        predicate: impl FnMut(&Observation) -> bool,
    ) -> Observation {
        let result = tokio::time::timeout(
            Duration::from_secs(10),
            self.observations.wait_for(predicate),
        )
        .await
        .map(|r| r.map(|obs| obs.clone()));
        match result {
            Ok(Ok(obs)) => obs,
            _ => panic!(
                "timed out waiting for {}; last: {:?}",
                what,
                *self.observations.borrow()
            ),
        }
    }

    async fn stop(self) -> Dispatcher<WatchRender> {
        self.handle.shutdown().unwrap();
        self.runner.await.unwrap()
    }
}

fn connected(obs: &Observation) -> bool {
    obs.connection == Some(ConnectionState::Connected)
}

#[tokio::test]
async fn test_idle_update_moves_agent_to_recently_completed() {
    let mut h = Harness::start(vec![json!({
        "id": "a1",
        "name": "Builder",
        "status": "Working",
        "currentTask": "X"
    })])
    .await;

    h.wait_until("agent a1 active", |o| connected(o) && o.active == ["a1"])
        .await;

    h.server.update_agent("a1", json!({"status": "Idle", "currentTask": null}));

    let obs = h
        .wait_until("agent a1 recently completed", |o| {
            o.active.is_empty() && o.recent.iter().any(|(id, _)| id == "a1")
        })
        .await;
    assert_eq!(obs.agent_status, vec![("a1".to_string(), "Idle".to_string())]);

    let dispatcher = h.stop().await;
    assert_eq!(dispatcher.store().agents().len(), 1);
}

#[tokio::test]
async fn test_created_task_and_its_echo_leave_one_record() {
    let mut h = Harness::start(Vec::new()).await;
    h.wait_until("connected", connected).await;

    h.handle.create_task(TaskDraft::new("Write docs")).unwrap();
    h.wait_until("task t-new", |o| o.task_ids.iter().any(|id| id == "t-new"))
        .await;

    h.handle.refresh().unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    let dispatcher = h.stop().await;
    let tasks = dispatcher.store().tasks();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks.get("t-new").unwrap().title, "Write docs");
}

#[tokio::test]
async fn test_reconnects_after_server_closes_socket() {
    let mut h = Harness::start(Vec::new()).await;
    h.wait_until("connected", connected).await;
    assert_eq!(h.server.connections(), 1);

    h.server.close_sockets();
    h.wait_until("reconnected", |o| connected(o) && o.opens == 2)
        .await;
    assert_eq!(h.server.connections(), 2);

    h.stop().await;
}

#[tokio::test]
async fn test_failed_delete_reports_notice_and_keeps_state() {
    let mut h = Harness::start(Vec::new()).await;
    h.wait_until("connected", connected).await;

    h.handle.delete_task("missing").unwrap();
    let obs = h
        .wait_until("delete notice", |o| !o.notices.is_empty())
        .await;
    assert!(obs.notices[0].starts_with("delete task failed"));

    h.stop().await;
}

#[tokio::test]
async fn test_confirmed_delete_removes_task() {
    let mut h = Harness::start(Vec::new()).await;
    h.wait_until("connected", connected).await;

    h.handle.create_task(TaskDraft::new("Temporary")).unwrap();
    h.wait_until("task created", |o| o.task_ids == ["t-new"]).await;

    h.handle.delete_task("t-new").unwrap();
    h.wait_until("task deleted", |o| o.task_ids.is_empty()).await;

    h.stop().await;
}

#[tokio::test]
async fn test_slow_poll_bootstraps_mood() {
    let mut h = Harness::start(Vec::new()).await;
    let obs = h
        .wait_until("mood pulled", |o| o.mood.is_some())
        .await;
    assert_eq!(obs.mood.as_deref(), Some("focused"));
    h.stop().await;
}
