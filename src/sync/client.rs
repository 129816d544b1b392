//! The sync client: one loop task owning the store, the socket and every
//! timer.

use chrono::Utc;
use futures_util::{Sink, SinkExt, StreamExt};
use serde_json::{json, Map, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_tungstenite::tungstenite::{self, Message};

use crate::api::{DashboardApi, HttpApi, TaskDraft};
use crate::config::{validate_settings, Settings};
use crate::dispatch::{Dispatcher, Notice, Outcome, RenderTrigger};
use crate::error::{Error, Result};
use crate::model::{EntityPatch, EntityRef};
use crate::protocol::{ClientMessage, ServerEvent};

use super::connection::{ConnectionManager, ConnectionState};
use super::poller::FallbackPoller;
use super::timer::{TimerPurpose, TimerSlot};
use super::{LoopEvent, WriteOutcome, WsStream};

/// Requests from the embedding application.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CreateTask(TaskDraft),
    UpdateTask {
        id: String,
        fields: Map<String, Value>,
    },
    DeleteTask(String),
    AddNote(String),
    MarkNoteRead(String),
    DeleteNote(String),
    DeleteScheduled(String),
    /// Run every pull now.
    Refresh,
    Shutdown,
}

/// Cloneable sender for [`Command`]s.
#[derive(Debug, Clone)]
pub struct SyncHandle {
    commands: UnboundedSender<Command>,
}

impl SyncHandle {
    pub fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| Error::Transport("sync client has stopped".to_string()))
    }

    pub fn create_task(&self, draft: TaskDraft) -> Result<()> {
        self.send(Command::CreateTask(draft))
    }

    pub fn update_task(&self, id: impl Into<String>, fields: Map<String, Value>) -> Result<()> {
        self.send(Command::UpdateTask {
            id: id.into(),
            fields,
        })
    }

    pub fn delete_task(&self, id: impl Into<String>) -> Result<()> {
        self.send(Command::DeleteTask(id.into()))
    }

    pub fn add_note(&self, content: impl Into<String>) -> Result<()> {
        self.send(Command::AddNote(content.into()))
    }

    pub fn mark_note_read(&self, id: impl Into<String>) -> Result<()> {
        self.send(Command::MarkNoteRead(id.into()))
    }

    pub fn delete_note(&self, id: impl Into<String>) -> Result<()> {
        self.send(Command::DeleteNote(id.into()))
    }

    pub fn delete_scheduled(&self, id: impl Into<String>) -> Result<()> {
        self.send(Command::DeleteScheduled(id.into()))
    }

    pub fn refresh(&self) -> Result<()> {
        self.send(Command::Refresh)
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown)
    }
}

pub struct SyncClient<R> {
    api: Arc<dyn DashboardApi>,
    dispatcher: Dispatcher<R>,
    connection: ConnectionManager,
    poller: FallbackPoller,
    keepalive: TimerSlot,
    keepalive_period: Duration,
    socket: Option<WsStream>,
    events_tx: UnboundedSender<LoopEvent>,
    events: UnboundedReceiver<LoopEvent>,
    commands: UnboundedReceiver<Command>,
}

impl<R: RenderTrigger> SyncClient<R> {
    pub fn new(
        settings: Settings,
        api: Arc<dyn DashboardApi>,
        render: R,
    ) -> Result<(Self, SyncHandle)> {
        validate_settings(&settings)?;

        let (events_tx, events) = mpsc::unbounded_channel();
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let client = Self {
            dispatcher: Dispatcher::new(&settings.limits, render),
            connection: ConnectionManager::new(&settings, events_tx.clone())?,
            poller: FallbackPoller::new(&settings, Arc::clone(&api), events_tx.clone()),
            keepalive: TimerSlot::new(TimerPurpose::KeepAlive),
            keepalive_period: settings.timing.keepalive(),
            socket: None,
            api,
            events_tx,
            events,
            commands,
        };
        Ok((client, SyncHandle { commands: commands_tx }))
    }

    /// Client backed by the HTTP API at the configured server.
    pub fn over_http(settings: Settings, render: R) -> Result<(Self, SyncHandle)> {
        let api = Arc::new(HttpApi::new(&settings)?);
        Self::new(settings, api, render)
    }

    pub fn dispatcher(&self) -> &Dispatcher<R> {
        &self.dispatcher
    }

    /// Run until [`Command::Shutdown`] or until every handle is dropped.
    /// Returns the dispatcher with the final state.
    pub async fn run(mut self) -> Dispatcher<R> {
        self.poller.start_slow();
        self.start_connect();

        loop {
            tokio::select! {
                frame = next_frame(&mut self.socket) => self.on_frame(frame),
                Some(event) = self.events.recv() => self.on_loop_event(event).await,
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.on_command(command),
                },
            }
        }

        self.shutdown().await;
        self.dispatcher
    }

    async fn shutdown(&mut self) {
        tracing::info!("Sync client shutting down");
        self.poller.stop_all();
        self.keepalive.cancel();
        self.connection.shutdown();
        if let Some(mut socket) = self.socket.take() {
            if let Err(e) = socket.close(None).await {
                tracing::debug!("Close handshake failed: {}", e);
            }
        }
        self.dispatcher
            .set_connection(ConnectionState::Disconnected, Utc::now());
    }

    fn start_connect(&mut self) {
        if self.connection.connect() {
            self.dispatcher
                .set_connection(ConnectionState::Connecting, Utc::now());
        }
    }

    fn on_frame(&mut self, frame: Option<std::result::Result<Message, tungstenite::Error>>) {
        match frame {
            Some(Ok(Message::Text(text))) => {
                if self.dispatcher.handle_text(&text, Utc::now()) == Outcome::ResyncTasks {
                    let issued = self.dispatcher.issue_pull();
                    self.poller.resync_tasks(issued);
                }
            }
            Some(Ok(Message::Close(reason))) => {
                let reason = reason
                    .map(|frame| frame.reason.to_string())
                    .unwrap_or_else(|| "closed by server".to_string());
                self.on_disconnect(&reason);
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => self.on_disconnect(&e.to_string()),
            None => self.on_disconnect("stream ended"),
        }
    }

    fn on_disconnect(&mut self, reason: &str) {
        self.socket = None;
        self.poller.stop_connected();
        self.keepalive.cancel();
        self.connection.on_close(reason);
        self.dispatcher
            .set_connection(ConnectionState::Disconnected, Utc::now());
    }

    async fn on_loop_event(&mut self, event: LoopEvent) {
        let now = Utc::now();
        match event {
            LoopEvent::TimerFired {
                purpose: TimerPurpose::Reconnect,
                generation,
            } => {
                if self.connection.on_reconnect_due(generation) {
                    self.dispatcher.set_connection(ConnectionState::Connecting, now);
                }
            }
            LoopEvent::TimerFired {
                purpose: TimerPurpose::KeepAlive,
                generation,
            } => {
                if self.keepalive.accept(generation) {
                    self.send_ping().await;
                }
            }
            LoopEvent::TimerFired {
                purpose,
                generation,
            } => {
                let issued = self.dispatcher.issue_pull();
                if self.poller.on_timer(purpose, generation, issued)
                    && purpose == TimerPurpose::Tick
                {
                    self.dispatcher.render_tick(now);
                }
            }
            LoopEvent::Connected { generation, stream } => {
                if !self.connection.on_open(generation) {
                    return;
                }
                self.socket = Some(*stream);
                self.poller.start_connected();
                self.keepalive
                    .arm_repeating(self.keepalive_period, false, &self.events_tx);
                self.dispatcher.set_connection(ConnectionState::Connected, now);
            }
            LoopEvent::ConnectFailed { generation, error } => {
                if self.connection.on_connect_failed(generation, &error) {
                    self.dispatcher
                        .set_connection(ConnectionState::Disconnected, now);
                }
            }
            LoopEvent::Pulled { batch, issued } => {
                self.dispatcher.merge_pull(batch, issued, now);
            }
            LoopEvent::WriteFinished(WriteOutcome::Confirmed(Some(event))) => {
                self.dispatcher.handle_event(event, now);
            }
            LoopEvent::WriteFinished(WriteOutcome::Confirmed(None)) => {}
            LoopEvent::WriteFinished(WriteOutcome::Failed(notice)) => {
                self.dispatcher.notice(notice);
            }
        }
    }

    async fn send_ping(&mut self) {
        let Some(socket) = self.socket.as_mut() else {
            return;
        };
        let text = match ClientMessage::Ping.to_text() {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("Failed to encode ping: {}", e);
                return;
            }
        };
        let sent = send_within(socket, Message::Text(text), self.keepalive_period).await;
        if let Err(reason) = sent {
            self.on_disconnect(&reason);
        }
    }

    fn on_command(&mut self, command: Command) {
        let now = Utc::now();
        match command {
            Command::CreateTask(draft) => self.spawn_write("create task", move |api| async move {
                let task = api.create_task(&draft).await?;
                Ok(Some(ServerEvent::TaskCreated(task)))
            }),
            Command::UpdateTask { id, fields } => {
                let patch = EntityPatch {
                    id: id.clone(),
                    fields: fields.clone(),
                };
                self.dispatcher
                    .handle_event(ServerEvent::TaskUpdated(patch), now);
                self.spawn_write("update task", move |api| async move {
                    api.update_task(&id, &fields).await?;
                    Ok(None)
                });
            }
            Command::DeleteTask(id) => self.spawn_write("delete task", move |api| async move {
                api.delete_task(&id).await?;
                Ok(Some(ServerEvent::TaskDeleted(EntityRef::new(id))))
            }),
            Command::AddNote(content) => self.spawn_write("add note", move |api| async move {
                let note = api.create_note(&content).await?;
                Ok(Some(ServerEvent::NoteAdded(note)))
            }),
            Command::MarkNoteRead(id) => {
                let patch = EntityPatch::new(id.clone())
                    .with("read", true)
                    .with("readAt", json!(now));
                self.dispatcher
                    .handle_event(ServerEvent::NoteUpdated(patch), now);
                self.spawn_write("mark note read", move |api| async move {
                    api.mark_note_read(&id).await?;
                    Ok(None)
                });
            }
            Command::DeleteNote(id) => self.spawn_write("delete note", move |api| async move {
                api.delete_note(&id).await?;
                Ok(Some(ServerEvent::NoteDeleted(EntityRef::new(id))))
            }),
            Command::DeleteScheduled(id) => {
                self.spawn_write("delete scheduled item", move |api| async move {
                    api.delete_scheduled(&id).await?;
                    Ok(Some(ServerEvent::ScheduledDeleted(EntityRef::new(id))))
                })
            }
            Command::Refresh => {
                let issued = self.dispatcher.issue_pull();
                self.poller.refresh_now(issued);
            }
            Command::Shutdown => {}
        }
    }

    fn spawn_write<F, Fut>(&self, operation: &'static str, write: F)
    where
        F: FnOnce(Arc<dyn DashboardApi>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Option<ServerEvent>>> + Send + 'static,
    {
        let api = Arc::clone(&self.api);
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let outcome = match write(api).await {
                Ok(event) => WriteOutcome::Confirmed(event),
                Err(e) => {
                    tracing::warn!("{} failed: {}", operation, e);
                    WriteOutcome::Failed(Notice::new(operation, e.to_string()))
                }
            };
            let _ = tx.send(LoopEvent::WriteFinished(outcome));
        });
    }
}

/// Send one frame, giving up after `limit`. A peer that stops reading would
/// otherwise hold the loop.
async fn send_within<S>(
    sink: &mut S,
    message: Message,
    limit: Duration,
) -> std::result::Result<(), String>
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    match tokio::time::timeout(limit, sink.send(message)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("send not flushed within {:?}", limit)),
    }
}

async fn next_frame(
    socket: &mut Option<WsStream>,
) -> Option<std::result::Result<Message, tungstenite::Error>> {
    match socket {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    type SinkResult = std::result::Result<(), tungstenite::Error>;

    /// Sink whose peer never drains it.
    struct Stalled;

    impl Sink<Message> for Stalled {
        type Error = tungstenite::Error;

        fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<SinkResult> {
            Poll::Pending
        }

        fn start_send(self: Pin<&mut Self>, _item: Message) -> SinkResult {
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<SinkResult> {
            Poll::Pending
        }

        fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<SinkResult> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_to_stalled_peer_times_out() {
        let started = tokio::time::Instant::now();
        let ping = Message::Text("ping".to_string());
        let err = send_within(&mut Stalled, ping, Duration::from_secs(30))
            .await
            .unwrap_err();
        assert!(err.contains("not flushed"));
        assert!(started.elapsed() >= Duration::from_secs(30));
    }

    #[test]
    fn test_handle_reports_stopped_client() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let handle = SyncHandle { commands: tx };
        let err = handle.delete_task("t1").unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[test]
    fn test_handle_forwards_commands() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = SyncHandle { commands: tx };
        handle.mark_note_read("n1").unwrap();
        handle.refresh().unwrap();
        assert_eq!(rx.try_recv().unwrap(), Command::MarkNoteRead("n1".to_string()));
        assert_eq!(rx.try_recv().unwrap(), Command::Refresh);
    }
}
