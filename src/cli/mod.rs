//! CLI commands for dashsync using clap.

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;

use crate::api::{DashboardApi, HttpApi};
use crate::config::{get_settings_path, load_settings_or_default, validate_settings, Settings};
use crate::dispatch::{Notice, RenderFrame, RenderReason, RenderTrigger};
use crate::logging::LogFormat;
use crate::sync::SyncClient;

/// dashsync - live state sync for the command-center dashboard.
#[derive(Parser)]
#[command(name = "dashsync")]
#[command(version = "0.1.0")]
#[command(about = "Keep a local copy of the dashboard in sync with its server", long_about = None)]
pub struct Commands {
    /// Log file format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Stay connected and log every change
    Watch {
        /// Server base URL, e.g. http://127.0.0.1:8080
        #[arg(long, env = "DASHSYNC_URL")]
        url: Option<String>,
    },

    /// Pull every collection once and print it as JSON
    Snapshot {
        /// Server base URL
        #[arg(long, env = "DASHSYNC_URL")]
        url: Option<String>,
    },

    /// Show the effective settings
    Config,
}

impl Commands {
    pub async fn run(&self) -> Result<()> {
        match &self.command {
            Command::Watch { url } => cmd_watch(resolve_settings(url.as_deref())).await,
            Command::Snapshot { url } => cmd_snapshot(resolve_settings(url.as_deref())).await,
            Command::Config => cmd_config(),
        }
    }
}

fn resolve_settings(url: Option<&str>) -> Settings {
    let mut settings = load_settings_or_default();
    if let Some(url) = url {
        settings.server.url = url.to_string();
    }
    settings
}

/// Render trigger that logs a one-line summary whenever it changes.
#[derive(Default)]
pub struct LogRender {
    last_summary: String,
    renders: u64,
}

impl LogRender {
    pub fn renders(&self) -> u64 {
        self.renders
    }
}

impl RenderTrigger for LogRender {
    fn render(&mut self, frame: &RenderFrame<'_>) {
        self.renders += 1;

        if frame.reason == RenderReason::Tick {
            for agent in &frame.presence.active {
                tracing::trace!("{} on '{}' for {}", agent.name, agent.task, agent.elapsed_label);
            }
            return;
        }

        let store = frame.store;
        let summary = format!(
            "[{}] tasks={} agents={} active={} recent={} notes={} scheduled={} feed={} statuses={}",
            frame.connection,
            store.tasks().len(),
            store.agents().len(),
            frame.presence.active.len(),
            frame.presence.recent.len(),
            store.notes().len(),
            store.scheduled().len(),
            store.feed_len(),
            store.status_update_count(),
        );
        if summary != self.last_summary {
            tracing::info!("{} ({})", summary, frame.reason);
            self.last_summary = summary;
        }

        for agent in &frame.presence.active {
            tracing::debug!("  working: {} on '{}' ({})", agent.name, agent.task, agent.elapsed_label);
        }
        for done in &frame.presence.recent {
            tracing::debug!(
                "  finished: {} '{}' after {}s",
                done.record.name,
                done.record.task,
                done.record.elapsed_seconds
            );
        }
    }

    fn notice(&mut self, notice: &Notice) {
        tracing::warn!("{}", notice);
        eprintln!("Warning: {}", notice);
    }
}

async fn cmd_watch(settings: Settings) -> Result<()> {
    println!("Watching {} (Ctrl+C to stop)", settings.server.url);

    let (client, handle) = SyncClient::over_http(settings, LogRender::default())?;
    let runner = tokio::spawn(client.run());

    tokio::signal::ctrl_c().await?;
    handle.shutdown()?;
    let dispatcher = runner.await?;

    let store = dispatcher.store();
    println!(
        "Stopped after {} renders: {} tasks, {} agents, {} notes",
        dispatcher.render_trigger().renders(),
        store.tasks().len(),
        store.agents().len(),
        store.notes().len()
    );
    Ok(())
}

fn or_null<T: Serialize>(label: &str, result: crate::Result<T>) -> serde_json::Value {
    match result {
        Ok(value) => serde_json::to_value(value).unwrap_or(serde_json::Value::Null),
        Err(e) => {
            tracing::warn!("Could not fetch {}: {}", label, e);
            serde_json::Value::Null
        }
    }
}

async fn cmd_snapshot(settings: Settings) -> Result<()> {
    validate_settings(&settings)?;
    let api = HttpApi::new(&settings)?;

    let (tasks, agents, activity, notes, scheduled, metrics, mood, feed) = tokio::join!(
        api.list_tasks(),
        api.list_agents(),
        api.list_activity(),
        api.list_notes(),
        api.list_scheduled(),
        api.get_metrics(),
        api.get_mood(),
        api.list_feed(settings.limits.feed_fetch_limit),
    );

    let snapshot = json!({
        "server": settings.server.url,
        "tasks": or_null("tasks", tasks),
        "agents": or_null("agents", agents),
        "activity": or_null("activity", activity),
        "notes": or_null("notes", notes),
        "scheduled": or_null("scheduled", scheduled),
        "metrics": or_null("metrics", metrics),
        "mood": or_null("mood", mood),
        "feed": or_null("feed", feed),
    });
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

fn cmd_config() -> Result<()> {
    let settings = load_settings_or_default();
    match get_settings_path() {
        Ok(path) => println!("Settings file: {}", path.display()),
        Err(e) => println!("Settings file: unavailable ({})", e),
    }
    if let Err(e) = validate_settings(&settings) {
        println!("Invalid: {}", e);
    }
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}
