//! Tracing setup: daily rolling file under the data dir plus stderr.

use anyhow::Result;
use clap::ValueEnum;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const LOG_FILE: &str = "dashsync.log";
const DEFAULT_FILTER: &str = "info,dashsync=debug";

/// Line format of the log file. Stderr is always human-readable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Keeps the file writer flushing; hold it until exit.
pub struct LogGuard {
    _worker: WorkerGuard,
    dir: PathBuf,
}

impl LogGuard {
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

pub fn init(format: LogFormat) -> Result<LogGuard> {
    let dir = log_dir()?;
    std::fs::create_dir_all(&dir)?;

    let (writer, worker) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(&dir, LOG_FILE));

    let file_layer = match format {
        LogFormat::Text => fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_thread_ids(true)
            .with_line_number(true)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(writer)
            .with_current_span(false)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter(DEFAULT_FILTER))
        .with(file_layer)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();

    tracing::debug!("Logging to {} ({:?})", dir.display(), format);
    Ok(LogGuard {
        _worker: worker,
        dir,
    })
}

fn env_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

fn log_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("com", "dashsync", "dashsync")
        .ok_or_else(|| anyhow::anyhow!("Could not determine a data directory"))?;
    Ok(dirs.data_dir().join("logs"))
}

/// Test subscriber writing through the test harness. Repeat calls are no-ops.
pub fn init_test() {
    let _ = tracing_subscriber::registry()
        .with(env_filter("debug"))
        .with(fmt::layer().with_test_writer())
        .try_init();
}
