//! Error types for dashsync.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid id {0:?}")]
    InvalidId(String),

    #[error("Server returned {status} for {endpoint}")]
    Api { status: u16, endpoint: String },

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn other(s: impl Into<String>) -> Self {
        Error::Other(s.into())
    }
}
