//! Client side of the streaming tool's control plane (obs-websocket v5).
//!
//! A [`ControlClient`] owns one authenticated WebSocket connection. The
//! dispatcher opens it when a session starts, keeps it in the session state
//! while the game runs, and closes it on teardown.
pub mod auth;
pub mod client;
pub mod protocol;

#[cfg(test)]
pub(crate) mod test_server;

use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

pub use client::ControlClient;

use protocol::OpCode;

pub const DEFAULT_PORT: u16 = 4455;
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_START_REQUEST: &str = "StartReplayBuffer";
pub const DEFAULT_STOP_REQUEST: &str = "StopReplayBuffer";

/// Connection and request settings taken from an integration's `[control]` table.
#[derive(Debug)]
pub struct ControlSettings {
    pub host: String,
    pub port: u16,
    /// Held for the whole session because teardown may reconnect to close the
    /// control session. Only ever exposed inside [`auth::auth_response`], whose
    /// intermediate hash is itself wrapped; zeroized on drop.
    pub password: Option<SecretString>,
    /// Applies to the connect, every send, and every wait for a reply.
    pub timeout: Duration,
    /// Request issued right after the handshake on `open-control-session`.
    pub start_request: String,
    /// Request issued before disconnecting on `close-control-session`.
    pub stop_request: String,
}

impl ControlSettings {
    pub fn url(&self) -> String {
        format!("ws://{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("failed to connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: Box<tungstenite::Error>,
    },
    #[error("timed out after {after:?} waiting for {waiting_for}")]
    Timeout {
        after: Duration,
        waiting_for: &'static str,
    },
    #[error("connection closed by server{}", .0.as_deref().map(|r| format!(": {r}")).unwrap_or_default())]
    Closed(Option<String>),
    #[error("expected {expected:?} frame, received op {received}")]
    UnexpectedFrame { expected: OpCode, received: u8 },
    #[error("received a non-text message")]
    NonTextMessage,
    #[error("server requires authentication but no password is configured")]
    PasswordRequired,
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("websocket error: {0}")]
    Socket(#[from] Box<tungstenite::Error>),
    #[error("{request_type} failed with status {code}{}", .comment.as_deref().map(|c| format!(": {c}")).unwrap_or_default())]
    RequestFailed {
        request_type: String,
        code: u32,
        comment: Option<String>,
    },
}

impl From<tungstenite::Error> for ControlError {
    fn from(e: tungstenite::Error) -> Self {
        ControlError::Socket(Box::new(e))
    }
}
