//! Server configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default TCP port of the inspection server.
pub const DEFAULT_PORT: u16 = 4545;

/// Upper bound on concurrently handled connections (and worker threads).
pub const MAX_CONNECTIONS: usize = 10;

/// Pending-connection queue length passed to `listen`.
pub const LISTEN_BACKLOG: i32 = 10;

/// Settings for one inspection server.
///
/// Deserializes from any serde format; missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// When false, [`crate::inspector`] hands out a no-op server.
    pub enabled: bool,
    pub host: String,
    /// `0` binds an ephemeral port; see [`crate::ViewServer::local_addr`].
    pub port: u16,
    pub max_connections: usize,
    /// How long a client may take to send its request line.
    /// `None` waits forever.
    pub read_timeout_ms: Option<u64>,
    /// Longest accepted request line, excluding the newline.
    pub max_request_len: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            max_connections: MAX_CONNECTIONS,
            read_timeout_ms: Some(30_000),
            max_request_len: 1024,
        }
    }
}

impl ServerConfig {
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        // A zero timeout is rejected by the socket API; treat it as "none".
        self.read_timeout_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }
}
