//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so a partial
//! JSON file only needs the keys it changes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "http": { "timeoutMs": 10000 },
///   "websocket": { "echoSent": false },
///   "engine": { "logCapacity": 2000 }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkbenchSettings {
    /// HTTP and GraphQL executor settings.
    pub http: HttpSettings,
    /// WebSocket executor settings.
    pub websocket: WebSocketSettings,
    /// Registry, multiplexer and log sizing.
    pub engine: EngineSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl WorkbenchSettings {
    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("http.timeoutMs", self.http.timeout_ms),
            ("http.connectTimeoutMs", self.http.connect_timeout_ms),
            ("websocket.connectTimeoutMs", self.websocket.connect_timeout_ms),
            ("websocket.closeTimeoutMs", self.websocket.close_timeout_ms),
            ("websocket.sendQueueCapacity", self.websocket.send_queue_capacity as u64),
            ("engine.eventQueueCapacity", self.engine.event_queue_capacity as u64),
            ("engine.adapterQueueCapacity", self.engine.adapter_queue_capacity as u64),
            ("engine.logCapacity", self.engine.log_capacity as u64),
        ];
        match checks.iter().find(|(_, value)| *value == 0) {
            Some((key, _)) => Err(SettingsError::InvalidValue(format!("{key} must be > 0"))),
            None => Ok(()),
        }
    }
}

/// HTTP and GraphQL executor settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpSettings {
    /// Whole-request timeout in milliseconds.
    pub timeout_ms: u64,
    /// TCP/TLS connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// `User-Agent` sent unless the request sets its own.
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            connect_timeout_ms: 10_000,
            user_agent: concat!("wirebench/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl HttpSettings {
    /// Request timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Connect timeout as a [`Duration`].
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// WebSocket executor settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WebSocketSettings {
    /// Handshake timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// How long a local close waits for the peer's close frame.
    pub close_timeout_ms: u64,
    /// Outbound frames buffered before `send` reports a full queue.
    pub send_queue_capacity: usize,
    /// Emit a local echo event for each sent frame.
    pub echo_sent: bool,
}

impl Default for WebSocketSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            close_timeout_ms: 5_000,
            send_queue_capacity: 32,
            echo_sent: true,
        }
    }
}

impl WebSocketSettings {
    /// Connect timeout as a [`Duration`].
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Close timeout as a [`Duration`].
    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }
}

/// Registry, multiplexer and activity log sizing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineSettings {
    /// Shared consumer queue capacity.
    pub event_queue_capacity: usize,
    /// Per-adapter channel capacity.
    pub adapter_queue_capacity: usize,
    /// Longest an adapter waits for channel space before dropping an event.
    pub max_emit_block_ms: u64,
    /// Activity log entries retained.
    pub log_capacity: usize,
    /// How long `shutdown` waits for adapters to unwind.
    pub shutdown_grace_ms: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            event_queue_capacity: 1024,
            adapter_queue_capacity: 64,
            max_emit_block_ms: 50,
            log_capacity: 5000,
            shutdown_grace_ms: 2000,
        }
    }
}

impl EngineSettings {
    /// Emit block bound as a [`Duration`].
    pub fn max_emit_block(&self) -> Duration {
        Duration::from_millis(self.max_emit_block_ms)
    }

    /// Shutdown grace period as a [`Duration`].
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// Logging configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Log file for interactive sessions. Relative paths resolve under
    /// `~/.wirebench`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            file: None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = WorkbenchSettings::default();
        assert_eq!(s.http.timeout(), Duration::from_secs(30));
        assert!(s.websocket.echo_sent);
        assert_eq!(s.engine.log_capacity, 5000);
        assert_eq!(s.engine.max_emit_block(), Duration::from_millis(50));
        assert_eq!(s.logging.level, "warn");
        assert!(s.http.user_agent.starts_with("wirebench/"));
        assert!(s.validate().is_ok());
    }

    #[test]
    fn camel_case_keys() {
        let json = serde_json::to_value(WorkbenchSettings::default()).unwrap();
        assert_eq!(json["http"]["timeoutMs"], 30_000);
        assert_eq!(json["engine"]["eventQueueCapacity"], 1024);
        assert_eq!(json["websocket"]["echoSent"], true);
        assert!(json["logging"].get("file").is_none());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let s: WorkbenchSettings =
            serde_json::from_str(r#"{"engine": {"logCapacity": 100}}"#).unwrap();
        assert_eq!(s.engine.log_capacity, 100);
        assert_eq!(s.engine.event_queue_capacity, 1024);
        assert_eq!(s.http, HttpSettings::default());
    }

    #[test]
    fn zero_capacity_rejected() {
        let mut s = WorkbenchSettings::default();
        s.engine.adapter_queue_capacity = 0;
        let err = s.validate().unwrap_err();
        assert!(err.to_string().contains("engine.adapterQueueCapacity"));
    }
}
