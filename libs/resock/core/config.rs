use crate::traits::*;
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 2500;
const DEFAULT_MAX_RETRY_DELAY_MS: u64 = 1000;
const DEFAULT_QUEUE_FLUSH_BASE_DELAY_MS: u64 = 50;

/// When `send` may bypass the pending queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendPolicy {
    /// Send directly only while the live transport is open
    #[default]
    OpenOnly,
    /// Send directly whenever a transport exists and is not connecting,
    /// including closing or closed transports
    NotConnecting,
}

impl SendPolicy {
    /// Whether a transport in `state` takes a payload directly
    #[inline]
    pub fn sends_directly(self, state: ReadyState) -> bool {
        match self {
            SendPolicy::OpenOnly => state == ReadyState::Open,
            SendPolicy::NotConnecting => state != ReadyState::Connecting,
        }
    }
}

/// Tunables for a [`Connection`](crate::core::connection::Connection)
///
/// Deserializable so it can sit inside an application's config file;
/// every field falls back to its default when omitted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Subprotocols requested on every attempt
    pub protocols: Vec<String>,

    /// Budget for a connect attempt to reach open or close
    pub connect_timeout_ms: u64,

    /// Upper bound for the reconnect delay
    pub max_retry_delay_ms: u64,

    /// Spacing unit for flushing queued payloads (entry `n` waits `n` units)
    pub queue_flush_base_delay_ms: u64,

    /// Log every dispatched event for this connection
    pub debug: bool,

    /// Predicate deciding between direct send and queueing
    pub send_policy: SendPolicy,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            protocols: Vec::new(),
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            max_retry_delay_ms: DEFAULT_MAX_RETRY_DELAY_MS,
            queue_flush_base_delay_ms: DEFAULT_QUEUE_FLUSH_BASE_DELAY_MS,
            debug: false,
            send_policy: SendPolicy::default(),
        }
    }
}

impl ConnectionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn max_retry_delay(&self) -> Duration {
        Duration::from_millis(self.max_retry_delay_ms)
    }

    pub fn queue_flush_base_delay(&self) -> Duration {
        Duration::from_millis(self.queue_flush_base_delay_ms)
    }

    /// Check values that would stall the state machine
    pub fn validate(&self) -> Result<()> {
        if self.connect_timeout_ms == 0 {
            return Err(SocketError::Configuration(
                "connect_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.protocols.iter().any(|p| p.trim().is_empty()) {
            return Err(SocketError::Configuration(
                "protocols cannot contain empty names".to_string(),
            ));
        }
        Ok(())
    }
}
