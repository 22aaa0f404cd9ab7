pub mod states;

use crate::core::config::{ConnectionConfig, SendPolicy};
use crate::core::connection::{Connection, DriverParts, Shared};
use crate::core::connection_state::{AtomicLifecycle, AtomicMetrics, AtomicReadyState, Lifecycle};
use crate::core::proxy::{EventProxy, VerboseSwitch};
use crate::core::websocket::WebSocketTransport;
use crate::traits::*;
use states::*;
use std::sync::Arc;
use std::time::Duration;

/// Type-state builder for [`Connection`]
///
/// The URL is the only required field; everything else has a default:
/// - transport: [`WebSocketTransport`]
/// - reconnect strategy: [`ExponentialBackoff`] capped at `max_retry_delay`
/// - logger: [`TracingLogger`], gated by [`VerboseSwitch::global`]
pub struct ConnectionBuilder<U: UrlState> {
    _state: TypeState<U>,
    url: Option<String>,
    config: ConnectionConfig,
    handlers: Vec<(EventKind, Arc<dyn EventHandler>)>,
    logger: Option<Arc<dyn EventLogger>>,
    verbose: Option<VerboseSwitch>,
    transport: Option<Arc<dyn TransportFactory>>,
    reconnect_strategy: Option<Box<dyn ReconnectionStrategy>>,
}

impl ConnectionBuilder<NoUrl> {
    /// Create a new builder instance
    pub fn new() -> Self {
        Self {
            _state: TypeState::new(),
            url: None,
            config: ConnectionConfig::default(),
            handlers: Vec::new(),
            logger: None,
            verbose: None,
            transport: None,
            reconnect_strategy: None,
        }
    }

    pub fn url(self, url: impl Into<String>) -> ConnectionBuilder<HasUrl> {
        ConnectionBuilder {
            _state: TypeState::new(),
            url: Some(url.into()),
            config: self.config,
            handlers: self.handlers,
            logger: self.logger,
            verbose: self.verbose,
            transport: self.transport,
            reconnect_strategy: self.reconnect_strategy,
        }
    }
}

impl Default for ConnectionBuilder<NoUrl> {
    fn default() -> Self {
        Self::new()
    }
}

impl<U: UrlState> ConnectionBuilder<U> {
    /// Replace every tunable at once, e.g. with a deserialized config
    pub fn config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Subprotocols requested on every attempt
    pub fn protocols<I, S>(mut self, protocols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.protocols = protocols.into_iter().map(Into::into).collect();
        self
    }

    /// Add one subprotocol
    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.config.protocols.push(protocol.into());
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Cap for the default exponential backoff
    ///
    /// Ignored when a custom strategy is given via
    /// [`reconnect_strategy`](Self::reconnect_strategy).
    pub fn max_retry_delay(mut self, delay: Duration) -> Self {
        self.config.max_retry_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn queue_flush_base_delay(mut self, delay: Duration) -> Self {
        self.config.queue_flush_base_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Log every dispatched event of this connection
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    pub fn send_policy(mut self, policy: SendPolicy) -> Self {
        self.config.send_policy = policy;
        self
    }

    /// Use `switch` instead of the process-wide verbose switch
    pub fn verbose_switch(mut self, switch: VerboseSwitch) -> Self {
        self.verbose = Some(switch);
        self
    }

    /// Where verbose dispatch lines go
    pub fn logger(mut self, logger: impl EventLogger) -> Self {
        self.logger = Some(Arc::new(logger));
        self
    }

    /// Replace the WebSocket transport, e.g. with a test double
    pub fn transport(mut self, factory: impl TransportFactory) -> Self {
        self.transport = Some(Arc::new(factory));
        self
    }

    pub fn reconnect_strategy(mut self, strategy: impl ReconnectionStrategy + 'static) -> Self {
        self.reconnect_strategy = Some(Box::new(strategy));
        self
    }

    /// Register the handler for `kind`; a later call for the same kind wins
    pub fn on(mut self, kind: EventKind, handler: impl EventHandler) -> Self {
        self.handlers.push((kind, Arc::new(handler)));
        self
    }

    pub fn on_connecting(self, handler: impl EventHandler) -> Self {
        self.on(EventKind::Connecting, handler)
    }

    pub fn on_open(self, handler: impl EventHandler) -> Self {
        self.on(EventKind::Open, handler)
    }

    pub fn on_message(self, handler: impl EventHandler) -> Self {
        self.on(EventKind::Message, handler)
    }

    pub fn on_error(self, handler: impl EventHandler) -> Self {
        self.on(EventKind::Error, handler)
    }

    pub fn on_close(self, handler: impl EventHandler) -> Self {
        self.on(EventKind::Close, handler)
    }

    pub fn on_timeout(self, handler: impl EventHandler) -> Self {
        self.on(EventKind::Timeout, handler)
    }
}

impl ConnectionBuilder<HasUrl> {
    /// Validate the configuration and start connecting
    ///
    /// Must be called from within a Tokio runtime. The first attempt
    /// starts once the driver task runs, never inside this call.
    pub fn build(self) -> Result<Connection> {
        let url = self
            .url
            .ok_or_else(|| SocketError::Configuration("URL must be set".to_string()))?;
        if url.trim().is_empty() {
            return Err(SocketError::Configuration("URL cannot be empty".to_string()));
        }
        self.config.validate()?;

        let strategy = self.reconnect_strategy.unwrap_or_else(|| {
            Box::new(ExponentialBackoff::new(self.config.max_retry_delay()))
        });
        let logger = self.logger.unwrap_or_else(|| Arc::new(TracingLogger));
        let verbose = self.verbose.unwrap_or_else(VerboseSwitch::global);
        let factory = self
            .transport
            .unwrap_or_else(|| Arc::new(WebSocketTransport::new()));

        let proxy = EventProxy::new(url.clone(), self.config.debug, verbose, logger);
        for (kind, handler) in self.handlers {
            proxy.set_handler(kind, handler);
        }

        let shared = Arc::new(Shared {
            url,
            protocols: self.config.protocols.clone(),
            lifecycle: AtomicLifecycle::new(Lifecycle::Init),
            ready_state: AtomicReadyState::new(ReadyState::Connecting),
            metrics: AtomicMetrics::new(),
            proxy,
        });

        Connection::spawn(DriverParts {
            shared,
            factory,
            strategy,
            connect_timeout: self.config.connect_timeout(),
            flush_base: self.config.queue_flush_base_delay(),
            policy: self.config.send_policy,
        })
    }
}
