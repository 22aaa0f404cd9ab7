use crate::core::backoff::BackoffScheduler;
use crate::core::builder::{states, ConnectionBuilder};
use crate::core::config::SendPolicy;
use crate::core::connection_state::{
    AtomicLifecycle, AtomicMetrics, AtomicReadyState, Lifecycle, Metrics,
};
use crate::core::proxy::EventProxy;
use crate::core::queue::PendingQueue;
use crate::traits::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Owner requests, processed in order by the driver task
#[derive(Debug)]
enum Command {
    Send(Payload),
    Close,
    Retry,
    Refresh,
    Suppress,
}

/// State readable from any handle without a round trip to the driver
pub(crate) struct Shared {
    pub(crate) url: String,
    pub(crate) protocols: Vec<String>,
    pub(crate) lifecycle: AtomicLifecycle,
    pub(crate) ready_state: AtomicReadyState,
    pub(crate) metrics: AtomicMetrics,
    pub(crate) proxy: EventProxy,
}

/// Everything the builder hands over to start a connection
pub(crate) struct DriverParts {
    pub(crate) shared: Arc<Shared>,
    pub(crate) factory: Arc<dyn TransportFactory>,
    pub(crate) strategy: Box<dyn ReconnectionStrategy>,
    pub(crate) connect_timeout: Duration,
    pub(crate) flush_base: Duration,
    pub(crate) policy: SendPolicy,
}

/// Resilient message socket
///
/// Presents the surface of a raw socket (`send`, `close`, ready state,
/// event handlers) while transparently replacing the underlying transport
/// whenever it is lost:
/// - Reconnects with exponential backoff after unexpected closes
/// - Bounds every connect attempt with a timeout
/// - Queues payloads while no transport is usable and flushes them, paced,
///   once open again
/// - Tells the owner why each close happened (`forced`, `is_retrying`,
///   `is_refreshing`)
///
/// All state-machine work happens on one driver task; methods on this
/// handle never block and report results through the event handlers.
/// Dropping the handle closes the connection.
///
/// # Example
///
/// ```ignore
/// let conn = Connection::builder()
///     .url("ws://127.0.0.1:9000")
///     .on_message(|event: &Event| println!("{:?}", event))
///     .build()?;
///
/// conn.send("hello")?;
/// ```
pub struct Connection {
    shared: Arc<Shared>,
    command_tx: UnboundedSender<Command>,
    task_handle: Option<JoinHandle<()>>,
}

impl Connection {
    /// Start configuring a connection
    pub fn builder() -> ConnectionBuilder<states::NoUrl> {
        ConnectionBuilder::new()
    }

    /// Spawn the driver task
    ///
    /// The first connect attempt is deferred until the driver task first
    /// runs, so handlers registered right after this returns still see
    /// every event.
    pub(crate) fn spawn(parts: DriverParts) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            SocketError::Configuration(format!("a Tokio runtime is required: {}", e))
        })?;

        let shared = Arc::clone(&parts.shared);
        let (command_tx, command_rx) = unbounded_channel();
        let driver = Driver::new(parts, command_rx);
        let task_handle = runtime.spawn(driver.run());

        Ok(Self {
            shared,
            command_tx,
            task_handle: Some(task_handle),
        })
    }

    fn command(&self, command: Command) -> Result<()> {
        self.command_tx.send(command).map_err(|e| {
            SocketError::ConnectionClosed(format!("driver stopped, dropped {:?}", e.0))
        })
    }

    /// Send a payload, or queue it until a transport can take it
    pub fn send(&self, payload: impl Into<Payload>) -> Result<()> {
        self.command(Command::Send(payload.into()))
    }

    /// Close for good
    ///
    /// Enters the terminal state right away, cancels any pending timer and
    /// never reconnects. The close handler sees `forced = true`.
    pub fn close(&self) -> Result<()> {
        self.command(Command::Close)
    }

    /// Drop the current transport and connect again
    ///
    /// The resulting close event carries `is_retrying = true`.
    pub fn retry(&self) -> Result<()> {
        self.command(Command::Retry)
    }

    /// Drop the current transport and connect again
    ///
    /// The resulting close event carries `is_refreshing = true`.
    pub fn refresh(&self) -> Result<()> {
        self.command(Command::Refresh)
    }

    /// Notify that the hosting environment is tearing down
    ///
    /// Any later transport close is neither reported nor recovered from.
    pub fn suppress(&self) -> Result<()> {
        self.command(Command::Suppress)
    }

    /// Target address
    pub fn url(&self) -> &str {
        &self.shared.url
    }

    /// Requested subprotocols
    pub fn protocols(&self) -> &[String] {
        &self.shared.protocols
    }

    /// Ready state in standard socket terms
    #[inline]
    pub fn ready_state(&self) -> ReadyState {
        self.shared.ready_state.get()
    }

    /// Lifecycle state of the reconnection machine
    #[inline]
    pub fn lifecycle(&self) -> Lifecycle {
        self.shared.lifecycle.get()
    }

    /// Current attempt count (1 after every successful open)
    #[inline]
    pub fn attempt(&self) -> u32 {
        self.shared.metrics.attempt()
    }

    /// Payloads waiting in the pending queue
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.shared.metrics.pending()
    }

    /// Get current metrics
    pub fn metrics(&self) -> Metrics {
        self.shared.metrics.snapshot()
    }

    /// Register the handler for `kind`, replacing any previous one
    pub fn on(&self, kind: EventKind, handler: impl EventHandler) {
        self.shared.proxy.set_handler(kind, Arc::new(handler));
    }

    pub fn on_connecting(&self, handler: impl EventHandler) {
        self.on(EventKind::Connecting, handler);
    }

    pub fn on_open(&self, handler: impl EventHandler) {
        self.on(EventKind::Open, handler);
    }

    pub fn on_message(&self, handler: impl EventHandler) {
        self.on(EventKind::Message, handler);
    }

    pub fn on_error(&self, handler: impl EventHandler) {
        self.on(EventKind::Error, handler);
    }

    pub fn on_close(&self, handler: impl EventHandler) {
        self.on(EventKind::Close, handler);
    }

    pub fn on_timeout(&self, handler: impl EventHandler) {
        self.on(EventKind::Timeout, handler);
    }

    /// Empty the handler slot for `kind`
    pub fn clear_handler(&self, kind: EventKind) {
        self.shared.proxy.clear(kind);
    }

    /// Toggle verbose dispatch logging for this connection only
    pub fn set_debug(&self, debug: bool) {
        self.shared.proxy.set_debug(debug);
    }

    /// Wait until the driver task has finished
    ///
    /// Resolves once the connection is terminal and its last transport is
    /// released. Returns immediately on later calls.
    pub async fn closed(&mut self) {
        if let Some(handle) = self.task_handle.take() {
            if let Err(e) = handle.await {
                warn!("Connection driver for {} ended abnormally: {}", self.shared.url, e);
            }
        }
    }

    /// Close and wait for the terminal state
    pub async fn shutdown(mut self) -> Result<()> {
        info!("Shutting down connection to {}", self.shared.url);
        // An already stopped driver is fine here
        let _ = self.close();
        self.closed().await;
        Ok(())
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("url", &self.shared.url)
            .field("lifecycle", &self.lifecycle())
            .field("ready_state", &self.ready_state())
            .field("attempt", &self.attempt())
            .finish()
    }
}

/// Why the driver woke up
enum Wake {
    Command(Option<Command>),
    Transport(u64, TransportEvent),
    ConnectTimeout,
    Reconnect,
    Flush,
}

/// Flags describing the current cycle, reported on close
#[derive(Debug, Default, Clone, Copy)]
struct CycleFlags {
    was_forced: bool,
    is_retrying: bool,
    is_refreshing: bool,
    has_opened: bool,
    suppressed: bool,
    timed_out: bool,
}

/// Connection state machine, run on a single task
///
/// Owns the live transport, the backoff scheduler and the pending queue.
struct Driver {
    shared: Arc<Shared>,
    factory: Arc<dyn TransportFactory>,
    policy: SendPolicy,
    flush_base: Duration,
    backoff: BackoffScheduler,
    queue: PendingQueue,
    transport: Option<Box<dyn Transport>>,
    attempt_id: u64,
    flags: CycleFlags,
    commands: UnboundedReceiver<Command>,
    commands_closed: bool,
    events_tx: UnboundedSender<(u64, TransportEvent)>,
    events_rx: UnboundedReceiver<(u64, TransportEvent)>,
}

impl Driver {
    fn new(parts: DriverParts, commands: UnboundedReceiver<Command>) -> Self {
        let (events_tx, events_rx) = unbounded_channel();
        Self {
            shared: parts.shared,
            factory: parts.factory,
            policy: parts.policy,
            flush_base: parts.flush_base,
            backoff: BackoffScheduler::new(parts.strategy, parts.connect_timeout),
            queue: PendingQueue::new(),
            transport: None,
            attempt_id: 0,
            flags: CycleFlags::default(),
            commands,
            commands_closed: false,
            events_tx,
            events_rx,
        }
    }

    async fn run(mut self) {
        // Let the owner register handlers before the first event can fire
        tokio::task::yield_now().await;

        // Requests made before the first attempt apply to it
        loop {
            match self.commands.try_recv() {
                Ok(command) => self.handle_command(command),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    debug!("All handles to {} dropped before start", self.shared.url);
                    self.commands_closed = true;
                    self.request_close();
                    break;
                }
            }
        }
        if self.shared.lifecycle.get() == Lifecycle::Init {
            self.connect();
        }

        while !self.finished() {
            let wake = tokio::select! {
                command = self.commands.recv(), if !self.commands_closed => Wake::Command(command),
                Some((id, event)) = self.events_rx.recv() => Wake::Transport(id, event),
                _ = self.backoff.connect_timer.fired() => Wake::ConnectTimeout,
                _ = self.backoff.reconnect_timer.fired() => Wake::Reconnect,
                _ = self.queue.flush_timer.fired() => Wake::Flush,
            };

            match wake {
                Wake::Command(Some(command)) => self.handle_command(command),
                Wake::Command(None) => {
                    debug!("All handles to {} dropped, closing", self.shared.url);
                    self.commands_closed = true;
                    self.request_close();
                }
                Wake::Transport(id, event) => self.handle_transport_event(id, event),
                Wake::ConnectTimeout => self.handle_connect_timeout(),
                Wake::Reconnect => self.handle_reconnect_due(),
                Wake::Flush => self.flush_due(),
            }
        }

        debug!("Connection driver for {} exiting", self.shared.url);
    }

    /// Terminal and holding no transport
    fn finished(&self) -> bool {
        self.shared.lifecycle.is_terminal() && self.transport.is_none()
    }

    fn set_state(&self, lifecycle: Lifecycle, ready_state: ReadyState) {
        self.shared.lifecycle.set(lifecycle);
        self.shared.ready_state.set(ready_state);
    }

    fn sync_pending(&self) {
        self.shared.metrics.set_pending(self.queue.len());
    }

    fn transport_is_open(&self) -> bool {
        self.transport
            .as_ref()
            .map_or(false, |t| t.ready_state() == ReadyState::Open)
    }

    // ---------------------------------------------------------------------
    // Connect cycle
    // ---------------------------------------------------------------------

    fn connect(&mut self) {
        if self.transport.is_some() {
            // Never overlap attempts; the close of the live one reschedules
            warn!("Connect requested for {} while a transport is live", self.shared.url);
            return;
        }

        self.attempt_id += 1;
        if self.attempt_id > 1 {
            self.shared.metrics.increment_reconnects();
        }
        self.flags.has_opened = false;
        self.flags.timed_out = false;
        self.set_state(Lifecycle::Connecting, ReadyState::Connecting);

        debug!(
            "Connecting to {} (attempt {}, transport #{})",
            self.shared.url,
            self.backoff.attempt(),
            self.attempt_id
        );
        let sink = TransportSink::new(self.attempt_id, self.events_tx.clone());
        self.transport = Some(
            self.factory
                .open(&self.shared.url, &self.shared.protocols, sink),
        );
        self.backoff.arm_connect_timeout();
        self.shared.proxy.trigger(&Event::Connecting);
    }

    fn handle_connect_timeout(&mut self) {
        if self.flags.suppressed
            || self.shared.lifecycle.get() != Lifecycle::Connecting
            || self.transport.is_none()
        {
            return;
        }

        warn!(
            "Connect attempt {} to {} timed out",
            self.backoff.attempt(),
            self.shared.url
        );
        self.shared.metrics.increment_timeouts();
        self.flags.timed_out = true;
        self.shared.proxy.trigger(&Event::Timeout);

        self.flags.is_retrying = true;
        if let Some(transport) = self.transport.as_mut() {
            transport.close();
        }
    }

    fn handle_reconnect_due(&mut self) {
        if self.shared.lifecycle.get() == Lifecycle::ReconnectWait {
            self.connect();
        }
    }

    // ---------------------------------------------------------------------
    // Transport signals
    // ---------------------------------------------------------------------

    fn handle_transport_event(&mut self, id: u64, event: TransportEvent) {
        if id != self.attempt_id || self.transport.is_none() {
            debug!("Ignoring {:?} from superseded transport #{}", event, id);
            return;
        }

        match event {
            TransportEvent::Open => self.handle_open(),
            TransportEvent::Message(payload) => {
                self.shared.metrics.increment_received();
                self.shared.proxy.trigger(&Event::Message(payload));
            }
            TransportEvent::Error(error) => {
                debug!("Transport error on {}: {}", self.shared.url, error);
                self.shared.proxy.trigger(&Event::Error(error));
            }
            TransportEvent::Close(frame) => self.handle_close(frame),
        }
    }

    fn handle_open(&mut self) {
        self.backoff.cancel_connect_timeout();

        if self.flags.was_forced {
            debug!("Transport to {} opened after close(), closing it", self.shared.url);
            if let Some(transport) = self.transport.as_mut() {
                transport.close();
            }
            return;
        }

        self.backoff.reset();
        self.shared.metrics.set_attempt(self.backoff.attempt());
        self.flags.has_opened = true;
        self.set_state(Lifecycle::Open, ReadyState::Open);
        info!("Connected to {}", self.shared.url);
        self.shared.proxy.trigger(&Event::Open);

        let planned = self.queue.schedule_flush(Instant::now(), self.flush_base);
        if planned > 0 {
            debug!("Flushing {} queued payloads to {}", planned, self.shared.url);
        }
    }

    fn handle_close(&mut self, frame: CloseFrame) {
        self.transport = None;
        self.backoff.cancel_connect_timeout();
        self.queue.cancel_flush();

        let flags = self.flags;
        let event = CloseEvent {
            forced: flags.was_forced,
            is_retrying: flags.is_retrying,
            is_refreshing: flags.is_refreshing,
            code: frame.code,
            reason: frame.reason,
            was_clean: frame.was_clean,
        };

        if flags.suppressed {
            self.backoff.cancel_all();
            self.set_state(Lifecycle::ClosedFinal, ReadyState::Closed);
            debug!(
                "Transport to {} closed ({}), abandoning connection",
                self.shared.url,
                CloseKind::Suppressed
            );
            return;
        }

        if flags.was_forced {
            self.backoff.cancel_reconnect();
            self.set_state(Lifecycle::ClosedFinal, ReadyState::Closed);
            info!("Connection to {} closed (code {})", self.shared.url, event.code);
            self.shared.proxy.trigger(&Event::Close(event));
            return;
        }

        let kind = if flags.timed_out {
            CloseKind::Timeout
        } else {
            event.kind()
        };
        if kind == CloseKind::Unexpected {
            warn!(
                "Transport to {} closed unexpectedly (code {}, reason {:?})",
                self.shared.url, event.code, event.reason
            );
        } else {
            debug!("Transport to {} closed ({})", self.shared.url, kind);
        }

        self.set_state(Lifecycle::ReconnectWait, ReadyState::Connecting);
        if flags.has_opened {
            self.shared.proxy.trigger(&Event::Close(event));
        }

        self.flags.is_retrying = false;
        self.flags.is_refreshing = false;
        self.flags.has_opened = false;
        self.flags.timed_out = false;

        self.backoff.schedule_reconnect();
        self.shared.metrics.set_attempt(self.backoff.attempt());
    }

    // ---------------------------------------------------------------------
    // Owner requests
    // ---------------------------------------------------------------------

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Send(payload) => self.handle_send(payload),
            Command::Close => self.request_close(),
            Command::Retry => self.request_restart(CloseKind::Retry),
            Command::Refresh => self.request_restart(CloseKind::Refresh),
            Command::Suppress => self.handle_suppress(),
        }
    }

    fn handle_send(&mut self, payload: Payload) {
        let direct = self
            .transport
            .as_ref()
            .map_or(false, |t| self.policy.sends_directly(t.ready_state()));

        if direct {
            self.transmit(payload);
        } else {
            self.queue.push(payload);
            self.sync_pending();
        }
    }

    fn transmit(&mut self, payload: Payload) {
        let Some(transport) = self.transport.as_mut() else {
            return;
        };
        match transport.send(payload) {
            Ok(()) => self.shared.metrics.increment_sent(),
            Err(e) => {
                warn!("Send to {} failed: {}", self.shared.url, e);
                self.shared.proxy.trigger(&Event::Error(e.to_string()));
            }
        }
    }

    fn flush_due(&mut self) {
        for id in self.queue.due(Instant::now()) {
            if !self.transport_is_open() {
                // Leftovers are rescheduled on the next open
                self.queue.cancel_flush();
                break;
            }
            if let Some(payload) = self.queue.take(id) {
                self.transmit(payload);
            }
        }
        self.sync_pending();
    }

    fn request_close(&mut self) {
        if self.flags.was_forced || self.shared.lifecycle.is_terminal() {
            return;
        }

        self.flags.was_forced = true;
        self.backoff.cancel_all();
        self.queue.cancel_flush();

        match self.transport.as_mut() {
            Some(transport) => {
                debug!("Closing transport to {} on request", self.shared.url);
                transport.close();
                self.set_state(Lifecycle::ClosedFinal, ReadyState::Closing);
            }
            None => {
                self.set_state(Lifecycle::ClosedFinal, ReadyState::Closed);
                info!("Connection to {} closed", self.shared.url);
                self.shared.proxy.trigger(&Event::Close(CloseEvent {
                    forced: true,
                    is_retrying: self.flags.is_retrying,
                    is_refreshing: self.flags.is_refreshing,
                    code: 1000,
                    reason: String::new(),
                    was_clean: true,
                }));
            }
        }
    }

    fn request_restart(&mut self, kind: CloseKind) {
        if self.shared.lifecycle.is_terminal() {
            return;
        }

        match self.transport.as_mut() {
            Some(transport) => {
                match kind {
                    CloseKind::Refresh => self.flags.is_refreshing = true,
                    _ => self.flags.is_retrying = true,
                }
                debug!("Closing transport to {} for {}", self.shared.url, kind);
                transport.close();
                self.queue.cancel_flush();
            }
            None => {
                // Already between transports: skip the rest of the wait
                debug!("{} requested while waiting, connecting {} now", kind, self.shared.url);
                self.backoff.cancel_reconnect();
                self.connect();
            }
        }
    }

    fn handle_suppress(&mut self) {
        self.flags.suppressed = true;
        self.backoff.cancel_connect_timeout();
        if self.transport.is_none() && !self.shared.lifecycle.is_terminal() {
            self.backoff.cancel_all();
            self.set_state(Lifecycle::ClosedFinal, ReadyState::Closed);
            debug!("Teardown notified while idle, abandoning {}", self.shared.url);
        }
    }
}
