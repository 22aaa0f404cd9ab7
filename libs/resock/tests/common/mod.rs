//! Common test utilities for resock integration tests
//!
//! - [`MockTransportFactory`]: scriptable in-memory transports for driving
//!   the state machine under paused time
//! - [`Recorder`]: captures every event a connection dispatches
//! - [`FlakyServer`]: a real echo server that can drop its clients

#![allow(dead_code)]

use parking_lot::Mutex;
use resock::*;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{watch, Notify};
use tokio::time::Instant;

/// Macro for verbose test output (controlled by TEST_VERBOSE env var)
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

/// Let spawned tasks process everything already queued, without moving the clock
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

/// Move the paused clock forward and let the driver react
pub async fn advance(duration: Duration) {
    tokio::time::advance(duration).await;
    settle().await;
}

// -------------------------------------------------------------------------
// Mock transport
// -------------------------------------------------------------------------

/// One transport handed out by [`MockTransportFactory`]
pub struct MockSocket {
    pub url: String,
    pub protocols: Vec<String>,
    sink: TransportSink,
    state: Mutex<ReadyState>,
    sent: Mutex<Vec<(Instant, Payload)>>,
    close_calls: AtomicU32,
    deferred_close: bool,
}

impl MockSocket {
    pub fn ready_state(&self) -> ReadyState {
        *self.state.lock()
    }

    /// Change the reported state without emitting anything
    pub fn set_state(&self, state: ReadyState) {
        *self.state.lock() = state;
    }

    /// Complete the handshake
    pub fn accept(&self) {
        *self.state.lock() = ReadyState::Open;
        self.sink.emit(TransportEvent::Open);
    }

    /// Deliver an inbound message
    pub fn receive(&self, payload: impl Into<Payload>) {
        self.sink.emit(TransportEvent::Message(payload.into()));
    }

    pub fn fail(&self, error: &str) {
        self.sink.emit(TransportEvent::Error(error.to_string()));
    }

    /// Lose the connection from the far side
    pub fn drop_connection(&self, code: u16) {
        *self.state.lock() = ReadyState::Closed;
        self.sink.emit(TransportEvent::Close(CloseFrame {
            code,
            reason: "connection lost".to_string(),
            was_clean: false,
        }));
    }

    /// Payloads written to this transport, in order
    pub fn sent(&self) -> Vec<Payload> {
        self.sent.lock().iter().map(|(_, p)| p.clone()).collect()
    }

    /// Payloads with the (paused-clock) instant they were written
    pub fn sent_at(&self) -> Vec<(Instant, Payload)> {
        self.sent.lock().clone()
    }

    pub fn close_calls(&self) -> u32 {
        self.close_calls.load(Ordering::Acquire)
    }

    /// Finish a close handshake held back by a deferred-close factory
    pub fn complete_close(&self) {
        *self.state.lock() = ReadyState::Closed;
        self.sink.emit(TransportEvent::Close(CloseFrame::normal()));
    }
}

struct MockTransport(Arc<MockSocket>);

impl Transport for MockTransport {
    fn ready_state(&self) -> ReadyState {
        self.0.ready_state()
    }

    fn send(&mut self, payload: Payload) -> resock::Result<()> {
        let state = self.0.ready_state();
        if state != ReadyState::Open {
            return Err(SocketError::NotOpen(state.code()));
        }
        self.0.sent.lock().push((Instant::now(), payload));
        Ok(())
    }

    fn close(&mut self) {
        self.0.close_calls.fetch_add(1, Ordering::AcqRel);
        if self.0.deferred_close {
            let mut state = self.0.state.lock();
            if *state != ReadyState::Closed {
                *state = ReadyState::Closing;
            }
            return;
        }
        let previous = std::mem::replace(&mut *self.0.state.lock(), ReadyState::Closed);
        let frame = match previous {
            ReadyState::Open => CloseFrame::normal(),
            ReadyState::Connecting => CloseFrame::abnormal("closed before open"),
            ReadyState::Closing | ReadyState::Closed => return,
        };
        self.0.sink.emit(TransportEvent::Close(frame));
    }
}

/// Transport factory whose sockets are driven by the test
#[derive(Clone, Default)]
pub struct MockTransportFactory {
    sockets: Arc<Mutex<Vec<Arc<MockSocket>>>>,
    auto_accept: bool,
    deferred_close: bool,
}

impl MockTransportFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every socket completes its handshake on creation
    pub fn auto_accept() -> Self {
        Self {
            auto_accept: true,
            ..Self::default()
        }
    }

    /// Closing a socket only reports once the test calls
    /// [`MockSocket::complete_close`]
    pub fn deferred_close() -> Self {
        Self {
            deferred_close: true,
            ..Self::default()
        }
    }

    /// Number of connect attempts made so far
    pub fn attempts(&self) -> usize {
        self.sockets.lock().len()
    }

    /// Socket of attempt `index` (0-based)
    pub fn socket(&self, index: usize) -> Arc<MockSocket> {
        Arc::clone(&self.sockets.lock()[index])
    }

    /// Most recent socket
    pub fn last(&self) -> Arc<MockSocket> {
        let sockets = self.sockets.lock();
        Arc::clone(sockets.last().expect("no connect attempt yet"))
    }
}

impl TransportFactory for MockTransportFactory {
    fn open(&self, url: &str, protocols: &[String], sink: TransportSink) -> Box<dyn Transport> {
        let socket = Arc::new(MockSocket {
            url: url.to_string(),
            protocols: protocols.to_vec(),
            sink,
            state: Mutex::new(ReadyState::Connecting),
            sent: Mutex::new(Vec::new()),
            close_calls: AtomicU32::new(0),
            deferred_close: self.deferred_close,
        });
        if self.auto_accept {
            socket.accept();
        }
        self.sockets.lock().push(Arc::clone(&socket));
        Box::new(MockTransport(socket))
    }
}

// -------------------------------------------------------------------------
// Event recorder
// -------------------------------------------------------------------------

/// Registers a handler for every event kind and keeps what it sees
#[derive(Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<Event>>>,
}

impl Recorder {
    pub fn attach(conn: &Connection) -> Self {
        let recorder = Self::default();
        for kind in EventKind::ALL {
            let events = Arc::clone(&recorder.events);
            conn.on(kind, move |event: &Event| events.lock().push(event.clone()));
        }
        recorder
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.events.lock().iter().map(Event::kind).collect()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.events.lock().iter().filter(|e| e.kind() == kind).count()
    }

    pub fn closes(&self) -> Vec<CloseEvent> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Event::Close(close) => Some(close.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn messages(&self) -> Vec<Payload> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Event::Message(payload) => Some(payload.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

/// Connection on a fresh mock factory, with a recorder attached
pub fn mock_connection(
    factory: &MockTransportFactory,
    configure: impl FnOnce(ConnectionBuilder<states::HasUrl>) -> ConnectionBuilder<states::HasUrl>,
) -> (Connection, Recorder) {
    let builder = resock::connection_builder()
        .url("mock://resock.test/feed")
        .transport(factory.clone())
        .verbose_switch(VerboseSwitch::new(false));
    let conn = configure(builder).build().expect("build connection");
    let recorder = Recorder::attach(&conn);
    (conn, recorder)
}

// -------------------------------------------------------------------------
// Real server
// -------------------------------------------------------------------------

/// WebSocket echo server that can sever its clients or stop accepting
pub struct FlakyServer {
    pub addr: SocketAddr,
    shutdown: Arc<Notify>,
    sever: Arc<watch::Sender<u64>>,
    accepted: Arc<AtomicUsize>,
}

impl FlakyServer {
    /// Start on an ephemeral port
    pub async fn start() -> Self {
        Self::bind("127.0.0.1:0".parse().unwrap()).await
    }

    /// Start on `addr`, e.g. to come back on the port of a stopped server
    pub async fn bind(addr: SocketAddr) -> Self {
        let listener = TcpListener::bind(addr).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Arc::new(Notify::new());
        let sever = Arc::new(watch::channel(0u64).0);
        let accepted = Arc::new(AtomicUsize::new(0));

        let shutdown_clone = Arc::clone(&shutdown);
        let sever_clone = Arc::clone(&sever);
        let accepted_clone = Arc::clone(&accepted);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, _)) => {
                                accepted_clone.fetch_add(1, Ordering::AcqRel);
                                // Subscribed before the handshake so no sever is missed
                                let sever = sever_clone.subscribe();
                                tokio::spawn(async move {
                                    Self::handle_connection(stream, sever).await;
                                });
                            }
                            Err(e) => {
                                eprintln!("Accept error: {}", e);
                                break;
                            }
                        }
                    }
                    _ = shutdown_clone.notified() => {
                        break;
                    }
                }
            }
        });

        Self {
            addr,
            shutdown,
            sever,
            accepted,
        }
    }

    async fn handle_connection(stream: tokio::net::TcpStream, mut sever: watch::Receiver<u64>) {
        use futures::{SinkExt, StreamExt};
        use tokio_tungstenite::accept_async;

        let ws_stream = match accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                eprintln!("WebSocket handshake failed: {}", e);
                return;
            }
        };

        let (mut write, mut read) = ws_stream.split();

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(msg)) => {
                            if msg.is_text() || msg.is_binary() {
                                // Echo the message back
                                if write.send(msg).await.is_err() {
                                    break;
                                }
                            } else if msg.is_close() {
                                let _ = write.close().await;
                                break;
                            }
                        }
                        Some(Err(_)) | None => break,
                    }
                }
                _ = sever.changed() => {
                    // Drop the TCP stream without a close frame
                    break;
                }
            }
        }
    }

    /// Get the WebSocket URL for this server
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Connections accepted so far
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::Acquire)
    }

    /// Abruptly drop every live client connection
    pub fn sever(&self) {
        self.sever.send_modify(|generation| *generation += 1);
    }

    /// Stop accepting new connections; live ones are unaffected
    pub fn stop_listening(&self) {
        self.shutdown.notify_one();
    }
}

impl Drop for FlakyServer {
    fn drop(&mut self) {
        self.stop_listening();
        self.sever();
    }
}

/// Poll `condition` every 10ms until it holds or `timeout` passes
pub async fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
