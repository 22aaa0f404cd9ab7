use crate::error::Result;
use tokio::sync::mpsc::UnboundedSender;

/// Outbound or inbound message body
/// Can be Text or Binary data
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Binary(Vec<u8>),
}

impl Payload {
    /// Get the payload as text, if it is text
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(s) => Some(s),
            Payload::Binary(_) => None,
        }
    }

    /// Get the payload as binary, if it is binary
    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            Payload::Text(_) => None,
            Payload::Binary(b) => Some(b),
        }
    }

    /// Check if payload is text
    pub fn is_text(&self) -> bool {
        matches!(self, Payload::Text(_))
    }

    /// Size of the payload body in bytes
    pub fn len(&self) -> usize {
        match self {
            Payload::Text(s) => s.len(),
            Payload::Binary(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Payload::Text(s)
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Payload::Text(s.to_string())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(b: Vec<u8>) -> Self {
        Payload::Binary(b)
    }
}

/// Socket ready state, numbered like the standard WebSocket codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ReadyState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl ReadyState {
    /// Numeric code of this state
    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Inverse of [`ReadyState::code`]; unknown codes map to `Closed`
    #[inline]
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => ReadyState::Connecting,
            1 => ReadyState::Open,
            2 => ReadyState::Closing,
            _ => ReadyState::Closed,
        }
    }
}

/// Close details reported by a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    pub code: u16,
    pub reason: String,
    pub was_clean: bool,
}

impl CloseFrame {
    /// Normal closure (1000)
    pub fn normal() -> Self {
        Self {
            code: 1000,
            reason: String::new(),
            was_clean: true,
        }
    }

    /// Abnormal closure (1006): no close frame was exchanged
    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self {
            code: 1006,
            reason: reason.into(),
            was_clean: false,
        }
    }
}

/// Raw signal emitted by a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Open,
    Message(Payload),
    Error(String),
    Close(CloseFrame),
}

/// Event reporter handed to every transport at creation
///
/// Events are tagged with the id of the attempt that created the transport,
/// so signals from a superseded transport can be told apart.
#[derive(Debug, Clone)]
pub struct TransportSink {
    id: u64,
    tx: UnboundedSender<(u64, TransportEvent)>,
}

impl TransportSink {
    pub fn new(id: u64, tx: UnboundedSender<(u64, TransportEvent)>) -> Self {
        Self { id, tx }
    }

    /// Attempt id this sink reports for
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Report an event; returns false once the connection is gone
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.tx.send((self.id, event)).is_ok()
    }
}

/// A raw bidirectional socket for a single connection attempt
///
/// A transport is never reused: the connection creates a fresh one for
/// every attempt and drops it after its close signal.
pub trait Transport: Send {
    /// Current ready state of this transport
    fn ready_state(&self) -> ReadyState;

    /// Hand a payload to the socket
    ///
    /// # Returns
    /// * `Ok(())` - Payload accepted for transmission
    /// * `Err(SocketError::NotOpen)` - Socket cannot carry payloads right now
    fn send(&mut self, payload: Payload) -> Result<()>;

    /// Request closure
    ///
    /// Must eventually produce exactly one `TransportEvent::Close`, whatever
    /// state the transport is in. Calling it more than once is harmless.
    fn close(&mut self);
}

/// Creates transports, one per connection attempt
pub trait TransportFactory: Send + Sync + 'static {
    /// Start a new connection attempt towards `url`
    ///
    /// The returned transport starts in `ReadyState::Connecting` and reports
    /// through `sink`.
    fn open(&self, url: &str, protocols: &[String], sink: TransportSink) -> Box<dyn Transport>;
}
