use crate::transport::Payload;
use std::fmt;

/// Augmented close notification delivered to the owner
///
/// The three flags reflect why the transport went away at the moment it
/// closed, so owners can tell intentional closes from network failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseEvent {
    /// Owner called `close()`; no reconnection follows
    pub forced: bool,
    /// Close was requested by `retry()` or by the connect timeout
    pub is_retrying: bool,
    /// Close was requested by `refresh()`
    pub is_refreshing: bool,
    pub code: u16,
    pub reason: String,
    pub was_clean: bool,
}

impl CloseEvent {
    /// Classify this close
    pub fn kind(&self) -> CloseKind {
        if self.forced {
            CloseKind::Forced
        } else if self.is_refreshing {
            CloseKind::Refresh
        } else if self.is_retrying {
            CloseKind::Retry
        } else {
            CloseKind::Unexpected
        }
    }
}

/// Why a transport closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseKind {
    /// Owner called `close()`; terminal
    Forced,
    /// `retry()` was called; reconnects
    Retry,
    /// `refresh()` was called; reconnects
    Refresh,
    /// Connect attempt exceeded its budget; reconnects
    Timeout,
    /// Nobody asked for it; reconnects with backoff
    Unexpected,
    /// Closed after teardown notice; neither reported nor recovered
    Suppressed,
}

impl fmt::Display for CloseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CloseKind::Forced => "forced",
            CloseKind::Retry => "retry",
            CloseKind::Refresh => "refresh",
            CloseKind::Timeout => "timeout",
            CloseKind::Unexpected => "unexpected",
            CloseKind::Suppressed => "suppressed",
        };
        f.write_str(name)
    }
}

/// Owner-visible notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Connecting,
    Open,
    Message(Payload),
    Error(String),
    Close(CloseEvent),
    Timeout,
}

impl Event {
    /// Slot this event is dispatched to
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Connecting => EventKind::Connecting,
            Event::Open => EventKind::Open,
            Event::Message(_) => EventKind::Message,
            Event::Error(_) => EventKind::Error,
            Event::Close(_) => EventKind::Close,
            Event::Timeout => EventKind::Timeout,
        }
    }
}

/// The six handler slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connecting,
    Open,
    Message,
    Error,
    Close,
    Timeout,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::Connecting,
        EventKind::Open,
        EventKind::Message,
        EventKind::Error,
        EventKind::Close,
        EventKind::Timeout,
    ];

    /// Handler slot name, as shown in verbose logs
    pub fn name(self) -> &'static str {
        match self {
            EventKind::Connecting => "onconnecting",
            EventKind::Open => "onopen",
            EventKind::Message => "onmessage",
            EventKind::Error => "onerror",
            EventKind::Close => "onclose",
            EventKind::Timeout => "ontimeout",
        }
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

/// Trait for receiving connection events
///
/// One handler may be registered per [`EventKind`]. Handlers run on the
/// connection's driver task, so they should return quickly.
///
/// Any `Fn(&Event) + Send + Sync` closure is a handler.
pub trait EventHandler: Send + Sync + 'static {
    fn handle(&self, event: &Event);
}

impl<F> EventHandler for F
where
    F: Fn(&Event) + Send + Sync + 'static,
{
    fn handle(&self, event: &Event) {
        self(event)
    }
}
