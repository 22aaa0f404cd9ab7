//! # Resock Traits
//!
//! Capability seams of the resock connection:
//!
//! - **Transport / TransportFactory**: the raw per-attempt socket
//! - **EventHandler**: owner callbacks, one per event kind
//! - **EventLogger**: sink for verbose dispatch logging
//! - **ReconnectionStrategy**: delay between failed cycles
//!
//! ## Example
//!
//! ```rust,ignore
//! use resock::*;
//!
//! // Any closure taking &Event is a handler
//! let on_close = |event: &Event| {
//!     if let Event::Close(close) = event {
//!         println!("closed: {}", close.kind());
//!     }
//! };
//! ```

pub mod error;
pub mod handler;
pub mod logger;
pub mod reconnect;
pub mod transport;

// Re-export commonly used types
pub use error::{Result, SocketError};
pub use handler::{CloseEvent, CloseKind, Event, EventHandler, EventKind};
pub use logger::{BufferedLogger, EventLogger, TracingLogger};
pub use reconnect::{ExponentialBackoff, FixedDelay, ReconnectionStrategy};
pub use transport::{
    CloseFrame, Payload, ReadyState, Transport, TransportEvent, TransportFactory, TransportSink,
};
