//! # Resock Core
//!
//! The connection state machine and its parts:
//!
//! - **connection**: the [`Connection`] handle and its driver task
//! - **backoff**: attempt counter, connect timeout and reconnect timer
//! - **queue**: pending payloads and their paced flush schedule
//! - **proxy**: per-kind handler slots and verbose dispatch logging
//! - **websocket**: the default transport
//!
//! ## Example
//!
//! ```rust,ignore
//! use resock::*;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let conn = resock::builder()
//!         .url("wss://stream.example.com/feed")
//!         .protocol("feed.v2")
//!         .connect_timeout(Duration::from_secs(5))
//!         .max_retry_delay(Duration::from_secs(30))
//!         .on_message(|event: &Event| {
//!             if let Event::Message(payload) = event {
//!                 println!("{:?}", payload.as_text());
//!             }
//!         })
//!         .on_close(|event: &Event| {
//!             if let Event::Close(close) = event {
//!                 println!("closed ({})", close.kind());
//!             }
//!         })
//!         .build()?;
//!
//!     // Queued until the first open, then flushed
//!     conn.send("subscribe")?;
//!
//!     conn.shutdown().await
//! }
//! ```

pub mod backoff;
pub mod builder;
pub mod config;
pub mod connection;
pub mod connection_state;
pub mod proxy;
pub mod queue;
pub mod websocket;

// Re-export main types
pub use backoff::{BackoffScheduler, Timer};
pub use builder::{states, ConnectionBuilder};
pub use config::{ConnectionConfig, SendPolicy};
pub use connection::Connection;
pub use connection_state::{AtomicLifecycle, AtomicMetrics, AtomicReadyState, Lifecycle, Metrics};
pub use proxy::{EventProxy, VerboseSwitch};
pub use queue::{EntryId, PendingQueue, QueueEntry};
pub use websocket::WebSocketTransport;

// Re-export traits for convenience
pub use crate::traits::*;

/// Create a new connection builder
///
/// Convenience entry point for the builder pattern.
///
/// # Example
/// ```ignore
/// let conn = resock::builder()
///     .url("ws://127.0.0.1:9000")
///     .on_open(|_: &Event| println!("open"))
///     .build()?;
/// ```
pub fn builder() -> ConnectionBuilder<builder::states::NoUrl> {
    ConnectionBuilder::new()
}
