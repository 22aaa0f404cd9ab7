//! # Resock
//!
//! A resilient message socket: the surface of a plain WebSocket that
//! survives transport loss.
//!
//! ## Features
//!
//! - **Automatic reconnection**: exponential backoff after unexpected closes
//! - **Connect timeout**: every attempt is bounded; stalled handshakes are retried
//! - **Pending queue**: sends made while disconnected are delivered in order after reopening
//! - **Close reasons**: close events say whether they were forced, a retry or a refresh
//! - **Single-task driver**: all state transitions happen on one Tokio task
//! - **Pluggable seams**: transport, reconnect strategy and dispatch logger are traits

pub mod traits;
pub mod core;

// Re-export all traits
pub use traits::*;

// Re-export core functionality
pub use core::{
    backoff, builder, config, connection, connection_state, proxy, queue, websocket,
    builder::{states, ConnectionBuilder},
    config::{ConnectionConfig, SendPolicy},
    connection::Connection,
    connection_state::{AtomicLifecycle, AtomicMetrics, AtomicReadyState, Lifecycle, Metrics},
    proxy::{EventProxy, VerboseSwitch},
    queue::{EntryId, PendingQueue},
    websocket::WebSocketTransport,
};

// Convenience function
pub use core::builder as connection_builder;
