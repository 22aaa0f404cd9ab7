use thiserror::Error;

/// Main error type for resock
#[derive(Error, Debug)]
pub enum SocketError {
    /// WebSocket protocol or I/O error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// The connection has reached its terminal state
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    /// Direct send attempted on a transport that cannot carry it
    #[error("Transport not open (ready state {0})")]
    NotOpen(u8),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Channel send error
    #[error("Channel send error: {0}")]
    ChannelSend(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for SocketError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        SocketError::WebSocket(e.to_string())
    }
}

/// Result type for resock operations
pub type Result<T> = std::result::Result<T, SocketError>;
