//! Error types for the IPC layer.

use thiserror::Error;

/// IPC error type.
#[derive(Debug, Error)]
pub enum IpcError {
    /// Socket setup or I/O failure.
    #[error("socket error: {0}")]
    Socket(String),

    /// Underlying I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed protocol payload.
    #[error("protocol error: {0}")]
    Protocol(#[from] serde_json::Error),

    /// The peer closed the connection mid-exchange.
    #[error("connection closed")]
    ConnectionClosed,
}

/// Result type for IPC operations.
pub type IpcResult<T> = Result<T, IpcError>;
