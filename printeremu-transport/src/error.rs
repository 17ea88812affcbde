//! Transport errors

use std::io;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Not connected")]
    NotConnected,
    
    #[error("Connect failed: {0}")]
    ConnectFailed(String),
    
    #[error("Connection timeout")]
    ConnectionTimeout,
    
    #[error("Read timeout")]
    ReadTimeout,
    
    #[error("Connection closed by remote")]
    ConnectionClosed,
    
    #[error("Frame exceeds {0} bytes")]
    FrameTooLarge(usize),
    
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    
    #[error("Protocol error: {0}")]
    Protocol(#[from] printeremu_core::Error),
    
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    
    #[error("Gave up after {attempts} connect attempts")]
    RetriesExhausted { attempts: usize },
    
    #[error("Connect cancelled")]
    Cancelled,
}

impl Error {
    /// Whether another connect attempt may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConnectFailed(_)
                | Self::ConnectionTimeout
                | Self::ConnectionClosed
                | Self::Io(_)
                | Self::WebSocket(_)
        )
    }
}
