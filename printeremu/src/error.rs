//! High-level error types

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Core protocol error: {0}")]
    Core(#[from] printeremu_core::Error),
    
    #[error("Transport error: {0}")]
    Transport(#[from] printeremu_transport::Error),
    
    #[error("Type error: {0}")]
    Types(#[from] printeremu_types::Error),
    
    #[error("Device {0} not connected")]
    NotConnected(u32),
    
    #[error("Device {0} already has a live connection")]
    AlreadyConnected(u32),
    
    #[error("Invalid device configuration: {0}")]
    InvalidConfig(String),
    
    #[error("Send queue closed")]
    QueueClosed,
    
    #[error("Job queue full")]
    QueueFull,
    
    #[error("No async runtime available")]
    NoRuntime,
}
