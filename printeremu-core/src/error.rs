//! Error types for printeremu-core

use crate::packet::PacketType;

/// Result type alias for printeremu-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core protocol errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Frame carried no packet-type marker
    #[error("Empty frame")]
    EmptyFrame,
    
    /// Leading marker is not a known packet type
    #[error("Unknown packet type marker: {0:?}")]
    UnknownPacketType(char),
    
    /// Packet type requires a payload but none was sent
    #[error("{0} frame is missing its payload")]
    MissingPayload(PacketType),
    
    /// Envelope or payload is not valid JSON for its shape
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    
    /// Payload is well-formed JSON but lacks required fields
    #[error("Invalid payload for '{event}': {reason}")]
    InvalidPayload {
        event: String,
        reason: String,
    },
    
    /// Invalid session state
    #[error("Invalid session state: {0}")]
    InvalidSessionState(String),
}

impl Error {
    /// Check if the error only affects the frame at hand
    ///
    /// The read loop logs recoverable errors and continues.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::EmptyFrame
                | Self::UnknownPacketType(_)
                | Self::MissingPayload(_)
                | Self::Json(_)
                | Self::InvalidPayload { .. }
        )
    }
}
