//! Transport layer for the printer emulator
//!
//! Provides WebSocket, line-delimited TCP and in-memory connections.
//! Every connection is split into a writer half and a reader half so the
//! protocol client can own each from its own task.

pub mod backoff;
pub mod error;
pub mod memory;
pub mod tcp;
pub mod ws;

pub use backoff::{connect_with_retry, RetryPolicy};
pub use error::{Error, Result};
pub use memory::{MemoryPeer, MemoryTransport};
pub use tcp::TcpTransport;
pub use ws::WsTransport;

use async_trait::async_trait;
use printeremu_core::Frame;

/// Maximum inbound frame size (64KB)
pub const MAX_FRAME_SIZE: usize = 65535;

/// Transport trait for different connection methods
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a new connection
    ///
    /// May be called again after a failure or a closed connection.
    async fn connect(&self) -> Result<FramedConnection>;
    
    /// Get remote address
    fn remote_addr(&self) -> String;
}

/// Outbound half of a connection
#[async_trait]
pub trait FrameWriter: Send {
    /// Write one frame
    async fn send(&mut self, frame: &Frame) -> Result<()>;
    
    /// Close the outbound direction
    async fn close(&mut self) -> Result<()>;
}

/// Inbound half of a connection
///
/// Yields raw frame text; decoding is left to the caller so a malformed
/// frame fails alone rather than the whole read half.
#[async_trait]
pub trait FrameReader: Send {
    /// Next frame text, or `None` once the peer closed the connection
    async fn recv(&mut self) -> Result<Option<String>>;
}

/// A connected transport, split into halves
pub struct FramedConnection {
    pub writer: Box<dyn FrameWriter>,
    pub reader: Box<dyn FrameReader>,
    pub remote_addr: String,
}

impl std::fmt::Debug for FramedConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramedConnection")
            .field("remote_addr", &self.remote_addr)
            .finish_non_exhaustive()
    }
}
