//! In-memory transport
//!
//! `channel()` yields a transport for the client under test and a peer
//! handle standing in for the remote server.

use async_trait::async_trait;
use printeremu_core::{Event, Frame};
use tokio::sync::{mpsc, Mutex};

use crate::{error::*, FrameReader, FrameWriter, FramedConnection, Transport};

/// Frames buffered per direction
const CHANNEL_CAPACITY: usize = 256;

/// Transport that connects exactly once, to its paired [`MemoryPeer`]
pub struct MemoryTransport {
    halves: Mutex<Option<(mpsc::Sender<String>, mpsc::Receiver<String>)>>,
}

/// Remote end of a [`MemoryTransport`]
#[derive(Debug)]
pub struct MemoryPeer {
    tx: mpsc::Sender<String>,
    rx: mpsc::Receiver<String>,
}

/// Create a connected transport/peer pair
pub fn channel() -> (MemoryTransport, MemoryPeer) {
    let (to_client, from_peer) = mpsc::channel(CHANNEL_CAPACITY);
    let (to_peer, from_client) = mpsc::channel(CHANNEL_CAPACITY);
    
    let transport = MemoryTransport {
        halves: Mutex::new(Some((to_peer, from_peer))),
    };
    let peer = MemoryPeer {
        tx: to_client,
        rx: from_client,
    };
    (transport, peer)
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connect(&self) -> Result<FramedConnection> {
        let (tx, rx) = self
            .halves
            .lock()
            .await
            .take()
            .ok_or_else(|| Error::ConnectFailed("memory transport already connected".into()))?;
        
        Ok(FramedConnection {
            writer: Box::new(MemoryWriter { tx: Some(tx) }),
            reader: Box::new(MemoryReader { rx }),
            remote_addr: self.remote_addr(),
        })
    }
    
    fn remote_addr(&self) -> String {
        "memory".to_string()
    }
}

struct MemoryWriter {
    tx: Option<mpsc::Sender<String>>,
}

#[async_trait]
impl FrameWriter for MemoryWriter {
    async fn send(&mut self, frame: &Frame) -> Result<()> {
        let tx = self.tx.as_ref().ok_or(Error::NotConnected)?;
        tx.send(frame.encode())
            .await
            .map_err(|_| Error::ConnectionClosed)
    }
    
    async fn close(&mut self) -> Result<()> {
        self.tx = None;
        Ok(())
    }
}

struct MemoryReader {
    rx: mpsc::Receiver<String>,
}

#[async_trait]
impl FrameReader for MemoryReader {
    async fn recv(&mut self) -> Result<Option<String>> {
        Ok(self.rx.recv().await)
    }
}

impl MemoryPeer {
    /// Send raw frame text to the client
    pub async fn send_text(&self, text: impl Into<String>) -> Result<()> {
        self.tx
            .send(text.into())
            .await
            .map_err(|_| Error::ConnectionClosed)
    }
    
    pub async fn send_frame(&self, frame: &Frame) -> Result<()> {
        self.send_text(frame.encode()).await
    }
    
    /// Send an application event inside a message frame
    pub async fn send_event(&self, event: &Event) -> Result<()> {
        let frame = Frame::message(event)?;
        self.send_frame(&frame).await
    }
    
    /// Next raw text written by the client; `None` once it closed
    pub async fn recv_text(&mut self) -> Option<String> {
        self.rx.recv().await
    }
    
    /// Raw text already written by the client, without waiting
    pub fn try_recv_text(&mut self) -> Option<String> {
        self.rx.try_recv().ok()
    }
    
    /// Next decodable frame written by the client
    pub async fn recv_frame(&mut self) -> Option<Frame> {
        while let Some(text) = self.recv_text().await {
            if let Ok(frame) = Frame::decode(&text) {
                return Some(frame);
            }
        }
        None
    }
    
    /// Next application event, skipping control frames
    pub async fn recv_event(&mut self) -> Option<Event> {
        while let Some(frame) = self.recv_frame().await {
            if let Ok(event) = frame.event() {
                return Some(event);
            }
        }
        None
    }
    
    /// Next application event with the given name
    pub async fn recv_named(&mut self, name: &str) -> Option<Event> {
        while let Some(event) = self.recv_event().await {
            if event.event == name {
                return Some(event);
            }
        }
        None
    }
}
