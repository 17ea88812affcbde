//! WebSocket transport

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use printeremu_core::Frame;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};

use crate::{error::*, FrameReader, FrameWriter, FramedConnection, Transport, MAX_FRAME_SIZE};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket transport carrying one frame per text message
pub struct WsTransport {
    url: String,
    connect_timeout: Duration,
}

impl WsTransport {
    /// Create a transport for a `ws://` or `wss://` url
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(Error::InvalidAddress(url));
        }
        Ok(Self {
            url,
            connect_timeout: Duration::from_secs(printeremu_core::constants::DEFAULT_TIMEOUT),
        })
    }
    
    /// Set connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self) -> Result<FramedConnection> {
        debug!("Connecting to {}...", self.url);
        
        let (stream, response) = timeout(
            self.connect_timeout,
            tokio_tungstenite::connect_async(self.url.as_str()),
        )
        .await
        .map_err(|_| Error::ConnectionTimeout)??;
        
        debug!("Connected to {} (HTTP {})", self.url, response.status());
        
        let (sink, source) = stream.split();
        Ok(FramedConnection {
            writer: Box::new(WsFrameWriter { sink }),
            reader: Box::new(WsFrameReader { source }),
            remote_addr: self.url.clone(),
        })
    }
    
    fn remote_addr(&self) -> String {
        self.url.clone()
    }
}

struct WsFrameWriter {
    sink: SplitSink<WsStream, Message>,
}

#[async_trait]
impl FrameWriter for WsFrameWriter {
    async fn send(&mut self, frame: &Frame) -> Result<()> {
        let text = frame.encode();
        trace!("Sending {} bytes: {:?}", text.len(), text);
        self.sink.send(Message::Text(text)).await?;
        Ok(())
    }
    
    async fn close(&mut self) -> Result<()> {
        self.sink.close().await?;
        Ok(())
    }
}

struct WsFrameReader {
    source: SplitStream<WsStream>,
}

#[async_trait]
impl FrameReader for WsFrameReader {
    async fn recv(&mut self) -> Result<Option<String>> {
        while let Some(message) = self.source.next().await {
            let text = match message? {
                Message::Text(text) => text,
                Message::Binary(bin) => String::from_utf8_lossy(&bin).into_owned(),
                Message::Close(frame) => {
                    debug!("WebSocket closed by peer: {:?}", frame);
                    return Ok(None);
                }
                // Control frames are answered by tungstenite itself
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            };
            
            if text.len() > MAX_FRAME_SIZE {
                return Err(Error::FrameTooLarge(MAX_FRAME_SIZE));
            }
            trace!("Received {} bytes: {:?}", text.len(), text);
            return Ok(Some(text));
        }
        Ok(None)
    }
}
