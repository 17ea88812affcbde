//! Line-delimited TCP transport
//!
//! Each frame travels as one line of text terminated by `\n`.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use printeremu_core::Frame;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::{error::*, FrameReader, FrameWriter, FramedConnection, Transport, MAX_FRAME_SIZE};

/// TCP transport carrying one frame per line
pub struct TcpTransport {
    addr: String,
    port: u16,
    connect_timeout: Duration,
    read_timeout: Option<Duration>,
}

impl TcpTransport {
    pub fn new(addr: impl Into<String>, port: u16) -> Self {
        Self {
            addr: addr.into(),
            port,
            connect_timeout: Duration::from_secs(printeremu_core::constants::DEFAULT_TIMEOUT),
            read_timeout: None,
        }
    }
    
    /// Set connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
    
    /// Fail reads that wait longer than `timeout` for a complete line
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }
    
    /// Resolve address to SocketAddr
    async fn resolve_addr(&self) -> Result<SocketAddr> {
        let addr_str = format!("{}:{}", self.addr, self.port);
        
        let mut addrs = tokio::net::lookup_host(&addr_str)
            .await
            .map_err(|e| Error::InvalidAddress(format!("{}: {}", addr_str, e)))?;
        
        addrs
            .next()
            .ok_or_else(|| Error::InvalidAddress(format!("No addresses found for {}", addr_str)))
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&self) -> Result<FramedConnection> {
        let addr = self.resolve_addr().await?;
        
        debug!("Connecting to {}...", addr);
        
        let stream = timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::ConnectionTimeout)?
            .map_err(|e| Error::ConnectFailed(format!("{}: {}", addr, e)))?;
        
        stream.set_nodelay(true)?;
        
        debug!("Connected to {}", addr);
        
        let (read_half, write_half) = stream.into_split();
        Ok(FramedConnection {
            writer: Box::new(TcpFrameWriter { stream: write_half }),
            reader: Box::new(TcpFrameReader::new(read_half, self.read_timeout)),
            remote_addr: addr.to_string(),
        })
    }
    
    fn remote_addr(&self) -> String {
        format!("{}:{}", self.addr, self.port)
    }
}

struct TcpFrameWriter {
    stream: OwnedWriteHalf,
}

#[async_trait]
impl FrameWriter for TcpFrameWriter {
    async fn send(&mut self, frame: &Frame) -> Result<()> {
        let mut line = frame.encode();
        line.push('\n');
        
        trace!("Sending {} bytes: {:?}", line.len(), line.trim_end());
        
        self.stream.write_all(line.as_bytes()).await?;
        self.stream.flush().await?;
        Ok(())
    }
    
    async fn close(&mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

struct TcpFrameReader {
    stream: OwnedReadHalf,
    buf: BytesMut,
    read_timeout: Option<Duration>,
}

impl TcpFrameReader {
    fn new(stream: OwnedReadHalf, read_timeout: Option<Duration>) -> Self {
        Self {
            stream,
            buf: BytesMut::with_capacity(1024),
            read_timeout,
        }
    }
    
    /// Split off the next complete line, without its terminator
    fn take_line(&mut self) -> Option<String> {
        let pos = self.buf.iter().position(|b| *b == b'\n')?;
        let line = self.buf.split_to(pos);
        self.buf.advance(1);
        
        let text = String::from_utf8_lossy(&line);
        Some(text.trim_end_matches('\r').to_string())
    }
    
    async fn fill(&mut self) -> Result<usize> {
        let read = self.stream.read_buf(&mut self.buf);
        let n = match self.read_timeout {
            Some(limit) => timeout(limit, read).await.map_err(|_| Error::ReadTimeout)??,
            None => read.await?,
        };
        Ok(n)
    }
}

#[async_trait]
impl FrameReader for TcpFrameReader {
    async fn recv(&mut self) -> Result<Option<String>> {
        loop {
            if let Some(line) = self.take_line() {
                if line.is_empty() {
                    continue;
                }
                trace!("Received {} bytes: {:?}", line.len(), line);
                return Ok(Some(line));
            }
            
            if self.buf.len() > MAX_FRAME_SIZE {
                return Err(Error::FrameTooLarge(MAX_FRAME_SIZE));
            }
            
            if self.fill().await? == 0 {
                // Unterminated trailing text still counts as a frame
                if self.buf.is_empty() {
                    return Ok(None);
                }
                let rest = self.buf.split();
                return Ok(Some(String::from_utf8_lossy(&rest).trim_end().to_string()));
            }
        }
    }
}
