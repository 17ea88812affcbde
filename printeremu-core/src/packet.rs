//! Wire frames: a one-character packet-type marker plus optional payload

use std::fmt;

use serde::Deserialize;

use crate::{
    error::{Error, Result},
    event::Event,
};

/// Packet types, identified by the leading marker character
///
/// ```text
/// ┌──────────┬──────────────────────────────────────────────┐
/// │  Marker  │  Payload                                     │
/// │  1 char  │  optional; JSON envelope for Message frames  │
/// └──────────┴──────────────────────────────────────────────┘
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    Open = 0,
    Close = 1,
    Ping = 2,
    Pong = 3,
    Message = 4,
}

impl PacketType {
    /// Leading marker character
    pub fn marker(self) -> char {
        char::from(b'0' + self as u8)
    }
    
    pub fn name(self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Close => "CLOSE",
            Self::Ping => "PING",
            Self::Pong => "PONG",
            Self::Message => "MESSAGE",
        }
    }
}

impl TryFrom<char> for PacketType {
    type Error = Error;
    
    fn try_from(marker: char) -> Result<Self> {
        match marker {
            '0' => Ok(Self::Open),
            '1' => Ok(Self::Close),
            '2' => Ok(Self::Ping),
            '3' => Ok(Self::Pong),
            '4' => Ok(Self::Message),
            other => Err(Error::UnknownPacketType(other)),
        }
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.marker())
    }
}

/// Session parameters a peer may send in its open frame
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Handshake {
    pub sid: Option<String>,
    pub ping_interval: Option<u64>,
    pub ping_timeout: Option<u64>,
}

/// One wire-level unit
///
/// # Examples
///
/// ```
/// use printeremu_core::{Event, Frame, PacketType};
///
/// let frame = Frame::message(&Event::new("ping", "alive")).unwrap();
/// let text = frame.encode();
/// assert!(text.starts_with('4'));
///
/// let decoded = Frame::decode(&text).unwrap();
/// assert_eq!(decoded.packet_type, PacketType::Message);
/// assert_eq!(decoded.event().unwrap().event, "ping");
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    pub packet_type: PacketType,
    
    /// Text following the marker, if any
    pub payload: Option<String>,
}

impl Frame {
    /// Literal text some peers send instead of a close frame
    pub const LEGACY_CLOSE: &'static str = "close";
    
    pub fn new(packet_type: PacketType) -> Self {
        Self {
            packet_type,
            payload: None,
        }
    }
    
    pub fn with_payload(packet_type: PacketType, payload: impl Into<String>) -> Self {
        Self {
            packet_type,
            payload: Some(payload.into()),
        }
    }
    
    /// The open-acknowledgment frame sent right after connecting
    pub fn open() -> Self {
        Self::new(PacketType::Open)
    }
    
    pub fn close() -> Self {
        Self::new(PacketType::Close)
    }
    
    /// Pong answering a ping, echoing its payload
    pub fn pong_for(ping: &Frame) -> Self {
        Self {
            packet_type: PacketType::Pong,
            payload: ping.payload.clone(),
        }
    }
    
    /// Wrap an application event
    pub fn message(event: &Event) -> Result<Self> {
        Ok(Self::with_payload(PacketType::Message, event.to_json()?))
    }
    
    /// Encode to wire text
    pub fn encode(&self) -> String {
        let payload = self.payload.as_deref().unwrap_or("");
        let mut text = String::with_capacity(1 + payload.len());
        text.push(self.packet_type.marker());
        text.push_str(payload);
        text
    }
    
    /// Decode wire text
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The text is empty
    /// - The leading marker is unknown
    /// - A message frame carries no payload
    pub fn decode(text: &str) -> Result<Self> {
        let text = text.trim_end_matches(['\r', '\n']);
        
        if text == Self::LEGACY_CLOSE {
            return Ok(Self::close());
        }
        
        let mut chars = text.chars();
        let marker = chars.next().ok_or(Error::EmptyFrame)?;
        let packet_type = PacketType::try_from(marker)?;
        let rest = chars.as_str();
        
        let payload = if rest.is_empty() {
            None
        } else {
            Some(rest.to_string())
        };
        
        if packet_type == PacketType::Message && payload.is_none() {
            return Err(Error::MissingPayload(packet_type));
        }
        
        Ok(Self {
            packet_type,
            payload,
        })
    }
    
    /// Unwrap the application event of a message frame
    pub fn event(&self) -> Result<Event> {
        match (&self.packet_type, &self.payload) {
            (PacketType::Message, Some(payload)) => Event::from_json(payload),
            _ => Err(Error::MissingPayload(self.packet_type)),
        }
    }
    
    /// Session parameters carried by an open frame, if any
    pub fn handshake(&self) -> Option<Handshake> {
        if self.packet_type != PacketType::Open {
            return None;
        }
        self.payload
            .as_deref()
            .and_then(|payload| serde_json::from_str(payload).ok())
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("packet_type", &self.packet_type)
            .field("payload_len", &self.payload.as_ref().map_or(0, String::len))
            .finish()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Frame[{}](len={})",
            self.packet_type,
            self.payload.as_ref().map_or(0, String::len)
        )
    }
}
