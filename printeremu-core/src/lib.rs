//! # printeremu-core
//!
//! Protocol primitives for the printer emulator.
//!
//! This crate provides:
//! - Wire frames and their one-character packet-type markers
//! - Application event envelopes and typed payloads
//! - The instruction registry and per-letter parameter scanner
//! - Typed command parsing
//! - Connection session state

pub mod command;
pub mod constants;
pub mod error;
pub mod event;
pub mod opcode;
pub mod packet;
pub mod params;
pub mod session;

pub use command::{strip_comment, ArcDirection, Command};
pub use error::{Error, Result};
pub use event::{
    names, CommandRequest, CommandResponse, DeviceId, ErrorPayload, Event, EventKind,
    SerialPortInfo,
};
pub use opcode::Opcode;
pub use packet::{Frame, Handshake, PacketType};
pub use params::Params;
pub use session::{Session, SessionState};

/// Protocol version information
pub const PROTOCOL_VERSION: &str = "1.0";
