//! # printeremu
//!
//! Emulated 3D-printer controllers that connect to a fleet server and
//! answer G-code style instructions.
//!
//! ## Features
//!
//! - Command interpreter covering textual names and Marlin mnemonics
//! - Protocol client over WebSocket, line-delimited TCP or in-memory pipes
//! - Periodic telemetry limited to one streamer per device
//! - Inline or queued command execution
//!
//! ## Quick Start
//!
//! ```no_run
//! use printeremu::{Device, ProtocolClient};
//! use printeremu_types::{DeviceInfo, Extruder, Heatbed};
//!
//! #[tokio::main]
//! async fn main() -> printeremu::Result<()> {
//!     let device = Device::builder(DeviceInfo::new(1, "Prusa MK4", "Printer1"))
//!         .extruder(Extruder::default())
//!         .heatbed(Heatbed::default())
//!         .build()?;
//!     
//!     // Local execution needs no connection
//!     println!("{}", device.execute("G28"));
//!     
//!     let client = ProtocolClient::websocket("ws://localhost:8001")?;
//!     let connection = client.connect(&device).await?;
//!     connection.closed().await;
//!     
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod device;
pub mod error;
pub mod interpreter;
pub mod jobs;
pub mod router;
pub mod telemetry;

// Re-exports
pub use client::{ClientConfig, Connection, DispatchMode, Outbound, ProtocolClient};
pub use device::{Device, DeviceBuilder};
pub use error::{Error, Result};
pub use interpreter::interpret;
pub use jobs::{Job, JobQueue};
pub use router::EventRouter;
pub use telemetry::TelemetryStreamer;

// Re-export types
pub use printeremu_core::{Command, Event, Frame, Session};
pub use printeremu_transport::RetryPolicy;
pub use printeremu_types::{DeviceInfo, DeviceState};
