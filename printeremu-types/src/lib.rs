//! Type definitions for printeremu

pub mod config;
pub mod device_info;
pub mod error;
pub mod geometry;
pub mod state;

pub use config::{Brand, DeviceConfig, EmulatorSettings};
pub use device_info::DeviceInfo;
pub use error::{Error, Result, StateError};
pub use geometry::{MotorAxes, Vector3};
pub use state::{DeviceState, Extruder, Heatbed, PositioningMode, Units};
