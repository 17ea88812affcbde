//! Emulator settings and device registry entries

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Fallback peer address when settings leave it unset
pub const DEFAULT_ADDRESS: &str = "localhost";

/// Fallback peer port when settings leave it unset
pub const DEFAULT_PORT: u16 = 8001;

/// Connection settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmulatorSettings {
    pub enabled_printers: Vec<String>,
    pub default_address: String,
    pub default_port: u16,
    pub startup: String,
}

impl EmulatorSettings {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
    
    /// `address:port`, or the defaults if either is unset
    pub fn address(&self) -> String {
        if !self.default_address.is_empty() && self.default_port != 0 {
            format!("{}:{}", self.default_address, self.default_port)
        } else {
            format!("{}:{}", DEFAULT_ADDRESS, DEFAULT_PORT)
        }
    }
    
    pub fn server_url(&self) -> String {
        format!("ws://{}", self.address())
    }
}

/// Brand block of a registry entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Brand {
    pub printer_name: String,
    pub printer_model: String,
    pub vendor_id: String,
}

/// One entry of the device registry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub id: u32,
    pub name: String,
    pub brand: Brand,
    pub data: Map<String, Value>,
    pub attributes: Map<String, Value>,
}

impl DeviceConfig {
    /// Device string, e.g. "Prusa MK4"
    pub fn device_string(&self) -> String {
        format!("{} {}", self.brand.printer_name, self.brand.printer_model)
            .trim()
            .to_string()
    }
    
    /// Numeric data value by key
    pub fn number(&self, key: &str) -> Option<f64> {
        self.data.get(key).and_then(Value::as_f64)
    }
    
    /// `homePos` as `[x, y, z]`
    pub fn home_position(&self) -> Option<[f64; 3]> {
        let values = self.data.get("homePos")?.as_array()?;
        match values.as_slice() {
            [x, y, z] => Some([x.as_f64()?, y.as_f64()?, z.as_f64()?]),
            _ => None,
        }
    }
}

/// Parse a registry (JSON array of entries)
pub fn parse_registry(json: &str) -> Result<Vec<DeviceConfig>> {
    Ok(serde_json::from_str(json)?)
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.display().to_string(),
        source,
    })
}

pub fn load_registry(path: impl AsRef<Path>) -> Result<Vec<DeviceConfig>> {
    parse_registry(&read(path.as_ref())?)
}

pub fn load_settings(path: impl AsRef<Path>) -> Result<EmulatorSettings> {
    EmulatorSettings::from_json(&read(path.as_ref())?)
}
