//! Device identity

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Device identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    /// Registry id
    pub id: u32,
    
    /// Device/model string, e.g. "Prusa MK4"
    pub device: String,
    
    /// Free-text description
    pub description: String,
    
    /// Hardware id reported to the fleet backend
    pub hwid: String,
    
    /// Display name
    pub name: String,
    
    /// Status label
    pub status: String,
    
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl DeviceInfo {
    pub fn new(id: u32, device: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id,
            device: device.into(),
            description: String::new(),
            hwid: String::new(),
            name: name.into(),
            status: "Init".to_string(),
            created_at: Utc::now(),
        }
    }
    
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
    
    pub fn with_hwid(mut self, hwid: impl Into<String>) -> Self {
        self.hwid = hwid.into();
        self
    }
    
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }
    
    /// Reject identities missing a device string or a name
    pub fn validate(&self) -> Result<()> {
        if self.device.trim().is_empty() {
            return Err(Error::Validation("device string must not be empty".into()));
        }
        if self.name.trim().is_empty() {
            return Err(Error::Validation("device name must not be empty".into()));
        }
        Ok(())
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Device[{}: {} ({}), HWID: {}]",
            self.id, self.name, self.device, self.hwid
        )
    }
}
