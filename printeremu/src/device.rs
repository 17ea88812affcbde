//! Emulated device handle

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info};

use printeremu_core::constants::HWID_SERIAL;
use printeremu_core::{names, Event, SerialPortInfo};
use printeremu_types::{DeviceConfig, DeviceInfo, DeviceState, Extruder, Heatbed, Vector3};

use crate::client::ConnectionHandle;
use crate::error::{Error, Result};
use crate::interpreter;
use crate::telemetry::TelemetryStreamer;

/// Description given to devices built from registry entries
pub const REGISTRY_DESCRIPTION: &str = "Marlin GCode";

/// Emulated printer
///
/// Cheap to clone; clones share state, telemetry and connection.
///
/// # Examples
///
/// ```
/// use printeremu::Device;
/// use printeremu_types::{DeviceInfo, Extruder, Heatbed};
///
/// let device = Device::builder(DeviceInfo::new(1, "Prusa MK4", "Printer1"))
///     .extruder(Extruder::default())
///     .heatbed(Heatbed::default())
///     .build()
///     .unwrap();
///
/// assert_eq!(device.execute("MOVE-LINEAR X50 Y50 Z10"), "Moved to X:50.00 Y:50.00 Z:10.00\n");
/// ```
#[derive(Clone)]
pub struct Device {
    inner: Arc<DeviceInner>,
}

struct DeviceInner {
    id: u32,
    state: Arc<Mutex<DeviceState>>,
    telemetry: TelemetryStreamer,
    connection: Mutex<Option<ConnectionHandle>>,
}

/// Builder for [`Device`]
///
/// Extruder and heatbed are required.
#[derive(Debug, Clone)]
pub struct DeviceBuilder {
    info: DeviceInfo,
    extruder: Option<Extruder>,
    heatbed: Option<Heatbed>,
    attributes: Vec<(String, Value)>,
    data: Vec<(String, Value)>,
}

impl DeviceBuilder {
    pub fn extruder(mut self, extruder: Extruder) -> Self {
        self.extruder = Some(extruder);
        self
    }
    
    pub fn heatbed(mut self, heatbed: Heatbed) -> Self {
        self.heatbed = Some(heatbed);
        self
    }
    
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }
    
    pub fn data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.push((key.into(), value.into()));
        self
    }
    
    /// Build the device
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Identity fields are empty
    /// - Extruder or heatbed was not supplied
    pub fn build(self) -> Result<Device> {
        self.info.validate()?;
        let extruder = self
            .extruder
            .ok_or_else(|| Error::InvalidConfig("extruder is required".into()))?;
        let heatbed = self
            .heatbed
            .ok_or_else(|| Error::InvalidConfig("heatbed is required".into()))?;
        
        let id = self.info.id;
        let mut state = DeviceState::new(self.info, extruder, heatbed);
        for (key, value) in self.attributes {
            state.insert_attribute(key, value);
        }
        for (key, value) in self.data {
            state.insert_data(key, value);
        }
        
        Ok(Device {
            inner: Arc::new(DeviceInner {
                id,
                state: Arc::new(Mutex::new(state)),
                telemetry: TelemetryStreamer::new(),
                connection: Mutex::new(None),
            }),
        })
    }
}

/// String form of a registry value
fn value_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl Device {
    pub fn builder(info: DeviceInfo) -> DeviceBuilder {
        DeviceBuilder {
            info,
            extruder: None,
            heatbed: None,
            attributes: Vec::new(),
            data: Vec::new(),
        }
    }
    
    /// Build a device from a registry entry
    ///
    /// Bed size, Z ceiling, starting bed temperature and home position come
    /// from the entry's `data`; the hardware id is derived from the brand's
    /// vendor id and the `productId` data value.
    pub fn from_config(config: &DeviceConfig) -> Result<Self> {
        let product_id = config
            .data
            .get("productId")
            .and_then(value_string)
            .ok_or_else(|| {
                Error::InvalidConfig(format!("device {} has no productId", config.id))
            })?;
        
        let hwid = format!(
            "USB VID:PID={}:{} SER={}",
            config.brand.vendor_id, product_id, HWID_SERIAL
        );
        let info = DeviceInfo::new(config.id, config.device_string(), config.name.clone())
            .with_description(REGISTRY_DESCRIPTION)
            .with_hwid(hwid);
        
        let mut heatbed = Heatbed::default();
        if let (Some(width), Some(length)) = (config.number("width"), config.number("length")) {
            heatbed = Heatbed::new(width, length);
        }
        let mut extruder = Extruder::default();
        if let Some(height) = config.number("height") {
            extruder.max_z_height = height;
        }
        
        let mut builder = Device::builder(info)
            .extruder(extruder)
            .heatbed(heatbed)
            .attribute("model", config.brand.printer_model.clone())
            .attribute("vendorId", config.brand.vendor_id.clone());
        for (key, value) in &config.attributes {
            builder = builder.attribute(key.clone(), value.clone());
        }
        for (key, value) in &config.data {
            builder = builder.data(key.clone(), value.clone());
        }
        if !config.data.contains_key("port") {
            builder = builder.data("port", format!("EMU{}", config.id % 10));
        }
        
        let device = builder.build()?;
        
        device.with_state(|state| -> Result<()> {
            if let Some(temperature) = config.number("startTemp") {
                state
                    .set_bed_temperature(temperature)
                    .map_err(|e| Error::InvalidConfig(e.to_string()))?;
            }
            if let Some([x, y, z]) = config.home_position() {
                state
                    .set_home_position(Vector3::new(x, y, z))
                    .map_err(|e| Error::InvalidConfig(e.to_string()))?;
            }
            Ok(())
        })?;
        
        debug!("Built device {} from registry", device.id());
        Ok(device)
    }
    
    pub fn id(&self) -> u32 {
        self.inner.id
    }
    
    pub fn name(&self) -> String {
        self.inner.state.lock().info().name.clone()
    }
    
    /// Run `f` with exclusive access to the device state
    pub fn with_state<R>(&self, f: impl FnOnce(&mut DeviceState) -> R) -> R {
        f(&mut self.inner.state.lock())
    }
    
    /// Copy of the current state
    pub fn snapshot(&self) -> DeviceState {
        self.inner.state.lock().clone()
    }
    
    pub(crate) fn shared_state(&self) -> Arc<Mutex<DeviceState>> {
        self.inner.state.clone()
    }
    
    /// Interpret one instruction line
    pub fn execute(&self, line: &str) -> String {
        interpreter::interpret(line, self)
    }
    
    /// `registration` event carrying the full state snapshot
    pub fn registration_event(&self) -> Result<Event> {
        Ok(Event::with_payload(names::REGISTRATION, &self.snapshot())?)
    }
    
    /// Serial port details reported to the peer
    pub fn serial_port_info(&self) -> Result<SerialPortInfo> {
        self.with_state(|state| {
            let field = |found: Option<&Value>, key: &str| {
                found.and_then(value_string).ok_or_else(|| {
                    Error::InvalidConfig(format!("device {} has no {}", self.id(), key))
                })
            };
            Ok(SerialPortInfo {
                product_id: field(state.data_value("productId"), "productId")?,
                vendor_id: field(state.attribute("vendorId"), "vendorId")?,
                port: field(state.data_value("port"), "port")?,
                hwid: state.info().hwid.clone(),
            })
        })
    }
    
    pub fn telemetry(&self) -> &TelemetryStreamer {
        &self.inner.telemetry
    }
    
    /// Start periodic telemetry on the live connection
    ///
    /// Returns `false` if a streamer was already running.
    pub fn start_telemetry(&self, interval: Duration) -> Result<bool> {
        let handle = self.connection().ok_or(Error::NotConnected(self.id()))?;
        self.inner.telemetry.start(
            interval,
            self.id(),
            self.shared_state(),
            handle.outbound,
            &handle.shutdown,
        )
    }
    
    pub fn stop_telemetry(&self) -> bool {
        self.inner.telemetry.stop()
    }
    
    // ---- connection ----
    
    /// Bind a live connection; a device holds at most one
    pub(crate) fn attach(&self, handle: ConnectionHandle) -> Result<()> {
        let mut connection = self.inner.connection.lock();
        if connection.is_some() {
            return Err(Error::AlreadyConnected(self.id()));
        }
        
        info!("Device {} attached to connection {}", self.id(), handle.id);
        *connection = Some(handle);
        Ok(())
    }
    
    /// Release the connection with the given id, if it is still the bound one
    pub(crate) fn detach(&self, connection_id: u64) -> bool {
        let mut connection = self.inner.connection.lock();
        match connection.as_ref() {
            Some(handle) if handle.id == connection_id => {
                *connection = None;
                info!("Device {} detached from connection {}", self.id(), connection_id);
                true
            }
            _ => false,
        }
    }
    
    pub(crate) fn connection(&self) -> Option<ConnectionHandle> {
        self.inner.connection.lock().clone()
    }
    
    pub fn is_connected(&self) -> bool {
        self.inner.connection.lock().is_some()
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.id())
            .field("connected", &self.is_connected())
            .field("telemetry", &self.inner.telemetry.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use printeremu_types::config::parse_registry;
    
    const REGISTRY: &str = r#"[{
        "id": 13,
        "name": "Printer13",
        "brand": {"printerName": "Prusa", "printerModel": "MK4", "vendorId": "2c99"},
        "data": {"productId": "001a", "width": 180, "length": 180, "height": 180, "startTemp": 25, "homePos": [0, 0, 5]},
        "attributes": {"nozzle": 0.4}
    }]"#;
    
    fn device() -> Device {
        Device::builder(DeviceInfo::new(1, "Prusa MK4", "Printer1"))
            .extruder(Extruder::default())
            .heatbed(Heatbed::default())
            .build()
            .unwrap()
    }
    
    #[test]
    fn test_builder_requires_extruder_and_heatbed() {
        let err = Device::builder(DeviceInfo::new(1, "Prusa MK4", "Printer1"))
            .heatbed(Heatbed::default())
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
        
        let err = Device::builder(DeviceInfo::new(1, "Prusa MK4", "Printer1"))
            .extruder(Extruder::default())
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }
    
    #[test]
    fn test_builder_requires_identity() {
        let err = Device::builder(DeviceInfo::new(1, "", "Printer1"))
            .extruder(Extruder::default())
            .heatbed(Heatbed::default())
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Types(_)));
    }
    
    #[test]
    fn test_from_config_post_processing() {
        let config = &parse_registry(REGISTRY).unwrap()[0];
        let device = Device::from_config(config).unwrap();
        let state = device.snapshot();
        
        assert_eq!(state.info().device, "Prusa MK4");
        assert_eq!(state.info().description, REGISTRY_DESCRIPTION);
        assert_eq!(state.info().hwid, "USB VID:PID=2c99:001a SER=2024-QView3DEmulator");
        assert_eq!(state.travel_limits(), Vector3::new(180.0, 180.0, 180.0));
        assert_eq!(state.bed_temperature(), 25.0);
        assert_eq!(state.position(), Vector3::new(0.0, 0.0, 5.0));
        assert_eq!(state.attribute("model"), Some(&Value::from("MK4")));
        assert_eq!(state.attribute("nozzle"), Some(&Value::from(0.4)));
        assert_eq!(state.data_value("port"), Some(&Value::from("EMU3")));
    }
    
    #[test]
    fn test_from_config_requires_product_id() {
        let mut config = parse_registry(REGISTRY).unwrap().remove(0);
        config.data.remove("productId");
        assert!(matches!(
            Device::from_config(&config),
            Err(Error::InvalidConfig(_))
        ));
    }
    
    #[test]
    fn test_serial_port_info() {
        let config = &parse_registry(REGISTRY).unwrap()[0];
        let info = Device::from_config(config).unwrap().serial_port_info().unwrap();
        
        assert_eq!(info.product_id, "001a");
        assert_eq!(info.vendor_id, "2c99");
        assert_eq!(info.port, "EMU3");
        
        // Hand-built devices carry no registry data
        assert!(device().serial_port_info().is_err());
    }
    
    #[test]
    fn test_clones_share_state() {
        let device = device();
        let other = device.clone();
        
        other.execute("SET-FAN S100");
        assert_eq!(device.with_state(|s| s.fan_speed()), 100.0);
    }
    
    #[test]
    fn test_telemetry_requires_connection() {
        let device = device();
        assert!(matches!(
            device.start_telemetry(Duration::from_secs(1)),
            Err(Error::NotConnected(1))
        ));
        assert!(!device.stop_telemetry());
    }
}
