//! Connect emulated printers to a fleet server over WebSocket
//!
//! `EMU_SETTINGS` and `EMU_REGISTRY` point at the JSON settings and device
//! registry; without a registry a single default printer is emulated.

use printeremu::{ClientConfig, Device, ProtocolClient};
use printeremu_types::config::{load_registry, load_settings, EmulatorSettings};
use printeremu_types::{DeviceInfo, Extruder, Heatbed};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    
    let settings = match std::env::var("EMU_SETTINGS") {
        Ok(path) => load_settings(path)?,
        Err(_) => EmulatorSettings::default(),
    };
    
    let devices = match std::env::var("EMU_REGISTRY") {
        Ok(path) => load_registry(path)?
            .iter()
            .filter(|config| {
                settings.enabled_printers.is_empty()
                    || settings.enabled_printers.contains(&config.id.to_string())
            })
            .map(Device::from_config)
            .collect::<printeremu::Result<Vec<_>>>()?,
        Err(_) => vec![Device::builder(DeviceInfo::new(1, "Prusa MK4", "Printer1"))
            .extruder(Extruder::default())
            .heatbed(Heatbed::default())
            .build()?],
    };
    
    let client = ProtocolClient::websocket(settings.server_url())?
        .with_config(ClientConfig::default());
    
    let mut connections = Vec::with_capacity(devices.len());
    for device in &devices {
        connections.push(client.connect(device).await?);
        println!("Device {} connected to {}", device.id(), client.remote_addr());
    }
    
    for connection in connections {
        connection.closed().await;
        println!("Device {} disconnected", connection.device().id());
        connection.join().await;
    }
    
    Ok(())
}
