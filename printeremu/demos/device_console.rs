//! Drive an emulated printer from stdin, one instruction per line

use std::io::{self, BufRead, Write};

use printeremu::Device;
use printeremu_types::{DeviceInfo, Extruder, Heatbed};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .init();
    
    let device = Device::builder(DeviceInfo::new(1, "Prusa MK4", "Printer1"))
        .extruder(Extruder::default())
        .heatbed(Heatbed::default())
        .build()?;
    
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    
    print!("> ");
    stdout.flush()?;
    for line in stdin.lock().lines() {
        let line = line?;
        if matches!(line.trim(), "exit" | "quit") {
            break;
        }
        
        print!("{}> ", device.execute(&line));
        stdout.flush()?;
    }
    
    Ok(())
}
