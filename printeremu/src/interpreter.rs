//! Command interpreter
//!
//! Every instruction yields a response line. State conflicts come back
//! as `Error: ...` text; nothing here returns `Err` to the caller.

use std::fmt::Write as _;
use std::time::Duration;

use chrono::Utc;
use printeremu_core::constants::{FIRMWARE_NAME, UNKNOWN_COMMAND};
use printeremu_core::{strip_comment, ArcDirection, Command, Opcode};
use printeremu_types::{DeviceState, PositioningMode, StateError, Units, Vector3};

use crate::device::Device;

const OK: &str = "ok\n";

/// Interpret one instruction line against a device
///
/// Empty and comment-only lines yield an empty response.
pub fn interpret(line: &str, device: &Device) -> String {
    let line = strip_comment(line);
    if line.is_empty() {
        return String::new();
    }
    
    match Command::parse(line) {
        Some(command) => execute(&command, device),
        None => UNKNOWN_COMMAND.to_string(),
    }
}

/// Execute a parsed command
pub fn execute(command: &Command, device: &Device) -> String {
    if let Command::PeriodicTelemetry { interval } = command {
        return periodic_telemetry(*interval, device);
    }
    
    device.with_state(|state| apply(command, state).unwrap_or_else(|e| format!("Error: {}\n", e)))
}

fn periodic_telemetry(interval: Duration, device: &Device) -> String {
    if interval.is_zero() {
        device.stop_telemetry();
        return OK.to_string();
    }
    
    // Starting while running keeps the existing streamer
    match device.start_telemetry(interval) {
        Ok(_) => OK.to_string(),
        Err(e) => format!("Error: {}\n", e),
    }
}

/// Resolve a move word to an absolute coordinate
fn axis_target(state: &DeviceState, word: Option<f64>, current: f64) -> f64 {
    match word {
        None => current,
        Some(value) => {
            let value = value * state.units().scale();
            match state.positioning() {
                PositioningMode::Absolute => value,
                PositioningMode::Relative => current + value,
            }
        }
    }
}

fn update_feed_rate(state: &mut DeviceState, feed_rate: Option<f64>) {
    if let Some(feed) = feed_rate.filter(|f| *f > 0.0) {
        let _ = state.set_feed_rate(feed * state.units().scale());
    }
}

/// Marlin-style settings dump, one G-code per setting
fn report_settings(state: &DeviceState) -> String {
    let first = |op: Opcode| op.gcodes().next().unwrap_or_else(|| op.name());
    let mut out = String::new();
    
    let _ = writeln!(out, "; {} ({})", state.info().name, state.info().device);
    let units = match state.units() {
        Units::Millimeters => Opcode::UnitsMm,
        Units::Inches => Opcode::UnitsInch,
    };
    let positioning = match state.positioning() {
        PositioningMode::Absolute => Opcode::SetAbsolute,
        PositioningMode::Relative => Opcode::SetRelative,
    };
    let extruder = match state.extruder_positioning() {
        PositioningMode::Absolute => Opcode::ExtruderAbsolute,
        PositioningMode::Relative => Opcode::ExtruderRelative,
    };
    let _ = writeln!(out, "{}", first(units));
    let _ = writeln!(out, "{}", first(positioning));
    let _ = writeln!(out, "{}", first(extruder));
    
    let _ = writeln!(out, "{} S{:.2}", first(Opcode::SetAccel), state.acceleration());
    let _ = writeln!(out, "{} K{:.2}", first(Opcode::SetLinearAdvance), state.linear_advance());
    let _ = writeln!(
        out,
        "{} P{}",
        first(Opcode::ColdExtrusion),
        u8::from(state.cold_extrusion_allowed())
    );
    let _ = writeln!(out, "{} S{:.2}", first(Opcode::SetHotendTemp), state.hotend_target());
    let _ = writeln!(out, "{} S{:.2}", first(Opcode::SetBedTemp), state.bed_target());
    let _ = writeln!(out, "{} S{:.2}", first(Opcode::SetAuxTemp), state.aux_target());
    let _ = writeln!(out, "{} S{:.2}", first(Opcode::SetFan), state.fan_speed());
    let _ = writeln!(
        out,
        "{} {}",
        first(Opcode::MotorEnable),
        state.enabled_motors()
    );
    out.push_str(OK);
    out
}

fn apply(command: &Command, state: &mut DeviceState) -> Result<String, StateError> {
    let response = match *command {
        Command::Home => {
            state.move_to(Vector3::ORIGIN)?;
            format!("ok\n{}\nok\n", state.position())
        }
        Command::MoveLinear { x, y, z, feed_rate } => {
            let current = state.position();
            let target = Vector3::new(
                axis_target(state, x, current.x),
                axis_target(state, y, current.y),
                axis_target(state, z, current.z),
            );
            state.move_to(target)?;
            update_feed_rate(state, feed_rate);
            format!("Moved to {}\n", target)
        }
        Command::MoveArc {
            direction,
            radius,
            z,
            feed_rate,
        } => {
            // Fixed half-turn sweep: the end point lies one radius along X
            let current = state.position();
            let radius = radius * state.units().scale();
            let x = match direction {
                ArcDirection::Clockwise => current.x - radius,
                ArcDirection::CounterClockwise => current.x + radius,
            };
            let target = Vector3::new(x, current.y, axis_target(state, z, current.z));
            state.move_to(target)?;
            update_feed_rate(state, feed_rate);
            format!("Arc move to {}\n", target)
        }
        Command::Dwell { duration } => format!("Dwelling for {} ms\n", duration.as_millis()),
        Command::SetPositioning(mode) => {
            state.set_positioning(mode);
            match mode {
                PositioningMode::Absolute => "Set to Absolute Positioning\n".to_string(),
                PositioningMode::Relative => "Set to Relative Positioning\n".to_string(),
            }
        }
        Command::SetExtruderPositioning(mode) => {
            state.set_extruder_positioning(mode);
            match mode {
                PositioningMode::Absolute => "Extruder set to absolute positioning\n".to_string(),
                PositioningMode::Relative => "Extruder set to relative positioning\n".to_string(),
            }
        }
        Command::SetUnits(units) => {
            state.set_units(units);
            match units {
                Units::Inches => "Units set to inches\n".to_string(),
                Units::Millimeters => "Units set to millimeters\n".to_string(),
            }
        }
        Command::SetPosition { x, y, z } => {
            let scale = state.units().scale();
            let position = Vector3::new(
                x.unwrap_or(0.0) * scale,
                y.unwrap_or(0.0) * scale,
                z.unwrap_or(0.0) * scale,
            );
            state.set_position(position)?;
            format!("Position set to {}\n", position)
        }
        Command::SetHotendTemp { target } => {
            if let Some(target) = target {
                state.set_hotend_target(target)?;
            }
            OK.to_string()
        }
        Command::WaitHotendTemp { target } => {
            if let Some(target) = target {
                state.set_hotend_target(target)?;
            }
            if state.hotend_temperature() < state.hotend_target() {
                format!(
                    "T:{:.2} / {:.2}\n",
                    state.hotend_temperature(),
                    state.hotend_target()
                )
            } else {
                OK.to_string()
            }
        }
        Command::SetBedTemp { target } => {
            if let Some(target) = target {
                state.set_bed_target(target)?;
            }
            OK.to_string()
        }
        Command::WaitBedTemp { target } => {
            if let Some(target) = target {
                state.set_bed_target(target)?;
            }
            if state.bed_temperature() < state.bed_target() {
                format!("B:{:.2} / {:.2}\n", state.bed_temperature(), state.bed_target())
            } else {
                state.set_bed_heating(false);
                OK.to_string()
            }
        }
        Command::SetAuxTemp { target } => {
            if let Some(target) = target {
                state.set_aux_target(target)?;
            }
            format!("Auxiliary target temperature set to {:.2}\n", state.aux_target())
        }
        Command::ColdExtrusion { allowed } => {
            state.set_cold_extrusion(allowed);
            if allowed {
                "Cold extrusion allowed\n".to_string()
            } else {
                "Cold extrusion not allowed\n".to_string()
            }
        }
        Command::SetFan { speed } => {
            state.set_fan_speed(speed)?;
            format!("Fan speed set to {:.2}\n", speed)
        }
        Command::FanOff => {
            state.set_fan_speed(0.0)?;
            "Fan turned off\n".to_string()
        }
        Command::MotorEnable(axes) => {
            state.enable_motors(axes);
            format!("Motors {} enabled\n", axes)
        }
        Command::MotorDisable(axes) => {
            state.disable_motors(axes);
            format!("Motors {} disabled\n", axes)
        }
        Command::SetAccel { acceleration } => {
            state.set_acceleration(acceleration)?;
            format!("Acceleration set to {:.2}\n", acceleration)
        }
        Command::SetLinearAdvance { k } => {
            state.set_linear_advance(k)?;
            format!("Linear Advance factor set to {:.2}\n", k)
        }
        Command::ReportPosition => format!("{}\nok\n", state.position()),
        Command::ReportFirmware => format!("Firmware: {}\n", FIRMWARE_NAME),
        Command::ReportSettings => report_settings(state),
        Command::ReportProgress => format!(
            "Progress: {}%, {} minutes remaining\nok\n",
            state.progress(),
            state.remaining_minutes()
        ),
        Command::ReportMachine => format!("Machine name: {}\n", state.info().device),
        Command::SetProgress {
            percent,
            remaining_minutes,
        } => {
            state.set_progress(percent, remaining_minutes)?;
            format!(
                "Progress set to {}%, {} minutes remaining\nok\n",
                state.progress(),
                state.remaining_minutes()
            )
        }
        // Needs the device handle; routed by `execute`
        Command::PeriodicTelemetry { .. } => OK.to_string(),
        Command::EmergencyStop => {
            state.pause();
            "Emergency stop activated, printer paused\n".to_string()
        }
        Command::Pause => {
            if state.pause() {
                "Printer paused\n".to_string()
            } else {
                "Printer already paused\n".to_string()
            }
        }
        Command::Resume => {
            if state.resume() {
                "Printer resumed\n".to_string()
            } else {
                "Printer is not paused\n".to_string()
            }
        }
        Command::Keepalive => {
            state.touch_keepalive(Utc::now());
            "Keepalive signal sent\n".to_string()
        }
    };
    Ok(response)
}
