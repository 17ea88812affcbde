//! Typed instructions parsed from a single input line

use std::time::Duration;

use printeremu_types::{MotorAxes, PositioningMode, Units};

use crate::opcode::{self, Opcode};
use crate::params::Params;

/// Fan speed used when SET-FAN carries no `S` word
pub const FULL_FAN_SPEED: f64 = 255.0;

/// Telemetry interval used when PERIODIC-TELEMETRY carries no `S` word
pub const DEFAULT_TELEMETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Arc sweep direction
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ArcDirection {
    Clockwise,
    CounterClockwise,
}

/// One parsed instruction
///
/// Absent words are `None`; the interpreter decides their defaults
/// against the current device state.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Home,
    MoveLinear {
        x: Option<f64>,
        y: Option<f64>,
        z: Option<f64>,
        feed_rate: Option<f64>,
    },
    MoveArc {
        direction: ArcDirection,
        radius: f64,
        z: Option<f64>,
        feed_rate: Option<f64>,
    },
    Dwell {
        duration: Duration,
    },
    SetPositioning(PositioningMode),
    SetExtruderPositioning(PositioningMode),
    SetUnits(Units),
    SetPosition {
        x: Option<f64>,
        y: Option<f64>,
        z: Option<f64>,
    },
    SetHotendTemp {
        target: Option<f64>,
    },
    WaitHotendTemp {
        target: Option<f64>,
    },
    SetBedTemp {
        target: Option<f64>,
    },
    WaitBedTemp {
        target: Option<f64>,
    },
    SetAuxTemp {
        target: Option<f64>,
    },
    ColdExtrusion {
        allowed: bool,
    },
    SetFan {
        speed: f64,
    },
    FanOff,
    MotorEnable(MotorAxes),
    MotorDisable(MotorAxes),
    SetAccel {
        acceleration: f64,
    },
    SetLinearAdvance {
        k: f64,
    },
    ReportPosition,
    ReportFirmware,
    ReportSettings,
    ReportProgress,
    ReportMachine,
    SetProgress {
        percent: f64,
        remaining_minutes: u32,
    },
    /// Zero interval stops the streamer
    PeriodicTelemetry {
        interval: Duration,
    },
    EmergencyStop,
    Pause,
    Resume,
    Keepalive,
}

/// Drop a trailing `;` comment and surrounding whitespace
pub fn strip_comment(line: &str) -> &str {
    line.split(';').next().unwrap_or_default().trim()
}

/// Axes named by bare X/Y/Z/E letters; none named means all
fn axes(params: &Params) -> MotorAxes {
    let named = ['X', 'Y', 'Z', 'E']
        .into_iter()
        .filter(|&letter| params.has(letter))
        .filter_map(MotorAxes::from_letter)
        .fold(MotorAxes::empty(), |acc, axis| acc | axis);
    
    if named.is_empty() {
        MotorAxes::all()
    } else {
        named
    }
}

fn dwell(params: &Params) -> Duration {
    let millis = params
        .get('P')
        .or_else(|| params.get('S').map(|seconds| seconds * 1000.0))
        .unwrap_or(0.0)
        .max(0.0);
    Duration::from_millis(millis as u64)
}

fn telemetry_interval(params: &Params) -> Duration {
    match params.get('S') {
        Some(seconds) if seconds == 0.0 => Duration::ZERO,
        Some(seconds) if seconds > 0.0 => {
            Duration::try_from_secs_f64(seconds).unwrap_or(DEFAULT_TELEMETRY_INTERVAL)
        }
        _ => DEFAULT_TELEMETRY_INTERVAL,
    }
}

impl Command {
    /// Parse one comment-free, trimmed line
    ///
    /// Returns `None` when no registered code matches.
    pub fn parse(line: &str) -> Option<Self> {
        let (op, rest) = opcode::resolve(line)?;
        Some(Self::build(op, &Params::parse(rest)))
    }
    
    fn build(op: Opcode, p: &Params) -> Self {
        match op {
            Opcode::Home => Self::Home,
            Opcode::MoveLinear => Self::MoveLinear {
                x: p.get('X'),
                y: p.get('Y'),
                z: p.get('Z'),
                feed_rate: p.get('F'),
            },
            Opcode::MoveArc | Opcode::MoveArcCcw => Self::MoveArc {
                direction: if op == Opcode::MoveArc {
                    ArcDirection::Clockwise
                } else {
                    ArcDirection::CounterClockwise
                },
                radius: p.get_or('R', 0.0),
                z: p.get('Z'),
                feed_rate: p.get('F'),
            },
            Opcode::Dwell => Self::Dwell { duration: dwell(p) },
            Opcode::SetAbsolute => Self::SetPositioning(PositioningMode::Absolute),
            Opcode::SetRelative => Self::SetPositioning(PositioningMode::Relative),
            Opcode::ExtruderAbsolute => Self::SetExtruderPositioning(PositioningMode::Absolute),
            Opcode::ExtruderRelative => Self::SetExtruderPositioning(PositioningMode::Relative),
            Opcode::SetPosition => Self::SetPosition {
                x: p.get('X'),
                y: p.get('Y'),
                z: p.get('Z'),
            },
            Opcode::UnitsInch => Self::SetUnits(Units::Inches),
            Opcode::UnitsMm => Self::SetUnits(Units::Millimeters),
            Opcode::SetHotendTemp => Self::SetHotendTemp { target: p.get('S') },
            Opcode::WaitHotendTemp => Self::WaitHotendTemp { target: p.get('S') },
            Opcode::SetBedTemp => Self::SetBedTemp { target: p.get('S') },
            Opcode::WaitBedTemp => Self::WaitBedTemp { target: p.get('S') },
            Opcode::SetAuxTemp => Self::SetAuxTemp { target: p.get('S') },
            Opcode::ColdExtrusion => Self::ColdExtrusion {
                allowed: p.get('P') == Some(1.0),
            },
            Opcode::SetFan => Self::SetFan {
                speed: p.get_or('S', FULL_FAN_SPEED),
            },
            Opcode::FanOff => Self::FanOff,
            Opcode::MotorEnable => Self::MotorEnable(axes(p)),
            Opcode::MotorDisable => Self::MotorDisable(axes(p)),
            Opcode::SetAccel => Self::SetAccel {
                acceleration: p.get_or('S', 0.0),
            },
            Opcode::SetLinearAdvance => Self::SetLinearAdvance { k: p.get_or('K', 0.0) },
            Opcode::ReportPosition => Self::ReportPosition,
            Opcode::ReportFirmware => Self::ReportFirmware,
            Opcode::ReportSettings => Self::ReportSettings,
            Opcode::ReportProgress => Self::ReportProgress,
            Opcode::ReportMachine => Self::ReportMachine,
            Opcode::SetProgress => Self::SetProgress {
                percent: p.get('S').or_else(|| p.get('P')).unwrap_or(0.0),
                remaining_minutes: p.get_or('R', 0.0).max(0.0) as u32,
            },
            Opcode::PeriodicTelemetry => Self::PeriodicTelemetry {
                interval: telemetry_interval(p),
            },
            Opcode::EmergencyStop => Self::EmergencyStop,
            Opcode::Pause => Self::Pause,
            Opcode::Resume => Self::Resume,
            Opcode::Keepalive => Self::Keepalive,
        }
    }
    
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::Home => Opcode::Home,
            Self::MoveLinear { .. } => Opcode::MoveLinear,
            Self::MoveArc {
                direction: ArcDirection::Clockwise,
                ..
            } => Opcode::MoveArc,
            Self::MoveArc { .. } => Opcode::MoveArcCcw,
            Self::Dwell { .. } => Opcode::Dwell,
            Self::SetPositioning(PositioningMode::Absolute) => Opcode::SetAbsolute,
            Self::SetPositioning(PositioningMode::Relative) => Opcode::SetRelative,
            Self::SetExtruderPositioning(PositioningMode::Absolute) => Opcode::ExtruderAbsolute,
            Self::SetExtruderPositioning(PositioningMode::Relative) => Opcode::ExtruderRelative,
            Self::SetUnits(Units::Inches) => Opcode::UnitsInch,
            Self::SetUnits(Units::Millimeters) => Opcode::UnitsMm,
            Self::SetPosition { .. } => Opcode::SetPosition,
            Self::SetHotendTemp { .. } => Opcode::SetHotendTemp,
            Self::WaitHotendTemp { .. } => Opcode::WaitHotendTemp,
            Self::SetBedTemp { .. } => Opcode::SetBedTemp,
            Self::WaitBedTemp { .. } => Opcode::WaitBedTemp,
            Self::SetAuxTemp { .. } => Opcode::SetAuxTemp,
            Self::ColdExtrusion { .. } => Opcode::ColdExtrusion,
            Self::SetFan { .. } => Opcode::SetFan,
            Self::FanOff => Opcode::FanOff,
            Self::MotorEnable(_) => Opcode::MotorEnable,
            Self::MotorDisable(_) => Opcode::MotorDisable,
            Self::SetAccel { .. } => Opcode::SetAccel,
            Self::SetLinearAdvance { .. } => Opcode::SetLinearAdvance,
            Self::ReportPosition => Opcode::ReportPosition,
            Self::ReportFirmware => Opcode::ReportFirmware,
            Self::ReportSettings => Opcode::ReportSettings,
            Self::ReportProgress => Opcode::ReportProgress,
            Self::ReportMachine => Opcode::ReportMachine,
            Self::SetProgress { .. } => Opcode::SetProgress,
            Self::PeriodicTelemetry { .. } => Opcode::PeriodicTelemetry,
            Self::EmergencyStop => Opcode::EmergencyStop,
            Self::Pause => Opcode::Pause,
            Self::Resume => Opcode::Resume,
            Self::Keepalive => Opcode::Keepalive,
        }
    }
}
