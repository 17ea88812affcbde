//! Instruction codes and the registry that resolves them

use std::fmt;

/// Every operation the interpreter understands
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Opcode {
    // Motion
    Home,
    MoveLinear,
    MoveArc,
    MoveArcCcw,
    Dwell,
    SetAbsolute,
    SetRelative,
    SetPosition,
    ExtruderAbsolute,
    ExtruderRelative,
    
    // Units
    UnitsInch,
    UnitsMm,
    
    // Thermal
    SetHotendTemp,
    WaitHotendTemp,
    SetBedTemp,
    WaitBedTemp,
    SetAuxTemp,
    ColdExtrusion,
    
    // Actuation
    SetFan,
    FanOff,
    MotorEnable,
    MotorDisable,
    SetAccel,
    SetLinearAdvance,
    
    // Status
    ReportPosition,
    ReportFirmware,
    ReportSettings,
    ReportProgress,
    ReportMachine,
    SetProgress,
    PeriodicTelemetry,
    
    // Control
    EmergencyStop,
    Pause,
    Resume,
    Keepalive,
}

/// Code → opcode table, textual names first, then G-code mnemonics
pub const REGISTRY: &[(&str, Opcode)] = &[
    ("HOME", Opcode::Home),
    ("MOVE-LINEAR", Opcode::MoveLinear),
    ("MOVE-ARC", Opcode::MoveArc),
    ("MOVE-ARC-CCW", Opcode::MoveArcCcw),
    ("DWELL", Opcode::Dwell),
    ("SET-ABSOLUTE", Opcode::SetAbsolute),
    ("SET-RELATIVE", Opcode::SetRelative),
    ("SET-POSITION", Opcode::SetPosition),
    ("EXTRUDER-ABSOLUTE", Opcode::ExtruderAbsolute),
    ("EXTRUDER-RELATIVE", Opcode::ExtruderRelative),
    ("UNITS-INCH", Opcode::UnitsInch),
    ("UNITS-MM", Opcode::UnitsMm),
    ("SET-HOTEND-TEMP", Opcode::SetHotendTemp),
    ("WAIT-HOTEND-TEMP", Opcode::WaitHotendTemp),
    ("SET-BED-TEMP", Opcode::SetBedTemp),
    ("WAIT-BED-TEMP", Opcode::WaitBedTemp),
    ("SET-AUX-TEMP", Opcode::SetAuxTemp),
    ("COLD-EXTRUSION", Opcode::ColdExtrusion),
    ("SET-FAN", Opcode::SetFan),
    ("FAN-OFF", Opcode::FanOff),
    ("MOTOR-ENABLE", Opcode::MotorEnable),
    ("MOTOR-DISABLE", Opcode::MotorDisable),
    ("SET-ACCEL", Opcode::SetAccel),
    ("SET-LINEAR-ADVANCE", Opcode::SetLinearAdvance),
    ("REPORT-POSITION", Opcode::ReportPosition),
    ("REPORT-FIRMWARE", Opcode::ReportFirmware),
    ("REPORT-SETTINGS", Opcode::ReportSettings),
    ("REPORT-PROGRESS", Opcode::ReportProgress),
    ("REPORT-MACHINE", Opcode::ReportMachine),
    ("SET-PROGRESS", Opcode::SetProgress),
    ("PERIODIC-TELEMETRY", Opcode::PeriodicTelemetry),
    ("EMERGENCY-STOP", Opcode::EmergencyStop),
    ("PAUSE", Opcode::Pause),
    ("RESUME", Opcode::Resume),
    ("KEEPALIVE", Opcode::Keepalive),
    ("G0", Opcode::MoveLinear),
    ("G1", Opcode::MoveLinear),
    ("G2", Opcode::MoveArc),
    ("G3", Opcode::MoveArcCcw),
    ("G4", Opcode::Dwell),
    ("G20", Opcode::UnitsInch),
    ("G21", Opcode::UnitsMm),
    ("G28", Opcode::Home),
    ("G90", Opcode::SetAbsolute),
    ("G91", Opcode::SetRelative),
    ("G92", Opcode::SetPosition),
    ("M17", Opcode::MotorEnable),
    ("M18", Opcode::MotorDisable),
    ("M27", Opcode::ReportProgress),
    ("M73", Opcode::SetProgress),
    ("M82", Opcode::ExtruderAbsolute),
    ("M83", Opcode::ExtruderRelative),
    ("M84", Opcode::MotorDisable),
    ("M104", Opcode::SetHotendTemp),
    ("M106", Opcode::SetFan),
    ("M107", Opcode::FanOff),
    ("M109", Opcode::WaitHotendTemp),
    ("M112", Opcode::EmergencyStop),
    ("M113", Opcode::Keepalive),
    ("M114", Opcode::ReportPosition),
    ("M115", Opcode::ReportFirmware),
    ("M140", Opcode::SetBedTemp),
    ("M142", Opcode::SetAuxTemp),
    ("M155", Opcode::PeriodicTelemetry),
    ("M190", Opcode::WaitBedTemp),
    ("M204", Opcode::SetAccel),
    ("M302", Opcode::ColdExtrusion),
    ("M503", Opcode::ReportSettings),
    ("M601", Opcode::Pause),
    ("M602", Opcode::Resume),
    ("M900", Opcode::SetLinearAdvance),
    ("M997", Opcode::ReportMachine),
];

impl Opcode {
    /// Textual instruction name
    pub fn name(self) -> &'static str {
        REGISTRY
            .iter()
            .find(|(_, op)| *op == self)
            .map_or("UNKNOWN", |(code, _)| *code)
    }
    
    /// G-code mnemonics resolving to this opcode
    pub fn gcodes(self) -> impl Iterator<Item = &'static str> {
        REGISTRY
            .iter()
            .filter(move |(code, op)| *op == self && is_gcode(code))
            .map(|(code, _)| *code)
    }
    
    /// Motion operations are rejected while the device is paused
    pub fn is_motion(self) -> bool {
        matches!(
            self,
            Self::Home | Self::MoveLinear | Self::MoveArc | Self::MoveArcCcw
        )
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn is_gcode(code: &str) -> bool {
    let mut chars = code.chars();
    matches!(chars.next(), Some('G' | 'M')) && chars.all(|c| c.is_ascii_digit())
}

/// The matched code must be followed by whitespace, a comment or the end
fn at_boundary(rest: &str) -> bool {
    rest.chars()
        .next()
        .map_or(true, |c| c.is_whitespace() || c == ';')
}

/// Resolve the instruction at the start of `line`
///
/// Returns the opcode and the text following the matched code. Among
/// matching codes the longest wins, so `G10` never resolves as `G1`.
///
/// # Examples
///
/// ```
/// use printeremu_core::opcode::{resolve, Opcode};
///
/// assert_eq!(resolve("g1 X10"), Some((Opcode::MoveLinear, " X10")));
/// assert_eq!(resolve("G10"), None);
/// ```
pub fn resolve(line: &str) -> Option<(Opcode, &str)> {
    REGISTRY
        .iter()
        .filter_map(|&(code, op)| {
            let head = line.get(..code.len())?;
            let rest = &line[code.len()..];
            (head.eq_ignore_ascii_case(code) && at_boundary(rest)).then_some((code.len(), op, rest))
        })
        .max_by_key(|(len, _, _)| *len)
        .map(|(_, op, rest)| (op, rest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    
    #[test]
    fn test_prefix_requires_boundary() {
        assert_eq!(resolve("G1"), Some((Opcode::MoveLinear, "")));
        assert_eq!(resolve("G1 X5"), Some((Opcode::MoveLinear, " X5")));
        assert_eq!(resolve("G1;comment"), Some((Opcode::MoveLinear, ";comment")));
        assert_eq!(resolve("G10"), None);
        assert_eq!(resolve("G1X5"), None);
        assert_eq!(resolve("M1040"), None);
    }
    
    #[test]
    fn test_longest_name_wins() {
        assert_eq!(resolve("MOVE-ARC R5"), Some((Opcode::MoveArc, " R5")));
        assert_eq!(resolve("MOVE-ARC-CCW R5"), Some((Opcode::MoveArcCcw, " R5")));
    }
    
    #[test]
    fn test_case_insensitive() {
        assert_eq!(resolve("home").map(|(op, _)| op), Some(Opcode::Home));
        assert_eq!(resolve("m104 S200").map(|(op, _)| op), Some(Opcode::SetHotendTemp));
    }
    
    #[test]
    fn test_unknown() {
        assert_eq!(resolve("Q99"), None);
        assert_eq!(resolve(""), None);
        assert_eq!(resolve("HOMEX"), None);
    }
    
    #[test]
    fn test_non_ascii_input_does_not_panic() {
        assert_eq!(resolve("Gé"), None);
        assert_eq!(resolve("ée"), None);
    }
    
    #[test]
    fn test_names_and_aliases() {
        assert_eq!(Opcode::MotorDisable.name(), "MOTOR-DISABLE");
        assert_eq!(
            Opcode::MotorDisable.gcodes().collect::<Vec<_>>(),
            vec!["M18", "M84"]
        );
        assert_eq!(Opcode::MoveLinear.gcodes().collect::<Vec<_>>(), vec!["G0", "G1"]);
        
        for (code, op) in REGISTRY {
            assert_eq!(resolve(code).map(|(found, _)| found), Some(*op), "{code}");
        }
    }
    
    #[test]
    fn test_motion_class() {
        assert!(Opcode::MoveLinear.is_motion());
        assert!(Opcode::Home.is_motion());
        assert!(!Opcode::SetPosition.is_motion());
        assert!(!Opcode::ReportPosition.is_motion());
    }
}
