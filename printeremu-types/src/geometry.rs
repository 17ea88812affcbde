//! Positions and motor axes

use std::fmt;

use serde::{Deserialize, Serialize};

/// A point in machine space, in millimeters
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub const ORIGIN: Vector3 = Vector3 { x: 0.0, y: 0.0, z: 0.0 };
    
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

impl fmt::Display for Vector3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X:{:.2} Y:{:.2} Z:{:.2}", self.x, self.y, self.z)
    }
}

bitflags::bitflags! {
    /// Stepper motors that can be enabled or disabled independently
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct MotorAxes: u8 {
        const X = 1;
        const Y = 1 << 1;
        const Z = 1 << 2;
        const E = 1 << 3;
    }
}

impl MotorAxes {
    /// Map a parameter letter to its axis
    pub fn from_letter(letter: char) -> Option<Self> {
        match letter.to_ascii_uppercase() {
            'X' => Some(Self::X),
            'Y' => Some(Self::Y),
            'Z' => Some(Self::Z),
            'E' => Some(Self::E),
            _ => None,
        }
    }
}

impl fmt::Display for MotorAxes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (letter, axis) in [('X', Self::X), ('Y', Self::Y), ('Z', Self::Z), ('E', Self::E)] {
            if self.contains(axis) {
                if !first {
                    f.write_str(" ")?;
                }
                write!(f, "{}", letter)?;
                first = false;
            }
        }
        Ok(())
    }
}
