//! Simulated device state
//!
//! Plain data with bounded setters. Nothing here blocks, waits or simulates
//! physics: temperatures and positions change only when a setter is called.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::device_info::DeviceInfo;
use crate::error::StateError;
use crate::geometry::{MotorAxes, Vector3};

/// Hotend temperature ceiling (°C)
pub const HOTEND_MAX_TEMP: f64 = 300.0;

/// Heatbed temperature ceiling (°C)
pub const BED_MAX_TEMP: f64 = 120.0;

/// Auxiliary heater ceiling (°C)
pub const AUX_MAX_TEMP: f64 = 300.0;

/// Maximum fan PWM value
pub const FAN_MAX_SPEED: f64 = 255.0;

/// Maximum progress percentage
pub const PROGRESS_MAX: f64 = 100.0;

/// Feed rate used until a move sets one (mm/min)
pub const DEFAULT_FEED_RATE: f64 = 3600.0;

/// Starting temperature of every heater (°C)
pub const AMBIENT_TEMP: f64 = 20.0;

pub const DEFAULT_BED_WIDTH: f64 = 250.0;
pub const DEFAULT_BED_LENGTH: f64 = 210.0;
pub const DEFAULT_MAX_Z: f64 = 220.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositioningMode {
    #[default]
    Absolute,
    Relative,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Units {
    #[default]
    #[serde(rename = "mm")]
    Millimeters,
    #[serde(rename = "inches")]
    Inches,
}

impl Units {
    /// Millimeters per unit
    pub fn scale(self) -> f64 {
        match self {
            Self::Millimeters => 1.0,
            Self::Inches => 25.4,
        }
    }
}

/// Print head: position, hotend and part-cooling fan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Extruder {
    pub position: Vector3,
    pub temperature: f64,
    pub target_temperature: f64,
    pub fan_speed: f64,
    /// Extruder axis mode (M82/M83), independent of G90/G91
    pub positioning: PositioningMode,
    pub max_z_height: f64,
}

impl Extruder {
    pub fn new(position: Vector3) -> Self {
        Self {
            position,
            temperature: AMBIENT_TEMP,
            target_temperature: 0.0,
            fan_speed: 0.0,
            positioning: PositioningMode::Absolute,
            max_z_height: DEFAULT_MAX_Z,
        }
    }
}

impl Default for Extruder {
    fn default() -> Self {
        Self::new(Vector3::ORIGIN)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Heatbed {
    pub temperature: f64,
    pub target_temperature: f64,
    pub heating: bool,
    pub width: f64,
    pub length: f64,
}

impl Heatbed {
    pub fn new(width: f64, length: f64) -> Self {
        Self {
            temperature: AMBIENT_TEMP,
            target_temperature: 0.0,
            heating: false,
            width,
            length,
        }
    }
}

impl Default for Heatbed {
    fn default() -> Self {
        Self::new(DEFAULT_BED_WIDTH, DEFAULT_BED_LENGTH)
    }
}

/// Complete mutable state of one emulated printer
///
/// Serializes to the registration snapshot sent to the fleet backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceState {
    info: DeviceInfo,
    extruder: Extruder,
    heatbed: Heatbed,
    positioning: PositioningMode,
    units: Units,
    enabled_motors: MotorAxes,
    acceleration: f64,
    linear_advance: f64,
    aux_target_temperature: f64,
    feed_rate: f64,
    paused: bool,
    progress: u8,
    remaining_minutes: u32,
    cold_extrusion: bool,
    home_position: Vector3,
    last_keepalive: Option<DateTime<Utc>>,
    attributes: Map<String, Value>,
    data: Map<String, Value>,
}

fn check_range(quantity: &'static str, value: f64, min: f64, max: f64) -> Result<(), StateError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(StateError::OutOfRange { quantity, value, min, max })
    }
}

fn check_non_negative(quantity: &'static str, value: f64) -> Result<(), StateError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(StateError::Negative { quantity, value })
    }
}

impl DeviceState {
    pub fn new(info: DeviceInfo, extruder: Extruder, heatbed: Heatbed) -> Self {
        let home_position = extruder.position;
        Self {
            info,
            extruder,
            heatbed,
            positioning: PositioningMode::Absolute,
            units: Units::Millimeters,
            enabled_motors: MotorAxes::all(),
            acceleration: 0.0,
            linear_advance: 0.0,
            aux_target_temperature: 0.0,
            feed_rate: DEFAULT_FEED_RATE,
            paused: false,
            progress: 0,
            remaining_minutes: 0,
            cold_extrusion: false,
            home_position,
            last_keepalive: None,
            attributes: Map::new(),
            data: Map::new(),
        }
    }
    
    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }
    
    pub fn info_mut(&mut self) -> &mut DeviceInfo {
        &mut self.info
    }
    
    pub fn extruder(&self) -> &Extruder {
        &self.extruder
    }
    
    pub fn heatbed(&self) -> &Heatbed {
        &self.heatbed
    }
    
    // ---- kinematics ----
    
    pub fn position(&self) -> Vector3 {
        self.extruder.position
    }
    
    /// Travel volume upper bounds: bed width, bed length, Z ceiling
    pub fn travel_limits(&self) -> Vector3 {
        Vector3::new(self.heatbed.width, self.heatbed.length, self.extruder.max_z_height)
    }
    
    pub fn set_bed_size(&mut self, width: f64, length: f64) {
        self.heatbed.width = width;
        self.heatbed.length = length;
    }
    
    pub fn set_max_z_height(&mut self, height: f64) {
        self.extruder.max_z_height = height;
    }
    
    fn check_bounds(&self, target: Vector3) -> Result<(), StateError> {
        let limits = self.travel_limits();
        for (axis, value, max) in [
            ('X', target.x, limits.x),
            ('Y', target.y, limits.y),
            ('Z', target.z, limits.z),
        ] {
            if !(0.0..=max).contains(&value) {
                return Err(StateError::OutOfBounds { axis, value, max });
            }
        }
        Ok(())
    }
    
    /// Bounded move; rejected while paused or outside the travel volume
    pub fn move_to(&mut self, target: Vector3) -> Result<(), StateError> {
        if self.paused {
            return Err(StateError::Paused);
        }
        self.check_bounds(target)?;
        self.extruder.position = target;
        Ok(())
    }
    
    /// Reassign the current position without travel (G92); allowed while paused
    pub fn set_position(&mut self, position: Vector3) -> Result<(), StateError> {
        self.check_bounds(position)?;
        self.extruder.position = position;
        Ok(())
    }
    
    pub fn home_position(&self) -> Vector3 {
        self.home_position
    }
    
    /// Set the startup position; only used while applying registry data
    pub fn set_home_position(&mut self, position: Vector3) -> Result<(), StateError> {
        self.check_bounds(position)?;
        self.home_position = position;
        self.extruder.position = position;
        Ok(())
    }
    
    pub fn positioning(&self) -> PositioningMode {
        self.positioning
    }
    
    pub fn set_positioning(&mut self, mode: PositioningMode) {
        self.positioning = mode;
    }
    
    pub fn extruder_positioning(&self) -> PositioningMode {
        self.extruder.positioning
    }
    
    pub fn set_extruder_positioning(&mut self, mode: PositioningMode) {
        self.extruder.positioning = mode;
    }
    
    pub fn units(&self) -> Units {
        self.units
    }
    
    pub fn set_units(&mut self, units: Units) {
        self.units = units;
    }
    
    pub fn feed_rate(&self) -> f64 {
        self.feed_rate
    }
    
    pub fn set_feed_rate(&mut self, feed_rate: f64) -> Result<(), StateError> {
        check_non_negative("feed rate", feed_rate)?;
        self.feed_rate = feed_rate;
        Ok(())
    }
    
    // ---- thermal ----
    
    pub fn hotend_temperature(&self) -> f64 {
        self.extruder.temperature
    }
    
    pub fn hotend_target(&self) -> f64 {
        self.extruder.target_temperature
    }
    
    pub fn set_hotend_target(&mut self, target: f64) -> Result<(), StateError> {
        check_range("hotend temperature", target, 0.0, HOTEND_MAX_TEMP)?;
        self.extruder.target_temperature = target;
        Ok(())
    }
    
    /// Set the measured hotend temperature directly
    pub fn set_hotend_temperature(&mut self, temperature: f64) -> Result<(), StateError> {
        check_range("hotend temperature", temperature, 0.0, HOTEND_MAX_TEMP)?;
        self.extruder.temperature = temperature;
        Ok(())
    }
    
    pub fn bed_temperature(&self) -> f64 {
        self.heatbed.temperature
    }
    
    pub fn bed_target(&self) -> f64 {
        self.heatbed.target_temperature
    }
    
    /// Set the bed target and mark the bed as heating
    pub fn set_bed_target(&mut self, target: f64) -> Result<(), StateError> {
        check_range("bed temperature", target, 0.0, BED_MAX_TEMP)?;
        self.heatbed.target_temperature = target;
        self.heatbed.heating = true;
        Ok(())
    }
    
    /// Set the measured bed temperature directly
    pub fn set_bed_temperature(&mut self, temperature: f64) -> Result<(), StateError> {
        check_range("bed temperature", temperature, 0.0, BED_MAX_TEMP)?;
        self.heatbed.temperature = temperature;
        Ok(())
    }
    
    pub fn is_bed_heating(&self) -> bool {
        self.heatbed.heating
    }
    
    pub fn set_bed_heating(&mut self, heating: bool) {
        self.heatbed.heating = heating;
    }
    
    pub fn aux_target(&self) -> f64 {
        self.aux_target_temperature
    }
    
    pub fn set_aux_target(&mut self, target: f64) -> Result<(), StateError> {
        check_range("auxiliary temperature", target, 0.0, AUX_MAX_TEMP)?;
        self.aux_target_temperature = target;
        Ok(())
    }
    
    // ---- actuators ----
    
    pub fn fan_speed(&self) -> f64 {
        self.extruder.fan_speed
    }
    
    pub fn set_fan_speed(&mut self, speed: f64) -> Result<(), StateError> {
        check_range("fan speed", speed, 0.0, FAN_MAX_SPEED)?;
        self.extruder.fan_speed = speed;
        Ok(())
    }
    
    pub fn enabled_motors(&self) -> MotorAxes {
        self.enabled_motors
    }
    
    pub fn enable_motors(&mut self, axes: MotorAxes) {
        self.enabled_motors.insert(axes);
    }
    
    pub fn disable_motors(&mut self, axes: MotorAxes) {
        self.enabled_motors.remove(axes);
    }
    
    pub fn acceleration(&self) -> f64 {
        self.acceleration
    }
    
    pub fn set_acceleration(&mut self, acceleration: f64) -> Result<(), StateError> {
        check_non_negative("acceleration", acceleration)?;
        self.acceleration = acceleration;
        Ok(())
    }
    
    pub fn linear_advance(&self) -> f64 {
        self.linear_advance
    }
    
    pub fn set_linear_advance(&mut self, k: f64) -> Result<(), StateError> {
        check_non_negative("linear advance factor", k)?;
        self.linear_advance = k;
        Ok(())
    }
    
    pub fn cold_extrusion_allowed(&self) -> bool {
        self.cold_extrusion
    }
    
    pub fn set_cold_extrusion(&mut self, allowed: bool) {
        self.cold_extrusion = allowed;
    }
    
    // ---- control ----
    
    pub fn is_paused(&self) -> bool {
        self.paused
    }
    
    /// Returns false if the device was already paused
    pub fn pause(&mut self) -> bool {
        !std::mem::replace(&mut self.paused, true)
    }
    
    /// Returns false if the device was not paused
    pub fn resume(&mut self) -> bool {
        std::mem::replace(&mut self.paused, false)
    }
    
    pub fn progress(&self) -> u8 {
        self.progress
    }
    
    pub fn remaining_minutes(&self) -> u32 {
        self.remaining_minutes
    }
    
    pub fn set_progress(&mut self, percent: f64, remaining_minutes: u32) -> Result<(), StateError> {
        check_range("progress", percent, 0.0, PROGRESS_MAX)?;
        self.progress = percent as u8;
        self.remaining_minutes = remaining_minutes;
        Ok(())
    }
    
    pub fn last_keepalive(&self) -> Option<DateTime<Utc>> {
        self.last_keepalive
    }
    
    pub fn touch_keepalive(&mut self, at: DateTime<Utc>) {
        self.last_keepalive = Some(at);
    }
    
    // ---- metadata ----
    
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }
    
    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }
    
    pub fn insert_attribute(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(key.into(), value.into());
    }
    
    pub fn data_value(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }
    
    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }
    
    pub fn insert_data(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.data.insert(key.into(), value.into());
    }
}
