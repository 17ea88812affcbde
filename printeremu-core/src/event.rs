//! Application events carried inside message frames

use std::fmt;

use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Event names used on the wire
pub mod names {
    pub const REGISTRATION: &str = "registration";
    pub const REGISTRATION_REQUEST: &str = "registration-request";
    pub const COMMAND: &str = "command";
    pub const COMMAND_RESPONSE: &str = "command-response";
    pub const PING: &str = "ping";
    pub const PONG: &str = "pong";
    pub const INFO: &str = "info";
    pub const ERROR: &str = "error";
    pub const DISCONNECT: &str = "disconnect";
    pub const SERIAL_PORT_REQUEST: &str = "serial-port-request";
    pub const SERIAL_PORT: &str = "serial-port";
}

/// Envelope of a message frame: `{event, data, nsp?}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event: String,
    
    #[serde(default)]
    pub data: Value,
    
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nsp: Option<String>,
    
    /// Top-level diagnostic text some peers attach to `info`/`error`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Event {
    pub fn new(event: impl Into<String>, data: impl Into<Value>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
            nsp: None,
            message: None,
        }
    }
    
    /// Build an event from any serializable payload
    pub fn with_payload<T: Serialize>(event: impl Into<String>, payload: &T) -> Result<Self> {
        Ok(Self::new(event, serde_json::to_value(payload)?))
    }
    
    pub fn with_namespace(mut self, nsp: impl Into<String>) -> Self {
        self.nsp = Some(nsp.into());
        self
    }
    
    pub fn kind(&self) -> EventKind {
        EventKind::from_name(&self.event)
    }
    
    /// Deserialize the data payload into a typed shape
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T> {
        T::deserialize(&self.data).map_err(|e| Error::InvalidPayload {
            event: self.event.clone(),
            reason: e.to_string(),
        })
    }
    
    /// Diagnostic text: the `message` field, else a string `data`
    pub fn text(&self) -> Option<&str> {
        self.message.as_deref().or_else(|| self.data.as_str())
    }
    
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
    
    /// Parse an envelope, retrying with single quotes swapped for double quotes
    pub fn from_json(json: &str) -> Result<Self> {
        match serde_json::from_str(json) {
            Ok(event) => Ok(event),
            Err(err) if json.contains('\'') => {
                tracing::trace!("Retrying single-quoted envelope");
                serde_json::from_str(&json.replace('\'', "\"")).map_err(|_| Error::Json(err))
            }
            Err(err) => Err(Error::Json(err)),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Event[{}]", self.event)
    }
}

/// Inbound event classification
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    RegistrationRequest,
    Command,
    Ping,
    Pong,
    Info,
    Error,
    Disconnect,
    SerialPortRequest,
    
    /// Any name the router has no handler for
    Unknown,
}

impl EventKind {
    /// Classify an event name, accepting the legacy underscore names
    pub fn from_name(name: &str) -> Self {
        match name {
            names::REGISTRATION_REQUEST | "printer_connect" => Self::RegistrationRequest,
            names::COMMAND | "send_gcode" => Self::Command,
            names::PING => Self::Ping,
            names::PONG => Self::Pong,
            names::INFO => Self::Info,
            names::ERROR => Self::Error,
            names::DISCONNECT | "printer_disconnect" => Self::Disconnect,
            names::SERIAL_PORT_REQUEST | "fake_serial_port" => Self::SerialPortRequest,
            _ => Self::Unknown,
        }
    }
}

/// Device identifier as delivered by the peer, string or number
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
    
    pub fn as_str(&self) -> &str {
        &self.0
    }
    
    /// Compare against a numeric device id
    ///
    /// Integral floats such as `1.0` match too.
    pub fn matches(&self, id: u32) -> bool {
        let text = self.0.trim();
        match text.parse::<u32>() {
            Ok(parsed) => parsed == id,
            Err(_) => text
                .parse::<f64>()
                .is_ok_and(|parsed| parsed.fract() == 0.0 && parsed == f64::from(id)),
        }
    }
}

impl From<u32> for DeviceId {
    fn from(id: u32) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for DeviceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(serde_json::Number),
        }
        
        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(text) => Self(text),
            Raw::Number(number) => Self(number.to_string()),
        })
    }
}

/// Payload of an inbound `command` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRequest {
    #[serde(alias = "printerid")]
    pub device_id: DeviceId,
    
    #[serde(alias = "gcode")]
    pub instruction: String,
}

impl CommandRequest {
    pub fn new(device_id: impl Into<DeviceId>, instruction: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            instruction: instruction.into(),
        }
    }
    
    /// Extract and validate the payload of a command event
    pub fn from_event(event: &Event) -> Result<Self> {
        let request: Self = event.payload()?;
        
        if request.device_id.as_str().trim().is_empty() {
            return Err(Error::InvalidPayload {
                event: event.event.clone(),
                reason: "empty deviceId".into(),
            });
        }
        if request.instruction.trim().is_empty() {
            return Err(Error::InvalidPayload {
                event: event.event.clone(),
                reason: "empty instruction".into(),
            });
        }
        
        Ok(request)
    }
    
    pub fn into_event(self) -> Result<Event> {
        Event::with_payload(names::COMMAND, &self)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Payload of an outbound `command-response` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResponse {
    pub device_id: DeviceId,
    pub response: String,
}

impl CommandResponse {
    pub fn into_event(self) -> Result<Event> {
        Event::with_payload(names::COMMAND_RESPONSE, &self)
    }
}

/// Payload of an outbound `error` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<DeviceId>,
    pub message: String,
}

impl ErrorPayload {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            device_id: None,
            message: message.into(),
        }
    }
    
    pub fn for_device(device_id: DeviceId, message: impl Into<String>) -> Self {
        Self {
            device_id: Some(device_id),
            message: message.into(),
        }
    }
    
    pub fn into_event(self) -> Result<Event> {
        Event::with_payload(names::ERROR, &self)
    }
}

/// Payload of an outbound `serial-port` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerialPortInfo {
    pub product_id: String,
    pub vendor_id: String,
    pub port: String,
    pub hwid: String,
}

impl SerialPortInfo {
    pub fn into_event(self) -> Result<Event> {
        Event::with_payload(names::SERIAL_PORT, &self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    
    #[test]
    fn test_envelope_omits_empty_optionals() {
        let json = Event::new(names::PING, "alive").to_json().unwrap();
        assert_eq!(json, r#"{"event":"ping","data":"alive"}"#);
        
        let json = Event::new(names::INFO, Value::Null).with_namespace("/").to_json().unwrap();
        assert_eq!(json, r#"{"event":"info","data":null,"nsp":"/"}"#);
    }
    
    #[test]
    fn test_single_quoted_envelope() {
        let event = Event::from_json("{'event': 'info', 'message': 'hello'}").unwrap();
        assert_eq!(event.event, "info");
        assert_eq!(event.text(), Some("hello"));
        assert_eq!(event.data, Value::Null);
    }
    
    #[test]
    fn test_garbage_envelope_is_json_error() {
        assert!(matches!(Event::from_json("not json"), Err(Error::Json(_))));
    }
    
    #[test]
    fn test_legacy_names() {
        assert_eq!(EventKind::from_name("send_gcode"), EventKind::Command);
        assert_eq!(EventKind::from_name("printer_connect"), EventKind::RegistrationRequest);
        assert_eq!(EventKind::from_name("printer_disconnect"), EventKind::Disconnect);
        assert_eq!(EventKind::from_name("fake_serial_port"), EventKind::SerialPortRequest);
        assert_eq!(EventKind::from_name("whatever"), EventKind::Unknown);
    }
    
    #[test]
    fn test_command_request_variants() {
        let event = Event::new(names::COMMAND, json!({"deviceId": "1", "instruction": "PAUSE"}));
        assert_eq!(
            CommandRequest::from_event(&event).unwrap(),
            CommandRequest::new("1", "PAUSE")
        );
        
        let event = Event::new("send_gcode", json!({"printerid": 7, "gcode": "G28"}));
        let request = CommandRequest::from_event(&event).unwrap();
        assert_eq!(request.device_id.as_str(), "7");
        assert!(request.device_id.matches(7));
        assert_eq!(request.instruction, "G28");
    }
    
    #[test]
    fn test_device_id_accepts_integral_float() {
        let event = Event::new(names::COMMAND, json!({"deviceId": 1.0, "instruction": "G28"}));
        let request = CommandRequest::from_event(&event).unwrap();
        assert!(request.device_id.matches(1));
        assert!(!request.device_id.matches(2));
        
        assert!(!DeviceId::new("1.5").matches(1));
        assert!(!DeviceId::new("printer").matches(1));
    }
    
    #[test]
    fn test_command_request_rejects_missing_fields() {
        let event = Event::new(names::COMMAND, json!({"deviceId": "1"}));
        assert!(matches!(
            CommandRequest::from_event(&event),
            Err(Error::InvalidPayload { .. })
        ));
        
        let event = Event::new(names::COMMAND, json!({"deviceId": "", "instruction": "G28"}));
        assert!(CommandRequest::from_event(&event).is_err());
        
        let event = Event::new(names::COMMAND, json!("G28"));
        assert!(CommandRequest::from_event(&event).is_err());
    }
    
    #[test]
    fn test_response_payload_shape() {
        let event = CommandResponse {
            device_id: DeviceId::from(1),
            response: "ok\n".into(),
        }
        .into_event()
        .unwrap();
        
        assert_eq!(event.event, names::COMMAND_RESPONSE);
        assert_eq!(event.data, json!({"deviceId": "1", "response": "ok\n"}));
    }
    
    #[test]
    fn test_error_payload_without_device() {
        let event = ErrorPayload::new("bad").into_event().unwrap();
        assert_eq!(event.data, json!({"message": "bad"}));
    }
}
