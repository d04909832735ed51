//! Device model: state codes, device records and session descriptors.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Variable names understood by the device over MQTT.
pub mod variables {
    pub const STATE: &str = "state";
    pub const TEMP: &str = "temp";
    pub const SET_POINT: &str = "setpoint";
    pub const RECIPE_ID: &str = "recipeID";
    pub const VERSION: &str = "version";
}

/// Device power state as reported on the `state` variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceState {
    Offline,
    Off,
    On,
    BootingUp,
}

impl DeviceState {
    pub const ALL: [DeviceState; 4] = [Self::Offline, Self::Off, Self::On, Self::BootingUp];

    /// Integer code used on the wire.
    pub fn code(self) -> i8 {
        match self {
            Self::Offline => -1,
            Self::Off => 0,
            Self::On => 1,
            Self::BootingUp => 2,
        }
    }

    /// Human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Offline => "OFFLINE",
            Self::Off => "OFF",
            Self::On => "ON",
            Self::BootingUp => "BOOTING UP",
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            -1 => Some(Self::Offline),
            0 => Some(Self::Off),
            1 => Some(Self::On),
            2 => Some(Self::BootingUp),
            _ => None,
        }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Parses an MQTT `state` payload such as `"1"` or `"-1"`.
impl FromStr for DeviceState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code: i64 = s
            .trim()
            .parse()
            .map_err(|_| format!("not a device state code: {:?}", s))?;
        Self::from_code(code).ok_or_else(|| format!("unknown device state code: {}", code))
    }
}

/// Read-only view of a device record returned by `GET /devices`.
///
/// The record is kept as raw JSON; accessors cover the fields the client
/// itself relies on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Device(pub Value);

impl Device {
    /// Service-side device id (used in REST paths), stringified.
    pub fn id(&self) -> Option<String> {
        match self.0.get("id")? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Hardware id (used as the MQTT topic namespace).
    pub fn hardware_id(&self) -> Option<&str> {
        self.0
            .get("hardware_device_id")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn name(&self) -> Option<&str> {
        self.0.get("name").and_then(Value::as_str)
    }

    /// Any other attribute of the record.
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn into_inner(self) -> Value {
        self.0
    }
}

/// Short-lived telemetry session returned by `GET /devices/{id}/session`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSession {
    pub session_token: String,
    pub session_base_url: String,
    pub session_path: String,
}

impl DeviceSession {
    /// Telemetry URL without the `auth` query parameter.
    pub fn telemetry_url(&self) -> String {
        format!("{}{}", self.session_base_url, self.session_path)
    }
}
