// ── Property addressing ──
//
// A (target, property) pair is the unit of write exclusion: at most one
// send-and-verify cycle may own it at a time. Properties are a closed
// tagged set, not free-form strings, so exclusion keys hash cheaply and
// classification never falls back to string matching.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use super::ids::TargetId;
use super::light::{ColorRgb, LightSetting};
use super::pump::{HeatMode, SwitchState};

/// A writable property on one component of a spa.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    /// On/off state of one pump.
    PumpState { pump_id: String },
    /// Mode + intensity of one light zone (set together on the wire).
    LightSetting { zone: u8 },
    /// RGB color of one light zone (dynamic-RGB capable zones only).
    LightColor { zone: u8 },
    /// Heater setpoint, degrees Celsius.
    TargetTemperature,
    /// Heater operating mode.
    HeatMode,
}

impl PropertyKey {
    /// Component identifier this property lives on ("P1", "zone_2",
    /// "heater"). Doubles as the bus topic segment.
    pub fn component_id(&self) -> String {
        match self {
            Self::PumpState { pump_id } => pump_id.clone(),
            Self::LightSetting { zone } | Self::LightColor { zone } => format!("zone_{zone}"),
            Self::TargetTemperature | Self::HeatMode => "heater".into(),
        }
    }

    /// The property's field name within its component.
    pub fn field(&self) -> &'static str {
        match self {
            Self::PumpState { .. } => "state",
            Self::LightSetting { .. } => "light",
            Self::LightColor { .. } => "color",
            Self::TargetTemperature => "target_temperature",
            Self::HeatMode => "mode",
        }
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PumpState { pump_id } => write!(f, "pumps/{pump_id}/state"),
            Self::LightSetting { zone } => write!(f, "lights/zone_{zone}/light"),
            Self::LightColor { zone } => write!(f, "lights/zone_{zone}/color"),
            Self::TargetTemperature => write!(f, "heater/target_temperature"),
            Self::HeatMode => write!(f, "heater/mode"),
        }
    }
}

/// A value a property can hold or be set to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Pump(SwitchState),
    Light(LightSetting),
    Color(ColorRgb),
    Temperature(f64),
    HeatMode(HeatMode),
}

impl PropertyValue {
    /// JSON rendering for change-set publication and logging.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Pump(s) => Value::String(if s.is_on() { "on" } else { "off" }.into()),
            Self::Light(l) => serde_json::json!({
                "mode": l.mode.to_string(),
                "intensity": l.intensity,
            }),
            Self::Color(c) => Value::String(c.to_hex()),
            Self::Temperature(t) => {
                serde_json::Number::from_f64(*t).map_or(Value::Null, Value::Number)
            }
            Self::HeatMode(m) => Value::String(m.to_string()),
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

/// The exclusion key for one in-flight send-and-verify cycle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommandKey {
    pub target: TargetId,
    pub property: PropertyKey,
}

impl CommandKey {
    pub fn new(target: TargetId, property: PropertyKey) -> Self {
        Self { target, property }
    }
}

impl fmt::Display for CommandKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.target, self.property)
    }
}
