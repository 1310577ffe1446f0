// ── Pump and heater domain types ──

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Reported pump state. The hardware distinguishes two running speeds;
/// writes only toggle, so the settable surface is [`SwitchState`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PumpState {
    Off,
    Low,
    High,
}

impl PumpState {
    pub fn is_running(self) -> bool {
        !matches!(self, Self::Off)
    }
}

/// Desired on/off state for toggling components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwitchState {
    On,
    Off,
}

impl SwitchState {
    pub fn is_on(self) -> bool {
        matches!(self, Self::On)
    }

    pub fn from_bool(on: bool) -> Self {
        if on { Self::On } else { Self::Off }
    }
}

/// Heater operating mode.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HeatMode {
    Auto,
    Economy,
    Day,
    Ready,
    Rest,
}
