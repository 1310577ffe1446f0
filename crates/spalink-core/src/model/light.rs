// ── Light domain types ──
//
// Light zones are the richest capability surface: a categorical mode
// plus a numeric intensity, with some modes realized as an ongoing
// animation rather than a settled state. The volatility tag on each
// mode drives verification timing and comparison depth.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// How a mode's physical realization behaves after a write settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Volatility {
    /// Settles immediately; every reported field is comparable.
    Static,
    /// Ongoing animation; only the categorical mode is comparable.
    /// Numeric side fields (intensity, channel values) oscillate and
    /// are routinely reported as zero mid-cycle.
    Dynamic,
}

/// Every light mode the device family knows about.
///
/// A given spa honors only a subset -- discovering which is the job of
/// the capability sweep.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    EnumIter,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LightMode {
    Off,
    On,
    White,
    Purple,
    Orange,
    Red,
    Yellow,
    Green,
    Aqua,
    Blue,
    Amber,
    HighSpeedColorWheel,
    HighSpeedWheel,
    LowSpeedWheel,
    ColorWheel,
    FullDynamicRgb,
    AutoTimerExterior,
    Party,
}

impl LightMode {
    /// Single source of truth for per-mode timing quirks. Animation
    /// modes keep mutating their reported fields after the write lands;
    /// everything else settles instantly.
    pub fn volatility(self) -> Volatility {
        match self {
            Self::HighSpeedColorWheel
            | Self::HighSpeedWheel
            | Self::LowSpeedWheel
            | Self::ColorWheel
            | Self::FullDynamicRgb
            | Self::AutoTimerExterior
            | Self::Party => Volatility::Dynamic,
            Self::Off
            | Self::On
            | Self::White
            | Self::Purple
            | Self::Orange
            | Self::Red
            | Self::Yellow
            | Self::Green
            | Self::Aqua
            | Self::Blue
            | Self::Amber => Volatility::Static,
        }
    }

    /// Whether the realized effect varies run to run, making a channel
    /// sample worth recording during a sweep.
    pub fn samples_color(self) -> bool {
        matches!(self, Self::FullDynamicRgb | Self::White)
    }
}

/// The settable state of a light zone: mode plus intensity percent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightSetting {
    pub mode: LightMode,
    /// 0-100. Zero is only meaningful together with `Off`.
    pub intensity: u8,
}

impl LightSetting {
    pub fn new(mode: LightMode, intensity: u8) -> Self {
        Self { mode, intensity }
    }

    /// The neutral state every zone is forced to between sweep phases.
    pub fn off() -> Self {
        Self {
            mode: LightMode::Off,
            intensity: 0,
        }
    }
}

/// An RGB setpoint or readback sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorRgb {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl ColorRgb {
    pub const WHITE: Self = Self {
        red: 255,
        green: 255,
        blue: 255,
    };

    pub fn new(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }

    /// Channel-wise comparison with tolerance. The hardware rounds
    /// channel values during scaling, so exact equality is too strict.
    pub fn approx_eq(&self, other: &Self, tolerance: u8) -> bool {
        self.red.abs_diff(other.red) <= tolerance
            && self.green.abs_diff(other.green) <= tolerance
            && self.blue.abs_diff(other.blue) <= tolerance
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.red, self.green, self.blue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn mode_names_round_trip_wire_format() {
        assert_eq!(LightMode::FullDynamicRgb.to_string(), "FULL_DYNAMIC_RGB");
        assert_eq!(
            LightMode::from_str("HIGH_SPEED_COLOR_WHEEL").ok(),
            Some(LightMode::HighSpeedColorWheel)
        );
        assert!(LightMode::from_str("DISCO").is_err());
    }

    #[test]
    fn animation_modes_are_dynamic() {
        assert_eq!(LightMode::ColorWheel.volatility(), Volatility::Dynamic);
        assert_eq!(LightMode::Party.volatility(), Volatility::Dynamic);
        assert_eq!(LightMode::Red.volatility(), Volatility::Static);
        assert_eq!(LightMode::Off.volatility(), Volatility::Static);
    }

    #[test]
    fn color_tolerance_compare() {
        let a = ColorRgb::new(250, 0, 5);
        let b = ColorRgb::new(255, 4, 0);
        assert!(a.approx_eq(&b, 5));
        assert!(!a.approx_eq(&b, 3));
    }
}
