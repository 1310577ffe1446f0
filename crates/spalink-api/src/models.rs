// Wire types for the vendor cloud API.
//
// These mirror the JSON the cloud returns verbatim (camelCase fields,
// stringly-typed enums). `spalink-core` converts them into domain types --
// nothing outside this crate should reason about wire shapes.

use serde::{Deserialize, Serialize};

// ── Account & spa listing ───────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct Account {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpaListResponse {
    #[serde(default)]
    pub content: Vec<SpaInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpaInfo {
    pub id: String,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

// ── Status ──────────────────────────────────────────────────────────

/// Top-level spa status document.
///
/// Optional everywhere: firmware revisions differ in which fields they
/// report, and a missing field must not fail the whole poll.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpaStatus {
    #[serde(default)]
    pub state: Option<String>,
    /// Heater run state ("ON"/"OFF").
    #[serde(default)]
    pub heater: Option<String>,
    #[serde(default)]
    pub heat_mode: Option<String>,
    #[serde(default)]
    pub set_temperature: Option<f64>,
    #[serde(default)]
    pub ambient_temperature: Option<f64>,
    #[serde(default)]
    pub water: Option<WaterStatus>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaterStatus {
    #[serde(default)]
    pub temperature: Option<f64>,
}

// ── Pumps ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct PumpsResponse {
    #[serde(default)]
    pub pumps: Vec<PumpStatus>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PumpStatus {
    pub id: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    /// "OFF", "LOW", or "HIGH".
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub speed: Option<String>,
}

// ── Lights ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct LightsResponse {
    #[serde(default)]
    pub lights: Vec<LightStatus>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LightStatus {
    pub zone: u8,
    #[serde(default)]
    pub zone_type: Option<String>,
    /// Mode name, e.g. "OFF", "WHITE", "COLOR_WHEEL".
    #[serde(default)]
    pub mode: Option<String>,
    /// Reported brightness 0-100. Unreliable while animation modes run.
    #[serde(default)]
    pub intensity: Option<u8>,
    #[serde(default)]
    pub color: Option<ColorChannels>,
}

/// Raw RGBW channel readback. The hardware caps channels well below 255
/// at full brightness, so these are samples, not setpoints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorChannels {
    #[serde(default)]
    pub red: u8,
    #[serde(default)]
    pub green: u8,
    #[serde(default)]
    pub blue: u8,
    #[serde(default)]
    pub white: u8,
}

// ── Write bodies ────────────────────────────────────────────────────

/// PATCH body for a light zone. Fields are independent: a mode change
/// carries `mode` + `intensity`, a color change carries only `color`.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LightPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intensity: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<ColorChannels>,
}

/// PATCH body for spa-level configuration (heater).
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub set_temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heat_mode: Option<String>,
}
