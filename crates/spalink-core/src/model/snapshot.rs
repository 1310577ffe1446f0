// ── Device snapshots ──
//
// A `DeviceSnapshot` is one full read of a spa through the gateway,
// already converted into domain types. The reconciler diffs successive
// snapshots; the executor extracts single properties for verification.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

use super::ids::TargetId;
use super::light::{ColorRgb, LightMode, LightSetting};
use super::property::{PropertyKey, PropertyValue};
use super::pump::{HeatMode, PumpState, SwitchState};

/// Kind of physical component a state entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Pump,
    Light,
    Heater,
    Status,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeaterSnapshot {
    pub running: bool,
    pub water_temperature: Option<f64>,
    pub target_temperature: Option<f64>,
    pub heat_mode: Option<HeatMode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PumpSnapshot {
    pub id: String,
    pub kind: Option<String>,
    pub state: PumpState,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LightSnapshot {
    pub zone: u8,
    pub mode: Option<LightMode>,
    /// Reported brightness. Unreliable while animation modes run.
    pub intensity: Option<u8>,
    pub color: Option<ColorRgb>,
}

/// One complete read of a spa's observable state.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSnapshot {
    pub target: TargetId,
    pub taken_at: DateTime<Utc>,
    /// Overall spa run state as reported ("NORMAL", "FLOW_ERROR", ...).
    pub spa_state: Option<String>,
    pub ambient_temperature: Option<f64>,
    pub heater: Option<HeaterSnapshot>,
    pub pumps: Vec<PumpSnapshot>,
    pub lights: Vec<LightSnapshot>,
}

impl DeviceSnapshot {
    pub fn empty(target: TargetId) -> Self {
        Self {
            target,
            taken_at: Utc::now(),
            spa_state: None,
            ambient_temperature: None,
            heater: None,
            pumps: Vec::new(),
            lights: Vec::new(),
        }
    }

    pub fn light(&self, zone: u8) -> Option<&LightSnapshot> {
        self.lights.iter().find(|l| l.zone == zone)
    }

    pub fn pump(&self, id: &str) -> Option<&PumpSnapshot> {
        self.pumps.iter().find(|p| p.id == id)
    }

    /// Extract the current value of one property, if observable.
    ///
    /// Returns `None` when the owning component is absent from this
    /// snapshot (transient gateway hiccups routinely drop whole
    /// component lists).
    pub fn property(&self, key: &PropertyKey) -> Option<PropertyValue> {
        match key {
            PropertyKey::PumpState { pump_id } => self
                .pump(pump_id)
                .map(|p| PropertyValue::Pump(SwitchState::from_bool(p.state.is_running()))),
            PropertyKey::LightSetting { zone } => {
                let light = self.light(*zone)?;
                let mode = light.mode?;
                Some(PropertyValue::Light(LightSetting::new(
                    mode,
                    light.intensity.unwrap_or(0),
                )))
            }
            PropertyKey::LightColor { zone } => self
                .light(*zone)
                .and_then(|l| l.color)
                .map(PropertyValue::Color),
            PropertyKey::TargetTemperature => self
                .heater
                .as_ref()
                .and_then(|h| h.target_temperature)
                .map(PropertyValue::Temperature),
            PropertyKey::HeatMode => self
                .heater
                .as_ref()
                .and_then(|h| h.heat_mode)
                .map(PropertyValue::HeatMode),
        }
    }

    /// Zones present in this snapshot, ascending.
    pub fn zones(&self) -> Vec<u8> {
        let mut zones: Vec<u8> = self.lights.iter().map(|l| l.zone).collect();
        zones.sort_unstable();
        zones.dedup();
        zones
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot_with_light(mode: LightMode, intensity: u8) -> DeviceSnapshot {
        DeviceSnapshot {
            lights: vec![LightSnapshot {
                zone: 1,
                mode: Some(mode),
                intensity: Some(intensity),
                color: None,
            }],
            ..DeviceSnapshot::empty(TargetId::from("spa-1"))
        }
    }

    #[test]
    fn property_extracts_light_setting() {
        let snap = snapshot_with_light(LightMode::Purple, 75);
        let value = snap.property(&PropertyKey::LightSetting { zone: 1 });
        assert_eq!(
            value,
            Some(PropertyValue::Light(LightSetting::new(LightMode::Purple, 75)))
        );
    }

    #[test]
    fn property_missing_component_is_none() {
        let snap = DeviceSnapshot::empty(TargetId::from("spa-1"));
        assert!(snap.property(&PropertyKey::LightSetting { zone: 1 }).is_none());
        assert!(
            snap.property(&PropertyKey::PumpState {
                pump_id: "P1".into()
            })
            .is_none()
        );
    }

    #[test]
    fn pump_running_states_map_to_on() {
        let snap = DeviceSnapshot {
            pumps: vec![PumpSnapshot {
                id: "P1".into(),
                kind: Some("JET".into()),
                state: PumpState::Low,
            }],
            ..DeviceSnapshot::empty(TargetId::from("spa-1"))
        };
        assert_eq!(
            snap.property(&PropertyKey::PumpState {
                pump_id: "P1".into()
            }),
            Some(PropertyValue::Pump(SwitchState::On))
        );
    }
}
