// ── Device gateway ──
//
// The trait every engine component talks through. Production uses the
// `CloudGateway` adapter over `spalink_api::SpaClient`; tests swap in a
// scripted gateway. Wire-to-domain conversion happens here and nowhere
// else.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, warn};

use spalink_api::SpaClient;
use spalink_api::models::{ColorChannels, ConfigPatch, LightPatch, LightStatus, PumpStatus};

use crate::error::CoreError;
use crate::model::{
    ColorRgb, DeviceSnapshot, HeaterSnapshot, HeatMode, LightMode, LightSnapshot, PropertyKey,
    PropertyValue, PumpSnapshot, PumpState, TargetId,
};

/// Read and write access to the remote device.
///
/// Every call is bounded by the transport's hard timeout; an exceeded
/// timeout surfaces as an error, never a hang.
#[async_trait]
pub trait DeviceGateway: Send + Sync {
    /// Authenticate (if needed) and list the spas this account controls.
    async fn targets(&self) -> Result<Vec<TargetId>, CoreError>;

    /// One full state read of a spa.
    async fn snapshot(&self, target: &TargetId) -> Result<DeviceSnapshot, CoreError>;

    /// Write one property. An `Ok` means the gateway accepted the
    /// request -- not that the device applied it; verification is the
    /// caller's job.
    async fn set_property(
        &self,
        target: &TargetId,
        key: &PropertyKey,
        value: &PropertyValue,
    ) -> Result<(), CoreError>;
}

// ── Cloud adapter ───────────────────────────────────────────────────

/// Production gateway backed by the vendor cloud API.
pub struct CloudGateway {
    client: Arc<SpaClient>,
}

impl CloudGateway {
    pub fn new(client: Arc<SpaClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DeviceGateway for CloudGateway {
    async fn targets(&self) -> Result<Vec<TargetId>, CoreError> {
        self.client.login().await.map_err(CoreError::from)?;
        let account = self.client.account().await.map_err(CoreError::from)?;
        let spas = self
            .client
            .list_spas(&account.id)
            .await
            .map_err(CoreError::from)?;
        Ok(spas.into_iter().map(|s| TargetId::from(s.id)).collect())
    }

    async fn snapshot(&self, target: &TargetId) -> Result<DeviceSnapshot, CoreError> {
        let spa_id = target.as_str();

        // Status is the backbone of a snapshot; its failure fails the
        // read. Pump and light sub-reads degrade to empty lists instead
        // -- the reconciler knows not to trust a transient empty list.
        let (status, pumps, lights) = tokio::join!(
            self.client.status(spa_id),
            self.client.pumps(spa_id),
            self.client.lights(spa_id),
        );

        let status = status.map_err(CoreError::from)?;
        let pumps = degrade(pumps.map(|p| p.pumps), "pumps")?;
        let lights = degrade(lights.map(|l| l.lights), "lights")?;

        Ok(DeviceSnapshot {
            target: target.clone(),
            taken_at: Utc::now(),
            spa_state: status.state.clone(),
            // The cloud reports 0.0 when there is no ambient sensor.
            ambient_temperature: status.ambient_temperature.filter(|t| *t != 0.0),
            heater: Some(convert_heater(&status)),
            pumps: pumps.iter().map(convert_pump).collect(),
            lights: lights.iter().map(convert_light).collect(),
        })
    }

    async fn set_property(
        &self,
        target: &TargetId,
        key: &PropertyKey,
        value: &PropertyValue,
    ) -> Result<(), CoreError> {
        let spa_id = target.as_str();
        match (key, value) {
            (PropertyKey::PumpState { pump_id }, PropertyValue::Pump(desired)) => {
                // The wire only offers a toggle; read first and skip the
                // write when the pump is already in the desired state.
                let pumps = self.client.pumps(spa_id).await.map_err(CoreError::from)?;
                let pump = pumps
                    .pumps
                    .iter()
                    .find(|p| p.id == *pump_id)
                    .ok_or_else(|| CoreError::ComponentNotFound {
                        identifier: format!("pump {pump_id}"),
                    })?;
                let running = parse_pump_state(pump).is_running();
                if running == desired.is_on() {
                    debug!(pump_id, "pump already in desired state");
                    return Ok(());
                }
                self.client
                    .toggle_pump(spa_id, pump_id)
                    .await
                    .map_err(CoreError::from)
            }
            (PropertyKey::LightSetting { zone }, PropertyValue::Light(setting)) => {
                let patch = LightPatch {
                    mode: Some(setting.mode.to_string()),
                    intensity: Some(setting.intensity),
                    ..LightPatch::default()
                };
                self.client
                    .set_light(spa_id, *zone, &patch)
                    .await
                    .map_err(CoreError::from)
            }
            (PropertyKey::LightColor { zone }, PropertyValue::Color(color)) => {
                let patch = LightPatch {
                    color: Some(ColorChannels {
                        red: color.red,
                        green: color.green,
                        blue: color.blue,
                        white: 0,
                    }),
                    ..LightPatch::default()
                };
                self.client
                    .set_light(spa_id, *zone, &patch)
                    .await
                    .map_err(CoreError::from)
            }
            (PropertyKey::TargetTemperature, PropertyValue::Temperature(celsius)) => {
                let patch = ConfigPatch {
                    set_temperature: Some(*celsius),
                    ..ConfigPatch::default()
                };
                self.client
                    .set_config(spa_id, &patch)
                    .await
                    .map_err(CoreError::from)
            }
            (PropertyKey::HeatMode, PropertyValue::HeatMode(mode)) => {
                let patch = ConfigPatch {
                    heat_mode: Some(mode.to_string()),
                    ..ConfigPatch::default()
                };
                self.client
                    .set_config(spa_id, &patch)
                    .await
                    .map_err(CoreError::from)
            }
            (key, value) => Err(CoreError::Validation {
                message: format!("value {value} is not assignable to {key}"),
            }),
        }
    }
}

// ── Conversion helpers ──────────────────────────────────────────────

/// Degrade a failed sub-read to an empty list, except for errors that
/// must not be swallowed (throttling feeds the rate limiter, auth
/// failures feed reconnect).
fn degrade<T>(
    result: Result<Vec<T>, spalink_api::Error>,
    what: &str,
) -> Result<Vec<T>, CoreError> {
    match result {
        Ok(items) => Ok(items),
        Err(e) => {
            let core: CoreError = e.into();
            if core.is_throttled() || core.halts_sweep() {
                Err(core)
            } else {
                warn!(component = what, error = %core, "sub-read failed, degrading to empty");
                Ok(Vec::new())
            }
        }
    }
}

fn convert_heater(status: &spalink_api::models::SpaStatus) -> HeaterSnapshot {
    HeaterSnapshot {
        running: status.heater.as_deref() == Some("ON"),
        water_temperature: status.water.as_ref().and_then(|w| w.temperature),
        target_temperature: status.set_temperature,
        heat_mode: status
            .heat_mode
            .as_deref()
            .and_then(|m| HeatMode::from_str(m).ok()),
    }
}

fn convert_pump(pump: &PumpStatus) -> PumpSnapshot {
    PumpSnapshot {
        id: pump.id.clone(),
        kind: pump.kind.clone(),
        state: parse_pump_state(pump),
    }
}

fn parse_pump_state(pump: &PumpStatus) -> PumpState {
    pump.state
        .as_deref()
        .and_then(|s| PumpState::from_str(s).ok())
        .unwrap_or(PumpState::Off)
}

fn convert_light(light: &LightStatus) -> LightSnapshot {
    LightSnapshot {
        zone: light.zone,
        mode: light.mode.as_deref().and_then(|m| LightMode::from_str(m).ok()),
        intensity: light.intensity,
        color: light.color.map(|c| ColorRgb::new(c.red, c.green, c.blue)),
    }
}
