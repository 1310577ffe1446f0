// Scripted in-memory gateway for engine tests.
//
// Behaves like the real device by default: writes apply instantly and
// the next snapshot reports them. Tests script failure modes on top --
// validation rejections, transport drops, throttle streaks, and units
// that silently never apply.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::CoreError;
use crate::executor::CommandExecutor;
use crate::gateway::DeviceGateway;
use crate::inflight::InFlightRegistry;
use crate::model::{
    DeviceSnapshot, HeaterSnapshot, HeatMode, LightMode, LightSnapshot, PropertyKey,
    PropertyValue, PumpSnapshot, PumpState, TargetId,
};
use crate::ratelimit::RateLimiter;
use crate::reconciler::StateReconciler;
use crate::tracker::ErrorTracker;

#[derive(Default)]
struct MockState {
    lights: BTreeMap<u8, LightSnapshot>,
    pumps: BTreeMap<String, PumpSnapshot>,
    heater: HeaterSnapshot,

    reject_modes: HashSet<LightMode>,
    zero_intensity_modes: HashSet<LightMode>,
    fail_units: HashSet<(u8, LightMode, u8)>,
    never_apply: bool,
    transport_failures: u32,
    throttle_remaining: u32,
    apply_delay: Duration,

    set_log: Vec<(PropertyKey, PropertyValue)>,
}

pub(crate) struct MockGateway {
    state: Mutex<MockState>,
}

impl MockGateway {
    pub(crate) fn new() -> Self {
        let state = MockState {
            heater: HeaterSnapshot {
                running: false,
                water_temperature: Some(36.5),
                target_temperature: Some(37.0),
                heat_mode: Some(HeatMode::Auto),
            },
            ..MockState::default()
        };
        Self {
            state: Mutex::new(state),
        }
    }

    pub(crate) fn with_zones(zones: &[u8]) -> Self {
        let gateway = Self::new();
        {
            let mut state = gateway.lock();
            for &zone in zones {
                state.lights.insert(
                    zone,
                    LightSnapshot {
                        zone,
                        mode: Some(LightMode::Off),
                        intensity: Some(0),
                        color: None,
                    },
                );
            }
        }
        gateway
    }

    pub(crate) fn with_pumps(ids: &[&str]) -> Self {
        let gateway = Self::new();
        {
            let mut state = gateway.lock();
            for &id in ids {
                state.pumps.insert(
                    id.to_owned(),
                    PumpSnapshot {
                        id: id.to_owned(),
                        kind: Some("JET".into()),
                        state: PumpState::Off,
                    },
                );
            }
        }
        gateway
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().expect("mock gateway poisoned")
    }

    // ── Scripting knobs ─────────────────────────────────────────────

    pub(crate) fn reject_mode(&self, mode: LightMode) {
        self.lock().reject_modes.insert(mode);
    }

    /// Apply the mode but report intensity 0, like animation readback.
    pub(crate) fn zero_intensity_for(&self, mode: LightMode) {
        self.lock().zero_intensity_modes.insert(mode);
    }

    /// Accept writes for this unit but never reflect them in state.
    pub(crate) fn fail_unit(&self, zone: u8, mode: LightMode, level: u8) {
        self.lock().fail_units.insert((zone, mode, level));
    }

    /// Accept every write but apply none of them.
    pub(crate) fn never_apply(&self) {
        self.lock().never_apply = true;
    }

    pub(crate) fn fail_transport(&self, times: u32) {
        self.lock().transport_failures = times;
    }

    pub(crate) fn throttle_next(&self, times: u32) {
        self.lock().throttle_remaining = times;
    }

    pub(crate) fn set_apply_delay(&self, delay: Duration) {
        self.lock().apply_delay = delay;
    }

    // ── Inspection ──────────────────────────────────────────────────

    pub(crate) fn set_calls(&self) -> usize {
        self.lock().set_log.len()
    }

    pub(crate) fn last_set_value(&self) -> Option<PropertyValue> {
        self.lock().set_log.last().map(|(_, v)| v.clone())
    }

    pub(crate) fn set_log(&self) -> Vec<(PropertyKey, PropertyValue)> {
        self.lock().set_log.clone()
    }

    pub(crate) fn light_state(&self, zone: u8) -> Option<(LightMode, u8)> {
        let state = self.lock();
        let light = state.lights.get(&zone)?;
        Some((light.mode?, light.intensity.unwrap_or(0)))
    }
}

#[async_trait]
impl DeviceGateway for MockGateway {
    async fn targets(&self) -> Result<Vec<TargetId>, CoreError> {
        Ok(vec![TargetId::from("spa-1")])
    }

    async fn snapshot(&self, target: &TargetId) -> Result<DeviceSnapshot, CoreError> {
        let state = self.lock();
        Ok(DeviceSnapshot {
            target: target.clone(),
            taken_at: Utc::now(),
            spa_state: Some("NORMAL".into()),
            ambient_temperature: None,
            heater: Some(state.heater.clone()),
            pumps: state.pumps.values().cloned().collect(),
            lights: state.lights.values().cloned().collect(),
        })
    }

    async fn set_property(
        &self,
        _target: &TargetId,
        key: &PropertyKey,
        value: &PropertyValue,
    ) -> Result<(), CoreError> {
        let delay = self.lock().apply_delay;
        if delay > Duration::ZERO {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.lock();
        state.set_log.push((key.clone(), value.clone()));
        if state.throttle_remaining > 0 {
            state.throttle_remaining -= 1;
            return Err(CoreError::Throttled { retry_after_secs: 1 });
        }
        if state.transport_failures > 0 {
            state.transport_failures -= 1;
            return Err(CoreError::Timeout { timeout_secs: 30 });
        }
        if let PropertyValue::Light(setting) = value {
            if state.reject_modes.contains(&setting.mode) {
                return Err(CoreError::Validation {
                    message: format!("mode {} not supported", setting.mode),
                });
            }
        }

        if state.never_apply {
            return Ok(());
        }

        match (key, value) {
            (PropertyKey::LightSetting { zone }, PropertyValue::Light(setting)) => {
                if state
                    .fail_units
                    .contains(&(*zone, setting.mode, setting.intensity))
                {
                    return Ok(());
                }
                let reported_intensity = if state.zero_intensity_modes.contains(&setting.mode) {
                    0
                } else {
                    setting.intensity
                };
                state.lights.insert(
                    *zone,
                    LightSnapshot {
                        zone: *zone,
                        mode: Some(setting.mode),
                        intensity: Some(reported_intensity),
                        color: None,
                    },
                );
            }
            (PropertyKey::LightColor { zone }, PropertyValue::Color(color)) => {
                if let Some(light) = state.lights.get_mut(zone) {
                    light.color = Some(*color);
                }
            }
            (PropertyKey::PumpState { pump_id }, PropertyValue::Pump(desired)) => {
                if let Some(pump) = state.pumps.get_mut(pump_id) {
                    pump.state = if desired.is_on() {
                        PumpState::High
                    } else {
                        PumpState::Off
                    };
                }
            }
            (PropertyKey::TargetTemperature, PropertyValue::Temperature(celsius)) => {
                state.heater.target_temperature = Some(*celsius);
            }
            (PropertyKey::HeatMode, PropertyValue::HeatMode(mode)) => {
                state.heater.heat_mode = Some(*mode);
            }
            _ => {
                return Err(CoreError::Validation {
                    message: "value not assignable to key".into(),
                });
            }
        }
        Ok(())
    }
}

/// Fully wired engine components around one gateway.
pub(crate) struct EngineParts {
    pub target: TargetId,
    pub limiter: Arc<RateLimiter>,
    pub registry: Arc<InFlightRegistry>,
    pub reconciler: Arc<StateReconciler>,
    pub tracker: Arc<ErrorTracker>,
}

pub(crate) fn engine_parts(gateway: Arc<MockGateway>) -> (CommandExecutor, EngineParts) {
    let limiter = Arc::new(RateLimiter::default());
    let registry = Arc::new(InFlightRegistry::new());
    let reconciler = Arc::new(StateReconciler::new());
    let tracker = Arc::new(ErrorTracker::new());
    let executor = CommandExecutor::new(
        gateway,
        Arc::clone(&limiter),
        Arc::clone(&registry),
        Arc::clone(&reconciler),
        Arc::clone(&tracker),
    );
    (
        executor,
        EngineParts {
            target: TargetId::from("spa-1"),
            limiter,
            registry,
            reconciler,
            tracker,
        },
    )
}
