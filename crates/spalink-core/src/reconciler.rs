// ── State reconciler ──
//
// Owns the last-known state of every component and is the only place
// that state is mutated. Polls flow in as snapshots and come out as
// change-sets; command outcomes flow in as confirms/invalidates so the
// next poll never echoes a stale read back downstream.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

use crate::model::{
    ColorRgb, CommandKey, ComponentKind, DeviceSnapshot, HeatMode, LightSetting, PropertyKey,
    PropertyValue, SwitchState, TargetId,
};

const CHANGE_CHANNEL_SIZE: usize = 256;

/// Where a stored property value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateSource {
    /// Regular poll cycle.
    Poll,
    /// Optimistic update from a confirmed command, ahead of the next poll.
    CommandConfirm,
    /// Full re-read after a reconnect; forces a complete republish.
    RecoverySync,
}

/// Last-known state of one component.
#[derive(Debug, Clone)]
pub struct ComponentState {
    pub id: String,
    pub kind: ComponentKind,
    pub properties: BTreeMap<String, Value>,
    pub last_updated: DateTime<Utc>,
    pub source: StateSource,
}

/// One property transition, emitted downstream (bus publisher, logs).
#[derive(Debug, Clone, PartialEq)]
pub struct StateChange {
    pub target: TargetId,
    pub kind: ComponentKind,
    pub component_id: String,
    pub property: String,
    pub value: Value,
}

/// Fallback target temperature when nothing was ever confirmed.
const SAFE_TARGET_TEMPERATURE: f64 = 37.0;

/// Maintains last-known snapshots, computes diffs, and supplies safe
/// fallback values for failed verifications.
pub struct StateReconciler {
    components: DashMap<(TargetId, String), ComponentState>,
    /// Last value each property was positively confirmed at. Never
    /// written from polls -- only from terminal command outcomes.
    confirmed: DashMap<CommandKey, PropertyValue>,
    force_republish: AtomicBool,
    changes_tx: broadcast::Sender<StateChange>,
}

impl StateReconciler {
    pub fn new() -> Self {
        let (changes_tx, _) = broadcast::channel(CHANGE_CHANNEL_SIZE);
        Self {
            components: DashMap::new(),
            confirmed: DashMap::new(),
            force_republish: AtomicBool::new(false),
            changes_tx,
        }
    }

    /// Subscribe to the change stream.
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.changes_tx.subscribe()
    }

    /// Force the next ingest to republish every property, changed or
    /// not. Called after a reconnect so downstream consumers re-sync.
    pub fn mark_recovered(&self) {
        self.force_republish.store(true, Ordering::SeqCst);
    }

    // ── Poll path ────────────────────────────────────────────────────

    /// Diff a fresh snapshot against stored state, update the store,
    /// and emit the change-set.
    ///
    /// Components absent from the snapshot are left untouched: the
    /// gateway transiently drops whole component lists, and clobbering
    /// known-good state with an empty read would ripple spurious
    /// changes downstream.
    pub fn ingest(&self, snapshot: &DeviceSnapshot) -> Vec<StateChange> {
        let recovery = self.force_republish.swap(false, Ordering::SeqCst);
        let source = if recovery {
            StateSource::RecoverySync
        } else {
            StateSource::Poll
        };

        let mut changes = Vec::new();
        for fresh in component_states(snapshot, source) {
            let slot_key = (snapshot.target.clone(), fresh.id.clone());
            match self.components.get(&slot_key) {
                Some(stored) if !recovery => {
                    for (prop, value) in &fresh.properties {
                        if stored.properties.get(prop) != Some(value) {
                            changes.push(StateChange {
                                target: snapshot.target.clone(),
                                kind: fresh.kind,
                                component_id: fresh.id.clone(),
                                property: prop.clone(),
                                value: value.clone(),
                            });
                        }
                    }
                }
                // New component or forced republish: everything changes.
                _ => {
                    for (prop, value) in &fresh.properties {
                        changes.push(StateChange {
                            target: snapshot.target.clone(),
                            kind: fresh.kind,
                            component_id: fresh.id.clone(),
                            property: prop.clone(),
                            value: value.clone(),
                        });
                    }
                }
            }
            self.components.insert(slot_key, fresh);
        }

        for change in &changes {
            let _ = self.changes_tx.send(change.clone());
        }
        debug!(
            target = %snapshot.target,
            changed = changes.len(),
            recovery,
            "snapshot ingested"
        );
        changes
    }

    // ── Command outcome path ─────────────────────────────────────────

    /// Apply a confirmed command optimistically, ahead of the next
    /// poll. Records the value as the property's last confirmed state.
    pub fn confirm(&self, key: &CommandKey, value: PropertyValue) {
        self.confirmed.insert(key.clone(), value.clone());
        self.set_property(key, value.to_json(), StateSource::CommandConfirm);
    }

    /// Mark a property unknown after a rollback. Neither the pre- nor
    /// post-command value can be trusted until the next poll
    /// re-establishes ground truth.
    pub fn invalidate(&self, key: &CommandKey) {
        self.set_property(key, Value::Null, StateSource::CommandConfirm);
    }

    /// The value to restore when verification fails: the last confirmed
    /// value, or a defined safe default if the property was never
    /// confirmed.
    pub fn fallback_for(&self, key: &CommandKey) -> PropertyValue {
        if let Some(confirmed) = self.confirmed.get(key) {
            return confirmed.clone();
        }
        match &key.property {
            PropertyKey::PumpState { .. } => PropertyValue::Pump(SwitchState::Off),
            PropertyKey::LightSetting { .. } => PropertyValue::Light(LightSetting::off()),
            PropertyKey::LightColor { .. } => PropertyValue::Color(ColorRgb::WHITE),
            PropertyKey::TargetTemperature => {
                PropertyValue::Temperature(SAFE_TARGET_TEMPERATURE)
            }
            PropertyKey::HeatMode => PropertyValue::HeatMode(HeatMode::Auto),
        }
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn component(&self, target: &TargetId, id: &str) -> Option<ComponentState> {
        self.components
            .get(&(target.clone(), id.to_owned()))
            .map(|c| c.clone())
    }

    /// All stored components for one target, id-sorted.
    pub fn components_for(&self, target: &TargetId) -> Vec<ComponentState> {
        let mut out: Vec<ComponentState> = self
            .components
            .iter()
            .filter(|entry| entry.key().0 == *target)
            .map(|entry| entry.value().clone())
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    /// Stored current value of one property, if known.
    pub fn current_value(&self, key: &CommandKey) -> Option<Value> {
        let component = self.component(&key.target, &key.property.component_id())?;
        component.properties.get(key.property.field()).cloned()
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn set_property(&self, key: &CommandKey, value: Value, source: StateSource) {
        let slot_key = (key.target.clone(), key.property.component_id());
        let kind = component_kind(&key.property);
        let mut entry = self
            .components
            .entry(slot_key)
            .or_insert_with(|| ComponentState {
                id: key.property.component_id(),
                kind,
                properties: BTreeMap::new(),
                last_updated: Utc::now(),
                source,
            });
        entry
            .properties
            .insert(key.property.field().to_owned(), value.clone());
        entry.last_updated = Utc::now();
        entry.source = source;
        drop(entry);

        let _ = self.changes_tx.send(StateChange {
            target: key.target.clone(),
            kind,
            component_id: key.property.component_id(),
            property: key.property.field().to_owned(),
            value,
        });
    }
}

impl Default for StateReconciler {
    fn default() -> Self {
        Self::new()
    }
}

fn component_kind(key: &PropertyKey) -> ComponentKind {
    match key {
        PropertyKey::PumpState { .. } => ComponentKind::Pump,
        PropertyKey::LightSetting { .. } | PropertyKey::LightColor { .. } => ComponentKind::Light,
        PropertyKey::TargetTemperature | PropertyKey::HeatMode => ComponentKind::Heater,
    }
}

/// Flatten a snapshot into per-component property maps.
fn component_states(snapshot: &DeviceSnapshot, source: StateSource) -> Vec<ComponentState> {
    let now = snapshot.taken_at;
    let mut out = Vec::new();

    if snapshot.spa_state.is_some() || snapshot.ambient_temperature.is_some() {
        let mut props = BTreeMap::new();
        props.insert(
            "state".into(),
            snapshot
                .spa_state
                .clone()
                .map_or(Value::Null, Value::String),
        );
        props.insert("air_temperature".into(), to_number(snapshot.ambient_temperature));
        out.push(ComponentState {
            id: "spa".into(),
            kind: ComponentKind::Status,
            properties: props,
            last_updated: now,
            source,
        });
    }

    if let Some(heater) = &snapshot.heater {
        let mut props = BTreeMap::new();
        props.insert(
            "state".into(),
            Value::String(if heater.running { "on" } else { "off" }.into()),
        );
        props.insert("temperature".into(), to_number(heater.water_temperature));
        props.insert(
            "target_temperature".into(),
            to_number(heater.target_temperature),
        );
        props.insert(
            "mode".into(),
            heater
                .heat_mode
                .map_or(Value::Null, |m| Value::String(m.to_string())),
        );
        out.push(ComponentState {
            id: "heater".into(),
            kind: ComponentKind::Heater,
            properties: props,
            last_updated: now,
            source,
        });
    }

    for pump in &snapshot.pumps {
        let mut props = BTreeMap::new();
        props.insert(
            "state".into(),
            Value::String(if pump.state.is_running() { "on" } else { "off" }.into()),
        );
        props.insert("speed".into(), Value::String(pump.state.to_string()));
        props.insert(
            "type".into(),
            pump.kind.clone().map_or(Value::Null, Value::String),
        );
        out.push(ComponentState {
            id: pump.id.clone(),
            kind: ComponentKind::Pump,
            properties: props,
            last_updated: now,
            source,
        });
    }

    for light in &snapshot.lights {
        let mut props = BTreeMap::new();
        props.insert(
            "light".into(),
            light.mode.map_or(Value::Null, |mode| {
                serde_json::json!({
                    "mode": mode.to_string(),
                    "intensity": light.intensity.unwrap_or(0),
                })
            }),
        );
        props.insert(
            "color".into(),
            light
                .color
                .map_or(Value::Null, |c| Value::String(c.to_hex())),
        );
        out.push(ComponentState {
            id: format!("zone_{}", light.zone),
            kind: ComponentKind::Light,
            properties: props,
            last_updated: now,
            source,
        });
    }

    out
}

fn to_number(value: Option<f64>) -> Value {
    value
        .and_then(serde_json::Number::from_f64)
        .map_or(Value::Null, Value::Number)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{HeaterSnapshot, LightMode, LightSnapshot, PumpSnapshot, PumpState};
    use pretty_assertions::assert_eq;

    fn target() -> TargetId {
        TargetId::from("spa-1")
    }

    fn snapshot(pumps: Vec<PumpSnapshot>, lights: Vec<LightSnapshot>) -> DeviceSnapshot {
        DeviceSnapshot {
            heater: Some(HeaterSnapshot {
                running: true,
                water_temperature: Some(37.5),
                target_temperature: Some(38.0),
                heat_mode: Some(HeatMode::Auto),
            }),
            pumps,
            lights,
            ..DeviceSnapshot::empty(target())
        }
    }

    fn pump(id: &str, state: PumpState) -> PumpSnapshot {
        PumpSnapshot {
            id: id.into(),
            kind: Some("JET".into()),
            state,
        }
    }

    fn light_key() -> CommandKey {
        CommandKey::new(target(), PropertyKey::LightSetting { zone: 1 })
    }

    #[test]
    fn first_ingest_emits_everything() {
        let reconciler = StateReconciler::new();
        let changes = reconciler.ingest(&snapshot(vec![pump("P1", PumpState::Off)], vec![]));
        // 4 heater properties + 3 pump properties.
        assert_eq!(changes.len(), 7);
    }

    #[test]
    fn second_ingest_emits_only_diffs() {
        let reconciler = StateReconciler::new();
        reconciler.ingest(&snapshot(vec![pump("P1", PumpState::Off)], vec![]));

        let changes = reconciler.ingest(&snapshot(vec![pump("P1", PumpState::High)], vec![]));
        let mut props: Vec<&str> = changes.iter().map(|c| c.property.as_str()).collect();
        props.sort_unstable();
        assert_eq!(props, vec!["speed", "state"]);
        let state = changes.iter().find(|c| c.property == "state").unwrap();
        assert_eq!(state.value, Value::String("on".into()));
    }

    #[test]
    fn recovery_forces_full_republish() {
        let reconciler = StateReconciler::new();
        let snap = snapshot(vec![pump("P1", PumpState::Off)], vec![]);
        reconciler.ingest(&snap);

        // Identical snapshot: nothing to publish...
        assert!(reconciler.ingest(&snap).is_empty());

        // ...until a recovery forces everything out again.
        reconciler.mark_recovered();
        assert_eq!(reconciler.ingest(&snap).len(), 7);

        // One-shot: the next ingest diffs again.
        assert!(reconciler.ingest(&snap).is_empty());
    }

    #[test]
    fn absent_component_list_does_not_clobber() {
        let reconciler = StateReconciler::new();
        reconciler.ingest(&snapshot(vec![pump("P1", PumpState::High)], vec![]));

        // Transient read with no pumps: stored pump state survives.
        reconciler.ingest(&snapshot(vec![], vec![]));
        let stored = reconciler.component(&target(), "P1").unwrap();
        assert_eq!(stored.properties["state"], Value::String("on".into()));
    }

    #[test]
    fn confirm_updates_store_optimistically() {
        let reconciler = StateReconciler::new();
        let key = light_key();
        let value = PropertyValue::Light(LightSetting::new(LightMode::Purple, 75));
        reconciler.confirm(&key, value.clone());

        let stored = reconciler.component(&target(), "zone_1").unwrap();
        assert_eq!(stored.source, StateSource::CommandConfirm);
        assert_eq!(stored.properties["light"], value.to_json());
        assert_eq!(reconciler.fallback_for(&key), value);
    }

    #[test]
    fn invalidate_marks_property_unknown() {
        let reconciler = StateReconciler::new();
        let key = light_key();
        reconciler.confirm(&key, PropertyValue::Light(LightSetting::new(LightMode::Red, 50)));
        reconciler.invalidate(&key);

        assert_eq!(reconciler.current_value(&key), Some(Value::Null));
    }

    #[test]
    fn fallback_defaults_when_never_confirmed() {
        let reconciler = StateReconciler::new();
        assert_eq!(
            reconciler.fallback_for(&light_key()),
            PropertyValue::Light(LightSetting::off())
        );
        assert_eq!(
            reconciler.fallback_for(&CommandKey::new(
                target(),
                PropertyKey::PumpState {
                    pump_id: "P1".into()
                }
            )),
            PropertyValue::Pump(SwitchState::Off)
        );
    }

    #[test]
    fn changes_are_broadcast_to_subscribers() {
        let reconciler = StateReconciler::new();
        let mut rx = reconciler.subscribe();
        reconciler.ingest(&snapshot(vec![], vec![]));
        let first = rx.try_recv().unwrap();
        assert_eq!(first.component_id, "heater");
    }
}
