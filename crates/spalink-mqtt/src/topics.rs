// ── Topic scheme ──
//
// Every property gets sibling channels: a retained read topic
// reporting the current value, and a `<topic>/set` write topic
// accepting new desired values. Sweep control and observability live
// under `{base}/{spa}/sweep/` and `{base}/{spa}/meta/`.

use serde_json::Value;

use spalink_core::model::ComponentKind;
use spalink_core::reconciler::StateChange;

/// One outgoing bus message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub topic: String,
    pub payload: String,
    pub retain: bool,
}

impl BusMessage {
    pub fn retained(topic: String, payload: String) -> Self {
        Self {
            topic,
            payload,
            retain: true,
        }
    }

    pub fn transient(topic: String, payload: String) -> Self {
        Self {
            topic,
            payload,
            retain: false,
        }
    }
}

/// Maps domain events onto the topic tree rooted at `base`.
#[derive(Debug, Clone)]
pub struct TopicScheme {
    base: String,
}

impl TopicScheme {
    pub fn new(base: impl Into<String>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    // ── Well-known topics ───────────────────────────────────────────

    /// Bridge availability (also the LWT topic).
    pub fn availability(&self) -> String {
        format!("{}/bridge/status", self.base)
    }

    pub fn sweep_status(&self, spa: &str) -> String {
        format!("{}/{spa}/sweep/status", self.base)
    }

    pub fn sweep_progress(&self, spa: &str) -> String {
        format!("{}/{spa}/sweep/progress", self.base)
    }

    pub fn sweep_result(&self, spa: &str) -> String {
        format!("{}/{spa}/sweep/result", self.base)
    }

    pub fn errors_meta(&self, spa: &str) -> String {
        format!("{}/{spa}/meta/errors", self.base)
    }

    /// Wildcard subscriptions covering every write topic.
    pub fn command_subscriptions(&self) -> Vec<String> {
        vec![
            // heater/<prop>/set, sweep/set
            format!("{}/+/+/set", self.base),
            // heater nested + pumps/<id>/state/set, lights/<zone>/<prop>/set
            format!("{}/+/+/+/set", self.base),
            format!("{}/+/+/+/+/set", self.base),
        ]
    }

    // ── State mapping ───────────────────────────────────────────────

    /// Map one reconciler change onto its read topic(s).
    ///
    /// Light settings fan out into sibling `mode` and `intensity`
    /// channels; a property rolled back to unknown publishes an empty
    /// retained payload, clearing the stale value for subscribers.
    pub fn state_messages(&self, change: &StateChange) -> Vec<BusMessage> {
        let component = component_segment(change.kind, &change.component_id);
        let prefix = format!("{}/{}/{component}", self.base, change.target);

        if change.property == "light" {
            let (mode, intensity) = match &change.value {
                Value::Object(map) => (
                    map.get("mode")
                        .and_then(Value::as_str)
                        .map(str::to_owned)
                        .unwrap_or_default(),
                    map.get("intensity")
                        .and_then(Value::as_u64)
                        .map(|i| i.to_string())
                        .unwrap_or_default(),
                ),
                _ => (String::new(), String::new()),
            };
            return vec![
                BusMessage::retained(format!("{prefix}/mode"), mode),
                BusMessage::retained(format!("{prefix}/intensity"), intensity),
            ];
        }

        vec![BusMessage::retained(
            format!("{prefix}/{}", change.property),
            scalar_payload(&change.value),
        )]
    }
}

fn component_segment(kind: ComponentKind, component_id: &str) -> String {
    match kind {
        ComponentKind::Pump => format!("pumps/{component_id}"),
        ComponentKind::Light => format!("lights/{component_id}"),
        ComponentKind::Heater => "heater".into(),
        ComponentKind::Status => "spa".into(),
    }
}

/// Render a JSON value as a flat payload: bare strings unquoted,
/// null as empty (clears the retained value).
fn scalar_payload(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
