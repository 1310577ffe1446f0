// ── Bus bridge wiring ──
//
// Connects a running `Bridge` to the broker: command intake on the
// `/set` topics, state change-sets out to retained read topics, sweep
// status/progress frames, and the error meta channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use spalink_core::sweep::SweepStore;
use spalink_core::{Bridge, ErrorCategory, ErrorSeverity, SweepPhase};

use crate::client::{BusClient, BusSettings, IncomingPublish};
use crate::commands::parse_command;
use crate::error::BusError;
use crate::topics::TopicScheme;

const ERROR_META_INTERVAL: Duration = Duration::from_secs(60);
const ERROR_META_LIMIT: usize = 20;

/// Everything the bus side of the daemon runs.
pub struct BusBridge {
    bus: BusClient,
    scheme: TopicScheme,
    handles: Vec<JoinHandle<()>>,
}

impl BusBridge {
    /// Connect to the broker and wire all tasks to the bridge.
    ///
    /// `store` is read to publish the retained result summary when a
    /// sweep finishes.
    pub async fn start(
        bridge: Bridge,
        settings: &BusSettings,
        scheme: TopicScheme,
        store: Option<Arc<dyn SweepStore>>,
    ) -> Result<Self, BusError> {
        let (bus, incoming, pump) =
            BusClient::connect(settings, scheme.availability(), "offline".into());

        bus.publish(&scheme.availability(), "online", true).await?;
        for filter in scheme.command_subscriptions() {
            bus.subscribe(&filter).await?;
            info!(topic = %filter, "subscribed to command topic");
        }

        let mut handles = vec![pump];
        handles.push(tokio::spawn(intake_task(
            bridge.clone(),
            scheme.clone(),
            incoming,
        )));
        handles.push(tokio::spawn(changes_task(
            bridge.clone(),
            bus.clone(),
            scheme.clone(),
        )));
        handles.push(tokio::spawn(progress_task(
            bridge.clone(),
            bus.clone(),
            scheme.clone(),
            store,
        )));
        handles.push(tokio::spawn(errors_task(
            bridge,
            bus.clone(),
            scheme.clone(),
        )));

        Ok(Self {
            bus,
            scheme,
            handles,
        })
    }

    pub fn bus(&self) -> &BusClient {
        &self.bus
    }

    pub fn scheme(&self) -> &TopicScheme {
        &self.scheme
    }

    /// Mark the bridge offline and stop all tasks.
    pub async fn shutdown(self) {
        let _ = self
            .bus
            .publish(&self.scheme.availability(), "offline", true)
            .await;
        let _ = self.bus.disconnect().await;
        for handle in self.handles {
            handle.abort();
        }
    }
}

// ── Tasks ────────────────────────────────────────────────────────────

/// Parse inbound `/set` publishes and route them through the bridge.
async fn intake_task(
    bridge: Bridge,
    scheme: TopicScheme,
    mut incoming: tokio::sync::mpsc::Receiver<IncomingPublish>,
) {
    while let Some(message) = incoming.recv().await {
        let Some(intake) = parse_command(scheme.base(), &message.topic, &message.payload) else {
            debug!(topic = %message.topic, "ignoring non-command publish");
            continue;
        };

        info!(topic = %message.topic, command = ?intake.command, "bus command received");
        match bridge.execute(intake.command.clone()).await {
            Ok(result) => debug!(?result, "bus command completed"),
            Err(e) => {
                warn!(command = ?intake.command, error = %e, "bus command failed");
                bridge.tracker().track(
                    ErrorCategory::Bus,
                    ErrorSeverity::Warning,
                    format!("bus command failed: {e}"),
                    Some("BUS_COMMAND_FAILED"),
                    Some(serde_json::json!({ "topic": message.topic })),
                );
            }
        }
    }
}

/// Publish reconciler change-sets to the retained read topics.
async fn changes_task(bridge: Bridge, bus: BusClient, scheme: TopicScheme) {
    let mut changes = bridge.changes();
    loop {
        match changes.recv().await {
            Ok(change) => {
                for message in scheme.state_messages(&change) {
                    if let Err(e) = bus.publish(&message.topic, &message.payload, message.retain).await
                    {
                        warn!(topic = %message.topic, error = %e, "state publish failed");
                    }
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "state publisher lagged, changes dropped");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// Push sweep status and progress frames as the tracker updates, and
/// the retained result summary once a run finishes.
async fn progress_task(
    bridge: Bridge,
    bus: BusClient,
    scheme: TopicScheme,
    store: Option<Arc<dyn SweepStore>>,
) {
    let Ok(target) = bridge.primary_target() else {
        return;
    };
    let spa = target.to_string();
    let mut rx = bridge.progress().subscribe();

    while rx.changed().await.is_ok() {
        let progress = Arc::clone(&*rx.borrow_and_update());

        let status_payload = progress.phase.to_string();
        if let Err(e) = bus
            .publish(&scheme.sweep_status(&spa), &status_payload, true)
            .await
        {
            warn!(error = %e, "sweep status publish failed");
        }

        if progress.phase != SweepPhase::Idle {
            let frame = serde_json::json!({
                "status": progress.phase,
                "percent": progress.percent,
                "completed_units": progress.completed_units,
                "total_units": progress.total_units,
                "current_unit": progress.current_unit,
            });
            if let Err(e) = bus
                .publish(&scheme.sweep_progress(&spa), &frame.to_string(), false)
                .await
            {
                warn!(error = %e, "sweep progress publish failed");
            }
        }

        if matches!(progress.phase, SweepPhase::Completed | SweepPhase::Stopped) {
            if let Some(store) = &store {
                publish_result(store.as_ref(), &bus, &scheme, &bridge, &spa).await;
            }
        }
    }
}

/// Retained summary of the persisted capability map for one spa.
async fn publish_result(
    store: &dyn SweepStore,
    bus: &BusClient,
    scheme: &TopicScheme,
    bridge: &Bridge,
    spa: &str,
) {
    let Ok(target) = bridge.primary_target() else {
        return;
    };
    match store.load(&target).await {
        Ok(Some(report)) => {
            let zones: serde_json::Map<String, serde_json::Value> = report
                .zones()
                .into_iter()
                .filter_map(|zone| {
                    serde_json::to_value(report.zone_summary(zone))
                        .ok()
                        .map(|summary| (zone.to_string(), summary))
                })
                .collect();
            let payload = serde_json::json!({
                "stopped_early": report.stopped_early,
                "total_tests": report.total_tests(),
                "success_count": report.success_count(),
                "zones": zones,
            });
            if let Err(e) = bus
                .publish(&scheme.sweep_result(spa), &payload.to_string(), true)
                .await
            {
                warn!(error = %e, "sweep result publish failed");
            }
        }
        Ok(None) => debug!("no persisted sweep results to publish"),
        Err(e) => warn!(error = %e, "could not load sweep results for publication"),
    }
}

/// Periodically publish the recent error window as retained meta.
async fn errors_task(bridge: Bridge, bus: BusClient, scheme: TopicScheme) {
    let Ok(target) = bridge.primary_target() else {
        return;
    };
    let spa = target.to_string();
    let mut interval = tokio::time::interval(ERROR_META_INTERVAL);
    let mut last_len = usize::MAX;

    loop {
        interval.tick().await;
        let tracker = bridge.tracker();
        if tracker.len() == last_len {
            continue;
        }
        last_len = tracker.len();

        let recent = tracker.recent(ERROR_META_LIMIT);
        let payload = match serde_json::to_string(&recent) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "error meta serialization failed");
                continue;
            }
        };
        if let Err(e) = bus.publish(&scheme.errors_meta(&spa), &payload, true).await {
            warn!(error = %e, "error meta publish failed");
        }
    }
}
