// ── Bridge abstraction ──
//
// Full lifecycle management for one cloud-to-bus bridge instance.
// Handles authentication, background polling, command routing, sweep
// control, and reactive state streaming through the reconciler.

use std::str::FromStr;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use tokio::sync::{Mutex, broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::command::{Command, CommandResult};
use crate::config::BridgeConfig;
use crate::error::CoreError;
use crate::executor::CommandExecutor;
use crate::gateway::DeviceGateway;
use crate::inflight::InFlightRegistry;
use crate::model::{
    LightMode, LightSetting, PropertyKey, PropertyValue, SwitchState, TargetId,
};
use crate::progress::ProgressTracker;
use crate::ratelimit::RateLimiter;
use crate::reconciler::{StateChange, StateReconciler};
use crate::sweep::{SweepEngine, SweepPlan, SweepStore};
use crate::tracker::{ErrorCategory, ErrorSeverity, ErrorTracker};

const COMMAND_CHANNEL_SIZE: usize = 64;

// ── ConnectionState ──────────────────────────────────────────────────

/// Connection state observable by consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    Failed,
}

/// A command envelope sent through the command channel.
struct CommandEnvelope {
    command: Command,
    response_tx: oneshot::Sender<Result<CommandResult, CoreError>>,
}

// ── Bridge ───────────────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<BridgeInner>`. Manages the full
/// lifecycle: authentication, background polling, command routing,
/// sweep control, and reactive state streaming.
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<BridgeInner>,
}

struct BridgeInner {
    config: BridgeConfig,
    gateway: Arc<dyn DeviceGateway>,
    reconciler: Arc<StateReconciler>,
    limiter: Arc<RateLimiter>,
    executor: Arc<CommandExecutor>,
    sweep: Arc<SweepEngine>,
    progress: Arc<ProgressTracker>,
    tracker: Arc<ErrorTracker>,
    targets: StdMutex<Vec<TargetId>>,
    connection_state: watch::Sender<ConnectionState>,
    // Held so the watch channel always has a live receiver: tokio's
    // `watch::Sender::send` is a no-op when the receiver count is zero,
    // which would drop every state transition published before a
    // consumer subscribes.
    _connection_state_rx: watch::Receiver<ConnectionState>,
    command_tx: mpsc::Sender<CommandEnvelope>,
    command_rx: Mutex<Option<mpsc::Receiver<CommandEnvelope>>>,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Bridge {
    /// Create a new Bridge from configuration. Does NOT connect --
    /// call [`connect()`](Self::connect) to authenticate and start
    /// background tasks.
    pub fn new(
        config: BridgeConfig,
        gateway: Arc<dyn DeviceGateway>,
        store: Option<Arc<dyn SweepStore>>,
    ) -> Self {
        let reconciler = Arc::new(StateReconciler::new());
        let limiter = Arc::new(RateLimiter::new(config.throttle_base, config.throttle_cap));
        let registry = Arc::new(InFlightRegistry::new());
        let tracker = Arc::new(ErrorTracker::new());
        let progress = Arc::new(ProgressTracker::new());

        let executor = Arc::new(CommandExecutor::new(
            Arc::clone(&gateway),
            Arc::clone(&limiter),
            registry,
            Arc::clone(&reconciler),
            Arc::clone(&tracker),
        ));

        let mut sweep = SweepEngine::new(
            Arc::clone(&executor),
            Arc::clone(&gateway),
            Arc::clone(&limiter),
            Arc::clone(&progress),
            Arc::clone(&tracker),
            config.sweep.clone(),
        );
        if let Some(store) = store {
            sweep = sweep.with_store(store);
        }

        let (connection_state, connection_state_rx) =
            watch::channel(ConnectionState::Disconnected);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);

        Self {
            inner: Arc::new(BridgeInner {
                config,
                gateway,
                reconciler,
                limiter,
                executor,
                sweep: Arc::new(sweep),
                progress,
                tracker,
                targets: StdMutex::new(Vec::new()),
                connection_state,
                _connection_state_rx: connection_state_rx,
                command_tx,
                command_rx: Mutex::new(Some(command_rx)),
                cancel: CancellationToken::new(),
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    // ── Connection lifecycle ─────────────────────────────────────────

    /// Connect to the cloud.
    ///
    /// Authenticates, discovers spas, performs an initial state
    /// ingest, and spawns background tasks (periodic poll, command
    /// processor).
    pub async fn connect(&self) -> Result<(), CoreError> {
        let _ = self
            .inner
            .connection_state
            .send(ConnectionState::Connecting);

        let targets = match self.inner.gateway.targets().await {
            Ok(targets) if !targets.is_empty() => targets,
            Ok(_) => {
                let _ = self.inner.connection_state.send(ConnectionState::Failed);
                return Err(CoreError::TargetNotFound {
                    identifier: "no spas registered to this account".into(),
                });
            }
            Err(e) => {
                let _ = self.inner.connection_state.send(ConnectionState::Failed);
                return Err(e);
            }
        };
        info!(count = targets.len(), "discovered spas");
        *self.inner.targets.lock().expect("targets lock poisoned") = targets;

        // Initial state load.
        self.poll_once().await?;

        // Spawn background tasks.
        let mut handles = self.inner.task_handles.lock().await;

        if let Some(rx) = self.inner.command_rx.lock().await.take() {
            let bridge = self.clone();
            handles.push(tokio::spawn(command_processor_task(bridge, rx)));
        }

        if !self.inner.config.poll_interval.is_zero() {
            let bridge = self.clone();
            let cancel = self.inner.cancel.clone();
            handles.push(tokio::spawn(poll_task(bridge, cancel)));
        }

        let _ = self.inner.connection_state.send(ConnectionState::Connected);
        info!("bridge connected");
        Ok(())
    }

    /// Disconnect: stop any sweep, cancel background tasks, and reset
    /// the connection state.
    pub async fn disconnect(&self) {
        if self.inner.sweep.is_running() {
            let _ = self.inner.sweep.request_stop();
        }
        self.inner.cancel.cancel();

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }

        let _ = self
            .inner
            .connection_state
            .send(ConnectionState::Disconnected);
        debug!("bridge disconnected");
    }

    /// Fetch state for every spa and run it through the reconciler.
    pub async fn poll_once(&self) -> Result<(), CoreError> {
        for target in self.targets() {
            let snapshot = self.inner.gateway.snapshot(&target).await?;
            self.inner.limiter.record_success();
            let changes = self.inner.reconciler.ingest(&snapshot);
            debug!(target = %target, changed = changes.len(), "poll complete");
        }
        Ok(())
    }

    // ── Command execution ────────────────────────────────────────────

    /// Execute a command through the command processor task.
    pub async fn execute(&self, command: Command) -> Result<CommandResult, CoreError> {
        if *self.inner.connection_state.borrow() == ConnectionState::Disconnected {
            return Err(CoreError::GatewayDisconnected);
        }

        let (tx, rx) = oneshot::channel();
        self.inner
            .command_tx
            .send(CommandEnvelope {
                command,
                response_tx: tx,
            })
            .await
            .map_err(|_| CoreError::GatewayDisconnected)?;

        rx.await.map_err(|_| CoreError::GatewayDisconnected)?
    }

    // ── Sweep control ────────────────────────────────────────────────

    /// Start a capability sweep over every zone the last poll saw.
    ///
    /// Fails fast when a sweep is already in flight. The run itself is
    /// a background task; observe it through the progress tracker.
    pub async fn start_sweep(&self, resume: bool) -> Result<(), CoreError> {
        if self.inner.sweep.is_running() {
            return Err(CoreError::SweepAlreadyRunning);
        }
        let target = self.primary_target()?;
        let snapshot = self.inner.gateway.snapshot(&target).await?;
        let zones = snapshot.zones();
        if zones.is_empty() {
            return Err(CoreError::ComponentNotFound {
                identifier: format!("no light zones on {target}"),
            });
        }

        let modes: Vec<LightMode> = <LightMode as strum::IntoEnumIterator>::iter().collect();
        let plan = SweepPlan::build(target, &zones, &modes, &self.inner.config.sweep_levels);

        let sweep = Arc::clone(&self.inner.sweep);
        let tracker = Arc::clone(&self.inner.tracker);
        let mut handles = self.inner.task_handles.lock().await;
        handles.push(tokio::spawn(async move {
            match sweep.run(plan, resume).await {
                Ok(report) => info!(
                    tested = report.total_tests(),
                    supported = report.success_count(),
                    stopped = report.stopped_early,
                    "sweep run finished"
                ),
                Err(e) => {
                    warn!(error = %e, "sweep run failed");
                    tracker.track(
                        ErrorCategory::Sweep,
                        ErrorSeverity::Error,
                        format!("sweep run failed: {e}"),
                        Some("SWEEP_RUN_FAILED"),
                        None,
                    );
                }
            }
        }));
        Ok(())
    }

    /// Request a cooperative stop of the running sweep.
    pub fn stop_sweep(&self) -> Result<(), CoreError> {
        self.inner.sweep.request_stop()
    }

    pub fn sweep_running(&self) -> bool {
        self.inner.sweep.is_running()
    }

    // ── State observation ────────────────────────────────────────────

    /// Subscribe to connection state changes.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection_state.subscribe()
    }

    /// Subscribe to the reconciler's change stream.
    pub fn changes(&self) -> broadcast::Receiver<StateChange> {
        self.inner.reconciler.subscribe()
    }

    pub fn progress(&self) -> &Arc<ProgressTracker> {
        &self.inner.progress
    }

    pub fn tracker(&self) -> &Arc<ErrorTracker> {
        &self.inner.tracker
    }

    pub fn reconciler(&self) -> &Arc<StateReconciler> {
        &self.inner.reconciler
    }

    pub fn targets(&self) -> Vec<TargetId> {
        self.inner
            .targets
            .lock()
            .expect("targets lock poisoned")
            .clone()
    }

    /// The spa commands are routed to. Multi-spa accounts address the
    /// first; per-command targeting rides on the bus topic instead.
    pub fn primary_target(&self) -> Result<TargetId, CoreError> {
        self.targets()
            .first()
            .cloned()
            .ok_or_else(|| CoreError::TargetNotFound {
                identifier: "no spa discovered".into(),
            })
    }

    // ── Private helpers ──────────────────────────────────────────────

    /// Light mode currently stored for a zone, for brightness writes
    /// that keep the mode and change only the level.
    fn current_light_mode(&self, target: &TargetId, zone: u8) -> LightMode {
        let key = crate::model::CommandKey::new(
            target.clone(),
            PropertyKey::LightSetting { zone },
        );
        self.inner
            .reconciler
            .current_value(&key)
            .and_then(|v| {
                v.get("mode")
                    .and_then(|m| m.as_str())
                    .and_then(|m| LightMode::from_str(m).ok())
            })
            .filter(|mode| *mode != LightMode::Off)
            .unwrap_or(LightMode::White)
    }
}

// ── Background tasks ─────────────────────────────────────────────────

/// Periodically poll the gateway, flipping to reconnect handling after
/// a failure streak and forcing a recovery republish once it heals.
async fn poll_task(bridge: Bridge, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(bridge.inner.config.poll_interval);
    interval.tick().await; // consume the immediate first tick

    let mut failures: u32 = 0;
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                match bridge.poll_once().await {
                    Ok(()) => {
                        if failures >= bridge.inner.config.reconnect_failure_threshold {
                            info!("gateway recovered, forcing full republish");
                            bridge.inner.reconciler.mark_recovered();
                            // Re-ingest immediately so the republish
                            // isn't a poll cycle away.
                            let _ = bridge.poll_once().await;
                        }
                        failures = 0;
                        let _ = bridge
                            .inner
                            .connection_state
                            .send(ConnectionState::Connected);
                    }
                    Err(e) => {
                        failures += 1;
                        warn!(error = %e, failures, "periodic poll failed");
                        bridge.inner.tracker.track(
                            ErrorCategory::StateSync,
                            ErrorSeverity::Warning,
                            format!("periodic poll failed: {e}"),
                            Some("POLL_FAILED"),
                            None,
                        );
                        if failures >= bridge.inner.config.reconnect_failure_threshold {
                            let _ = bridge
                                .inner
                                .connection_state
                                .send(ConnectionState::Reconnecting { attempt: failures });
                        }
                    }
                }
            }
        }
    }
}

/// Process commands from the mpsc channel, routing each to the
/// executor or the sweep engine.
async fn command_processor_task(bridge: Bridge, mut rx: mpsc::Receiver<CommandEnvelope>) {
    let cancel = bridge.inner.cancel.clone();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            envelope = rx.recv() => {
                let Some(envelope) = envelope else { break };
                let result = route_command(&bridge, envelope.command).await;

                // A confirmed write deserves an expedited poll so the
                // bus reflects hardware state without waiting a full
                // cycle -- after the cloud's propagation delay.
                if matches!(
                    &result,
                    Ok(CommandResult::Executed(outcome)) if outcome.is_confirmed()
                ) {
                    let bridge = bridge.clone();
                    tokio::spawn(async move {
                        sleep(bridge.inner.config.propagation_delay).await;
                        if let Err(e) = bridge.poll_once().await {
                            debug!(error = %e, "expedited post-command poll failed");
                        }
                    });
                }

                let _ = envelope.response_tx.send(result);
            }
        }
    }
}

// ── Command routing ──────────────────────────────────────────────────

async fn route_command(bridge: &Bridge, command: Command) -> Result<CommandResult, CoreError> {
    let executor: &Arc<CommandExecutor> = &bridge.inner.executor;

    match command {
        Command::SetPumpState { pump_id, on } => {
            let target = bridge.primary_target()?;
            let outcome = executor
                .execute(
                    &target,
                    PropertyKey::PumpState { pump_id },
                    PropertyValue::Pump(SwitchState::from_bool(on)),
                )
                .await?;
            Ok(CommandResult::Executed(outcome))
        }

        Command::SetLightMode {
            zone,
            mode,
            intensity,
        } => {
            let target = bridge.primary_target()?;
            let intensity = intensity.unwrap_or_else(|| Command::default_intensity(mode));
            let outcome = executor
                .execute(
                    &target,
                    PropertyKey::LightSetting { zone },
                    PropertyValue::Light(LightSetting::new(mode, intensity)),
                )
                .await?;
            Ok(CommandResult::Executed(outcome))
        }

        Command::SetLightColor { zone, color } => {
            let target = bridge.primary_target()?;
            let outcome = executor
                .execute(
                    &target,
                    PropertyKey::LightColor { zone },
                    PropertyValue::Color(color),
                )
                .await?;
            Ok(CommandResult::Executed(outcome))
        }

        Command::SetLightBrightness { zone, percent } => {
            let target = bridge.primary_target()?;
            let mode = bridge.current_light_mode(&target, zone);
            let outcome = executor
                .execute(
                    &target,
                    PropertyKey::LightSetting { zone },
                    PropertyValue::Light(LightSetting::new(mode, percent.min(100))),
                )
                .await?;
            Ok(CommandResult::Executed(outcome))
        }

        Command::SetTargetTemperature { celsius } => {
            let target = bridge.primary_target()?;
            let outcome = executor
                .execute(
                    &target,
                    PropertyKey::TargetTemperature,
                    PropertyValue::Temperature(celsius),
                )
                .await?;
            Ok(CommandResult::Executed(outcome))
        }

        Command::SetHeatMode { mode } => {
            let target = bridge.primary_target()?;
            let outcome = executor
                .execute(&target, PropertyKey::HeatMode, PropertyValue::HeatMode(mode))
                .await?;
            Ok(CommandResult::Executed(outcome))
        }

        Command::StartSweep { resume } => {
            bridge.start_sweep(resume).await?;
            Ok(CommandResult::SweepStarted)
        }

        Command::StopSweep => {
            bridge.stop_sweep()?;
            Ok(CommandResult::SweepStopRequested)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::LightMode;
    use crate::testutil::MockGateway;
    use std::time::Duration;

    fn bridge_with(gateway: Arc<MockGateway>) -> Bridge {
        let config = BridgeConfig {
            poll_interval: Duration::from_secs(60),
            propagation_delay: Duration::from_millis(2500),
            ..BridgeConfig::default()
        };
        Bridge::new(config, gateway, None)
    }

    #[tokio::test(start_paused = true)]
    async fn connect_discovers_targets_and_ingests_state() {
        let gateway = Arc::new(MockGateway::with_zones(&[1]));
        let bridge = bridge_with(gateway);

        bridge.connect().await.unwrap();
        assert_eq!(*bridge.connection_state().borrow(), ConnectionState::Connected);
        assert_eq!(bridge.primary_target().unwrap(), TargetId::from("spa-1"));
        // Initial ingest populated the store.
        assert!(
            bridge
                .reconciler()
                .component(&TargetId::from("spa-1"), "zone_1")
                .is_some()
        );
        bridge.disconnect().await;
        assert_eq!(
            *bridge.connection_state().borrow(),
            ConnectionState::Disconnected
        );
    }

    #[tokio::test(start_paused = true)]
    async fn routed_light_command_verifies_and_confirms() {
        let gateway = Arc::new(MockGateway::with_zones(&[1]));
        let bridge = bridge_with(gateway.clone());
        bridge.connect().await.unwrap();

        let result = bridge
            .execute(Command::SetLightMode {
                zone: 1,
                mode: LightMode::Purple,
                intensity: None,
            })
            .await
            .unwrap();

        match result {
            CommandResult::Executed(outcome) => assert!(outcome.is_confirmed()),
            other => panic!("expected Executed, got {other:?}"),
        }
        // Default intensity for a non-off mode is 50.
        assert_eq!(gateway.light_state(1), Some((LightMode::Purple, 50)));
        bridge.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn brightness_keeps_current_mode() {
        let gateway = Arc::new(MockGateway::with_zones(&[1]));
        let bridge = bridge_with(gateway.clone());
        bridge.connect().await.unwrap();

        bridge
            .execute(Command::SetLightMode {
                zone: 1,
                mode: LightMode::Green,
                intensity: Some(50),
            })
            .await
            .unwrap();

        bridge
            .execute(Command::SetLightBrightness {
                zone: 1,
                percent: 80,
            })
            .await
            .unwrap();

        assert_eq!(gateway.light_state(1), Some((LightMode::Green, 80)));
        bridge.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn execute_after_disconnect_is_rejected() {
        let gateway = Arc::new(MockGateway::with_zones(&[1]));
        let bridge = bridge_with(gateway);
        bridge.connect().await.unwrap();
        bridge.disconnect().await;

        let err = bridge
            .execute(Command::SetLightMode {
                zone: 1,
                mode: LightMode::Red,
                intensity: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::GatewayDisconnected));
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_start_is_exclusive() {
        let gateway = Arc::new(MockGateway::with_zones(&[1]));
        let bridge = bridge_with(gateway);
        bridge.connect().await.unwrap();

        bridge.execute(Command::StartSweep { resume: false }).await.unwrap();
        // Give the sweep task a beat to claim the flag.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(bridge.sweep_running());

        let err = bridge
            .execute(Command::StartSweep { resume: false })
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::SweepAlreadyRunning));

        bridge.execute(Command::StopSweep).await.unwrap();
        bridge.disconnect().await;
    }
}
