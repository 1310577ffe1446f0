// ── Sweep engine ──
//
// Long-lived singleton driving the executor across a sweep plan. One
// run at a time, enforced by compare-and-swap on the running flag --
// there is no window between a start request and an in-flight
// completion where two runs can interleave.
//
// Stop requests are cooperative: honored at unit boundaries and
// between throttle retries, never by aborting a gateway call
// mid-flight.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::executor::{CommandExecutor, CommandStatus};
use crate::gateway::DeviceGateway;
use crate::model::{ColorRgb, LightSetting, PropertyKey, PropertyValue, TargetId};
use crate::progress::{ProgressTracker, SweepPhase};
use crate::ratelimit::RateLimiter;
use crate::tracker::{ErrorCategory, ErrorSeverity, ErrorTracker};

use super::plan::{SweepPlan, SweepUnit};
use super::report::{SweepReport, UnitRecord};

/// Persistence collaborator for sweep results. The file format is owned
/// elsewhere; the engine only needs read-for-resume and
/// write-on-completion access.
#[async_trait]
pub trait SweepStore: Send + Sync {
    async fn load(&self, target: &TargetId) -> Result<Option<SweepReport>, CoreError>;
    async fn save(&self, report: &SweepReport) -> Result<(), CoreError>;
}

/// Sweep pacing knobs.
#[derive(Debug, Clone)]
pub struct SweepSettings {
    /// Fixed pause between units, independent of verification timing.
    /// Commands issued faster than this are silently dropped by the
    /// gateway even though each individual verification would pass.
    pub settle_delay: Duration,
    /// Pause after forcing zones to neutral.
    pub zone_reset_pause: Duration,
    /// Force a neutral reset after this many units even within a zone.
    pub reset_every_units: u32,
    /// Throttle-triggered retries per unit before giving up on it.
    pub max_throttle_retries: u32,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(20),
            zone_reset_pause: Duration::from_secs(3),
            reset_every_units: 25,
            max_throttle_retries: 3,
        }
    }
}

/// Drives the full mode x level x zone space through the executor.
pub struct SweepEngine {
    executor: Arc<CommandExecutor>,
    gateway: Arc<dyn DeviceGateway>,
    limiter: Arc<RateLimiter>,
    progress: Arc<ProgressTracker>,
    tracker: Arc<ErrorTracker>,
    store: Option<Arc<dyn SweepStore>>,
    settings: SweepSettings,
    running: AtomicBool,
    cancel: Mutex<Option<CancellationToken>>,
}

impl SweepEngine {
    pub fn new(
        executor: Arc<CommandExecutor>,
        gateway: Arc<dyn DeviceGateway>,
        limiter: Arc<RateLimiter>,
        progress: Arc<ProgressTracker>,
        tracker: Arc<ErrorTracker>,
        settings: SweepSettings,
    ) -> Self {
        Self {
            executor,
            gateway,
            limiter,
            progress,
            tracker,
            store: None,
            settings,
            running: AtomicBool::new(false),
            cancel: Mutex::new(None),
        }
    }

    /// Attach a persistence collaborator for resume/save.
    pub fn with_store(mut self, store: Arc<dyn SweepStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Request a cooperative stop. The run ends at the next unit
    /// boundary, restores pre-sweep state, and persists partial results.
    pub fn request_stop(&self) -> Result<(), CoreError> {
        let guard = self.cancel.lock().expect("sweep cancel slot poisoned");
        match guard.as_ref() {
            Some(token) => {
                info!("sweep stop requested");
                token.cancel();
                Ok(())
            }
            None => Err(CoreError::SweepNotRunning),
        }
    }

    /// Run a sweep to completion (or stop). Fails fast with
    /// [`CoreError::SweepAlreadyRunning`] if a run is in flight.
    ///
    /// With `resume`, previously persisted results seed the report and
    /// already-recorded units are skipped.
    pub async fn run(&self, plan: SweepPlan, resume: bool) -> Result<SweepReport, CoreError> {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| CoreError::SweepAlreadyRunning)?;

        let cancel = CancellationToken::new();
        *self.cancel.lock().expect("sweep cancel slot poisoned") = Some(cancel.clone());
        let _reset = RunGuard(self);

        let mut report = self.seed_report(&plan, resume).await;
        let pre_sweep = self.capture_zone_states(&plan).await;

        info!(
            target = %plan.target,
            units = plan.units.len(),
            seeded = report.total_tests(),
            "sweep started"
        );
        self.progress.begin(plan.units.len());

        let mut stopped = false;
        let mut last_zone: Option<u8> = None;
        let mut units_since_reset = 0u32;

        for unit in &plan.units {
            if cancel.is_cancelled() {
                stopped = true;
                break;
            }

            if resume && report.contains(unit) {
                debug!(unit = %unit, "unit already recorded, skipping");
                self.progress.unit_completed();
                continue;
            }

            // Neutral reset at zone boundaries (and periodically within
            // long zones) keeps cross-zone bleed out of the unit under
            // test.
            if last_zone != Some(unit.zone) || units_since_reset >= self.settings.reset_every_units
            {
                self.neutral_reset(&plan).await;
                units_since_reset = 0;
            }
            last_zone = Some(unit.zone);

            self.progress.unit_started(*unit);
            match self.run_unit(&plan.target, unit, &cancel).await {
                Ok(Some(record)) => {
                    debug!(unit = %unit, supported = record.supported, "unit recorded");
                    report.record(*unit, record);
                }
                // Cancelled between throttle retries.
                Ok(None) => {
                    stopped = true;
                    break;
                }
                Err(e) if e.halts_sweep() => {
                    warn!(error = %e, "unrecoverable gateway failure, aborting sweep");
                    self.restore_zone_states(&plan, &pre_sweep).await;
                    report.finish(true);
                    self.persist(&report).await;
                    self.progress.phase_changed(SweepPhase::Stopped);
                    return Err(e);
                }
                Err(e) => {
                    // One unit's failure never halts the sweep.
                    warn!(unit = %unit, error = %e, "unit failed, continuing");
                    self.tracker.track(
                        ErrorCategory::Sweep,
                        ErrorSeverity::Warning,
                        format!("unit {unit} failed: {e}"),
                        Some("SWEEP_UNIT_FAILED"),
                        Some(serde_json::json!({
                            "zone": unit.zone,
                            "mode": unit.mode.to_string(),
                            "level": unit.level,
                        })),
                    );
                    report.record(
                        *unit,
                        UnitRecord {
                            supported: false,
                            outcome: CommandStatus::Failed,
                            sample: None,
                        },
                    );
                }
            }
            self.progress.unit_completed();
            units_since_reset += 1;

            // Inter-unit settle delay, interruptible by stop.
            tokio::select! {
                biased;
                () = cancel.cancelled() => stopped = true,
                () = sleep(self.settings.settle_delay) => {}
            }
            if stopped {
                break;
            }
        }

        self.progress.phase_changed(SweepPhase::Restoring);
        self.restore_zone_states(&plan, &pre_sweep).await;

        report.finish(stopped);
        self.persist(&report).await;
        self.progress.phase_changed(if stopped {
            SweepPhase::Stopped
        } else {
            SweepPhase::Completed
        });
        info!(
            target = %plan.target,
            tested = report.total_tests(),
            supported = report.success_count(),
            stopped,
            "sweep finished"
        );
        Ok(report)
    }

    // ── Single unit ─────────────────────────────────────────────────

    /// Execute one unit, absorbing throttle backoffs up to the retry
    /// bound. `Ok(None)` means a stop request arrived between retries.
    async fn run_unit(
        &self,
        target: &TargetId,
        unit: &SweepUnit,
        cancel: &CancellationToken,
    ) -> Result<Option<UnitRecord>, CoreError> {
        let property = PropertyKey::LightSetting { zone: unit.zone };
        let desired = PropertyValue::Light(LightSetting::new(unit.mode, unit.level));

        let mut throttle_retries = 0;
        loop {
            match self
                .executor
                .execute(target, property.clone(), desired.clone())
                .await
            {
                Ok(outcome) => {
                    let supported = outcome.is_confirmed();
                    let sample = if supported && unit.mode.samples_color() {
                        self.sample_color(target, unit.zone).await
                    } else {
                        None
                    };
                    return Ok(Some(UnitRecord {
                        supported,
                        outcome: outcome.status,
                        sample,
                    }));
                }
                Err(e) if e.is_throttled() && throttle_retries < self.settings.max_throttle_retries => {
                    // The guard already computed the backoff window;
                    // the whole sweep pauses for it, then retries this
                    // same unit.
                    throttle_retries += 1;
                    self.progress.phase_changed(SweepPhase::CoolingDown);
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => return Ok(None),
                        () = self.limiter.wait_ready() => {}
                    }
                    self.progress.phase_changed(SweepPhase::Running);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Read back the realized color channels for a confirmed unit.
    async fn sample_color(&self, target: &TargetId, zone: u8) -> Option<ColorRgb> {
        match self.gateway.snapshot(target).await {
            Ok(snapshot) => snapshot.light(zone).and_then(|l| l.color),
            Err(e) => {
                debug!(zone, error = %e, "color sample read failed");
                None
            }
        }
    }

    // ── Zone state management ───────────────────────────────────────

    async fn seed_report(&self, plan: &SweepPlan, resume: bool) -> SweepReport {
        if resume {
            if let Some(store) = &self.store {
                match store.load(&plan.target).await {
                    Ok(Some(prior)) => {
                        info!(prior_units = prior.total_tests(), "resuming from persisted results");
                        let mut report = prior;
                        report.finished_at = None;
                        report.stopped_early = false;
                        return report;
                    }
                    Ok(None) => {}
                    Err(e) => warn!(error = %e, "could not load prior results, starting fresh"),
                }
            }
        }
        SweepReport::new(plan.target.clone())
    }

    /// Record each zone's current setting so a stop can put the spa
    /// back the way the owner had it.
    async fn capture_zone_states(&self, plan: &SweepPlan) -> BTreeMap<u8, LightSetting> {
        match self.gateway.snapshot(&plan.target).await {
            Ok(snapshot) => plan
                .zones
                .iter()
                .filter_map(|&zone| {
                    let light = snapshot.light(zone)?;
                    Some((
                        zone,
                        LightSetting::new(light.mode?, light.intensity.unwrap_or(0)),
                    ))
                })
                .collect(),
            Err(e) => {
                warn!(error = %e, "could not capture pre-sweep state, will restore defaults");
                BTreeMap::new()
            }
        }
    }

    /// Force every zone in the plan to off. Direct gateway writes, no
    /// verification cycle -- a failed reset is tolerable, a slow one is
    /// not.
    async fn neutral_reset(&self, plan: &SweepPlan) {
        self.progress.phase_changed(SweepPhase::Resetting);
        for &zone in &plan.zones {
            let result = self
                .gateway
                .set_property(
                    &plan.target,
                    &PropertyKey::LightSetting { zone },
                    &PropertyValue::Light(LightSetting::off()),
                )
                .await;
            if let Err(e) = result {
                if e.is_throttled() {
                    self.limiter.record_throttle();
                }
                warn!(zone, error = %e, "neutral reset write failed");
            }
        }
        sleep(self.settings.zone_reset_pause).await;
        self.progress.phase_changed(SweepPhase::Running);
    }

    /// Put zones back to their pre-sweep setting, or off if unrecorded.
    async fn restore_zone_states(&self, plan: &SweepPlan, pre_sweep: &BTreeMap<u8, LightSetting>) {
        for &zone in &plan.zones {
            let setting = pre_sweep
                .get(&zone)
                .copied()
                .unwrap_or_else(LightSetting::off);
            let result = self
                .gateway
                .set_property(
                    &plan.target,
                    &PropertyKey::LightSetting { zone },
                    &PropertyValue::Light(setting),
                )
                .await;
            if let Err(e) = result {
                if e.is_throttled() {
                    self.limiter.record_throttle();
                }
                warn!(zone, error = %e, "pre-sweep state restore failed");
            }
        }
        sleep(self.settings.zone_reset_pause).await;
    }

    async fn persist(&self, report: &SweepReport) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save(report).await {
                warn!(error = %e, "failed to persist sweep results");
                self.tracker.track(
                    ErrorCategory::Sweep,
                    ErrorSeverity::Error,
                    format!("failed to persist sweep results: {e}"),
                    Some("SWEEP_PERSIST_FAILED"),
                    None,
                );
            }
        }
    }
}

/// Clears the running flag and cancel slot however `run` exits.
struct RunGuard<'a>(&'a SweepEngine);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        *self
            .0
            .cancel
            .lock()
            .expect("sweep cancel slot poisoned") = None;
        self.0.running.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::LightMode;
    use crate::reconciler::StateReconciler;
    use crate::inflight::InFlightRegistry;
    use crate::testutil::MockGateway;

    fn engine(gateway: Arc<MockGateway>) -> Arc<SweepEngine> {
        let limiter = Arc::new(RateLimiter::default());
        let registry = Arc::new(InFlightRegistry::new());
        let reconciler = Arc::new(StateReconciler::new());
        let tracker = Arc::new(ErrorTracker::new());
        let executor = Arc::new(CommandExecutor::new(
            gateway.clone(),
            Arc::clone(&limiter),
            registry,
            reconciler,
            Arc::clone(&tracker),
        ));
        Arc::new(SweepEngine::new(
            executor,
            gateway,
            limiter,
            Arc::new(ProgressTracker::new()),
            tracker,
            SweepSettings {
                settle_delay: Duration::from_secs(20),
                zone_reset_pause: Duration::from_secs(3),
                reset_every_units: 25,
                max_throttle_retries: 3,
            },
        ))
    }

    fn target() -> TargetId {
        TargetId::from("spa-1")
    }

    fn two_by_two_plan() -> SweepPlan {
        SweepPlan::build(
            target(),
            &[1],
            &[LightMode::Red, LightMode::Blue],
            &[25, 50],
        )
    }

    #[tokio::test(start_paused = true)]
    async fn failed_unit_is_recorded_and_sweep_continues() {
        let gateway = Arc::new(MockGateway::with_zones(&[1]));
        // Unit #3 (BLUE @ 25) always reports a mismatched state.
        gateway.fail_unit(1, LightMode::Blue, 25);
        let engine = engine(gateway);

        let report = engine.run(two_by_two_plan(), false).await.unwrap();

        assert_eq!(report.total_tests(), 4);
        assert_eq!(report.success_count(), 3);
        let failed = report.results[&SweepUnit {
            zone: 1,
            mode: LightMode::Blue,
            level: 25,
        }];
        assert_eq!(failed.outcome, CommandStatus::RolledBack);
        // Unit #4 still ran.
        assert!(
            report.results[&SweepUnit {
                zone: 1,
                mode: LightMode::Blue,
                level: 50,
            }]
            .supported
        );
    }

    #[tokio::test(start_paused = true)]
    async fn second_concurrent_run_fails_fast() {
        let gateway = Arc::new(MockGateway::with_zones(&[1]));
        let engine = engine(gateway);

        let first = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.run(two_by_two_plan(), false).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(engine.is_running());

        let err = engine.run(two_by_two_plan(), false).await.unwrap_err();
        assert!(matches!(err, CoreError::SweepAlreadyRunning));

        first.await.unwrap().unwrap();
        assert!(!engine.is_running());
        // The flag is clear, so a fresh run may start.
        assert!(engine.run(two_by_two_plan(), false).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn throttled_unit_pauses_then_retries_same_unit() {
        let gateway = Arc::new(MockGateway::with_zones(&[1]));
        let engine = engine(gateway.clone());

        let plan = SweepPlan::build(target(), &[1], &[LightMode::Red], &[50]);
        // First write throttled twice, then accepted.
        gateway.throttle_next(2);

        let report = engine.run(plan, false).await.unwrap();
        assert_eq!(report.success_count(), 1);
        // Both throttles landed on the same unit; the streak was reset
        // by the eventual success.
        assert_eq!(engine.limiter.consecutive_throttles(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_restores_pre_sweep_state_and_keeps_partial_results() {
        let gateway = Arc::new(MockGateway::with_zones(&[1, 2]));
        let engine = engine(gateway.clone());

        let plan = SweepPlan::build(
            target(),
            &[1, 2],
            &[LightMode::Red, LightMode::Blue],
            &[50],
        );
        let handle = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.run(plan, false).await })
        };

        // Let the first unit complete, then stop during the settle
        // delay that follows it.
        tokio::time::sleep(Duration::from_secs(10)).await;
        engine.request_stop().unwrap();

        let report = handle.await.unwrap().unwrap();
        assert!(report.stopped_early);
        // Only units completed before the stop are present.
        assert!(report.total_tests() < 4);
        assert!(report.total_tests() >= 1);
        // Zones were restored to their pre-sweep state (off).
        assert_eq!(gateway.light_state(1), Some((LightMode::Off, 0)));
        assert_eq!(gateway.light_state(2), Some((LightMode::Off, 0)));
        assert!(!engine.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_without_running_sweep_errors() {
        let gateway = Arc::new(MockGateway::with_zones(&[1]));
        let engine = engine(gateway);
        assert!(matches!(
            engine.request_stop().unwrap_err(),
            CoreError::SweepNotRunning
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn zone_boundary_forces_neutral_reset() {
        let gateway = Arc::new(MockGateway::with_zones(&[1, 2]));
        let engine = engine(gateway.clone());

        let plan = SweepPlan::build(target(), &[1, 2], &[LightMode::Red], &[50]);
        engine.run(plan, false).await.unwrap();

        // Before zone 2's unit ran, every zone was forced off.
        let log = gateway.set_log();
        let zone2_test = log
            .iter()
            .position(|(key, value)| {
                matches!(key, PropertyKey::LightSetting { zone: 2 })
                    && matches!(
                        value,
                        PropertyValue::Light(s) if s.mode == LightMode::Red
                    )
            })
            .unwrap();
        let resets_before: usize = log[..zone2_test]
            .iter()
            .filter(|(_, value)| {
                matches!(value, PropertyValue::Light(s) if s.mode == LightMode::Off)
            })
            .count();
        // Two boundary resets (before zone 1 and before zone 2), two
        // zones each.
        assert!(resets_before >= 4);
    }
}
