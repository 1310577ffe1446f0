// ── Sweep progress tracking ──
//
// Read-mostly snapshot the dashboard and bus publisher can poll without
// touching engine locks, plus a watch channel for push consumers. The
// engine is the only writer.

use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::Serialize;
use strum::Display;
use tokio::sync::watch;

use crate::sweep::SweepUnit;

/// Coarse phase of the running sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SweepPhase {
    Idle,
    Running,
    /// Paused for a rate-limit backoff window.
    CoolingDown,
    /// Forcing zones to neutral between phases.
    Resetting,
    /// Restoring pre-sweep state after completion or stop.
    Restoring,
    Completed,
    Stopped,
}

/// Point-in-time view of sweep progress.
#[derive(Debug, Clone, Serialize)]
pub struct SweepProgress {
    pub phase: SweepPhase,
    pub total_units: usize,
    pub completed_units: usize,
    /// completed / total, 0-100.
    pub percent: u8,
    pub current_unit: Option<SweepUnit>,
}

impl SweepProgress {
    fn idle() -> Self {
        Self {
            phase: SweepPhase::Idle,
            total_units: 0,
            completed_units: 0,
            percent: 0,
            current_unit: None,
        }
    }
}

/// Tracks unit-level progress of the capability sweep.
pub struct ProgressTracker {
    snapshot: ArcSwap<SweepProgress>,
    tx: watch::Sender<Arc<SweepProgress>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        let initial = Arc::new(SweepProgress::idle());
        let (tx, _) = watch::channel(Arc::clone(&initial));
        Self {
            snapshot: ArcSwap::new(initial),
            tx,
        }
    }

    /// Current progress (cheap, lock-free).
    pub fn snapshot(&self) -> Arc<SweepProgress> {
        self.snapshot.load_full()
    }

    /// Subscribe to progress pushes.
    pub fn subscribe(&self) -> watch::Receiver<Arc<SweepProgress>> {
        self.tx.subscribe()
    }

    // ── Engine-side events ──────────────────────────────────────────

    pub fn begin(&self, total_units: usize) {
        self.publish(SweepProgress {
            phase: SweepPhase::Running,
            total_units,
            completed_units: 0,
            percent: 0,
            current_unit: None,
        });
    }

    pub fn unit_started(&self, unit: SweepUnit) {
        let mut next = (*self.snapshot()).clone();
        next.phase = SweepPhase::Running;
        next.current_unit = Some(unit);
        self.publish(next);
    }

    /// Recompute percentage on every unit completion.
    pub fn unit_completed(&self) {
        let mut next = (*self.snapshot()).clone();
        next.completed_units += 1;
        next.percent = percent(next.completed_units, next.total_units);
        next.current_unit = None;
        self.publish(next);
    }

    pub fn phase_changed(&self, phase: SweepPhase) {
        let mut next = (*self.snapshot()).clone();
        next.phase = phase;
        if matches!(phase, SweepPhase::Completed | SweepPhase::Stopped) {
            next.current_unit = None;
        }
        self.publish(next);
    }

    fn publish(&self, progress: SweepProgress) {
        let shared = Arc::new(progress);
        self.snapshot.store(Arc::clone(&shared));
        let _ = self.tx.send(shared);
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[allow(clippy::cast_possible_truncation)]
fn percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    ((completed * 100) / total).min(100) as u8
}
