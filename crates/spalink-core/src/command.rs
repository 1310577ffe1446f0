// ── Command API ──
//
// All write intents flow through a unified `Command` enum, whether they
// arrive from the bus, the CLI, or the dashboard. The bridge routes
// each variant to the executor (single verified write) or the sweep
// engine (long-running background run).

use serde::{Deserialize, Serialize};

use crate::executor::CommandOutcome;
use crate::model::{ColorRgb, HeatMode, LightMode};

/// All supported write operations against a spa.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "command")]
pub enum Command {
    SetPumpState {
        pump_id: String,
        on: bool,
    },
    SetLightMode {
        zone: u8,
        mode: LightMode,
        /// Defaults to 0 for the off mode, 50 otherwise.
        intensity: Option<u8>,
    },
    SetLightColor {
        zone: u8,
        color: ColorRgb,
    },
    SetLightBrightness {
        zone: u8,
        percent: u8,
    },
    SetTargetTemperature {
        celsius: f64,
    },
    SetHeatMode {
        mode: HeatMode,
    },
    StartSweep {
        /// Seed from persisted results and skip recorded units.
        resume: bool,
    },
    StopSweep,
}

impl Command {
    /// Effective intensity for a mode write.
    pub fn default_intensity(mode: LightMode) -> u8 {
        if mode == LightMode::Off { 0 } else { 50 }
    }
}

/// What a routed command produced.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandResult {
    /// A verified single write with its terminal outcome.
    Executed(CommandOutcome),
    SweepStarted,
    SweepStopRequested,
}
