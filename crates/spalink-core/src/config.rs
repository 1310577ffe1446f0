// ── Runtime bridge configuration ──
//
// Describes *how* the bridge runs: polling cadence, throttle tuning,
// sweep pacing. Carries no credentials and never touches disk -- the
// binary builds one from the file config and hands it in.

use std::time::Duration;

use crate::sweep::{DEFAULT_LEVELS, SweepSettings};

/// Tuning for one bridge instance.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Full state poll cadence.
    pub poll_interval: Duration,
    /// How long the cloud needs to reflect a confirmed command before
    /// the expedited post-command poll is worth issuing.
    pub propagation_delay: Duration,
    /// Consecutive poll failures before the bridge flips to
    /// reconnecting and forces a recovery republish on next success.
    pub reconnect_failure_threshold: u32,
    /// Base throttle backoff window (doubles per consecutive throttle).
    pub throttle_base: Duration,
    /// Backoff ceiling.
    pub throttle_cap: Duration,
    /// Sweep pacing.
    pub sweep: SweepSettings,
    /// Intensity levels the sweep exercises per mode.
    pub sweep_levels: Vec<u8>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            propagation_delay: Duration::from_millis(2500),
            reconnect_failure_threshold: 3,
            throttle_base: Duration::from_secs(5),
            throttle_cap: Duration::from_secs(300),
            sweep: SweepSettings::default(),
            sweep_levels: DEFAULT_LEVELS.to_vec(),
        }
    }
}
