// ── Sweep planning ──
//
// Expands the capability space into a fixed unit order. The off mode is
// tested only at level 0; every other mode skips level 0 as redundant
// (an accepted mode at zero brightness proves nothing the off test
// doesn't).

use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

use crate::model::{LightMode, TargetId};

/// Intensity levels exercised per mode.
pub const DEFAULT_LEVELS: [u8; 4] = [100, 25, 50, 75];

/// One (zone, mode, level) test in the sweep.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
)]
pub struct SweepUnit {
    pub zone: u8,
    pub mode: LightMode,
    pub level: u8,
}

impl std::fmt::Display for SweepUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "zone {} {} @ {}%", self.zone, self.mode, self.level)
    }
}

/// The full, ordered unit list for one sweep run.
#[derive(Debug, Clone)]
pub struct SweepPlan {
    pub target: TargetId,
    pub zones: Vec<u8>,
    pub units: Vec<SweepUnit>,
}

impl SweepPlan {
    /// Build a plan over explicit modes and levels, in fixed order:
    /// zones ascending, then modes as given, then levels as given.
    pub fn build(
        target: TargetId,
        zones: &[u8],
        modes: &[LightMode],
        levels: &[u8],
    ) -> Self {
        let mut sorted_zones: Vec<u8> = zones.to_vec();
        sorted_zones.sort_unstable();
        sorted_zones.dedup();

        let mut units = Vec::new();
        for &zone in &sorted_zones {
            for &mode in modes {
                if mode == LightMode::Off {
                    units.push(SweepUnit {
                        zone,
                        mode,
                        level: 0,
                    });
                    continue;
                }
                for &level in levels {
                    if level == 0 {
                        continue;
                    }
                    units.push(SweepUnit { zone, mode, level });
                }
            }
        }

        Self {
            target,
            zones: sorted_zones,
            units,
        }
    }

    /// A plan over every known mode at the default levels.
    pub fn full(target: TargetId, zones: &[u8]) -> Self {
        let modes: Vec<LightMode> = LightMode::iter().collect();
        Self::build(target, zones, &modes, &DEFAULT_LEVELS)
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn off_mode_tested_only_at_zero() {
        let plan = SweepPlan::build(
            TargetId::from("spa-1"),
            &[1],
            &[LightMode::Off, LightMode::Red],
            &DEFAULT_LEVELS,
        );
        let off_units: Vec<&SweepUnit> = plan
            .units
            .iter()
            .filter(|u| u.mode == LightMode::Off)
            .collect();
        assert_eq!(off_units.len(), 1);
        assert_eq!(off_units[0].level, 0);
    }

    #[test]
    fn level_zero_skipped_for_other_modes() {
        let plan = SweepPlan::build(
            TargetId::from("spa-1"),
            &[1],
            &[LightMode::Red],
            &[0, 25, 50],
        );
        assert_eq!(plan.units.len(), 2);
        assert!(plan.units.iter().all(|u| u.level != 0));
    }

    #[test]
    fn zones_ordered_and_deduped() {
        let plan = SweepPlan::build(
            TargetId::from("spa-1"),
            &[2, 1, 2],
            &[LightMode::Red],
            &[50],
        );
        assert_eq!(plan.zones, vec![1, 2]);
        assert_eq!(plan.units.len(), 2);
        assert!(plan.units[0].zone < plan.units[1].zone);
    }

    #[test]
    fn full_plan_covers_every_mode() {
        let plan = SweepPlan::full(TargetId::from("spa-1"), &[1]);
        // 17 non-off modes x 4 levels + 1 off unit.
        assert_eq!(plan.units.len(), 17 * 4 + 1);
    }
}
