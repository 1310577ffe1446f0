// ── Sweep results ──
//
// Flat map keyed by (zone, mode, level): a re-run over an overlapping
// key space overwrites prior entries rather than appending. Zone-level
// summaries are derived views, never stored.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::executor::CommandStatus;
use crate::model::{ColorRgb, LightMode, TargetId};

use super::plan::SweepUnit;

/// Outcome of one tested unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UnitRecord {
    pub supported: bool,
    pub outcome: CommandStatus,
    /// Channel readback for modes whose realized effect varies run to
    /// run (dynamic RGB, calibrated white).
    pub sample: Option<ColorRgb>,
}

/// Levels a mode was confirmed at, plus its captured sample.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModeSupport {
    pub levels: BTreeSet<u8>,
    pub sample: Option<ColorRgb>,
}

/// Derived per-zone capability summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ZoneCapabilities {
    pub supported_modes: BTreeMap<LightMode, ModeSupport>,
    pub unsupported_modes: BTreeSet<LightMode>,
    pub total_tests: u32,
    pub success_count: u32,
}

/// Accumulated results of one sweep run (possibly partial).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepReport {
    pub target: TargetId,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Whether the run ended on a stop request rather than completion.
    pub stopped_early: bool,
    #[serde(
        serialize_with = "serialize_results",
        deserialize_with = "deserialize_results"
    )]
    pub results: BTreeMap<SweepUnit, UnitRecord>,
}

impl SweepReport {
    pub fn new(target: TargetId) -> Self {
        Self {
            target,
            started_at: Utc::now(),
            finished_at: None,
            stopped_early: false,
            results: BTreeMap::new(),
        }
    }

    /// Record a unit outcome, overwriting any prior entry for the key.
    pub fn record(&mut self, unit: SweepUnit, record: UnitRecord) {
        self.results.insert(unit, record);
    }

    pub fn contains(&self, unit: &SweepUnit) -> bool {
        self.results.contains_key(unit)
    }

    pub fn finish(&mut self, stopped_early: bool) {
        self.finished_at = Some(Utc::now());
        self.stopped_early = stopped_early;
    }

    pub fn total_tests(&self) -> usize {
        self.results.len()
    }

    pub fn success_count(&self) -> usize {
        self.results.values().filter(|r| r.supported).count()
    }

    pub fn zones(&self) -> Vec<u8> {
        let mut zones: Vec<u8> = self.results.keys().map(|u| u.zone).collect();
        zones.sort_unstable();
        zones.dedup();
        zones
    }

    /// Derive the capability summary for one zone.
    ///
    /// A mode is supported if any of its levels confirmed; it is
    /// unsupported only when every tested level failed.
    pub fn zone_summary(&self, zone: u8) -> ZoneCapabilities {
        let mut summary = ZoneCapabilities::default();
        let mut seen: BTreeSet<LightMode> = BTreeSet::new();

        for (unit, record) in self.results.iter().filter(|(u, _)| u.zone == zone) {
            seen.insert(unit.mode);
            summary.total_tests += 1;
            if record.supported {
                summary.success_count += 1;
                let entry = summary.supported_modes.entry(unit.mode).or_default();
                entry.levels.insert(unit.level);
                if entry.sample.is_none() {
                    entry.sample = record.sample;
                }
            }
        }

        for mode in seen {
            if !summary.supported_modes.contains_key(&mode) {
                summary.unsupported_modes.insert(mode);
            }
        }
        summary
    }
}

// ── Wire format ─────────────────────────────────────────────────────
//
// Unit-keyed maps don't survive JSON's string-keyed maps; persist the
// results as a flat entry list instead.

#[derive(Serialize, Deserialize)]
struct UnitEntry {
    zone: u8,
    mode: LightMode,
    level: u8,
    #[serde(flatten)]
    record: UnitRecord,
}

fn serialize_results<S>(
    results: &BTreeMap<SweepUnit, UnitRecord>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    let entries: Vec<UnitEntry> = results
        .iter()
        .map(|(unit, record)| UnitEntry {
            zone: unit.zone,
            mode: unit.mode,
            level: unit.level,
            record: *record,
        })
        .collect();
    serde::Serialize::serialize(&entries, serializer)
}

fn deserialize_results<'de, D>(
    deserializer: D,
) -> Result<BTreeMap<SweepUnit, UnitRecord>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let entries: Vec<UnitEntry> = serde::Deserialize::deserialize(deserializer)?;
    Ok(entries
        .into_iter()
        .map(|e| {
            (
                SweepUnit {
                    zone: e.zone,
                    mode: e.mode,
                    level: e.level,
                },
                e.record,
            )
        })
        .collect())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn unit(zone: u8, mode: LightMode, level: u8) -> SweepUnit {
        SweepUnit { zone, mode, level }
    }

    fn supported() -> UnitRecord {
        UnitRecord {
            supported: true,
            outcome: CommandStatus::Confirmed,
            sample: None,
        }
    }

    fn rolled_back() -> UnitRecord {
        UnitRecord {
            supported: false,
            outcome: CommandStatus::RolledBack,
            sample: None,
        }
    }

    #[test]
    fn rerun_overwrites_instead_of_duplicating() {
        let mut report = SweepReport::new(TargetId::from("spa-1"));
        let key = unit(1, LightMode::Red, 50);

        report.record(key, rolled_back());
        report.record(key, supported());

        assert_eq!(report.total_tests(), 1);
        assert_eq!(report.success_count(), 1);
        let summary = report.zone_summary(1);
        assert!(summary.supported_modes.contains_key(&LightMode::Red));
        assert!(summary.unsupported_modes.is_empty());
    }

    #[test]
    fn zone_summary_partitions_modes() {
        let mut report = SweepReport::new(TargetId::from("spa-1"));
        report.record(unit(1, LightMode::Red, 25), supported());
        report.record(unit(1, LightMode::Red, 50), supported());
        report.record(unit(1, LightMode::Party, 100), rolled_back());
        report.record(unit(2, LightMode::Blue, 50), supported());

        let summary = report.zone_summary(1);
        assert_eq!(summary.total_tests, 3);
        assert_eq!(summary.success_count, 2);
        assert_eq!(
            summary.supported_modes[&LightMode::Red]
                .levels
                .iter()
                .copied()
                .collect::<Vec<u8>>(),
            vec![25, 50]
        );
        assert!(summary.unsupported_modes.contains(&LightMode::Party));
        // Other zones don't leak into this summary.
        assert!(!summary.supported_modes.contains_key(&LightMode::Blue));
    }

    #[test]
    fn mode_with_one_good_level_is_supported() {
        let mut report = SweepReport::new(TargetId::from("spa-1"));
        report.record(unit(1, LightMode::Green, 100), supported());
        report.record(unit(1, LightMode::Green, 25), rolled_back());

        let summary = report.zone_summary(1);
        assert!(summary.supported_modes.contains_key(&LightMode::Green));
        assert!(!summary.unsupported_modes.contains(&LightMode::Green));
    }

    #[test]
    fn report_round_trips_through_json() {
        let mut report = SweepReport::new(TargetId::from("spa-1"));
        report.record(
            unit(1, LightMode::FullDynamicRgb, 100),
            UnitRecord {
                supported: true,
                outcome: CommandStatus::Confirmed,
                sample: Some(ColorRgb::new(85, 85, 85)),
            },
        );
        report.finish(true);

        let json = serde_json::to_string(&report).unwrap();
        let back: SweepReport = serde_json::from_str(&json).unwrap();
        assert!(back.stopped_early);
        assert_eq!(back.results, report.results);
    }
}
