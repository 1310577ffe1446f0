// YAML-backed capability map.
//
// Structured as device -> zone -> mode -> { levels, sample }, with the
// flat unit results kept alongside for sweep resume. Saves merge into
// the existing document so one spa's re-run never clobbers another's
// results.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use spalink_core::model::TargetId;
use spalink_core::sweep::{SweepReport, SweepStore, ZoneCapabilities};
use spalink_core::CoreError;

/// On-disk document.
#[derive(Debug, Default, Serialize, Deserialize)]
struct CapabilityDocument {
    #[serde(default)]
    devices: BTreeMap<String, DeviceEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct DeviceEntry {
    updated_at: DateTime<Utc>,
    stopped_early: bool,
    /// Human-consumable summary per zone.
    zones: BTreeMap<u8, ZoneCapabilities>,
    /// Flat unit results, used to resume a partial sweep.
    results: SweepReport,
}

/// File store satisfying the engine's read-for-resume and
/// write-on-completion needs.
pub struct YamlCapabilityStore {
    path: PathBuf,
}

impl YamlCapabilityStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    async fn read_document(&self) -> Result<CapabilityDocument, CoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => serde_yaml::from_str(&text).map_err(|e| {
                CoreError::Internal(format!("capability map unreadable: {e}"))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(CapabilityDocument::default())
            }
            Err(e) => Err(CoreError::Internal(format!(
                "cannot read capability map: {e}"
            ))),
        }
    }
}

#[async_trait]
impl SweepStore for YamlCapabilityStore {
    async fn load(&self, target: &TargetId) -> Result<Option<SweepReport>, CoreError> {
        let document = self.read_document().await?;
        let report = document
            .devices
            .get(target.as_str())
            .map(|entry| entry.results.clone());
        debug!(
            target = %target,
            found = report.is_some(),
            "capability map lookup"
        );
        Ok(report)
    }

    async fn save(&self, report: &SweepReport) -> Result<(), CoreError> {
        let mut document = self.read_document().await.unwrap_or_default();

        let zones = report
            .zones()
            .into_iter()
            .map(|zone| (zone, report.zone_summary(zone)))
            .collect();
        document.devices.insert(
            report.target.to_string(),
            DeviceEntry {
                updated_at: Utc::now(),
                stopped_early: report.stopped_early,
                zones,
                results: report.clone(),
            },
        );

        let text = serde_yaml::to_string(&document)
            .map_err(|e| CoreError::Internal(format!("capability map serialization: {e}")))?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CoreError::Internal(format!("cannot create {}: {e}", parent.display())))?;
        }
        tokio::fs::write(&self.path, text)
            .await
            .map_err(|e| CoreError::Internal(format!("cannot write capability map: {e}")))?;
        info!(path = %self.path.display(), units = report.total_tests(), "capability map saved");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use spalink_core::CommandStatus;
    use spalink_core::model::LightMode;
    use spalink_core::sweep::{SweepUnit, UnitRecord};

    fn report_for(target: &str, mode: LightMode, supported: bool) -> SweepReport {
        let mut report = SweepReport::new(TargetId::from(target));
        report.record(
            SweepUnit {
                zone: 1,
                mode,
                level: 50,
            },
            UnitRecord {
                supported,
                outcome: if supported {
                    CommandStatus::Confirmed
                } else {
                    CommandStatus::RolledBack
                },
                sample: None,
            },
        );
        report.finish(false);
        report
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = YamlCapabilityStore::new(dir.path().join("capabilities.yaml"));

        let report = report_for("spa-1", LightMode::Red, true);
        store.save(&report).await.unwrap();

        let loaded = store.load(&TargetId::from("spa-1")).await.unwrap().unwrap();
        assert_eq!(loaded.total_tests(), 1);
        assert!(loaded.results.values().all(|r| r.supported));
    }

    #[tokio::test]
    async fn missing_file_loads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = YamlCapabilityStore::new(dir.path().join("missing.yaml"));
        assert!(store.load(&TargetId::from("spa-1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_merges_per_device() {
        let dir = tempfile::tempdir().unwrap();
        let store = YamlCapabilityStore::new(dir.path().join("capabilities.yaml"));

        store
            .save(&report_for("spa-1", LightMode::Red, true))
            .await
            .unwrap();
        store
            .save(&report_for("spa-2", LightMode::Blue, false))
            .await
            .unwrap();

        // Both devices present; spa-1 untouched by spa-2's save.
        let one = store.load(&TargetId::from("spa-1")).await.unwrap().unwrap();
        let two = store.load(&TargetId::from("spa-2")).await.unwrap().unwrap();
        assert_eq!(one.success_count(), 1);
        assert_eq!(two.success_count(), 0);
    }

    #[tokio::test]
    async fn resave_overwrites_same_device() {
        let dir = tempfile::tempdir().unwrap();
        let store = YamlCapabilityStore::new(dir.path().join("capabilities.yaml"));

        store
            .save(&report_for("spa-1", LightMode::Red, false))
            .await
            .unwrap();
        store
            .save(&report_for("spa-1", LightMode::Red, true))
            .await
            .unwrap();

        let loaded = store.load(&TargetId::from("spa-1")).await.unwrap().unwrap();
        assert_eq!(loaded.total_tests(), 1);
        assert_eq!(loaded.success_count(), 1);
    }
}
