use crate::capture::RaceCapture;
use crate::config::DetectorConfig;
use crate::monitored::{MonitoredValue, ValueId};
use crate::report::RaceReport;
use anyhow::Result;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Per-value race totals
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueRaceStats {
    pub value_id: ValueId,
    pub label: Option<String>,
    pub races: usize,
}

/// Shared destination for everything flagged by values a detector created.
///
/// The per-value ledger lives as long as the detector. Entries are kept after
/// their value is dropped so that race totals remain available for reporting.
pub struct RaceSink {
    capture: Option<Arc<RaceCapture>>,
    stats: DashMap<ValueId, ValueRaceStats>, // value_id -> flagged accesses
}

impl RaceSink {
    fn new(capture: Option<Arc<RaceCapture>>) -> Self {
        Self {
            capture,
            stats: DashMap::new(),
        }
    }

    fn register(&self, value_id: ValueId, label: Option<&str>) {
        self.stats.insert(
            value_id,
            ValueRaceStats {
                value_id,
                label: label.map(str::to_owned),
                races: 0,
            },
        );
    }

    pub(crate) fn record_race(&self, report: RaceReport) {
        self.stats
            .entry(report.value_id)
            .and_modify(|stats| stats.races += 1)
            .or_insert_with(|| ValueRaceStats {
                value_id: report.value_id,
                label: report.label.clone(),
                races: 1,
            });

        if let Some(capture) = &self.capture {
            let report_id = report.id;
            if let Err(e) = capture.capture(report) {
                tracing::warn!(report = %report_id, "Failed to capture race report: {}", e);
            }
        }
    }
}

/// Creates monitored values that share one configuration, report channel and ledger
pub struct Detector {
    config: DetectorConfig,
    capture: Option<Arc<RaceCapture>>,
    sink: Arc<RaceSink>,
}

impl Detector {
    pub fn new(config: DetectorConfig) -> Result<Self> {
        config.validate()?;
        let detector = Self::build(config);
        tracing::info!(
            race_detection = detector.config.race_detection.enabled,
            capture = detector.capture.is_some(),
            "race detector initialized"
        );
        Ok(detector)
    }

    fn build(config: DetectorConfig) -> Self {
        let capture = config
            .capture
            .enabled
            .then(|| Arc::new(RaceCapture::new(config.capture.buffer_size)));
        let sink = Arc::new(RaceSink::new(capture.clone()));

        Self {
            config,
            capture,
            sink,
        }
    }

    /// Wrap `payload` in a value attached to this detector
    pub fn monitor<T>(&self, payload: T) -> MonitoredValue<T> {
        self.attach(payload, None)
    }

    /// Like [`monitor`](Self::monitor), with a label carried into logs and reports
    pub fn monitor_named<T>(&self, label: impl Into<String>, payload: T) -> MonitoredValue<T> {
        self.attach(payload, Some(label.into()))
    }

    fn attach<T>(&self, payload: T, label: Option<String>) -> MonitoredValue<T> {
        let value = MonitoredValue::with_options(
            payload,
            label,
            self.config.race_detection.enabled,
            Some(Arc::clone(&self.sink)),
        );
        self.sink.register(value.id(), value.label());
        value
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Get the report capture, if capture is enabled
    pub fn capture(&self) -> Option<Arc<RaceCapture>> {
        self.capture.clone()
    }

    /// Drain all pending race reports
    pub fn drain_reports(&self) -> Vec<RaceReport> {
        self.capture
            .as_ref()
            .map(|capture| capture.drain())
            .unwrap_or_default()
    }

    /// Race totals for every value this detector ever created, ordered by label then id.
    ///
    /// Values that have since been dropped are still listed.
    pub fn stats(&self) -> Vec<ValueRaceStats> {
        let mut stats: Vec<ValueRaceStats> =
            self.sink.stats.iter().map(|entry| entry.value().clone()).collect();
        stats.sort_by(|a, b| {
            a.label
                .cmp(&b.label)
                .then_with(|| a.value_id.cmp(&b.value_id))
        });
        stats
    }

    pub fn total_races(&self) -> usize {
        self.sink.stats.iter().map(|entry| entry.races).sum()
    }
}

impl Default for Detector {
    fn default() -> Self {
        Self::build(DetectorConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_detector_rejects_invalid_config() {
        let mut config = DetectorConfig::default();
        config.capture.buffer_size = 0;
        assert!(Detector::new(config).is_err());
    }

    #[test]
    fn test_values_are_registered() {
        let detector = Detector::default();
        let _b = detector.monitor_named("b", 1);
        let _a = detector.monitor_named("a", 2);

        let stats = detector.stats();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].label.as_deref(), Some("a"));
        assert_eq!(stats[1].label.as_deref(), Some("b"));
        assert!(stats.iter().all(|s| s.races == 0));
    }

    #[test]
    fn test_races_reach_ledger_and_capture() {
        let detector = Detector::default();
        let value = detector.monitor_named("balance", 0);
        value.write(1);
        thread::scope(|scope| {
            scope.spawn(|| value.write(2));
        });

        assert_eq!(detector.total_races(), 1);
        assert_eq!(detector.stats()[0].races, 1);

        let reports = detector.drain_reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].label.as_deref(), Some("balance"));
        assert_eq!(reports[0].value_id, value.id());
    }

    #[test]
    fn test_ledger_outlives_dropped_values() {
        let detector = Detector::default();
        let value = detector.monitor_named("transient", 0);
        let value_id = value.id();
        value.write(1);
        thread::scope(|scope| {
            scope.spawn(|| value.write(2));
        });
        drop(value);

        let stats = detector.stats();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].value_id, value_id);
        assert_eq!(stats[0].races, 1);
        assert_eq!(detector.total_races(), 1);
    }

    #[test]
    fn test_capture_disabled() {
        let mut config = DetectorConfig::default();
        config.capture.enabled = false;
        let detector = Detector::new(config).unwrap();
        let value = detector.monitor(0);
        value.write(1);
        thread::scope(|scope| {
            scope.spawn(|| value.write(2));
        });

        assert!(detector.capture().is_none());
        assert!(detector.drain_reports().is_empty());
        assert_eq!(detector.total_races(), 1);
        assert_eq!(value.race_count(), 1);
    }

    #[test]
    fn test_detection_disabled() {
        let mut config = DetectorConfig::default();
        config.race_detection.enabled = false;
        let detector = Detector::new(config).unwrap();
        let value = detector.monitor(0);
        value.write(1);
        thread::scope(|scope| {
            scope.spawn(|| value.write(2));
        });

        assert_eq!(value.read(), 2);
        assert!(value.clock().is_empty());
        assert_eq!(value.race_count(), 0);
        assert_eq!(detector.total_races(), 0);
    }
}
