//! Persistence seam: row types and the `Store` / `SettingsSource` traits.
//!
//! Implemented over SQLite by `smokewatch_store` and in memory by
//! `mocks::MemoryStore`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use smokewatch_traits::BoxError;

use crate::alert::Severity;
use crate::stats::Baseline;
use crate::wavelength::PerWavelength;

#[derive(Debug, Clone, PartialEq)]
pub struct ReadingRecord {
    pub timestamp: DateTime<Utc>,
    pub unit: String,
    pub channel: u32,
    pub values: PerWavelength<Option<u32>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatisticsRecord {
    pub timestamp: DateTime<Utc>,
    pub unit: String,
    pub channel: u32,
    pub baselines: PerWavelength<Option<Baseline>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlertRecord {
    pub timestamp: DateTime<Utc>,
    pub unit: String,
    pub channel: u32,
    pub severity: Severity,
    pub message: String,
    pub values: PerWavelength<Option<u32>>,
    pub z_scores: PerWavelength<Option<f64>>,
}

/// Count, newest values and per-wavelength mean over a window of readings.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReadingSummary {
    pub count: usize,
    pub latest: Option<DateTime<Utc>>,
    pub last_values: PerWavelength<Option<u32>>,
    pub means: PerWavelength<Option<f64>>,
}

impl ReadingSummary {
    /// `rows` oldest first, as `Store::recent_readings` returns them.
    pub fn from_rows(rows: &[ReadingRecord]) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let means = PerWavelength::from_fn(|w| {
            let present: Vec<f64> = rows
                .iter()
                .filter_map(|r| r.values[w])
                .map(f64::from)
                .collect();
            (!present.is_empty()).then(|| present.iter().sum::<f64>() / present.len() as f64)
        });
        let last = rows.last();
        Self {
            count: rows.len(),
            latest: last.map(|r| r.timestamp),
            last_values: last.map(|r| r.values).unwrap_or_default(),
            means,
        }
    }
}

/// Flat key/value settings shared with operators.
pub trait SettingsSource {
    fn load_settings(&mut self) -> Result<BTreeMap<String, String>, BoxError>;
    fn put_setting(&mut self, key: &str, value: &str) -> Result<(), BoxError>;
}

/// Append-only log of readings, statistics and alerts.
pub trait Store: SettingsSource {
    fn append_reading(&mut self, row: &ReadingRecord) -> Result<(), BoxError>;
    fn append_statistics(&mut self, row: &StatisticsRecord) -> Result<(), BoxError>;
    fn append_alert(&mut self, row: &AlertRecord) -> Result<(), BoxError>;

    /// Remove readings of one channel older than `cutoff`; returns rows deleted.
    fn delete_readings_before(
        &mut self,
        unit: &str,
        channel: u32,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, BoxError>;

    fn latest_statistics(
        &mut self,
        unit: &str,
        channel: u32,
    ) -> Result<Option<StatisticsRecord>, BoxError>;

    /// Newest first.
    fn recent_alerts(
        &mut self,
        unit: Option<&str>,
        limit: usize,
    ) -> Result<Vec<AlertRecord>, BoxError>;

    /// Oldest first.
    fn recent_readings(
        &mut self,
        unit: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ReadingRecord>, BoxError>;

    /// Distinct `(unit, channel)` pairs that have logged readings.
    fn active_units(&mut self) -> Result<Vec<(String, u32)>, BoxError>;
}

impl<T: SettingsSource + ?Sized> SettingsSource for Box<T> {
    fn load_settings(&mut self) -> Result<BTreeMap<String, String>, BoxError> {
        (**self).load_settings()
    }
    fn put_setting(&mut self, key: &str, value: &str) -> Result<(), BoxError> {
        (**self).put_setting(key, value)
    }
}

impl<T: Store + ?Sized> Store for Box<T> {
    fn append_reading(&mut self, row: &ReadingRecord) -> Result<(), BoxError> {
        (**self).append_reading(row)
    }
    fn append_statistics(&mut self, row: &StatisticsRecord) -> Result<(), BoxError> {
        (**self).append_statistics(row)
    }
    fn append_alert(&mut self, row: &AlertRecord) -> Result<(), BoxError> {
        (**self).append_alert(row)
    }
    fn delete_readings_before(
        &mut self,
        unit: &str,
        channel: u32,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, BoxError> {
        (**self).delete_readings_before(unit, channel, cutoff)
    }
    fn latest_statistics(
        &mut self,
        unit: &str,
        channel: u32,
    ) -> Result<Option<StatisticsRecord>, BoxError> {
        (**self).latest_statistics(unit, channel)
    }
    fn recent_alerts(
        &mut self,
        unit: Option<&str>,
        limit: usize,
    ) -> Result<Vec<AlertRecord>, BoxError> {
        (**self).recent_alerts(unit, limit)
    }
    fn recent_readings(
        &mut self,
        unit: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ReadingRecord>, BoxError> {
        (**self).recent_readings(unit, since)
    }
    fn active_units(&mut self) -> Result<Vec<(String, u32)>, BoxError> {
        (**self).active_units()
    }
}
