#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! SQLite persistence for the smoke monitor.
//!
//! One file holds the append-only `readings`, `statistics` and `alerts` logs
//! plus the `settings` key/value table shared with operators. Timestamps are
//! RFC 3339 UTC text with fixed microsecond precision so they sort as strings.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use smokewatch_core::stats::Baseline;
use smokewatch_core::store::{
    AlertRecord, ReadingRecord, SettingsSource, StatisticsRecord, Store,
};
use smokewatch_core::{PerWavelength, Severity, Wavelength};
use smokewatch_traits::BoxError;
use thiserror::Error;

pub mod schema;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Row totals, for health reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableCounts {
    pub readings: u64,
    pub statistics: u64,
    pub alerts: u64,
}

pub struct SqliteStore {
    conn: Connection,
    path: String,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

fn ts_text(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn ts_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn baseline_columns(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Baseline>> {
    let mean: Option<f64> = row.get(idx)?;
    let std: Option<f64> = row.get(idx + 1)?;
    Ok(mean.zip(std).map(|(mean, std)| Baseline { mean, std }))
}

fn reading_row(row: &Row<'_>) -> rusqlite::Result<ReadingRecord> {
    Ok(ReadingRecord {
        timestamp: ts_column(row, 0)?,
        unit: row.get(1)?,
        channel: row.get(2)?,
        values: PerWavelength::new(row.get(3)?, row.get(4)?, row.get(5)?),
    })
}

fn statistics_row(row: &Row<'_>) -> rusqlite::Result<StatisticsRecord> {
    Ok(StatisticsRecord {
        timestamp: ts_column(row, 0)?,
        unit: row.get(1)?,
        channel: row.get(2)?,
        baselines: PerWavelength::new(
            baseline_columns(row, 3)?,
            baseline_columns(row, 5)?,
            baseline_columns(row, 7)?,
        ),
    })
}

fn alert_row(row: &Row<'_>) -> rusqlite::Result<AlertRecord> {
    let severity: String = row.get(3)?;
    let severity: Severity = severity
        .parse()
        .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, e.into()))?;
    Ok(AlertRecord {
        timestamp: ts_column(row, 0)?,
        unit: row.get(1)?,
        channel: row.get(2)?,
        severity,
        message: row.get(4)?,
        values: PerWavelength::new(row.get(5)?, row.get(6)?, row.get(7)?),
        z_scores: PerWavelength::new(row.get(8)?, row.get(9)?, row.get(10)?),
    })
}

const ALERT_COLUMNS: &str = "timestamp, unit, channel, severity, message, \
     R_value, G_value, IR_value, R_zscore, G_zscore, IR_zscore";

impl SqliteStore {
    /// Open or create the database at `path`, creating parent directories
    /// and the schema as needed. File databases use WAL journaling.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        tracing::debug!(path = %path.display(), journal_mode = %mode, "database opened");
        Self::init(conn, path.display().to_string())
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?, ":memory:".to_string())
    }

    fn init(conn: Connection, path: String) -> Result<Self, StoreError> {
        // Operators edit settings from a second process while the monitor runs
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(schema::SCHEMA)?;
        Ok(Self { conn, path })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn journal_mode(&self) -> Result<String, StoreError> {
        Ok(self
            .conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))?)
    }

    pub fn table_counts(&self) -> Result<TableCounts, StoreError> {
        let count = |table: &str| -> Result<u64, StoreError> {
            let n: i64 = self
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
            Ok(u64::try_from(n).unwrap_or_default())
        };
        Ok(TableCounts {
            readings: count("readings")?,
            statistics: count("statistics")?,
            alerts: count("alerts")?,
        })
    }

    pub fn get_setting(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn all_settings(&self) -> Result<BTreeMap<String, String>, StoreError> {
        let mut stmt = self.conn.prepare_cached("SELECT key, value FROM settings")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    fn insert_reading(&self, r: &ReadingRecord) -> Result<(), StoreError> {
        use smokewatch_core::Wavelength::{Green, Infrared, Red};
        self.conn
            .prepare_cached(
                "INSERT INTO readings (timestamp, unit, channel, R, G, IR) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?
            .execute(params![
                ts_text(r.timestamp),
                r.unit,
                r.channel,
                r.values[Red],
                r.values[Green],
                r.values[Infrared],
            ])?;
        Ok(())
    }

    fn insert_statistics(&self, s: &StatisticsRecord) -> Result<(), StoreError> {
        use smokewatch_core::Wavelength::{Green, Infrared, Red};
        let mean = |w: Wavelength| s.baselines[w].map(|b| b.mean);
        let std = |w: Wavelength| s.baselines[w].map(|b| b.std);
        self.conn
            .prepare_cached(
                "INSERT INTO statistics \
                 (timestamp, unit, channel, R_mean, R_std, G_mean, G_std, IR_mean, IR_std) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?
            .execute(params![
                ts_text(s.timestamp),
                s.unit,
                s.channel,
                mean(Red),
                std(Red),
                mean(Green),
                std(Green),
                mean(Infrared),
                std(Infrared),
            ])?;
        Ok(())
    }

    fn insert_alert(&self, a: &AlertRecord) -> Result<(), StoreError> {
        use smokewatch_core::Wavelength::{Green, Infrared, Red};
        self.conn
            .prepare_cached(&format!(
                "INSERT INTO alerts ({ALERT_COLUMNS}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
            ))?
            .execute(params![
                ts_text(a.timestamp),
                a.unit,
                a.channel,
                a.severity.as_str(),
                a.message,
                a.values[Red],
                a.values[Green],
                a.values[Infrared],
                a.z_scores[Red],
                a.z_scores[Green],
                a.z_scores[Infrared],
            ])?;
        Ok(())
    }

    fn prune_readings(
        &self,
        unit: &str,
        channel: u32,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        Ok(self.conn.execute(
            "DELETE FROM readings WHERE unit = ?1 AND channel = ?2 AND timestamp < ?3",
            params![unit, channel, ts_text(cutoff)],
        )?)
    }

    fn query_latest_statistics(
        &self,
        unit: &str,
        channel: u32,
    ) -> Result<Option<StatisticsRecord>, StoreError> {
        Ok(self
            .conn
            .query_row(
                "SELECT timestamp, unit, channel, R_mean, R_std, G_mean, G_std, IR_mean, IR_std \
                 FROM statistics WHERE unit = ?1 AND channel = ?2 \
                 ORDER BY timestamp DESC, id DESC LIMIT 1",
                params![unit, channel],
                statistics_row,
            )
            .optional()?)
    }

    fn query_recent_alerts(
        &self,
        unit: Option<&str>,
        limit: usize,
    ) -> Result<Vec<AlertRecord>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {ALERT_COLUMNS} FROM alerts \
             WHERE ?1 IS NULL OR unit = ?1 \
             ORDER BY timestamp DESC, id DESC LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![unit, limit], alert_row)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    fn query_recent_readings(
        &self,
        unit: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ReadingRecord>, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT timestamp, unit, channel, R, G, IR FROM readings \
             WHERE unit = ?1 AND timestamp >= ?2 ORDER BY timestamp, id",
        )?;
        let rows = stmt.query_map(params![unit, ts_text(since)], reading_row)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    fn query_active_units(&self) -> Result<Vec<(String, u32)>, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT DISTINCT unit, channel FROM readings ORDER BY unit, channel",
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }
}

impl SettingsSource for SqliteStore {
    fn load_settings(&mut self) -> Result<BTreeMap<String, String>, BoxError> {
        Ok(self.all_settings()?)
    }

    fn put_setting(&mut self, key: &str, value: &str) -> Result<(), BoxError> {
        Ok(self.set_setting(key, value)?)
    }
}

impl Store for SqliteStore {
    fn append_reading(&mut self, row: &ReadingRecord) -> Result<(), BoxError> {
        Ok(self.insert_reading(row)?)
    }

    fn append_statistics(&mut self, row: &StatisticsRecord) -> Result<(), BoxError> {
        Ok(self.insert_statistics(row)?)
    }

    fn append_alert(&mut self, row: &AlertRecord) -> Result<(), BoxError> {
        Ok(self.insert_alert(row)?)
    }

    fn delete_readings_before(
        &mut self,
        unit: &str,
        channel: u32,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, BoxError> {
        Ok(self.prune_readings(unit, channel, cutoff)?)
    }

    fn latest_statistics(
        &mut self,
        unit: &str,
        channel: u32,
    ) -> Result<Option<StatisticsRecord>, BoxError> {
        Ok(self.query_latest_statistics(unit, channel)?)
    }

    fn recent_alerts(
        &mut self,
        unit: Option<&str>,
        limit: usize,
    ) -> Result<Vec<AlertRecord>, BoxError> {
        Ok(self.query_recent_alerts(unit, limit)?)
    }

    fn recent_readings(
        &mut self,
        unit: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ReadingRecord>, BoxError> {
        Ok(self.query_recent_readings(unit, since)?)
    }

    fn active_units(&mut self) -> Result<Vec<(String, u32)>, BoxError> {
        Ok(self.query_active_units()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamps_sort_as_text() {
        let a = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let b = a + chrono::TimeDelta::milliseconds(1);
        assert!(ts_text(a) < ts_text(b));
        assert_eq!(ts_text(a), "2024-01-02T03:04:05.000000Z");
    }

    #[test]
    fn schema_is_idempotent() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.conn.execute_batch(schema::SCHEMA).unwrap();
        assert_eq!(store.table_counts().unwrap(), TableCounts::default());
    }
}
