//! In-memory stand-ins for the external collaborators.
//!
//! Every mock is a cheap `Clone` handle over shared state, so a test can hand
//! one copy to the `Monitor` and keep another to script input or inspect
//! what was written.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use smokewatch_traits::{BoxError, FrameSource, Notifier, Priority, ShutdownHook};

use crate::store::{AlertRecord, ReadingRecord, SettingsSource, StatisticsRecord, Store};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn injected(what: &str) -> BoxError {
    Box::new(std::io::Error::other(format!("injected {what} failure")))
}

/// Which `MemoryStore` operations should fail.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreFaults {
    pub readings: bool,
    pub statistics: bool,
    pub alerts: bool,
    pub settings_load: bool,
    pub settings_put: bool,
    pub retention: bool,
}

#[derive(Debug, Default)]
struct MemoryInner {
    readings: Vec<ReadingRecord>,
    statistics: Vec<StatisticsRecord>,
    alerts: Vec<AlertRecord>,
    settings: BTreeMap<String, String>,
    faults: StoreFaults,
    deletes: Vec<(String, u32, DateTime<Utc>)>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_faults(&self, faults: StoreFaults) {
        lock(&self.inner).faults = faults;
    }

    /// Operator-side write, bypassing fault injection.
    pub fn set(&self, key: &str, value: &str) {
        lock(&self.inner)
            .settings
            .insert(key.to_string(), value.to_string());
    }

    pub fn setting(&self, key: &str) -> Option<String> {
        lock(&self.inner).settings.get(key).cloned()
    }

    pub fn readings(&self) -> Vec<ReadingRecord> {
        lock(&self.inner).readings.clone()
    }

    pub fn statistics(&self) -> Vec<StatisticsRecord> {
        lock(&self.inner).statistics.clone()
    }

    pub fn alerts(&self) -> Vec<AlertRecord> {
        lock(&self.inner).alerts.clone()
    }

    /// Every retention request seen, in order.
    pub fn deletes(&self) -> Vec<(String, u32, DateTime<Utc>)> {
        lock(&self.inner).deletes.clone()
    }
}

impl SettingsSource for MemoryStore {
    fn load_settings(&mut self) -> Result<BTreeMap<String, String>, BoxError> {
        let g = lock(&self.inner);
        if g.faults.settings_load {
            return Err(injected("settings load"));
        }
        Ok(g.settings.clone())
    }

    fn put_setting(&mut self, key: &str, value: &str) -> Result<(), BoxError> {
        let mut g = lock(&self.inner);
        if g.faults.settings_put {
            return Err(injected("settings write"));
        }
        g.settings.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

impl Store for MemoryStore {
    fn append_reading(&mut self, row: &ReadingRecord) -> Result<(), BoxError> {
        let mut g = lock(&self.inner);
        if g.faults.readings {
            return Err(injected("reading append"));
        }
        g.readings.push(row.clone());
        Ok(())
    }

    fn append_statistics(&mut self, row: &StatisticsRecord) -> Result<(), BoxError> {
        let mut g = lock(&self.inner);
        if g.faults.statistics {
            return Err(injected("statistics append"));
        }
        g.statistics.push(row.clone());
        Ok(())
    }

    fn append_alert(&mut self, row: &AlertRecord) -> Result<(), BoxError> {
        let mut g = lock(&self.inner);
        if g.faults.alerts {
            return Err(injected("alert append"));
        }
        g.alerts.push(row.clone());
        Ok(())
    }

    fn delete_readings_before(
        &mut self,
        unit: &str,
        channel: u32,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, BoxError> {
        let mut g = lock(&self.inner);
        g.deletes.push((unit.to_string(), channel, cutoff));
        if g.faults.retention {
            return Err(injected("retention"));
        }
        let before = g.readings.len();
        g.readings
            .retain(|r| !(r.unit == unit && r.channel == channel && r.timestamp < cutoff));
        Ok(before - g.readings.len())
    }

    fn latest_statistics(
        &mut self,
        unit: &str,
        channel: u32,
    ) -> Result<Option<StatisticsRecord>, BoxError> {
        Ok(lock(&self.inner)
            .statistics
            .iter()
            .filter(|s| s.unit == unit && s.channel == channel)
            .max_by_key(|s| s.timestamp)
            .cloned())
    }

    fn recent_alerts(
        &mut self,
        unit: Option<&str>,
        limit: usize,
    ) -> Result<Vec<AlertRecord>, BoxError> {
        let g = lock(&self.inner);
        let mut out: Vec<_> = g
            .alerts
            .iter()
            .filter(|a| unit.is_none_or(|u| a.unit == u))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        out.truncate(limit);
        Ok(out)
    }

    fn recent_readings(
        &mut self,
        unit: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ReadingRecord>, BoxError> {
        let g = lock(&self.inner);
        let mut out: Vec<_> = g
            .readings
            .iter()
            .filter(|r| r.unit == unit && r.timestamp >= since)
            .cloned()
            .collect();
        out.sort_by_key(|r| r.timestamp);
        Ok(out)
    }

    fn active_units(&mut self) -> Result<Vec<(String, u32)>, BoxError> {
        let g = lock(&self.inner);
        let set: BTreeSet<_> = g
            .readings
            .iter()
            .map(|r| (r.unit.clone(), r.channel))
            .collect();
        Ok(set.into_iter().collect())
    }
}

enum Scripted {
    Line(String),
    Silence,
    Error(String),
}

/// Frame source fed from a script; reads past the end report silence.
#[derive(Clone, Default)]
pub struct ScriptedLink {
    script: Arc<Mutex<VecDeque<Scripted>>>,
    closed: Arc<AtomicBool>,
}

impl ScriptedLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_line(&self, line: impl Into<String>) {
        lock(&self.script).push_back(Scripted::Line(line.into()));
    }

    pub fn push_silence(&self) {
        lock(&self.script).push_back(Scripted::Silence);
    }

    pub fn push_error(&self, msg: impl Into<String>) {
        lock(&self.script).push_back(Scripted::Error(msg.into()));
    }

    pub fn pending(&self) -> usize {
        lock(&self.script).len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl FrameSource for ScriptedLink {
    fn read_line(&mut self, _timeout: Duration) -> Result<Option<String>, BoxError> {
        match lock(&self.script).pop_front() {
            Some(Scripted::Line(l)) => Ok(Some(l)),
            Some(Scripted::Silence) | None => Ok(None),
            Some(Scripted::Error(m)) => Err(Box::new(std::io::Error::other(m))),
        }
    }

    fn close(&mut self) -> Result<(), BoxError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub subject: String,
    pub body: String,
    pub priority: Priority,
    pub recipients: Vec<String>,
}

/// Notifier that records every send; can be told to fail.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<SentMessage>>>,
    fail: Arc<AtomicBool>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        lock(&self.sent).clone()
    }
}

impl Notifier for RecordingNotifier {
    fn send(
        &mut self,
        subject: &str,
        body: &str,
        priority: Priority,
        recipients: &[String],
    ) -> Result<Vec<String>, BoxError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(injected("mail"));
        }
        lock(&self.sent).push(SentMessage {
            subject: subject.to_string(),
            body: body.to_string(),
            priority,
            recipients: recipients.to_vec(),
        });
        Ok(recipients.to_vec())
    }
}

/// Shutdown hook that records which units were powered down.
#[derive(Clone, Default)]
pub struct RecordingShutdown {
    units: Arc<Mutex<Vec<String>>>,
}

impl RecordingShutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn units(&self) -> Vec<String> {
        lock(&self.units).clone()
    }
}

impl ShutdownHook for RecordingShutdown {
    fn shutdown(&mut self, unit: &str) -> Result<(), BoxError> {
        lock(&self.units).push(unit.to_string());
        Ok(())
    }
}
