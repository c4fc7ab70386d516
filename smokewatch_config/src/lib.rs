#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the smoke monitor.
//!
//! - `Config` and its sections are deserialized from TOML and validated.
//! - Every section has defaults, so a file only needs `[[channels]]`
//!   (or `monitor.default_channel`) to be usable.
use serde::Deserialize;
use std::collections::HashSet;

/// Upper bound on `monitor.retention_days` (100 years).
pub const MAX_RETENTION_DAYS: u32 = 36_500;

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Serial {
    /// Device path of the sensor board, e.g. /dev/ttyUSB1
    pub port: String,
    pub baud: u32,
    /// Max time a single line read may block (ms)
    pub read_timeout_ms: u64,
}

impl Default for Serial {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB1".to_string(),
            baud: 115_200,
            read_timeout_ms: 1000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Storage {
    /// SQLite database holding readings, statistics, alerts and settings
    pub db_path: String,
}

impl Default for Storage {
    fn default() -> Self {
        Self {
            db_path: "smoke_detector.db".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MonitorCfg {
    /// Polling period of the main loop (ms)
    pub tick_ms: u64,
    /// Baseline recompute interval (s)
    pub recompute_interval_s: u64,
    /// Raw readings older than this are purged after each recompute
    pub retention_days: u32,
    /// |z| must exceed this for a wavelength to count as triggered
    pub z_threshold: f64,
    /// Uptime after which the process hands back to its supervisor (s); 0 disables
    pub uptime_budget_s: u64,
    /// Channel assumed for frames that carry no CH field (single-channel boards)
    pub default_channel: Option<u32>,
    /// Warn once a wavelength baseline went this many recomputes without samples; 0 disables
    pub stale_baseline_warn_cycles: u32,
}

impl Default for MonitorCfg {
    fn default() -> Self {
        Self {
            tick_ms: 1000,
            recompute_interval_s: 3 * 60,
            retention_days: 30,
            z_threshold: 5.0,
            uptime_budget_s: 10 * 60 * 60,
            default_channel: None,
            stale_baseline_warn_cycles: 10,
        }
    }
}

/// One physical channel tag mapped to the logical unit it monitors.
#[derive(Debug, Deserialize, Clone)]
pub struct ChannelEntry {
    pub tag: u32,
    pub unit: String,
}

/// Values seeded into the settings table when a key is absent.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct SettingsDefaults {
    pub email_enabled: bool,
    pub auto_shutdown_enabled: bool,
    /// Comma-separated list
    pub email_recipients: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Notify {
    pub sender: String,
    pub sendmail_path: String,
}

impl Default for Notify {
    fn default() -> Self {
        Self {
            sender: "no-reply@localhost".to_string(),
            sendmail_path: "/usr/sbin/sendmail".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub serial: Serial,
    pub storage: Storage,
    pub monitor: MonitorCfg,
    pub channels: Vec<ChannelEntry>,
    pub defaults: SettingsDefaults,
    pub notify: Notify,
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Read, parse and validate a config file.
pub fn load_file(path: &std::path::Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read config {}: {e}", path.display()))?;
    let cfg = load_toml(&text).map_err(|e| eyre::eyre!("parse config {}: {e}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

impl Config {
    /// Unit mapped to `tag`, if any.
    pub fn unit_for(&self, tag: u32) -> Option<&str> {
        self.channels
            .iter()
            .find(|c| c.tag == tag)
            .map(|c| c.unit.as_str())
    }

    pub fn validate(&self) -> eyre::Result<()> {
        // Serial
        if self.serial.port.trim().is_empty() {
            eyre::bail!("serial.port must not be empty");
        }
        if self.serial.baud == 0 {
            eyre::bail!("serial.baud must be > 0");
        }
        if self.serial.read_timeout_ms == 0 {
            eyre::bail!("serial.read_timeout_ms must be >= 1");
        }

        // Storage
        if self.storage.db_path.trim().is_empty() {
            eyre::bail!("storage.db_path must not be empty");
        }

        // Monitor
        let m = &self.monitor;
        if m.tick_ms == 0 {
            eyre::bail!("monitor.tick_ms must be >= 1");
        }
        if m.tick_ms > 60_000 {
            eyre::bail!("monitor.tick_ms is unreasonably large (>60s)");
        }
        if self.serial.read_timeout_ms > m.tick_ms.saturating_mul(5) {
            eyre::bail!("serial.read_timeout_ms must be <= 5 * monitor.tick_ms");
        }
        if m.recompute_interval_s == 0 {
            eyre::bail!("monitor.recompute_interval_s must be >= 1");
        }
        if m.retention_days == 0 {
            eyre::bail!("monitor.retention_days must be >= 1");
        }
        if m.retention_days > MAX_RETENTION_DAYS {
            eyre::bail!("monitor.retention_days must be <= {MAX_RETENTION_DAYS}");
        }
        if !(m.z_threshold.is_finite() && m.z_threshold > 0.0) {
            eyre::bail!("monitor.z_threshold must be > 0");
        }

        // Channels
        if self.channels.is_empty() {
            eyre::bail!("channels must map at least one tag to a unit");
        }
        let mut tags = HashSet::new();
        let mut units = HashSet::new();
        for c in &self.channels {
            if c.unit.trim().is_empty() {
                eyre::bail!("channels: tag {} has an empty unit", c.tag);
            }
            if !tags.insert(c.tag) {
                eyre::bail!("channels: duplicate tag {}", c.tag);
            }
            if !units.insert(c.unit.trim()) {
                eyre::bail!("channels: unit '{}' is mapped twice", c.unit);
            }
        }
        if let Some(tag) = m.default_channel
            && self.unit_for(tag).is_none()
        {
            eyre::bail!("monitor.default_channel {tag} is not listed in channels");
        }

        // Notify
        if self.notify.sendmail_path.trim().is_empty() {
            eyre::bail!("notify.sendmail_path must not be empty");
        }

        // Logging
        if let Some(r) = self.logging.rotation.as_deref()
            && !matches!(r, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_takes_documented_defaults() {
        let cfg = load_toml("").unwrap();
        assert_eq!(cfg.serial.baud, 115_200);
        assert_eq!(cfg.monitor.recompute_interval_s, 180);
        assert_eq!(cfg.monitor.retention_days, 30);
        assert_eq!(cfg.monitor.uptime_budget_s, 36_000);
        assert!((cfg.monitor.z_threshold - 5.0).abs() < f64::EPSILON);
        assert!(!cfg.defaults.email_enabled);
    }

    #[test]
    fn unit_lookup_by_tag() {
        let cfg = load_toml(
            r#"
[[channels]]
tag = 1
unit = "atlaspc1"

[[channels]]
tag = 2
unit = "atlaspc2"
"#,
        )
        .unwrap();
        assert_eq!(cfg.unit_for(2), Some("atlaspc2"));
        assert_eq!(cfg.unit_for(9), None);
    }
}
