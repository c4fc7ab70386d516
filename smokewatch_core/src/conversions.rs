//! `From` implementations bridging `smokewatch_config` types to runtime types.

use std::time::Duration;

use chrono::TimeDelta;

use crate::config::MonitorParams;
use crate::registry::ChannelMap;
use crate::settings::SettingsSeed;

impl From<&smokewatch_config::Config> for MonitorParams {
    fn from(c: &smokewatch_config::Config) -> Self {
        let m = &c.monitor;
        Self {
            tick: Duration::from_millis(m.tick_ms),
            read_timeout: Duration::from_millis(c.serial.read_timeout_ms),
            recompute_interval: Duration::from_secs(m.recompute_interval_s),
            retention: TimeDelta::days(i64::from(m.retention_days)),
            z_threshold: m.z_threshold,
            uptime_budget: (m.uptime_budget_s > 0).then(|| Duration::from_secs(m.uptime_budget_s)),
            default_channel: m.default_channel,
            stale_warn_cycles: m.stale_baseline_warn_cycles,
        }
    }
}

impl From<&[smokewatch_config::ChannelEntry]> for ChannelMap {
    fn from(entries: &[smokewatch_config::ChannelEntry]) -> Self {
        entries.iter().map(|e| (e.tag, e.unit.clone())).collect()
    }
}

impl From<&smokewatch_config::SettingsDefaults> for SettingsSeed {
    fn from(d: &smokewatch_config::SettingsDefaults) -> Self {
        Self {
            email_enabled: d.email_enabled,
            auto_shutdown_enabled: d.auto_shutdown_enabled,
            email_recipients: d.email_recipients.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_runtime_defaults() {
        let cfg = smokewatch_config::Config::default();
        assert_eq!(MonitorParams::from(&cfg), MonitorParams::default());
    }

    #[test]
    fn zero_budget_disables_restart() {
        let mut cfg = smokewatch_config::Config::default();
        cfg.monitor.uptime_budget_s = 0;
        assert_eq!(MonitorParams::from(&cfg).uptime_budget, None);
    }

    #[test]
    fn channel_table_converts() {
        let entries = vec![
            smokewatch_config::ChannelEntry {
                tag: 1,
                unit: "atlaspc1".into(),
            },
            smokewatch_config::ChannelEntry {
                tag: 4,
                unit: "atlaspc4".into(),
            },
        ];
        let map = ChannelMap::from(entries.as_slice());
        assert_eq!(map.resolve(4), Ok("atlaspc4"));
        assert_eq!(map.len(), 2);
    }
}
