//! Runtime parameters for the monitor loop.
//!
//! Separate from the TOML schema in `smokewatch_config`; see `conversions`.

use std::time::Duration;

use chrono::TimeDelta;

#[derive(Debug, Clone, PartialEq)]
pub struct MonitorParams {
    /// Loop period.
    pub tick: Duration,
    /// Longest a single read may block.
    pub read_timeout: Duration,
    /// Minimum time between baseline recomputes of one channel.
    pub recompute_interval: Duration,
    /// Readings older than this are pruned after a recompute.
    pub retention: TimeDelta,
    /// |z| must be strictly above this to alert.
    pub z_threshold: f64,
    /// `None` disables the scheduled restart.
    pub uptime_budget: Option<Duration>,
    /// Tag assumed for frames without `CH`.
    pub default_channel: Option<u32>,
    /// Warn once a baseline has gone this many recomputes without data; 0 disables.
    pub stale_warn_cycles: u32,
}

impl Default for MonitorParams {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
            read_timeout: Duration::from_secs(1),
            recompute_interval: Duration::from_secs(180),
            retention: TimeDelta::days(30),
            z_threshold: 5.0,
            uptime_budget: Some(Duration::from_secs(10 * 60 * 60)),
            default_channel: None,
            stale_warn_cycles: 10,
        }
    }
}
