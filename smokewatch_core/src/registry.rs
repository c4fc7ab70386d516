//! Tag-to-unit mapping and the sole owner of per-channel state.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::error::MonitorError;
use crate::stats::ChannelStats;

/// Static channel tag → unit table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelMap {
    units: BTreeMap<u32, String>,
}

impl ChannelMap {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, tag: u32, unit: impl Into<String>) -> Self {
        self.units.insert(tag, unit.into());
        self
    }

    pub fn resolve(&self, tag: u32) -> Result<&str, MonitorError> {
        self.units
            .get(&tag)
            .map(String::as_str)
            .ok_or(MonitorError::UnmappedChannel { tag })
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.units.iter().map(|(t, u)| (*t, u.as_str()))
    }
}

impl FromIterator<(u32, String)> for ChannelMap {
    fn from_iter<I: IntoIterator<Item = (u32, String)>>(iter: I) -> Self {
        Self {
            units: iter.into_iter().collect(),
        }
    }
}

/// Everything the monitor keeps about one physical channel.
#[derive(Debug)]
pub struct ChannelState {
    pub unit: String,
    pub channel: u32,
    pub stats: ChannelStats,
}

impl ChannelState {
    pub(crate) fn new(unit: String, channel: u32, now: Instant, interval: Duration) -> Self {
        Self {
            unit,
            channel,
            stats: ChannelStats::new(now, interval),
        }
    }
}

#[derive(Debug)]
pub struct ChannelRegistry {
    map: ChannelMap,
    states: BTreeMap<u32, ChannelState>,
    interval: Duration,
}

impl ChannelRegistry {
    pub fn new(map: ChannelMap, recompute_interval: Duration) -> Self {
        Self {
            map,
            states: BTreeMap::new(),
            interval: recompute_interval,
        }
    }

    /// State for `tag`, created on first sight. Unmapped tags are a
    /// configuration fault and are returned as errors, never dropped.
    pub fn dispatch(&mut self, tag: u32, now: Instant) -> Result<&mut ChannelState, MonitorError> {
        let unit = self.map.resolve(tag)?;
        let interval = self.interval;
        let state = self.states.entry(tag).or_insert_with(|| {
            tracing::info!(unit, channel = tag, "new channel registered");
            ChannelState::new(unit.to_string(), tag, now, interval)
        });
        Ok(state)
    }

    pub fn map(&self) -> &ChannelMap {
        &self.map
    }

    pub fn get(&self, tag: u32) -> Option<&ChannelState> {
        self.states.get(&tag)
    }

    /// Channels seen so far, in tag order.
    pub fn channels(&self) -> impl Iterator<Item = &ChannelState> {
        self.states.values()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
