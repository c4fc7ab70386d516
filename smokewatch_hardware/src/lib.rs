pub mod error;
#[cfg(all(feature = "hardware", unix))]
pub mod serial;
pub mod util;

#[cfg(all(feature = "hardware", unix))]
pub use serial::SerialLink;

use smokewatch_traits::{BoxError, FrameSource, ShutdownHook};
use std::time::Duration;

/// Simulated sensor board.
///
/// Emits one data frame per read, cycling through `tags`, with a small
/// deterministic wobble around fixed levels. Every 30th line is a `STATUS`
/// heartbeat. With `spike_after` set, all three wavelengths jump far above
/// their levels from that line on.
pub struct SimulatedLink {
    tags: Vec<u32>,
    lines: u64,
    spike_after: Option<u64>,
}

impl SimulatedLink {
    pub fn new(tags: Vec<u32>) -> Self {
        SimulatedLink {
            tags,
            lines: 0,
            spike_after: None,
        }
    }

    pub fn with_spike_after(mut self, lines: u64) -> Self {
        self.spike_after = Some(lines);
        self
    }

    fn next_line(&mut self) -> String {
        let n = self.lines;
        self.lines += 1;
        if n % 30 == 29 {
            let presence: Vec<String> = self.tags.iter().map(|t| format!("CH{t}:1")).collect();
            return format!("STATUS;{}", presence.join(";"));
        }
        let tag = self.tags[(n as usize) % self.tags.len().max(1)];
        let wobble = ((n * 7) % 11) as i64 - 5;
        let gain = match self.spike_after {
            Some(after) if n >= after => 10,
            _ => 1,
        };
        let level = |base: i64| (base + wobble) * gain;
        format!(
            "CH:{tag};R:{};G:{};IR:{}",
            level(1200),
            level(900),
            level(1500)
        )
    }
}

impl FrameSource for SimulatedLink {
    fn read_line(&mut self, _timeout: Duration) -> Result<Option<String>, BoxError> {
        if self.tags.is_empty() {
            return Ok(None);
        }
        let line = self.next_line();
        tracing::trace!(line = %line, "simulated frame");
        Ok(Some(line))
    }
}

/// Power-supply control for a unit under burn-in.
///
/// The bench supply is not wired to this host, so the shutdown is logged
/// for the operator and reported as done.
#[derive(Debug, Default)]
pub struct LoggedPowerSupply {
    shutdowns: u32,
}

impl LoggedPowerSupply {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shutdowns(&self) -> u32 {
        self.shutdowns
    }
}

impl ShutdownHook for LoggedPowerSupply {
    fn shutdown(&mut self, unit: &str) -> Result<(), BoxError> {
        self.shutdowns += 1;
        tracing::error!(unit, "POWER SUPPLY SHUTDOWN INITIATED");
        Ok(())
    }
}
