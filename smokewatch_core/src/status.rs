//! Outcome of one monitor tick.

use std::time::Duration;

use crate::alert::Severity;

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// `monitoring_active` was switched off by an operator.
    Disabled,
    /// A CRITICAL alert with auto-shutdown switched monitoring off.
    CriticalShutdown,
    /// The uptime budget ran out; the supervisor should start a fresh process.
    UptimeExpired,
    /// Ctrl-C or SIGTERM.
    Interrupted,
}

impl StopReason {
    pub fn as_str(self) -> &'static str {
        match self {
            StopReason::Disabled => "disabled",
            StopReason::CriticalShutdown => "critical_shutdown",
            StopReason::UptimeExpired => "uptime_expired",
            StopReason::Interrupted => "interrupted",
        }
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickStatus {
    /// The loop must end.
    Stopped(StopReason),
    /// No usable frame this tick.
    Idle,
    /// A frame was recorded for a channel that has no full baseline yet.
    Calibrating {
        unit: String,
        channel: u32,
        remaining: Duration,
    },
    /// A frame was evaluated; `alerts` lists what fired, possibly nothing.
    Monitoring {
        unit: String,
        channel: u32,
        alerts: Vec<Severity>,
    },
}
