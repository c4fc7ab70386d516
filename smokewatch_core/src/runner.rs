//! Paced loop around `Monitor::tick`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::error::Result;
use crate::monitor::Monitor;
use crate::status::{StopReason, TickStatus};

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    pub reason: StopReason,
    pub ticks: u64,
    pub uptime: Duration,
}

/// Time left in the tick after `elapsed` was spent working; never negative.
#[inline]
fn sleep_budget(tick: Duration, elapsed: Duration) -> Duration {
    tick.saturating_sub(elapsed)
}

/// Tick `monitor` until it stops or `shutdown` is raised.
///
/// The link is released and `monitoring_active` cleared on every exit path,
/// including errors.
pub fn run(monitor: &mut Monitor, shutdown: &AtomicBool) -> Result<RunOutcome> {
    if let Err(e) = monitor.start() {
        monitor.finish();
        return Err(e);
    }
    let clock = monitor.clock().clone();
    let tick = monitor.params().tick;
    let mut ticks: u64 = 0;

    let reason = loop {
        if shutdown.load(Ordering::Relaxed) {
            tracing::info!("shutdown requested");
            break StopReason::Interrupted;
        }
        let began = clock.now();
        match monitor.tick() {
            Ok(TickStatus::Stopped(reason)) => break reason,
            Ok(_) => {}
            Err(e) => {
                tracing::error!(error = %e, ticks, "monitor loop aborted");
                monitor.finish();
                return Err(e);
            }
        }
        ticks += 1;
        clock.sleep(sleep_budget(
            tick,
            clock.now().saturating_duration_since(began),
        ));
    };

    let uptime = monitor.uptime();
    monitor.finish();
    tracing::info!(reason = %reason, ticks, uptime_s = uptime.as_secs(), "monitor loop ended");
    Ok(RunOutcome {
        reason,
        ticks,
        uptime,
    })
}

#[cfg(test)]
mod tests {
    use super::sleep_budget;
    use std::time::Duration;

    #[test]
    fn budget_is_remainder_of_tick() {
        let tick = Duration::from_millis(1000);
        assert_eq!(
            sleep_budget(tick, Duration::from_millis(300)),
            Duration::from_millis(700)
        );
        assert_eq!(sleep_budget(tick, Duration::from_millis(1500)), Duration::ZERO);
    }
}
