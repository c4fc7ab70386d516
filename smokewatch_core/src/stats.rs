//! Rolling per-channel baselines.
//!
//! Samples accumulate between recomputes; a recompute replaces each
//! wavelength's baseline with the population mean/std of its non-missing
//! samples. Recompute is two-phase (`prepare_recompute` then
//! `commit_recompute`) so the caller can persist the result first and leave
//! the buffers untouched when that fails.

use std::time::{Duration, Instant};

use crate::wavelength::{PerWavelength, Wavelength};

/// Mean and population standard deviation characterizing normal readings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Baseline {
    pub mean: f64,
    pub std: f64,
}

impl Baseline {
    /// Signed distance of `value` from the mean in standard deviations.
    /// Undefined when the spread is zero.
    pub fn z_score(&self, value: f64) -> Option<f64> {
        if self.std == 0.0 || !self.std.is_finite() {
            return None;
        }
        Some((value - self.mean) / self.std)
    }
}

/// Population mean/std over the non-NaN entries of `samples`.
/// Returns `None` when there is nothing to average.
pub fn population_baseline(samples: &[f64]) -> Option<Baseline> {
    let (n, sum) = samples
        .iter()
        .filter(|v| !v.is_nan())
        .fold((0usize, 0.0f64), |(n, s), v| (n + 1, s + v));
    if n == 0 {
        return None;
    }
    let count = n as f64;
    let mean = sum / count;
    let sq = samples
        .iter()
        .filter(|v| !v.is_nan())
        .map(|v| (v - mean) * (v - mean))
        .sum::<f64>();
    Some(Baseline {
        mean,
        std: (sq / count).sqrt(),
    })
}

/// Result of `prepare_recompute`, applied by `commit_recompute`.
#[derive(Debug, Clone, PartialEq)]
pub struct RecomputePlan {
    /// Baselines after the recompute: fresh where samples existed, previous otherwise.
    pub baselines: PerWavelength<Option<Baseline>>,
    /// Which wavelengths got a new baseline this cycle.
    pub fresh: PerWavelength<bool>,
}

#[derive(Debug)]
pub struct ChannelStats {
    buffers: PerWavelength<Vec<f64>>,
    baselines: PerWavelength<Option<Baseline>>,
    empty_cycles: PerWavelength<u32>,
    last_recompute: Instant,
    interval: Duration,
    recomputes: u64,
}

impl ChannelStats {
    pub fn new(now: Instant, interval: Duration) -> Self {
        Self {
            buffers: PerWavelength::default(),
            baselines: PerWavelength::default(),
            empty_cycles: PerWavelength::default(),
            last_recompute: now,
            interval,
            recomputes: 0,
        }
    }

    /// Append one reading; absent wavelengths are buffered as NaN.
    pub fn record(&mut self, values: &PerWavelength<Option<u32>>) {
        for w in Wavelength::ALL {
            let v = values[w].map_or(f64::NAN, f64::from);
            self.buffers[w].push(v);
        }
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_recompute) >= self.interval
    }

    /// Time left until the next recompute is due (zero once due).
    pub fn time_until_recompute(&self, now: Instant) -> Duration {
        self.interval
            .saturating_sub(now.saturating_duration_since(self.last_recompute))
    }

    pub fn prepare_recompute(&self) -> RecomputePlan {
        let fresh_baselines = self.buffers.map(|_, buf| population_baseline(buf));
        RecomputePlan {
            baselines: PerWavelength::from_fn(|w| fresh_baselines[w].or(self.baselines[w])),
            fresh: fresh_baselines.map(|_, b| b.is_some()),
        }
    }

    /// Install `plan`, clear every buffer and restart the interval at `now`.
    /// Returns the wavelengths whose baseline has now gone `stale_warn_cycles`
    /// recomputes without a fresh sample (0 disables the check).
    pub fn commit_recompute(
        &mut self,
        plan: RecomputePlan,
        now: Instant,
        stale_warn_cycles: u32,
    ) -> Vec<Wavelength> {
        let mut stale = Vec::new();
        for w in Wavelength::ALL {
            self.buffers[w].clear();
            if plan.fresh[w] {
                self.empty_cycles[w] = 0;
            } else if self.baselines[w].is_some() {
                self.empty_cycles[w] = self.empty_cycles[w].saturating_add(1);
                if stale_warn_cycles > 0 && self.empty_cycles[w] == stale_warn_cycles {
                    stale.push(w);
                }
            }
            // A set baseline is never cleared: plan carries the previous one forward
            if plan.baselines[w].is_some() {
                self.baselines[w] = plan.baselines[w];
            }
        }
        self.last_recompute = now;
        self.recomputes += 1;
        stale
    }

    pub fn baselines(&self) -> &PerWavelength<Option<Baseline>> {
        &self.baselines
    }

    pub fn baseline(&self, w: Wavelength) -> Option<Baseline> {
        self.baselines[w]
    }

    /// All three baselines are set.
    pub fn is_calibrated(&self) -> bool {
        self.baselines.all(Option::is_some)
    }

    pub fn buffered(&self, w: Wavelength) -> usize {
        self.buffers[w].len()
    }

    pub fn empty_cycles(&self, w: Wavelength) -> u32 {
        self.empty_cycles[w]
    }

    pub fn recomputes(&self) -> u64 {
        self.recomputes
    }

    pub fn last_recompute(&self) -> Instant {
        self.last_recompute
    }
}
