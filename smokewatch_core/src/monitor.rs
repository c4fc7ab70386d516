//! The per-tick engine: settings reload, read, dispatch, recompute, evaluate.
//!
//! One `Monitor` owns the link, the store seam, the notifier, the shutdown
//! hook and the channel registry. `tick()` performs exactly one iteration;
//! pacing lives in `runner::run`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use smokewatch_traits::clock::{Clock, MonotonicClock};
use smokewatch_traits::{FrameSource, Notifier, ShutdownHook};

use crate::alert::{self, Alert, Severity};
use crate::config::MonitorParams;
use crate::error::{BuildError, MonitorError, Result};
use crate::frame;
use crate::hw_error::map_hw_error;
use crate::registry::{ChannelMap, ChannelRegistry};
use crate::settings::{self, Settings};
use crate::stats::Baseline;
use crate::status::{StopReason, TickStatus};
use crate::store::{AlertRecord, ReadingRecord, StatisticsRecord, Store};
use crate::util::{ceil_secs, to_utc};
use crate::wavelength::PerWavelength;

pub struct Monitor {
    link: Box<dyn FrameSource>,
    store: Box<dyn Store>,
    notifier: Box<dyn Notifier>,
    hook: Box<dyn ShutdownHook>,
    registry: ChannelRegistry,
    params: MonitorParams,
    clock: Arc<dyn Clock + Send + Sync>,
    started: Instant,
    settings: Settings,
    shutdown_requested: bool,
    finished: bool,
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("channels", &self.registry.len())
            .field("params", &self.params)
            .field("settings", &self.settings)
            .field("shutdown_requested", &self.shutdown_requested)
            .finish_non_exhaustive()
    }
}

impl Monitor {
    pub fn builder() -> MonitorBuilder {
        MonitorBuilder::default()
    }

    /// Mark monitoring active and take the first settings snapshot.
    /// Restarts the uptime budget.
    pub fn start(&mut self) -> Result<()> {
        self.started = self.clock.now();
        self.finished = false;
        self.shutdown_requested = false;
        self.store
            .put_setting(settings::MONITORING_ACTIVE, settings::format_bool(true))
            .map_err(|e| eyre::Report::new(MonitorError::Store(e.to_string())))?;
        self.settings = Settings::load(self.store.as_mut())
            .map_err(|e| eyre::Report::new(MonitorError::Store(e.to_string())))?;
        tracing::info!(
            channels = self.registry.map().len(),
            budget_s = self.params.uptime_budget.map(|d| d.as_secs()),
            "monitoring started"
        );
        Ok(())
    }

    /// One loop iteration. `Err` is reserved for faults that must stop the
    /// loop (an unmapped channel); transient faults are logged and absorbed.
    pub fn tick(&mut self) -> Result<TickStatus> {
        self.reload_settings();

        if self.shutdown_requested {
            return Ok(TickStatus::Stopped(StopReason::CriticalShutdown));
        }
        if !self.settings.monitoring_active {
            tracing::info!("monitoring disabled in settings");
            return Ok(TickStatus::Stopped(StopReason::Disabled));
        }
        if let Some(budget) = self.params.uptime_budget
            && self.uptime() >= budget
        {
            tracing::info!(
                uptime_s = self.uptime().as_secs(),
                "uptime budget reached; handing back for restart"
            );
            return Ok(TickStatus::Stopped(StopReason::UptimeExpired));
        }

        let line = match self.link.read_line(self.params.read_timeout) {
            Ok(Some(line)) => line,
            Ok(None) => return Ok(TickStatus::Idle),
            Err(e) => {
                let err = map_hw_error(&*e);
                tracing::warn!(error = %err, "serial read failed");
                return Ok(TickStatus::Idle);
            }
        };
        self.process_line(&line)
    }

    /// Run one raw line through parse → dispatch → record → recompute → evaluate.
    pub fn process_line(&mut self, line: &str) -> Result<TickStatus> {
        let Some(frame) = frame::parse_frame(line) else {
            return Ok(TickStatus::Idle);
        };
        let Some(tag) = frame.channel.or(self.params.default_channel) else {
            tracing::debug!(raw = line, "frame without channel tag dropped");
            return Ok(TickStatus::Idle);
        };
        if frame.is_empty() {
            tracing::debug!(channel = tag, "every sensor reported absent; frame dropped");
            return Ok(TickStatus::Idle);
        }

        let now = self.clock.now();
        let wall = to_utc(self.clock.wall());
        let state = match self.registry.dispatch(tag, now) {
            Ok(state) => state,
            Err(e) => {
                tracing::error!(channel = tag, raw = line, "frame from unmapped channel");
                return Err(eyre::Report::new(e));
            }
        };
        let span = tracing::info_span!("channel", unit = %state.unit, channel = tag);
        let _enter = span.enter();

        let reading = ReadingRecord {
            timestamp: wall,
            unit: state.unit.clone(),
            channel: tag,
            values: frame.values,
        };
        if let Err(e) = self.store.append_reading(&reading) {
            tracing::warn!(error = %e, "failed to log reading");
        }
        state.stats.record(&frame.values);

        if state.stats.is_due(now) {
            let plan = state.stats.prepare_recompute();
            let row = StatisticsRecord {
                timestamp: wall,
                unit: state.unit.clone(),
                channel: tag,
                baselines: plan.baselines,
            };
            match self.store.append_statistics(&row) {
                Ok(()) => {
                    let was_calibrated = state.stats.is_calibrated();
                    let stale =
                        state
                            .stats
                            .commit_recompute(plan, now, self.params.stale_warn_cycles);
                    for w in stale {
                        tracing::warn!(
                            wavelength = %w,
                            cycles = state.stats.empty_cycles(w),
                            "no fresh samples for this wavelength; keeping previous baseline"
                        );
                    }
                    tracing::info!(
                        baselines = %describe_baselines(state.stats.baselines()),
                        "statistics updated"
                    );
                    if !was_calibrated && state.stats.is_calibrated() {
                        tracing::info!("channel calibrated; alerting enabled");
                    }
                    prune_readings(
                        self.store.as_mut(),
                        &state.unit,
                        tag,
                        wall.checked_sub_signed(self.params.retention),
                    );
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to persist statistics; retrying next tick");
                }
            }
        }

        if !state.stats.is_calibrated() {
            let remaining = state.stats.time_until_recompute(now);
            tracing::info!(remaining_s = ceil_secs(remaining), "calibrating");
            return Ok(TickStatus::Calibrating {
                unit: state.unit.clone(),
                channel: tag,
                remaining,
            });
        }

        let alerts = alert::evaluate(
            &frame.values,
            state.stats.baselines(),
            self.params.z_threshold,
        );
        let unit = state.unit.clone();
        for a in &alerts {
            self.handle_alert(&unit, tag, &frame.values, a, wall);
        }
        Ok(TickStatus::Monitoring {
            unit,
            channel: tag,
            alerts: alerts.iter().map(|a| a.severity).collect(),
        })
    }

    fn handle_alert(
        &mut self,
        unit: &str,
        channel: u32,
        values: &PerWavelength<Option<u32>>,
        alert: &Alert,
        wall: DateTime<Utc>,
    ) {
        let row = AlertRecord {
            timestamp: wall,
            unit: unit.to_string(),
            channel,
            severity: alert.severity,
            message: alert.message().to_string(),
            values: *values,
            z_scores: alert.z_scores,
        };
        if let Err(e) = self.store.append_alert(&row) {
            tracing::error!(error = %e, severity = %alert.severity, "failed to persist alert");
        }

        match alert.severity {
            Severity::Warning => tracing::warn!(
                severity = %alert.severity,
                values = ?values,
                z_scores = ?alert.z_scores,
                triggered = ?alert.triggered,
                "{}",
                alert.message()
            ),
            Severity::Critical => tracing::error!(
                severity = %alert.severity,
                values = ?values,
                z_scores = ?alert.z_scores,
                triggered = ?alert.triggered,
                "{}",
                alert.message()
            ),
        }

        self.notify(unit, channel, alert);

        if alert.severity == Severity::Critical {
            if self.settings.auto_shutdown_enabled {
                self.shutdown_unit(unit);
            } else {
                tracing::warn!("auto shutdown disabled; burn-in continues");
            }
        }
    }

    /// Send the alert to the configured recipients. Returns who accepted it;
    /// empty when email is off or delivery failed.
    fn notify(&mut self, unit: &str, channel: u32, alert: &Alert) -> Vec<String> {
        let recipients = self.settings.notification_recipients();
        if recipients.is_empty() {
            tracing::debug!("email disabled or no recipients; notification skipped");
            return Vec::new();
        }
        let body = alert.notification_body(unit, channel);
        match self
            .notifier
            .send(alert.subject(), &body, alert.priority(), recipients)
        {
            Ok(accepted) => {
                tracing::info!(recipients = ?accepted, "notification sent");
                accepted
            }
            Err(e) => {
                tracing::warn!(error = %e, "notification failed");
                Vec::new()
            }
        }
    }

    fn shutdown_unit(&mut self, unit: &str) {
        if let Err(e) = self
            .store
            .put_setting(settings::MONITORING_ACTIVE, settings::format_bool(false))
        {
            tracing::error!(error = %e, "failed to persist monitoring_active=false");
        }
        self.settings.monitoring_active = false;
        self.settings.raw.insert(
            settings::MONITORING_ACTIVE.to_string(),
            settings::format_bool(false).to_string(),
        );
        self.shutdown_requested = true;
        if let Err(e) = self.hook.shutdown(unit) {
            tracing::error!(error = %e, "shutdown hook failed");
        }
    }

    fn reload_settings(&mut self) {
        match Settings::load(self.store.as_mut()) {
            Ok(s) => self.settings = s,
            Err(e) => tracing::warn!(error = %e, "settings reload failed; keeping previous values"),
        }
    }

    /// Release the link and mark monitoring inactive. Safe to call twice.
    pub fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        if let Err(e) = self.link.close() {
            tracing::warn!(error = %e, "failed to close serial link");
        }
        if let Err(e) = self
            .store
            .put_setting(settings::MONITORING_ACTIVE, settings::format_bool(false))
        {
            tracing::warn!(error = %e, "failed to persist monitoring_active=false");
        }
        self.settings.monitoring_active = false;
    }

    pub fn uptime(&self) -> Duration {
        self.clock.now().saturating_duration_since(self.started)
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn params(&self) -> &MonitorParams {
        &self.params
    }

    pub fn clock(&self) -> &Arc<dyn Clock + Send + Sync> {
        &self.clock
    }
}

fn prune_readings(
    store: &mut dyn Store,
    unit: &str,
    channel: u32,
    cutoff: Option<DateTime<Utc>>,
) {
    let Some(cutoff) = cutoff else {
        tracing::warn!("retention window reaches past the earliest timestamp; skipping cleanup");
        return;
    };
    match store.delete_readings_before(unit, channel, cutoff) {
        Ok(0) => {}
        Ok(n) => tracing::debug!(deleted = n, %cutoff, "pruned old readings"),
        Err(e) => tracing::warn!(error = %e, "retention cleanup failed"),
    }
}

fn describe_baselines(baselines: &PerWavelength<Option<Baseline>>) -> String {
    baselines
        .iter()
        .map(|(w, b)| match b {
            Some(b) => format!("{w}={:.2}±{:.2}", b.mean, b.std),
            None => format!("{w}=unset"),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Builder for `Monitor`. Link, store, notifier, shutdown hook and a
/// non-empty channel map are required.
#[derive(Default)]
pub struct MonitorBuilder {
    link: Option<Box<dyn FrameSource>>,
    store: Option<Box<dyn Store>>,
    notifier: Option<Box<dyn Notifier>>,
    hook: Option<Box<dyn ShutdownHook>>,
    channels: Option<ChannelMap>,
    params: Option<MonitorParams>,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
}

impl MonitorBuilder {
    #[must_use]
    pub fn with_link(mut self, link: impl FrameSource + 'static) -> Self {
        self.link = Some(Box::new(link));
        self
    }

    #[must_use]
    pub fn with_store(mut self, store: impl Store + 'static) -> Self {
        self.store = Some(Box::new(store));
        self
    }

    #[must_use]
    pub fn with_notifier(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifier = Some(Box::new(notifier));
        self
    }

    #[must_use]
    pub fn with_shutdown_hook(mut self, hook: impl ShutdownHook + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    #[must_use]
    pub fn with_channels(mut self, channels: ChannelMap) -> Self {
        self.channels = Some(channels);
        self
    }

    #[must_use]
    pub fn with_params(mut self, params: MonitorParams) -> Self {
        self.params = Some(params);
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: impl Clock + Send + Sync + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    pub fn try_build(self) -> Result<Monitor> {
        let link = self.link.ok_or(BuildError::MissingLink)?;
        let store = self.store.ok_or(BuildError::MissingStore)?;
        let notifier = self.notifier.ok_or(BuildError::MissingNotifier)?;
        let hook = self.hook.ok_or(BuildError::MissingShutdownHook)?;
        let channels = self
            .channels
            .filter(|c| !c.is_empty())
            .ok_or(BuildError::MissingChannels)?;
        let params = self.params.unwrap_or_default();

        if params.tick.is_zero() {
            return Err(BuildError::InvalidConfig("tick must be > 0").into());
        }
        if params.recompute_interval.is_zero() {
            return Err(BuildError::InvalidConfig("recompute interval must be > 0").into());
        }
        if !params.z_threshold.is_finite() || params.z_threshold <= 0.0 {
            return Err(BuildError::InvalidConfig("z threshold must be finite and > 0").into());
        }
        if let Some(tag) = params.default_channel
            && channels.resolve(tag).is_err()
        {
            return Err(BuildError::InvalidConfig("default channel is not mapped").into());
        }

        let clock: Arc<dyn Clock + Send + Sync> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(MonotonicClock::new()),
        };
        let started = clock.now();
        let registry = ChannelRegistry::new(channels, params.recompute_interval);
        Ok(Monitor {
            link,
            store,
            notifier,
            hook,
            registry,
            params,
            clock,
            started,
            settings: Settings::default(),
            shutdown_requested: false,
            finished: false,
        })
    }
}
