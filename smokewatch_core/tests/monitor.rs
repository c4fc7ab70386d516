use std::sync::atomic::AtomicBool;
use std::time::{Duration, SystemTime};

use rstest::{fixture, rstest};
use smokewatch_core::mocks::{
    MemoryStore, RecordingNotifier, RecordingShutdown, ScriptedLink, StoreFaults,
};
use smokewatch_core::settings::{
    AUTO_SHUTDOWN_ENABLED, EMAIL_ENABLED, EMAIL_RECIPIENTS, MONITORING_ACTIVE,
};
use smokewatch_core::{
    ChannelMap, Monitor, MonitorError, MonitorParams, Severity, StopReason, TickStatus, Wavelength,
    run,
};
use smokewatch_traits::Priority;
use smokewatch_traits::clock::test_clock::TestClock;

const INTERVAL: Duration = Duration::from_secs(10);

struct Rig {
    monitor: Monitor,
    link: ScriptedLink,
    store: MemoryStore,
    notifier: RecordingNotifier,
    hook: RecordingShutdown,
    clock: TestClock,
}

impl Rig {
    fn with_params(params: MonitorParams) -> Self {
        let link = ScriptedLink::new();
        let store = MemoryStore::new();
        let notifier = RecordingNotifier::new();
        let hook = RecordingShutdown::new();
        let clock =
            TestClock::starting_at(SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000));
        let monitor = Monitor::builder()
            .with_link(link.clone())
            .with_store(store.clone())
            .with_notifier(notifier.clone())
            .with_shutdown_hook(hook.clone())
            .with_channels(ChannelMap::new().with(1, "atlaspc1").with(2, "atlaspc2"))
            .with_params(params)
            .with_clock(clock.clone())
            .try_build()
            .expect("valid monitor");
        Self {
            monitor,
            link,
            store,
            notifier,
            hook,
            clock,
        }
    }

    fn started(params: MonitorParams) -> Self {
        let mut rig = Self::with_params(params);
        rig.monitor.start().expect("start");
        rig
    }

    /// Push one line, tick, then let a second pass.
    fn step(&mut self, line: &str) -> TickStatus {
        self.link.push_line(line);
        let status = self.monitor.tick().expect("tick");
        self.clock.advance(Duration::from_secs(1));
        status
    }

    /// Feed alternating frames on channel 1 until the first recompute lands.
    /// Resulting baselines: R ≈ 99.1 ± 10, G and IR ≈ 49.5 ± 5.
    fn calibrate(&mut self) {
        for i in 0..=INTERVAL.as_secs() {
            let (r, g) = if i % 2 == 0 { (90, 45) } else { (110, 55) };
            self.step(&format!("CH:1;R:{r};G:{g};IR:{g}"));
        }
        assert!(self.monitor.registry().get(1).unwrap().stats.is_calibrated());
    }

    fn enable_email(&self) {
        self.store.set(EMAIL_ENABLED, "true");
        self.store.set(EMAIL_RECIPIENTS, "ops@example.org, oncall@example.org");
    }
}

fn test_params() -> MonitorParams {
    MonitorParams {
        recompute_interval: INTERVAL,
        ..MonitorParams::default()
    }
}

#[fixture]
fn rig() -> Rig {
    Rig::started(test_params())
}

#[rstest]
fn start_marks_monitoring_active(rig: Rig) {
    assert_eq!(rig.store.setting(MONITORING_ACTIVE).as_deref(), Some("true"));
    assert!(rig.monitor.settings().monitoring_active);
}

#[rstest]
fn calibrates_one_interval_after_first_frame(mut rig: Rig) {
    match rig.step("CH:1;R:90;G:45;IR:45") {
        TickStatus::Calibrating {
            unit,
            channel,
            remaining,
        } => {
            assert_eq!(unit, "atlaspc1");
            assert_eq!(channel, 1);
            assert_eq!(remaining, INTERVAL);
        }
        other => panic!("expected calibrating, got {other:?}"),
    }
    for _ in 1..INTERVAL.as_secs() {
        assert!(matches!(
            rig.step("CH:1;R:110;G:55;IR:55"),
            TickStatus::Calibrating { .. }
        ));
    }
    assert!(rig.store.statistics().is_empty());

    let status = rig.step("CH:1;R:90;G:45;IR:45");
    assert_eq!(
        status,
        TickStatus::Monitoring {
            unit: "atlaspc1".into(),
            channel: 1,
            alerts: vec![]
        }
    );
    let stats = rig.store.statistics();
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].unit, "atlaspc1");
    assert_eq!(stats[0].channel, 1);
    let red = stats[0].baselines[Wavelength::Red].unwrap();
    assert!((red.mean - 1170.0 / 11.0).abs() < 1e-9);

    let state = rig.monitor.registry().get(1).unwrap();
    for w in Wavelength::ALL {
        assert_eq!(state.stats.buffered(w), 0);
    }
}

#[rstest]
fn readings_carry_unit_and_channel(mut rig: Rig) {
    rig.step("CH:2;R:5;G:0;IR:7");
    let readings = rig.store.readings();
    assert_eq!(readings.len(), 1);
    assert_eq!(readings[0].unit, "atlaspc2");
    assert_eq!(readings[0].channel, 2);
    assert_eq!(readings[0].values[Wavelength::Green], None);
    assert_eq!(readings[0].values[Wavelength::Infrared], Some(7));
}

#[rstest]
fn no_alert_while_uncalibrated(mut rig: Rig) {
    rig.enable_email();
    for _ in 0..5 {
        rig.step("CH:1;R:100000;G:100000;IR:100000");
    }
    assert!(rig.store.alerts().is_empty());
    assert!(rig.notifier.sent().is_empty());
}

#[rstest]
fn single_wavelength_spike_is_warning_only(mut rig: Rig) {
    rig.enable_email();
    rig.calibrate();
    let status = rig.step("CH:1;R:1000;G:50;IR:50");
    assert_eq!(
        status,
        TickStatus::Monitoring {
            unit: "atlaspc1".into(),
            channel: 1,
            alerts: vec![Severity::Warning]
        }
    );
    let alerts = rig.store.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].severity, Severity::Warning);
    assert_eq!(alerts[0].message, "Concerning smoke levels detected");
    assert_eq!(alerts[0].values[Wavelength::Red], Some(1000));
    assert!(alerts[0].z_scores[Wavelength::Red].unwrap() > 5.0);

    let sent = rig.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, "SMOKE LEVEL WARNING");
    assert_eq!(sent[0].priority, Priority::Normal);
    assert_eq!(sent[0].recipients.len(), 2);
    assert!(sent[0].body.contains("NOT been stopped"));
    assert!(rig.hook.units().is_empty());
    assert_eq!(rig.store.setting(MONITORING_ACTIVE).as_deref(), Some("true"));
}

#[rstest]
fn critical_with_auto_shutdown_stops_the_loop(mut rig: Rig) {
    rig.enable_email();
    rig.store.set(AUTO_SHUTDOWN_ENABLED, "true");
    rig.calibrate();

    let status = rig.step("CH:1;R:1000;G:1000;IR:1000");
    assert_eq!(
        status,
        TickStatus::Monitoring {
            unit: "atlaspc1".into(),
            channel: 1,
            alerts: vec![Severity::Warning, Severity::Critical]
        }
    );
    let severities: Vec<_> = rig.store.alerts().iter().map(|a| a.severity).collect();
    assert_eq!(severities, vec![Severity::Warning, Severity::Critical]);

    let sent = rig.notifier.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1].subject, "BURN-IN STOPPED - CRITICAL ALERT");
    assert_eq!(sent[1].priority, Priority::High);

    assert_eq!(rig.hook.units(), vec!["atlaspc1".to_string()]);
    assert_eq!(rig.store.setting(MONITORING_ACTIVE).as_deref(), Some("false"));

    rig.link.push_line("CH:1;R:90;G:45;IR:45");
    assert_eq!(
        rig.monitor.tick().unwrap(),
        TickStatus::Stopped(StopReason::CriticalShutdown)
    );
    // The frame was never read
    assert_eq!(rig.link.pending(), 1);
}

#[rstest]
fn critical_without_auto_shutdown_keeps_monitoring(mut rig: Rig) {
    rig.calibrate();
    rig.step("CH:1;R:1000;G:1000;IR:1000");
    assert_eq!(rig.store.alerts().len(), 2);
    assert!(rig.hook.units().is_empty());
    assert!(matches!(
        rig.step("CH:1;R:100;G:50;IR:50"),
        TickStatus::Monitoring { .. }
    ));
}

#[rstest]
fn disabling_email_mid_run_suppresses_sends_but_not_persistence(mut rig: Rig) {
    rig.enable_email();
    rig.calibrate();
    rig.step("CH:1;R:1000;G:50;IR:50");
    assert_eq!(rig.notifier.sent().len(), 1);

    rig.store.set(EMAIL_ENABLED, "false");
    rig.step("CH:1;R:1000;G:50;IR:50");
    assert_eq!(rig.notifier.sent().len(), 1);
    assert_eq!(rig.store.alerts().len(), 2);
}

#[rstest]
fn notifier_failure_is_not_fatal(mut rig: Rig) {
    rig.enable_email();
    rig.notifier.set_failing(true);
    rig.calibrate();
    let status = rig.step("CH:1;R:1000;G:50;IR:50");
    assert!(matches!(status, TickStatus::Monitoring { .. }));
    assert_eq!(rig.store.alerts().len(), 1);
}

#[rstest]
fn alert_append_failure_still_notifies(mut rig: Rig) {
    rig.enable_email();
    rig.calibrate();
    rig.store.set_faults(StoreFaults {
        alerts: true,
        ..StoreFaults::default()
    });
    rig.step("CH:1;R:1000;G:50;IR:50");
    assert!(rig.store.alerts().is_empty());
    assert_eq!(rig.notifier.sent().len(), 1);
}

#[rstest]
fn failed_statistics_append_is_retried_next_tick(mut rig: Rig) {
    for i in 0..INTERVAL.as_secs() {
        let r = 90 + 20 * (i % 2);
        rig.step(&format!("CH:1;R:{r};G:50;IR:50"));
    }
    rig.store.set_faults(StoreFaults {
        statistics: true,
        ..StoreFaults::default()
    });
    assert!(matches!(
        rig.step("CH:1;R:90;G:50;IR:50"),
        TickStatus::Calibrating { .. }
    ));
    let state = rig.monitor.registry().get(1).unwrap();
    assert_eq!(state.stats.buffered(Wavelength::Red), 11);
    assert!(rig.store.statistics().is_empty());

    rig.store.set_faults(StoreFaults::default());
    assert!(matches!(
        rig.step("CH:1;R:110;G:50;IR:50"),
        TickStatus::Monitoring { .. }
    ));
    assert_eq!(rig.store.statistics().len(), 1);
    let red = rig.store.statistics()[0].baselines[Wavelength::Red].unwrap();
    assert!((red.mean - 100.0).abs() < 1e-9);
    assert!((red.std - 10.0).abs() < 1e-9);
}

#[rstest]
fn reading_append_failure_still_feeds_statistics(mut rig: Rig) {
    rig.store.set_faults(StoreFaults {
        readings: true,
        ..StoreFaults::default()
    });
    rig.step("CH:1;R:90;G:45;IR:45");
    assert!(rig.store.readings().is_empty());
    let state = rig.monitor.registry().get(1).unwrap();
    assert_eq!(state.stats.buffered(Wavelength::Red), 1);
}

#[rstest]
fn recompute_requests_retention_cleanup(mut rig: Rig) {
    rig.calibrate();
    let deletes = rig.store.deletes();
    assert_eq!(deletes.len(), 1);
    let (unit, channel, cutoff) = &deletes[0];
    assert_eq!(unit, "atlaspc1");
    assert_eq!(*channel, 1);
    let stamped = rig.store.statistics()[0].timestamp;
    assert_eq!(stamped - *cutoff, chrono::TimeDelta::days(30));
}

#[rstest]
fn retention_failure_does_not_undo_recompute(mut rig: Rig) {
    rig.store.set_faults(StoreFaults {
        retention: true,
        ..StoreFaults::default()
    });
    rig.calibrate();
    assert_eq!(rig.store.statistics().len(), 1);
}

#[test]
fn oversized_retention_skips_cleanup_without_aborting_recompute() {
    let mut rig = Rig::started(MonitorParams {
        retention: chrono::TimeDelta::days(100_000_000),
        ..test_params()
    });
    rig.calibrate();
    assert_eq!(rig.store.statistics().len(), 1);
    assert!(rig.store.deletes().is_empty());
}

#[rstest]
fn all_absent_frame_is_dropped(mut rig: Rig) {
    assert_eq!(rig.step("CH:1;R:0;G:0;IR:0"), TickStatus::Idle);
    assert!(rig.store.readings().is_empty());
    assert!(rig.monitor.registry().is_empty());
}

#[rstest]
fn constant_signal_never_alerts(mut rig: Rig) {
    for _ in 0..=INTERVAL.as_secs() {
        rig.step("CH:1;R:50;G:50;IR:50");
    }
    assert!(rig.monitor.registry().get(1).unwrap().stats.is_calibrated());
    let status = rig.step("CH:1;R:9000;G:9000;IR:9000");
    assert!(matches!(status, TickStatus::Monitoring { alerts, .. } if alerts.is_empty()));
    assert!(rig.store.alerts().is_empty());
}

#[rstest]
fn absent_wavelength_blocks_calibration(mut rig: Rig) {
    for _ in 0..=INTERVAL.as_secs() {
        rig.step("CH:1;R:50;G:40;IR:0");
    }
    let state = rig.monitor.registry().get(1).unwrap();
    assert!(state.stats.baseline(Wavelength::Red).is_some());
    assert!(state.stats.baseline(Wavelength::Infrared).is_none());
    assert!(matches!(
        rig.step("CH:1;R:50;G:40;IR:0"),
        TickStatus::Calibrating { .. }
    ));
}

#[rstest]
fn unmapped_channel_is_an_error(mut rig: Rig) {
    rig.link.push_line("CH:9;R:1;G:1;IR:1");
    let err = rig.monitor.tick().unwrap_err();
    assert_eq!(
        err.downcast_ref::<MonitorError>(),
        Some(&MonitorError::UnmappedChannel { tag: 9 })
    );
    assert!(rig.monitor.registry().is_empty());
}

#[rstest]
fn malformed_and_heartbeat_lines_are_dropped(mut rig: Rig) {
    assert_eq!(rig.step("STATUS;CH1:1;CH2:1"), TickStatus::Idle);
    assert_eq!(rig.step("CH:1;R:abc;G:1;IR:1"), TickStatus::Idle);
    assert_eq!(rig.step("CH:1;R:1;G:1"), TickStatus::Idle);
    assert!(rig.store.readings().is_empty());
}

#[rstest]
fn untagged_frame_needs_a_default_channel(mut rig: Rig) {
    assert_eq!(rig.step("R:1;G:1;IR:1"), TickStatus::Idle);

    let mut rig = Rig::started(MonitorParams {
        default_channel: Some(2),
        ..test_params()
    });
    assert!(matches!(
        rig.step("R:1;G:1;IR:1"),
        TickStatus::Calibrating { channel: 2, .. }
    ));
}

#[rstest]
fn read_errors_and_silence_are_idle(mut rig: Rig) {
    rig.link.push_error("device reports framing error");
    assert_eq!(rig.monitor.tick().unwrap(), TickStatus::Idle);
    rig.link.push_silence();
    assert_eq!(rig.monitor.tick().unwrap(), TickStatus::Idle);
}

#[rstest]
fn operator_can_disable_monitoring(mut rig: Rig) {
    rig.store.set(MONITORING_ACTIVE, "false");
    assert_eq!(
        rig.monitor.tick().unwrap(),
        TickStatus::Stopped(StopReason::Disabled)
    );
}

#[rstest]
fn settings_reload_failure_keeps_previous_snapshot(mut rig: Rig) {
    rig.store.set_faults(StoreFaults {
        settings_load: true,
        ..StoreFaults::default()
    });
    assert!(matches!(
        rig.step("CH:1;R:1;G:1;IR:1"),
        TickStatus::Calibrating { .. }
    ));
}

#[test]
fn uptime_budget_expires() {
    let mut rig = Rig::started(MonitorParams {
        uptime_budget: Some(Duration::from_secs(5)),
        ..test_params()
    });
    rig.clock.advance(Duration::from_secs(4));
    assert_eq!(rig.monitor.tick().unwrap(), TickStatus::Idle);
    rig.clock.advance(Duration::from_secs(1));
    assert_eq!(
        rig.monitor.tick().unwrap(),
        TickStatus::Stopped(StopReason::UptimeExpired)
    );
}

#[test]
fn runner_hands_back_on_uptime_expiry() {
    let mut rig = Rig::with_params(MonitorParams {
        uptime_budget: Some(Duration::from_secs(30)),
        ..test_params()
    });
    for _ in 0..40 {
        rig.link.push_line("CH:1;R:100;G:50;IR:50");
    }
    let outcome = run(&mut rig.monitor, &AtomicBool::new(false)).unwrap();
    assert_eq!(outcome.reason, StopReason::UptimeExpired);
    assert_eq!(outcome.ticks, 30);
    assert_eq!(outcome.uptime, Duration::from_secs(30));
    assert!(rig.link.is_closed());
    assert_eq!(rig.store.setting(MONITORING_ACTIVE).as_deref(), Some("false"));
    assert_eq!(rig.store.statistics().len(), 2);
}

#[test]
fn runner_honours_interrupt() {
    let mut rig = Rig::with_params(test_params());
    let outcome = run(&mut rig.monitor, &AtomicBool::new(true)).unwrap();
    assert_eq!(outcome.reason, StopReason::Interrupted);
    assert_eq!(outcome.ticks, 0);
    assert!(rig.link.is_closed());
}

#[test]
fn runner_releases_link_on_fault() {
    let mut rig = Rig::with_params(test_params());
    rig.link.push_line("CH:1;R:1;G:1;IR:1");
    rig.link.push_line("CH:3;R:1;G:1;IR:1");
    let err = run(&mut rig.monitor, &AtomicBool::new(false)).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<MonitorError>(),
        Some(MonitorError::UnmappedChannel { tag: 3 })
    ));
    assert!(rig.link.is_closed());
    assert_eq!(rig.store.setting(MONITORING_ACTIVE).as_deref(), Some("false"));
}

#[test]
fn fresh_monitor_starts_uncalibrated() {
    // A restart rebuilds the monitor from scratch: no channel state survives
    let rig = Rig::started(test_params());
    assert!(rig.monitor.registry().is_empty());
}
