#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod cli;
mod error_fmt;
mod logging;
mod notify;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use eyre::WrapErr;
use chrono::{DateTime, TimeDelta, Utc};
use serde_json::json;
use smokewatch_config::Config;
use smokewatch_core::settings::{self, KNOWN_KEYS};
use smokewatch_core::{
    ChannelMap, Monitor, MonitorParams, ReadingSummary, RunOutcome, SettingsSeed, StopReason,
    Store, Wavelength, seed_defaults,
};
use smokewatch_hardware::{LoggedPowerSupply, SimulatedLink};
use smokewatch_store::SqliteStore;
use smokewatch_traits::{BoxError, FrameSource, Notifier};

use crate::cli::{Cli, Commands, JSON_MODE, SettingsCmd};
use crate::error_fmt::{Stage, exit_code_for_error, format_error_json, humanize};
use crate::notify::{LogNotifier, SendmailNotifier};

/// Exit status asking the supervisor to start a fresh process (`EX_TEMPFAIL`).
const EXIT_RESTART: i32 = 75;

/// Nudges the simulated board into a spike after this many lines.
const SIM_SPIKE_ENV: &str = "SMOKEWATCH_TEST_SIM_SPIKE_AFTER";

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    let _ = color_eyre::install();

    match real_main(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            if JSON_MODE.get().copied().unwrap_or(false) {
                eprintln!("{}", format_error_json(&e));
            } else {
                eprintln!("{}", humanize(&e));
            }
            std::process::exit(exit_code_for_error(&e));
        }
    }
}

fn real_main(cli: Cli) -> eyre::Result<i32> {
    let cfg = smokewatch_config::load_file(&cli.config).wrap_err(Stage::Config);
    logging::init(
        &cli.log_level,
        cli.json,
        cfg.as_ref().ok().map(|c| &c.logging),
    );
    let mut cfg = cfg?;

    match cli.cmd {
        Commands::Run { sim, port, db } => {
            if let Some(port) = port {
                cfg.serial.port = port;
            }
            apply_db_override(&mut cfg, db);
            run_monitor(&cfg, sim, cli.json)
        }
        Commands::SelfCheck { sim, db } => {
            apply_db_override(&mut cfg, db);
            self_check(&cfg, sim, cli.json)
        }
        Commands::Health { db } => {
            apply_db_override(&mut cfg, db);
            health(&cfg, cli.json)
        }
        Commands::Status {
            unit,
            limit,
            hours,
            db,
        } => {
            apply_db_override(&mut cfg, db);
            status(&cfg, unit.as_deref(), limit, hours, cli.json)
        }
        Commands::Settings { db, cmd } => {
            apply_db_override(&mut cfg, db);
            settings_cmd(&cfg, cmd, cli.json)
        }
    }
}

fn apply_db_override(cfg: &mut Config, db: Option<PathBuf>) {
    if let Some(db) = db {
        cfg.storage.db_path = db.display().to_string();
    }
}

fn open_store(cfg: &Config) -> eyre::Result<SqliteStore> {
    SqliteStore::open(Path::new(&cfg.storage.db_path)).wrap_err(Stage::Store)
}

fn sim_link(cfg: &Config) -> SimulatedLink {
    let tags = cfg.channels.iter().map(|c| c.tag).collect();
    let link = SimulatedLink::new(tags);
    match std::env::var(SIM_SPIKE_ENV).ok().and_then(|v| v.parse().ok()) {
        Some(after) => link.with_spike_after(after),
        None => link,
    }
}

#[cfg(all(feature = "hardware", unix))]
fn open_serial(cfg: &Config) -> eyre::Result<Box<dyn FrameSource>> {
    let link = smokewatch_hardware::SerialLink::open(&cfg.serial.port, cfg.serial.baud)
        .wrap_err(Stage::Link)?;
    Ok(Box::new(link))
}

#[cfg(not(all(feature = "hardware", unix)))]
fn open_serial(cfg: &Config) -> eyre::Result<Box<dyn FrameSource>> {
    Err(eyre::eyre!(
        "serial port {} requested but this build has no hardware support",
        cfg.serial.port
    )
    .wrap_err(Stage::Link))
}

fn open_link(cfg: &Config, sim: bool) -> eyre::Result<Box<dyn FrameSource>> {
    if sim {
        tracing::info!(channels = cfg.channels.len(), "using simulated sensor board");
        Ok(Box::new(sim_link(cfg)))
    } else {
        open_serial(cfg)
    }
}

fn run_monitor(cfg: &Config, sim: bool, json_out: bool) -> eyre::Result<i32> {
    let mut store = open_store(cfg)?;
    seed_defaults(&mut store, &SettingsSeed::from(&cfg.defaults))
        .map_err(|e| eyre::eyre!("seed settings: {e}"))
        .wrap_err(Stage::Store)?;
    let link = open_link(cfg, sim)?;
    let notifier: Box<dyn Notifier> = if sim {
        Box::new(LogNotifier)
    } else {
        Box::new(SendmailNotifier::new(
            cfg.notify.sendmail_path.clone(),
            cfg.notify.sender.clone(),
        ))
    };

    let mut monitor = Monitor::builder()
        .with_link(link)
        .with_store(store)
        .with_notifier(notifier)
        .with_shutdown_hook(LoggedPowerSupply::new())
        .with_channels(ChannelMap::from(cfg.channels.as_slice()))
        .with_params(MonitorParams::from(cfg))
        .try_build()
        .wrap_err(Stage::Build)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let flag = shutdown.clone();
        if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed)) {
            tracing::warn!(error = %e, "failed to install Ctrl-C handler");
        }
    }

    let outcome = smokewatch_core::run(&mut monitor, &shutdown)?;
    print_outcome(&outcome, json_out);
    Ok(match outcome.reason {
        StopReason::UptimeExpired => EXIT_RESTART,
        _ => 0,
    })
}

fn print_outcome(outcome: &RunOutcome, json_out: bool) {
    if json_out {
        println!(
            "{}",
            json!({
                "reason": outcome.reason.as_str(),
                "ticks": outcome.ticks,
                "uptime_s": outcome.uptime.as_secs(),
            })
        );
    } else {
        println!(
            "stopped: {} after {} ticks ({}s)",
            outcome.reason,
            outcome.ticks,
            outcome.uptime.as_secs()
        );
    }
}

fn self_check(cfg: &Config, sim: bool, json_out: bool) -> eyre::Result<i32> {
    let store = open_store(cfg)?;
    let journal = store.journal_mode().wrap_err(Stage::Store)?;
    let mut link = open_link(cfg, sim)?;
    let timeout = std::time::Duration::from_millis(cfg.serial.read_timeout_ms);
    let data = match link.read_line(timeout) {
        Ok(line) => line.is_some(),
        Err(e) => {
            tracing::warn!(error = %e, "sensor link read failed");
            false
        }
    };
    let _ = link.close();

    if json_out {
        println!(
            "{}",
            json!({
                "status": "ok",
                "db": store.path(),
                "journal_mode": journal,
                "channels": cfg.channels.len(),
                "link_data": data,
            })
        );
    } else {
        println!(
            "OK: db={} journal={} channels={} link_data={}",
            store.path(),
            journal,
            cfg.channels.len(),
            if data { "yes" } else { "none yet" }
        );
    }
    Ok(0)
}

fn health(cfg: &Config, json_out: bool) -> eyre::Result<i32> {
    let store = open_store(cfg)?;
    let counts = store.table_counts().wrap_err(Stage::Store)?;
    let snapshot = settings::Settings::from_map(store.all_settings().wrap_err(Stage::Store)?);
    if json_out {
        println!(
            "{}",
            json!({
                "status": "ok",
                "db": store.path(),
                "monitoring_active": snapshot.monitoring_active,
                "email_enabled": snapshot.email_enabled,
                "auto_shutdown_enabled": snapshot.auto_shutdown_enabled,
                "readings": counts.readings,
                "statistics": counts.statistics,
                "alerts": counts.alerts,
            })
        );
    } else {
        println!(
            "ok db={} monitoring_active={} email_enabled={} auto_shutdown_enabled={} readings={} statistics={} alerts={}",
            store.path(),
            snapshot.monitoring_active,
            snapshot.email_enabled,
            snapshot.auto_shutdown_enabled,
            counts.readings,
            counts.statistics,
            counts.alerts
        );
    }
    Ok(0)
}

fn status(
    cfg: &Config,
    unit: Option<&str>,
    limit: usize,
    hours: u32,
    json_out: bool,
) -> eyre::Result<i32> {
    let mut store = open_store(cfg)?;
    let since = Utc::now()
        .checked_sub_signed(TimeDelta::hours(i64::from(hours)))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    let to_report = |e: BoxError| eyre::eyre!("query failed: {e}");
    let units: Vec<(String, u32)> = store
        .active_units()
        .map_err(to_report)?
        .into_iter()
        .filter(|(u, _)| unit.is_none_or(|want| want == u.as_str()))
        .collect();

    let mut entries = Vec::new();
    for (name, channel) in &units {
        let stats = store.latest_statistics(name, *channel).map_err(to_report)?;
        let alerts = store.recent_alerts(Some(name), limit).map_err(to_report)?;
        let rows = store.recent_readings(name, since).map_err(to_report)?;
        let readings = ReadingSummary::from_rows(&rows);
        entries.push((name, *channel, stats, readings, alerts));
    }

    if json_out {
        let units: Vec<_> = entries
            .iter()
            .map(|(name, channel, stats, readings, alerts)| {
                let baselines = stats.as_ref().map(|s| {
                    s.baselines
                        .iter()
                        .map(|(w, b)| {
                            (
                                w.label().to_string(),
                                json!(b.map(|b| json!({ "mean": b.mean, "std": b.std }))),
                            )
                        })
                        .collect::<serde_json::Map<_, _>>()
                });
                let alerts: Vec<_> = alerts
                    .iter()
                    .map(|a| {
                        json!({
                            "timestamp": a.timestamp.to_rfc3339(),
                            "severity": a.severity.as_str(),
                            "message": a.message,
                        })
                    })
                    .collect();
                json!({
                    "unit": name,
                    "channel": channel,
                    "calibrated_at": stats.as_ref().map(|s| s.timestamp.to_rfc3339()),
                    "baselines": baselines,
                    "readings": readings_json(readings, hours),
                    "alerts": alerts,
                })
            })
            .collect();
        println!("{}", json!({ "units": units }));
        return Ok(0);
    }

    if entries.is_empty() {
        println!("no readings recorded");
        return Ok(0);
    }
    for (name, channel, stats, readings, alerts) in &entries {
        println!("{name} (channel {channel})");
        match stats {
            Some(s) => {
                let parts: Vec<String> = s
                    .baselines
                    .iter()
                    .map(|(w, b)| match b {
                        Some(b) => format!("{w}={:.2}±{:.2}", b.mean, b.std),
                        None => format!("{w}=unset"),
                    })
                    .collect();
                println!("  baseline {} at {}", parts.join(" "), s.timestamp.to_rfc3339());
            }
            None => println!("  calibrating"),
        }
        println!("  {}", describe_readings(readings, hours));
        if alerts.is_empty() {
            println!("  no alerts");
        }
        for a in alerts {
            println!("  {} {} {}", a.timestamp.to_rfc3339(), a.severity, a.message);
        }
    }
    Ok(0)
}

fn readings_json(summary: &ReadingSummary, hours: u32) -> serde_json::Value {
    let latest: serde_json::Map<_, _> = summary
        .last_values
        .iter()
        .map(|(w, v)| (w.label().to_string(), json!(v)))
        .collect();
    let mean: serde_json::Map<_, _> = summary
        .means
        .iter()
        .map(|(w, m)| (w.label().to_string(), json!(m)))
        .collect();
    json!({
        "hours": hours,
        "count": summary.count,
        "latest_at": summary.latest.map(|t| t.to_rfc3339()),
        "latest": latest,
        "mean": mean,
    })
}

fn describe_readings(summary: &ReadingSummary, hours: u32) -> String {
    if summary.count == 0 {
        return format!("no readings in the last {hours}h");
    }
    let parts: Vec<String> = Wavelength::ALL
        .into_iter()
        .map(|w| match (summary.last_values[w], summary.means[w]) {
            (Some(v), Some(m)) => format!("{w}={v} (avg {m:.1})"),
            (None, Some(m)) => format!("{w}=absent (avg {m:.1})"),
            _ => format!("{w}=absent"),
        })
        .collect();
    format!(
        "{} readings in the last {hours}h, latest {}",
        summary.count,
        parts.join(" ")
    )
}

fn settings_cmd(cfg: &Config, cmd: SettingsCmd, json_out: bool) -> eyre::Result<i32> {
    let store = open_store(cfg)?;
    match cmd {
        SettingsCmd::Get { key: Some(key) } => {
            let Some(value) = store.get_setting(&key).wrap_err(Stage::Store)? else {
                eyre::bail!("setting {key} is not set");
            };
            if json_out {
                let mut obj = serde_json::Map::new();
                obj.insert(key, json!(value));
                println!("{}", serde_json::Value::Object(obj));
            } else {
                println!("{key}={value}");
            }
        }
        SettingsCmd::Get { key: None } => {
            let all = store.all_settings().wrap_err(Stage::Store)?;
            if json_out {
                println!("{}", json!(all));
            } else {
                for (k, v) in &all {
                    println!("{k}={v}");
                }
            }
        }
        SettingsCmd::Set { key, value } => {
            if !KNOWN_KEYS.contains(&key.as_str()) {
                eyre::bail!(
                    "unknown setting {key}; expected one of {}",
                    KNOWN_KEYS.join(", ")
                );
            }
            let value = if key == settings::EMAIL_RECIPIENTS {
                let recipients = settings::parse_recipients(&value);
                if let Some(bad) = recipients.iter().find(|r| !settings::is_valid_recipient(r)) {
                    eyre::bail!("email_recipients entry {bad:?} contains control characters");
                }
                recipients.join(",")
            } else {
                match value.trim().to_ascii_lowercase().as_str() {
                    "true" => settings::format_bool(true).to_string(),
                    "false" => settings::format_bool(false).to_string(),
                    _ => eyre::bail!("setting {key} takes true or false, got {value:?}"),
                }
            };
            store.set_setting(&key, &value).wrap_err(Stage::Store)?;
            tracing::info!(key = %key, value = %value, "setting updated");
            println!("{key}={value}");
        }
    }
    Ok(0)
}
