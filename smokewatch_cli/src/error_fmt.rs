//! Human-readable error descriptions, exit codes and structured JSON errors.

use smokewatch_core::error::{BuildError, MonitorError};
use smokewatch_store::StoreError;

/// Startup step that failed; attached as eyre context so the exit code can
/// tell a startup failure from a fault during the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Config,
    Store,
    Link,
    Build,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Stage::Config => "invalid configuration",
            Stage::Store => "cannot open database",
            Stage::Link => "cannot open sensor link",
            Stage::Build => "cannot assemble monitor",
        })
    }
}

fn root_cause(err: &eyre::Report) -> String {
    err.chain()
        .last()
        .map_or_else(|| err.to_string(), ToString::to_string)
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingLink => "What happened: No sensor link was provided to the monitor.\nLikely causes: The serial port failed to open or was not wired into the builder.\nHow to fix: Check serial.port, or pass --sim to run against the simulated board.".to_string(),
            BuildError::MissingStore => "What happened: No database was provided to the monitor.\nLikely causes: storage.db_path could not be opened.\nHow to fix: Check storage.db_path or pass --db.".to_string(),
            BuildError::MissingNotifier | BuildError::MissingShutdownHook => format!(
                "What happened: The monitor is missing a collaborator ({be}).\nLikely causes: Incomplete wiring in the binary.\nHow to fix: Report this as a bug."
            ),
            BuildError::MissingChannels => "What happened: No channels are mapped to units.\nLikely causes: The [[channels]] table is empty.\nHow to fix: Add one [[channels]] entry (tag, unit) per monitored unit.".to_string(),
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Out-of-range values in [monitor].\nHow to fix: Edit the config file, then rerun."
            ),
        };
    }

    if let Some(me) = err.downcast_ref::<MonitorError>() {
        return match me {
            MonitorError::UnmappedChannel { tag } => format!(
                "What happened: The sensor board reported channel {tag}, which is not mapped to any unit.\nLikely causes: A sensor was added or rewired without updating the config.\nHow to fix: Add a [[channels]] entry with tag = {tag} and restart the monitor."
            ),
            MonitorError::Timeout => "What happened: The sensor board did not answer in time.\nLikely causes: Wrong serial.port, board unpowered, or cable unplugged.\nHow to fix: Check the device path and cabling; raise serial.read_timeout_ms if the board is slow.".to_string(),
            MonitorError::Hardware(_) | MonitorError::HardwareFault(_) => format!(
                "What happened: Sensor link failure ({me}).\nLikely causes: Serial device vanished or was opened by another process.\nHow to fix: Check the cable and that no other program holds the port."
            ),
            MonitorError::Store(_) => format!(
                "What happened: Database failure ({me}).\nLikely causes: Disk full, permissions, or the file is locked by another writer.\nHow to fix: Check storage.db_path and free space, then rerun."
            ),
            MonitorError::Config(_) => format!(
                "What happened: {me}.\nLikely causes: Inconsistent configuration.\nHow to fix: Edit the config file, then rerun."
            ),
        };
    }

    if let Some(se) = err.downcast_ref::<StoreError>() {
        return format!(
            "What happened: Cannot use the database ({se}).\nLikely causes: Missing directory permissions, disk full, or a corrupt file.\nHow to fix: Check storage.db_path (or --db) and that the process may write there."
        );
    }

    match err.downcast_ref::<Stage>() {
        Some(Stage::Config) => {
            return format!(
                "What happened: Configuration is invalid or unreadable ({}).\nLikely causes: Missing file, TOML syntax error, or an out-of-range value.\nHow to fix: Edit the config file (see etc/smokewatch.toml) and try again.",
                root_cause(err)
            );
        }
        Some(Stage::Link) => {
            return format!(
                "What happened: Failed to open the sensor link ({}).\nLikely causes: Wrong serial.port, missing permissions on the device, or a binary built without the hardware feature.\nHow to fix: Check the device path and group membership, or pass --sim.",
                root_cause(err)
            );
        }
        _ => {}
    }

    let msg = err.to_string();
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: 3 unmapped channel, 2 startup failure, 1 otherwise.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if let Some(MonitorError::UnmappedChannel { .. }) = err.downcast_ref::<MonitorError>() {
        return 3;
    }
    if err.downcast_ref::<Stage>().is_some() || err.downcast_ref::<BuildError>().is_some() {
        return 2;
    }
    1
}

fn reason_name(err: &eyre::Report) -> &'static str {
    if let Some(me) = err.downcast_ref::<MonitorError>() {
        return match me {
            MonitorError::UnmappedChannel { .. } => "UnmappedChannel",
            MonitorError::Timeout => "Timeout",
            MonitorError::Hardware(_) | MonitorError::HardwareFault(_) => "Hardware",
            MonitorError::Store(_) => "Store",
            MonitorError::Config(_) => "Config",
        };
    }
    if err.downcast_ref::<BuildError>().is_some() {
        return "Build";
    }
    match err.downcast_ref::<Stage>() {
        Some(Stage::Config) => "Config",
        Some(Stage::Store) => "Store",
        Some(Stage::Link) => "Link",
        Some(Stage::Build) => "Build",
        None => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let mut obj = json!({ "reason": reason_name(err), "message": humanize(err) });
    if let Some(MonitorError::UnmappedChannel { tag }) = err.downcast_ref::<MonitorError>() {
        obj["details"] = json!({ "tag": tag });
    }
    obj.to_string()
}
