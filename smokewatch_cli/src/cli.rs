//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "smokewatch", version, about = "Burn-in smoke monitor")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/smokewatch.toml")]
    pub config: PathBuf,

    /// Log and print as JSON lines instead of pretty
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Monitor the sensor board until stopped, disabled or due for restart
    Run {
        /// Use the simulated sensor board instead of the serial port
        #[arg(long, action = ArgAction::SetTrue)]
        sim: bool,
        /// Override serial.port
        #[arg(long, value_name = "DEVICE")]
        port: Option<String>,
        /// Override storage.db_path
        #[arg(long, value_name = "FILE")]
        db: Option<PathBuf>,
    },
    /// Validate config, open the database and the sensor link, then exit
    SelfCheck {
        /// Check the simulated link instead of the serial port
        #[arg(long, action = ArgAction::SetTrue)]
        sim: bool,
        /// Override storage.db_path
        #[arg(long, value_name = "FILE")]
        db: Option<PathBuf>,
    },
    /// One-line summary of settings and database reachability
    Health {
        /// Override storage.db_path
        #[arg(long, value_name = "FILE")]
        db: Option<PathBuf>,
    },
    /// Latest baselines, recent readings and recent alerts per unit
    Status {
        /// Only this unit
        #[arg(long)]
        unit: Option<String>,
        /// Number of recent alerts to show
        #[arg(long, default_value_t = 5)]
        limit: usize,
        /// Summarize readings from this many past hours
        #[arg(long, default_value_t = 1)]
        hours: u32,
        /// Override storage.db_path
        #[arg(long, value_name = "FILE")]
        db: Option<PathBuf>,
    },
    /// Read or change the shared settings table
    Settings {
        /// Override storage.db_path
        #[arg(long, value_name = "FILE")]
        db: Option<PathBuf>,
        #[command(subcommand)]
        cmd: SettingsCmd,
    },
}

#[derive(Subcommand, Debug)]
pub enum SettingsCmd {
    /// Print one setting, or all of them
    Get { key: Option<String> },
    /// Write one setting; the running monitor picks it up on its next tick
    Set { key: String, value: String },
}
