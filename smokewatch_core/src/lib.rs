#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic)
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::cast_precision_loss
)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Smoke-sensor monitoring engine (hardware-agnostic).
//!
//! All I/O goes through seams: `smokewatch_traits::FrameSource` for the
//! serial link, `store::Store` for persistence and settings,
//! `smokewatch_traits::Notifier` for email and
//! `smokewatch_traits::ShutdownHook` for power control.
//!
//! ## Architecture
//!
//! - **Parsing**: `R:..;G:..;IR:..` frames and `STATUS` heartbeats (`frame`)
//! - **Dispatch**: channel tag → unit, per-channel state owner (`registry`)
//! - **Statistics**: rolling population mean/std per wavelength (`stats`)
//! - **Alerting**: z-scores, WARNING / CRITICAL classification (`alert`)
//! - **Loop**: one `Monitor::tick` per interval, paced by `runner::run`
//!
//! A channel alerts only once all three wavelengths have a baseline, and
//! never loses that baseline while the process runs.

pub mod alert;
pub mod config;
pub mod conversions;
pub mod error;
pub mod frame;
pub mod hw_error;
pub mod mocks;
pub mod monitor;
pub mod registry;
pub mod runner;
pub mod settings;
pub mod stats;
pub mod status;
pub mod store;
pub mod util;
pub mod wavelength;

pub use alert::{Alert, Severity};
pub use config::MonitorParams;
pub use error::{BuildError, MonitorError, Report, Result};
pub use frame::{Frame, parse_frame};
pub use monitor::{Monitor, MonitorBuilder};
pub use registry::{ChannelMap, ChannelRegistry, ChannelState};
pub use runner::{RunOutcome, run};
pub use settings::{Settings, SettingsSeed, seed_defaults};
pub use stats::{Baseline, ChannelStats};
pub use status::{StopReason, TickStatus};
pub use store::{
    AlertRecord, ReadingRecord, ReadingSummary, SettingsSource, StatisticsRecord, Store,
};
pub use wavelength::{PerWavelength, Wavelength};
