use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MonitorError {
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("timeout waiting for serial data")]
    Timeout,
    #[error("channel tag {tag} is not mapped to any unit")]
    UnmappedChannel { tag: u32 },
    #[error("store error: {0}")]
    Store(String),
    #[error("configuration error: {0}")]
    Config(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BuildError {
    #[error("missing frame source")]
    MissingLink,
    #[error("missing store")]
    MissingStore,
    #[error("missing notifier")]
    MissingNotifier,
    #[error("missing shutdown hook")]
    MissingShutdownHook,
    #[error("no channels mapped")]
    MissingChannels,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
