use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("serial setup: {0}")]
    Serial(String),
    #[error("unsupported baud rate {0}")]
    UnsupportedBaud(u32),
    #[error("serial read timeout")]
    Timeout,
    #[error("line exceeded {0} bytes without terminator")]
    Overflow(usize),
    #[error("line is not valid utf-8")]
    Encoding,
    #[error("link closed")]
    Closed,
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
