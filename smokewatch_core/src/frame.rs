//! Decoding of raw serial lines.
//!
//! Wire format: `;`-separated `label:value` fields. A data frame carries
//! `R`, `G` and `IR` (and `CH` on multi-channel boards); a heartbeat starts
//! with `STATUS`. Nothing here returns an error: lines that are not a usable
//! frame are classified and dropped by the caller.

use crate::wavelength::{PerWavelength, Wavelength};

pub const DELIMITER: char = ';';
pub const CHANNEL_LABEL: &str = "CH";
pub const STATUS_PREFIX: &str = "STATUS";

/// One decoded reading. A wavelength whose sensor reported a value <= 0 is `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub channel: Option<u32>,
    pub values: PerWavelength<Option<u32>>,
}

impl Frame {
    pub fn value(&self, w: Wavelength) -> Option<u32> {
        self.values[w]
    }

    /// True when every sensor reported "absent".
    pub fn is_empty(&self) -> bool {
        self.values.all(Option::is_none)
    }
}

/// Connectivity heartbeat; only logged.
#[derive(Debug, Clone, PartialEq)]
pub struct Heartbeat {
    pub fields: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    Empty,
    MissingLabel(&'static str),
    DuplicateLabel(String),
    BadValue { label: String, value: String },
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::Empty => f.write_str("empty line"),
            Rejection::MissingLabel(l) => write!(f, "missing {l} field"),
            Rejection::DuplicateLabel(l) => write!(f, "repeated {l} field"),
            Rejection::BadValue { label, value } => {
                write!(f, "non-integer value {value:?} for {label}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Line {
    Data(Frame),
    Status(Heartbeat),
    Invalid(Rejection),
}

fn fields(line: &str) -> impl Iterator<Item = (&str, &str)> {
    line.split(DELIMITER)
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .filter_map(|f| f.split_once(':'))
        .map(|(l, v)| (l.trim(), v.trim()))
}

fn bad_value(label: &str, value: &str) -> Line {
    Line::Invalid(Rejection::BadValue {
        label: label.to_string(),
        value: value.to_string(),
    })
}

/// Classify one line without logging.
pub fn classify_line(line: &str) -> Line {
    let line = line.trim();
    if line.is_empty() {
        return Line::Invalid(Rejection::Empty);
    }
    if let Some(rest) = line.strip_prefix(STATUS_PREFIX) {
        let fields = fields(rest)
            .map(|(l, v)| (l.to_string(), v.to_string()))
            .collect();
        return Line::Status(Heartbeat { fields });
    }

    let mut seen: PerWavelength<bool> = PerWavelength::default();
    let mut values: PerWavelength<Option<u32>> = PerWavelength::default();
    let mut channel: Option<u32> = None;

    for (label, value) in fields(line) {
        if label == CHANNEL_LABEL {
            if channel.is_some() {
                return Line::Invalid(Rejection::DuplicateLabel(label.to_string()));
            }
            match value.parse::<u32>() {
                Ok(tag) => channel = Some(tag),
                Err(_) => return bad_value(label, value),
            }
            continue;
        }
        let Some(w) = Wavelength::from_label(label) else {
            continue;
        };
        if seen[w] {
            return Line::Invalid(Rejection::DuplicateLabel(label.to_string()));
        }
        seen[w] = true;
        match value.parse::<i64>() {
            // Non-positive means the sensor is absent, not a zero reading
            Ok(v) if v <= 0 => values[w] = None,
            Ok(v) => match u32::try_from(v) {
                Ok(v) => values[w] = Some(v),
                Err(_) => return bad_value(label, value),
            },
            Err(_) => return bad_value(label, value),
        }
    }

    for w in Wavelength::ALL {
        if !seen[w] {
            return Line::Invalid(Rejection::MissingLabel(w.label()));
        }
    }
    Line::Data(Frame { channel, values })
}

/// Decode a data frame, logging and dropping anything else.
pub fn parse_frame(line: &str) -> Option<Frame> {
    match classify_line(line) {
        Line::Data(frame) => Some(frame),
        Line::Status(hb) => {
            tracing::debug!(fields = ?hb.fields, "heartbeat");
            None
        }
        Line::Invalid(Rejection::Empty) => None,
        Line::Invalid(reason) => {
            tracing::debug!(%reason, raw = line, "malformed frame dropped");
            None
        }
    }
}
