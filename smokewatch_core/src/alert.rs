//! Deviation scoring and severity classification.

use std::fmt::Write as _;

use smokewatch_traits::Priority;

use crate::stats::Baseline;
use crate::wavelength::{PerWavelength, Wavelength};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Warning => "WARNING",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WARNING" => Ok(Severity::Warning),
            "CRITICAL" => Ok(Severity::Critical),
            other => Err(format!("unknown severity {other:?}")),
        }
    }
}

/// One classified deviation.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub severity: Severity,
    /// Wavelengths with |z| above the threshold, with their z-scores.
    pub triggered: Vec<(Wavelength, f64)>,
    /// Every score computed this tick; `None` where unscored.
    pub z_scores: PerWavelength<Option<f64>>,
}

impl Alert {
    /// Short text stored with the alert row.
    pub fn message(&self) -> &'static str {
        match self.severity {
            Severity::Warning => "Concerning smoke levels detected",
            Severity::Critical => "DANGEROUS smoke levels - Burn-in stopped!",
        }
    }

    pub fn subject(&self) -> &'static str {
        match self.severity {
            Severity::Warning => "SMOKE LEVEL WARNING",
            Severity::Critical => "BURN-IN STOPPED - CRITICAL ALERT",
        }
    }

    pub fn priority(&self) -> Priority {
        match self.severity {
            Severity::Warning => Priority::Normal,
            Severity::Critical => Priority::High,
        }
    }

    /// Mail body for operators.
    pub fn notification_body(&self, unit: &str, channel: u32) -> String {
        let mut body = match self.severity {
            Severity::Warning => format!(
                "Concerning smoke levels have been detected at {unit} (channel {channel}). \
                 The burn-in has NOT been stopped.\n\n"
            ),
            Severity::Critical => format!(
                "Dangerous smoke levels have been detected at {unit} (channel {channel}).\n\n"
            ),
        };
        for (w, z) in self.z_scores.iter() {
            let z = z.map_or_else(|| "n/a".to_string(), |z| format!("{z:.2}"));
            let _ = writeln!(
                body,
                "{} values are {z} standard deviations from the mean.",
                w.display_name()
            );
        }
        if self.severity == Severity::Critical {
            body.push_str("The burn-in has been stopped automatically.");
        }
        body
    }
}

/// Score every wavelength that has both a reading and a baseline with non-zero spread.
pub fn z_scores(
    values: &PerWavelength<Option<u32>>,
    baselines: &PerWavelength<Option<Baseline>>,
) -> PerWavelength<Option<f64>> {
    PerWavelength::from_fn(|w| match (values[w], baselines[w]) {
        (Some(v), Some(b)) => b.z_score(f64::from(v)),
        _ => None,
    })
}

/// Classify a reading against the channel's baselines.
///
/// Nothing is emitted unless all three baselines are set. WARNING fires when
/// any scored wavelength exceeds `threshold`; CRITICAL additionally fires when
/// all three were scored and all exceed it.
pub fn evaluate(
    values: &PerWavelength<Option<u32>>,
    baselines: &PerWavelength<Option<Baseline>>,
    threshold: f64,
) -> Vec<Alert> {
    if !baselines.all(Option::is_some) {
        return Vec::new();
    }
    let scores = z_scores(values, baselines);
    let triggered: Vec<(Wavelength, f64)> = scores
        .iter()
        .filter_map(|(w, z)| z.filter(|z| z.abs() > threshold).map(|z| (w, z)))
        .collect();

    let mut alerts = Vec::new();
    if triggered.is_empty() {
        return alerts;
    }
    let all_triggered = triggered.len() == Wavelength::ALL.len();
    alerts.push(Alert {
        severity: Severity::Warning,
        triggered: triggered.clone(),
        z_scores: scores,
    });
    if all_triggered {
        alerts.push(Alert {
            severity: Severity::Critical,
            triggered,
            z_scores: scores,
        });
    }
    alerts
}
