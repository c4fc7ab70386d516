//! Typed snapshot of the shared settings table.

use std::collections::BTreeMap;

use smokewatch_traits::BoxError;

use crate::store::SettingsSource;

pub const MONITORING_ACTIVE: &str = "monitoring_active";
pub const EMAIL_ENABLED: &str = "email_enabled";
pub const EMAIL_RECIPIENTS: &str = "email_recipients";
pub const AUTO_SHUTDOWN_ENABLED: &str = "auto_shutdown_enabled";

pub const KNOWN_KEYS: [&str; 4] = [
    MONITORING_ACTIVE,
    EMAIL_ENABLED,
    EMAIL_RECIPIENTS,
    AUTO_SHUTDOWN_ENABLED,
];

/// `"true"` in any case is true; everything else, including a missing key, is false.
pub fn parse_bool(raw: Option<&str>) -> bool {
    raw.is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
}

pub fn format_bool(v: bool) -> &'static str {
    if v { "true" } else { "false" }
}

/// Comma-separated addresses, trimmed, empties dropped.
pub fn parse_recipients(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// False when `addr` holds characters that would break a mail header.
pub fn is_valid_recipient(addr: &str) -> bool {
    !addr.chars().any(char::is_control)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub monitoring_active: bool,
    pub email_enabled: bool,
    pub auto_shutdown_enabled: bool,
    pub email_recipients: Vec<String>,
    /// Everything that was loaded, including keys this crate does not interpret.
    pub raw: BTreeMap<String, String>,
}

impl Settings {
    pub fn from_map(raw: BTreeMap<String, String>) -> Self {
        let get = |k: &str| raw.get(k).map(String::as_str);
        Self {
            monitoring_active: parse_bool(get(MONITORING_ACTIVE)),
            email_enabled: parse_bool(get(EMAIL_ENABLED)),
            auto_shutdown_enabled: parse_bool(get(AUTO_SHUTDOWN_ENABLED)),
            email_recipients: parse_recipients(get(EMAIL_RECIPIENTS).unwrap_or_default()),
            raw,
        }
    }

    pub fn load<S: SettingsSource + ?Sized>(source: &mut S) -> Result<Self, BoxError> {
        source.load_settings().map(Self::from_map)
    }

    /// Recipients to notify, or none when email is switched off.
    pub fn notification_recipients(&self) -> &[String] {
        if self.email_enabled {
            &self.email_recipients
        } else {
            &[]
        }
    }
}

/// Values written for keys missing from a fresh settings table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsSeed {
    pub email_enabled: bool,
    pub auto_shutdown_enabled: bool,
    pub email_recipients: String,
}

impl SettingsSeed {
    fn entries(&self) -> [(&'static str, String); 4] {
        [
            (MONITORING_ACTIVE, format_bool(false).to_string()),
            (EMAIL_ENABLED, format_bool(self.email_enabled).to_string()),
            (EMAIL_RECIPIENTS, self.email_recipients.clone()),
            (
                AUTO_SHUTDOWN_ENABLED,
                format_bool(self.auto_shutdown_enabled).to_string(),
            ),
        ]
    }
}

/// Write seed values for absent keys only. Returns the keys written.
pub fn seed_defaults<S: SettingsSource + ?Sized>(
    source: &mut S,
    seed: &SettingsSeed,
) -> Result<Vec<&'static str>, BoxError> {
    let existing = source.load_settings()?;
    let mut written = Vec::new();
    for (key, value) in seed.entries() {
        if !existing.contains_key(key) {
            source.put_setting(key, &value)?;
            written.push(key);
        }
    }
    if !written.is_empty() {
        tracing::info!(keys = ?written, "seeded default settings");
    }
    Ok(written)
}
