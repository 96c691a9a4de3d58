//! Escalation configuration
//!
//! Every field is independently overridable. Overrides are merged once,
//! at construction, with a shallow "present and truthy, else default" rule:
//! empty strings and zero waits fall back to the default, so overriding
//! the destination alone leaves every other text untouched.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{ReporterError, ReporterResult};

/// Default coalescing window: two frames at 60 Hz.
pub const DEFAULT_WAIT: Duration = Duration::from_millis(34);

/// Default wait for the original exception after a handler failure.
pub const DEFAULT_ORIGINAL_WAIT: Duration = Duration::from_millis(100);

pub const DEFAULT_PREFACE: &str = "EMAIL ERROR?\n\n\
    We had a serious error and were not able to report it.\n\n\
    Confirming will open your default email application to send this email:";

pub const DEFAULT_SUBJECT: &str = "Automatic error reporting failed, here's why";

pub const DEFAULT_BODY: &str = "Errors listed below:";

pub const DEFAULT_CLOSING: &str = "Hope this helps.";

/// Resolved, process-wide escalation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationConfig {
    /// Recipient list for the composed message
    pub destination: String,
    /// Text shown above the report when asking for consent
    pub preface: String,
    /// Text appended after the accumulated errors
    pub closing: String,
    /// Subject line of the composed message
    pub subject: String,
    /// Opening line of the report body
    pub body: String,
    /// Coalescing window for escalations and handler diagnostics
    pub wait: Duration,
    /// Wait applied to the original exception after a handler failure
    pub original_wait: Duration,
    /// Log a warning when a bare string or primitive is thrown
    pub warn_on_primitive: bool,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            destination: default_destination(),
            preface: DEFAULT_PREFACE.to_string(),
            closing: DEFAULT_CLOSING.to_string(),
            subject: DEFAULT_SUBJECT.to_string(),
            body: DEFAULT_BODY.to_string(),
            wait: DEFAULT_WAIT,
            original_wait: DEFAULT_ORIGINAL_WAIT,
            warn_on_primitive: true,
        }
    }
}

impl EscalationConfig {
    /// Merge overrides onto the defaults, field by field.
    pub fn from_overrides(overrides: &EscalationOverrides) -> Self {
        let defaults = Self::default();
        Self {
            destination: pick_text(&overrides.destination, defaults.destination),
            preface: pick_text(&overrides.preface, defaults.preface),
            closing: pick_text(&overrides.closing, defaults.closing),
            subject: pick_text(&overrides.subject, defaults.subject),
            body: pick_text(&overrides.body, defaults.body),
            wait: pick_wait(overrides.wait_ms, defaults.wait),
            original_wait: pick_wait(overrides.original_wait_ms, defaults.original_wait),
            warn_on_primitive: overrides
                .warn_on_primitive
                .unwrap_or(defaults.warn_on_primitive),
        }
    }
}

fn pick_text(value: &Option<String>, default: String) -> String {
    match value {
        Some(v) if !v.is_empty() => v.clone(),
        _ => default,
    }
}

fn pick_wait(value: Option<u64>, default: Duration) -> Duration {
    match value {
        Some(ms) if ms > 0 => Duration::from_millis(ms),
        _ => default,
    }
}

/// `support@<domain>, engineering+exceptionalError@<domain>` for this host.
pub fn default_destination() -> String {
    let host = hostname::get()
        .ok()
        .map(|h| h.to_string_lossy().into_owned())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string());
    let domain = registrable_domain(&host);
    format!(
        "support@{}, engineering+exceptionalError@{}",
        domain, domain
    )
}

/// Last two labels of a host name (`app.eu.example.com` → `example.com`).
fn registrable_domain(host: &str) -> String {
    let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();
    match labels.len() {
        0 => "localhost".to_string(),
        1 => labels[0].to_string(),
        n => format!("{}.{}", labels[n - 2], labels[n - 1]),
    }
}

/// Partial configuration from code, a TOML file, or the environment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EscalationOverrides {
    #[serde(alias = "to")]
    pub destination: Option<String>,
    pub preface: Option<String>,
    pub closing: Option<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub wait_ms: Option<u64>,
    pub original_wait_ms: Option<u64>,
    pub warn_on_primitive: Option<bool>,
}

impl EscalationOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override only the destination
    pub fn destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    /// Override only the coalescing window
    pub fn wait(mut self, wait: Duration) -> Self {
        self.wait_ms = Some(u64::try_from(wait.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Parse overrides from TOML text; `origin` names the source in errors.
    pub fn from_toml_str(text: &str, origin: &Path) -> ReporterResult<Self> {
        toml::from_str(text).map_err(|e| ReporterError::ConfigParse {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Load overrides from a TOML file
    pub fn from_toml_file(path: &Path) -> ReporterResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ReporterError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text, path)
    }

    /// Read overrides from `LAST_RESORT_*` environment variables.
    ///
    /// Unset variables leave the field unset. Numeric and boolean
    /// variables that do not parse are an error.
    pub fn from_env() -> ReporterResult<Self> {
        Ok(Self {
            destination: std::env::var("LAST_RESORT_TO").ok(),
            preface: std::env::var("LAST_RESORT_PREFACE").ok(),
            closing: std::env::var("LAST_RESORT_CLOSING").ok(),
            subject: std::env::var("LAST_RESORT_SUBJECT").ok(),
            body: std::env::var("LAST_RESORT_BODY").ok(),
            wait_ms: parse_env("LAST_RESORT_WAIT_MS", |v| v.parse().ok())?,
            original_wait_ms: parse_env("LAST_RESORT_ORIGINAL_WAIT_MS", |v| v.parse().ok())?,
            warn_on_primitive: parse_env("LAST_RESORT_WARN_ON_PRIMITIVE", parse_bool)?,
        })
    }

    /// Layer `higher` on top of `self`: any field set in `higher` wins.
    pub fn layer(self, higher: EscalationOverrides) -> Self {
        Self {
            destination: higher.destination.or(self.destination),
            preface: higher.preface.or(self.preface),
            closing: higher.closing.or(self.closing),
            subject: higher.subject.or(self.subject),
            body: higher.body.or(self.body),
            wait_ms: higher.wait_ms.or(self.wait_ms),
            original_wait_ms: higher.original_wait_ms.or(self.original_wait_ms),
            warn_on_primitive: higher.warn_on_primitive.or(self.warn_on_primitive),
        }
    }
}

fn parse_env<T>(var: &str, parse: impl Fn(&str) -> Option<T>) -> ReporterResult<Option<T>> {
    match std::env::var(var) {
        Ok(value) => parse(value.trim())
            .map(Some)
            .ok_or(ReporterError::InvalidEnv {
                var: var.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}

/// Accepts "1"/"true"/"yes" and "0"/"false"/"no", case-insensitive.
fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}
