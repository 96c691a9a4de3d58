//! The human-facing escalation message

use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};

use super::config::EscalationConfig;
use super::state::{ReportState, SEPARATOR};

/// Characters `encodeURIComponent` leaves alone.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Recipient lists additionally keep addresses and separators readable.
const RECIPIENTS: &AsciiSet = &COMPONENT.remove(b'@').remove(b',').remove(b'+');

/// A composed report, ready for consent and dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationReport {
    /// Text shown above the message when asking for consent
    pub preface: String,
    /// Recipients
    pub to: String,
    pub subject: String,
    /// Accumulated errors followed by the closing text
    pub body: String,
    /// Coalescing window this report closes (1-based)
    pub window: u64,
    /// Distinct messages merged into the body so far
    pub message_count: u64,
    pub created_at: DateTime<Utc>,
}

impl EscalationReport {
    /// Compose a report from the current aggregate.
    pub fn compose(state: &ReportState, config: &EscalationConfig, window: u64) -> Self {
        Self {
            preface: config.preface.clone(),
            to: config.destination.clone(),
            subject: config.subject.clone(),
            body: format!("{}{}{}", state.body(), SEPARATOR, config.closing),
            window,
            message_count: state.accepted_count(),
            created_at: Utc::now(),
        }
    }

    /// `To:` / `Subject:` header lines followed by the body.
    pub fn preview(&self) -> String {
        format!("To:{}\nSubject:{}\n{}", self.to, self.subject, self.body)
    }

    /// Preface plus preview, as shown when asking for consent.
    pub fn prompt_text(&self) -> String {
        format!("{}\n\n{}", self.preface, self.preview())
    }

    /// `mailto:` URL carrying subject and body.
    pub fn mailto_url(&self) -> String {
        format!(
            "mailto:{}?subject={}&body={}",
            utf8_percent_encode(&self.to, RECIPIENTS),
            utf8_percent_encode(&self.subject, COMPONENT),
            utf8_percent_encode(&self.body, COMPONENT)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_report() -> EscalationReport {
        let mut state = ReportState::new("Errors listed below:");
        state.accept("name:\n  TypeError\n");
        let config = EscalationConfig {
            destination: "support@example.com, eng+js@example.com".to_string(),
            ..Default::default()
        };
        EscalationReport::compose(&state, &config, 1)
    }

    #[test]
    fn test_compose_appends_closing() {
        let report = sample_report();
        assert_eq!(
            report.body,
            "Errors listed below:\n\nname:\n  TypeError\n\n\nHope this helps."
        );
        assert_eq!(report.message_count, 1);
        assert_eq!(report.window, 1);
    }

    #[test]
    fn test_preview_layout() {
        let report = sample_report();
        let preview = report.preview();
        assert!(preview.starts_with("To:support@example.com, eng+js@example.com\nSubject:"));
        assert!(report.prompt_text().starts_with(&report.preface));
    }

    #[test]
    fn test_mailto_url_encoding() {
        let url = sample_report().mailto_url();
        assert!(url.starts_with("mailto:support@example.com,%20eng+js@example.com?subject="));
        assert!(url.contains("subject=Automatic%20error%20reporting%20failed%2C%20here's%20why"));
        assert!(url.contains("&body=Errors%20listed%20below%3A%0A%0Aname%3A%0A%20%20TypeError"));
        assert!(!url.contains('\n'));
    }
}
