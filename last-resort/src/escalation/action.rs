//! Terminal actions: where a consented report goes
//!
//! The default composes a mail message and hands the `mailto:` URL to the
//! platform opener. If the opener cannot be launched, the full message is
//! written to stderr so it can still be copied by hand.

use async_trait::async_trait;
use std::io::Write;
use tokio::process::Command;
use tracing::{info, warn};

use super::report::EscalationReport;
use crate::error::{ReporterError, ReporterResult};

/// Final hand-off of a consented report.
#[async_trait]
pub trait TerminalAction: Send + Sync {
    /// Short identifier used in logs and errors
    fn name(&self) -> &str;

    /// Deliver the report. Called at most once per coalescing window.
    async fn dispatch(&self, report: &EscalationReport) -> ReporterResult<()>;
}

/// Opens a composed email in the user's mail application.
#[derive(Debug, Clone, Default)]
pub struct MailtoAction {
    /// Program that opens URLs; `None` picks the platform default
    opener: Option<String>,
    /// Print the URL to stdout instead of opening it
    dry_run: bool,
}

impl MailtoAction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific opener program
    pub fn with_opener(mut self, opener: impl Into<String>) -> Self {
        self.opener = Some(opener.into());
        self
    }

    /// Print instead of opening
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    fn opener(&self) -> &str {
        self.opener.as_deref().unwrap_or(if cfg!(target_os = "macos") {
            "open"
        } else if cfg!(windows) {
            "explorer"
        } else {
            "xdg-open"
        })
    }

    fn print_fallback(report: &EscalationReport) {
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(
            stderr,
            "Could not open a mail application. Email is shown below to copy and paste:\n\n{}",
            report.preview()
        );
    }
}

#[async_trait]
impl TerminalAction for MailtoAction {
    fn name(&self) -> &str {
        "mailto"
    }

    async fn dispatch(&self, report: &EscalationReport) -> ReporterResult<()> {
        let url = report.mailto_url();

        if self.dry_run {
            println!("{}", url);
            return Ok(());
        }

        let opener = self.opener();
        match Command::new(opener).arg(&url).status().await {
            Ok(status) if status.success() => {
                info!(opener, window = report.window, "Opened mail composer");
                Ok(())
            }
            Ok(status) => {
                warn!(opener, %status, "Mail opener exited unsuccessfully");
                Self::print_fallback(report);
                Err(ReporterError::dispatch(
                    self.name(),
                    format!("{} exited with {}", opener, status),
                ))
            }
            Err(e) => {
                warn!(opener, "Failed to launch mail opener: {}", e);
                Self::print_fallback(report);
                Err(ReporterError::dispatch(self.name(), e.to_string()))
            }
        }
    }
}
