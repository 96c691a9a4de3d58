//! Consent gates: ask the user before anything leaves the process

use async_trait::async_trait;
use std::io::{BufRead, Write};
use tracing::warn;

use super::report::EscalationReport;

/// Decides whether an escalation may proceed to the terminal action.
#[async_trait]
pub trait ConsentGate: Send + Sync {
    /// Present the report and return whether the user agreed to send it.
    async fn request_consent(&self, report: &EscalationReport) -> bool;
}

/// Fixed answer, for scripted runs and tests.
#[derive(Debug, Clone, Copy)]
pub struct AutoConsent {
    grant: bool,
}

impl AutoConsent {
    pub fn grant() -> Self {
        Self { grant: true }
    }

    pub fn deny() -> Self {
        Self { grant: false }
    }
}

#[async_trait]
impl ConsentGate for AutoConsent {
    async fn request_consent(&self, _report: &EscalationReport) -> bool {
        self.grant
    }
}

/// Prints the report to stderr and reads a y/N answer from stdin.
///
/// The read blocks a worker of the blocking pool, not the timer task's
/// thread. EOF or a read error counts as "no".
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleConsent;

impl ConsoleConsent {
    fn ask(prompt: String) -> bool {
        let mut stderr = std::io::stderr().lock();
        if writeln!(stderr, "{}\n\nSend this report? [y/N] ", prompt).is_err() {
            return false;
        }
        let _ = stderr.flush();

        let mut answer = String::new();
        match std::io::stdin().lock().read_line(&mut answer) {
            Ok(0) | Err(_) => false,
            Ok(_) => is_affirmative(&answer),
        }
    }
}

fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

#[async_trait]
impl ConsentGate for ConsoleConsent {
    async fn request_consent(&self, report: &EscalationReport) -> bool {
        let prompt = report.prompt_text();
        match tokio::task::spawn_blocking(move || Self::ask(prompt)).await {
            Ok(granted) => granted,
            Err(e) => {
                warn!("Consent prompt failed: {}", e);
                false
            }
        }
    }
}
