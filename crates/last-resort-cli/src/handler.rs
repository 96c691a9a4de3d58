//! Simulated primary handlers for exercising the fallback paths.

use clap::ValueEnum;
use last_resort::{stringify_raw, ErrorKind, RawException, Reporter};

/// How the simulated primary handler behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum HandlerMode {
    /// No handler registered
    None,
    /// Handler accepts every exception and echoes its report text
    Ok,
    /// Handler returns an error for every exception
    Fail,
    /// Handler panics on every exception
    Panic,
}

/// Register the handler for `mode` on `reporter`.
pub fn install(reporter: &Reporter<String>, mode: HandlerMode) {
    match mode {
        HandlerMode::None => reporter.clear_primary_handler(),
        HandlerMode::Ok => {
            reporter.set_primary_handler(|exception: &RawException| Ok(stringify_raw(exception)))
        }
        HandlerMode::Fail => reporter.set_primary_handler(|_: &RawException| {
            Err(RawException::error(
                ErrorKind::Type,
                "primary handler rejected the exception",
            ))
        }),
        HandlerMode::Panic => {
            reporter.set_primary_handler(|_: &RawException| -> Result<String, RawException> {
                panic!("primary handler crashed")
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use last_resort::{AutoConsent, EscalationReason, MailtoAction};
    use std::sync::Arc;

    fn reporter() -> Reporter<String> {
        Reporter::builder()
            .consent(Arc::new(AutoConsent::deny()))
            .action(Arc::new(MailtoAction::new().dry_run(true)))
            .build()
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_ok_mode_echoes_text() {
        let reporter = reporter();
        install(&reporter, HandlerMode::Ok);
        let outcome = reporter.report("boom");
        assert_eq!(outcome.handled().map(String::as_str), Some("boom"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fail_mode_escalates_type_error() {
        let reporter = reporter();
        install(&reporter, HandlerMode::Fail);
        let attempt = reporter.report("boom").into_escalation().unwrap();
        assert_eq!(
            attempt.reason,
            EscalationReason::HandlerFailed {
                thrown: "TypeError: primary handler rejected the exception".to_string()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_none_mode_clears_handler() {
        let reporter = reporter();
        install(&reporter, HandlerMode::Ok);
        install(&reporter, HandlerMode::None);
        assert!(!reporter.has_primary_handler());
    }
}
