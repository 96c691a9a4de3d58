//! Primary handler dispatch with last-resort fallback
//!
//! ```text
//! report(raw)
//!   ├─ primary handler returns Ok(v)        → ReportOutcome::Handled(v)
//!   ├─ no handler registered                ┐
//!   ├─ handler returns Err(thrown)          ├─ submit(diagnostic, wait)
//!   └─ handler panics                       ┘  submit(original, original_wait)
//!                                              → ReportOutcome::Escalated
//! ```
//!
//! `report` never panics and never returns an error; every failure on the
//! way is itself routed into the escalation pipeline.

use serde::{Deserialize, Serialize};
use std::backtrace::Backtrace;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::error::{ReporterError, ReporterResult};
use crate::escalation::{
    ConsentGate, ConsoleConsent, EscalationConfig, EscalationOutcome, EscalationOverrides,
    EscalationScheduler, MailtoAction, ReportState, SharedReportState, Submission,
    TerminalAction,
};
use crate::exception::{stringify_raw, ExceptionObject, RawException};

/// Text of the diagnostic escalated when no handler is registered.
pub const MISSING_HANDLER_HELP: &str = "No primary exception handler is registered.\n\
Example registration:\n  \
reporter.set_primary_handler(|exception: &RawException| {\n    \
// ship exception to your error tracker\n    \
Ok(())\n  \
});";

/// The application's own exception handler.
///
/// Returning `Err` means the handler itself failed; the value it returns
/// is escalated alongside the original exception.
pub trait PrimaryHandler<T>: Send + Sync {
    fn handle(&self, exception: &RawException) -> Result<T, RawException>;
}

impl<T, F> PrimaryHandler<T> for F
where
    F: Fn(&RawException) -> Result<T, RawException> + Send + Sync,
{
    fn handle(&self, exception: &RawException) -> Result<T, RawException> {
        self(exception)
    }
}

/// Why an exception bypassed the primary handler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    /// No handler registered
    HandlerMissing,
    /// Handler returned an error
    HandlerFailed { thrown: String },
    /// Handler panicked
    HandlerPanicked { payload: String },
}

impl std::fmt::Display for EscalationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HandlerMissing => write!(f, "no primary handler registered"),
            Self::HandlerFailed { thrown } => write!(f, "primary handler failed: {}", thrown),
            Self::HandlerPanicked { payload } => {
                write!(f, "primary handler panicked: {}", payload)
            }
        }
    }
}

/// The two submissions made when the primary handler could not help.
#[derive(Debug)]
pub struct EscalationAttempt {
    pub reason: EscalationReason,
    /// Why escalation happened, submitted with the short wait
    pub diagnostic: Submission,
    /// The exception that was reported, submitted with the longer wait
    pub original: Submission,
}

impl EscalationAttempt {
    /// Wait for both timers: `(diagnostic, original)`.
    pub async fn outcomes(self) -> (Option<EscalationOutcome>, Option<EscalationOutcome>) {
        let diagnostic = self.diagnostic.outcome().await;
        let original = self.original.outcome().await;
        (diagnostic, original)
    }
}

/// Result of [`Reporter::report`]
#[derive(Debug)]
pub enum ReportOutcome<T> {
    /// The primary handler's own return value
    Handled(T),
    /// The exception went to the escalation pipeline
    Escalated(EscalationAttempt),
}

impl<T> ReportOutcome<T> {
    pub fn is_handled(&self) -> bool {
        matches!(self, Self::Handled(_))
    }

    pub fn handled(&self) -> Option<&T> {
        match self {
            Self::Handled(value) => Some(value),
            Self::Escalated(_) => None,
        }
    }

    pub fn into_handled(self) -> Option<T> {
        match self {
            Self::Handled(value) => Some(value),
            Self::Escalated(_) => None,
        }
    }

    pub fn escalation(&self) -> Option<&EscalationAttempt> {
        match self {
            Self::Escalated(attempt) => Some(attempt),
            Self::Handled(_) => None,
        }
    }

    pub fn into_escalation(self) -> Option<EscalationAttempt> {
        match self {
            Self::Escalated(attempt) => Some(attempt),
            Self::Handled(_) => None,
        }
    }
}

type SharedHandler<T> = Arc<dyn PrimaryHandler<T>>;

/// Shared reference to a Reporter
pub type SharedReporter<T> = Arc<Reporter<T>>;

/// Entry point: hands exceptions to the primary handler and falls back to
/// escalation when it cannot.
pub struct Reporter<T> {
    handler: RwLock<Option<SharedHandler<T>>>,
    scheduler: EscalationScheduler,
    config: Arc<EscalationConfig>,
    state: SharedReportState,
}

impl<T: 'static> Reporter<T> {
    pub fn builder() -> ReporterBuilder<T> {
        ReporterBuilder::default()
    }

    /// Create a shared reference to this reporter
    pub fn shared(self) -> SharedReporter<T> {
        Arc::new(self)
    }

    /// Register or replace the primary handler
    pub fn set_primary_handler(&self, handler: impl PrimaryHandler<T> + 'static) {
        *self.handler.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(handler));
    }

    /// Remove the primary handler; later reports escalate
    pub fn clear_primary_handler(&self) {
        *self.handler.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn has_primary_handler(&self) -> bool {
        self.handler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Report an exception.
    pub fn report(&self, raw: impl Into<RawException>) -> ReportOutcome<T> {
        let mut raw = raw.into();
        raw.resolve_stack();

        if raw.is_primitive() && self.config.warn_on_primitive {
            warn!(
                thrown = %raw.summary(),
                backtrace = %Backtrace::force_capture(),
                "Primitive value thrown; report a structured error instead to keep a stack trace \
                 (set warn_on_primitive = false to silence)"
            );
        }

        let handler = self
            .handler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let (reason, diagnostic) = match handler {
            None => {
                warn!(exception = %raw.summary(), "No primary handler registered; escalating");
                (EscalationReason::HandlerMissing, missing_handler_diagnostic())
            }
            Some(handler) => match panic::catch_unwind(AssertUnwindSafe(|| handler.handle(&raw)))
            {
                Ok(Ok(value)) => {
                    debug!(exception = %raw.summary(), "Primary handler accepted exception");
                    return ReportOutcome::Handled(value);
                }
                Ok(Err(thrown)) => {
                    let reason = EscalationReason::HandlerFailed {
                        thrown: thrown.summary(),
                    };
                    warn!(exception = %raw.summary(), "{}; escalating", reason);
                    (reason, thrown)
                }
                Err(payload) => {
                    let thrown = RawException::from_panic(payload.as_ref());
                    let reason = EscalationReason::HandlerPanicked {
                        payload: thrown.summary(),
                    };
                    warn!(exception = %raw.summary(), "{}; escalating", reason);
                    (reason, thrown)
                }
            },
        };

        let diagnostic = self.escalate(diagnostic, Some(self.config.wait));
        let original = self.escalate(raw, Some(self.config.original_wait));

        ReportOutcome::Escalated(EscalationAttempt {
            reason,
            diagnostic,
            original,
        })
    }

    /// Feed a message straight into the escalation pipeline.
    ///
    /// `wait` defaults to the configured coalescing window.
    pub fn escalate(&self, message: impl Into<RawException>, wait: Option<Duration>) -> Submission {
        let text = stringify_raw(&message.into());
        self.scheduler.submit(text, wait.unwrap_or(self.config.wait))
    }

    pub fn config(&self) -> &EscalationConfig {
        &self.config
    }

    /// The shared aggregate behind this reporter
    pub fn state(&self) -> &SharedReportState {
        &self.state
    }

    /// Snapshot of the current report body
    pub fn body(&self) -> String {
        crate::escalation::state::lock_state(&self.state)
            .body()
            .to_string()
    }
}

impl<T> std::fmt::Debug for Reporter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter")
            .field("config", &self.config)
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

fn missing_handler_diagnostic() -> RawException {
    RawException::Object(
        ExceptionObject::new()
            .with("name", "PrimaryHandlerMissing")
            .with("message", MISSING_HANDLER_HELP),
    )
}

/// Two-phase construction for [`Reporter`].
pub struct ReporterBuilder<T> {
    overrides: EscalationOverrides,
    consent: Option<Arc<dyn ConsentGate>>,
    action: Option<Arc<dyn TerminalAction>>,
    handler: Option<SharedHandler<T>>,
    runtime: Option<Handle>,
}

impl<T> Default for ReporterBuilder<T> {
    fn default() -> Self {
        Self {
            overrides: EscalationOverrides::default(),
            consent: None,
            action: None,
            handler: None,
            runtime: None,
        }
    }
}

impl<T: 'static> ReporterBuilder<T> {
    /// Configuration overrides, merged onto the defaults at `build()`
    pub fn overrides(mut self, overrides: EscalationOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Consent gate (default: console prompt)
    pub fn consent(mut self, consent: Arc<dyn ConsentGate>) -> Self {
        self.consent = Some(consent);
        self
    }

    /// Terminal action (default: mailto)
    pub fn action(mut self, action: Arc<dyn TerminalAction>) -> Self {
        self.action = Some(action);
        self
    }

    /// Primary handler registered from the start
    pub fn primary_handler(mut self, handler: impl PrimaryHandler<T> + 'static) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Runtime for escalation timers (default: the current one)
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn build(self) -> ReporterResult<Reporter<T>> {
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|_| ReporterError::NoRuntime)?,
        };

        let config = Arc::new(EscalationConfig::from_overrides(&self.overrides));
        let state = ReportState::new(&config.body).shared();
        let consent = self
            .consent
            .unwrap_or_else(|| Arc::new(ConsoleConsent) as Arc<dyn ConsentGate>);
        let action = self
            .action
            .unwrap_or_else(|| Arc::new(MailtoAction::new()) as Arc<dyn TerminalAction>);

        debug!(
            to = %config.destination,
            wait_ms = u64::try_from(config.wait.as_millis()).unwrap_or(u64::MAX),
            "Reporter configured"
        );

        let scheduler =
            EscalationScheduler::new(state.clone(), config.clone(), consent, action, runtime);

        Ok(Reporter {
            handler: RwLock::new(self.handler),
            scheduler,
            config,
            state,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::escalation::AutoConsent;
    use std::io::Write;
    use std::sync::Mutex;

    /// Collects formatted log output for assertions
    #[derive(Clone, Default)]
    struct LogCapture {
        bytes: Arc<Mutex<Vec<u8>>>,
    }

    impl LogCapture {
        fn install(&self) -> tracing::subscriber::DefaultGuard {
            let subscriber = tracing_subscriber::fmt()
                .with_writer(self.clone())
                .with_ansi(false)
                .with_max_level(tracing::Level::WARN)
                .finish();
            tracing::subscriber::set_default(subscriber)
        }

        fn text(&self) -> String {
            String::from_utf8_lossy(&self.bytes.lock().unwrap()).into_owned()
        }
    }

    struct LogCaptureWriter {
        bytes: Arc<Mutex<Vec<u8>>>,
    }

    impl Write for LogCaptureWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.bytes.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogCapture {
        type Writer = LogCaptureWriter;

        fn make_writer(&'a self) -> Self::Writer {
            LogCaptureWriter {
                bytes: Arc::clone(&self.bytes),
            }
        }
    }

    fn reporter() -> Reporter<&'static str> {
        Reporter::builder()
            .consent(Arc::new(AutoConsent::deny()))
            .action(Arc::new(MailtoAction::new().dry_run(true)))
            .build()
            .unwrap()
    }

    #[test]
    fn test_build_outside_runtime_fails() {
        let result = Reporter::<()>::builder().build();
        assert!(matches!(result, Err(ReporterError::NoRuntime)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_handler_result_passes_through() {
        let reporter = reporter();
        reporter.set_primary_handler(|_: &RawException| Ok("logged"));

        let outcome = reporter.report(RawException::message("disk full"));
        assert_eq!(outcome.handled(), Some(&"logged"));
        assert_eq!(reporter.body(), reporter.config().body);
    }

    #[tokio::test(start_paused = true)]
    async fn test_primitive_throw_warns_by_default() {
        let capture = LogCapture::default();
        let _guard = capture.install();

        let reporter = reporter();
        reporter.set_primary_handler(|_: &RawException| Ok("logged"));
        assert!(reporter.report("boom").is_handled());

        let logs = capture.text();
        assert!(logs.contains("WARN"));
        assert!(logs.contains("Primitive value thrown"));
        assert!(logs.contains("boom"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_primitive_warning_can_be_silenced() {
        let capture = LogCapture::default();
        let _guard = capture.install();

        let reporter: Reporter<&'static str> = Reporter::builder()
            .overrides(EscalationOverrides {
                warn_on_primitive: Some(false),
                ..Default::default()
            })
            .consent(Arc::new(AutoConsent::deny()))
            .primary_handler(|_: &RawException| Ok("logged"))
            .build()
            .unwrap();
        assert!(reporter.report("boom").is_handled());
        assert!(reporter.report(serde_json::json!(42)).is_handled());

        assert!(!capture.text().contains("Primitive value thrown"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_structured_errors_do_not_warn() {
        let capture = LogCapture::default();
        let _guard = capture.install();

        let reporter = reporter();
        reporter.set_primary_handler(|_: &RawException| Ok("logged"));
        assert!(reporter.report(RawException::message("disk full")).is_handled());

        assert!(capture.text().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_handler_sees_resolved_stack() {
        let reporter: Reporter<Option<String>> = Reporter::builder()
            .consent(Arc::new(AutoConsent::deny()))
            .primary_handler(|e: &RawException| match e {
                RawException::Object(o) => Ok(o.get_str("stack").map(str::to_string)),
                _ => Ok(None),
            })
            .build()
            .unwrap();

        let raw = ExceptionObject::new()
            .with("message", "m")
            .with("stacktrace", "frame 1");
        let outcome = reporter.report(raw);
        assert_eq!(outcome.into_handled().flatten().as_deref(), Some("frame 1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_handler_escalates_twice() {
        let reporter = reporter();
        let attempt = reporter.report("boom").into_escalation().unwrap();

        assert_eq!(attempt.reason, EscalationReason::HandlerMissing);
        assert!(attempt.diagnostic.message().contains(MISSING_HANDLER_HELP));
        assert_eq!(attempt.original.message(), "boom");
        assert_eq!(
            attempt.original.timer().map(|t| t.wait()),
            Some(reporter.config().original_wait)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_handler_value_is_escalated() {
        let reporter = reporter();
        reporter.set_primary_handler(|_: &RawException| {
            Err(RawException::message("tracker unreachable"))
        });

        let attempt = reporter.report("boom").into_escalation().unwrap();
        assert_eq!(
            attempt.reason,
            EscalationReason::HandlerFailed {
                thrown: "Error: tracker unreachable".to_string()
            }
        );
        assert!(attempt.diagnostic.message().contains("tracker unreachable"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_handler_is_contained() {
        let reporter = reporter();
        reporter.set_primary_handler(|_: &RawException| -> Result<&'static str, RawException> {
            panic!("handler blew up")
        });

        let attempt = reporter.report("boom").into_escalation().unwrap();
        assert!(matches!(
            attempt.reason,
            EscalationReason::HandlerPanicked { ref payload } if payload.contains("handler blew up")
        ));
        assert!(reporter.has_primary_handler());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_primary_handler() {
        let reporter = reporter();
        reporter.set_primary_handler(|_: &RawException| Ok("logged"));
        reporter.clear_primary_handler();
        assert!(!reporter.has_primary_handler());
        assert!(!reporter.report("boom").is_handled());
    }
}
