//! Last-resort exception escalation
//!
//! This library sits behind a host's "uncaught failure" hook. It:
//! - Normalizes any thrown value into a deterministic, serializable record
//! - Hands it to the application's primary handler, passing its result through
//! - When the handler is missing, fails, or panics, collects the failure into a
//!   deduplicated report and, after a burst settles, asks the user whether to
//!   escalate it through a side channel (a composed email by default)
//!
//! # Pipeline
//!
//! ```text
//! RawException ─▶ normalize ─▶ stringify ─▶ ReportState.accept ─▶ debounce timer
//!                                              (dedup)              (snapshot check)
//!                                                                        │
//!                                           ConsentGate ◀────────────────┘
//!                                               │ yes
//!                                               ▼
//!                                         TerminalAction
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use last_resort::{EscalationOverrides, RawException, Reporter};
//!
//! let reporter = Reporter::<()>::builder()
//!     .overrides(EscalationOverrides::new().destination("oncall@example.com"))
//!     .build()?
//!     .shared();
//!
//! reporter.set_primary_handler(|exception: &RawException| {
//!     tracker.send(exception).map_err(|e| RawException::from_error(&e))
//! });
//!
//! reporter.report(RawException::message("cache corrupted"));
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod dispatcher;
pub mod error;
pub mod escalation;
pub mod exception;

pub use dispatcher::{
    EscalationAttempt, EscalationReason, PrimaryHandler, ReportOutcome, Reporter, ReporterBuilder,
    SharedReporter, MISSING_HANDLER_HELP,
};
pub use error::{ReporterError, ReporterResult};
pub use escalation::{
    Acceptance, AutoConsent, ConsentGate, ConsoleConsent, EscalationConfig, EscalationOutcome,
    EscalationOverrides, EscalationReport, EscalationScheduler, MailtoAction, ReportState,
    SharedReportState, Submission, TerminalAction, TimerHandle,
};
pub use exception::{
    normalize, stringify, stringify_raw, ErrorKind, ExceptionObject, Normalized,
    NormalizedRecord, RawException,
};
