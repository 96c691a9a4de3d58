//! Escalation: dedup, debounce, consent, dispatch
//!
//! Stringified exceptions flow through an aggregator that rejects repeats,
//! then through a trailing-edge debounce that turns a burst into a single
//! consent prompt.
//!
//! ```text
//! submit(msg, wait)
//!     │
//!     ├─ seen before → Submission::Duplicate (no timer)
//!     │
//!     ▼
//! ReportState.accept → body += "\n\n" + msg, last_message = msg
//!     │
//!     ▼
//! timer(wait, snapshot = msg)
//!     │
//!     ├─ last_message ≠ snapshot → Superseded
//!     │
//!     ▼
//! ConsentGate.request_consent(report)
//!     ├─ no  → Declined
//!     └─ yes → TerminalAction.dispatch(report) → Dispatched | DispatchFailed
//! ```

pub mod action;
pub mod config;
pub mod consent;
pub mod report;
pub mod scheduler;
pub mod state;

pub use action::{MailtoAction, TerminalAction};
pub use config::{EscalationConfig, EscalationOverrides, DEFAULT_ORIGINAL_WAIT, DEFAULT_WAIT};
pub use consent::{AutoConsent, ConsentGate, ConsoleConsent};
pub use report::EscalationReport;
pub use scheduler::{EscalationOutcome, EscalationScheduler, Submission, TimerHandle};
pub use state::{Acceptance, ReportState, SharedReportState};
