//! Debounced escalation scheduler
//!
//! Every accepted message schedules its own timer. When a timer fires it
//! compares the latest accepted message against the snapshot it took when
//! it was scheduled:
//!
//! ```text
//! t=0   accept(E1)  timer₁ snapshot=E1 ─────────────┐ fires t=34: last=E3 ≠ E1 → Superseded
//! t=10  accept(E2)  timer₂ snapshot=E2 ───────────────────┐ fires t=44: last=E3 ≠ E2 → Superseded
//! t=20  accept(E3)  timer₃ snapshot=E3 ─────────────────────────┐ fires t=54: last=E3 → escalate
//! ```
//!
//! A burst therefore yields one escalation, `wait` after its last message,
//! carrying the whole body. Deadlines are fixed when a message is submitted,
//! not when the timer task first runs. Superseded timers are not cancelled; they run
//! to completion as no-ops. [`TimerHandle::cancel`] exists for callers that
//! know a newer exception is coming.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::action::TerminalAction;
use super::config::EscalationConfig;
use super::consent::ConsentGate;
use super::report::EscalationReport;
use super::state::{lock_state, Acceptance, SharedReportState};

/// What a fired timer did
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationOutcome {
    /// A newer message arrived; this timer did nothing
    Superseded,
    /// The user declined to send the report
    Declined,
    /// The terminal action accepted the report
    Dispatched,
    /// Consent was given but the terminal action failed
    DispatchFailed { reason: String },
}

impl EscalationOutcome {
    /// Whether this timer was the one that escalated
    pub fn escalated(&self) -> bool {
        !matches!(self, Self::Superseded)
    }
}

impl std::fmt::Display for EscalationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Superseded => write!(f, "superseded"),
            Self::Declined => write!(f, "declined"),
            Self::Dispatched => write!(f, "dispatched"),
            Self::DispatchFailed { reason } => write!(f, "dispatch failed: {}", reason),
        }
    }
}

/// Handle to a scheduled escalation timer.
#[derive(Debug)]
pub struct TimerHandle {
    task: JoinHandle<EscalationOutcome>,
    wait: Duration,
}

impl TimerHandle {
    /// Abort the timer. Optional: stale timers already do nothing.
    pub fn cancel(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// The wait this timer was scheduled with
    pub fn wait(&self) -> Duration {
        self.wait
    }

    /// Wait for the timer to fire. `None` if it was cancelled.
    pub async fn outcome(self) -> Option<EscalationOutcome> {
        self.task.await.ok()
    }
}

/// Result of offering a message to the pipeline.
#[derive(Debug)]
pub enum Submission {
    /// New content; a timer is pending
    Scheduled { message: String, timer: TimerHandle },
    /// Already in the report; nothing scheduled
    Duplicate { message: String },
}

impl Submission {
    /// The stringified message that was offered
    pub fn message(&self) -> &str {
        match self {
            Self::Scheduled { message, .. } | Self::Duplicate { message } => message,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate { .. })
    }

    pub fn timer(&self) -> Option<&TimerHandle> {
        match self {
            Self::Scheduled { timer, .. } => Some(timer),
            Self::Duplicate { .. } => None,
        }
    }

    /// Wait for this submission's timer, if one was scheduled.
    pub async fn outcome(self) -> Option<EscalationOutcome> {
        match self {
            Self::Scheduled { timer, .. } => timer.outcome().await,
            Self::Duplicate { .. } => None,
        }
    }
}

/// Accepts messages into the shared report and schedules escalations.
#[derive(Clone)]
pub struct EscalationScheduler {
    state: SharedReportState,
    config: Arc<EscalationConfig>,
    consent: Arc<dyn ConsentGate>,
    action: Arc<dyn TerminalAction>,
    runtime: Handle,
}

impl EscalationScheduler {
    pub fn new(
        state: SharedReportState,
        config: Arc<EscalationConfig>,
        consent: Arc<dyn ConsentGate>,
        action: Arc<dyn TerminalAction>,
        runtime: Handle,
    ) -> Self {
        Self {
            state,
            config,
            consent,
            action,
            runtime,
        }
    }

    /// Accept a stringified message and, if new, schedule an escalation.
    pub fn submit(&self, message: String, wait: Duration) -> Submission {
        let deadline = Instant::now() + wait;
        let acceptance = lock_state(&self.state).accept(&message);
        match acceptance {
            Acceptance::Accepted => {
                debug!(wait_ms = millis(wait), "Message accepted into report");
                // An accepted message is the latest one, so it is its own snapshot.
                let timer = self.spawn_timer(deadline, wait, Some(message.clone()));
                Submission::Scheduled { message, timer }
            }
            Acceptance::Duplicate => {
                debug!("Duplicate message suppressed");
                Submission::Duplicate { message }
            }
        }
    }

    /// Schedule a timer that escalates after `wait` unless superseded.
    pub fn schedule(&self, wait: Duration) -> TimerHandle {
        let deadline = Instant::now() + wait;
        let snapshot = lock_state(&self.state).last_message().map(str::to_string);
        self.spawn_timer(deadline, wait, snapshot)
    }

    fn spawn_timer(
        &self,
        deadline: Instant,
        wait: Duration,
        snapshot: Option<String>,
    ) -> TimerHandle {
        let scheduler = self.clone();
        let task = self
            .runtime
            .spawn(async move { scheduler.fire_at(deadline, snapshot).await });
        TimerHandle { task, wait }
    }

    async fn fire_at(self, deadline: Instant, snapshot: Option<String>) -> EscalationOutcome {
        tokio::time::sleep_until(deadline).await;

        let report = {
            let mut state = lock_state(&self.state);
            if !state.is_current(snapshot.as_deref()) {
                debug!("Escalation timer superseded by a newer message");
                return EscalationOutcome::Superseded;
            }
            let window = state.record_escalation();
            EscalationReport::compose(&state, &self.config, window)
        };

        info!(
            window = report.window,
            messages = report.message_count,
            to = %report.to,
            "Escalating exception report"
        );

        if !self.consent.request_consent(&report).await {
            info!(window = report.window, "Escalation declined");
            return EscalationOutcome::Declined;
        }

        match self.action.dispatch(&report).await {
            Ok(()) => {
                info!(
                    window = report.window,
                    action = self.action.name(),
                    "Escalation dispatched"
                );
                EscalationOutcome::Dispatched
            }
            Err(e) => {
                warn!(window = report.window, "Escalation dispatch failed: {}", e);
                EscalationOutcome::DispatchFailed {
                    reason: e.to_string(),
                }
            }
        }
    }
}

fn millis(wait: Duration) -> u64 {
    u64::try_from(wait.as_millis()).unwrap_or(u64::MAX)
}

impl std::fmt::Debug for EscalationScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EscalationScheduler")
            .field("config", &self.config)
            .field("action", &self.action.name())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ReporterError, ReporterResult};
    use crate::escalation::consent::AutoConsent;
    use crate::escalation::state::ReportState;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        reports: Mutex<Vec<EscalationReport>>,
        fail: bool,
    }

    #[async_trait]
    impl TerminalAction for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        async fn dispatch(&self, report: &EscalationReport) -> ReporterResult<()> {
            self.reports.lock().unwrap().push(report.clone());
            if self.fail {
                Err(ReporterError::dispatch("recorder", "refused"))
            } else {
                Ok(())
            }
        }
    }

    fn scheduler(consent: AutoConsent, recorder: Arc<Recorder>) -> EscalationScheduler {
        EscalationScheduler::new(
            ReportState::new("Errors:").shared(),
            Arc::new(EscalationConfig::default()),
            Arc::new(consent),
            recorder,
            Handle::current(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_message_dispatches() {
        let recorder = Arc::new(Recorder::default());
        let scheduler = scheduler(AutoConsent::grant(), recorder.clone());

        let submission = scheduler.submit("boom".to_string(), Duration::from_millis(34));
        assert_eq!(submission.outcome().await, Some(EscalationOutcome::Dispatched));

        let reports = recorder.reports.lock().unwrap();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].body.contains("boom"));
        assert!(reports[0].body.ends_with("Hope this helps."));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_timer_is_noop() {
        let recorder = Arc::new(Recorder::default());
        let scheduler = scheduler(AutoConsent::grant(), recorder.clone());

        let first = scheduler.submit("e1".to_string(), Duration::from_millis(34));
        tokio::time::advance(Duration::from_millis(10)).await;
        let second = scheduler.submit("e2".to_string(), Duration::from_millis(34));

        assert_eq!(first.outcome().await, Some(EscalationOutcome::Superseded));
        assert!(recorder.reports.lock().unwrap().is_empty());

        assert_eq!(second.outcome().await, Some(EscalationOutcome::Dispatched));
        assert_eq!(recorder.reports.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_counts_from_submission() {
        let recorder = Arc::new(Recorder::default());
        let scheduler = scheduler(AutoConsent::grant(), recorder.clone());
        let start = tokio::time::Instant::now();

        let submission = scheduler.submit("boom".to_string(), Duration::from_millis(34));
        // Host stays busy before the timer task first runs
        tokio::time::advance(Duration::from_millis(10)).await;

        assert_eq!(submission.outcome().await, Some(EscalationOutcome::Dispatched));
        assert_eq!(start.elapsed(), Duration::from_millis(34));
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_timers_keep_their_own_deadlines() {
        let recorder = Arc::new(Recorder::default());
        let scheduler = scheduler(AutoConsent::grant(), recorder.clone());
        let start = tokio::time::Instant::now();

        let first = scheduler.submit("e1".to_string(), Duration::from_millis(34));
        let second = scheduler.submit("e2".to_string(), Duration::from_millis(50));

        assert_eq!(first.outcome().await, Some(EscalationOutcome::Superseded));
        assert_eq!(start.elapsed(), Duration::from_millis(34));
        assert!(recorder.reports.lock().unwrap().is_empty());

        assert_eq!(second.outcome().await, Some(EscalationOutcome::Dispatched));
        assert_eq!(start.elapsed(), Duration::from_millis(50));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_burst_escalates_once() {
        let recorder = Arc::new(Recorder::default());
        let scheduler = scheduler(AutoConsent::grant(), recorder.clone());

        let submissions: Vec<Submission> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let scheduler = &scheduler;
                    scope.spawn(move || {
                        scheduler.submit(format!("e{}", i), Duration::from_millis(200))
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let mut dispatched = 0;
        for submission in submissions {
            if submission.outcome().await == Some(EscalationOutcome::Dispatched) {
                dispatched += 1;
            }
        }
        assert_eq!(dispatched, 1);
        assert_eq!(recorder.reports.lock().unwrap().len(), 1);
        assert_eq!(recorder.reports.lock().unwrap()[0].message_count, 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_schedules_nothing() {
        let recorder = Arc::new(Recorder::default());
        let scheduler = scheduler(AutoConsent::grant(), recorder);

        let first = scheduler.submit("same".to_string(), Duration::from_millis(34));
        let again = scheduler.submit("same".to_string(), Duration::from_millis(34));
        assert!(!first.is_duplicate());
        assert!(again.is_duplicate());
        assert!(again.timer().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_declined_skips_action() {
        let recorder = Arc::new(Recorder::default());
        let scheduler = scheduler(AutoConsent::deny(), recorder.clone());

        let submission = scheduler.submit("boom".to_string(), Duration::from_millis(34));
        assert_eq!(submission.outcome().await, Some(EscalationOutcome::Declined));
        assert!(recorder.reports.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_failure_is_contained() {
        let recorder = Arc::new(Recorder {
            fail: true,
            ..Default::default()
        });
        let scheduler = scheduler(AutoConsent::grant(), recorder);

        let outcome = scheduler
            .submit("boom".to_string(), Duration::from_millis(34))
            .outcome()
            .await;
        assert!(matches!(
            outcome,
            Some(EscalationOutcome::DispatchFailed { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_has_no_outcome() {
        let recorder = Arc::new(Recorder::default());
        let scheduler = scheduler(AutoConsent::grant(), recorder.clone());

        let submission = scheduler.submit("boom".to_string(), Duration::from_millis(34));
        if let Some(timer) = submission.timer() {
            timer.cancel();
        }
        assert_eq!(submission.outcome().await, None);
        assert!(recorder.reports.lock().unwrap().is_empty());
    }
}
