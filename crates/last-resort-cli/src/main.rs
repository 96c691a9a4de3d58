mod handler;
mod input;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use handler::HandlerMode;
use last_resort::escalation::state::lock_state;
use last_resort::{
    AutoConsent, ConsentGate, ConsoleConsent, EscalationOutcome, EscalationOverrides,
    MailtoAction, ReportOutcome, ReportState, Reporter, Submission,
};
use tracing::{info, warn};

/// Feed exception values through the last-resort escalation pipeline.
///
/// Reads one exception per line (JSON or plain text), reports each one,
/// then waits for any pending escalation to settle.
#[derive(Parser, Debug)]
#[command(name = "last-resort", version)]
struct Args {
    /// Read exceptions from this file instead of stdin
    #[arg(long)]
    input: Option<PathBuf>,

    /// TOML file with escalation overrides
    #[arg(long)]
    config: Option<PathBuf>,

    /// Recipient list for the composed report
    #[arg(long)]
    to: Option<String>,

    /// Subject line for the composed report
    #[arg(long)]
    subject: Option<String>,

    /// Coalescing window in milliseconds
    #[arg(long)]
    wait_ms: Option<u64>,

    /// Send without asking
    #[arg(long, conflicts_with = "no_consent")]
    yes: bool,

    /// Never send; every escalation is declined
    #[arg(long)]
    no_consent: bool,

    /// Print the mailto URL instead of opening a mail application
    #[arg(long)]
    dry_run: bool,

    /// Program used to open the mailto URL
    #[arg(long)]
    opener: Option<String>,

    /// Simulated primary handler
    #[arg(long, value_enum, default_value_t = HandlerMode::None)]
    handler: HandlerMode,

    /// Do not warn about thrown strings and primitives
    #[arg(long)]
    allow_primitives: bool,
}

impl Args {
    /// Overrides from flags only
    fn flag_overrides(&self) -> EscalationOverrides {
        EscalationOverrides {
            destination: self.to.clone(),
            subject: self.subject.clone(),
            wait_ms: self.wait_ms,
            warn_on_primitive: self.allow_primitives.then_some(false),
            ..Default::default()
        }
    }

    fn consent(&self) -> Result<Arc<dyn ConsentGate>> {
        if self.yes {
            return Ok(Arc::new(AutoConsent::grant()));
        }
        if self.no_consent {
            return Ok(Arc::new(AutoConsent::deny()));
        }
        if self.input.is_none() {
            bail!("Interactive consent reads stdin; pass --input, --yes or --no-consent");
        }
        Ok(Arc::new(ConsoleConsent))
    }
}

/// Precedence: flags > environment > config file > defaults.
fn load_overrides(args: &Args) -> Result<EscalationOverrides> {
    let file = match &args.config {
        Some(path) => EscalationOverrides::from_toml_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => EscalationOverrides::default(),
    };
    let env = EscalationOverrides::from_env().context("Invalid LAST_RESORT_* environment")?;
    Ok(file.layer(env).layer(args.flag_overrides()))
}

#[derive(Debug, Default)]
struct Summary {
    handled: usize,
    accepted: u64,
    duplicates: u64,
    windows: u64,
    superseded: usize,
    declined: usize,
    dispatched: usize,
    failed: usize,
}

impl Summary {
    async fn settle(&mut self, submission: Submission) {
        if submission.is_duplicate() {
            return;
        }
        match submission.outcome().await {
            Some(EscalationOutcome::Superseded) | None => self.superseded += 1,
            Some(EscalationOutcome::Declined) => self.declined += 1,
            Some(EscalationOutcome::Dispatched) => self.dispatched += 1,
            Some(EscalationOutcome::DispatchFailed { reason }) => {
                warn!("Escalation not delivered: {}", reason);
                self.failed += 1;
            }
        }
    }

    /// Copy the aggregate's counters once every timer has settled
    fn absorb(&mut self, state: &ReportState) {
        self.accepted = state.accepted_count();
        self.duplicates = state.duplicate_count();
        self.windows = state.escalation_count();
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let overrides = load_overrides(&args)?;
    let mut action = MailtoAction::new().dry_run(args.dry_run);
    if let Some(opener) = &args.opener {
        action = action.with_opener(opener);
    }

    let reporter = Reporter::<String>::builder()
        .overrides(overrides)
        .consent(args.consent()?)
        .action(Arc::new(action))
        .build()
        .context("Failed to build reporter")?;
    handler::install(&reporter, args.handler);

    info!(
        to = %reporter.config().destination,
        wait_ms = u64::try_from(reporter.config().wait.as_millis()).unwrap_or(u64::MAX),
        handler = ?args.handler,
        "Last-resort reporter ready"
    );

    let exceptions = match &args.input {
        Some(path) => {
            let file = std::fs::File::open(path)
                .with_context(|| format!("Failed to open input {}", path.display()))?;
            input::read_exceptions(std::io::BufReader::new(file))?
        }
        None => input::read_exceptions(std::io::stdin().lock())?,
    };
    info!(count = exceptions.len(), "Reporting exceptions");

    let mut summary = Summary::default();
    let mut pending = Vec::new();
    for raw in exceptions {
        match reporter.report(raw) {
            ReportOutcome::Handled(text) => {
                summary.handled += 1;
                println!("{}", text);
            }
            ReportOutcome::Escalated(attempt) => {
                info!(reason = %attempt.reason, "Exception escalated");
                pending.push(attempt.diagnostic);
                pending.push(attempt.original);
            }
        }
    }

    for submission in pending {
        summary.settle(submission).await;
    }
    summary.absorb(&lock_state(reporter.state()));

    info!(
        handled = summary.handled,
        accepted = summary.accepted,
        duplicates = summary.duplicates,
        windows = summary.windows,
        superseded = summary.superseded,
        declined = summary.declined,
        dispatched = summary.dispatched,
        failed = summary.failed,
        "Done"
    );

    if summary.failed > 0 {
        bail!("{} escalation(s) could not be delivered", summary.failed);
    }
    Ok(())
}
