//! Periodic scan for due schedules.

use std::sync::Arc;
use std::time::Duration;

use cadence_core::{unix_now, Address, ScheduleCommitment, ScheduleRuntime};
use cadence_store::ScheduleStore;
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::client::LedgerClient;
use crate::pipeline::{ExecutionOutcome, ExecutionPipeline};
use crate::Result;

/// Source of "now" in unix seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        unix_now()
    }
}

#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Time between ticks (default: 60s).
    pub interval: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self { interval: Duration::from_secs(60) }
    }
}

/// What a single tick saw and did.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub now: u64,
    /// Schedule accounts returned by the ledger.
    pub fetched: usize,
    /// Of those, active and due.
    pub due: usize,
    /// Due on the ledger but never registered here.
    pub unregistered: Vec<Address>,
    pub outcomes: Vec<ExecutionOutcome>,
}

impl TickReport {
    pub fn committed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_committed()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.committed()
    }
}

pub struct DuePoller {
    ledger: Arc<dyn LedgerClient>,
    store: Arc<dyn ScheduleStore>,
    pipeline: ExecutionPipeline,
    clock: Arc<dyn Clock>,
    config: PollerConfig,
}

impl DuePoller {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        store: Arc<dyn ScheduleStore>,
        pipeline: ExecutionPipeline,
        config: PollerConfig,
    ) -> Self {
        Self {
            ledger,
            store,
            pipeline,
            clock: Arc::new(SystemClock),
            config,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// One scan: fetch, filter due, pair with commitments, run each in turn.
    ///
    /// A failing ledger fetch or store read aborts the tick before any
    /// pipeline starts. A failing pipeline does not stop the ones after it.
    /// Takes `&mut self` so two ticks can never overlap.
    pub async fn tick(&mut self) -> Result<TickReport> {
        let now = self.clock.now();
        let schedules = self.ledger.fetch_schedules().await?;
        let mut report = TickReport { now, fetched: schedules.len(), ..Default::default() };

        let due: Vec<ScheduleRuntime> = schedules.into_iter().filter(|s| s.is_due(now)).collect();
        report.due = due.len();
        if due.is_empty() {
            debug!(now, fetched = report.fetched, "no schedules due");
            return Ok(report);
        }

        let mut work: Vec<(ScheduleRuntime, ScheduleCommitment)> = Vec::with_capacity(due.len());
        for schedule in due {
            match self.store.get(&schedule.schedule).await? {
                Some(commitment) => {
                    if commitment.recipient_count() != usize::from(schedule.total_recipients) {
                        warn!(
                            schedule = hex::encode(schedule.schedule),
                            registered = commitment.recipient_count(),
                            on_ledger = schedule.total_recipients,
                            "recipient count differs from ledger"
                        );
                    }
                    work.push((schedule, commitment));
                }
                None => {
                    warn!(
                        schedule = hex::encode(schedule.schedule),
                        "due schedule has no registered commitment, skipping"
                    );
                    report.unregistered.push(schedule.schedule);
                }
            }
        }

        info!(now, due = report.due, runnable = work.len(), "processing due schedules");

        for (schedule, commitment) in &work {
            let outcome = self.pipeline.run(schedule, commitment).await?;
            report.outcomes.push(outcome);
        }

        info!(
            committed = report.committed(),
            failed = report.failed(),
            unregistered = report.unregistered.len(),
            "tick complete"
        );
        Ok(report)
    }

    /// Tick on the configured interval until `shutdown` becomes `true` or its
    /// sender is dropped. A tick in progress always finishes first.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.config.interval.as_secs(), "due poller starting");

        let mut ticker = time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            if let Err(e) = self.tick().await {
                error!(error = %e, "tick aborted");
            }

            if *shutdown.borrow() {
                break;
            }
        }

        info!("due poller stopped");
    }
}
