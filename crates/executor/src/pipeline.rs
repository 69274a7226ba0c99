//! Delegate / claim / commit pipeline for one due schedule.
//!
//! 1. Delegate the schedule account to the rollup (retried once by default).
//! 2. Claim every unpaid leaf in ascending leaf order, continuing past
//!    individual rejections and errors.
//! 3. Commit back to the ledger, always, so delegation is released even when
//!    some claims failed.
//!
//! The last completed phase is written to a [`PhaseJournal`]. A run that finds
//! `Delegated` or `Claiming` skips step 1 and picks up at step 2, skipping
//! leaves the rollup's paid bitmap already marks. If that bitmap cannot be
//! read the run fails without claiming and the next tick tries again.

use std::sync::Arc;
use std::time::Duration;

use cadence_core::{Address, PipelinePhase, ScheduleCommitment, ScheduleRuntime};
use cadence_store::PhaseJournal;
use tracing::{debug, error, info, warn};

use crate::client::{ClaimRequest, ClaimResponse, LedgerClient, RollupClient, SubmitResult};
use crate::{ExecutorError, Result};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Delegation attempts before the run is abandoned (default 2).
    pub delegate_attempts: u32,
    /// Pause between delegation attempts.
    pub retry_delay: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            delegate_attempts: 2,
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// Result of one recipient's claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    Accepted { signature: String },
    /// The rollup processed and refused the claim.
    Rejected { reason: String },
    /// The claim never got an answer, or was not sent.
    Error { reason: String },
    /// Already marked in the paid bitmap; not resubmitted.
    AlreadyPaid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimRecord {
    pub leaf_index: u32,
    pub recipient: Address,
    pub amount: u64,
    pub outcome: ClaimOutcome,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClaimSummary {
    pub accepted: usize,
    pub rejected: usize,
    pub errored: usize,
    pub already_paid: usize,
}

impl ClaimSummary {
    pub fn from_records(records: &[ClaimRecord]) -> Self {
        let mut summary = Self::default();
        for record in records {
            match record.outcome {
                ClaimOutcome::Accepted { .. } => summary.accepted += 1,
                ClaimOutcome::Rejected { .. } => summary.rejected += 1,
                ClaimOutcome::Error { .. } => summary.errored += 1,
                ClaimOutcome::AlreadyPaid => summary.already_paid += 1,
            }
        }
        summary
    }

    /// Claims that did not end up paid.
    pub fn failed(&self) -> usize {
        self.rejected + self.errored
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitStatus {
    NotAttempted,
    Committed { signature: String },
    Failed { reason: String },
}

/// What one pipeline run did.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub schedule: Address,
    /// `Committed` or `Failed` once the run returns.
    pub phase: PipelinePhase,
    /// Whether delegation was inherited from an earlier run.
    pub resumed: bool,
    pub claims: Vec<ClaimRecord>,
    pub commit: CommitStatus,
    pub error: Option<String>,
}

impl ExecutionOutcome {
    fn new(schedule: Address) -> Self {
        Self {
            schedule,
            phase: PipelinePhase::Pending,
            resumed: false,
            claims: Vec::new(),
            commit: CommitStatus::NotAttempted,
            error: None,
        }
    }

    fn fail(&mut self, error: &ExecutorError) {
        self.phase = PipelinePhase::Failed;
        self.error = Some(error.to_string());
    }

    pub fn summary(&self) -> ClaimSummary {
        ClaimSummary::from_records(&self.claims)
    }

    pub fn is_committed(&self) -> bool {
        self.phase == PipelinePhase::Committed
    }
}

enum Resume {
    Fresh,
    /// Still delegated from an earlier run; carries the rollup's paid bitmap.
    Delegated(Vec<u8>),
    BitmapUnavailable(ExecutorError),
}

pub struct ExecutionPipeline {
    ledger: Arc<dyn LedgerClient>,
    rollup: Arc<dyn RollupClient>,
    journal: Arc<dyn PhaseJournal>,
    config: PipelineConfig,
}

impl ExecutionPipeline {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        rollup: Arc<dyn RollupClient>,
        journal: Arc<dyn PhaseJournal>,
        config: PipelineConfig,
    ) -> Self {
        Self { ledger, rollup, journal, config }
    }

    /// Run the three phases for one due schedule.
    ///
    /// Remote failures end up in the returned outcome. `Err` means the phase
    /// journal could not be read, and nothing was submitted.
    pub async fn run(
        &self,
        schedule: &ScheduleRuntime,
        commitment: &ScheduleCommitment,
    ) -> Result<ExecutionOutcome> {
        let address = schedule.schedule;
        let mut outcome = ExecutionOutcome::new(address);

        let bitmap = match self.resume_point(schedule).await? {
            Resume::Delegated(bitmap) => {
                outcome.resumed = true;
                bitmap
            }
            Resume::BitmapUnavailable(e) => {
                error!(
                    schedule = hex::encode(address),
                    error = %e,
                    "cannot resume without the rollup bitmap, retrying next tick"
                );
                outcome.resumed = true;
                outcome.fail(&e);
                return Ok(outcome);
            }
            Resume::Fresh => {
                match self.delegate_with_retry(schedule).await {
                    Ok(result) => {
                        info!(
                            schedule = hex::encode(address),
                            signature = %result.signature,
                            "schedule delegated"
                        );
                    }
                    Err(e) => {
                        error!(schedule = hex::encode(address), error = %e, "delegation failed");
                        outcome.fail(&e);
                        return Ok(outcome);
                    }
                }
                self.mark(&address, PipelinePhase::Delegated).await;
                self.current_bitmap(schedule).await
            }
        };

        outcome.phase = PipelinePhase::Claiming;
        self.mark(&address, PipelinePhase::Claiming).await;
        outcome.claims = self.claim_all(schedule, commitment, &bitmap).await;

        let summary = outcome.summary();
        info!(
            schedule = hex::encode(address),
            accepted = summary.accepted,
            rejected = summary.rejected,
            errored = summary.errored,
            already_paid = summary.already_paid,
            "claims processed"
        );

        match self.ledger.commit(schedule).await {
            Ok(result) => {
                info!(
                    schedule = hex::encode(address),
                    signature = %result.signature,
                    "schedule committed"
                );
                if let Err(e) = self.journal.clear(&address).await {
                    warn!(schedule = hex::encode(address), error = %e, "failed to clear phase marker");
                }
                outcome.commit = CommitStatus::Committed { signature: result.signature };
                outcome.phase = PipelinePhase::Committed;
            }
            Err(e) => {
                let e = ExecutorError::Commit(e.to_string());
                error!(schedule = hex::encode(address), error = %e, "commit failed, will resume next tick");
                outcome.commit = CommitStatus::Failed { reason: e.to_string() };
                outcome.fail(&e);
            }
        }

        Ok(outcome)
    }

    /// Where this run starts, given the phase journal and the rollup.
    ///
    /// A marker the rollup does not back up (it no longer holds the account)
    /// is stale and is dropped so the run delegates afresh. A marker with an
    /// unreadable rollup bitmap cannot be resumed: the ledger bitmap misses
    /// claims paid since delegation.
    async fn resume_point(&self, schedule: &ScheduleRuntime) -> Result<Resume> {
        let address = schedule.schedule;
        let Some(phase) = self.journal.load(&address).await? else {
            return Ok(Resume::Fresh);
        };
        if !phase.holds_delegation() {
            return Ok(Resume::Fresh);
        }

        match self.rollup.paid_bitmap(&address).await {
            Ok(Some(bitmap)) => {
                info!(schedule = hex::encode(address), phase = %phase, "resuming delegated schedule");
                Ok(Resume::Delegated(bitmap))
            }
            Ok(None) => {
                warn!(
                    schedule = hex::encode(address),
                    phase = %phase,
                    "rollup does not hold schedule, discarding stale phase marker"
                );
                if let Err(e) = self.journal.clear(&address).await {
                    warn!(schedule = hex::encode(address), error = %e, "failed to clear phase marker");
                }
                Ok(Resume::Fresh)
            }
            Err(e) => Ok(Resume::BitmapUnavailable(ExecutorError::BitmapUnavailable(e.to_string()))),
        }
    }

    /// Paid bitmap after delegation: the rollup's view, else the ledger's.
    async fn current_bitmap(&self, schedule: &ScheduleRuntime) -> Vec<u8> {
        match self.rollup.paid_bitmap(&schedule.schedule).await {
            Ok(Some(bitmap)) => bitmap,
            Ok(None) => schedule.paid_bitmap.clone(),
            Err(e) => {
                debug!(schedule = hex::encode(schedule.schedule), error = %e, "using ledger bitmap");
                schedule.paid_bitmap.clone()
            }
        }
    }

    async fn delegate_with_retry(&self, schedule: &ScheduleRuntime) -> Result<SubmitResult> {
        let attempts = self.config.delegate_attempts.max(1);
        let mut last_error = String::new();
        for attempt in 1..=attempts {
            match self.ledger.delegate(schedule).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    warn!(
                        schedule = hex::encode(schedule.schedule),
                        attempt,
                        error = %e,
                        "delegation attempt failed"
                    );
                    last_error = e.to_string();
                    if attempt < attempts {
                        tokio::time::sleep(self.config.retry_delay).await;
                    }
                }
            }
        }
        Err(ExecutorError::Delegation { attempts, reason: last_error })
    }

    async fn claim_all(
        &self,
        schedule: &ScheduleRuntime,
        commitment: &ScheduleCommitment,
        bitmap: &[u8],
    ) -> Vec<ClaimRecord> {
        let mut entries: Vec<_> = commitment.entries().collect();
        entries.sort_by_key(|(leaf_index, _, _)| *leaf_index);

        let mut records = Vec::with_capacity(entries.len());
        for (leaf_index, recipient, proof) in entries {
            let outcome = if cadence_core::bitmap_is_set(bitmap, leaf_index) {
                debug!(schedule = hex::encode(schedule.schedule), leaf_index, "already paid");
                ClaimOutcome::AlreadyPaid
            } else if !cadence_merkle::verify_recipient(recipient, proof, &commitment.merkle_root) {
                error!(
                    schedule = hex::encode(schedule.schedule),
                    leaf_index,
                    "stored proof does not verify against root, not submitting"
                );
                ClaimOutcome::Error { reason: "proof does not verify against root".to_string() }
            } else {
                let request = ClaimRequest {
                    schedule: schedule.schedule,
                    schedule_id: schedule.schedule_id,
                    vault: schedule.vault,
                    token_mint: commitment.token_mint,
                    recipient: recipient.address,
                    amount: recipient.amount,
                    leaf_index,
                    proof: proof.siblings.clone(),
                };
                self.claim_one(&request).await
            };
            records.push(ClaimRecord {
                leaf_index,
                recipient: recipient.address,
                amount: recipient.amount,
                outcome,
            });
        }
        records
    }

    async fn claim_one(&self, request: &ClaimRequest) -> ClaimOutcome {
        match self.rollup.claim(request).await {
            Ok(ClaimResponse::Accepted(result)) => {
                debug!(
                    schedule = hex::encode(request.schedule),
                    leaf_index = request.leaf_index,
                    signature = %result.signature,
                    "claim accepted"
                );
                ClaimOutcome::Accepted { signature: result.signature }
            }
            Ok(ClaimResponse::Rejected { reason, .. }) => {
                warn!(
                    schedule = hex::encode(request.schedule),
                    leaf_index = request.leaf_index,
                    reason = %reason,
                    "claim rejected"
                );
                ClaimOutcome::Rejected { reason }
            }
            Err(e) => {
                warn!(
                    schedule = hex::encode(request.schedule),
                    leaf_index = request.leaf_index,
                    error = %e,
                    "claim failed"
                );
                ClaimOutcome::Error { reason: e.to_string() }
            }
        }
    }

    /// Persist a phase marker. Failures are logged, never returned.
    async fn mark(&self, schedule: &Address, phase: PipelinePhase) {
        if let Err(e) = self.journal.record(schedule, phase).await {
            warn!(schedule = hex::encode(schedule), phase = %phase, error = %e, "failed to record phase");
        }
    }
}
