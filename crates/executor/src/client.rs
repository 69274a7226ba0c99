//! Remote seams: the ledger that owns schedule accounts and the rollup that
//! processes claims while a schedule is delegated to it.
//!
//! Both are async traits so the pipeline can be driven by the JSON-RPC
//! clients in [`crate::rpc`] or by in-process fakes.

use async_trait::async_trait;
use cadence_core::{Address, Digest, ScheduleId, ScheduleRuntime};

use crate::Result;

/// Result of submitting a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitResult {
    /// Transaction signature as reported by the remote.
    pub signature: String,
    /// Whether the transaction was confirmed.
    pub confirmed: bool,
}

/// Everything needed to build one claim instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimRequest {
    pub schedule: Address,
    pub schedule_id: ScheduleId,
    pub vault: Address,
    pub token_mint: Address,
    pub recipient: Address,
    pub amount: u64,
    pub leaf_index: u32,
    pub proof: Vec<Digest>,
}

/// How the rollup answered a claim that reached it.
///
/// Transport failures are not a response; they surface as `Err`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimResponse {
    Accepted(SubmitResult),
    Rejected { signature: Option<String>, reason: String },
}

#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// All schedule accounts owned by the payout program.
    async fn fetch_schedules(&self) -> Result<Vec<ScheduleRuntime>>;

    /// Hand write authority over `schedule` to the rollup.
    async fn delegate(&self, schedule: &ScheduleRuntime) -> Result<SubmitResult>;

    /// Write rollup state back to the ledger and end the delegation.
    async fn commit(&self, schedule: &ScheduleRuntime) -> Result<SubmitResult>;
}

#[async_trait]
pub trait RollupClient: Send + Sync {
    /// Paid bitmap as the rollup currently sees it, or `None` if the rollup
    /// does not hold the schedule account (it is not delegated).
    async fn paid_bitmap(&self, schedule: &Address) -> Result<Option<Vec<u8>>>;

    async fn claim(&self, request: &ClaimRequest) -> Result<ClaimResponse>;
}
