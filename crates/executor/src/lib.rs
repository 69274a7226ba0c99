//! Cadence Executor
//!
//! Finds schedules that are due on the ledger and pays them out through the
//! three-phase protocol: delegate the schedule account to the rollup, submit
//! one claim per recipient there, then commit state back to the ledger.
//!
//! - [`DuePoller`] ticks on an interval and feeds due schedules, one at a time,
//!   to the [`ExecutionPipeline`].
//! - [`LedgerClient`] and [`RollupClient`] are the remote seams; [`rpc`] holds
//!   the JSON-RPC implementations.

pub mod client;
pub mod confirm;
pub mod pipeline;
pub mod poller;
pub mod rpc;

pub use client::{ClaimRequest, ClaimResponse, LedgerClient, RollupClient, SubmitResult};
pub use confirm::{ConfirmPolicy, SignatureStatus};
pub use pipeline::{
    ClaimOutcome, ClaimRecord, ClaimSummary, CommitStatus, ExecutionOutcome, ExecutionPipeline,
    PipelineConfig,
};
pub use poller::{Clock, DuePoller, PollerConfig, SystemClock, TickReport};
pub use rpc::{JsonRpcClient, RpcLedgerClient, RpcRollupClient};

use cadence_settlement::SettlementError;
use cadence_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("delegation failed after {attempts} attempt(s): {reason}")]
    Delegation { attempts: u32, reason: String },
    #[error("rollup paid bitmap unavailable: {0}")]
    BitmapUnavailable(String),
    #[error("commit failed: {0}")]
    Commit(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("rpc error {code}: {message}")]
    Rpc { code: i32, message: String },
    #[error("invalid rpc response: {0}")]
    InvalidResponse(String),
    #[error("transaction {signature} failed: {reason}")]
    TransactionFailed { signature: String, reason: String },
    #[error("confirmation timeout after {attempts} attempts")]
    ConfirmationTimeout { attempts: u32 },
    #[error("leaf index {0} exceeds program limit")]
    LeafIndexOutOfRange(u32),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Settlement(#[from] SettlementError),
}

impl From<reqwest::Error> for ExecutorError {
    fn from(e: reqwest::Error) -> Self {
        ExecutorError::Transport(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ExecutorError>;
