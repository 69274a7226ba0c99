//! Cadence Store
//!
//! The coordinator is the only holder of full recipient lists: the ledger keeps
//! just the root. [`ScheduleStore`] persists registered commitments, and
//! [`PhaseJournal`] persists how far each schedule's delegate / claim / commit
//! run got, so a restart resumes instead of re-delegating.
//!
//! Two backends: [`MemoryStore`] for tests and ephemeral runs, and
//! [`SqliteStore`] for durable deployments. SQLite calls run on tokio's
//! blocking pool.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use cadence_core::{Address, PipelinePhase, ScheduleCommitment};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("corrupt record for {schedule}: {reason}")]
    Corrupt { schedule: String, reason: String },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Keyed storage of registered commitments, addressed by schedule account.
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    /// Insert or replace the commitment for `schedule`.
    async fn set(&self, schedule: &Address, commitment: &ScheduleCommitment) -> Result<()>;

    /// Store the commitment only if `schedule` has none yet, atomically.
    /// Returns whether it was inserted.
    async fn insert_if_absent(
        &self,
        schedule: &Address,
        commitment: &ScheduleCommitment,
    ) -> Result<bool>;

    async fn get(&self, schedule: &Address) -> Result<Option<ScheduleCommitment>>;

    async fn has(&self, schedule: &Address) -> Result<bool>;

    /// Returns whether a record was removed.
    async fn delete(&self, schedule: &Address) -> Result<bool>;

    async fn get_all(&self) -> Result<Vec<ScheduleCommitment>>;

    async fn count(&self) -> Result<usize> {
        Ok(self.get_all().await?.len())
    }
}

/// Durable marker of the last phase a schedule's pipeline completed.
///
/// Only `Delegated` and `Claiming` are ever stored: they mean the rollup holds
/// write authority and the next run must not delegate again.
#[async_trait]
pub trait PhaseJournal: Send + Sync {
    async fn record(&self, schedule: &Address, phase: PipelinePhase) -> Result<()>;

    async fn load(&self, schedule: &Address) -> Result<Option<PipelinePhase>>;

    async fn clear(&self, schedule: &Address) -> Result<()>;
}
