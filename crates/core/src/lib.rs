//! Cadence Core
//!
//! Data model shared by every Cadence crate: recipients, membership proofs,
//! schedule commitments, and the read-only view of a schedule's ledger state.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// 32-byte account address (recipient wallet, schedule account, vault, mint).
pub type Address = [u8; 32];

/// 32-byte schedule identifier chosen by the employer at creation time.
pub type ScheduleId = [u8; 32];

/// 32-byte SHA-256 digest.
pub type Digest = [u8; 32];

/// A single payout line: who gets paid and how much per execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Recipient {
    pub address: Address,
    pub amount: u64,
}

impl Recipient {
    pub fn new(address: Address, amount: u64) -> Self {
        Self { address, amount }
    }
}

/// Membership proof for one leaf of a commitment tree.
///
/// `siblings` is ordered leaf to root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub leaf_index: u32,
    pub siblings: Vec<Digest>,
}

/// A registered payout commitment: the full recipient list, its proofs and root.
///
/// Recipient order defines leaf indices and must never be changed after
/// the root has been computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleCommitment {
    /// Schedule account on the ledger.
    pub schedule: Address,
    pub schedule_id: ScheduleId,
    pub vault_employer: Address,
    pub token_mint: Address,
    pub recipients: Vec<Recipient>,
    /// Aligned by index with `recipients`.
    pub proofs: Vec<MerkleProof>,
    pub merkle_root: Digest,
    /// Unix seconds.
    pub created_at: u64,
}

impl ScheduleCommitment {
    pub fn recipient_count(&self) -> usize {
        self.recipients.len()
    }

    /// Iterate `(leaf_index, recipient, proof)` in ascending leaf order.
    pub fn entries(&self) -> impl Iterator<Item = (u32, &Recipient, &MerkleProof)> {
        self.recipients
            .iter()
            .zip(self.proofs.iter())
            .map(|(r, p)| (p.leaf_index, r, p))
    }
}

/// Lifecycle status of a schedule as recorded by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ScheduleStatus {
    Active = 0,
    Paused = 1,
    Cancelled = 2,
}

impl ScheduleStatus {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Active),
            1 => Some(Self::Paused),
            2 => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        match self {
            Self::Active => true,
            Self::Paused | Self::Cancelled => false,
        }
    }
}

/// Runtime fields of a schedule read from the ledger. Never written by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRuntime {
    /// Schedule account address.
    pub schedule: Address,
    pub schedule_id: ScheduleId,
    pub vault: Address,
    pub status: ScheduleStatus,
    /// Unix seconds.
    pub next_execution: u64,
    pub total_recipients: u16,
    /// One bit per leaf index, least significant bit first within each byte.
    pub paid_bitmap: Vec<u8>,
}

impl ScheduleRuntime {
    /// Active and overdue at `now` (unix seconds).
    pub fn is_due(&self, now: u64) -> bool {
        self.status.is_active() && self.next_execution <= now
    }

    pub fn is_paid(&self, leaf_index: u32) -> bool {
        bitmap_is_set(&self.paid_bitmap, leaf_index)
    }
}

/// Test a leaf index in a paid bitmap. Indices past the end read as unpaid.
pub fn bitmap_is_set(bitmap: &[u8], leaf_index: u32) -> bool {
    let byte = (leaf_index / 8) as usize;
    let bit = leaf_index % 8;
    bitmap.get(byte).is_some_and(|b| (b >> bit) & 1 == 1)
}

/// Set a leaf index in a paid bitmap, growing it if needed.
pub fn bitmap_set(bitmap: &mut Vec<u8>, leaf_index: u32) {
    let byte = (leaf_index / 8) as usize;
    if bitmap.len() <= byte {
        bitmap.resize(byte + 1, 0);
    }
    bitmap[byte] |= 1 << (leaf_index % 8);
}

/// Phase of one schedule's delegate / claim / commit run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelinePhase {
    Pending,
    Delegated,
    Claiming,
    Committed,
    Failed,
}

impl PipelinePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Delegated => "delegated",
            Self::Claiming => "claiming",
            Self::Committed => "committed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "delegated" => Some(Self::Delegated),
            "claiming" => Some(Self::Claiming),
            "committed" => Some(Self::Committed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Whether write authority is currently held by the rollup.
    pub fn holds_delegation(&self) -> bool {
        matches!(self, Self::Delegated | Self::Claiming)
    }
}

impl fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current unix timestamp in seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
