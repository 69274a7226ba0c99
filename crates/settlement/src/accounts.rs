//! On-chain account types (client-side serialization).
//!
//! These types mirror the on-chain account structures. Serialized as an
//! 8-byte discriminator followed by bincode.

use cadence_core::{bitmap_is_set, Address, Digest, ScheduleId, ScheduleRuntime, ScheduleStatus};
use serde::{Deserialize, Serialize};

use crate::SettlementError;

/// Maximum recipients per schedule (one bit each in the paid bitmap).
pub const MAX_RECIPIENTS: usize = 1024;

/// Paid bitmap size in bytes.
pub const PAID_BITMAP_LEN: usize = MAX_RECIPIENTS / 8;

/// Schedule account, one per payout schedule.
///
/// PDA seeds: `[b"schedule", vault, schedule_id]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleAccount {
    pub employer: Address,
    pub vault: Address,
    pub schedule_id: ScheduleId,
    pub status: ScheduleStatus,
    pub interval_secs: u64,
    /// Unix seconds of the next due execution.
    pub next_execution: u64,
    pub reserved_amount: u64,
    /// Total paid out per execution across all recipients.
    pub per_execution_amount: u64,
    pub merkle_root: Digest,
    pub total_recipients: u16,
    /// Recipients paid in the current batch.
    pub paid_count: u16,
    /// [`PAID_BITMAP_LEN`] bytes, one bit per leaf index.
    pub paid_bitmap: Vec<u8>,
    /// Completed executions, used for replay protection.
    pub last_executed_batch: u64,
    pub bump: u8,
}

impl ScheduleAccount {
    /// Account discriminator.
    pub const DISCRIMINATOR: [u8; 8] = *b"schedacc";

    pub fn to_bytes(&self) -> Result<Vec<u8>, SettlementError> {
        let body = bincode::serialize(self)?;
        let mut out = Vec::with_capacity(8 + body.len());
        out.extend_from_slice(&Self::DISCRIMINATOR);
        out.extend_from_slice(&body);
        Ok(out)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, SettlementError> {
        if data.len() < 8 {
            return Err(SettlementError::Truncated);
        }
        if data[..8] != Self::DISCRIMINATOR {
            return Err(SettlementError::WrongDiscriminator);
        }
        Ok(bincode::deserialize(&data[8..])?)
    }

    pub fn is_paid(&self, leaf_index: u32) -> bool {
        bitmap_is_set(&self.paid_bitmap, leaf_index)
    }

    pub fn is_due(&self, now: u64) -> bool {
        self.status.is_active() && self.next_execution <= now
    }

    /// The fields the coordinator schedules on, keyed by the account address.
    pub fn runtime(&self, address: Address) -> ScheduleRuntime {
        ScheduleRuntime {
            schedule: address,
            schedule_id: self.schedule_id,
            vault: self.vault,
            status: self.status,
            next_execution: self.next_execution,
            total_recipients: self.total_recipients,
            paid_bitmap: self.paid_bitmap.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> ScheduleAccount {
        let mut paid_bitmap = vec![0u8; PAID_BITMAP_LEN];
        paid_bitmap[0] = 0b0000_0101;
        ScheduleAccount {
            employer: [1u8; 32],
            vault: [2u8; 32],
            schedule_id: [3u8; 32],
            status: ScheduleStatus::Active,
            interval_secs: 86_400,
            next_execution: 1_700_000_000,
            reserved_amount: 600_000,
            per_execution_amount: 600_000,
            merkle_root: [4u8; 32],
            total_recipients: 3,
            paid_count: 2,
            paid_bitmap,
            last_executed_batch: 0,
            bump: 255,
        }
    }

    #[test]
    fn test_schedule_account_roundtrip() {
        let acc = account();
        let bytes = acc.to_bytes().unwrap();
        assert_eq!(&bytes[..8], &ScheduleAccount::DISCRIMINATOR);
        assert_eq!(ScheduleAccount::from_bytes(&bytes).unwrap(), acc);
    }

    #[test]
    fn test_rejects_foreign_account() {
        let mut bytes = account().to_bytes().unwrap();
        bytes[0] ^= 0xFF;
        assert!(matches!(
            ScheduleAccount::from_bytes(&bytes),
            Err(SettlementError::WrongDiscriminator)
        ));
        assert!(matches!(
            ScheduleAccount::from_bytes(&[1, 2, 3]),
            Err(SettlementError::Truncated)
        ));
    }

    #[test]
    fn test_paid_bits() {
        let acc = account();
        assert!(acc.is_paid(0));
        assert!(!acc.is_paid(1));
        assert!(acc.is_paid(2));
        assert!(!acc.is_paid(1023));
    }

    #[test]
    fn test_runtime_view() {
        let acc = account();
        let rt = acc.runtime([9u8; 32]);
        assert_eq!(rt.schedule, [9u8; 32]);
        assert_eq!(rt.schedule_id, acc.schedule_id);
        assert!(rt.is_paid(2));
        assert!(rt.is_due(1_700_000_000));
        assert!(!acc.is_due(1_699_999_999));
    }
}
