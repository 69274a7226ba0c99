//! Instruction builders for the payout ledger program.
//!
//! Each function produces serialized instruction data (discriminator + payload)
//! plus the account list the program expects, bundled as a [`BuiltInstruction`].

use cadence_core::{Address, Digest, ScheduleId};
use serde::{Deserialize, Serialize};

use crate::pda;
use crate::SettlementError;

/// Instruction discriminators (first byte of instruction data).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InstructionType {
    DelegateSchedule = 0,
    ClaimPayment = 1,
    CommitSchedule = 2,
}

// -- Instruction data structs --

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegateSchedule {
    pub schedule_id: ScheduleId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimPayment {
    pub schedule_id: ScheduleId,
    pub recipient: Address,
    pub amount: u64,
    pub leaf_index: u16,
    pub proof: Vec<Digest>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSchedule {
    pub schedule: Address,
}

/// Account metadata for instruction building.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountMeta {
    pub pubkey: Address,
    pub is_signer: bool,
    pub is_writable: bool,
}

impl AccountMeta {
    fn writable(pubkey: Address) -> Self {
        Self { pubkey, is_signer: false, is_writable: true }
    }

    fn readonly(pubkey: Address) -> Self {
        Self { pubkey, is_signer: false, is_writable: false }
    }

    fn signer(pubkey: Address) -> Self {
        Self { pubkey, is_signer: true, is_writable: true }
    }
}

/// A fully built instruction ready for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltInstruction {
    pub program_id: Address,
    pub data: Vec<u8>,
    pub accounts: Vec<AccountMeta>,
    /// Human-readable description for logging.
    pub description: String,
}

/// Build serialized instruction data: `[discriminator_byte] ++ bincode(payload)`.
fn build_data<T: Serialize>(discriminator: InstructionType, data: &T) -> Result<Vec<u8>, SettlementError> {
    let payload = bincode::serialize(data)?;
    let mut buf = Vec::with_capacity(1 + payload.len());
    buf.push(discriminator as u8);
    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// Hand write authority for a schedule account to the rollup.
pub fn delegate_schedule(
    program_id: &Address,
    authority: &Address,
    schedule: &Address,
    schedule_id: ScheduleId,
) -> Result<BuiltInstruction, SettlementError> {
    let data = build_data(InstructionType::DelegateSchedule, &DelegateSchedule { schedule_id })?;
    Ok(BuiltInstruction {
        program_id: *program_id,
        data,
        accounts: vec![
            AccountMeta::signer(*authority),
            AccountMeta::readonly(pda::config_pda(program_id)),
            AccountMeta::writable(*schedule),
        ],
        description: format!("delegate_schedule(schedule={})", short(schedule)),
    })
}

/// Pay one recipient on the rollup, proving membership against the schedule root.
pub fn claim_payment(
    program_id: &Address,
    authority: &Address,
    schedule: &Address,
    vault: &Address,
    token_mint: &Address,
    payload: ClaimPayment,
) -> Result<BuiltInstruction, SettlementError> {
    let recipient_ata = pda::associated_token_address(&payload.recipient, token_mint);
    let description = format!(
        "claim_payment(schedule={}, recipient={}, amount={}, leaf={})",
        short(schedule),
        short(&payload.recipient),
        payload.amount,
        payload.leaf_index,
    );
    let data = build_data(InstructionType::ClaimPayment, &payload)?;
    Ok(BuiltInstruction {
        program_id: *program_id,
        data,
        accounts: vec![
            AccountMeta::signer(*authority),
            AccountMeta::readonly(pda::config_pda(program_id)),
            AccountMeta::writable(*vault),
            AccountMeta::writable(pda::vault_ata_pda(program_id, vault)),
            AccountMeta::writable(*schedule),
            AccountMeta::writable(recipient_ata),
            AccountMeta::readonly(*token_mint),
        ],
        description,
    })
}

/// Commit rollup state for a schedule back to the ledger and release delegation.
pub fn commit_schedule(
    program_id: &Address,
    authority: &Address,
    schedule: &Address,
) -> Result<BuiltInstruction, SettlementError> {
    let data = build_data(InstructionType::CommitSchedule, &CommitSchedule { schedule: *schedule })?;
    Ok(BuiltInstruction {
        program_id: *program_id,
        data,
        accounts: vec![
            AccountMeta::signer(*authority),
            AccountMeta::readonly(pda::config_pda(program_id)),
            AccountMeta::writable(*schedule),
        ],
        description: format!("commit_schedule(schedule={})", short(schedule)),
    })
}

/// Leading bytes as hex, for log descriptions.
fn short(address: &Address) -> String {
    hex::encode(&address[..4])
}
