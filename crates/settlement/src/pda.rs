//! Program-derived addresses for payout accounts.
//!
//! Seeds match the payout program, so the coordinator can locate a vault or
//! schedule account from its owner and id alone.

use cadence_core::{Address, ScheduleId};
use sha2::{Digest, Sha256};

/// Seed prefixes matching the on-chain program.
pub mod seeds {
    pub const CONFIG: &[u8] = b"config";
    pub const VAULT: &[u8] = b"vault";
    pub const VAULT_ATA: &[u8] = b"vault_ata";
    pub const SCHEDULE: &[u8] = b"schedule";
    pub const TOKEN_ACCOUNT: &[u8] = b"token_account";
}

/// Derive a PDA by hashing seeds together.
///
/// Simplified off-chain derivation (no bump search). Deterministic for a
/// given program and seed list, which is all account lookup needs.
pub fn derive_pda(program_id: &Address, seeds: &[&[u8]]) -> Address {
    let mut hasher = Sha256::new();
    for seed in seeds {
        hasher.update(seed);
    }
    hasher.update(program_id);
    hasher.update(b"ProgramDerivedAddress");
    hasher.finalize().into()
}

/// Global program config PDA.
pub fn config_pda(program_id: &Address) -> Address {
    derive_pda(program_id, &[seeds::CONFIG])
}

/// Employer vault PDA.
pub fn vault_pda(program_id: &Address, employer: &Address) -> Address {
    derive_pda(program_id, &[seeds::VAULT, employer])
}

/// Token account owned by a vault.
pub fn vault_ata_pda(program_id: &Address, vault: &Address) -> Address {
    derive_pda(program_id, &[seeds::VAULT_ATA, vault])
}

/// Schedule PDA: `[b"schedule", vault, schedule_id]`.
pub fn schedule_pda(program_id: &Address, vault: &Address, schedule_id: &ScheduleId) -> Address {
    derive_pda(program_id, &[seeds::SCHEDULE, vault, schedule_id])
}

/// Recipient token account for a mint.
///
/// Derived under the mint rather than the payout program, so the same
/// recipient has one token account per mint regardless of schedule.
pub fn associated_token_address(owner: &Address, mint: &Address) -> Address {
    derive_pda(mint, &[seeds::TOKEN_ACCOUNT, owner])
}
