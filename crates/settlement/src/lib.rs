//! Cadence Settlement
//!
//! Client-side account types, PDA derivation, and instruction builders for the
//! payout ledger program and its rollup. The coordinator uses these to read
//! schedule accounts and to build the delegate / claim / commit instructions.
//!
//! This crate does NOT contain the on-chain program itself.

pub mod accounts;
pub mod instruction;
pub mod pda;

pub use accounts::*;
pub use pda::*;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),
    #[error("account discriminator mismatch")]
    WrongDiscriminator,
    #[error("account data truncated")]
    Truncated,
}
