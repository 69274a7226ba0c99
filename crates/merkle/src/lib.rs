//! Recipient commitment trees.
//!
//! Builds a SHA-256 binary tree over an ordered recipient list and hands out
//! one membership proof per recipient. The same leaf and pair hashing is used
//! by the on-chain program when it checks a claim, so a proof that verifies
//! here verifies there.

mod tree;

use cadence_core::{Address, Digest, MerkleProof, Recipient};
use sha2::{Digest as _, Sha256};
use thiserror::Error;

pub use tree::{build_tree, verify_proof, MerkleTree};

/// Digest used to pad the leaf level up to a power of two.
pub const ZERO_DIGEST: Digest = [0u8; 32];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MerkleError {
    #[error("cannot build a tree with no recipients")]
    EmptyInput,
}

/// Leaf digest: `sha256(address || amount_le)`.
pub fn hash_leaf(address: &Address, amount: u64) -> Digest {
    let mut hasher = Sha256::new();
    hasher.update(address);
    hasher.update(amount.to_le_bytes());
    hasher.finalize().into()
}

/// Inner node digest: `sha256(left || right)`.
pub fn hash_pair(left: &Digest, right: &Digest) -> Digest {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// Leaf digest for a recipient.
pub fn recipient_leaf(recipient: &Recipient) -> Digest {
    hash_leaf(&recipient.address, recipient.amount)
}

/// Check a recipient's proof against a root.
pub fn verify_recipient(recipient: &Recipient, proof: &MerkleProof, root: &Digest) -> bool {
    verify_proof(&recipient_leaf(recipient), &proof.siblings, proof.leaf_index, root)
}

/// Proof for the recipient at `index`, or `None` if out of range.
///
/// Rebuilds the whole tree; use [`build_tree`] when proofs for many
/// recipients are needed.
pub fn proof_for(recipients: &[Recipient], index: usize) -> Option<MerkleProof> {
    if index >= recipients.len() {
        return None;
    }
    build_tree(recipients)
        .ok()
        .and_then(|tree| tree.proofs.into_iter().nth(index))
}

/// Leaf index of the first recipient paid to `address`.
pub fn find_recipient_index(recipients: &[Recipient], address: &Address) -> Option<usize> {
    recipients.iter().position(|r| &r.address == address)
}
