use cadence_core::{Digest, MerkleProof, Recipient};

use crate::{hash_pair, recipient_leaf, MerkleError, ZERO_DIGEST};

/// Root plus one proof per recipient, aligned by index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleTree {
    pub root: Digest,
    pub proofs: Vec<MerkleProof>,
}

impl MerkleTree {
    /// Number of leaves after padding.
    pub fn padded_len(&self) -> usize {
        let depth = self.proofs.first().map(|p| p.siblings.len()).unwrap_or(0);
        1 << depth
    }
}

/// Build the commitment tree for an ordered recipient list.
///
/// The leaf level is padded with [`ZERO_DIGEST`] to the next power of two, so
/// every level has an even node count. A single recipient still gets one
/// padding sibling.
pub fn build_tree(recipients: &[Recipient]) -> Result<MerkleTree, MerkleError> {
    if recipients.is_empty() {
        return Err(MerkleError::EmptyInput);
    }

    let mut level: Vec<Digest> = recipients.iter().map(recipient_leaf).collect();
    let target = level.len().next_power_of_two().max(2);
    level.resize(target, ZERO_DIGEST);

    let mut proofs: Vec<MerkleProof> = (0..recipients.len())
        .map(|i| MerkleProof {
            leaf_index: i as u32,
            siblings: Vec::with_capacity(target.trailing_zeros() as usize),
        })
        .collect();
    // Position of each recipient's path node within the current level.
    let mut positions: Vec<usize> = (0..recipients.len()).collect();

    while level.len() > 1 {
        for (proof, pos) in proofs.iter_mut().zip(positions.iter_mut()) {
            proof.siblings.push(level[*pos ^ 1]);
            *pos /= 2;
        }

        level = level
            .chunks_exact(2)
            .map(|pair| hash_pair(&pair[0], &pair[1]))
            .collect();
    }

    Ok(MerkleTree {
        root: level[0],
        proofs,
    })
}

/// Recompute the root from a leaf and its siblings and compare.
///
/// Even index: `hash(current || sibling)`; odd index: `hash(sibling || current)`.
pub fn verify_proof(leaf: &Digest, siblings: &[Digest], leaf_index: u32, root: &Digest) -> bool {
    let mut computed = *leaf;
    let mut idx = leaf_index;

    for sibling in siblings {
        computed = if idx % 2 == 0 {
            hash_pair(&computed, sibling)
        } else {
            hash_pair(sibling, &computed)
        };
        idx /= 2;
    }

    &computed == root
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash_leaf;

    #[test]
    fn test_empty_input() {
        assert_eq!(build_tree(&[]), Err(MerkleError::EmptyInput));
    }

    #[test]
    fn test_two_leaves() {
        let a = Recipient::new([1u8; 32], 10);
        let b = Recipient::new([2u8; 32], 20);
        let tree = build_tree(&[a, b]).unwrap();

        let la = hash_leaf(&a.address, a.amount);
        let lb = hash_leaf(&b.address, b.amount);
        assert_eq!(tree.root, hash_pair(&la, &lb));
        assert_eq!(tree.proofs[0].siblings, vec![lb]);
        assert_eq!(tree.proofs[1].siblings, vec![la]);
    }

    #[test]
    fn test_padded_len() {
        let recipients: Vec<Recipient> = (0..5).map(|i| Recipient::new([i; 32], 1)).collect();
        let tree = build_tree(&recipients).unwrap();
        assert_eq!(tree.padded_len(), 8);
        assert!(tree.proofs.iter().all(|p| p.siblings.len() == 3));
    }

    #[test]
    fn test_verify_rejects_wrong_index() {
        let recipients: Vec<Recipient> = (0..4).map(|i| Recipient::new([i; 32], 1)).collect();
        let tree = build_tree(&recipients).unwrap();
        let leaf = hash_leaf(&recipients[1].address, 1);
        assert!(verify_proof(&leaf, &tree.proofs[1].siblings, 1, &tree.root));
        assert!(!verify_proof(&leaf, &tree.proofs[1].siblings, 0, &tree.root));
    }
}
