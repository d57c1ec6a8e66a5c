// Merkle tree over transaction encodings

use crate::core::{Hash256, sha256};

/// Binary hash tree, built fresh for each block
///
/// Leaves are `SHA256(data)`, interior nodes `SHA256(left || right)`.
/// A level with an odd number of nodes duplicates its last node.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    /// levels[0] holds the leaf hashes, the last level holds the root
    levels: Vec<Vec<Hash256>>,
}

/// One step of an inclusion proof
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProofStep {
    pub sibling: Hash256,
    /// True when the sibling sits to the left of the running hash
    pub sibling_is_left: bool,
}

impl MerkleTree {
    /// Build a tree from ordered leaf data
    pub fn new<T: AsRef<[u8]>>(leaves: &[T]) -> Self {
        let mut levels = Vec::new();
        let mut current: Vec<Hash256> = leaves.iter().map(|l| sha256(l.as_ref())).collect();

        while current.len() > 1 {
            let next = current
                .chunks(2)
                .map(|pair| {
                    let left = pair[0];
                    let right = if pair.len() == 2 { pair[1] } else { pair[0] };
                    hash_pair(&left, &right)
                })
                .collect();
            levels.push(current);
            current = next;
        }

        levels.push(current);
        Self { levels }
    }

    /// Root hash; the zero hash for an empty tree
    pub fn root(&self) -> Hash256 {
        self.levels
            .last()
            .and_then(|level| level.first())
            .copied()
            .unwrap_or_else(Hash256::zero)
    }

    pub fn leaf_count(&self) -> usize {
        self.levels.first().map_or(0, Vec::len)
    }

    /// Inclusion proof for the leaf at `index`
    pub fn proof(&self, index: usize) -> Option<Vec<ProofStep>> {
        if index >= self.leaf_count() {
            return None;
        }

        let mut steps = Vec::new();
        let mut idx = index;
        for level in &self.levels[..self.levels.len() - 1] {
            let sibling_idx = if idx % 2 == 0 { idx + 1 } else { idx - 1 };
            let sibling = level.get(sibling_idx).copied().unwrap_or(level[idx]);
            steps.push(ProofStep {
                sibling,
                sibling_is_left: idx % 2 == 1,
            });
            idx /= 2;
        }
        Some(steps)
    }

    /// Check that `leaf` is committed under `root` via `proof`
    pub fn verify_proof(root: &Hash256, leaf: &[u8], proof: &[ProofStep]) -> bool {
        let computed = proof.iter().fold(sha256(leaf), |acc, step| {
            if step.sibling_is_left {
                hash_pair(&step.sibling, &acc)
            } else {
                hash_pair(&acc, &step.sibling)
            }
        });
        &computed == root
    }
}

fn hash_pair(left: &Hash256, right: &Hash256) -> Hash256 {
    let mut combined = [0u8; 64];
    combined[..32].copy_from_slice(left.as_bytes());
    combined[32..].copy_from_slice(right.as_bytes());
    sha256(&combined)
}
