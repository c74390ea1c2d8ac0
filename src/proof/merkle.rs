//! Reward Merkle Tree
//!
//! Binary SHA-256 Merkle tree over holder balances. The root is asserted by
//! the on-chain distribution validator, so leaf encoding, ordering and
//! padding must match it byte for byte:
//!
//! - leaf = sha256(payment_key_hash ‖ balance as u64 big-endian)
//! - node = sha256(left ‖ right)
//! - holders sorted by address before leafing
//! - an odd level pairs its last node with itself

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::hash::{serde_hex, sha256_concat, ContentHasher, Digest32, PaymentKeyHash};

/// One holder's balance in a snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HolderBalance {
    /// Wallet address (used only for ordering).
    pub address: String,
    /// Holder identity committed in the leaf.
    pub payment_key_hash: PaymentKeyHash,
    /// Token balance.
    pub balance: u64,
}

impl HolderBalance {
    /// Leaf hash for this holder.
    pub fn leaf_hash(&self) -> Digest32 {
        let mut hasher = ContentHasher::new();
        hasher.update_bytes(self.payment_key_hash.as_bytes());
        hasher.update_u64_be(self.balance);
        hasher.finalize()
    }
}

/// Merkle construction and lookup errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MerkleError {
    /// No holders were supplied.
    #[error("cannot build a merkle tree with no holders")]
    EmptyTree,
    /// Holder is not part of this tree.
    #[error("holder {0} not found in tree")]
    HolderNotFound(String),
}

/// Which side of the running hash a sibling sits on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiblingSide {
    /// hash(sibling ‖ current)
    Left,
    /// hash(current ‖ sibling)
    Right,
}

/// One step of a proof path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    /// Sibling hash at this level.
    #[serde(with = "serde_hex")]
    pub sibling: Digest32,
    /// Orientation of the sibling.
    pub side: SiblingSide,
}

/// Merkle inclusion proof, leaf to root.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerkleProof {
    /// Hash of the proven leaf.
    #[serde(with = "serde_hex")]
    pub leaf_hash: Digest32,
    /// Sibling path from the leaf level upward.
    pub path: Vec<ProofStep>,
    /// Root the proof commits to.
    #[serde(with = "serde_hex")]
    pub root: Digest32,
}

impl MerkleProof {
    /// Recompute the root from the leaf and path and compare.
    pub fn verify(&self) -> bool {
        compute_root(&self.leaf_hash, &self.path) == self.root
    }

    /// Verify the proof and that it is for `holder`.
    pub fn verify_holder(&self, holder: &HolderBalance) -> bool {
        holder.leaf_hash() == self.leaf_hash && self.verify()
    }
}

/// Fold a leaf hash up a proof path.
pub fn compute_root(leaf_hash: &Digest32, path: &[ProofStep]) -> Digest32 {
    path.iter().fold(*leaf_hash, |current, step| match step.side {
        SiblingSide::Right => hash_nodes(&current, &step.sibling),
        SiblingSide::Left => hash_nodes(&step.sibling, &current),
    })
}

/// Hash two child nodes.
fn hash_nodes(left: &Digest32, right: &Digest32) -> Digest32 {
    sha256_concat(&[left.as_slice(), right.as_slice()])
}

/// Immutable Merkle tree over a holder snapshot.
#[derive(Clone, Debug)]
pub struct MerkleTree {
    /// Holders in leaf order.
    holders: Vec<HolderBalance>,
    /// All tree levels (leaves at index 0, root level last). Unpadded.
    levels: Vec<Vec<Digest32>>,
}

impl MerkleTree {
    /// Build a tree from holders in any order.
    pub fn build(holders: &[HolderBalance]) -> Result<Self, MerkleError> {
        if holders.is_empty() {
            return Err(MerkleError::EmptyTree);
        }

        let mut holders = holders.to_vec();
        holders.sort_by(|a, b| {
            a.address
                .cmp(&b.address)
                .then_with(|| a.payment_key_hash.cmp(&b.payment_key_hash))
                .then_with(|| a.balance.cmp(&b.balance))
        });

        let mut current_level: Vec<Digest32> = holders.iter().map(HolderBalance::leaf_hash).collect();
        let mut levels = Vec::new();

        // Build up to root
        while current_level.len() > 1 {
            let mut next_level = Vec::with_capacity(current_level.len().div_ceil(2));
            for chunk in current_level.chunks(2) {
                let left = &chunk[0];
                let right = chunk.get(1).unwrap_or(left);
                next_level.push(hash_nodes(left, right));
            }
            levels.push(current_level);
            current_level = next_level;
        }
        levels.push(current_level);

        Ok(Self { holders, levels })
    }

    /// Root hash.
    pub fn root(&self) -> Digest32 {
        // build() guarantees a non-empty top level
        self.levels.last().and_then(|level| level.first()).copied().unwrap_or_default()
    }

    /// Root as hex.
    pub fn root_hex(&self) -> String {
        hex::encode(self.root())
    }

    /// Number of leaves.
    pub fn leaf_count(&self) -> usize {
        self.holders.len()
    }

    /// Holders in leaf order.
    pub fn holders(&self) -> &[HolderBalance] {
        &self.holders
    }

    /// Leaf hashes in order.
    pub fn leaves(&self) -> &[Digest32] {
        &self.levels[0]
    }

    /// Generate an inclusion proof for `holder`.
    pub fn generate_proof(&self, holder: &HolderBalance) -> Result<MerkleProof, MerkleError> {
        let index = self
            .holders
            .iter()
            .position(|h| h == holder)
            .ok_or_else(|| MerkleError::HolderNotFound(holder.address.clone()))?;
        Ok(self.proof_at(index))
    }

    /// Proof for the leaf at `index` (must be in range).
    fn proof_at(&self, index: usize) -> MerkleProof {
        let mut path = Vec::with_capacity(self.levels.len().saturating_sub(1));
        let mut current_index = index;

        // Walk up the tree, collecting sibling hashes
        for level in &self.levels[..self.levels.len() - 1] {
            let step = if current_index % 2 == 0 {
                // Last node of an odd level is its own sibling
                let sibling = level.get(current_index + 1).unwrap_or(&level[current_index]);
                ProofStep { sibling: *sibling, side: SiblingSide::Right }
            } else {
                ProofStep { sibling: level[current_index - 1], side: SiblingSide::Left }
            };
            path.push(step);
            current_index /= 2;
        }

        MerkleProof {
            leaf_hash: self.levels[0][index],
            path,
            root: self.root(),
        }
    }
}
