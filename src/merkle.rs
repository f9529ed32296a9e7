//! Salted blake3 Merkle tree
//!
//! Commits to the column vectors of the LVCS codeword matrix. Leaves are
//! salted so an opened column reveals nothing about its neighbors, and every
//! hash carries a domain-separation preamble with length-delimited input.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

pub type Digest = [u8; 32];

#[derive(Debug, thiserror::Error)]
pub enum MerkleError {
    #[error("empty leaf set")]
    Empty,
    #[error("leaf index {index} out of range ({leaves} leaves)")]
    OutOfRange { index: usize, leaves: usize },
    #[error("inclusion path does not reconnect to the committed root")]
    Mismatch,
}

pub fn hash_leaf(salt: &Digest, column: &[u64]) -> Digest {
    let mut h = blake3::Hasher::new();
    h.update(b"latcred.merkle.leaf.v1");
    h.update(salt);
    h.update(&(column.len() as u64).to_be_bytes());
    for &v in column {
        h.update(&v.to_le_bytes());
    }
    *h.finalize().as_bytes()
}

fn hash_node(l: &Digest, r: &Digest) -> Digest {
    let mut h = blake3::Hasher::new();
    h.update(b"latcred.merkle.node.v1");
    h.update(l);
    h.update(r);
    *h.finalize().as_bytes()
}

/// Binary Merkle tree, zero-padded to a power of two.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    /// `nodes[cap + i]` are the leaves; `nodes[1]` is the root.
    nodes: Vec<Digest>,
    cap: usize,
    pub leaves: usize,
}

impl MerkleTree {
    pub fn build(leaves: &[Digest]) -> Result<Self, MerkleError> {
        if leaves.is_empty() {
            return Err(MerkleError::Empty);
        }
        let cap = leaves.len().next_power_of_two();
        let mut nodes = vec![[0u8; 32]; 2 * cap];
        nodes[cap..cap + leaves.len()].copy_from_slice(leaves);
        for i in (1..cap).rev() {
            nodes[i] = hash_node(&nodes[2 * i].clone(), &nodes[2 * i + 1].clone());
        }
        Ok(Self { nodes, cap, leaves: leaves.len() })
    }

    pub fn root(&self) -> Digest {
        self.nodes[1]
    }

    /// Sibling path from leaf `index` to the root.
    pub fn path(&self, index: usize) -> Result<Vec<Digest>, MerkleError> {
        if index >= self.leaves {
            return Err(MerkleError::OutOfRange { index, leaves: self.leaves });
        }
        let mut out = Vec::new();
        let mut i = self.cap + index;
        while i > 1 {
            out.push(self.nodes[i ^ 1]);
            i >>= 1;
        }
        Ok(out)
    }
}

/// Recompute the root from a leaf and its sibling path.
pub fn verify_path(root: &Digest, leaf: &Digest, index: usize, path: &[Digest]) -> Result<(), MerkleError> {
    let mut acc = *leaf;
    let mut i = index;
    for sib in path {
        acc = if i & 1 == 0 { hash_node(&acc, sib) } else { hash_node(sib, &acc) };
        i >>= 1;
    }
    if &acc == root {
        Ok(())
    } else {
        Err(MerkleError::Mismatch)
    }
}
