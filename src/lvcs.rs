//! LVCS — Merkle-committed linear-code row commitment
//!
//! Every logical row owns `|Ω|` head values (the witness data on the public
//! slots) and `ℓ` uniformly random tail values. The row polynomial
//! interpolates head‖tail over the first `|Ω|+ℓ` NTT nodes; its codeword is
//! the evaluation over all `N` nodes, which the negacyclic NTT produces
//! directly from the zero-padded coefficients. The commitment is a salted
//! Merkle tree over the codeword **columns**; opening a column reveals every
//! row's value at one node together with the salt and the inclusion path.
//!
//! The DECS side lives here too: batch `η` random `Kθ`-combinations of the
//! committed rows (each shielded by its own mask row), which the verifier
//! checks against the opened columns and against the Round-2 evaluations.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use rand::Rng;

use crate::ext::{ExtElem, ExtField};
use crate::merkle::{self, Digest, MerkleError, MerkleTree};
use crate::piop::interpolate;
use crate::ring::{Basis, Poly, Ring};

#[derive(Debug, thiserror::Error)]
pub enum LvcsError {
    #[error("row head length {got} does not match |Ω|={expected}")]
    BadHead { expected: usize, got: usize },
    #[error("mask tail length ℓ={ell} overruns the ring ({omega}+{ell} > {n})")]
    TailOverrun { omega: usize, ell: usize, n: usize },
    #[error(transparent)]
    Merkle(#[from] MerkleError),
}

/// Public commitment: the Merkle root plus the layout it binds.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LvcsCommitment {
    pub root: Digest,
    pub rows: usize,
    pub omega: usize,
    pub ell: usize,
    pub n_cols: usize,
}

/// Prover-side state, alive for one proof.
pub struct LvcsProverKey {
    /// Row polynomial coefficients, length `|Ω|+ℓ` each.
    pub row_polys: Vec<Vec<u64>>,
    /// Row codewords over all `N` nodes.
    pub codewords: Vec<Vec<u64>>,
    pub salts: Vec<Digest>,
    pub tree: MerkleTree,
}

/// One opened column: every row's codeword value at one node.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ColumnOpening {
    pub index: usize,
    pub salt: Digest,
    pub values: Vec<u64>,
    pub path: Vec<Digest>,
}

/// Commit to a set of row heads, drawing `ℓ` mask-tail values per row.
pub fn commit_rows(
    ring: &Ring,
    heads: &[Vec<u64>],
    omega: usize,
    ell: usize,
    rng: &mut impl Rng,
) -> Result<(LvcsProverKey, LvcsCommitment), LvcsError> {
    if omega + ell > ring.n {
        return Err(LvcsError::TailOverrun { omega, ell, n: ring.n });
    }
    let nodes: Vec<u64> = (0..omega + ell).map(|k| ring.node(k)).collect();
    let mut row_polys = Vec::with_capacity(heads.len());
    let mut codewords = Vec::with_capacity(heads.len());
    for head in heads {
        if head.len() != omega {
            return Err(LvcsError::BadHead { expected: omega, got: head.len() });
        }
        let mut vals = head.clone();
        vals.extend((0..ell).map(|_| rng.gen_range(0..ring.q)));
        let coeffs = interpolate(&nodes, &vals, ring.q);
        let mut padded = coeffs.clone();
        padded.resize(ring.n, 0);
        let cw = ring.to_eval(&Poly { coeffs: padded, basis: Basis::Coefficient });
        debug_assert!(cw.coeffs[..omega] == head[..], "codeword head must equal the row head");
        let mut c = coeffs;
        c.resize(omega + ell, 0);
        row_polys.push(c);
        codewords.push(cw.coeffs);
    }

    let mut salts = Vec::with_capacity(ring.n);
    let mut leaves = Vec::with_capacity(ring.n);
    let mut column = vec![0u64; heads.len()];
    for k in 0..ring.n {
        let mut salt = [0u8; 32];
        rng.fill(&mut salt);
        for (j, cw) in codewords.iter().enumerate() {
            column[j] = cw[k];
        }
        leaves.push(merkle::hash_leaf(&salt, &column));
        salts.push(salt);
    }
    let tree = MerkleTree::build(&leaves)?;
    let commitment = LvcsCommitment {
        root: tree.root(),
        rows: heads.len(),
        omega,
        ell,
        n_cols: ring.n,
    };
    Ok((LvcsProverKey { row_polys, codewords, salts, tree }, commitment))
}

impl LvcsProverKey {
    /// Evaluate every row polynomial at an extension point.
    pub fn eval_rows(&self, ext: &ExtField, x: ExtElem) -> Vec<ExtElem> {
        self.row_polys.iter().map(|p| ext.eval_base_poly(p, x)).collect()
    }

    /// Open the columns at `indices`.
    pub fn open_columns(&self, indices: &[usize]) -> Result<Vec<ColumnOpening>, LvcsError> {
        let mut out = Vec::with_capacity(indices.len());
        for &k in indices {
            let values = self.codewords.iter().map(|cw| cw[k]).collect();
            out.push(ColumnOpening {
                index: k,
                salt: self.salts[k],
                values,
                path: self.tree.path(k)?,
            });
        }
        Ok(out)
    }

    /// `Q_i = Σ_j γ[i][j]·P_j + M_i` over the non-mask rows, where `M_i` is
    /// the dedicated DECS mask row for repetition `i`.
    pub fn batch_rows(&self, ext: &ExtField, gammas: &[ExtElem], mask_row: usize) -> Vec<ExtElem> {
        let len = self.row_polys.first().map(|p| p.len()).unwrap_or(0);
        let mut out = vec![ext.zero(); len];
        for (j, g) in gammas.iter().enumerate() {
            for (c, &p) in out.iter_mut().zip(&self.row_polys[j]) {
                *c = ext.add(*c, ext.scale(p, *g));
            }
        }
        for (c, &p) in out.iter_mut().zip(&self.row_polys[mask_row]) {
            *c = ext.add(*c, ext.from_base(p));
        }
        out
    }
}

/// Verify one opened column against the commitment.
pub fn verify_column(commitment: &LvcsCommitment, opening: &ColumnOpening) -> Result<(), LvcsError> {
    if opening.values.len() != commitment.rows || opening.index >= commitment.n_cols {
        return Err(LvcsError::BadHead { expected: commitment.rows, got: opening.values.len() });
    }
    let leaf = merkle::hash_leaf(&opening.salt, &opening.values);
    merkle::verify_path(&commitment.root, &leaf, opening.index, &opening.path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn commit_open_verify_round_trip() {
        let ring = Ring::new(64, 12289).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(31);
        let heads: Vec<Vec<u64>> = (0..5)
            .map(|_| (0..8).map(|_| rng.gen_range(0..ring.q)).collect())
            .collect();
        let (pk, cm) = commit_rows(&ring, &heads, 8, 4, &mut rng).unwrap();
        assert_eq!(cm.rows, 5);

        let opens = pk.open_columns(&[9, 17, 63]).unwrap();
        for o in &opens {
            verify_column(&cm, o).unwrap();
        }

        // tampering a value breaks the inclusion proof
        let mut bad = opens[0].clone();
        bad.values[2] = (bad.values[2] + 1) % ring.q;
        assert!(matches!(verify_column(&cm, &bad), Err(LvcsError::Merkle(_))));
    }

    #[test]
    fn row_polys_agree_with_codewords() {
        let ring = Ring::new(64, 12289).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(32);
        let heads = vec![(0..8).map(|_| rng.gen_range(0..ring.q)).collect::<Vec<_>>()];
        let (pk, _) = commit_rows(&ring, &heads, 8, 4, &mut rng).unwrap();
        for k in 0..ring.n {
            let x = ring.node(k);
            assert_eq!(crate::piop::poly_eval(&pk.row_polys[0], x, ring.q), pk.codewords[0][k]);
        }
    }

    #[test]
    fn batched_row_matches_pointwise_combination() {
        let ring = Ring::new(64, 12289).unwrap();
        let ext = ExtField::new(2, 12289).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(33);
        let heads: Vec<Vec<u64>> = (0..4)
            .map(|_| (0..8).map(|_| rng.gen_range(0..ring.q)).collect())
            .collect();
        let (pk, _) = commit_rows(&ring, &heads, 8, 4, &mut rng).unwrap();
        let gammas: Vec<ExtElem> =
            (0..3).map(|i| ExtElem { c0: 100 + i, c1: 7 * i }).collect();
        // rows 0..3 batched, row 3 is the mask
        let q_poly = pk.batch_rows(&ext, &gammas, 3);
        for k in [0usize, 20, 40] {
            let x = ext.from_base(ring.node(k));
            let lhs = ext.eval_ext_poly(&q_poly, x);
            let mut rhs = ext.from_base(pk.codewords[3][k]);
            for (j, g) in gammas.iter().enumerate() {
                rhs = ext.add(rhs, ext.scale(pk.codewords[j][k], *g));
            }
            assert_eq!(lhs, rhs);
        }
    }
}
