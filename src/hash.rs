//! BBS ring hash & Ajtai commitment
//!
//! Two small pointwise primitives over `Rq`:
//!
//! - the BBS-style hash target `T = B0 + B1·m + B2·x0 + B3·x1` (all operands
//!   in the evaluation basis; the issuer signs the centered coefficients of
//!   the inverse transform);
//! - the Ajtai linear commitment `com = Ac·w`, verified by recomputation row
//!   by row.
//!
//! Seed-derived polynomials (`m`, `x0`, `x1`, matrices) come from a blake3
//! digest of `(label, seed)` expanded through ChaCha20. The coefficient
//! bounds for seeded small polynomials are process-wide (`SeedPolyBounds`)
//! but every sampler takes them as an explicit argument; the atomic default
//! exists for compatibility and is mutated only by explicit configuration.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::ring::{Basis, Poly, Ring, RingError};

/// Process-wide default coefficient bound for seed-derived small polynomials.
static SEED_POLY_BOUNDS: AtomicU32 = AtomicU32::new(1);

/// Bounds applied to polynomials expanded from a PRNG seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SeedPolyBounds {
    /// Coefficients are drawn uniformly from `[−bound, bound]`.
    pub bound: u32,
}

impl SeedPolyBounds {
    pub fn process_default() -> Self {
        Self { bound: SEED_POLY_BOUNDS.load(Ordering::Relaxed) }
    }
}

/// Set the process-wide default bound. Call before any sampling begins.
pub fn set_seed_poly_bounds(bound: u32) {
    SEED_POLY_BOUNDS.store(bound, Ordering::Relaxed);
}

fn seed_rng(label: &str, seed: &[u8]) -> ChaCha20Rng {
    let mut h = blake3::Hasher::new();
    h.update(b"latcred.seedpoly.v1");
    h.update(label.as_bytes());
    h.update(&(seed.len() as u64).to_be_bytes());
    h.update(seed);
    ChaCha20Rng::from_seed(*h.finalize().as_bytes())
}

/// Small polynomial with centered coefficients in `[−bound, bound]`
/// (coefficient basis).
pub fn sample_seed_poly(ring: &Ring, label: &str, seed: &[u8], bounds: SeedPolyBounds) -> Poly {
    let mut rng = seed_rng(label, seed);
    let b = bounds.bound as i64;
    let coeffs = (0..ring.n)
        .map(|_| ring.lift_val(rng.gen_range(-b..=b)))
        .collect();
    Poly { coeffs, basis: Basis::Coefficient }
}

/// Uniform polynomial over `[0, q)` in the evaluation basis.
pub fn sample_uniform_poly(ring: &Ring, label: &str, seed: &[u8]) -> Poly {
    let mut rng = seed_rng(label, seed);
    let coeffs = (0..ring.n).map(|_| rng.gen_range(0..ring.q)).collect();
    Poly { coeffs, basis: Basis::Evaluation }
}

/// Uniform matrix of evaluation-basis ring elements.
pub fn sample_matrix(ring: &Ring, label: &str, seed: &[u8], rows: usize, cols: usize) -> Vec<Vec<Poly>> {
    (0..rows)
        .map(|i| {
            (0..cols)
                .map(|j| sample_uniform_poly(ring, &format!("{label}[{i}][{j}]"), seed))
                .collect()
        })
        .collect()
}

/// The four public hash polynomials.
pub fn sample_bbs_basis(ring: &Ring, seed: &[u8]) -> [Poly; 4] {
    [
        sample_uniform_poly(ring, "bbs.b0", seed),
        sample_uniform_poly(ring, "bbs.b1", seed),
        sample_uniform_poly(ring, "bbs.b2", seed),
        sample_uniform_poly(ring, "bbs.b3", seed),
    ]
}

/// `T = B0 + B1·m + B2·x0 + B3·x1`, pointwise in the evaluation basis.
pub fn bbs_hash(ring: &Ring, b: &[Poly; 4], m: &Poly, x0: &Poly, x1: &Poly) -> Result<Poly, RingError> {
    let mut t = b[0].clone();
    t = ring.add(&t, &ring.mul(&b[1], m)?)?;
    t = ring.add(&t, &ring.mul(&b[2], x0)?)?;
    t = ring.add(&t, &ring.mul(&b[3], x1)?)?;
    Ok(t)
}

/// `com = Ac·w`, all operands in the evaluation basis.
pub fn commit(ring: &Ring, ac: &[Vec<Poly>], w: &[Poly]) -> Result<Vec<Poly>, RingError> {
    let mut out = Vec::with_capacity(ac.len());
    for row in ac {
        if row.len() != w.len() {
            return Err(RingError::LenMismatch { expected: w.len(), got: row.len() });
        }
        let mut acc = Poly::zero(ring.n, Basis::Evaluation);
        for (a, wj) in row.iter().zip(w) {
            acc = ring.add(&acc, &ring.mul(a, wj)?)?;
        }
        out.push(acc);
    }
    Ok(out)
}

/// Recompute `Ac·w` and compare against `com` row by row.
pub fn verify_commit(ring: &Ring, ac: &[Vec<Poly>], w: &[Poly], com: &[Poly]) -> Result<bool, RingError> {
    let expect = commit(ring, ac, w)?;
    if expect.len() != com.len() {
        return Err(RingError::LenMismatch { expected: expect.len(), got: com.len() });
    }
    Ok(expect.iter().zip(com).all(|(a, b)| a == b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Ring, Vec<Vec<Poly>>, Vec<Poly>) {
        let ring = Ring::new(64, 12289).unwrap();
        let ac = sample_matrix(&ring, "ac", b"test-seed", 5, 5);
        let w: Vec<Poly> = (0..5)
            .map(|i| {
                let p = sample_seed_poly(&ring, "w", &[i as u8], SeedPolyBounds { bound: 8 });
                ring.to_eval(&p)
            })
            .collect();
        (ring, ac, w)
    }

    #[test]
    fn commit_verifies_and_rejects_tampering() {
        let (ring, ac, w) = setup();
        let com = commit(&ring, &ac, &w).unwrap();
        assert!(verify_commit(&ring, &ac, &w, &com).unwrap());

        let mut bad = com.clone();
        bad[2].coeffs[7] = (bad[2].coeffs[7] + 1) % ring.q;
        assert!(!verify_commit(&ring, &ac, &w, &bad).unwrap());
    }

    #[test]
    fn hash_is_affine_in_message() {
        let ring = Ring::new(64, 12289).unwrap();
        let b = sample_bbs_basis(&ring, b"bbs-seed");
        let zero = Poly::zero(ring.n, Basis::Evaluation);
        let m = Poly::constant(ring.n, 3, Basis::Evaluation);
        let t0 = bbs_hash(&ring, &b, &zero, &zero, &zero).unwrap();
        let t1 = bbs_hash(&ring, &b, &m, &zero, &zero).unwrap();
        // t1 − t0 = 3·B1 pointwise
        let diff = ring.sub(&t1, &t0).unwrap();
        assert_eq!(diff, ring.scalar_mul(3, &b[1]));
    }

    #[test]
    fn seed_polys_are_deterministic_and_bounded() {
        let ring = Ring::new(64, 12289).unwrap();
        let bounds = SeedPolyBounds { bound: 4 };
        let a = sample_seed_poly(&ring, "m", b"s", bounds);
        let b = sample_seed_poly(&ring, "m", b"s", bounds);
        assert_eq!(a, b);
        for &c in &a.coeffs {
            let v = ring.center_val(c);
            assert!((-4..=4).contains(&v));
        }
        let c = sample_seed_poly(&ring, "x0", b"s", bounds);
        assert_ne!(a, c);
    }
}
