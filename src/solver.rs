//! NTRU trapdoor solver
//!
//! Given small `f, g ∈ Z[X]/(X^N + 1)`, find `F, G` with `f·G − g·F = q`.
//! The solver descends the power-of-two tower by the field norm
//! (`N(f)(X²) = f(X)·f(−X)`), solves the degree-1 base case with the
//! extended GCD, lifts the solution back up by zero-interleaving and
//! conjugate multiplication, and size-reduces `(F, G)` against `(f, g)` at
//! every level with Babai's nearest-plane step in the 256-bit embedding
//! domain.
//!
//! The only acceptance criterion is the exact integer identity
//! `f·G − g·F = q`; [`check_identity`] re-verifies it after every solve.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use num_bigint::BigInt;
use num_traits::{One, Signed, Zero};
use tracing::trace;

use crate::bigfloat::Complex;
use crate::cfft::Cfft;
use crate::ring::{inf_norm, mul_negacyclic};

/// Mantissa bits used by the Babai reductions.
pub const SOLVER_PREC: u64 = 256;

#[derive(Debug, thiserror::Error)]
pub enum SolverError {
    #[error("degree must be a positive power of two (got {0})")]
    BadDegree(usize),
    #[error("resultants are not coprime at the tower base")]
    NotCoprime,
    #[error("NTRU identity f·G − g·F = q does not hold")]
    IdentityFailure,
}

/// Extended GCD: returns `(d, u, v)` with `u·a + v·b = d`, `d ≥ 0`.
fn xgcd(a: &BigInt, b: &BigInt) -> (BigInt, BigInt, BigInt) {
    let (mut r0, mut r1) = (a.clone(), b.clone());
    let (mut u0, mut u1) = (BigInt::one(), BigInt::zero());
    let (mut v0, mut v1) = (BigInt::zero(), BigInt::one());
    while !r1.is_zero() {
        let qt = &r0 / &r1;
        let r2 = &r0 - &qt * &r1;
        r0 = std::mem::replace(&mut r1, r2);
        let u2 = &u0 - &qt * &u1;
        u0 = std::mem::replace(&mut u1, u2);
        let v2 = &v0 - &qt * &v1;
        v0 = std::mem::replace(&mut v1, v2);
    }
    if r0.is_negative() {
        (-r0, -u0, -v0)
    } else {
        (r0, u0, v0)
    }
}

/// `p(−X)`: negate the odd coefficients.
fn conj2(p: &[BigInt]) -> Vec<BigInt> {
    p.iter()
        .enumerate()
        .map(|(i, c)| if i % 2 == 1 { -c } else { c.clone() })
        .collect()
}

/// Field norm: the even part of `p·p(−X)`, halved in degree.
fn norm2(p: &[BigInt]) -> Vec<BigInt> {
    let prod = mul_negacyclic(p, &conj2(p), false);
    debug_assert!(prod.iter().skip(1).step_by(2).all(|c| c.is_zero()));
    prod.into_iter().step_by(2).collect()
}

/// Zero-interleave: `p'(X) ↦ p'(X²)` as a length-`2·len` vector.
fn interleave(p: &[BigInt]) -> Vec<BigInt> {
    let mut out = vec![BigInt::zero(); 2 * p.len()];
    for (i, c) in p.iter().enumerate() {
        out[2 * i] = c.clone();
    }
    out
}

/// One Babai size-reduction pass: subtract `round(⟨(F,G),(f,g)⟩/‖(f,g)‖²)`
/// times `(f, g)` from `(F, G)` until the rounded quotient vanishes or the
/// norm stops improving.
fn babai_reduce(
    f: &[BigInt],
    g: &[BigInt],
    big_f: &mut Vec<BigInt>,
    big_g: &mut Vec<BigInt>,
) {
    let n = f.len();
    if n == 1 {
        // Degree one is handled exactly by the base-case normalization.
        return;
    }
    let cf = Cfft::new(n, SOLVER_PREC);
    let ctx = cf.ctx;
    let ef = cf.bigints_to_eval(f);
    let eg = cf.bigints_to_eval(g);
    let den: Vec<Complex> = (0..n)
        .map(|i| {
            let d = ctx.add(&ctx.cnorm(&ef[i]), &ctx.cnorm(&eg[i]));
            Complex::real(d)
        })
        .collect();

    let start_norm = inf_norm(big_f).max(inf_norm(big_g));
    let cap = 2 * start_norm.magnitude().bits().max(1);
    let mut prev_norm = start_norm;

    for iter in 0..cap {
        let e_ff = cf.bigints_to_eval(big_f);
        let e_gg = cf.bigints_to_eval(big_g);
        let mut y = Vec::with_capacity(n);
        for i in 0..n {
            let num = ctx.cadd(
                &ctx.cmul(&e_ff[i], &ctx.cconj(&ef[i])),
                &ctx.cmul(&e_gg[i], &ctx.cconj(&eg[i])),
            );
            y.push(ctx.cdiv(&num, &den[i]));
        }
        let k = cf.ifft_round(&y);
        if k.iter().all(|c| c.is_zero()) {
            break;
        }
        let kf = mul_negacyclic(&k, f, false);
        let kg = mul_negacyclic(&k, g, false);
        let snap_f = big_f.clone();
        let snap_g = big_g.clone();
        for i in 0..n {
            big_f[i] -= &kf[i];
            big_g[i] -= &kg[i];
        }
        let norm = inf_norm(big_f).max(inf_norm(big_g));
        trace!(level = n, iter, bits = norm.magnitude().bits(), "babai step");
        if norm >= prev_norm {
            // the rounded step stopped helping; keep the best pair
            *big_f = snap_f;
            *big_g = snap_g;
            break;
        }
        prev_norm = norm;
    }
}

fn solve_rec(f: &[BigInt], g: &[BigInt], q: &BigInt) -> Result<(Vec<BigInt>, Vec<BigInt>), SolverError> {
    let n = f.len();
    if n == 1 {
        let (d, mut u, mut v) = xgcd(&f[0], &g[0]);
        if !d.is_one() {
            return Err(SolverError::NotCoprime);
        }
        // Canonical branch: minimize |v| over (u + k·g, v − k·f). The floor
        // reduction with an offset of ⌊|f|/2⌋ lands ties on the negative
        // representative, which is the preferred branch.
        if !f[0].is_zero() {
            let fa = f[0].abs();
            let half = &fa >> 1;
            let m = num_integer::Integer::div_floor(&(&v + &half), &fa);
            let k = if f[0].is_negative() { -m } else { m };
            v -= &k * &f[0];
            u += &k * &g[0];
        }
        // u·f + v·g = 1 ⇒ f·(u·q) − g·(−v·q) = q.
        return Ok((vec![-(v * q)], vec![u * q]));
    }

    let fp = norm2(f);
    let gp = norm2(g);
    let (fp_sol, gp_sol) = solve_rec(&fp, &gp, q)?;

    // F = F'(X²)·g(−X), G = G'(X²)·f(−X).
    let mut big_f = mul_negacyclic(&interleave(&fp_sol), &conj2(g), false);
    let mut big_g = mul_negacyclic(&interleave(&gp_sol), &conj2(f), false);

    babai_reduce(f, g, &mut big_f, &mut big_g);
    Ok((big_f, big_g))
}

/// Exact identity check `f·G − g·F = q` in `Z[X]/(X^N + 1)`.
pub fn check_identity(f: &[BigInt], g: &[BigInt], big_f: &[BigInt], big_g: &[BigInt], q: u64) -> bool {
    let lhs = mul_negacyclic(f, big_g, false);
    let rhs = mul_negacyclic(g, big_f, false);
    let qv = BigInt::from(q);
    for i in 0..f.len() {
        let d = &lhs[i] - &rhs[i];
        let want = if i == 0 { qv.clone() } else { BigInt::zero() };
        if d != want {
            return false;
        }
    }
    true
}

/// Solve the NTRU equation for centered small inputs.
pub fn solve(f: &[i64], g: &[i64], q: u64) -> Result<(Vec<BigInt>, Vec<BigInt>), SolverError> {
    let n = f.len();
    if n == 0 || !n.is_power_of_two() || g.len() != n {
        return Err(SolverError::BadDegree(n));
    }
    let fb: Vec<BigInt> = f.iter().map(|&c| BigInt::from(c)).collect();
    let gb: Vec<BigInt> = g.iter().map(|&c| BigInt::from(c)).collect();
    let (mut big_f, mut big_g) = solve_rec(&fb, &gb, &BigInt::from(q))?;
    // Final top-level reduction against the input pair.
    babai_reduce(&fb, &gb, &mut big_f, &mut big_g);
    if !check_identity(&fb, &gb, &big_f, &big_g, q) {
        return Err(SolverError::IdentityFailure);
    }
    Ok((big_f, big_g))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xgcd_bezout() {
        let (d, u, v) = xgcd(&BigInt::from(240), &BigInt::from(46));
        assert_eq!(d, BigInt::from(2));
        assert_eq!(u * 240 + v * 46, BigInt::from(2));
    }

    #[test]
    fn trivial_trapdoor_degree_16() {
        // f = 1, g = X: f·G − g·F = q has the immediate solution G = q, F = 0,
        // and the solver must land on an identity-satisfying pair.
        let mut f = vec![0i64; 16];
        f[0] = 1;
        let mut g = vec![0i64; 16];
        g[1] = 1;
        let (big_f, big_g) = solve(&f, &g, 97).unwrap();
        let fb: Vec<BigInt> = f.iter().map(|&c| BigInt::from(c)).collect();
        let gb: Vec<BigInt> = g.iter().map(|&c| BigInt::from(c)).collect();
        assert!(check_identity(&fb, &gb, &big_f, &big_g, 97));
    }

    #[test]
    fn small_dense_trapdoor() {
        let f = vec![3i64, 1, -2, 1];
        let g = vec![1i64, 2, 0, -1];
        match solve(&f, &g, 12289) {
            Ok((big_f, big_g)) => {
                let fb: Vec<BigInt> = f.iter().map(|&c| BigInt::from(c)).collect();
                let gb: Vec<BigInt> = g.iter().map(|&c| BigInt::from(c)).collect();
                assert!(check_identity(&fb, &gb, &big_f, &big_g, 12289));
            }
            Err(SolverError::NotCoprime) => {
                // legitimate rejection for this fixed pair; keygen retries
            }
            Err(e) => panic!("unexpected solver error: {e}"),
        }
    }

    #[test]
    fn identity_check_rejects_wrong_pair() {
        let f = vec![BigInt::from(1), BigInt::zero()];
        let g = vec![BigInt::zero(), BigInt::from(1)];
        let bad = vec![BigInt::from(5), BigInt::from(5)];
        assert!(!check_identity(&f, &g, &bad, &bad, 97));
    }
}
