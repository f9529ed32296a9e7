//! Annulus trapdoor keygen
//!
//! Samples `(f, g)` radially in the evaluation domain so every embedding slot
//! lands on the annulus midline `√q·(α + 1/α)/2` (or a caller-fixed radius),
//! decodes to integer coefficients with the Conway–Sloane odd-sum decoder,
//! and accepts the candidate only if
//!
//! 1. every slot energy `|φ_i(f)|² + |φ_i(g)|²` lies in `[q/α², α²·q]`,
//! 2. `f` is a unit in `Rq` (all NTT slots non-zero; with a single-limb RNS
//!    this is the per-limb extended-Euclid test collapsed),
//! 3. the NTRU solve succeeds and `f·G − g·F = q` holds exactly.
//!
//! Rejections restart the whole candidate; the trial cap is configurable.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use num_bigint::BigInt;
use rand::Rng;
use tracing::debug;

use crate::cfft::{C64, Cfft64};
use crate::ring::{inv_mod, mul_mod, Basis, Poly, Ring};
use crate::solver::{self, SolverError};

pub const DEFAULT_MAX_KEYGEN_TRIALS: usize = 10_000;

#[derive(Debug, Clone, Copy)]
pub struct KeygenOpts {
    /// Annulus parameter; the window is `[q/α², α²·q]`.
    pub alpha: f64,
    /// Fixed radius as a multiple of `√q` (overrides the annulus midline).
    pub fixed_radius: Option<f64>,
    pub max_trials: usize,
}

impl Default for KeygenOpts {
    fn default() -> Self {
        Self { alpha: 1.20, fixed_radius: None, max_trials: DEFAULT_MAX_KEYGEN_TRIALS }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum KeygenError {
    #[error("keygen exhausted {0} trials")]
    TooManyRejections(usize),
    #[error("f is not a unit in Rq")]
    NonUnit,
    #[error(transparent)]
    Solver(#[from] SolverError),
}

/// A complete NTRU trapdoor: the short pair, the completed basis, and the
/// public key `h = g/f` in the evaluation basis.
#[derive(Debug, Clone)]
pub struct TrapdoorKey {
    pub f: Vec<i64>,
    pub g: Vec<i64>,
    pub big_f: Vec<BigInt>,
    pub big_g: Vec<BigInt>,
    pub h: Poly,
    pub trials: usize,
}

/// Conway–Sloane odd-sum decode: round ties-to-even, then if the coefficient
/// sum is even, flip the coefficient with the largest fractional distance one
/// step away from its rounded value (smallest index wins ties).
pub fn decode_odd_sum(x: &[f64]) -> Vec<i64> {
    let mut out: Vec<i64> = x.iter().map(|&v| v.round_ties_even() as i64).collect();
    let parity: i64 = out.iter().sum::<i64>() & 1;
    if parity == 0 {
        let mut best = 0usize;
        let mut best_d = -1.0f64;
        for (i, &v) in x.iter().enumerate() {
            let d = (v - out[i] as f64).abs();
            if d > best_d {
                best_d = d;
                best = i;
            }
        }
        let dir = if x[best] - out[best] as f64 >= 0.0 { 1 } else { -1 };
        out[best] += dir;
    }
    out
}

fn sample_annulus_pair(
    n: usize,
    q: u64,
    opts: &KeygenOpts,
    cfft: &Cfft64,
    rng: &mut impl Rng,
) -> (Vec<i64>, Vec<i64>) {
    let rad = match opts.fixed_radius {
        Some(r) => (q as f64).sqrt() * r,
        None => (q as f64).sqrt() * 0.5 * (opts.alpha + 1.0 / opts.alpha),
    };
    let mut ef = vec![C64::ZERO; n];
    let mut eg = vec![C64::ZERO; n];
    for i in 0..n / 2 {
        let r1: f64 = rng.gen();
        let r2: f64 = rng.gen();
        let r3: f64 = rng.gen();
        let af = rad * (std::f64::consts::FRAC_PI_2 * r1).cos();
        let ag = rad * (std::f64::consts::FRAC_PI_2 * r1).sin();
        let th_f = std::f64::consts::TAU * r2;
        let th_g = std::f64::consts::TAU * r3;
        ef[i] = C64::new(af * th_f.cos(), af * th_f.sin());
        eg[i] = C64::new(ag * th_g.cos(), ag * th_g.sin());
        ef[n - 1 - i] = ef[i].conj();
        eg[n - 1 - i] = eg[i].conj();
    }
    let f = decode_odd_sum(&cfft.to_real_coeff(&ef));
    let g = decode_odd_sum(&cfft.to_real_coeff(&eg));
    (f, g)
}

/// Check the annulus window on the decoded integer pair.
pub fn alpha_window_ok(n: usize, q: u64, alpha: f64, cfft: &Cfft64, f: &[i64], g: &[i64]) -> bool {
    let ff: Vec<f64> = f.iter().map(|&c| c as f64).collect();
    let gf: Vec<f64> = g.iter().map(|&c| c as f64).collect();
    let ef = cfft.to_eval(&ff);
    let eg = cfft.to_eval(&gf);
    let lo = q as f64 / (alpha * alpha);
    let hi = alpha * alpha * q as f64;
    (0..n / 2).all(|i| {
        let e = ef[i].norm_sq() + eg[i].norm_sq();
        e >= lo && e <= hi
    })
}

/// `f` is a unit in `Rq` iff its NTT spectrum avoids zero.
pub fn is_unit(ring: &Ring, f: &[i64]) -> bool {
    let p = ring.to_eval(&ring.lift(f, Basis::Coefficient));
    p.coeffs.iter().all(|&c| c != 0)
}

/// Slot-wise `h = g/f`; fails with [`KeygenError::NonUnit`] when `f` has a
/// vanishing NTT slot.
pub fn derive_public_key(ring: &Ring, f: &[i64], g: &[i64]) -> Result<Poly, KeygenError> {
    let fe = ring.to_eval(&ring.lift(f, Basis::Coefficient));
    let ge = ring.to_eval(&ring.lift(g, Basis::Coefficient));
    let mut coeffs = Vec::with_capacity(ring.n);
    for (&fv, &gv) in fe.coeffs.iter().zip(&ge.coeffs) {
        if fv == 0 {
            return Err(KeygenError::NonUnit);
        }
        coeffs.push(mul_mod(gv, inv_mod(fv, ring.q), ring.q));
    }
    Ok(Poly { coeffs, basis: Basis::Evaluation })
}

/// Run annulus keygen until a candidate passes every gate.
pub fn keygen(ring: &Ring, opts: &KeygenOpts, rng: &mut impl Rng) -> Result<TrapdoorKey, KeygenError> {
    let n = ring.n;
    let q = ring.q;
    let cfft = Cfft64::new(n);
    for trial in 1..=opts.max_trials {
        let (f, g) = sample_annulus_pair(n, q, opts, &cfft, rng);
        if !alpha_window_ok(n, q, opts.alpha, &cfft, &f, &g) {
            continue;
        }
        if !is_unit(ring, &f) {
            continue;
        }
        let (big_f, big_g) = match solver::solve(&f, &g, q) {
            Ok(sol) => sol,
            Err(SolverError::NotCoprime) | Err(SolverError::IdentityFailure) => continue,
            Err(e) => return Err(e.into()),
        };
        let h = derive_public_key(ring, &f, &g)?;
        debug!(trial, n, q, "keygen accepted candidate");
        return Ok(TrapdoorKey { f, g, big_f, big_g, h, trials: trial });
    }
    Err(KeygenError::TooManyRejections(opts.max_trials))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::check_identity;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn decoder_targets_odd_sum() {
        let mut rng = ChaCha20Rng::seed_from_u64(11);
        for _ in 0..200 {
            let x: Vec<f64> = (0..16).map(|_| rng.gen_range(-10.0..10.0)).collect();
            let d = decode_odd_sum(&x);
            assert_eq!(d.iter().sum::<i64>() & 1, 1, "sum must be odd");
            // stays within one unit of the rounding
            for (v, z) in x.iter().zip(&d) {
                assert!((v - *z as f64).abs() <= 1.5);
            }
        }
    }

    #[test]
    fn non_unit_f_is_rejected() {
        let ring = Ring::new(16, 97).unwrap();
        let f = vec![0i64; 16];
        let g = vec![1i64; 16];
        assert!(!is_unit(&ring, &f));
        assert!(matches!(derive_public_key(&ring, &f, &g), Err(KeygenError::NonUnit)));
    }

    #[test]
    fn annulus_keygen_n64() {
        let ring = Ring::new(64, 12289).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(12);
        let opts = KeygenOpts::default();
        let key = keygen(&ring, &opts, &mut rng).unwrap();

        // α-window on every low slot
        let cfft = Cfft64::new(64);
        assert!(alpha_window_ok(64, 12289, opts.alpha, &cfft, &key.f, &key.g));

        // exact NTRU identity
        let fb: Vec<BigInt> = key.f.iter().map(|&c| BigInt::from(c)).collect();
        let gb: Vec<BigInt> = key.g.iter().map(|&c| BigInt::from(c)).collect();
        assert!(check_identity(&fb, &gb, &key.big_f, &key.big_g, 12289));

        // h·f ≡ g (mod q)
        let fe = ring.to_eval(&ring.lift(&key.f, Basis::Coefficient));
        let ge = ring.to_eval(&ring.lift(&key.g, Basis::Coefficient));
        let hf = ring.mul(&key.h, &fe).unwrap();
        assert_eq!(hf, ge);
    }
}
