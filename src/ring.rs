//! Ring & Transform Primitives
//!
//! The working ring is `Rq = Zq[X]/(X^N + 1)` with `N` a power of two and a
//! prime modulus `q ≡ 1 (mod 2N)`, so the negacyclic NTT exists. Elements
//! carry an explicit basis flag ([`Basis::Coefficient`] or
//! [`Basis::Evaluation`]); multiplication is only defined pointwise in the
//! evaluation basis.
//!
//! Layout of the evaluation basis: slot `k` holds `a(ψ·ω^k)` where `ψ` is a
//! primitive `2N`-th root of unity and `ω = ψ²`. [`Ring::node`] exposes the
//! slot points; the commitment layer interpolates over them.
//!
//! The module also hosts the centered lift `[0, q) → (−q/2, q/2]`, the
//! bounded wrap used by the issuance flow, and the exact integer negacyclic
//! convolution over `BigInt` consumed by the trapdoor solver (with the
//! conductor-3 wrap `X^N ≡ X^{N/2} − 1` for rings whose conductor carries a
//! factor of three).

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use num_bigint::BigInt;
use num_traits::{Signed, Zero};

/// Basis a ring element is currently expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Basis {
    /// Coefficient vector of length `N` (low→high).
    Coefficient,
    /// `N` values on the odd powers of the `2N`-th root of unity.
    Evaluation,
}

/// Errors produced by ring construction and transforms.
#[derive(Debug, thiserror::Error)]
pub enum RingError {
    #[error("ring degree must be a positive power of two (got {0})")]
    BadDegree(usize),
    #[error("modulus {q} is not NTT-friendly for degree {n} (need q ≡ 1 mod 2N)")]
    NotNttFriendly { q: u64, n: usize },
    #[error("no multiplicative generator found for modulus {0}")]
    NoGenerator(u64),
    #[error("basis mismatch (expected {expected:?}, got {got:?})")]
    BasisMismatch { expected: Basis, got: Basis },
    #[error("length mismatch (expected {expected}, got {got})")]
    LenMismatch { expected: usize, got: usize },
    #[error("coefficient {0} does not fit the declared width")]
    NumericOverflow(i128),
}

/// A polynomial in `Rq`, tagged with its current basis.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Poly {
    pub coeffs: Vec<u64>,
    pub basis: Basis,
}

impl Poly {
    pub fn zero(n: usize, basis: Basis) -> Self {
        Self { coeffs: vec![0; n], basis }
    }

    pub fn constant(n: usize, v: u64, basis: Basis) -> Self {
        match basis {
            // A constant has the same value in every evaluation slot.
            Basis::Evaluation => Self { coeffs: vec![v; n], basis },
            Basis::Coefficient => {
                let mut c = vec![0; n];
                c[0] = v;
                Self { coeffs: c, basis }
            }
        }
    }
}

#[inline]
pub(crate) fn add_mod(a: u64, b: u64, q: u64) -> u64 {
    let s = a + b;
    if s >= q {
        s - q
    } else {
        s
    }
}

#[inline]
pub(crate) fn sub_mod(a: u64, b: u64, q: u64) -> u64 {
    if a >= b {
        a - b
    } else {
        a + q - b
    }
}

#[inline]
pub(crate) fn mul_mod(a: u64, b: u64, q: u64) -> u64 {
    ((a as u128 * b as u128) % q as u128) as u64
}

#[inline]
pub fn pow_mod(mut base: u64, mut exp: u64, q: u64) -> u64 {
    let mut acc = 1u64;
    base %= q;
    while exp > 0 {
        if exp & 1 == 1 {
            acc = mul_mod(acc, base, q);
        }
        base = mul_mod(base, base, q);
        exp >>= 1;
    }
    acc
}

#[inline]
pub fn inv_mod(a: u64, q: u64) -> u64 {
    // q is prime throughout the crate.
    pow_mod(a, q - 2, q)
}

fn prime_factors(mut n: u64) -> Vec<u64> {
    let mut out = Vec::new();
    let mut p = 2u64;
    while p * p <= n {
        if n % p == 0 {
            out.push(p);
            while n % p == 0 {
                n /= p;
            }
        }
        p += if p == 2 { 1 } else { 2 };
    }
    if n > 1 {
        out.push(n);
    }
    out
}

/// Smallest multiplicative generator of `Fq^*`.
fn find_generator(q: u64) -> Result<u64, RingError> {
    let factors = prime_factors(q - 1);
    for g in 2..q {
        if factors.iter().all(|&p| pow_mod(g, (q - 1) / p, q) != 1) {
            return Ok(g);
        }
    }
    Err(RingError::NoGenerator(q))
}

/// Precomputed NTT context for `Rq = Zq[X]/(X^N + 1)`.
#[derive(Debug, Clone)]
pub struct Ring {
    pub n: usize,
    pub q: u64,
    /// ψ^j for j in 0..N (ψ a primitive 2N-th root).
    psi: Vec<u64>,
    psi_inv: Vec<u64>,
    omega: u64,
    omega_inv: u64,
    n_inv: u64,
}

impl Ring {
    pub fn new(n: usize, q: u64) -> Result<Self, RingError> {
        if n == 0 || !n.is_power_of_two() {
            return Err(RingError::BadDegree(n));
        }
        if (q - 1) % (2 * n as u64) != 0 {
            return Err(RingError::NotNttFriendly { q, n });
        }
        let g = find_generator(q)?;
        let psi0 = pow_mod(g, (q - 1) / (2 * n as u64), q);
        debug_assert_eq!(pow_mod(psi0, n as u64, q), q - 1, "psi^N must be -1");
        let mut psi = Vec::with_capacity(n);
        let mut psi_inv = Vec::with_capacity(n);
        let psi0_inv = inv_mod(psi0, q);
        let (mut a, mut b) = (1u64, 1u64);
        for _ in 0..n {
            psi.push(a);
            psi_inv.push(b);
            a = mul_mod(a, psi0, q);
            b = mul_mod(b, psi0_inv, q);
        }
        let omega = mul_mod(psi0, psi0, q);
        Ok(Self {
            n,
            q,
            psi,
            psi_inv,
            omega,
            omega_inv: inv_mod(omega, q),
            n_inv: inv_mod(n as u64, q),
        })
    }

    /// The field point carried by evaluation slot `k`, i.e. `ψ·ω^k`.
    #[inline]
    pub fn node(&self, k: usize) -> u64 {
        mul_mod(self.psi[1 % self.n], pow_mod(self.omega, k as u64, self.q), self.q)
    }

    // ------------------------- transforms -------------------------

    /// In-place radix-2 Cooley–Tukey transform (bit-reversal first, natural
    /// order out).
    fn ntt_in_place(&self, a: &mut [u64], root: u64) {
        let n = a.len();
        debug_assert!(n.is_power_of_two());

        let mut j = 0usize;
        for i in 1..n {
            let mut bit = n >> 1;
            while j & bit != 0 {
                j ^= bit;
                bit >>= 1;
            }
            j ^= bit;
            if i < j {
                a.swap(i, j);
            }
        }

        let mut len = 2;
        while len <= n {
            let w_len = pow_mod(root, (n / len) as u64, self.q);
            for start in (0..n).step_by(len) {
                let mut w = 1u64;
                let half = len / 2;
                for i in 0..half {
                    let u = a[start + i];
                    let v = mul_mod(a[start + i + half], w, self.q);
                    a[start + i] = add_mod(u, v, self.q);
                    a[start + i + half] = sub_mod(u, v, self.q);
                    w = mul_mod(w, w_len, self.q);
                }
            }
            len <<= 1;
        }
    }

    /// Forward negacyclic NTT: coefficient basis → evaluation basis.
    pub fn to_eval(&self, p: &Poly) -> Poly {
        if p.basis == Basis::Evaluation {
            return p.clone();
        }
        let mut a = p.coeffs.clone();
        for (j, x) in a.iter_mut().enumerate() {
            *x = mul_mod(*x, self.psi[j], self.q);
        }
        self.ntt_in_place(&mut a, self.omega);
        Poly { coeffs: a, basis: Basis::Evaluation }
    }

    /// Inverse negacyclic NTT: evaluation basis → coefficient basis.
    pub fn to_coeff(&self, p: &Poly) -> Poly {
        if p.basis == Basis::Coefficient {
            return p.clone();
        }
        let mut a = p.coeffs.clone();
        self.ntt_in_place(&mut a, self.omega_inv);
        for (j, x) in a.iter_mut().enumerate() {
            *x = mul_mod(mul_mod(*x, self.n_inv, self.q), self.psi_inv[j], self.q);
        }
        Poly { coeffs: a, basis: Basis::Coefficient }
    }

    // ------------------------- lane-wise arithmetic -------------------------

    fn check_pair(&self, a: &Poly, b: &Poly) -> Result<(), RingError> {
        if a.coeffs.len() != self.n {
            return Err(RingError::LenMismatch { expected: self.n, got: a.coeffs.len() });
        }
        if b.coeffs.len() != self.n {
            return Err(RingError::LenMismatch { expected: self.n, got: b.coeffs.len() });
        }
        if a.basis != b.basis {
            return Err(RingError::BasisMismatch { expected: a.basis, got: b.basis });
        }
        Ok(())
    }

    pub fn add(&self, a: &Poly, b: &Poly) -> Result<Poly, RingError> {
        self.check_pair(a, b)?;
        let coeffs = a
            .coeffs
            .iter()
            .zip(&b.coeffs)
            .map(|(&x, &y)| add_mod(x, y, self.q))
            .collect();
        Ok(Poly { coeffs, basis: a.basis })
    }

    pub fn sub(&self, a: &Poly, b: &Poly) -> Result<Poly, RingError> {
        self.check_pair(a, b)?;
        let coeffs = a
            .coeffs
            .iter()
            .zip(&b.coeffs)
            .map(|(&x, &y)| sub_mod(x, y, self.q))
            .collect();
        Ok(Poly { coeffs, basis: a.basis })
    }

    pub fn neg(&self, a: &Poly) -> Poly {
        let coeffs = a.coeffs.iter().map(|&x| if x == 0 { 0 } else { self.q - x }).collect();
        Poly { coeffs, basis: a.basis }
    }

    /// Pointwise product; both operands must sit in the evaluation basis.
    pub fn mul(&self, a: &Poly, b: &Poly) -> Result<Poly, RingError> {
        self.check_pair(a, b)?;
        if a.basis != Basis::Evaluation {
            return Err(RingError::BasisMismatch { expected: Basis::Evaluation, got: a.basis });
        }
        let coeffs = a
            .coeffs
            .iter()
            .zip(&b.coeffs)
            .map(|(&x, &y)| mul_mod(x, y, self.q))
            .collect();
        Ok(Poly { coeffs, basis: Basis::Evaluation })
    }

    pub fn scalar_mul(&self, s: u64, a: &Poly) -> Poly {
        let coeffs = a.coeffs.iter().map(|&x| mul_mod(x, s, self.q)).collect();
        Poly { coeffs, basis: a.basis }
    }

    // ------------------------- centered lifts -------------------------

    /// Map `[0, q)` onto `(−q/2, q/2]`.
    #[inline]
    pub fn center_val(&self, x: u64) -> i64 {
        if 2 * x > self.q {
            x as i64 - self.q as i64
        } else {
            x as i64
        }
    }

    /// Inverse of [`center_val`]: re-lift a centered value into `[0, q)`.
    #[inline]
    pub fn lift_val(&self, v: i64) -> u64 {
        v.rem_euclid(self.q as i64) as u64
    }

    pub fn center(&self, p: &Poly) -> Vec<i64> {
        p.coeffs.iter().map(|&x| self.center_val(x)).collect()
    }

    pub fn lift(&self, v: &[i64], basis: Basis) -> Poly {
        Poly { coeffs: v.iter().map(|&x| self.lift_val(x)).collect(), basis }
    }
}

/// Wrap `v` modulo `2B+1` into `[−B, B]`, returning `(r, k)` with
/// `v = r + (2B+1)·k`. Inputs produced by the issuance flow satisfy
/// `|v| ≤ 2B`, so `k ∈ {−1, 0, 1}` there.
#[inline]
pub fn center_bounded(v: i64, b: u64) -> (i64, i64) {
    let m = 2 * b as i64 + 1;
    let k = (v + b as i64).div_euclid(m);
    (v - m * k, k)
}

// ===========================================================================
// Exact integer negacyclic convolution (trapdoor algebra)
// ===========================================================================

/// `h = a·b mod (X^N + 1)` over `Z`, or mod `(X^N − X^{N/2} + 1)` when
/// `wrap3` is set (conductor divisible by three).
pub fn mul_negacyclic(a: &[BigInt], b: &[BigInt], wrap3: bool) -> Vec<BigInt> {
    let n = a.len();
    debug_assert_eq!(n, b.len());
    let mut wide = vec![BigInt::zero(); 2 * n];
    for (i, ai) in a.iter().enumerate() {
        if ai.is_zero() {
            continue;
        }
        for (j, bj) in b.iter().enumerate() {
            if bj.is_zero() {
                continue;
            }
            wide[i + j] += ai * bj;
        }
    }
    if !wrap3 {
        // X^N ≡ −1
        for i in (n..2 * n).rev() {
            let hi = std::mem::take(&mut wide[i]);
            wide[i - n] -= hi;
        }
    } else {
        // X^N ≡ X^{N/2} − 1
        let half = n / 2;
        for i in (n..2 * n).rev() {
            let hi = std::mem::take(&mut wide[i]);
            wide[i - n + half] += &hi;
            wide[i - n] -= hi;
        }
    }
    wide.truncate(n);
    wide
}

/// Infinity norm of an integer polynomial.
pub fn inf_norm(p: &[BigInt]) -> BigInt {
    let mut m = BigInt::zero();
    for c in p {
        let a = c.abs();
        if a > m {
            m = a;
        }
    }
    m
}
