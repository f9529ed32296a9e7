//! Twisted complex FFT embeddings
//!
//! The canonical embedding of `R[X]/(X^n + 1)` evaluates a polynomial at the
//! odd powers of `ζ = exp(−iπ/n)`; slot `k` holds `a(ζ^{2k+1})`, so slots `k`
//! and `n−1−k` are complex conjugates for real input. The transform is the
//! usual ψ-twist (`a_j ← a_j·ζ^j`) followed by a radix-2 FFT with root `ζ²`,
//! mirroring the modular NTT in `ring.rs`.
//!
//! Two precisions are provided:
//! - [`Cfft`] over [`BigFloat`] complexes for the trapdoor reductions
//!   (256-bit default; roots built by repeated complex square roots, no
//!   trigonometry);
//! - [`Cfft64`] over `f64` for the preimage sampler's quick embeddings.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use num_bigint::BigInt;

use crate::bigfloat::{BigFloat, Complex, FloatCtx};

/// High-precision embedding context for degree `n` (power of two).
pub struct Cfft {
    pub n: usize,
    pub ctx: FloatCtx,
    /// ζ^j for j in 0..=n (ζ = exp(−iπ/n)); ζ^n = −1.
    psi: Vec<Complex>,
    /// ζ^{−j} = conj(ζ^j).
    psi_inv: Vec<Complex>,
}

impl Cfft {
    pub fn new(n: usize, prec: u64) -> Self {
        debug_assert!(n.is_power_of_two());
        let ctx = FloatCtx::new(prec);
        // exp(iπ/n) by repeated principal square roots from exp(iπ) = −1,
        // then conjugate for the negative-angle branch.
        let mut root = Complex::real(ctx.from_i64(-1));
        let mut m = 1usize;
        while m < n {
            root = ctx.csqrt(&root);
            m <<= 1;
        }
        let zeta = ctx.cconj(&root);
        let mut psi = Vec::with_capacity(n + 1);
        let mut cur = Complex::real(ctx.from_i64(1));
        for _ in 0..=n {
            psi.push(cur.clone());
            cur = ctx.cmul(&cur, &zeta);
        }
        let psi_inv = psi.iter().map(|z| ctx.cconj(z)).collect();
        Self { n, ctx, psi, psi_inv }
    }

    fn fft_in_place(&self, a: &mut [Complex], inverse: bool) {
        let n = a.len();
        debug_assert!(n.is_power_of_two());
        let ctx = &self.ctx;

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

        let table = if inverse { &self.psi_inv } else { &self.psi };
        let mut len = 2;
        while len <= n {
            // root^(n/len) where root = ζ² — index 2·(self.n/len) in the ζ table,
            // scaled for sub-transforms of length < self.n.
            let stride = 2 * self.n / len;
            let w_len = &table[stride];
            for start in (0..n).step_by(len) {
                let mut w = Complex::real(ctx.from_i64(1));
                let half = len / 2;
                for i in 0..half {
                    let u = a[start + i].clone();
                    let v = ctx.cmul(&a[start + i + half], &w);
                    a[start + i] = ctx.cadd(&u, &v);
                    a[start + i + half] = ctx.csub(&u, &v);
                    w = ctx.cmul(&w, w_len);
                }
            }
            len <<= 1;
        }
    }

    /// Embed a real coefficient vector: twist by ζ^j, then FFT.
    pub fn to_eval(&self, coeffs: &[Complex]) -> Vec<Complex> {
        debug_assert_eq!(coeffs.len(), self.n);
        let ctx = &self.ctx;
        let mut a: Vec<Complex> = coeffs
            .iter()
            .enumerate()
            .map(|(j, c)| ctx.cmul(c, &self.psi[j]))
            .collect();
        self.fft_in_place(&mut a, false);
        a
    }

    pub fn bigints_to_eval(&self, coeffs: &[BigInt]) -> Vec<Complex> {
        let ctx = &self.ctx;
        let lifted: Vec<Complex> =
            coeffs.iter().map(|c| Complex::real(ctx.from_bigint(c))).collect();
        self.to_eval(&lifted)
    }

    /// Inverse embedding: inverse FFT, scale by 1/n, untwist by ζ^{−j}.
    pub fn to_coeff(&self, evals: &[Complex]) -> Vec<Complex> {
        debug_assert_eq!(evals.len(), self.n);
        let ctx = &self.ctx;
        let mut a = evals.to_vec();
        self.fft_in_place(&mut a, true);
        let inv_n = ctx.div(&ctx.from_i64(1), &ctx.from_i64(self.n as i64));
        for (j, x) in a.iter_mut().enumerate() {
            let un = ctx.cmul(x, &self.psi_inv[j]);
            *x = Complex { re: ctx.mul(&un.re, &inv_n), im: ctx.mul(&un.im, &inv_n) };
        }
        a
    }

    /// Inverse-embed and round real parts to the nearest integers — the
    /// Babai `k` block.
    pub fn ifft_round(&self, evals: &[Complex]) -> Vec<BigInt> {
        self.to_coeff(evals).iter().map(|z| self.ctx.round(&z.re)).collect()
    }
}

// ===========================================================================
// f64 twin (sampler path)
// ===========================================================================

/// `f64` complex pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct C64 {
    pub re: f64,
    pub im: f64,
}

impl C64 {
    pub const ZERO: C64 = C64 { re: 0.0, im: 0.0 };

    #[inline]
    pub fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }

    #[inline]
    pub fn add(self, o: C64) -> C64 {
        C64::new(self.re + o.re, self.im + o.im)
    }

    #[inline]
    pub fn sub(self, o: C64) -> C64 {
        C64::new(self.re - o.re, self.im - o.im)
    }

    #[inline]
    pub fn mul(self, o: C64) -> C64 {
        C64::new(self.re * o.re - self.im * o.im, self.re * o.im + self.im * o.re)
    }

    #[inline]
    pub fn conj(self) -> C64 {
        C64::new(self.re, -self.im)
    }

    #[inline]
    pub fn scale(self, s: f64) -> C64 {
        C64::new(self.re * s, self.im * s)
    }

    #[inline]
    pub fn norm_sq(self) -> f64 {
        self.re * self.re + self.im * self.im
    }

    #[inline]
    pub fn div(self, o: C64) -> C64 {
        let n = o.norm_sq();
        self.mul(o.conj()).scale(1.0 / n)
    }
}

/// Quick embedding context over `f64`.
pub struct Cfft64 {
    pub n: usize,
    psi: Vec<C64>,
    psi_inv: Vec<C64>,
}

impl Cfft64 {
    pub fn new(n: usize) -> Self {
        debug_assert!(n.is_power_of_two());
        let mut psi = Vec::with_capacity(n + 1);
        let mut psi_inv = Vec::with_capacity(n + 1);
        for j in 0..=n {
            let ang = -std::f64::consts::PI * j as f64 / n as f64;
            psi.push(C64::new(ang.cos(), ang.sin()));
            psi_inv.push(C64::new(ang.cos(), -ang.sin()));
        }
        Self { n, psi, psi_inv }
    }

    fn fft_in_place(&self, a: &mut [C64], inverse: bool) {
        let n = a.len();
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
        let table = if inverse { &self.psi_inv } else { &self.psi };
        let mut len = 2;
        while len <= n {
            let w_len = table[2 * self.n / len];
            for start in (0..n).step_by(len) {
                let mut w = C64::new(1.0, 0.0);
                let half = len / 2;
                for i in 0..half {
                    let u = a[start + i];
                    let v = a[start + i + half].mul(w);
                    a[start + i] = u.add(v);
                    a[start + i + half] = u.sub(v);
                    w = w.mul(w_len);
                }
            }
            len <<= 1;
        }
    }

    pub fn to_eval(&self, coeffs: &[f64]) -> Vec<C64> {
        debug_assert_eq!(coeffs.len(), self.n);
        let mut a: Vec<C64> = coeffs
            .iter()
            .enumerate()
            .map(|(j, &c)| self.psi[j].scale(c))
            .collect();
        self.fft_in_place(&mut a, false);
        a
    }

    pub fn to_coeff(&self, evals: &[C64]) -> Vec<C64> {
        debug_assert_eq!(evals.len(), self.n);
        let mut a = evals.to_vec();
        self.fft_in_place(&mut a, true);
        let inv_n = 1.0 / self.n as f64;
        for (j, x) in a.iter_mut().enumerate() {
            *x = x.mul(self.psi_inv[j]).scale(inv_n);
        }
        a
    }

    /// Real parts of the inverse embedding.
    pub fn to_real_coeff(&self, evals: &[C64]) -> Vec<f64> {
        self.to_coeff(evals).iter().map(|z| z.re).collect()
    }
}
