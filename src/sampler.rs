//! Hybrid two-step preimage sampler (F-style)
//!
//! Given a target `T ∈ Rq`, produce `(s₀, s₁)` with `h·s₁ + s₀ ≡ T (mod q)`
//! and `‖(s₁, s₀)‖² ≤ γ² = 2N·(slack·σ)²`, `σ² = R²·α²·q`.
//!
//! The sampler works in the `f64` embedding domain (quick embeddings; the
//! 256-bit path is only needed by the solver's reductions):
//!
//! 1. precompute the slot-wise Gram/GSO data of the basis `b₁ = (f, g)`,
//!    `b₂ = (F, G)` — projectors `β_k = conj(b̃_k)/‖b̃_k‖²` and per-slot
//!    deviations `σ_k²[i] = σ²/‖b̃_k‖²[i] − R²`;
//! 2. per trial, process `b̃₂` then `b̃₁`: project the coset center, draw a
//!    continuous Gaussian (Box–Muller) around the projection, and round each
//!    coefficient with the CDT base sampler at parameter `R` around the
//!    floating-point mean;
//! 3. reconstruct `v₁ = f·z₀ + F·z₁`, `v₂ = g·z₀ + G·z₁` exactly over the
//!    integers, set `s₁ = v₁` and `s₀ = center(T − h·s₁ mod q)` (the norm
//!    residual `center(c₁ − v₂)` computed through the exact convolution);
//! 4. accept when the squared norm clears the big-float `γ²` bound
//!    (equality accepted); retry silently on `NormReject` and on the
//!    optional residual-`L∞` gate, up to `max_trials`.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use num_bigint::BigInt;
use num_traits::ToPrimitive;
use rand::Rng;
use tracing::{debug, trace};

use crate::bigfloat::FloatCtx;
use crate::cfft::{C64, Cfft64};
use crate::keygen::TrapdoorKey;
use crate::ring::{mul_negacyclic, Basis, Poly, Ring};

/// Smoothing parameter squared for the integer base sampler
/// (η_ε(Z)² at ε ≈ 2⁻⁶⁴).
pub const DEFAULT_R_SQUARE: f64 = 1.7424;

pub const DEFAULT_MAX_SIGN_TRIALS: usize = 2_000;

#[derive(Debug, Clone, Copy)]
pub struct SignOpts {
    pub alpha: f64,
    /// `R²`: smoothing squared for the base sampler.
    pub r_square: f64,
    /// Acceptance slack; must lie in `[1, 1e6]`.
    pub slack: f64,
    pub max_trials: usize,
    /// Optional `‖s₀‖∞` gate applied before the norm predicate.
    pub residual_linf: Option<i64>,
}

impl Default for SignOpts {
    fn default() -> Self {
        Self {
            alpha: 1.20,
            r_square: DEFAULT_R_SQUARE,
            slack: 1.042,
            max_trials: DEFAULT_MAX_SIGN_TRIALS,
            residual_linf: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SignError {
    #[error("slack {0} outside [1, 1e6]")]
    BadSlack(f64),
    #[error("target length {got} does not match ring degree {expected}")]
    BadTarget { expected: usize, got: usize },
    #[error("sampler exhausted {0} trials")]
    TooManyRejections(usize),
    #[error("signature coefficient overflows i64")]
    NumericOverflow,
    #[error("signature congruence h·s₁ + s₀ ≡ T failed")]
    Congruence,
    #[error("residual norm exceeds γ²")]
    NormReject,
}

/// An accepted preimage, with norm diagnostics.
#[derive(Debug, Clone)]
pub struct Preimage {
    pub s0: Vec<i64>,
    pub s1: Vec<i64>,
    pub trials: usize,
    pub norm_sq: BigInt,
}

struct SlotGram {
    /// β₁ = (conj(f), conj(g)) / ‖b₁‖², per slot.
    beta1: Vec<(C64, C64)>,
    /// β₂ = conj(b̃₂)/‖b̃₂‖², per slot.
    beta2: Vec<(C64, C64)>,
    sigma1: Vec<f64>,
    sigma2: Vec<f64>,
}

pub struct PreimageSampler<'a> {
    ring: &'a Ring,
    key: &'a TrapdoorKey,
    opts: SignOpts,
    cfft: Cfft64,
    ef: Vec<C64>,
    eg: Vec<C64>,
    e_big_f: Vec<C64>,
    e_big_g: Vec<C64>,
    gram: SlotGram,
    cdt: Vec<f64>,
    gamma_sq: f64,
}

fn embed_i64(cfft: &Cfft64, v: &[i64]) -> Vec<C64> {
    let f: Vec<f64> = v.iter().map(|&c| c as f64).collect();
    cfft.to_eval(&f)
}

fn embed_bigint(cfft: &Cfft64, v: &[BigInt]) -> Vec<C64> {
    let f: Vec<f64> = v.iter().map(|c| c.to_f64().unwrap_or(0.0)).collect();
    cfft.to_eval(&f)
}

/// Cumulative table for the non-negative base Gaussian at deviation `r`.
fn build_cdt(r: f64) -> Vec<f64> {
    let mut probs = Vec::new();
    let mut k = 0f64;
    loop {
        let p = (-k * k / (2.0 * r * r)).exp();
        if p < 1e-18 && k > 0.0 {
            break;
        }
        probs.push(p);
        k += 1.0;
    }
    let total: f64 = probs.iter().sum();
    let mut acc = 0.0;
    probs
        .iter()
        .map(|p| {
            acc += p / total;
            acc
        })
        .collect()
}

fn base_sample(cdt: &[f64], rng: &mut impl Rng) -> i64 {
    let u: f64 = rng.gen();
    cdt.iter().position(|&c| u < c).unwrap_or(cdt.len() - 1) as i64
}

/// Discrete Gaussian around the floating-point mean `c` at parameter `r`:
/// CDT base draw plus bimodal shift, accepted by the exact ratio.
fn sampler_z(c: f64, r: f64, cdt: &[f64], rng: &mut impl Rng) -> i64 {
    let c0 = c.floor();
    let frac = c - c0;
    loop {
        let z0 = base_sample(cdt, rng);
        let z = if rng.gen_bool(0.5) { z0 + 1 } else { -z0 };
        let num = (z as f64 - frac).powi(2);
        let p = ((z0 as f64 * z0 as f64 - num) / (2.0 * r * r)).exp();
        if rng.gen::<f64>() < p {
            return c0 as i64 + z;
        }
    }
}

fn gauss(rng: &mut impl Rng) -> f64 {
    // Box–Muller
    let u1: f64 = rng.gen_range(f64::MIN_POSITIVE..1.0);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

impl<'a> PreimageSampler<'a> {
    /// Build the Gram/GSO precomputation for a key.
    pub fn new(ring: &'a Ring, key: &'a TrapdoorKey, opts: SignOpts) -> Result<Self, SignError> {
        if !(1.0..=1e6).contains(&opts.slack) {
            return Err(SignError::BadSlack(opts.slack));
        }
        let n = ring.n;
        let cfft = Cfft64::new(n);
        let ef = embed_i64(&cfft, &key.f);
        let eg = embed_i64(&cfft, &key.g);
        let e_big_f = embed_bigint(&cfft, &key.big_f);
        let e_big_g = embed_bigint(&cfft, &key.big_g);

        let sigma_sq = opts.r_square * opts.alpha * opts.alpha * ring.q as f64;
        let mut beta1 = Vec::with_capacity(n);
        let mut beta2 = Vec::with_capacity(n);
        let mut sigma1 = vec![0.0; n];
        let mut sigma2 = vec![0.0; n];
        for i in 0..n {
            let d = ef[i].norm_sq() + eg[i].norm_sq();
            let a = e_big_f[i].norm_sq() + e_big_g[i].norm_sq();
            let b = e_big_f[i].mul(ef[i].conj()).add(e_big_g[i].mul(eg[i].conj()));
            let mu = b.scale(1.0 / d);
            // b̃₂ = b₂ − μ·b₁
            let ft = e_big_f[i].sub(mu.mul(ef[i]));
            let gt = e_big_g[i].sub(mu.mul(eg[i]));
            let n2 = a - b.norm_sq() / d;
            beta1.push((ef[i].conj().scale(1.0 / d), eg[i].conj().scale(1.0 / d)));
            beta2.push((ft.conj().scale(1.0 / n2), gt.conj().scale(1.0 / n2)));
            if i < n / 2 {
                sigma1[i] = (sigma_sq / d - opts.r_square).max(0.0).sqrt();
                sigma2[i] = (sigma_sq / n2 - opts.r_square).max(0.0).sqrt();
            }
            // tail slots stay zero; conjugate mirroring covers them
        }

        let sigma = sigma_sq.sqrt();
        let gamma_sq = 2.0 * n as f64 * (opts.slack * sigma).powi(2);
        Ok(Self {
            ring,
            key,
            opts,
            cfft,
            ef,
            eg,
            e_big_f,
            e_big_g,
            gram: SlotGram { beta1, beta2, sigma1, sigma2 },
            cdt: build_cdt(opts.r_square.sqrt()),
            gamma_sq,
        })
    }

    /// Draw the continuous Gaussian block for one step, mirrored to keep the
    /// coefficient domain real.
    fn draw_y(&self, sigma: &[f64], rng: &mut impl Rng) -> Vec<C64> {
        let n = self.ring.n;
        let scale = (n as f64 / 2.0).sqrt();
        let mut y = vec![C64::ZERO; n];
        for i in 0..n / 2 {
            let s = sigma[i] * scale;
            y[i] = C64::new(gauss(rng) * s, gauss(rng) * s);
            y[n - 1 - i] = y[i].conj();
        }
        y
    }

    /// Sample a preimage for the centered target `t`.
    pub fn sign(&self, t: &[i64], rng: &mut impl Rng) -> Result<Preimage, SignError> {
        let n = self.ring.n;
        if t.len() != n {
            return Err(SignError::BadTarget { expected: n, got: t.len() });
        }
        let r = self.opts.r_square.sqrt();
        let e_c1_base = embed_i64(&self.cfft, t);
        let float_ctx = FloatCtx::new(128);
        let gamma_sq = float_ctx.from_f64(self.gamma_sq);

        for trial in 1..=self.opts.max_trials {
            // Step 1: process b̃₂.
            let c0: Vec<C64> = vec![C64::ZERO; n];
            let c1 = e_c1_base.clone();
            let y2 = self.draw_y(&self.gram.sigma2, rng);
            let mut x2 = Vec::with_capacity(n);
            for i in 0..n {
                let d2 = self.gram.beta2[i].0.mul(c0[i]).add(self.gram.beta2[i].1.mul(c1[i]));
                x2.push(d2.sub(y2[i]));
            }
            let means2 = self.cfft.to_real_coeff(&x2);
            let z1: Vec<i64> = means2.iter().map(|&m| sampler_z(m, r, &self.cdt, rng)).collect();

            // Update centers: c ← c − b₂·z₁.
            let ez1 = embed_i64(&self.cfft, &z1);
            let mut c0u = Vec::with_capacity(n);
            let mut c1u = Vec::with_capacity(n);
            for i in 0..n {
                c0u.push(c0[i].sub(self.e_big_f[i].mul(ez1[i])));
                c1u.push(c1[i].sub(self.e_big_g[i].mul(ez1[i])));
            }

            // Step 2: process b̃₁.
            let y1 = self.draw_y(&self.gram.sigma1, rng);
            let mut x1 = Vec::with_capacity(n);
            for i in 0..n {
                let d1 = self.gram.beta1[i].0.mul(c0u[i]).add(self.gram.beta1[i].1.mul(c1u[i]));
                x1.push(d1.sub(y1[i]));
            }
            let means1 = self.cfft.to_real_coeff(&x1);
            let z0: Vec<i64> = means1.iter().map(|&m| sampler_z(m, r, &self.cdt, rng)).collect();

            // Exact reconstruction of v₁ = f·z₀ + F·z₁.
            let z0b: Vec<BigInt> = z0.iter().map(|&c| BigInt::from(c)).collect();
            let z1b: Vec<BigInt> = z1.iter().map(|&c| BigInt::from(c)).collect();
            let fb: Vec<BigInt> = self.key.f.iter().map(|&c| BigInt::from(c)).collect();
            let v1: Vec<BigInt> = {
                let a = mul_negacyclic(&z0b, &fb, false);
                let b = mul_negacyclic(&z1b, &self.key.big_f, false);
                a.iter().zip(&b).map(|(x, y)| x + y).collect()
            };
            let mut s1 = Vec::with_capacity(n);
            for c in &v1 {
                s1.push(c.to_i64().ok_or(SignError::NumericOverflow)?);
            }

            // s₀ = center(T − h·s₁ mod q), through the exact modular product.
            let s1_eval = self.ring.to_eval(&self.ring.lift(&s1, Basis::Coefficient));
            let hs1 = self.ring.mul(&self.key.h, &s1_eval).expect("eval operands");
            let t_eval = self.ring.to_eval(&self.ring.lift(t, Basis::Coefficient));
            let s0_poly = self.ring.to_coeff(&self.ring.sub(&t_eval, &hs1).expect("eval operands"));
            let s0 = self.ring.center(&s0_poly);

            if let Some(linf) = self.opts.residual_linf {
                if s0.iter().any(|&c| c.abs() > linf) {
                    trace!(trial, "residual L∞ gate rejected");
                    continue;
                }
            }

            let mut norm_sq = BigInt::from(0);
            for &c in s1.iter().chain(&s0) {
                norm_sq += BigInt::from(c) * BigInt::from(c);
            }
            let norm_f = float_ctx.from_bigint(&norm_sq);
            if float_ctx.cmp(&norm_f, &gamma_sq) == std::cmp::Ordering::Greater {
                trace!(trial, "norm predicate rejected");
                continue;
            }

            debug!(trial, "preimage accepted");
            return Ok(Preimage { s0, s1, trials: trial, norm_sq });
        }
        Err(SignError::TooManyRejections(self.opts.max_trials))
    }
}

/// Verifier-side predicates: congruence and the γ² norm bound.
pub fn verify_preimage(
    ring: &Ring,
    h: &Poly,
    t: &[i64],
    sig: &Preimage,
    opts: &SignOpts,
) -> Result<(), SignError> {
    let n = ring.n;
    if t.len() != n || sig.s0.len() != n || sig.s1.len() != n {
        return Err(SignError::BadTarget { expected: n, got: t.len() });
    }
    let s1_eval = ring.to_eval(&ring.lift(&sig.s1, Basis::Coefficient));
    let hs1 = ring.mul(h, &s1_eval).expect("eval operands");
    let s0_eval = ring.to_eval(&ring.lift(&sig.s0, Basis::Coefficient));
    let lhs = ring.add(&hs1, &s0_eval).expect("eval operands");
    let t_eval = ring.to_eval(&ring.lift(t, Basis::Coefficient));
    if lhs != t_eval {
        return Err(SignError::Congruence);
    }

    let sigma_sq = opts.r_square * opts.alpha * opts.alpha * ring.q as f64;
    let gamma_sq = 2.0 * n as f64 * opts.slack * opts.slack * sigma_sq;
    let mut norm_sq = BigInt::from(0);
    for &c in sig.s1.iter().chain(&sig.s0) {
        norm_sq += BigInt::from(c) * BigInt::from(c);
    }
    let ctx = FloatCtx::new(128);
    if ctx.cmp(&ctx.from_bigint(&norm_sq), &ctx.from_f64(gamma_sq)) == std::cmp::Ordering::Greater {
        return Err(SignError::NormReject);
    }
    Ok(())
}
