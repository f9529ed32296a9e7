//! Protocol parameters
//!
//! One [`Params`] value carries every knob of the system — ring, public
//! index set, LVCS shape, Fiat–Shamir widths, sampler tuning — and is bound
//! into the transcript through [`Params::digest`]. Validation is strict and
//! typed; nothing downstream re-checks these invariants.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use crate::ring::{Ring, RingError};

pub const DEFAULT_LAMBDA: usize = 128;

#[derive(Debug, thiserror::Error)]
pub enum ParamError {
    #[error(transparent)]
    Ring(#[from] RingError),
    #[error("|Ω| must be even and at most N (got {0})")]
    BadOmega(usize),
    #[error("mask tail ℓ must satisfy 1 ≤ ℓ and |Ω|+ℓ ≤ N (got {0})")]
    BadEll(usize),
    #[error("subset E needs ℓ non-head columns (N−|Ω| = {avail}, ℓ = {ell})")]
    SubsetRange { avail: usize, ell: usize },
    #[error("ℓ′ must be positive")]
    BadEllPrime,
    #[error("ρ and η must be positive")]
    BadBatching,
    #[error("θ must be 1 or 2 (got {0})")]
    BadTheta(usize),
    #[error("witness bound B must be positive")]
    BadBound,
    #[error("slack {0} outside [1, 1e6]")]
    BadSlack(f64),
    #[error("digit window W must be in 1..=16 (got {0})")]
    BadWindow(u32),
}

/// Full parameter set.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Params {
    /// Ring degree (power of two).
    pub n: usize,
    /// Prime modulus, `q ≡ 1 (mod 2N)`.
    pub q: u64,
    /// `|Ω|`: public index set size (even).
    pub n_cols: usize,
    /// LVCS mask-tail length.
    pub ell: usize,
    /// Round-2 evaluation queries.
    pub ell_prime: usize,
    /// Aggregated-constraint batching factor.
    pub rho: usize,
    /// DECS repetition count.
    pub eta: usize,
    /// Extension-field degree for challenges.
    pub theta: usize,
    /// ℓ∞-chain window bits.
    pub w_bits: u32,
    /// ℓ∞-chain digit count; 0 selects automatically.
    pub l_digits: usize,
    /// Grinding bits per Fiat–Shamir round.
    pub kappa: [u32; 4],
    /// Target security parameter.
    pub lambda: usize,
    /// Coefficient bound for witnesses.
    pub b: u64,
    /// Sampler annulus parameter.
    pub alpha: f64,
    /// Sampler smoothing squared.
    pub r_square: f64,
    /// Sampler acceptance slack (explicit; no hidden default at call sites).
    pub slack: f64,
    /// Rejection cap for the preimage sampler.
    pub max_sign_trials: usize,
}

impl Params {
    /// The credential working instance: `N = 1024`, `q = 1 038 337`.
    pub fn credential_default() -> Self {
        Self {
            n: 1024,
            q: 1_038_337,
            n_cols: 8,
            ell: 16,
            ell_prime: 2,
            rho: 8,
            eta: 2,
            theta: 2,
            w_bits: 5,
            l_digits: 0,
            kappa: [0; 4],
            lambda: DEFAULT_LAMBDA,
            b: 8,
            alpha: 1.20,
            r_square: crate::sampler::DEFAULT_R_SQUARE,
            slack: 1.042,
            max_sign_trials: crate::sampler::DEFAULT_MAX_SIGN_TRIALS,
        }
    }

    pub fn validate(&self) -> Result<(), ParamError> {
        // Ring construction re-checks degree and NTT-friendliness.
        Ring::new(self.n, self.q)?;
        if self.n_cols == 0 || self.n_cols % 2 != 0 || self.n_cols > self.n {
            return Err(ParamError::BadOmega(self.n_cols));
        }
        if self.ell == 0 || self.n_cols + self.ell > self.n {
            return Err(ParamError::BadEll(self.ell));
        }
        if self.n - self.n_cols < self.ell {
            return Err(ParamError::SubsetRange { avail: self.n - self.n_cols, ell: self.ell });
        }
        if self.ell_prime == 0 {
            return Err(ParamError::BadEllPrime);
        }
        if self.rho == 0 || self.eta == 0 {
            return Err(ParamError::BadBatching);
        }
        if !(self.theta == 1 || self.theta == 2) {
            return Err(ParamError::BadTheta(self.theta));
        }
        if self.b == 0 {
            return Err(ParamError::BadBound);
        }
        if !(1.0..=1e6).contains(&self.slack) {
            return Err(ParamError::BadSlack(self.slack));
        }
        if self.w_bits == 0 || self.w_bits > 16 {
            return Err(ParamError::BadWindow(self.w_bits));
        }
        Ok(())
    }

    pub fn ring(&self) -> Result<Ring, RingError> {
        Ring::new(self.n, self.q)
    }

    /// Row polynomial degree `|Ω| + ℓ − 1`.
    #[inline]
    pub fn row_degree(&self) -> usize {
        self.n_cols + self.ell - 1
    }

    /// Stable digest bound into the transcript.
    pub fn digest(&self) -> [u8; 32] {
        let mut h = blake3::Hasher::new();
        h.update(b"latcred.params.v1");
        let bytes = serde_json::to_vec(self).expect("params serialize");
        h.update(&(bytes.len() as u64).to_be_bytes());
        h.update(&bytes);
        *h.finalize().as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_params_validate() {
        Params::credential_default().validate().unwrap();
    }

    #[test]
    fn rejections() {
        let base = Params::credential_default();
        let mut p = base.clone();
        p.n_cols = 7;
        assert!(matches!(p.validate(), Err(ParamError::BadOmega(7))));

        let mut p = base.clone();
        p.slack = 2e6;
        assert!(matches!(p.validate(), Err(ParamError::BadSlack(_))));

        let mut p = base.clone();
        p.q = 1_038_339; // not ≡ 1 mod 2N
        assert!(matches!(p.validate(), Err(ParamError::Ring(_))));

        let mut p = base;
        p.theta = 3;
        assert!(matches!(p.validate(), Err(ParamError::BadTheta(3))));
    }

    #[test]
    fn digest_tracks_every_field() {
        let a = Params::credential_default();
        let mut b = a.clone();
        b.kappa[2] = 4;
        assert_ne!(a.digest(), b.digest());
    }
}
