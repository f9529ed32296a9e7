//! Extension scalars `Kθ`
//!
//! Challenges are drawn from a degree-θ extension of `Fq` (θ ∈ {1, 2}) so the
//! Schwartz–Zippel terms shrink with `q^θ` instead of `q`. Proof data stays
//! over `Fq`; only challenge points, batching coefficients and the values
//! derived from them live in `Kθ`. For θ = 2 the field is `Fq[Y]/(Y² − δ)`
//! with `δ` the smallest quadratic non-residue mod `q`.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use crate::ring::{add_mod, inv_mod, mul_mod, pow_mod, sub_mod};

/// Errors from extension-field construction.
#[derive(Debug, thiserror::Error)]
pub enum ExtError {
    #[error("unsupported extension degree θ={0} (expected 1 or 2)")]
    BadDegree(usize),
    #[error("no quadratic non-residue found mod {0}")]
    NoNonResidue(u64),
}

/// Runtime description of `Kθ`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtField {
    pub theta: usize,
    pub q: u64,
    /// `Y² = δ` when θ = 2; unused for θ = 1.
    pub delta: u64,
}

/// An element `c0 + c1·Y` of `Kθ` (c1 = 0 identically when θ = 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ExtElem {
    pub c0: u64,
    pub c1: u64,
}

impl ExtField {
    pub fn new(theta: usize, q: u64) -> Result<Self, ExtError> {
        match theta {
            1 => Ok(Self { theta, q, delta: 0 }),
            2 => {
                for a in 2..q {
                    if pow_mod(a, (q - 1) / 2, q) == q - 1 {
                        return Ok(Self { theta, q, delta: a });
                    }
                }
                Err(ExtError::NoNonResidue(q))
            }
            _ => Err(ExtError::BadDegree(theta)),
        }
    }

    #[inline]
    pub fn zero(&self) -> ExtElem {
        ExtElem { c0: 0, c1: 0 }
    }

    #[inline]
    pub fn one(&self) -> ExtElem {
        ExtElem { c0: 1, c1: 0 }
    }

    #[inline]
    pub fn from_base(&self, x: u64) -> ExtElem {
        ExtElem { c0: x % self.q, c1: 0 }
    }

    /// Reduce uniform bytes to an element (16 bytes per component).
    pub fn from_uniform_bytes(&self, bytes: &[u8; 32]) -> ExtElem {
        let mut lo = [0u8; 16];
        lo.copy_from_slice(&bytes[..16]);
        let c0 = (u128::from_le_bytes(lo) % self.q as u128) as u64;
        let c1 = if self.theta == 2 {
            let mut hi = [0u8; 16];
            hi.copy_from_slice(&bytes[16..]);
            (u128::from_le_bytes(hi) % self.q as u128) as u64
        } else {
            0
        };
        ExtElem { c0, c1 }
    }

    #[inline]
    pub fn add(&self, a: ExtElem, b: ExtElem) -> ExtElem {
        ExtElem { c0: add_mod(a.c0, b.c0, self.q), c1: add_mod(a.c1, b.c1, self.q) }
    }

    #[inline]
    pub fn sub(&self, a: ExtElem, b: ExtElem) -> ExtElem {
        ExtElem { c0: sub_mod(a.c0, b.c0, self.q), c1: sub_mod(a.c1, b.c1, self.q) }
    }

    #[inline]
    pub fn neg(&self, a: ExtElem) -> ExtElem {
        self.sub(self.zero(), a)
    }

    pub fn mul(&self, a: ExtElem, b: ExtElem) -> ExtElem {
        if self.theta == 1 {
            return ExtElem { c0: mul_mod(a.c0, b.c0, self.q), c1: 0 };
        }
        let t0 = mul_mod(a.c0, b.c0, self.q);
        let t1 = mul_mod(a.c1, b.c1, self.q);
        let cross = add_mod(mul_mod(a.c0, b.c1, self.q), mul_mod(a.c1, b.c0, self.q), self.q);
        ExtElem { c0: add_mod(t0, mul_mod(self.delta, t1, self.q), self.q), c1: cross }
    }

    #[inline]
    pub fn scale(&self, s: u64, a: ExtElem) -> ExtElem {
        ExtElem { c0: mul_mod(s, a.c0, self.q), c1: mul_mod(s, a.c1, self.q) }
    }

    pub fn inv(&self, a: ExtElem) -> ExtElem {
        if self.theta == 1 || a.c1 == 0 {
            return ExtElem { c0: inv_mod(a.c0, self.q), c1: 0 };
        }
        // (c0 − c1·Y) / (c0² − δ·c1²)
        let norm = sub_mod(
            mul_mod(a.c0, a.c0, self.q),
            mul_mod(self.delta, mul_mod(a.c1, a.c1, self.q), self.q),
            self.q,
        );
        let ninv = inv_mod(norm, self.q);
        ExtElem {
            c0: mul_mod(a.c0, ninv, self.q),
            c1: mul_mod(self.q - a.c1, ninv, self.q),
        }
    }

    #[inline]
    pub fn is_zero(&self, a: ExtElem) -> bool {
        a.c0 == 0 && a.c1 == 0
    }

    /// Horner evaluation of an `Fq`-coefficient polynomial at a `Kθ` point.
    pub fn eval_base_poly(&self, coeffs: &[u64], x: ExtElem) -> ExtElem {
        let mut acc = self.zero();
        for &c in coeffs.iter().rev() {
            acc = self.add(self.mul(acc, x), self.from_base(c));
        }
        acc
    }

    /// Horner evaluation of a `Kθ`-coefficient polynomial at a `Kθ` point.
    pub fn eval_ext_poly(&self, coeffs: &[ExtElem], x: ExtElem) -> ExtElem {
        let mut acc = self.zero();
        for &c in coeffs.iter().rev() {
            acc = self.add(self.mul(acc, x), c);
        }
        acc
    }
}
