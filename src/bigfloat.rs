//! Arbitrary-precision binary floats
//!
//! The trapdoor solver reduces lattice bases whose coefficients reach tens of
//! thousands of bits; the Babai step needs quotients of such numbers to a few
//! hundred bits of relative accuracy. This module provides exactly that: a
//! `mantissa·2^exp` float over `BigInt` mantissas, normalized to a context
//! precision (256 bits for reductions, 128 for quick embeddings), plus the
//! complex pairs the embedding transforms operate on.
//!
//! Rounding is round-to-nearest on normalization; [`FloatCtx::round`]
//! produces the integer blocks the Babai step subtracts.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use num_bigint::{BigInt, Sign};
use num_integer::Roots;
use num_traits::{One, Signed, Zero};

/// A binary float `mant · 2^exp`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BigFloat {
    pub mant: BigInt,
    pub exp: i64,
}

impl BigFloat {
    pub fn zero() -> Self {
        Self { mant: BigInt::zero(), exp: 0 }
    }

    pub fn is_zero(&self) -> bool {
        self.mant.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.mant.is_negative()
    }
}

/// Precision context; all operations normalize results to `prec` bits.
#[derive(Debug, Clone, Copy)]
pub struct FloatCtx {
    pub prec: u64,
}

/// Shift right by `s` with round-to-nearest (ties away from zero).
fn shr_round(m: &BigInt, s: u64) -> BigInt {
    if s == 0 {
        return m.clone();
    }
    let half = BigInt::one() << (s - 1);
    if m.is_negative() {
        -((-m + half) >> s)
    } else {
        (m + half) >> s
    }
}

impl FloatCtx {
    pub fn new(prec: u64) -> Self {
        Self { prec }
    }

    fn normalize(&self, mut mant: BigInt, mut exp: i64) -> BigFloat {
        if mant.is_zero() {
            return BigFloat::zero();
        }
        let bits = mant.magnitude().bits();
        if bits > self.prec {
            let s = bits - self.prec;
            mant = shr_round(&mant, s);
            exp += s as i64;
        }
        BigFloat { mant, exp }
    }

    pub fn from_bigint(&self, v: &BigInt) -> BigFloat {
        self.normalize(v.clone(), 0)
    }

    pub fn from_i64(&self, v: i64) -> BigFloat {
        self.from_bigint(&BigInt::from(v))
    }

    pub fn from_f64(&self, v: f64) -> BigFloat {
        if v == 0.0 {
            return BigFloat::zero();
        }
        debug_assert!(v.is_finite());
        let bits = v.to_bits();
        let sign = if bits >> 63 == 1 { Sign::Minus } else { Sign::Plus };
        let biased = ((bits >> 52) & 0x7ff) as i64;
        let frac = bits & ((1u64 << 52) - 1);
        let (mant, exp) = if biased == 0 {
            (frac, -1074i64) // subnormal
        } else {
            (frac | (1 << 52), biased - 1075)
        };
        self.normalize(BigInt::from_biguint(sign, mant.into()), exp)
    }

    pub fn to_f64(&self, a: &BigFloat) -> f64 {
        if a.is_zero() {
            return 0.0;
        }
        let bits = a.mant.magnitude().bits();
        let (top, e) = if bits > 53 {
            (shr_round(&a.mant, bits - 53), a.exp + (bits - 53) as i64)
        } else {
            (a.mant.clone(), a.exp)
        };
        let m: f64 = top.to_string().parse().unwrap_or(0.0);
        m * 2f64.powi(e.clamp(i32::MIN as i64, i32::MAX as i64) as i32)
    }

    pub fn neg(&self, a: &BigFloat) -> BigFloat {
        BigFloat { mant: -&a.mant, exp: a.exp }
    }

    pub fn add(&self, a: &BigFloat, b: &BigFloat) -> BigFloat {
        if a.is_zero() {
            return b.clone();
        }
        if b.is_zero() {
            return a.clone();
        }
        let (hi, lo) = if a.exp >= b.exp { (a, b) } else { (b, a) };
        let diff = (hi.exp - lo.exp) as u64;
        // Beyond the guard window the small operand cannot affect the result.
        if diff > self.prec + 2 {
            return hi.clone();
        }
        let mant = (&hi.mant << diff) + &lo.mant;
        self.normalize(mant, lo.exp)
    }

    pub fn sub(&self, a: &BigFloat, b: &BigFloat) -> BigFloat {
        self.add(a, &self.neg(b))
    }

    pub fn mul(&self, a: &BigFloat, b: &BigFloat) -> BigFloat {
        if a.is_zero() || b.is_zero() {
            return BigFloat::zero();
        }
        self.normalize(&a.mant * &b.mant, a.exp + b.exp)
    }

    pub fn div(&self, a: &BigFloat, b: &BigFloat) -> BigFloat {
        debug_assert!(!b.is_zero(), "division by zero");
        if a.is_zero() {
            return BigFloat::zero();
        }
        let shift = self.prec + 2;
        let num = &a.mant << shift;
        let quot = if (num.is_negative()) ^ (b.mant.is_negative()) {
            // round quotient to nearest by offsetting with half the divisor
            let habs = b.mant.abs() >> 1;
            (num - habs * b.mant.sign_i()) / &b.mant
        } else {
            let habs = b.mant.abs() >> 1;
            (num + habs * b.mant.sign_i()) / &b.mant
        };
        self.normalize(quot, a.exp - b.exp - shift as i64)
    }

    /// Square root of a non-negative float.
    pub fn sqrt(&self, a: &BigFloat) -> BigFloat {
        debug_assert!(!a.is_negative(), "sqrt of negative float");
        if a.is_zero() {
            return BigFloat::zero();
        }
        // Scale so the integer sqrt carries ~2·prec bits.
        let mut shift = 2 * self.prec as i64;
        if (a.exp - shift) % 2 != 0 {
            shift += 1;
        }
        let scaled = &a.mant << shift as u64;
        let root = scaled.sqrt();
        self.normalize(root, (a.exp - shift) / 2)
    }

    /// Round to the nearest integer.
    pub fn round(&self, a: &BigFloat) -> BigInt {
        if a.is_zero() {
            return BigInt::zero();
        }
        if a.exp >= 0 {
            &a.mant << a.exp as u64
        } else {
            shr_round(&a.mant, (-a.exp) as u64)
        }
    }

    /// Compare `a` and `b`.
    pub fn cmp(&self, a: &BigFloat, b: &BigFloat) -> std::cmp::Ordering {
        let d = self.sub(a, b);
        if d.is_zero() {
            std::cmp::Ordering::Equal
        } else if d.is_negative() {
            std::cmp::Ordering::Less
        } else {
            std::cmp::Ordering::Greater
        }
    }
}

trait SignI {
    fn sign_i(&self) -> BigInt;
}
impl SignI for BigInt {
    fn sign_i(&self) -> BigInt {
        if self.is_negative() {
            BigInt::from(-1)
        } else {
            BigInt::one()
        }
    }
}

// ===========================================================================
// Complex pairs
// ===========================================================================

/// Complex number over [`BigFloat`] components.
#[derive(Debug, Clone)]
pub struct Complex {
    pub re: BigFloat,
    pub im: BigFloat,
}

impl Complex {
    pub fn zero() -> Self {
        Self { re: BigFloat::zero(), im: BigFloat::zero() }
    }

    pub fn real(v: BigFloat) -> Self {
        Self { re: v, im: BigFloat::zero() }
    }
}

impl FloatCtx {
    pub fn cadd(&self, a: &Complex, b: &Complex) -> Complex {
        Complex { re: self.add(&a.re, &b.re), im: self.add(&a.im, &b.im) }
    }

    pub fn csub(&self, a: &Complex, b: &Complex) -> Complex {
        Complex { re: self.sub(&a.re, &b.re), im: self.sub(&a.im, &b.im) }
    }

    pub fn cmul(&self, a: &Complex, b: &Complex) -> Complex {
        let re = self.sub(&self.mul(&a.re, &b.re), &self.mul(&a.im, &b.im));
        let im = self.add(&self.mul(&a.re, &b.im), &self.mul(&a.im, &b.re));
        Complex { re, im }
    }

    pub fn cconj(&self, a: &Complex) -> Complex {
        Complex { re: a.re.clone(), im: self.neg(&a.im) }
    }

    pub fn cnorm(&self, a: &Complex) -> BigFloat {
        self.add(&self.mul(&a.re, &a.re), &self.mul(&a.im, &a.im))
    }

    pub fn cdiv(&self, a: &Complex, b: &Complex) -> Complex {
        let n = self.cnorm(b);
        let num = self.cmul(a, &self.cconj(b));
        Complex { re: self.div(&num.re, &n), im: self.div(&num.im, &n) }
    }

    /// Principal square root (branch with `re ≥ 0`).
    pub fn csqrt(&self, a: &Complex) -> Complex {
        let r = self.sqrt(&self.cnorm(a));
        let two = self.from_i64(2);
        let re = self.sqrt(&self.div(&self.add(&r, &a.re), &two));
        let mut im = self.sqrt(&self.div(&self.sub(&r, &a.re), &two));
        if a.im.is_negative() {
            im = self.neg(&im);
        }
        Complex { re, im }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> FloatCtx {
        FloatCtx::new(256)
    }

    #[test]
    fn arithmetic_round_trips_through_f64() {
        let c = ctx();
        let a = c.from_f64(3.25);
        let b = c.from_f64(-0.125);
        assert!((c.to_f64(&c.add(&a, &b)) - 3.125).abs() < 1e-12);
        assert!((c.to_f64(&c.mul(&a, &b)) + 0.40625).abs() < 1e-12);
        assert!((c.to_f64(&c.div(&a, &b)) + 26.0).abs() < 1e-9);
    }

    #[test]
    fn sqrt_squares_back() {
        let c = ctx();
        let v = c.from_i64(2);
        let r = c.sqrt(&v);
        let back = c.mul(&r, &r);
        let err = c.to_f64(&c.sub(&back, &v)).abs();
        assert!(err < 1e-60, "err={err}");
    }

    #[test]
    fn rounding_is_nearest() {
        let c = ctx();
        assert_eq!(c.round(&c.from_f64(2.49)), BigInt::from(2));
        assert_eq!(c.round(&c.from_f64(2.5)), BigInt::from(3));
        assert_eq!(c.round(&c.from_f64(-2.49)), BigInt::from(-2));
        assert_eq!(c.round(&c.from_f64(-2.5)), BigInt::from(-3));
    }

    #[test]
    fn complex_sqrt_of_minus_one() {
        let c = ctx();
        let minus_one = Complex::real(c.from_i64(-1));
        let i = c.csqrt(&minus_one);
        assert!(c.to_f64(&i.re).abs() < 1e-60);
        assert!((c.to_f64(&i.im) - 1.0).abs() < 1e-60);
        let sq = c.cmul(&i, &i);
        assert!((c.to_f64(&sq.re) + 1.0).abs() < 1e-60);
    }

    #[test]
    fn division_of_huge_integers_keeps_relative_accuracy() {
        let c = ctx();
        let big = BigInt::from(7u8) << 4000;
        let a = c.from_bigint(&(&big * 3));
        let b = c.from_bigint(&big);
        let q = c.div(&a, &b);
        assert!((c.to_f64(&q) - 3.0).abs() < 1e-60);
    }
}
