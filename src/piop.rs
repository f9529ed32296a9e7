//! Constraint system & PIOP builder
//!
//! A statement is a set of **rows** — public and witness vectors of `|Ω|`
//! evaluation-slot values — plus two constraint families over them:
//!
//! - **parallel** constraints: lane-wise relations of bounded multiplicative
//!   degree that must vanish on every Ω slot (commitment residuals, centered
//!   wraps, membership products, the hash and signature equations, PRF sbox
//!   chains);
//! - **aggregated** constraints: linear relations bundled `ρ` at a time into
//!   sum polynomials (the PRF linear layers, boundary ties and tag checks).
//!
//! Constraints are sums of terms; a term is a scalar times a product of
//! *affine* row factors `(row + offset)`, which covers range products
//! `∏(row − v)` and the sbox inputs `state + c` without expansion. Every
//! constraint compiles to a dense polynomial in `Fq[X]` that vanishes on Ω
//! for an honest witness; the prover batches and divides by `Z_Ω`, the
//! verifier re-evaluates the same expressions at the challenge points from
//! the opened row values.
//!
//! Row polynomials: witness rows interpolate `|Ω|` head values plus `ℓ`
//! mask-tail values over the first `|Ω|+ℓ` NTT nodes (degree `|Ω|+ℓ−1`);
//! public rows interpolate the head only (degree `|Ω|−1`, recomputed by the
//! verifier).

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use crate::ext::{ExtElem, ExtField};
use crate::ring::{add_mod, inv_mod, mul_mod, sub_mod};

// ===========================================================================
// Dense polynomial helpers over Fq
// ===========================================================================

pub fn poly_add(a: &[u64], b: &[u64], q: u64) -> Vec<u64> {
    let n = a.len().max(b.len());
    (0..n)
        .map(|i| add_mod(*a.get(i).unwrap_or(&0), *b.get(i).unwrap_or(&0), q))
        .collect()
}

pub fn poly_scale(s: u64, a: &[u64], q: u64) -> Vec<u64> {
    a.iter().map(|&c| mul_mod(s, c, q)).collect()
}

pub fn poly_mul(a: &[u64], b: &[u64], q: u64) -> Vec<u64> {
    if a.is_empty() || b.is_empty() {
        return Vec::new();
    }
    let mut out = vec![0u64; a.len() + b.len() - 1];
    for (i, &x) in a.iter().enumerate() {
        if x == 0 {
            continue;
        }
        for (j, &y) in b.iter().enumerate() {
            out[i + j] = add_mod(out[i + j], mul_mod(x, y, q), q);
        }
    }
    out
}

pub fn poly_eval(a: &[u64], x: u64, q: u64) -> u64 {
    let mut acc = 0u64;
    for &c in a.iter().rev() {
        acc = add_mod(mul_mod(acc, x, q), c, q);
    }
    acc
}

/// `∏ (X − x_i)` over the given nodes.
pub fn vanishing_poly(nodes: &[u64], q: u64) -> Vec<u64> {
    let mut acc = vec![1u64];
    for &x in nodes {
        acc = poly_mul(&acc, &[sub_mod(0, x, q), 1], q);
    }
    acc
}

/// Lagrange interpolation over distinct nodes (O(k²)).
pub fn interpolate(nodes: &[u64], values: &[u64], q: u64) -> Vec<u64> {
    debug_assert_eq!(nodes.len(), values.len());
    let k = nodes.len();
    let full = vanishing_poly(nodes, q);
    let mut out = vec![0u64; k];
    for i in 0..k {
        // basis_i = full / (X − x_i), by synthetic division
        let mut basis = vec![0u64; k];
        basis[k - 1] = full[k];
        for j in (0..k - 1).rev() {
            basis[j] = add_mod(full[j + 1], mul_mod(nodes[i], basis[j + 1], q), q);
        }
        let denom = poly_eval(&basis, nodes[i], q);
        let w = mul_mod(values[i], inv_mod(denom, q), q);
        for j in 0..k {
            out[j] = add_mod(out[j], mul_mod(w, basis[j], q), q);
        }
    }
    out
}

/// Quotient of `num / den` with the remainder discarded.
pub fn poly_div(num: &[u64], den: &[u64], q: u64) -> Vec<u64> {
    let dd = den.len();
    debug_assert!(dd > 0 && *den.last().unwrap() != 0);
    if num.len() < dd {
        return Vec::new();
    }
    let mut rem = num.to_vec();
    let lead_inv = inv_mod(den[dd - 1], q);
    let mut quot = vec![0u64; num.len() - dd + 1];
    for i in (0..quot.len()).rev() {
        let c = mul_mod(rem[i + dd - 1], lead_inv, q);
        quot[i] = c;
        if c == 0 {
            continue;
        }
        for j in 0..dd {
            rem[i + j] = sub_mod(rem[i + j], mul_mod(c, den[j], q), q);
        }
    }
    quot
}

// ===========================================================================
// Rows, factors, terms, constraints
// ===========================================================================

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct NamedRow {
    pub name: String,
    /// `|Ω|` evaluation-slot values.
    pub values: Vec<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RowRef {
    Public(usize),
    Witness(usize),
}

/// Affine factor `(row + offset)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Factor {
    pub row: RowRef,
    pub offset: u64,
}

impl Factor {
    pub fn plain(row: RowRef) -> Self {
        Self { row, offset: 0 }
    }
}

/// `coeff · ∏ factors`; an empty factor list is the constant `coeff`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Term {
    pub coeff: u64,
    pub factors: Vec<Factor>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ConstraintKind {
    CommitResidual,
    CenteredWrap,
    CarryMembership,
    Packing,
    BoundChain,
    HashEquation,
    SignatureEquation,
    PrfRound,
    PrfBoundary,
    PrfTag,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Constraint {
    pub kind: ConstraintKind,
    pub name: String,
    pub terms: Vec<Term>,
}

impl Constraint {
    /// Maximum number of witness factors in any term.
    pub fn witness_degree(&self) -> usize {
        self.terms
            .iter()
            .map(|t| {
                t.factors.iter().filter(|f| matches!(f.row, RowRef::Witness(_))).count()
            })
            .max()
            .unwrap_or(0)
    }

    /// Whether any term multiplies through a public row.
    pub fn has_public_factor(&self) -> bool {
        self.terms
            .iter()
            .any(|t| t.factors.iter().any(|f| matches!(f.row, RowRef::Public(_))))
    }

    fn is_linear(&self) -> bool {
        self.witness_degree() <= 1
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PiopError {
    #[error("row length {got} does not match |Ω|={expected}")]
    BadRowLen { expected: usize, got: usize },
    #[error("row reference out of range in constraint '{0}'")]
    BadRowRef(String),
    #[error("aggregated constraint '{0}' is not linear in the witness")]
    NotLinear(String),
    #[error("effective degree {got} exceeds cap {cap}")]
    DegreeCap { got: usize, cap: usize },
}

// ===========================================================================
// Statement
// ===========================================================================

/// A complete PIOP statement: rows plus both constraint families.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Statement {
    /// `|Ω|`: number of public evaluation slots (lanes).
    pub n_cols: usize,
    pub public_rows: Vec<NamedRow>,
    pub witness_rows: Vec<NamedRow>,
    pub parallel: Vec<Constraint>,
    pub aggregated: Vec<Constraint>,
}

impl Statement {
    pub fn new(n_cols: usize) -> Self {
        Self {
            n_cols,
            public_rows: Vec::new(),
            witness_rows: Vec::new(),
            parallel: Vec::new(),
            aggregated: Vec::new(),
        }
    }

    pub fn add_public(&mut self, name: impl Into<String>, values: Vec<u64>) -> Result<RowRef, PiopError> {
        if values.len() != self.n_cols {
            return Err(PiopError::BadRowLen { expected: self.n_cols, got: values.len() });
        }
        self.public_rows.push(NamedRow { name: name.into(), values });
        Ok(RowRef::Public(self.public_rows.len() - 1))
    }

    pub fn add_witness(&mut self, name: impl Into<String>, values: Vec<u64>) -> Result<RowRef, PiopError> {
        if values.len() != self.n_cols {
            return Err(PiopError::BadRowLen { expected: self.n_cols, got: values.len() });
        }
        self.witness_rows.push(NamedRow { name: name.into(), values });
        Ok(RowRef::Witness(self.witness_rows.len() - 1))
    }

    pub fn push_parallel(&mut self, kind: ConstraintKind, name: impl Into<String>, terms: Vec<Term>) {
        self.parallel.push(Constraint { kind, name: name.into(), terms });
    }

    pub fn push_aggregated(
        &mut self,
        kind: ConstraintKind,
        name: impl Into<String>,
        terms: Vec<Term>,
    ) -> Result<(), PiopError> {
        let c = Constraint { kind, name: name.into(), terms };
        if !c.is_linear() {
            return Err(PiopError::NotLinear(c.name));
        }
        self.aggregated.push(c);
        Ok(())
    }

    pub fn parallel_count(&self) -> usize {
        self.parallel.len()
    }

    fn row_value(&self, r: RowRef, lane: usize) -> u64 {
        match r {
            RowRef::Public(i) => self.public_rows[i].values[lane],
            RowRef::Witness(i) => self.witness_rows[i].values[lane],
        }
    }

    /// Evaluate one constraint on one lane (honest-witness sanity checks).
    pub fn eval_lane(&self, c: &Constraint, lane: usize, q: u64) -> u64 {
        let mut acc = 0u64;
        for t in &c.terms {
            let mut v = t.coeff;
            for f in &t.factors {
                v = mul_mod(v, add_mod(self.row_value(f.row, lane), f.offset, q), q);
            }
            acc = add_mod(acc, v, q);
        }
        acc
    }

    /// True iff every constraint of both families vanishes on every lane.
    pub fn is_satisfied(&self, q: u64) -> bool {
        self.parallel
            .iter()
            .chain(&self.aggregated)
            .all(|c| (0..self.n_cols).all(|l| self.eval_lane(c, l, q) == 0))
    }

    /// Maximum witness degree over the parallel family.
    pub fn parallel_degree(&self) -> usize {
        self.parallel.iter().map(|c| c.witness_degree()).max().unwrap_or(0)
    }

    pub fn aggregated_degree(&self) -> usize {
        self.aggregated.iter().map(|c| c.witness_degree()).max().unwrap_or(1)
    }

    /// Effective verification degree for mask-tail length `ell`; must stay
    /// below the ring degree.
    pub fn effective_degree(&self, ell: usize) -> usize {
        let d_row = self.n_cols + ell - 1;
        let par = self.parallel_degree() * d_row + (self.n_cols - 1);
        let agg = self.aggregated_degree() * d_row + (self.n_cols - 1);
        par.max(agg)
    }

    pub fn check_degree_cap(&self, ell: usize, n: usize) -> Result<(), PiopError> {
        let got = self.effective_degree(ell);
        if got > n - 1 {
            return Err(PiopError::DegreeCap { got, cap: n - 1 });
        }
        Ok(())
    }

    /// Validate that every row reference in every constraint resolves.
    pub fn check_refs(&self) -> Result<(), PiopError> {
        for c in self.parallel.iter().chain(&self.aggregated) {
            for t in &c.terms {
                for f in &t.factors {
                    let ok = match f.row {
                        RowRef::Public(i) => i < self.public_rows.len(),
                        RowRef::Witness(i) => i < self.witness_rows.len(),
                    };
                    if !ok {
                        return Err(PiopError::BadRowRef(c.name.clone()));
                    }
                }
            }
        }
        Ok(())
    }
}

// ===========================================================================
// Gadget builders
// ===========================================================================

impl Statement {
    /// `com_i − Σ_j Ac[i][j]·w_j = 0` for one commitment row.
    pub fn commit_residual(&mut self, idx: usize, com: RowRef, ac_row: &[RowRef], w: &[RowRef], q: u64) {
        let mut terms = vec![Term { coeff: 1, factors: vec![Factor::plain(com)] }];
        for (a, wj) in ac_row.iter().zip(w) {
            terms.push(Term {
                coeff: q - 1,
                factors: vec![Factor::plain(*a), Factor::plain(*wj)],
            });
        }
        self.push_parallel(ConstraintKind::CommitResidual, format!("commit[{idx}]"), terms);
    }

    /// `rU + rI − r − (2B+1)·k = 0`.
    pub fn centered_wrap(&mut self, blk: usize, ru: RowRef, ri: RowRef, r: RowRef, k: RowRef, b: u64, q: u64) {
        let m = (2 * b + 1) % q;
        let terms = vec![
            Term { coeff: 1, factors: vec![Factor::plain(ru)] },
            Term { coeff: 1, factors: vec![Factor::plain(ri)] },
            Term { coeff: q - 1, factors: vec![Factor::plain(r)] },
            Term { coeff: q - m, factors: vec![Factor::plain(k)] },
        ];
        self.push_parallel(ConstraintKind::CenteredWrap, format!("center[{blk}]"), terms);
    }

    /// `k·(k−1)·(k+1) = 0`.
    pub fn carry_membership(&mut self, blk: usize, k: RowRef, q: u64) {
        let terms = vec![Term {
            coeff: 1,
            factors: vec![
                Factor::plain(k),
                Factor { row: k, offset: q - 1 },
                Factor { row: k, offset: 1 },
            ],
        }];
        self.push_parallel(ConstraintKind::CarryMembership, format!("carry[{blk}]"), terms);
    }

    /// `sel·row = 0` on Ω (packing / lane selection).
    pub fn packing(&mut self, name: impl Into<String>, sel: RowRef, row: RowRef) {
        let terms = vec![Term { coeff: 1, factors: vec![Factor::plain(sel), Factor::plain(row)] }];
        self.push_parallel(ConstraintKind::Packing, name, terms);
    }

    /// Exact `[−B, B]` membership: `∏_{v=−B..B}(row − v) = 0`.
    pub fn bound_range_product(&mut self, name: impl Into<String>, row: RowRef, b: u64, q: u64) {
        let factors = (-(b as i64)..=b as i64)
            .map(|v| Factor { row, offset: (-v).rem_euclid(q as i64) as u64 })
            .collect();
        let terms = vec![Term { coeff: 1, factors }];
        self.push_parallel(ConstraintKind::BoundChain, name, terms);
    }

    /// ℓ∞ digit chain for larger bounds: digit rows `d_i ∈ [−2^{W−1}, 2^{W−1})`
    /// with recomposition `row = Σ d_i·2^{iW}`.
    pub fn bound_digit_chain(
        &mut self,
        name: &str,
        row: RowRef,
        digits: &[RowRef],
        w_bits: u32,
        q: u64,
    ) {
        let half = 1i64 << (w_bits - 1);
        for (i, d) in digits.iter().enumerate() {
            let factors = (-half..half)
                .map(|v| Factor { row: *d, offset: (-v).rem_euclid(q as i64) as u64 })
                .collect();
            self.push_parallel(
                ConstraintKind::BoundChain,
                format!("{name}.digit[{i}]"),
                vec![Term { coeff: 1, factors }],
            );
        }
        let mut terms = vec![Term { coeff: 1, factors: vec![Factor::plain(row)] }];
        let mut radix = 1u64;
        for d in digits {
            terms.push(Term { coeff: q - radix % q, factors: vec![Factor::plain(*d)] });
            radix = mul_mod(radix, 1 << w_bits, q);
        }
        self.push_parallel(ConstraintKind::BoundChain, format!("{name}.recompose"), terms);
    }

    /// `T − (B0 + B1·m1 + B1·m2 + B2·x0 + B3·x1) = 0`.
    pub fn hash_equation(
        &mut self,
        t: RowRef,
        b: [RowRef; 4],
        m1: RowRef,
        m2: RowRef,
        x0: RowRef,
        x1: RowRef,
        q: u64,
    ) {
        let terms = vec![
            Term { coeff: 1, factors: vec![Factor::plain(t)] },
            Term { coeff: q - 1, factors: vec![Factor::plain(b[0])] },
            Term { coeff: q - 1, factors: vec![Factor::plain(b[1]), Factor::plain(m1)] },
            Term { coeff: q - 1, factors: vec![Factor::plain(b[1]), Factor::plain(m2)] },
            Term { coeff: q - 1, factors: vec![Factor::plain(b[2]), Factor::plain(x0)] },
            Term { coeff: q - 1, factors: vec![Factor::plain(b[3]), Factor::plain(x1)] },
        ];
        self.push_parallel(ConstraintKind::HashEquation, "hash", terms);
    }

    /// `Σ A_i·U_i − T = 0`; `A` has one or two rows per the preimage shape.
    pub fn signature_equation(&mut self, a: &[Option<RowRef>], u: &[RowRef], t: RowRef, q: u64) {
        debug_assert_eq!(a.len(), u.len());
        let mut terms = Vec::new();
        for (ai, ui) in a.iter().zip(u) {
            let factors = match ai {
                Some(arow) => vec![Factor::plain(*arow), Factor::plain(*ui)],
                // identity entry of the signature matrix
                None => vec![Factor::plain(*ui)],
            };
            terms.push(Term { coeff: 1, factors });
        }
        terms.push(Term { coeff: q - 1, factors: vec![Factor::plain(t)] });
        self.push_parallel(ConstraintKind::SignatureEquation, "signature", terms);
    }
}

// ===========================================================================
// Compilation (prover side)
// ===========================================================================

/// Dense row polynomials backing a statement during proving.
pub struct CompiledRows {
    pub q: u64,
    /// Witness row polynomials (head+tail interpolation).
    pub witness: Vec<Vec<u64>>,
    /// Public row polynomials (head-only interpolation).
    pub public: Vec<Vec<u64>>,
}

impl CompiledRows {
    fn factor_poly(&self, f: &Factor) -> Vec<u64> {
        let mut p = match f.row {
            RowRef::Public(i) => self.public[i].clone(),
            RowRef::Witness(i) => self.witness[i].clone(),
        };
        if f.offset != 0 {
            if p.is_empty() {
                p.push(0);
            }
            p[0] = add_mod(p[0], f.offset, self.q);
        }
        p
    }

    /// Compile one constraint to its dense polynomial.
    pub fn compile(&self, c: &Constraint) -> Vec<u64> {
        let mut acc: Vec<u64> = Vec::new();
        for t in &c.terms {
            let mut p = vec![t.coeff];
            for f in &t.factors {
                p = poly_mul(&p, &self.factor_poly(f), self.q);
            }
            acc = poly_add(&acc, &p, self.q);
        }
        acc
    }
}

/// Verifier-side evaluation of a constraint at an extension point, from the
/// opened witness-row values and the recomputed public-row values.
pub fn eval_constraint_ext(
    ext: &ExtField,
    c: &Constraint,
    witness_at: &[ExtElem],
    public_at: &[ExtElem],
) -> ExtElem {
    let mut acc = ext.zero();
    for t in &c.terms {
        let mut v = ext.from_base(t.coeff);
        for f in &t.factors {
            let base = match f.row {
                RowRef::Public(i) => public_at[i],
                RowRef::Witness(i) => witness_at[i],
            };
            v = ext.mul(v, ext.add(base, ext.from_base(f.offset)));
        }
        acc = ext.add(acc, v);
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;

    const Q: u64 = 97;

    #[test]
    fn interpolation_hits_values() {
        let nodes = [3u64, 10, 22, 41];
        let values = [5u64, 0, 96, 17];
        let p = interpolate(&nodes, &values, Q);
        for (x, v) in nodes.iter().zip(&values) {
            assert_eq!(poly_eval(&p, *x, Q), *v);
        }
        assert!(p.len() <= nodes.len());
    }

    #[test]
    fn vanishing_poly_vanishes() {
        let nodes = [1u64, 2, 3];
        let z = vanishing_poly(&nodes, Q);
        for &x in &nodes {
            assert_eq!(poly_eval(&z, x, Q), 0);
        }
        assert_eq!(z.len(), 4);
        assert_eq!(z[3], 1);
    }

    #[test]
    fn division_inverts_multiplication() {
        let a = [3u64, 1, 4, 1, 5];
        let b = [2u64, 7, 1];
        let prod = poly_mul(&a, &b, Q);
        let quot = poly_div(&prod, &b, Q);
        assert_eq!(quot, a.to_vec());
    }

    #[test]
    fn range_product_accepts_in_range_rejects_out() {
        let mut st = Statement::new(4);
        let row = st.add_witness("v", vec![3, 0, Q - 2, 1]).unwrap(); // centered: 3, 0, −2, 1
        st.bound_range_product("v.range", row, 3, Q);
        assert!(st.is_satisfied(Q));

        let mut bad = st.clone();
        bad.witness_rows[0].values[1] = 5; // 5 ∉ [−3, 3]
        assert!(!bad.is_satisfied(Q));
    }

    #[test]
    fn carry_and_wrap_gadgets() {
        let q = Q;
        let b = 8u64;
        let mut st = Statement::new(2);
        // rU=7, rI=6 → combined 13 = −4 + 17·1
        let ru = st.add_witness("ru", vec![7, 2]).unwrap();
        let r = st.add_witness("r", vec![q - 4, 3]).unwrap();
        let k = st.add_witness("k", vec![1, 0]).unwrap();
        let ri = st.add_public("ri", vec![6, 1]).unwrap();
        st.centered_wrap(0, ru, ri, r, k, b, q);
        st.carry_membership(0, k, q);
        assert!(st.is_satisfied(q));

        let mut bad = st.clone();
        bad.witness_rows[2].values[0] = 2; // carry outside {−1,0,1}
        assert!(!bad.is_satisfied(q));
    }

    #[test]
    fn compiled_constraint_vanishes_on_omega() {
        let q = 97u64;
        let ring = crate::ring::Ring::new(16, q).unwrap();
        let omega = 4usize;
        let ell = 3usize;
        let nodes: Vec<u64> = (0..omega + ell).map(|k| ring.node(k)).collect();

        let mut st = Statement::new(omega);
        let a = st.add_witness("a", vec![5, 6, 7, 8]).unwrap();
        let bpub = st.add_public("b", vec![2, 3, 4, 5]).unwrap();
        // a − (b + 3) = 0 lane-wise
        st.push_parallel(
            ConstraintKind::HashEquation,
            "affine",
            vec![
                Term { coeff: 1, factors: vec![Factor::plain(a)] },
                Term { coeff: q - 1, factors: vec![Factor { row: bpub, offset: 3 }] },
            ],
        );
        assert!(st.is_satisfied(q));

        // interpolate rows with tails that leave the constraint non-zero
        // past Ω (first tail forced off the public extension)
        let pub_poly = interpolate(&nodes[..omega], &st.public_rows[0].values, q);
        let off = add_mod(poly_eval(&pub_poly, nodes[omega], q), 4, q);
        let head = &st.witness_rows[0].values;
        let mut vals = head.clone();
        vals.extend_from_slice(&[off, 12, 13]);
        let wit_poly = interpolate(&nodes, &vals, q);
        let rows = CompiledRows { q, witness: vec![wit_poly], public: vec![pub_poly] };
        let f = rows.compile(&st.parallel[0]);
        for k in 0..omega {
            assert_eq!(poly_eval(&f, ring.node(k), q), 0, "must vanish on Ω node {k}");
        }
        // f(node_Ω) = off − (pub(node_Ω) + 3) = 1
        assert_eq!(poly_eval(&f, ring.node(omega), q), 1);
    }

    #[test]
    fn degree_accounting() {
        let q = Q;
        let mut st = Statement::new(8);
        let v = st.add_witness("v", vec![0; 8]).unwrap();
        st.bound_range_product("v.range", v, 8, q);
        assert_eq!(st.parallel_degree(), 17);
        // ℓ = 16 → d_row = 23; 17·23 + 7 = 398
        assert_eq!(st.effective_degree(16), 398);
        assert!(st.check_degree_cap(16, 1024).is_ok());
        assert!(st.check_degree_cap(16, 256).is_err());
    }
}
