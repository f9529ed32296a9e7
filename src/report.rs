//! Soundness & layout bookkeeping
//!
//! Per-round soundness estimates for a compiled statement, with grinding
//! credit, plus the layout metrics (row counts, column counts, serialized
//! proof size estimate). The ε terms are the standard first-order bounds:
//!
//! - ε₁ — batching the parallel family with λ ∈ Kθ,
//! - ε₂ — Schwartz–Zippel over the ℓ′ evaluation points,
//! - ε₃ — the η repeated DECS combinations,
//! - ε₄ — the size-ℓ column subset E.
//!
//! Each round `i` earns an extra `κ_i` bits from grinding. Estimates are for
//! reporting; they never gate proving or verification.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use crate::params::Params;
use crate::piop::Statement;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SoundnessReport {
    pub field_bits: f64,
    /// Effective bits per round, grinding credit included.
    pub eps_bits: [f64; 4],
    pub total_bits: f64,
    pub target_lambda: usize,
    pub meets_target: bool,
    // layout metrics
    pub witness_rows: usize,
    pub public_rows: usize,
    pub mask_rows: usize,
    pub parallel_constraints: usize,
    pub aggregated_constraints: usize,
    pub effective_degree: usize,
    pub columns: usize,
    pub est_proof_bytes: usize,
}

impl SoundnessReport {
    pub fn compute(params: &Params, st: &Statement) -> Self {
        let field_bits = params.theta as f64 * (params.q as f64).log2();
        let d_q = st.effective_degree(params.ell) as f64;
        let n_par = st.parallel.len() as f64;
        let groups = if st.aggregated.is_empty() {
            0
        } else {
            st.aggregated.len().div_ceil(params.rho)
        };
        let total_rows = st.witness_rows.len() + 1 + groups + params.eta;

        let eps1 = field_bits - (n_par + 1.0).log2() + params.kappa[0] as f64;
        let eps2 =
            params.ell_prime as f64 * (field_bits - d_q.max(2.0).log2()) + params.kappa[1] as f64;
        let eps3 = params.eta as f64 * (field_bits - (total_rows as f64).log2())
            + params.kappa[2] as f64;
        // A far codeword disagrees on ≥ (N − dQ) columns; each of the ℓ probes
        // misses with probability ≤ dQ/N.
        let miss = (d_q / params.n as f64).min(0.999_999);
        let eps4 = params.ell as f64 * -miss.log2() + params.kappa[3] as f64;

        let eps_bits = [eps1, eps2, eps3, eps4];
        let total_bits = eps_bits.iter().cloned().fold(f64::INFINITY, f64::min);

        let theta_bytes = 8 * params.theta;
        let row_len = params.n_cols + params.ell;
        let est_proof_bytes = 32
            + params.ell_prime * total_rows * theta_bytes
            + (d_q as usize) * theta_bytes
            + groups * row_len * theta_bytes
            + params.eta * row_len * theta_bytes
            + params.ell * (total_rows * 8 + 32 + 32 * (params.n as f64).log2() as usize)
            + 4 * 8;

        Self {
            field_bits,
            eps_bits,
            total_bits,
            target_lambda: params.lambda,
            meets_target: total_bits >= params.lambda as f64,
            witness_rows: st.witness_rows.len(),
            public_rows: st.public_rows.len(),
            mask_rows: 1 + groups + params.eta,
            parallel_constraints: st.parallel.len(),
            aggregated_constraints: st.aggregated.len(),
            effective_degree: st.effective_degree(params.ell),
            columns: params.n,
            est_proof_bytes,
        }
    }
}

impl std::fmt::Display for SoundnessReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "soundness: field {:.1} bits", self.field_bits)?;
        for (i, b) in self.eps_bits.iter().enumerate() {
            writeln!(f, "  ε{}: {:.1} bits", i + 1, b)?;
        }
        writeln!(
            f,
            "  total {:.1} bits (target λ = {}, {})",
            self.total_bits,
            self.target_lambda,
            if self.meets_target { "met" } else { "NOT met" }
        )?;
        writeln!(
            f,
            "layout: {} witness + {} mask rows over {} columns, {} public rows",
            self.witness_rows, self.mask_rows, self.columns, self.public_rows
        )?;
        writeln!(
            f,
            "  {} parallel / {} aggregated constraints, dQ = {}, ≈{} proof bytes",
            self.parallel_constraints,
            self.aggregated_constraints,
            self.effective_degree,
            self.est_proof_bytes
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::piop::{ConstraintKind, Factor, Term};

    #[test]
    fn report_reflects_layout() {
        let params = Params::credential_default();
        let mut st = Statement::new(params.n_cols);
        let v = st.add_witness("v", vec![0; params.n_cols]).unwrap();
        st.bound_range_product("v.range", v, params.b, params.q);
        st.push_aggregated(
            ConstraintKind::PrfTag,
            "lin",
            vec![Term { coeff: 1, factors: vec![Factor::plain(v)] }],
        )
        .unwrap();

        let rep = SoundnessReport::compute(&params, &st);
        assert_eq!(rep.witness_rows, 1);
        assert_eq!(rep.parallel_constraints, 1);
        assert_eq!(rep.aggregated_constraints, 1);
        assert_eq!(rep.mask_rows, 1 + 1 + params.eta);
        assert!(rep.total_bits.is_finite());
        let shown = rep.to_string();
        assert!(shown.contains("soundness"));
    }
}
