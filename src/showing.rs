//! Showing protocol — statement assembly, prover, verifier
//!
//! The showing statement extends the issuance rows with the hash target as a
//! *witness* row, the signature rows `U`, and the PRF trace: lane-constant
//! state rows, sbox power chains (parallel quadratic constraints), linear
//! layers and tag ties (aggregated constraints bundled `ρ` at a time), and
//! the selector constraints binding the PRF key to the first Ω slots of
//! `m₁`.
//!
//! The prover/verifier pair compiles any [`Statement`] through the LVCS:
//!
//! 1. commit witness rows plus the mask segment (one parallel mask, one mask
//!    per aggregated group, `η` DECS masks), all tails uniform;
//! 2. derive λ/μ batching challenges, then `ℓ′` evaluation points in
//!    `Kθ \ Ω`;
//! 3. answer with every row's evaluations, the λ-batched parallel quotient
//!    `H = (Σ λ_c F_c + λ_m·mask)/Z_Ω` and the aggregated sum polynomials;
//! 4. answer `η` DECS batch combinations, then open the size-ℓ column subset
//!    `E` against the Merkle root.
//!
//! Verification replays the transcript (grinding nonces included), checks
//! every constraint identity at every evaluation point, checks the sum
//! polynomials vanish on Ω, and checks the DECS combinations against both
//! the Round-2 evaluations and the opened columns. Any failure is terminal;
//! the first matching diagnostic is returned.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![allow(clippy::too_many_arguments)]

use rand::Rng;
use tracing::{debug, instrument};

use crate::ext::{ExtElem, ExtField};
use crate::issuance::{
    push_credential_constraints, HolderSecrets, Issuance, IssuanceError, IssuerChallenge,
    PublicSetup,
};
use crate::lvcs::{self, ColumnOpening, LvcsCommitment, LvcsError};
use crate::params::Params;
use crate::piop::{
    eval_constraint_ext, interpolate, poly_add, poly_div, poly_scale, vanishing_poly,
    CompiledRows, ConstraintKind, Factor, PiopError, RowRef, Statement, Term,
};
use crate::prf::{self, PrfError, PrfParams};
use crate::ring::{Basis, Poly, Ring};
use crate::sampler::Preimage;
use crate::transcript::{FsLabel, Transcript};

#[derive(Debug, thiserror::Error)]
pub enum ShowError {
    #[error(transparent)]
    Issuance(#[from] IssuanceError),
    #[error(transparent)]
    Piop(#[from] PiopError),
    #[error(transparent)]
    Prf(#[from] PrfError),
    #[error("PRF key length {len_key} exceeds the packed half |Ω|/2 = {half}")]
    BadKeyLen { len_key: usize, half: usize },
    #[error("signature matrix supports 1 or 2 preimage rows (got {0})")]
    SignatureShape(usize),
}

#[derive(Debug, thiserror::Error)]
pub enum ProveError {
    #[error(transparent)]
    Piop(#[from] PiopError),
    #[error(transparent)]
    Lvcs(#[from] LvcsError),
    #[error("proving cancelled by stop flag")]
    Cancelled,
}

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("malformed proof: {0}")]
    InvalidInput(String),
    #[error("grinding nonce rejected in round {0}")]
    ChallengeMismatch(u8),
    #[error("constraint check failed: {0}")]
    ConstraintMismatch(String),
    #[error(transparent)]
    Merkle(#[from] LvcsError),
}

// ===========================================================================
// Mask layout
// ===========================================================================

/// Row layout of one LVCS commitment: the witness segment followed by the
/// mask segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaskLayout {
    pub witness: usize,
    pub groups: usize,
    pub eta: usize,
}

impl MaskLayout {
    pub fn of(st: &Statement, params: &Params) -> Self {
        let groups = if st.aggregated.is_empty() {
            0
        } else {
            st.aggregated.len().div_ceil(params.rho)
        };
        Self { witness: st.witness_rows.len(), groups, eta: params.eta }
    }

    #[inline]
    pub fn total_rows(&self) -> usize {
        self.witness + 1 + self.groups + self.eta
    }

    #[inline]
    pub fn par_mask(&self) -> usize {
        self.witness
    }

    #[inline]
    pub fn agg_mask(&self, g: usize) -> usize {
        self.witness + 1 + g
    }

    #[inline]
    pub fn decs_mask(&self, i: usize) -> usize {
        self.witness + 1 + self.groups + i
    }

    /// Rows covered by the DECS γ coefficients (everything but the DECS
    /// masks themselves).
    #[inline]
    pub fn batched_rows(&self) -> usize {
        self.witness + 1 + self.groups
    }
}

// ===========================================================================
// Showing statement
// ===========================================================================

pub struct ShowingInputs<'a> {
    /// Signature public key, evaluation basis.
    pub h: &'a Poly,
    pub sig: &'a Preimage,
    pub prf: &'a PrfParams,
    pub nonce: &'a [u64],
}

/// Signature matrix dispatch on the preimage row count.
fn signature_matrix(u_len: usize, h: RowRef) -> Result<Vec<Option<RowRef>>, ShowError> {
    match u_len {
        1 => Ok(vec![None]),
        2 => Ok(vec![None, Some(h)]),
        other => Err(ShowError::SignatureShape(other)),
    }
}

/// Assemble the full showing statement; returns it with the public tag.
pub fn showing_statement(
    ring: &Ring,
    params: &Params,
    setup: &PublicSetup,
    secrets: &HolderSecrets,
    iss: &Issuance,
    challenge: &IssuerChallenge,
    inputs: &ShowingInputs<'_>,
) -> Result<(Statement, Vec<u64>), ShowError> {
    let q = ring.q;
    let nc = params.n_cols;
    let mut st = Statement::new(nc);

    // Hash target is hidden at showing time.
    let t_row = st.add_witness("t", iss.t_ntt.coeffs[..nc].to_vec())?;
    let cred =
        push_credential_constraints(&mut st, ring, params, setup, secrets, iss, challenge, t_row)?;

    // --- signature rows and equation
    let s0_eval = ring.to_eval(&ring.lift(&inputs.sig.s0, Basis::Coefficient));
    let s1_eval = ring.to_eval(&ring.lift(&inputs.sig.s1, Basis::Coefficient));
    let s0_row = st.add_witness("u.s0", s0_eval.coeffs[..nc].to_vec())?;
    let s1_row = st.add_witness("u.s1", s1_eval.coeffs[..nc].to_vec())?;
    let h_row = st.add_public("h", inputs.h.coeffs[..nc].to_vec())?;
    let a = signature_matrix(2, h_row)?;
    st.signature_equation(&a, &[s0_row, s1_row], t_row, q);

    // --- PRF trace
    let p = inputs.prf;
    if p.len_key > nc / 2 {
        return Err(ShowError::BadKeyLen { len_key: p.len_key, half: nc / 2 });
    }
    let key_vals: Vec<u64> = secrets.m1.coeffs[..p.len_key].to_vec();
    let trace = prf::trace(p, &key_vals, inputs.nonce)?;

    // key rows, bound to m1 through lane selectors
    let mut key_rows = Vec::with_capacity(p.len_key);
    for (j, &kv) in key_vals.iter().enumerate() {
        let krow = st.add_witness(format!("prf.key[{j}]"), vec![kv; nc])?;
        let sel_vals = (0..nc).map(|i| u64::from(i == j)).collect();
        let sel = st.add_public(format!("prf.sel[{j}]"), sel_vals)?;
        st.push_parallel(
            ConstraintKind::PrfBoundary,
            format!("prf.bind[{j}]"),
            vec![
                Term { coeff: 1, factors: vec![Factor::plain(sel), Factor::plain(cred.m1)] },
                Term { coeff: q - 1, factors: vec![Factor::plain(sel), Factor::plain(krow)] },
            ],
        );
        key_rows.push(krow);
    }
    let mut nonce_rows = Vec::with_capacity(p.len_nonce);
    for (j, &nv) in inputs.nonce.iter().enumerate() {
        nonce_rows.push(st.add_public(format!("prf.nonce[{j}]"), vec![nv % q; nc])?);
    }
    let state0: Vec<RowRef> = key_rows.iter().chain(&nonce_rows).copied().collect();

    // state rows for rounds 1..=RF+RP
    let mut states: Vec<Vec<RowRef>> = vec![state0];
    for r in 1..=p.rf + p.rp {
        let mut lanes = Vec::with_capacity(p.t);
        for i in 0..p.t {
            lanes.push(st.add_witness(
                format!("prf.s[{r}][{i}]"),
                vec![trace.states[r][i]; nc],
            )?);
        }
        states.push(lanes);
    }

    // sbox chains + linear layers
    let d = p.d as usize;
    for r in 0..p.rf + p.rp {
        let external = p.is_external(r);
        let lanes: Vec<usize> = if external { (0..p.t).collect() } else { vec![0] };
        let mut v_refs: Vec<RowRef> = states[r].clone();
        for (ci, &lane) in lanes.iter().enumerate() {
            let u = Factor { row: states[r][lane], offset: p.round_const[r][lane] };
            let chain = &trace.chains[r][ci];
            let mut chain_refs = Vec::with_capacity(d - 1);
            for (pi, &pv) in chain.iter().enumerate() {
                chain_refs.push(st.add_witness(
                    format!("prf.p[{r}][{lane}][{}]", pi + 2),
                    vec![pv; nc],
                )?);
            }
            // u·u = p2
            st.push_parallel(
                ConstraintKind::PrfRound,
                format!("prf.sbox[{r}][{lane}][2]"),
                vec![
                    Term { coeff: 1, factors: vec![u, u] },
                    Term { coeff: q - 1, factors: vec![Factor::plain(chain_refs[0])] },
                ],
            );
            // p_{k−1}·u = p_k
            for k in 1..d - 1 {
                st.push_parallel(
                    ConstraintKind::PrfRound,
                    format!("prf.sbox[{r}][{lane}][{}]", k + 2),
                    vec![
                        Term { coeff: 1, factors: vec![Factor::plain(chain_refs[k - 1]), u] },
                        Term { coeff: q - 1, factors: vec![Factor::plain(chain_refs[k])] },
                    ],
                );
            }
            v_refs[lane] = *chain_refs.last().expect("d ≥ 3");
        }
        // linear layer, one aggregated constraint per lane
        for i in 0..p.t {
            let mut terms = vec![Term { coeff: 1, factors: vec![Factor::plain(states[r + 1][i])] }];
            for (j, &v) in v_refs.iter().enumerate() {
                let lin = if external {
                    // out_i = v_i + Σ_j v_j
                    if i == j { 2 } else { 1 }
                } else {
                    // out_i = d_i·v_i + Σ_j v_j
                    if i == j { (p.diag[i] + 1) % q } else { 1 }
                };
                terms.push(Term { coeff: (q - lin) % q, factors: vec![Factor::plain(v)] });
            }
            st.push_aggregated(ConstraintKind::PrfRound, format!("prf.lin[{r}][{i}]"), terms)?;
        }
    }

    // tag ties
    let last = p.rf + p.rp;
    for j in 0..p.len_tag {
        let tag_row = st.add_public(format!("prf.tag[{j}]"), vec![trace.tag[j]; nc])?;
        let s0_ref = states[0][j];
        st.push_aggregated(
            ConstraintKind::PrfTag,
            format!("prf.tag[{j}]"),
            vec![
                Term { coeff: 1, factors: vec![Factor::plain(tag_row)] },
                Term { coeff: q - 1, factors: vec![Factor::plain(states[last][j])] },
                Term { coeff: q - 1, factors: vec![Factor::plain(s0_ref)] },
            ],
        )?;
    }

    st.check_refs()?;
    st.check_degree_cap(params.ell, params.n)?;
    debug!(
        witness = st.witness_rows.len(),
        parallel = st.parallel.len(),
        aggregated = st.aggregated.len(),
        "showing statement assembled"
    );
    Ok((st, trace.tag))
}

// ===========================================================================
// Digest of the public statement view
// ===========================================================================

/// Transcript binding of the statement: parameters, public rows with values,
/// witness row *names* (never values), and both constraint families.
pub fn statement_digest(params: &Params, st: &Statement) -> [u8; 32] {
    let mut h = blake3::Hasher::new();
    h.update(b"latcred.statement.v1");
    h.update(&params.digest());
    h.update(&(st.n_cols as u64).to_be_bytes());
    for row in &st.public_rows {
        h.update(&(row.name.len() as u64).to_be_bytes());
        h.update(row.name.as_bytes());
        for &v in &row.values {
            h.update(&v.to_le_bytes());
        }
    }
    for row in &st.witness_rows {
        h.update(&(row.name.len() as u64).to_be_bytes());
        h.update(row.name.as_bytes());
    }
    for family in [&st.parallel, &st.aggregated] {
        h.update(&(family.len() as u64).to_be_bytes());
        for c in family.iter() {
            let bytes = serde_json::to_vec(c).expect("constraint serialize");
            h.update(&(bytes.len() as u64).to_be_bytes());
            h.update(&bytes);
        }
    }
    *h.finalize().as_bytes()
}

// ===========================================================================
// Proof object
// ===========================================================================

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Proof {
    pub commitment: LvcsCommitment,
    /// Round 2: per evaluation point, every row's value (witness + masks).
    pub evals: Vec<Vec<ExtElem>>,
    /// λ-batched parallel quotient `H`.
    pub par_quotient: Vec<ExtElem>,
    /// Aggregated sum polynomials, one per group.
    pub agg_sums: Vec<Vec<ExtElem>>,
    /// Round 3: DECS batched row coefficient vectors.
    pub decs_rows: Vec<Vec<ExtElem>>,
    /// Round 4: opened columns at the subset E.
    pub openings: Vec<ColumnOpening>,
    /// Grinding nonces, one per round.
    pub grind: [u64; 4],
}

// ===========================================================================
// Prover
// ===========================================================================

pub struct Prover<'a> {
    pub ring: &'a Ring,
    pub params: &'a Params,
    pub ext: ExtField,
    /// Cooperative cancellation, polled at constraint-row boundaries.
    stop: Option<&'a std::sync::atomic::AtomicBool>,
}

fn ext_pow(ext: &ExtField, x: ExtElem, e: usize) -> ExtElem {
    let mut acc = ext.one();
    for _ in 0..e {
        acc = ext.mul(acc, x);
    }
    acc
}

/// Accumulate `scalar · poly` into per-component buffers.
fn acc_scaled(comp: &mut [Vec<u64>; 2], scalar: ExtElem, poly: &[u64], q: u64) {
    comp[0] = poly_add(&comp[0], &poly_scale(scalar.c0, poly, q), q);
    comp[1] = poly_add(&comp[1], &poly_scale(scalar.c1, poly, q), q);
}

fn components_to_ext(comp: &[Vec<u64>; 2]) -> Vec<ExtElem> {
    let len = comp[0].len().max(comp[1].len());
    (0..len)
        .map(|i| ExtElem {
            c0: *comp[0].get(i).unwrap_or(&0),
            c1: *comp[1].get(i).unwrap_or(&0),
        })
        .collect()
}

/// Draw the ℓ′ evaluation points: distinct, outside Ω (Z_Ω non-zero).
fn draw_eval_points(
    t: &mut Transcript,
    ext: &ExtField,
    z_omega: &[u64],
    ell_prime: usize,
) -> Vec<ExtElem> {
    loop {
        let pts = t.challenge_ext_many(FsLabel::EvalPoints, ext, ell_prime);
        let distinct = pts.iter().enumerate().all(|(i, p)| !pts[..i].contains(p));
        let off_domain = pts.iter().all(|&p| !ext.is_zero(ext.eval_base_poly(z_omega, p)));
        if distinct && off_domain {
            return pts;
        }
    }
}

impl<'a> Prover<'a> {
    pub fn new(ring: &'a Ring, params: &'a Params, ext: ExtField) -> Self {
        Self { ring, params, ext, stop: None }
    }

    /// Install a cooperative stop flag.
    pub fn with_stop_flag(mut self, flag: &'a std::sync::atomic::AtomicBool) -> Self {
        self.stop = Some(flag);
        self
    }

    fn check_stop(&self) -> Result<(), ProveError> {
        match self.stop {
            Some(f) if f.load(std::sync::atomic::Ordering::Relaxed) => Err(ProveError::Cancelled),
            _ => Ok(()),
        }
    }

    #[instrument(skip_all, fields(rows = st.witness_rows.len()))]
    pub fn prove(&self, st: &Statement, rng: &mut impl Rng) -> Result<Proof, ProveError> {
        let ring = self.ring;
        let params = self.params;
        let ext = &self.ext;
        let q = ring.q;
        let nc = params.n_cols;
        st.check_refs()?;
        st.check_degree_cap(params.ell, params.n)?;
        let layout = MaskLayout::of(st, params);

        // --- commit witness + mask segment
        let mut heads: Vec<Vec<u64>> = st.witness_rows.iter().map(|r| r.values.clone()).collect();
        heads.push(vec![0; nc]); // parallel mask
        for _ in 0..layout.groups {
            heads.push(vec![0; nc]); // aggregated-sum masks
        }
        for _ in 0..layout.eta {
            heads.push((0..nc).map(|_| rng.gen_range(0..q)).collect()); // DECS masks
        }
        let (pk, commitment) = lvcs::commit_rows(ring, &heads, nc, params.ell, rng)?;

        // --- transcript: publics, root
        let mut t = Transcript::new("latcred.proof");
        t.absorb_bytes(FsLabel::PublicInputs, &statement_digest(params, st));
        t.absorb_bytes(FsLabel::CommitRoot, &commitment.root);

        // --- round 1: batching challenges
        let g1 = t.grind(1, params.kappa[0]);
        let lambdas = t.challenge_ext_many(FsLabel::GammaBatch, ext, st.parallel.len() + 1);
        let mus = t.challenge_ext_many(FsLabel::GammaBatch, ext, layout.groups);

        // --- round 2: evaluation points and answers
        let omega_nodes: Vec<u64> = (0..nc).map(|k| ring.node(k)).collect();
        let z_omega = vanishing_poly(&omega_nodes, q);
        let g2 = t.grind(2, params.kappa[1]);
        let points = draw_eval_points(&mut t, ext, &z_omega, params.ell_prime);

        let evals: Vec<Vec<ExtElem>> =
            points.iter().map(|&xi| pk.eval_rows(ext, xi)).collect();
        for row in &evals {
            t.absorb_ext_slice(FsLabel::RowEvals, row);
        }

        let compiled = CompiledRows {
            q,
            witness: pk.row_polys[..layout.witness].to_vec(),
            public: st
                .public_rows
                .iter()
                .map(|r| interpolate(&omega_nodes, &r.values, q))
                .collect(),
        };

        // λ-batched parallel family, divided by Z_Ω
        let mut comp = [Vec::new(), Vec::new()];
        for (c, lam) in st.parallel.iter().zip(&lambdas) {
            self.check_stop()?;
            let f = compiled.compile(c);
            acc_scaled(&mut comp, *lam, &f, q);
        }
        acc_scaled(&mut comp, lambdas[st.parallel.len()], &pk.row_polys[layout.par_mask()], q);
        let h_comp = [poly_div(&comp[0], &z_omega, q), poly_div(&comp[1], &z_omega, q)];
        let par_quotient = components_to_ext(&h_comp);
        t.absorb_ext_slice(FsLabel::ParQuotient, &par_quotient);

        // aggregated sum polynomials
        let mut agg_sums = Vec::with_capacity(layout.groups);
        for g in 0..layout.groups {
            let mut comp = [Vec::new(), Vec::new()];
            let members =
                &st.aggregated[g * params.rho..((g + 1) * params.rho).min(st.aggregated.len())];
            for (j, c) in members.iter().enumerate() {
                self.check_stop()?;
                let f = compiled.compile(c);
                acc_scaled(&mut comp, ext_pow(ext, mus[g], j), &f, q);
            }
            acc_scaled(
                &mut comp,
                ext_pow(ext, mus[g], params.rho),
                &pk.row_polys[layout.agg_mask(g)],
                q,
            );
            let s = components_to_ext(&comp);
            t.absorb_ext_slice(FsLabel::AggSum, &s);
            agg_sums.push(s);
        }

        // --- round 3: DECS combinations
        let g3 = t.grind(3, params.kappa[2]);
        let mut decs_rows = Vec::with_capacity(layout.eta);
        for i in 0..layout.eta {
            let gammas = t.challenge_ext_many(FsLabel::DecsCoeffs, ext, layout.batched_rows());
            let qi = pk.batch_rows(ext, &gammas, layout.decs_mask(i));
            t.absorb_ext_slice(FsLabel::DecsRows, &qi);
            decs_rows.push(qi);
        }

        // --- round 4: column subset
        let g4 = t.grind(4, params.kappa[3]);
        let e_subset = t.challenge_subset(FsLabel::SubsetE, params.ell, nc, ring.n);
        let openings = pk.open_columns(&e_subset)?;

        debug!(rows = layout.total_rows(), points = points.len(), "proof assembled");
        Ok(Proof {
            commitment,
            evals,
            par_quotient,
            agg_sums,
            decs_rows,
            openings,
            grind: [g1, g2, g3, g4],
        })
    }
}

// ===========================================================================
// Verifier
// ===========================================================================

pub struct Verifier<'a> {
    pub ring: &'a Ring,
    pub params: &'a Params,
    pub ext: ExtField,
}

impl<'a> Verifier<'a> {
    pub fn new(ring: &'a Ring, params: &'a Params, ext: ExtField) -> Self {
        Self { ring, params, ext }
    }

    /// Replay the transcript and check every opening. The statement's
    /// witness values are never consulted — only row names and counts.
    #[instrument(skip_all)]
    pub fn verify(&self, st: &Statement, proof: &Proof) -> Result<(), VerifyError> {
        let ring = self.ring;
        let params = self.params;
        let ext = &self.ext;
        let q = ring.q;
        let nc = params.n_cols;
        let layout = MaskLayout::of(st, params);
        let total = layout.total_rows();
        let row_len = nc + params.ell;

        // --- shape validation first
        if proof.commitment.rows != total
            || proof.commitment.omega != nc
            || proof.commitment.ell != params.ell
            || proof.commitment.n_cols != ring.n
        {
            return Err(VerifyError::InvalidInput("commitment layout".into()));
        }
        if proof.evals.len() != params.ell_prime
            || proof.evals.iter().any(|v| v.len() != total)
        {
            return Err(VerifyError::InvalidInput("evaluation matrix shape".into()));
        }
        let d_row = params.row_degree();
        let h_cap = st.parallel_degree().max(1) * d_row + (nc - 1) - nc + 1;
        if proof.par_quotient.len() > h_cap + 1 {
            return Err(VerifyError::InvalidInput("parallel quotient degree".into()));
        }
        if proof.agg_sums.len() != layout.groups
            || proof.agg_sums.iter().any(|s| s.len() > d_row + nc)
        {
            return Err(VerifyError::InvalidInput("aggregated sum shape".into()));
        }
        if proof.decs_rows.len() != layout.eta
            || proof.decs_rows.iter().any(|r| r.len() > row_len)
        {
            return Err(VerifyError::InvalidInput("DECS row shape".into()));
        }
        if proof.openings.len() != params.ell {
            return Err(VerifyError::InvalidInput("opened column count".into()));
        }

        // --- transcript replay
        let mut t = Transcript::new("latcred.proof");
        t.absorb_bytes(FsLabel::PublicInputs, &statement_digest(params, st));
        t.absorb_bytes(FsLabel::CommitRoot, &proof.commitment.root);

        if !t.check_grind(1, params.kappa[0], proof.grind[0]) {
            return Err(VerifyError::ChallengeMismatch(1));
        }
        let lambdas = t.challenge_ext_many(FsLabel::GammaBatch, ext, st.parallel.len() + 1);
        let mus = t.challenge_ext_many(FsLabel::GammaBatch, ext, layout.groups);

        let omega_nodes: Vec<u64> = (0..nc).map(|k| ring.node(k)).collect();
        let z_omega = vanishing_poly(&omega_nodes, q);
        if !t.check_grind(2, params.kappa[1], proof.grind[1]) {
            return Err(VerifyError::ChallengeMismatch(2));
        }
        let points = draw_eval_points(&mut t, ext, &z_omega, params.ell_prime);
        for row in &proof.evals {
            t.absorb_ext_slice(FsLabel::RowEvals, row);
        }
        t.absorb_ext_slice(FsLabel::ParQuotient, &proof.par_quotient);
        for s in &proof.agg_sums {
            t.absorb_ext_slice(FsLabel::AggSum, s);
        }

        // public row polynomials
        let pub_polys: Vec<Vec<u64>> = st
            .public_rows
            .iter()
            .map(|r| interpolate(&omega_nodes, &r.values, q))
            .collect();

        // --- constraint identities at every point
        for (k, &xi) in points.iter().enumerate() {
            let wit_at = &proof.evals[k];
            let pub_at: Vec<ExtElem> =
                pub_polys.iter().map(|p| ext.eval_base_poly(p, xi)).collect();

            let mut f_eval = ext.zero();
            for (c, lam) in st.parallel.iter().zip(&lambdas) {
                f_eval = ext.add(f_eval, ext.mul(*lam, eval_constraint_ext(ext, c, wit_at, &pub_at)));
            }
            f_eval = ext.add(
                f_eval,
                ext.mul(lambdas[st.parallel.len()], wit_at[layout.par_mask()]),
            );
            let rhs = ext.mul(
                ext.eval_base_poly(&z_omega, xi),
                ext.eval_ext_poly(&proof.par_quotient, xi),
            );
            if f_eval != rhs {
                return Err(VerifyError::ConstraintMismatch(format!(
                    "parallel family at point {k}"
                )));
            }

            for g in 0..layout.groups {
                let members = &st.aggregated
                    [g * params.rho..((g + 1) * params.rho).min(st.aggregated.len())];
                let mut s_eval = ext.zero();
                for (j, c) in members.iter().enumerate() {
                    s_eval = ext.add(
                        s_eval,
                        ext.mul(ext_pow(ext, mus[g], j), eval_constraint_ext(ext, c, wit_at, &pub_at)),
                    );
                }
                s_eval = ext.add(
                    s_eval,
                    ext.mul(ext_pow(ext, mus[g], params.rho), wit_at[layout.agg_mask(g)]),
                );
                if s_eval != ext.eval_ext_poly(&proof.agg_sums[g], xi) {
                    return Err(VerifyError::ConstraintMismatch(format!(
                        "aggregated group {g} at point {k}"
                    )));
                }
            }
        }

        // --- aggregated sums vanish on Ω
        for (g, s) in proof.agg_sums.iter().enumerate() {
            for &node in &omega_nodes {
                if !ext.is_zero(ext.eval_ext_poly(s, ext.from_base(node))) {
                    return Err(VerifyError::ConstraintMismatch(format!(
                        "aggregated sum {g} does not vanish on Ω"
                    )));
                }
            }
        }

        // --- DECS consistency at the evaluation points
        if !t.check_grind(3, params.kappa[2], proof.grind[2]) {
            return Err(VerifyError::ChallengeMismatch(3));
        }
        let mut all_gammas = Vec::with_capacity(layout.eta);
        for i in 0..layout.eta {
            let gammas = t.challenge_ext_many(FsLabel::DecsCoeffs, ext, layout.batched_rows());
            for (k, &xi) in points.iter().enumerate() {
                let mut rhs = proof.evals[k][layout.decs_mask(i)];
                for (j, g) in gammas.iter().enumerate() {
                    rhs = ext.add(rhs, ext.mul(*g, proof.evals[k][j]));
                }
                if ext.eval_ext_poly(&proof.decs_rows[i], xi) != rhs {
                    return Err(VerifyError::ConstraintMismatch(format!(
                        "DECS batch {i} at point {k}"
                    )));
                }
            }
            t.absorb_ext_slice(FsLabel::DecsRows, &proof.decs_rows[i]);
            all_gammas.push(gammas);
        }

        // --- column opens at E
        if !t.check_grind(4, params.kappa[3], proof.grind[3]) {
            return Err(VerifyError::ChallengeMismatch(4));
        }
        let e_subset = t.challenge_subset(FsLabel::SubsetE, params.ell, nc, ring.n);
        for (open, &expect_idx) in proof.openings.iter().zip(&e_subset) {
            if open.index != expect_idx {
                return Err(VerifyError::InvalidInput("opened column index".into()));
            }
            lvcs::verify_column(&proof.commitment, open)?;
            let x = ext.from_base(ring.node(open.index));
            for (i, gammas) in all_gammas.iter().enumerate() {
                let mut rhs = ext.from_base(open.values[layout.decs_mask(i)]);
                for (j, g) in gammas.iter().enumerate() {
                    rhs = ext.add(rhs, ext.scale(open.values[j], *g));
                }
                if ext.eval_ext_poly(&proof.decs_rows[i], x) != rhs {
                    return Err(VerifyError::ConstraintMismatch(format!(
                        "DECS batch {i} at column {}",
                        open.index
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issuance;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn small_params() -> Params {
        Params {
            n: 256,
            q: 1_038_337,
            n_cols: 8,
            ell: 6,
            ell_prime: 2,
            rho: 8,
            eta: 2,
            theta: 2,
            w_bits: 5,
            l_digits: 0,
            kappa: [0, 2, 0, 2],
            lambda: 40,
            b: 8,
            alpha: 1.20,
            r_square: crate::sampler::DEFAULT_R_SQUARE,
            slack: 1.042,
            max_sign_trials: 64,
        }
    }

    fn issuance_fixture(
        params: &Params,
    ) -> (Ring, PublicSetup, HolderSecrets, IssuerChallenge, Issuance) {
        let ring = params.ring().unwrap();
        let setup = issuance::setup(&ring, b"sys");
        let secrets = issuance::sample_secrets(&ring, params, b"holder");
        let mut rng = ChaCha20Rng::seed_from_u64(51);
        let challenge = issuance::issuer_challenge(&ring, params, &mut rng);
        let iss = issuance::apply_challenge(&ring, params, &setup, &secrets, &challenge).unwrap();
        (ring, setup, secrets, challenge, iss)
    }

    #[test]
    fn issuance_proof_round_trip() {
        let params = small_params();
        let (ring, setup, secrets, challenge, iss) = issuance_fixture(&params);
        let st =
            issuance::issuance_statement(&ring, &params, &setup, &secrets, &iss, &challenge)
                .unwrap();
        assert!(st.is_satisfied(ring.q));

        let ext = ExtField::new(params.theta, params.q).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(52);
        let proof = Prover::new(&ring, &params, ext).prove(&st, &mut rng).unwrap();
        Verifier::new(&ring, &params, ext).verify(&st, &proof).unwrap();
    }

    #[test]
    fn tampered_witness_fails() {
        let params = small_params();
        let (ring, setup, secrets, challenge, iss) = issuance_fixture(&params);
        let mut st =
            issuance::issuance_statement(&ring, &params, &setup, &secrets, &iss, &challenge)
                .unwrap();
        // k0 outside {−1, 0, 1}
        let k0_idx = st
            .witness_rows
            .iter()
            .position(|r| r.name == "k0")
            .unwrap();
        st.witness_rows[k0_idx].values[3] = 2;

        let ext = ExtField::new(params.theta, params.q).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(53);
        let proof = Prover::new(&ring, &params, ext).prove(&st, &mut rng).unwrap();
        assert!(matches!(
            Verifier::new(&ring, &params, ext).verify(&st, &proof),
            Err(VerifyError::ConstraintMismatch(_))
        ));
    }

    #[test]
    fn tampered_proof_bytes_fail() {
        let params = small_params();
        let (ring, setup, secrets, challenge, iss) = issuance_fixture(&params);
        let st =
            issuance::issuance_statement(&ring, &params, &setup, &secrets, &iss, &challenge)
                .unwrap();
        let ext = ExtField::new(params.theta, params.q).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(54);
        let proof = Prover::new(&ring, &params, ext).prove(&st, &mut rng).unwrap();
        let verifier = Verifier::new(&ring, &params, ext);

        let mut bad = proof.clone();
        bad.commitment.root[0] ^= 1;
        assert!(verifier.verify(&st, &bad).is_err());

        let mut bad = proof.clone();
        bad.evals[0][2].c0 = (bad.evals[0][2].c0 + 1) % params.q;
        assert!(verifier.verify(&st, &bad).is_err());

        let mut bad = proof.clone();
        bad.par_quotient[0].c1 = (bad.par_quotient[0].c1 + 1) % params.q;
        assert!(verifier.verify(&st, &bad).is_err());

        let mut bad = proof.clone();
        bad.openings[0].values[1] = (bad.openings[0].values[1] + 1) % params.q;
        assert!(verifier.verify(&st, &bad).is_err());

        let mut bad = proof;
        bad.grind[1] = bad.grind[1].wrapping_add(1);
        assert!(verifier.verify(&st, &bad).is_err());
    }
}
